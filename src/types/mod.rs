//! Core types for Helios

mod belief;
mod turn;
mod npc;
mod record;

pub use belief::{
    BeliefEntry, BeliefCategory, BeliefSystem, BeliefSummary, BeliefDefect,
    InteractionPatterns, truncate_chars, DEFAULT_STRENGTH, UNKNOWN,
};
pub use turn::{ConversationTurn, ConversationContext, Speaker, Scene, CONTEXT_TURNS};
pub use npc::{NpcKind, NpcProfile, NpcRoute, RouteKind, RoutingResult, ENVIRONMENT_ID};
pub use record::{InteractionRecord, records_to_turns};
