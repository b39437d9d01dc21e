//! NPC profiles and routes

use serde::{Deserialize, Serialize};
use crate::types::{BeliefSummary, BeliefSystem};

/// Environment narrator pseudo-id
pub const ENVIRONMENT_ID: &str = "environment";

/// How an NPC participates in routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcKind {
    /// Named character with its own belief system
    Core,
    /// Generic role (bartender, cook...), eligible for random fallback
    Universal,
}

/// One NPC as loaded from the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    pub kind: NpcKind,
    /// Short role description used when there is no belief record
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub belief: Option<BeliefSystem>,
}

impl NpcProfile {
    /// Routing view of this profile
    pub fn route(&self) -> NpcRoute {
        NpcRoute {
            npc_id: self.id.clone(),
            triggers: self.triggers.clone(),
            universal: self.kind == NpcKind::Universal,
        }
    }

    pub fn summary(&self) -> BeliefSummary {
        self.belief
            .as_ref()
            .map(BeliefSystem::summary)
            .unwrap_or_else(BeliefSummary::unknown)
    }
}

/// Keyword set → NPC id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcRoute {
    pub npc_id: String,
    pub triggers: Vec<String>,
    #[serde(default)]
    pub universal: bool,
}

impl NpcRoute {
    pub fn new(npc_id: impl Into<String>, triggers: &[&str]) -> Self {
        Self {
            npc_id: npc_id.into(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            universal: false,
        }
    }

    pub fn universal(mut self) -> Self {
        self.universal = true;
        self
    }
}

/// What kind of responder was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Keyword hit on an NPC
    Matched,
    /// No hits, default or random universal role
    Fallback,
    /// Observation action, answered by the scene itself
    Environment,
    /// Caller named the NPC explicitly
    Requested,
}

/// Router decision with an explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub npc_id: String,
    pub kind: RouteKind,
    /// Triggers that matched, in declaration order
    pub matched: Vec<String>,
    pub reasoning: String,
}
