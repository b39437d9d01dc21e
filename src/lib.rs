//! Helios: belief-driven NPC backend
//!
//! HTTP request → NpcRouter → BeliefCompiler → GatewayClient → reply,
//! with the exchange written to the interaction log in the background.

pub mod core;
pub mod types;

// =============================================================================
// GATEWAY
// =============================================================================

/// OpenAI-compatible gateway used when AI_GATEWAY_URL is unset
pub const DEFAULT_GATEWAY_URL: &str = "https://ai-gateway.vercel.sh/v1";

/// Model used when AI_GATEWAY_MODEL is unset
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

pub const DEFAULT_MAX_TOKENS: u32 = 150;
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// History turns sent with each completion
pub const HISTORY_TURNS: usize = 6;

/// Message characters echoed back in local test mode
pub const LOCAL_PREVIEW_CHARS: usize = 50;

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// VERSION
// =============================================================================

pub const SERVICE_NAME: &str = "helios-agent-core";
pub const VERSION: &str = "0.4.1";
