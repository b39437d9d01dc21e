//! Conversation turns and the context handed to the compiler
//!
//! - Turn = one utterance by the player or an NPC
//! - Context = scene + the last few turns of one session, oldest first

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Turns rendered into the compiled prompt's context block
pub const CONTEXT_TURNS: usize = 4;

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    /// The player
    #[serde(rename = "user")]
    User,
    /// An NPC
    #[serde(rename = "ai")]
    Npc,
}

impl Speaker {
    /// Wire name: `user` or `ai`
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Npc => "ai",
        }
    }
}

/// A single utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    /// Display name, used by the echo room
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Player turn stamped now
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            speaker_name: None,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// NPC turn stamped now
    pub fn npc(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Npc,
            speaker_name: Some(name.into()),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// Where the conversation happens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Default for Scene {
    fn default() -> Self {
        Self::harbor_tavern()
    }
}

impl Scene {
    /// The starting scene
    pub fn harbor_tavern() -> Self {
        Self {
            id: "harbor_tavern".to_string(),
            name: "港口酒馆".to_string(),
            description: "港口酒馆内，各种旅人和本地人聚集的地方。".to_string(),
        }
    }

    pub fn moonlight_tavern() -> Self {
        Self {
            id: "moonlight_tavern".to_string(),
            name: "月影酒馆".to_string(),
            description: "月影酒馆，一个昏暗温馨的酒馆，有着摇曳的烛光和厚重的木质桌椅。".to_string(),
        }
    }

    /// Look up a known scene, unknown ids fall back to the harbor tavern
    pub fn by_id(id: &str) -> Self {
        match id {
            "moonlight_tavern" => Self::moonlight_tavern(),
            _ => Self::harbor_tavern(),
        }
    }
}

/// Scene plus recent history for one compile call
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub scene: Scene,
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            turns: Vec::new(),
        }
    }

    /// Attach history (oldest first)
    pub fn with_history(mut self, turns: Vec<ConversationTurn>) -> Self {
        self.turns = turns;
        self
    }

    /// Last `n` turns, oldest first
    pub fn recent(&self, n: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn is_first_conversation(&self) -> bool {
        self.turns.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
