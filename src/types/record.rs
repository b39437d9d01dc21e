//! Interaction log rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::types::ConversationTurn;

/// One player → NPC exchange, as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub character_id: String,
    pub session_id: String,
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
}

impl InteractionRecord {
    pub fn new(
        character_id: impl Into<String>,
        session_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            character_id: character_id.into(),
            session_id: session_id.into(),
            input: input.into(),
            output: output.into(),
            timestamp: Utc::now(),
        }
    }

    /// Player turn followed by the NPC reply
    pub fn turns(&self, npc_name: &str) -> [ConversationTurn; 2] {
        [
            ConversationTurn::user(self.input.clone()).at(self.timestamp),
            ConversationTurn::npc(npc_name, self.output.clone()).at(self.timestamp),
        ]
    }
}

/// Flatten records (oldest first) into turns
pub fn records_to_turns<F>(records: &[InteractionRecord], mut name_of: F) -> Vec<ConversationTurn>
where
    F: FnMut(&str) -> String,
{
    records
        .iter()
        .flat_map(|r| r.turns(&name_of(&r.character_id)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Speaker;

    #[test]
    fn test_record_expands_to_two_turns() {
        let record = InteractionRecord::new("bartender", "s1", "来杯麦酒", "马上就好");
        let [ask, reply] = record.turns("酒保");
        assert_eq!(ask.speaker, Speaker::User);
        assert_eq!(ask.text, "来杯麦酒");
        assert_eq!(reply.speaker_name.as_deref(), Some("酒保"));
        assert_eq!(ask.timestamp, record.timestamp);
    }

    #[test]
    fn test_records_to_turns_keeps_order() {
        let records = vec![
            InteractionRecord::new("cook", "s1", "有什么吃的", "炖鱼"),
            InteractionRecord::new("bartender", "s1", "再来一杯", "好嘞"),
        ];
        let turns = records_to_turns(&records, |id| {
            if id == "cook" { "厨师".to_string() } else { "酒保".to_string() }
        });
        let texts: Vec<_> = turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["有什么吃的", "炖鱼", "再来一杯", "好嘞"]);
        assert_eq!(turns[1].speaker_name.as_deref(), Some("厨师"));
    }
}
