use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One turn in an agent's conversation. Turn numbers within an agent are
/// strictly increasing when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub agent_id: String,
    pub role: MessageRole,
    pub content: String,
    pub turn: Option<u64>,
    pub tool_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl Message {
    pub fn new(id: String, agent_id: String, role: MessageRole, content: String) -> Self {
        Self {
            id,
            agent_id,
            role,
            content,
            turn: None,
            tool_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_turn(mut self, turn: u64) -> Self {
        self.turn = Some(turn);
        self
    }

    pub fn with_tool_name(mut self, tool_name: String) -> Self {
        self.tool_name = Some(tool_name);
        self
    }
}
