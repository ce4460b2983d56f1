use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain event published on the event bus (§3, §4.2).
///
/// `QueueOverflow` is not part of the original tagged union; it is the
/// diagnostic event §4.2 requires the bus to emit when a subscriber's
/// bounded queue drops an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_type: AgentEventType,
    pub agent_id: String,
    pub workspace_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentEventType {
    AgentCreated,
    AgentStatusChanged,
    TaskAssigned,
    TaskStatusChanged,
    MessageSent,
    ReportSubmitted,
    QueueOverflow,
}

impl AgentEvent {
    pub fn new(
        event_type: AgentEventType,
        agent_id: impl Into<String>,
        workspace_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            event_type,
            agent_id: agent_id.into(),
            workspace_id: workspace_id.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}
