use serde::{Deserialize, Serialize};

/// State owned exclusively by the Coordinator (§3). Stage transitions are
/// the only writers; reading and branching on phase outside a stage is a bug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationState {
    pub workspace_id: String,
    pub routa_agent_id: String,
    pub phase: CoordinationPhase,
    pub task_ids: Vec<String>,
    pub active_crafter_ids: Vec<String>,
    pub gate_agent_id: Option<String>,
    pub wave_number: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordinationPhase {
    Planning,
    Ready,
    Executing,
    WaveComplete,
    Verifying,
    Completed,
    Error,
}

impl CoordinationState {
    pub fn new(workspace_id: String, routa_agent_id: String) -> Self {
        Self {
            workspace_id,
            routa_agent_id,
            phase: CoordinationPhase::Planning,
            task_ids: Vec::new(),
            active_crafter_ids: Vec::new(),
            gate_agent_id: None,
            wave_number: 0,
            error: None,
        }
    }
}
