use serde::{Deserialize, Serialize};

/// Payload of `report_to_parent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionReport {
    pub agent_id: String,
    pub task_id: String,
    pub summary: String,
    pub files_modified: Option<Vec<String>>,
    pub verification_results: Option<String>,
    pub success: bool,
}

/// Parsed GATE result for a single task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    NotApproved,
}

/// A verdict carrying the per-task evidence GATE produced for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationVerdict {
    pub task_id: String,
    pub verdict: Verdict,
    pub summary: String,
}
