use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work produced by the task parser and driven through the
/// pipeline stages.
///
/// A task is *ready* iff `status` is PENDING or NEEDS_FIX and every
/// dependency is COMPLETED. `assigned_to` is non-null iff `status` is
/// IN_PROGRESS, REVIEW_REQUIRED, or NEEDS_FIX.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub objective: String,
    pub scope: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub verification_commands: Vec<String>,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub workspace_id: String,
    pub assigned_to: Option<String>,
    pub completion_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PENDING → IN_PROGRESS (delegate) → REVIEW_REQUIRED (crafter finishes) →
/// COMPLETED (gate approves) or NEEDS_FIX (gate rejects); NEEDS_FIX →
/// PENDING (wave reset, `assigned_to` cleared).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    ReviewRequired,
    Completed,
    NeedsFix,
}

impl Task {
    pub fn new(id: String, workspace_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: String::new(),
            objective: String::new(),
            scope: Vec::new(),
            acceptance_criteria: Vec::new(),
            verification_commands: Vec::new(),
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            workspace_id,
            assigned_to: None,
            completion_summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Property 4 (§8): ready iff PENDING/NEEDS_FIX and every dependency
    /// is COMPLETED in `completed_ids`.
    pub fn is_ready(&self, completed_ids: &std::collections::HashSet<String>) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::NeedsFix)
            && self.dependencies.iter().all(|d| completed_ids.contains(d))
    }
}
