use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A participant in orchestration: ROUTA, a CRAFTER, or GATE.
///
/// `role` is immutable after creation. Exactly one ROUTA exists per
/// `(workspace_id, coordination session)`; `parent_id` references an
/// existing agent or is absent only for ROUTA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    pub workspace_id: String,
    pub parent_id: Option<String>,
    pub model_tier: ModelTier,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRole {
    Routa,
    Crafter,
    Gate,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Routa => "ROUTA",
            AgentRole::Crafter => "CRAFTER",
            AgentRole::Gate => "GATE",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelTier {
    Smart,
    Fast,
}

impl Default for ModelTier {
    fn default() -> Self {
        ModelTier::Smart
    }
}

/// Status transitions form a DAG: PENDING→ACTIVE→COMPLETED, any→ERROR,
/// COMPLETED→ACTIVE (re-wake).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Pending,
    Idle,
    Active,
    Completed,
    Error,
}

impl Agent {
    pub fn new(
        id: String,
        name: String,
        role: AgentRole,
        workspace_id: String,
        parent_id: Option<String>,
        model_tier: ModelTier,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            role,
            workspace_id,
            parent_id,
            model_tier,
            status: AgentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
