//! Pipeline stages (C10, §4.8): Planning, TaskRegistration, CrafterExecution,
//! GateVerification, each a function of a shared [`PipelineContext`]
//! producing a [`StageResult`]. One async fn per transition, with
//! cooperative cancellation checks, composing into the
//! Plan→Register→Execute→Verify loop.

mod crafter_execution;
mod gate_verification;
mod planning;
mod task_registration;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::coordinator::Coordinator;
use crate::error::{Result, RoutaError};
use crate::providers::{ChunkCallback, Provider, StreamChunk};
use crate::store::{AgentStore, ConversationStore, TaskStore};

pub use crafter_execution::run_crafter_execution;
pub use gate_verification::run_gate_verification;
pub use planning::run_planning;
pub use task_registration::run_task_registration;

/// Everything a pipeline run needs to reach, in one place per §4.8.
pub struct PipelineContext {
    pub agents: Arc<dyn AgentStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub coordinator: Arc<Coordinator>,
    pub provider: Arc<dyn Provider>,
    pub workspace_id: String,
    pub user_request: String,
    pub parallel_crafters: bool,
    pub routa_agent_id: RwLock<String>,
    pub plan_output: RwLock<String>,
    pub task_ids: RwLock<Vec<String>>,
    pub wave_number: RwLock<u32>,
    pub delegations: RwLock<Vec<(String, String)>>,
    pub gate_agent_id: RwLock<Option<String>>,
    pub on_phase_change: Box<dyn Fn(Phase) + Send + Sync>,
    pub on_stream_chunk: Box<dyn Fn(StreamChunk) + Send + Sync>,
    pub cancellation: CancellationToken,
    pub metadata: RwLock<HashMap<String, String>>,
}

impl PipelineContext {
    /// §4.8: dispatches to `onPhaseChange`. Never fails; a slow callback is
    /// the caller's own back-pressure problem (§5).
    pub fn emit_phase(&self, phase: Phase) {
        (self.on_phase_change)(phase);
    }

    pub fn stream_sink(&self) -> ChunkCallback<'_> {
        &*self.on_stream_chunk
    }

    /// §4.8: `Cancelled` if the parent cancellation handle has fired.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            Err(RoutaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Phase trace emitted to `onPhaseChange` (§4.8/§5). Totally ordered within
/// one run.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Initializing,
    Planning,
    PlanReady,
    TasksRegistered(usize),
    WaveStarting(u32),
    WaveComplete(u32),
    VerificationStarting(u32),
    VerificationCompleted { gate_agent_id: String, output: String },
    NeedsFix(u32),
    Completed,
    MaxWavesReached(u32),
}

/// §4.10: the orchestrator's four terminal result shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::large_enum_variant)]
#[serde(tag = "kind")]
pub enum OrchestratorResult {
    Success { task_summaries: Vec<TaskSummaryDto>, plan_output: String },
    NoTasks { plan_output: String },
    MaxWavesReached { waves: u32, task_summaries: Vec<TaskSummaryDto> },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummaryDto {
    pub title: String,
    pub status: String,
    pub summary: Option<String>,
}

impl From<crate::coordinator::TaskSummary> for TaskSummaryDto {
    fn from(s: crate::coordinator::TaskSummary) -> Self {
        Self {
            title: s.title,
            status: task_status_str(s.status).to_string(),
            summary: s.summary,
        }
    }
}

fn task_status_str(status: crate::models::TaskStatus) -> &'static str {
    use crate::models::TaskStatus::*;
    match status {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        ReviewRequired => "REVIEW_REQUIRED",
        Completed => "COMPLETED",
        NeedsFix => "NEEDS_FIX",
    }
}

/// §4.8: what a stage produces. A stage may retry itself up to its declared
/// policy before giving up with `Failed`.
pub enum StageResult {
    Continue,
    SkipRemaining(OrchestratorResult),
    RepeatPipeline(Option<&'static str>),
    Done(OrchestratorResult),
    Failed(RoutaError),
}

/// A stage's retry policy (§4.8): failures within `max_attempts` retry the
/// stage body; beyond that they become `Failed`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub const fn single_attempt() -> Self {
        Self { max_attempts: 1, base_delay_ms: 0, backoff_multiplier: 1.0 }
    }
}

/// Names used to resume the stage loop after a `RepeatPipeline(from)`.
pub const STAGE_PLANNING: &str = "planning";
pub const STAGE_TASK_REGISTRATION: &str = "task-registration";
pub const STAGE_CRAFTER_EXECUTION: &str = "crafter-execution";
pub const STAGE_GATE_VERIFICATION: &str = "gate-verification";

/// §4.8 per-stage defaults: S1 gets a single attempt, S4 retries transient
/// verification failures twice with a 2s/4s backoff. S2/S3 are one-shot —
/// S3's own per-task failures already demote to NEEDS_FIX instead of
/// failing the stage (§7).
pub fn retry_policy_for(stage: &'static str) -> RetryPolicy {
    match stage {
        STAGE_GATE_VERIFICATION => RetryPolicy {
            max_attempts: crate::constants::GATE_STAGE_MAX_ATTEMPTS,
            base_delay_ms: crate::constants::GATE_STAGE_BASE_DELAY_MS,
            backoff_multiplier: crate::constants::GATE_STAGE_BACKOFF_MULTIPLIER,
        },
        _ => RetryPolicy::single_attempt(),
    }
}
