//! Orchestrator (C11, §4.10): builds one [`PipelineContext`] per
//! `execute()` call and drives it through the bounded wave loop, honoring
//! `RepeatPipeline` resumption points and cooperative cancellation. A loop
//! over stage outcomes rather than a task queue, since the stage set here
//! is fixed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::OrchestratorConfig;
use crate::coordinator::Coordinator;
use crate::error::RoutaError;
use crate::pipeline::{
    retry_policy_for, run_crafter_execution, run_gate_verification, run_planning, run_task_registration,
    OrchestratorResult, Phase, PipelineContext, StageResult, STAGE_CRAFTER_EXECUTION, STAGE_GATE_VERIFICATION,
    STAGE_PLANNING, STAGE_TASK_REGISTRATION,
};
use crate::providers::{Provider, StreamChunk};
use crate::store::{AgentStore, ConversationStore, TaskStore};

/// Caller-supplied callbacks and tunables for one `execute()` run.
pub struct ExecuteOptions {
    pub workspace_id: String,
    pub user_request: String,
    pub parallel_crafters: bool,
    pub on_phase_change: Box<dyn Fn(Phase) + Send + Sync>,
    pub on_stream_chunk: Box<dyn Fn(StreamChunk) + Send + Sync>,
    pub cancellation: CancellationToken,
}

pub struct Orchestrator {
    agents: Arc<dyn AgentStore>,
    tasks: Arc<dyn TaskStore>,
    conversations: Arc<dyn ConversationStore>,
    provider: Arc<dyn Provider>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        tasks: Arc<dyn TaskStore>,
        conversations: Arc<dyn ConversationStore>,
        provider: Arc<dyn Provider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { agents, tasks, conversations, provider, config }
    }

    /// §4.10: runs [S1,S2,S3,S4] in order, handling `RepeatPipeline` by
    /// restarting at the named stage (S3 if none), bounded by
    /// `max_waves`. Returns exactly one of the four result variants.
    #[instrument(name = "orchestrator_execute", skip(self, options), fields(workspace_id = %options.workspace_id))]
    pub async fn execute(&self, options: ExecuteOptions) -> OrchestratorResult {
        let coordinator = Arc::new(Coordinator::new(self.agents.clone(), self.tasks.clone(), options.workspace_id.clone()));

        let ctx = Arc::new(PipelineContext {
            agents: self.agents.clone(),
            tasks: self.tasks.clone(),
            conversations: self.conversations.clone(),
            coordinator,
            provider: self.provider.clone(),
            workspace_id: options.workspace_id,
            user_request: options.user_request,
            parallel_crafters: options.parallel_crafters,
            routa_agent_id: RwLock::new(String::new()),
            plan_output: RwLock::new(String::new()),
            task_ids: RwLock::new(Vec::new()),
            wave_number: RwLock::new(0),
            delegations: RwLock::new(Vec::new()),
            gate_agent_id: RwLock::new(None),
            on_phase_change: options.on_phase_change,
            on_stream_chunk: options.on_stream_chunk,
            cancellation: options.cancellation,
            metadata: RwLock::new(HashMap::new()),
        });

        ctx.emit_phase(Phase::Initializing);

        let mut stage = STAGE_PLANNING;
        let mut pipeline_iteration: u32 = 0;

        loop {
            if let Err(e) = ctx.ensure_active() {
                self.cancel_run(&ctx).await;
                return OrchestratorResult::Failed { error: e.to_string() };
            }

            let result = self.run_stage_with_retry(stage, &ctx).await;

            match result {
                StageResult::Continue => {
                    stage = next_stage(stage);
                }
                StageResult::SkipRemaining(r) | StageResult::Done(r) => {
                    info!("orchestrator run finished");
                    return r;
                }
                StageResult::RepeatPipeline(from) => {
                    pipeline_iteration += 1;
                    // Each RepeatPipeline here corresponds to exactly one completed,
                    // unapproved CrafterExecution wave, so pipeline_iteration tracks
                    // wave_number. Bounding at `>= max_waves` (rather than `>`) caps
                    // the run at exactly max_waves attempted waves.
                    if pipeline_iteration >= self.config.max_waves {
                        let wave = pipeline_iteration;
                        ctx.emit_phase(Phase::MaxWavesReached(wave));
                        let summaries = match ctx.coordinator.get_task_summary().await {
                            Ok(summaries) => summaries.into_iter().map(Into::into).collect(),
                            Err(e) => return OrchestratorResult::Failed { error: e.to_string() },
                        };
                        return OrchestratorResult::MaxWavesReached { waves: wave, task_summaries: summaries };
                    }
                    stage = from.unwrap_or(STAGE_CRAFTER_EXECUTION);
                }
                StageResult::Failed(e) => {
                    warn!(%e, "pipeline stage failed");
                    if matches!(e, RoutaError::Cancelled) {
                        self.cancel_run(&ctx).await;
                    }
                    return OrchestratorResult::Failed { error: e.to_string() };
                }
            }
        }
    }

    /// §4.8: runs one stage, retrying its whole body per [`retry_policy_for`]
    /// when it produces `Failed` with a non-cancellation cause. Exhausting
    /// the policy surfaces a `PipelineFailure` carrying the last cause
    /// instead of the raw stage error.
    async fn run_stage_with_retry(&self, stage: &'static str, ctx: &Arc<PipelineContext>) -> StageResult {
        let policy = retry_policy_for(stage);
        let mut delay_ms = policy.base_delay_ms;

        for attempt in 1..=policy.max_attempts {
            let result = match stage {
                STAGE_PLANNING => run_planning(ctx).await,
                STAGE_TASK_REGISTRATION => run_task_registration(ctx).await,
                STAGE_CRAFTER_EXECUTION => run_crafter_execution(ctx).await,
                STAGE_GATE_VERIFICATION => run_gate_verification(ctx).await,
                other => return StageResult::Failed(RoutaError::Internal(anyhow::anyhow!("unknown stage {other}"))),
            };

            match result {
                StageResult::Failed(e) if matches!(e, RoutaError::Cancelled) => {
                    return StageResult::Failed(e);
                }
                StageResult::Failed(e) if attempt < policy.max_attempts => {
                    warn!(stage, attempt, %e, "stage failed, retrying per stage retry policy");
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms as f64 * policy.backoff_multiplier) as u64;
                    }
                    continue;
                }
                StageResult::Failed(e) => {
                    return StageResult::Failed(RoutaError::PipelineFailure {
                        stage: stage.to_string(),
                        cause: e.to_string(),
                    });
                }
                other => return other,
            }
        }
        unreachable!("retry loop always returns within max_attempts")
    }

    /// §5: cancellation fans out `interrupt` to every agent this run
    /// delegated to, then `cleanup`s them. Idempotent — safe to call more
    /// than once for the same run.
    async fn cancel_run(&self, ctx: &PipelineContext) {
        let delegations = ctx.delegations.read().await.clone();
        for (agent_id, _) in &delegations {
            self.provider.interrupt(agent_id).await;
            self.provider.cleanup(agent_id).await;
        }
        if let Some(gate_id) = ctx.gate_agent_id.read().await.clone() {
            self.provider.interrupt(&gate_id).await;
            self.provider.cleanup(&gate_id).await;
        }
        let routa_id = ctx.routa_agent_id.read().await.clone();
        if !routa_id.is_empty() {
            self.provider.interrupt(&routa_id).await;
        }
    }
}

fn next_stage(current: &'static str) -> &'static str {
    match current {
        STAGE_PLANNING => STAGE_TASK_REGISTRATION,
        STAGE_TASK_REGISTRATION => STAGE_CRAFTER_EXECUTION,
        STAGE_CRAFTER_EXECUTION => STAGE_GATE_VERIFICATION,
        STAGE_GATE_VERIFICATION => STAGE_CRAFTER_EXECUTION,
        _ => STAGE_PLANNING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::models::AgentRole;
    use crate::providers::{ChunkCallback, ProviderCapabilities};
    use crate::store::{InMemoryAgentStore, InMemoryConversationStore, InMemoryTaskStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    const PLAN: &str = "@@@task\n# Add greet\n\n## Objective\nAdd a function greet() that returns \"hello\".\n\n## Definition of Done\n- greet() returns \"hello\"\n\n## Verification\n- run tests\n@@@\n";

    struct ScriptedProvider {
        gate_calls: AtomicU32,
        gate_outputs: Vec<&'static str>,
        caps: ProviderCapabilities,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn run_streaming(
            &self,
            role: AgentRole,
            _agent_id: &str,
            _prompt: &str,
            _on_chunk: ChunkCallback<'_>,
        ) -> crate::error::Result<String> {
            match role {
                AgentRole::Routa => Ok(PLAN.to_string()),
                AgentRole::Crafter => Ok("done".to_string()),
                AgentRole::Gate => {
                    let idx = self.gate_calls.fetch_add(1, Ordering::SeqCst) as usize;
                    Ok(self.gate_outputs.get(idx).copied().unwrap_or("APPROVED").to_string())
                }
            }
        }
        async fn is_healthy(&self, _agent_id: &str) -> bool {
            true
        }
        async fn interrupt(&self, _agent_id: &str) {}
        async fn cleanup(&self, _agent_id: &str) {}
        async fn shutdown(&self) {}
        fn capabilities(&self) -> ProviderCapabilities {
            self.caps.clone()
        }
    }

    fn full_caps() -> ProviderCapabilities {
        ProviderCapabilities {
            name: "scripted".to_string(),
            supports_streaming: true,
            supports_interrupt: true,
            supports_health_check: true,
            supports_file_editing: true,
            supports_terminal: true,
            supports_tool_calling: true,
            max_concurrent_agents: 8,
            priority: 1,
        }
    }

    fn orchestrator(gate_outputs: Vec<&'static str>, max_waves: u32) -> Orchestrator {
        Orchestrator::new(
            Arc::new(InMemoryAgentStore::new()),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(ScriptedProvider { gate_calls: AtomicU32::new(0), gate_outputs, caps: full_caps() }),
            OrchestratorConfig { max_waves, ..Default::default() },
        )
    }

    fn options(phases: Arc<StdMutex<Vec<Phase>>>) -> ExecuteOptions {
        ExecuteOptions {
            workspace_id: "ws1".to_string(),
            user_request: "Add greet()".to_string(),
            parallel_crafters: false,
            on_phase_change: Box::new(move |p| phases.lock().unwrap().push(p)),
            on_stream_chunk: Box::new(|_| {}),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn e1_minimal_happy_path() {
        let orchestrator = orchestrator(vec!["APPROVED"], 3);
        let phases = Arc::new(StdMutex::new(Vec::new()));
        let result = orchestrator.execute(options(phases.clone())).await;

        match result {
            OrchestratorResult::Success { task_summaries, .. } => {
                assert_eq!(task_summaries.len(), 1);
                assert_eq!(task_summaries[0].status, "COMPLETED");
            }
            other => panic!("expected Success, got {other:?}"),
        }

        let recorded = phases.lock().unwrap();
        assert_eq!(recorded[0], Phase::Initializing);
        assert_eq!(recorded[1], Phase::Planning);
        assert!(recorded.contains(&Phase::PlanReady));
        assert!(recorded.contains(&Phase::TasksRegistered(1)));
        assert!(recorded.contains(&Phase::WaveStarting(1)));
        assert!(recorded.contains(&Phase::WaveComplete(1)));
        assert!(recorded.contains(&Phase::VerificationStarting(1)));
        assert_eq!(*recorded.last().unwrap(), Phase::Completed);
    }

    #[tokio::test]
    async fn e2_rejection_then_approval() {
        let orchestrator = orchestrator(vec!["NOT APPROVED", "APPROVED"], 3);
        let phases = Arc::new(StdMutex::new(Vec::new()));
        let result = orchestrator.execute(options(phases.clone())).await;

        assert!(matches!(result, OrchestratorResult::Success { .. }));
        let recorded = phases.lock().unwrap();
        assert!(recorded.contains(&Phase::NeedsFix(1)));
        assert!(recorded.contains(&Phase::WaveStarting(2)));
    }

    #[tokio::test]
    async fn e5_max_waves_reached() {
        let orchestrator = orchestrator(vec!["NOT APPROVED", "NOT APPROVED", "NOT APPROVED"], 3);
        let phases = Arc::new(StdMutex::new(Vec::new()));
        let result = orchestrator.execute(options(phases.clone())).await;

        match result {
            OrchestratorResult::MaxWavesReached { waves, .. } => assert_eq!(waves, 3),
            other => panic!("expected MaxWavesReached, got {other:?}"),
        }
        let recorded = phases.lock().unwrap();
        assert!(matches!(recorded.last().unwrap(), Phase::MaxWavesReached(_)));
    }

    #[tokio::test]
    async fn no_tasks_when_plan_has_no_blocks() {
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryAgentStore::new()),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(EmptyPlanProvider { caps: full_caps() }),
            OrchestratorConfig::default(),
        );
        let phases = Arc::new(StdMutex::new(Vec::new()));
        let result = orchestrator.execute(options(phases)).await;
        assert!(matches!(result, OrchestratorResult::NoTasks { .. }));
    }

    struct EmptyPlanProvider {
        caps: ProviderCapabilities,
    }

    #[async_trait]
    impl Provider for EmptyPlanProvider {
        async fn run_streaming(
            &self,
            _role: AgentRole,
            _agent_id: &str,
            _prompt: &str,
            _on_chunk: ChunkCallback<'_>,
        ) -> crate::error::Result<String> {
            Ok("no tasks here".to_string())
        }
        async fn is_healthy(&self, _agent_id: &str) -> bool {
            true
        }
        async fn interrupt(&self, _agent_id: &str) {}
        async fn cleanup(&self, _agent_id: &str) {}
        async fn shutdown(&self) {}
        fn capabilities(&self) -> ProviderCapabilities {
            self.caps.clone()
        }
    }

    #[tokio::test]
    async fn cancellation_before_start_fails_run() {
        let orchestrator = orchestrator(vec!["APPROVED"], 3);
        let phases = Arc::new(StdMutex::new(Vec::new()));
        let mut opts = options(phases);
        opts.cancellation.cancel();
        let result = orchestrator.execute(opts).await;
        assert!(matches!(result, OrchestratorResult::Failed { .. }));
    }

    /// Errors once on the GATE turn, then behaves like `ScriptedProvider`.
    struct FlakyGateProvider {
        gate_attempts: AtomicU32,
        fail_first_n_gate_calls: u32,
        caps: ProviderCapabilities,
    }

    #[async_trait]
    impl Provider for FlakyGateProvider {
        async fn run_streaming(
            &self,
            role: AgentRole,
            _agent_id: &str,
            _prompt: &str,
            _on_chunk: ChunkCallback<'_>,
        ) -> crate::error::Result<String> {
            match role {
                AgentRole::Routa => Ok(PLAN.to_string()),
                AgentRole::Crafter => Ok("done".to_string()),
                AgentRole::Gate => {
                    let attempt = self.gate_attempts.fetch_add(1, Ordering::SeqCst);
                    if attempt < self.fail_first_n_gate_calls {
                        Err(RoutaError::Transient("gate subprocess hiccup".to_string()))
                    } else {
                        Ok("APPROVED".to_string())
                    }
                }
            }
        }
        async fn is_healthy(&self, _agent_id: &str) -> bool {
            true
        }
        async fn interrupt(&self, _agent_id: &str) {}
        async fn cleanup(&self, _agent_id: &str) {}
        async fn shutdown(&self) {}
        fn capabilities(&self) -> ProviderCapabilities {
            self.caps.clone()
        }
    }

    #[tokio::test]
    async fn gate_stage_retries_once_then_succeeds() {
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryAgentStore::new()),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(FlakyGateProvider { gate_attempts: AtomicU32::new(0), fail_first_n_gate_calls: 1, caps: full_caps() }),
            OrchestratorConfig { max_waves: 3, ..Default::default() },
        );
        let phases = Arc::new(StdMutex::new(Vec::new()));
        let result = orchestrator.execute(options(phases)).await;
        assert!(matches!(result, OrchestratorResult::Success { .. }));
    }

    #[tokio::test]
    async fn gate_stage_exhausts_retry_policy_as_pipeline_failure() {
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryAgentStore::new()),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(FlakyGateProvider { gate_attempts: AtomicU32::new(0), fail_first_n_gate_calls: 100, caps: full_caps() }),
            OrchestratorConfig { max_waves: 3, ..Default::default() },
        );
        let phases = Arc::new(StdMutex::new(Vec::new()));
        let result = orchestrator.execute(options(phases)).await;
        match result {
            OrchestratorResult::Failed { error } => assert!(error.contains("pipeline failure in stage gate-verification")),
            other => panic!("expected Failed, got {other:?}"),
        }
    }
}
