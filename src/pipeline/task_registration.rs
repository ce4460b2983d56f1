//! S2 TaskRegistration (§4.8).

use tracing::instrument;

use super::{OrchestratorResult, Phase, PipelineContext, StageResult};
use crate::parser::parse_tasks;

#[instrument(name = "stage_task_registration", skip(ctx))]
pub async fn run_task_registration(ctx: &PipelineContext) -> StageResult {
    if let Err(e) = ctx.ensure_active() {
        return StageResult::Failed(e);
    }

    let plan_output = ctx.plan_output.read().await.clone();
    let tasks = parse_tasks(&plan_output, &ctx.workspace_id);

    if tasks.is_empty() {
        return StageResult::Done(OrchestratorResult::NoTasks { plan_output });
    }

    let mut ids = Vec::with_capacity(tasks.len());
    for task in tasks {
        ids.push(task.id.clone());
        if let Err(e) = ctx.tasks.save(task).await {
            return StageResult::Failed(e);
        }
    }

    let count = ids.len();
    *ctx.task_ids.write().await = ids.clone();
    ctx.coordinator.set_task_ids(ids).await;
    ctx.emit_phase(Phase::TasksRegistered(count));
    StageResult::Continue
}
