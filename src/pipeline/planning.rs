//! S1 Planning (§4.8).

use tracing::instrument;

use super::{Phase, PipelineContext, StageResult};
use crate::models::AgentRole;

const MINIMAL_PLAN_INSTRUCTION: &str =
    "Output one or more @@@task ... @@@ blocks describing the work needed to satisfy the request below. Nothing else.";

#[instrument(name = "stage_planning", skip(ctx))]
pub async fn run_planning(ctx: &PipelineContext) -> StageResult {
    ctx.emit_phase(Phase::Planning);
    if let Err(e) = ctx.ensure_active() {
        return StageResult::Failed(e);
    }

    let routa_agent_id = match ctx.coordinator.initialize(&ctx.workspace_id).await {
        Ok(id) => id,
        Err(e) => return StageResult::Failed(e),
    };
    *ctx.routa_agent_id.write().await = routa_agent_id.clone();

    let enhanced = ctx.metadata.read().await.get("planMode").map(String::as_str) != Some("minimal");
    let instruction = if enhanced {
        match ctx.coordinator.build_agent_context(&routa_agent_id).await {
            Ok(text) => text,
            Err(e) => return StageResult::Failed(e),
        }
    } else {
        MINIMAL_PLAN_INSTRUCTION.to_string()
    };

    let prompt = format!("{instruction}\n\n## User Request\n{}", ctx.user_request);

    let output = match ctx
        .provider
        .run_streaming(AgentRole::Routa, &routa_agent_id, &prompt, ctx.stream_sink())
        .await
    {
        Ok(output) => output,
        Err(e) => return StageResult::Failed(e),
    };

    *ctx.plan_output.write().await = output;
    ctx.emit_phase(Phase::PlanReady);
    StageResult::Continue
}
