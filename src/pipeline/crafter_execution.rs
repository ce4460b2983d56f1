//! S3 CrafterExecution (§4.8): creates one CRAFTER per ready task and runs
//! them sequentially or fanned out, bounded by `tokio::task::JoinSet` when
//! `parallelCrafters` is set — no extra concurrency crate needed beyond the
//! existing full-featured `tokio` dependency.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{Phase, PipelineContext, StageResult};
use crate::models::{Agent, AgentRole, Task, TaskStatus};

#[instrument(name = "stage_crafter_execution", skip(ctx))]
pub async fn run_crafter_execution(ctx: &Arc<PipelineContext>) -> StageResult {
    if let Err(e) = ctx.ensure_active() {
        return StageResult::Failed(e);
    }

    let wave = {
        let mut wave_number = ctx.wave_number.write().await;
        *wave_number += 1;
        *wave_number
    };
    ctx.coordinator.record_wave(wave).await;
    ctx.emit_phase(Phase::WaveStarting(wave));

    let ready = match ctx.tasks.find_ready_tasks(&ctx.workspace_id).await {
        Ok(tasks) => tasks,
        Err(e) => return StageResult::Failed(e),
    };

    if ready.is_empty() {
        let all_tasks = match ctx.tasks.list_by_workspace(&ctx.workspace_id).await {
            Ok(tasks) => tasks,
            Err(e) => return StageResult::Failed(e),
        };
        let all_completed = !all_tasks.is_empty() && all_tasks.iter().all(|t| t.status == TaskStatus::Completed);
        if all_completed {
            ctx.emit_phase(Phase::Completed);
            let summaries = match ctx.coordinator.get_task_summary().await {
                Ok(summaries) => summaries.into_iter().map(Into::into).collect(),
                Err(e) => return StageResult::Failed(e),
            };
            let plan_output = ctx.plan_output.read().await.clone();
            return StageResult::SkipRemaining(super::OrchestratorResult::Success {
                task_summaries: summaries,
                plan_output,
            });
        }
        return StageResult::Continue;
    }

    if ctx.parallel_crafters {
        let mut join_set = JoinSet::new();
        for task in ready {
            let ctx = ctx.clone();
            join_set.spawn(async move { execute_one(&ctx, task).await });
        }
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%e, "crafter task execution failed"),
                Err(e) => warn!(%e, "crafter task panicked"),
            }
        }
    } else {
        for task in ready {
            if let Err(e) = execute_one(ctx, task).await {
                warn!(%e, "crafter task execution failed");
            }
        }
    }

    ctx.emit_phase(Phase::WaveComplete(wave));
    StageResult::Continue
}

async fn execute_one(ctx: &PipelineContext, task: Task) -> crate::error::Result<()> {
    let routa_agent_id = ctx.routa_agent_id.read().await.clone();
    let name = crafter_name_from_title(&task.title);
    let specialist = crate::coordinator::SpecialistConfig::for_role(AgentRole::Crafter);

    let agent = Agent::new(
        Uuid::new_v4().to_string(),
        name,
        AgentRole::Crafter,
        ctx.workspace_id.clone(),
        Some(routa_agent_id.clone()),
        specialist.default_model_tier,
    );
    ctx.agents.save(agent.clone()).await?;

    let mut assigned_task = task.clone();
    assigned_task.status = TaskStatus::InProgress;
    assigned_task.assigned_to = Some(agent.id.clone());
    ctx.agents.update_status(&agent.id, crate::models::AgentStatus::Active).await?;

    let prompt = crate::coordinator::build_task_prompt(&specialist, &agent.id, &routa_agent_id, &task);

    let outcome = ctx.tasks.save(assigned_task).await;
    if let Err(e) = outcome {
        return Err(e);
    }

    ctx.delegations.write().await.push((agent.id.clone(), task.id.clone()));

    match ctx.provider.run_streaming(AgentRole::Crafter, &agent.id, &prompt, ctx.stream_sink()).await {
        Ok(_output) => {
            ctx.tasks.update_status(&task.id, TaskStatus::ReviewRequired).await?;
            Ok(())
        }
        Err(e) => {
            ctx.tasks.update_status(&task.id, TaskStatus::NeedsFix).await?;
            Err(e)
        }
    }
}

fn crafter_name_from_title(title: &str) -> String {
    let mut name = String::new();
    for ch in title.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch);
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    name.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafter_name_derivation_matches_tool_surface() {
        assert_eq!(crafter_name_from_title("Add greet()"), "add-greet");
    }
}
