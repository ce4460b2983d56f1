//! S4 GateVerification (§4.8/§4.9).

use tracing::instrument;

use super::{OrchestratorResult, Phase, PipelineContext, StageResult, STAGE_CRAFTER_EXECUTION};
use crate::constants::{GATE_CONTEXT_MESSAGE_COUNT, GATE_CONTEXT_MESSAGE_TRUNCATE_LEN};
use crate::models::{AgentRole, AgentStatus, CompletionReport, MessageRole, Task, TaskStatus, Verdict};
use crate::parser::parse_gate_verdicts;

#[instrument(name = "stage_gate_verification", skip(ctx))]
pub async fn run_gate_verification(ctx: &PipelineContext) -> StageResult {
    if let Err(e) = ctx.ensure_active() {
        return StageResult::Failed(e);
    }

    let wave = *ctx.wave_number.read().await;
    ctx.emit_phase(Phase::VerificationStarting(wave));

    let gate_agent_id = match ctx.coordinator.start_verification().await {
        Ok(Some(id)) => id,
        Ok(None) => {
            ctx.emit_phase(Phase::Completed);
            let summaries = match ctx.coordinator.get_task_summary().await {
                Ok(summaries) => summaries.into_iter().map(Into::into).collect(),
                Err(e) => return StageResult::Failed(e),
            };
            let plan_output = ctx.plan_output.read().await.clone();
            return StageResult::Done(OrchestratorResult::Success { task_summaries: summaries, plan_output });
        }
        Err(e) => return StageResult::Failed(e),
    };
    *ctx.gate_agent_id.write().await = Some(gate_agent_id.clone());

    let review_tasks = match ctx.tasks.list_by_status(&ctx.workspace_id, TaskStatus::ReviewRequired).await {
        Ok(tasks) => tasks,
        Err(e) => return StageResult::Failed(e),
    };

    let prompt = match build_gate_prompt(ctx, &review_tasks).await {
        Ok(prompt) => prompt,
        Err(e) => return StageResult::Failed(e),
    };

    let output = match ctx
        .provider
        .run_streaming(AgentRole::Gate, &gate_agent_id, &prompt, ctx.stream_sink())
        .await
    {
        Ok(output) => output,
        Err(e) => return StageResult::Failed(e),
    };

    let gate_agent = match ctx.agents.get(&gate_agent_id).await {
        Ok(Some(agent)) => agent,
        Ok(None) => return StageResult::Failed(crate::error::RoutaError::NotFound(gate_agent_id.clone())),
        Err(e) => return StageResult::Failed(e),
    };

    if gate_agent.status != AgentStatus::Completed {
        let verdicts = parse_gate_verdicts(&gate_agent_id, &output, &review_tasks);
        for task in &review_tasks {
            let (success, summary) = match verdicts.get(&task.id) {
                Some(v) => (v.verdict == Verdict::Approved, v.summary.clone()),
                None => (false, "No verdict parsed".to_string()),
            };
            let report = CompletionReport {
                agent_id: gate_agent_id.clone(),
                task_id: task.id.clone(),
                summary,
                files_modified: None,
                verification_results: None,
                success,
            };
            if let Err(e) = apply_verdict(ctx, &task.id, &report).await {
                return StageResult::Failed(e);
            }
        }
    }

    ctx.provider.cleanup(&gate_agent_id).await;
    ctx.emit_phase(Phase::VerificationCompleted { gate_agent_id: gate_agent_id.clone(), output });

    let all_tasks = match ctx.tasks.list_by_workspace(&ctx.workspace_id).await {
        Ok(tasks) => tasks,
        Err(e) => return StageResult::Failed(e),
    };

    if all_tasks.iter().all(|t| t.status == TaskStatus::Completed) {
        ctx.emit_phase(Phase::Completed);
        let summaries = match ctx.coordinator.get_task_summary().await {
            Ok(summaries) => summaries.into_iter().map(Into::into).collect(),
            Err(e) => return StageResult::Failed(e),
        };
        let plan_output = ctx.plan_output.read().await.clone();
        return StageResult::Done(OrchestratorResult::Success { task_summaries: summaries, plan_output });
    }

    let needs_fix: Vec<Task> = all_tasks.into_iter().filter(|t| t.status == TaskStatus::NeedsFix).collect();
    if !needs_fix.is_empty() {
        for mut task in needs_fix {
            task.status = TaskStatus::Pending;
            task.assigned_to = None;
            if let Err(e) = ctx.tasks.save(task).await {
                return StageResult::Failed(e);
            }
        }
        ctx.emit_phase(Phase::NeedsFix(wave));
        return StageResult::RepeatPipeline(Some(STAGE_CRAFTER_EXECUTION));
    }

    StageResult::Continue
}

/// Mirrors `report_to_parent`'s task/agent-status side effects (§4.5 tool 6)
/// without requiring GATE to have made the tool call itself.
async fn apply_verdict(ctx: &PipelineContext, task_id: &str, report: &CompletionReport) -> crate::error::Result<()> {
    let new_status = if report.success { TaskStatus::Completed } else { TaskStatus::NeedsFix };
    if let Some(mut task) = ctx.tasks.get(task_id).await? {
        task.status = new_status;
        task.completion_summary = Some(report.summary.clone());
        ctx.tasks.save(task).await?;
    }
    Ok(())
}

/// §4.9: per REVIEW_REQUIRED task — title, id, objective, acceptance
/// criteria, crafter summary, last N crafter messages truncated, and
/// verification commands. Closes with the fixed verification instruction.
async fn build_gate_prompt(ctx: &PipelineContext, review_tasks: &[Task]) -> crate::error::Result<String> {
    let mut prompt = String::from(crate::coordinator::GATE_SYSTEM_PROMPT);
    prompt.push_str("\n---\n\n");

    for task in review_tasks {
        prompt.push_str(&format!("# Task: {}\n**Task ID:** {}\n\n", task.title, task.id));
        prompt.push_str(&format!("## Objective\n{}\n", task.objective));
        if !task.acceptance_criteria.is_empty() {
            prompt.push_str("\n## Definition of Done\n");
            for item in &task.acceptance_criteria {
                prompt.push_str(&format!("- {item}\n"));
            }
        }
        if let Some(summary) = &task.completion_summary {
            prompt.push_str(&format!("\n## Crafter Summary\n{summary}\n"));
        }
        if let Some(agent_id) = &task.assigned_to {
            let messages = ctx.conversations.get_last_n(agent_id, GATE_CONTEXT_MESSAGE_COUNT).await?;
            if !messages.is_empty() {
                prompt.push_str("\n## Recent Crafter Messages\n");
                for message in messages.iter().filter(|m| m.role != MessageRole::Tool) {
                    prompt.push_str(&format!("- {}\n", truncate(&message.content, GATE_CONTEXT_MESSAGE_TRUNCATE_LEN)));
                }
            }
        }
        if !task.verification_commands.is_empty() {
            prompt.push_str("\n## Verification\n");
            for item in &task.verification_commands {
                prompt.push_str(&format!("- `{item}`\n"));
            }
        }
        prompt.push_str("\n---\n\n");
    }

    prompt.push_str("Verify each task against its Acceptance Criteria. Output APPROVED or NOT APPROVED per task, with evidence.");
    Ok(prompt)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}
