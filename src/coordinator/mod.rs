//! Coordinator (C9, §4.7): owns [`CoordinationState`], creates ROUTA/GATE
//! agents, and renders the per-role prompt text the pipeline stages hand to
//! providers. Role prompts live in one typed [`SpecialistConfig`] per role
//! instead of strings inlined ad hoc per call site, so they stay centrally
//! auditable.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, RoutaError};
use crate::models::{
    Agent, AgentRole, AgentStatus, CoordinationPhase, CoordinationState, ModelTier, Task,
    TaskStatus,
};
use crate::store::{AgentStore, TaskStore};

pub const ROUTA_SYSTEM_PROMPT: &str = r#"## Routa (Planner)

Turn the user's request into a concrete, reviewable plan. Break work into
tasks small enough for one Implementor to finish without touching files
outside their stated scope.

## Hard Rules
1. **Plan only** — never write files yourself; delegate implementation.
2. **One `@@@task` block per unit of work**, each with an Objective,
   Definition of Done, and Verification section.
3. **Dependencies are explicit** — if a task needs another task's output,
   say so; the registration step wires it up.
4. **Coordinate, don't duplicate** — check `list_agents` before creating a
   new Implementor for work already in flight.
"#;

pub const ROUTA_ROLE_REMINDER: &str =
    "You are the Planner. Never call write_file. Output @@@task blocks for every unit of work.";

pub const CRAFTER_SYSTEM_PROMPT: &str = r#"## Crafter (Implementor)

Implement your assigned task — nothing more, nothing less. Produce minimal,
clean changes.

## Hard Rules
1. **No scope creep** — only what the task asks.
2. **No refactors** — if one is needed, report it to your parent as a
   separate task instead of doing it inline.
3. **Coordinate** — check `list_agents`/`read_agent_conversation` to avoid
   colliding with a sibling Implementor.
4. **Don't delegate** — you may not call `create_agent` or `delegate_task`;
   message your parent if you are blocked.

## Completion (REQUIRED)
When done, call `report_to_parent` with a summary, `success`, the files you
modified, and the task id you were assigned.
"#;

pub const CRAFTER_ROLE_REMINDER: &str =
    "Stay within task scope. No refactors, no scope creep. Call report_to_parent when complete.";

pub const GATE_SYSTEM_PROMPT: &str = r#"## Gate (Verifier)

Verify each task's implementation against its own Acceptance Criteria. You
are evidence-driven: if you cannot point to concrete evidence, the criterion
is not verified.

## Hard Rules
1. **Acceptance Criteria is the checklist** — do not verify against vibes.
2. **No evidence, no verification** — mark a criterion unverified rather
   than assume it passed.
3. **No partial approvals** — a task is APPROVED only if every one of its
   criteria is verified; otherwise it is NOT APPROVED.
4. **Read-only** — you never call `write_file`.

## Completion (REQUIRED)
Output `APPROVED` or `NOT APPROVED` per task, with evidence, or call
`report_to_parent` per task if you are driving the tool-calling path.
"#;

pub const GATE_ROLE_REMINDER: &str =
    "Verify against Acceptance Criteria only. Be evidence-driven. Never call write_file.";

/// A role's prompt triple, rendered into agent context per role.
#[derive(Debug, Clone)]
pub struct SpecialistConfig {
    pub role: AgentRole,
    pub default_model_tier: ModelTier,
    pub system_prompt: &'static str,
    pub role_reminder: &'static str,
}

impl SpecialistConfig {
    pub fn for_role(role: AgentRole) -> Self {
        match role {
            AgentRole::Routa => Self {
                role,
                default_model_tier: ModelTier::Smart,
                system_prompt: ROUTA_SYSTEM_PROMPT,
                role_reminder: ROUTA_ROLE_REMINDER,
            },
            AgentRole::Crafter => Self {
                role,
                default_model_tier: ModelTier::Fast,
                system_prompt: CRAFTER_SYSTEM_PROMPT,
                role_reminder: CRAFTER_ROLE_REMINDER,
            },
            AgentRole::Gate => Self {
                role,
                default_model_tier: ModelTier::Smart,
                system_prompt: GATE_SYSTEM_PROMPT,
                role_reminder: GATE_ROLE_REMINDER,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub title: String,
    pub status: TaskStatus,
    pub summary: Option<String>,
}

/// Builds the delegation prompt for a task: system prompt, identity header,
/// task body, reminder, then the single-task scope closer.
pub fn build_task_prompt(specialist: &SpecialistConfig, agent_id: &str, parent_id: &str, task: &Task) -> String {
    let mut prompt = format!("{}\n\n---\n\n", specialist.system_prompt);
    prompt.push_str(&format!("**Your Agent ID:** {agent_id}\n"));
    prompt.push_str(&format!("**Your Parent Agent ID:** {parent_id}\n"));
    prompt.push_str(&format!("**Task ID:** {}\n\n", task.id));
    prompt.push_str(&format!("# Task: {}\n\n", task.title));
    prompt.push_str(&format!("## Objective\n{}\n", task.objective));

    if !task.scope.is_empty() {
        prompt.push_str("\n## Scope\n");
        for item in &task.scope {
            prompt.push_str(&format!("- {item}\n"));
        }
    }
    if !task.acceptance_criteria.is_empty() {
        prompt.push_str("\n## Definition of Done\n");
        for item in &task.acceptance_criteria {
            prompt.push_str(&format!("- {item}\n"));
        }
    }
    if !task.verification_commands.is_empty() {
        prompt.push_str("\n## Verification\n");
        for item in &task.verification_commands {
            prompt.push_str(&format!("- `{item}`\n"));
        }
    }

    prompt.push_str(&format!("\n---\n**Reminder:** {}\n", specialist.role_reminder));
    prompt.push_str("\n**Scope: complete THIS task only.** When done, call `report_to_parent` with your results.");
    prompt
}

/// Owns [`CoordinationState`] and the ROUTA/GATE lifecycle around it.
pub struct Coordinator {
    state: RwLock<CoordinationState>,
    agents: Arc<dyn AgentStore>,
    tasks: Arc<dyn TaskStore>,
}

impl Coordinator {
    pub fn new(agents: Arc<dyn AgentStore>, tasks: Arc<dyn TaskStore>, workspace_id: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(CoordinationState::new(workspace_id.into(), String::new())),
            agents,
            tasks,
        }
    }

    pub async fn state_snapshot(&self) -> CoordinationState {
        self.state.read().await.clone()
    }

    /// §4.7: creates exactly one ROUTA agent named `routa-main`, active, and
    /// moves the phase to PLANNING.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self, workspace_id: &str) -> Result<String> {
        let mut existing = self.agents.list_by_role(workspace_id, AgentRole::Routa).await?;
        if let Some(routa) = existing.pop() {
            let mut state = self.state.write().await;
            state.workspace_id = workspace_id.to_string();
            state.routa_agent_id = routa.id.clone();
            state.phase = CoordinationPhase::Planning;
            return Ok(routa.id);
        }

        let agent = Agent::new(
            Uuid::new_v4().to_string(),
            "routa-main".to_string(),
            AgentRole::Routa,
            workspace_id.to_string(),
            None,
            ModelTier::Smart,
        );
        self.agents.save(agent.clone()).await?;
        self.agents.update_status(&agent.id, AgentStatus::Active).await?;

        let mut state = self.state.write().await;
        state.workspace_id = workspace_id.to_string();
        state.routa_agent_id = agent.id.clone();
        state.phase = CoordinationPhase::Planning;
        info!(agent_id = %agent.id, "routa initialized");
        Ok(agent.id)
    }

    /// §4.7: role-specific context. ROUTA gets the system prompt plus a
    /// workspace task summary; CRAFTER/GATE callers should prefer
    /// [`build_task_prompt`] for their per-task prompt and use this only
    /// for the sibling-agent conflict-avoidance addendum.
    pub async fn build_agent_context(&self, agent_id: &str) -> Result<String> {
        let agent = self
            .agents
            .get(agent_id)
            .await?
            .ok_or_else(|| RoutaError::NotFound(format!("agent {agent_id}")))?;

        match agent.role {
            AgentRole::Routa => {
                let state = self.state.read().await;
                let summary = self.get_task_summary().await?;
                let mut text = format!("{ROUTA_SYSTEM_PROMPT}\n\n## Workspace: {}\n", state.workspace_id);
                for task in &summary {
                    text.push_str(&format!("- {} [{:?}]\n", task.title, task.status));
                }
                Ok(text)
            }
            AgentRole::Crafter => {
                let siblings = self.agents.list_by_workspace(&agent.workspace_id).await?;
                let mut text = String::from("## Active agents in this workspace (avoid overlapping work)\n");
                for sibling in siblings.into_iter().filter(|s| s.id != agent_id) {
                    text.push_str(&format!("- {} ({}) — {:?}\n", sibling.name, sibling.role.as_str(), sibling.status));
                }
                Ok(text)
            }
            AgentRole::Gate => Ok(GATE_SYSTEM_PROMPT.to_string()),
        }
    }

    /// §4.7: `null` if no task is REVIEW_REQUIRED; otherwise creates a GATE
    /// agent parented to ROUTA and returns its id.
    #[tracing::instrument(skip(self))]
    pub async fn start_verification(&self) -> Result<Option<String>> {
        let state = self.state.read().await;
        let workspace_id = state.workspace_id.clone();
        let routa_agent_id = state.routa_agent_id.clone();
        drop(state);

        let review_tasks = self.tasks.list_by_status(&workspace_id, TaskStatus::ReviewRequired).await?;
        if review_tasks.is_empty() {
            return Ok(None);
        }

        let agent = Agent::new(
            Uuid::new_v4().to_string(),
            "gate-main".to_string(),
            AgentRole::Gate,
            workspace_id,
            Some(routa_agent_id),
            ModelTier::Smart,
        );
        self.agents.save(agent.clone()).await?;
        self.agents.update_status(&agent.id, AgentStatus::Active).await?;

        let mut state = self.state.write().await;
        state.gate_agent_id = Some(agent.id.clone());
        state.phase = CoordinationPhase::Verifying;
        Ok(Some(agent.id))
    }

    /// §4.7: clears coordination state; stores are not purged.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let workspace_id = state.workspace_id.clone();
        *state = CoordinationState::new(workspace_id, String::new());
    }

    pub async fn get_task_summary(&self) -> Result<Vec<TaskSummary>> {
        let workspace_id = self.state.read().await.workspace_id.clone();
        let tasks = self.tasks.list_by_workspace(&workspace_id).await?;
        Ok(tasks
            .into_iter()
            .map(|t| TaskSummary {
                title: t.title,
                status: t.status,
                summary: t.completion_summary,
            })
            .collect())
    }

    pub async fn set_phase(&self, phase: CoordinationPhase) {
        self.state.write().await.phase = phase;
    }

    pub async fn set_task_ids(&self, ids: Vec<String>) {
        self.state.write().await.task_ids = ids;
    }

    pub async fn record_wave(&self, wave_number: u32) {
        self.state.write().await.wave_number = wave_number;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAgentStore, InMemoryTaskStore};

    fn coordinator() -> Coordinator {
        Coordinator::new(Arc::new(InMemoryAgentStore::new()), Arc::new(InMemoryTaskStore::new()), "ws1")
    }

    #[tokio::test]
    async fn initialize_creates_single_active_routa() {
        let coordinator = coordinator();
        let id = coordinator.initialize("ws1").await.unwrap();
        let agent = coordinator.agents.get(&id).await.unwrap().unwrap();
        assert_eq!(agent.role, AgentRole::Routa);
        assert_eq!(agent.status, AgentStatus::Active);
        assert_eq!(agent.name, "routa-main");

        let second_call = coordinator.initialize("ws1").await.unwrap();
        assert_eq!(second_call, id, "re-initializing reuses the existing ROUTA");
    }

    #[tokio::test]
    async fn start_verification_is_none_without_review_required_tasks() {
        let coordinator = coordinator();
        coordinator.initialize("ws1").await.unwrap();
        assert!(coordinator.start_verification().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_verification_creates_gate_parented_to_routa() {
        let coordinator = coordinator();
        let routa_id = coordinator.initialize("ws1").await.unwrap();
        let mut task = Task::new("t1".to_string(), "ws1".to_string());
        task.status = TaskStatus::ReviewRequired;
        coordinator.tasks.save(task).await.unwrap();

        let gate_id = coordinator.start_verification().await.unwrap().unwrap();
        let gate_agent = coordinator.agents.get(&gate_id).await.unwrap().unwrap();
        assert_eq!(gate_agent.role, AgentRole::Gate);
        assert_eq!(gate_agent.parent_id, Some(routa_id));
    }

    #[tokio::test]
    async fn build_agent_context_rejects_unknown_agent() {
        let coordinator = coordinator();
        let result = coordinator.build_agent_context("missing").await;
        assert!(matches!(result, Err(RoutaError::NotFound(_))));
    }

    #[tokio::test]
    async fn reset_clears_state_but_not_stores() {
        let coordinator = coordinator();
        coordinator.initialize("ws1").await.unwrap();
        coordinator.reset().await;
        let state = coordinator.state_snapshot().await;
        assert_eq!(state.routa_agent_id, "");
        assert!(coordinator.agents.list_by_workspace("ws1").await.unwrap().len() == 1);
    }
}
