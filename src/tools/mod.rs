//! The coordination tool surface (§4.5): 12-15 side-effecting operations
//! invoked by agents, also re-exported verbatim as the MCP tool surface
//! (§6). Every tool returns a [`ToolResult`] instead of propagating
//! [`crate::error::RoutaError`] — tool failures are reported in-band so a
//! misbehaving agent call never aborts the stage that invoked it (§7).

mod result;

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

pub use result::ToolResult;

use crate::events::{EventBus, SubscriptionFilter};
use crate::models::{
    Agent, AgentEventType, AgentRole, AgentStatus, CompletionReport, MessageRole, ModelTier,
    Task, TaskStatus,
};
use crate::models::Message;
use crate::store::{AgentStore, ConversationStore, TaskStore};
use crate::validation::resolve_safely;

/// Bundles the stores and event bus every coordination tool operates
/// against, plus the workspace root file tools are sandboxed to.
#[derive(Clone)]
pub struct CoordinationTools {
    pub agents: Arc<dyn AgentStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub events: EventBus,
    pub workspace_root: PathBuf,
}

impl CoordinationTools {
    pub fn new(
        agents: Arc<dyn AgentStore>,
        tasks: Arc<dyn TaskStore>,
        conversations: Arc<dyn ConversationStore>,
        events: EventBus,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            agents,
            tasks,
            conversations,
            events,
            workspace_root,
        }
    }

    /// Tool 1.
    pub async fn list_agents(&self, workspace_id: &str) -> ToolResult {
        match self.agents.list_by_workspace(workspace_id).await {
            Ok(agents) => ToolResult::success(json!(agents
                .iter()
                .map(|a| json!({
                    "id": a.id, "name": a.name, "role": a.role.as_str(),
                    "status": a.status, "parentId": a.parent_id,
                }))
                .collect::<Vec<_>>())),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    /// Tool 2.
    pub async fn read_agent_conversation(
        &self,
        agent_id: &str,
        last_n: Option<usize>,
        turn_range: Option<(u64, u64)>,
        include_tool_calls: bool,
    ) -> ToolResult {
        let messages = match (last_n, turn_range) {
            (Some(n), _) => self.conversations.get_last_n(agent_id, n).await,
            (None, Some((start, end))) => {
                self.conversations.get_by_turn_range(agent_id, start, end).await
            }
            (None, None) => self.conversations.get_conversation(agent_id).await,
        };
        match messages {
            Ok(messages) => {
                let filtered: Vec<_> = messages
                    .into_iter()
                    .filter(|m| include_tool_calls || m.role != MessageRole::Tool)
                    .collect();
                ToolResult::success(json!(filtered))
            }
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    /// Tool 3. Emits AGENT_CREATED.
    pub async fn create_agent(
        &self,
        name: &str,
        role: AgentRole,
        workspace_id: &str,
        parent_id: Option<String>,
        model_tier: ModelTier,
        caller_role: AgentRole,
    ) -> ToolResult {
        if caller_role == AgentRole::Crafter {
            return ToolResult::error("CRAFTER may not call create_agent");
        }
        let agent = Agent::new(
            Uuid::new_v4().to_string(),
            name.to_string(),
            role,
            workspace_id.to_string(),
            parent_id,
            model_tier,
        );
        if let Err(e) = self.agents.save(agent.clone()).await {
            return ToolResult::error(e.to_string());
        }
        self.events
            .emit(crate::models::AgentEvent::new(
                AgentEventType::AgentCreated,
                agent.id.clone(),
                workspace_id,
                json!({ "role": agent.role.as_str() }),
            ))
            .await;
        ToolResult::success(json!({ "id": agent.id }))
    }

    /// Tool 4. Emits TASK_ASSIGNED.
    pub async fn delegate_task(
        &self,
        agent_id: &str,
        task_id: &str,
        caller_agent_id: &str,
        caller_role: AgentRole,
    ) -> ToolResult {
        if caller_role == AgentRole::Crafter {
            return ToolResult::error("CRAFTER may not call delegate_task");
        }
        let agent = match self.agents.get(agent_id).await {
            Ok(Some(a)) => a,
            Ok(None) => return ToolResult::error(format!("unknown agent {agent_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let task = match self.tasks.get(task_id).await {
            Ok(Some(t)) => t,
            Ok(None) => return ToolResult::error(format!("unknown task {task_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut task = task;
        task.status = TaskStatus::InProgress;
        task.assigned_to = Some(agent_id.to_string());
        if let Err(e) = self.tasks.save(task.clone()).await {
            return ToolResult::error(e.to_string());
        }
        if let Err(e) = self.agents.update_status(agent_id, AgentStatus::Active).await {
            return ToolResult::error(e.to_string());
        }
        let _ = self
            .conversations
            .append(Message::new(
                Uuid::new_v4().to_string(),
                agent_id.to_string(),
                MessageRole::User,
                format!(
                    "Task delegated: {}\nObjective: {}",
                    task.title, task.objective
                ),
            ))
            .await;
        let _ = caller_agent_id;
        self.events
            .emit(crate::models::AgentEvent::new(
                AgentEventType::TaskAssigned,
                agent_id,
                agent.workspace_id.clone(),
                json!({ "taskId": task_id }),
            ))
            .await;
        ToolResult::success(json!({ "taskId": task_id, "agentId": agent_id }))
    }

    /// Tool 5. Emits MESSAGE_SENT.
    pub async fn send_message_to_agent(
        &self,
        from_agent_id: &str,
        to_agent_id: &str,
        message: &str,
    ) -> ToolResult {
        let recipient = match self.agents.get(to_agent_id).await {
            Ok(Some(a)) => a,
            Ok(None) => return ToolResult::error(format!("unknown agent {to_agent_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        if let Err(e) = self
            .conversations
            .append(Message::new(
                Uuid::new_v4().to_string(),
                to_agent_id.to_string(),
                MessageRole::User,
                format!("[From agent {from_agent_id}]: {message}"),
            ))
            .await
        {
            return ToolResult::error(e.to_string());
        }
        self.events
            .emit(crate::models::AgentEvent::new(
                AgentEventType::MessageSent,
                from_agent_id,
                recipient.workspace_id,
                json!({ "to": to_agent_id }),
            ))
            .await;
        ToolResult::success(json!({ "delivered": true }))
    }

    /// Tool 6. Emits REPORT_SUBMITTED.
    pub async fn report_to_parent(&self, agent_id: &str, report: CompletionReport) -> ToolResult {
        let agent = match self.agents.get(agent_id).await {
            Ok(Some(a)) => a,
            Ok(None) => return ToolResult::error(format!("unknown agent {agent_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let Some(parent_id) = agent.parent_id.clone() else {
            return ToolResult::error("agent has no parent");
        };

        let new_status = if report.success {
            TaskStatus::Completed
        } else {
            TaskStatus::NeedsFix
        };
        if let Ok(Some(mut task)) = self.tasks.get(&report.task_id).await {
            task.status = new_status;
            task.completion_summary = Some(report.summary.clone());
            if let Err(e) = self.tasks.save(task).await {
                return ToolResult::error(e.to_string());
            }
        }
        if let Err(e) = self.agents.update_status(agent_id, AgentStatus::Completed).await {
            return ToolResult::error(e.to_string());
        }

        let files = report
            .files_modified
            .as_ref()
            .map(|f| f.join(", "))
            .unwrap_or_default();
        let body = format!(
            "[Completion Report from {} ({})]\nTask: {}\nSuccess: {}\nSummary: {}\nFiles Modified: {}",
            agent.name, agent.id, report.task_id, report.success, report.summary, files
        );
        if let Err(e) = self
            .conversations
            .append(Message::new(
                Uuid::new_v4().to_string(),
                parent_id.clone(),
                MessageRole::User,
                body,
            ))
            .await
        {
            return ToolResult::error(e.to_string());
        }

        self.events
            .emit(crate::models::AgentEvent::new(
                AgentEventType::ReportSubmitted,
                agent_id,
                agent.workspace_id,
                json!({ "taskId": report.task_id, "success": report.success }),
            ))
            .await;
        ToolResult::success(json!({ "acknowledged": true }))
    }

    /// Tool 7.
    pub async fn wake_or_create_task_agent(
        &self,
        task_id: &str,
        context_message: &str,
        caller_agent_id: &str,
        workspace_id: &str,
        agent_name: Option<String>,
        model_tier: ModelTier,
    ) -> ToolResult {
        let task = match self.tasks.get(task_id).await {
            Ok(Some(t)) => t,
            Ok(None) => return ToolResult::error(format!("unknown task {task_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let agent_id = if let Some(existing) = task.assigned_to.clone() {
            match self.agents.get(&existing).await {
                Ok(Some(agent))
                    if !matches!(agent.status, AgentStatus::Completed | AgentStatus::Error) =>
                {
                    let _ = self.agents.update_status(&existing, AgentStatus::Active).await;
                    existing
                }
                _ => {
                    self.spawn_crafter_and_delegate(
                        &task, agent_name, caller_agent_id, workspace_id, model_tier,
                    )
                    .await
                }
            }
        } else {
            self.spawn_crafter_and_delegate(
                &task, agent_name, caller_agent_id, workspace_id, model_tier,
            )
            .await
        };

        let _ = self
            .conversations
            .append(Message::new(
                Uuid::new_v4().to_string(),
                agent_id.clone(),
                MessageRole::User,
                context_message.to_string(),
            ))
            .await;
        ToolResult::success(json!({ "agentId": agent_id }))
    }

    async fn spawn_crafter_and_delegate(
        &self,
        task: &Task,
        agent_name: Option<String>,
        caller_agent_id: &str,
        workspace_id: &str,
        model_tier: ModelTier,
    ) -> String {
        let name = agent_name.unwrap_or_else(|| crafter_name_from_title(&task.title));
        let agent = Agent::new(
            Uuid::new_v4().to_string(),
            name,
            AgentRole::Crafter,
            workspace_id.to_string(),
            Some(caller_agent_id.to_string()),
            model_tier,
        );
        let _ = self.agents.save(agent.clone()).await;
        let _ = self
            .delegate_task(&agent.id, &task.id, caller_agent_id, AgentRole::Routa)
            .await;
        agent.id
    }

    /// Tool 8.
    pub async fn send_message_to_task_agent(
        &self,
        task_id: &str,
        message: &str,
        caller_agent_id: &str,
    ) -> ToolResult {
        let task = match self.tasks.get(task_id).await {
            Ok(Some(t)) => t,
            Ok(None) => return ToolResult::error(format!("unknown task {task_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let Some(assignee) = task.assigned_to else {
            return ToolResult::error("task is unassigned");
        };
        self.send_message_to_agent(caller_agent_id, &assignee, message).await
    }

    /// Tool 9.
    pub async fn get_agent_status(&self, agent_id: &str) -> ToolResult {
        let agent = match self.agents.get(agent_id).await {
            Ok(Some(a)) => a,
            Ok(None) => return ToolResult::error(format!("unknown agent {agent_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let message_count = self.conversations.get_message_count(agent_id).await.unwrap_or(0);
        let tasks = self.tasks.list_by_assignee(agent_id).await.unwrap_or_default();
        ToolResult::success(json!({
            "name": agent.name,
            "role": agent.role.as_str(),
            "status": agent.status,
            "modelTier": agent.model_tier,
            "parentId": agent.parent_id,
            "messageCount": message_count,
            "tasks": tasks.iter().map(|t| &t.title).collect::<Vec<_>>(),
        }))
    }

    /// Tool 10.
    pub async fn get_agent_summary(&self, agent_id: &str) -> ToolResult {
        let agent = match self.agents.get(agent_id).await {
            Ok(Some(a)) => a,
            Ok(None) => return ToolResult::error(format!("unknown agent {agent_id}")),
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let messages = self.conversations.get_conversation(agent_id).await.unwrap_or_default();
        let last_assistant = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| truncate(&m.content, crate::constants::AGENT_SUMMARY_TRUNCATE_LEN))
            .unwrap_or_default();
        let tool_call_count = messages.iter().filter(|m| m.role == MessageRole::Tool).count();
        let active_tasks = self.tasks.list_by_assignee(agent_id).await.unwrap_or_default();
        ToolResult::success(json!({
            "status": agent.status,
            "lastResponse": last_assistant,
            "toolCallCount": tool_call_count,
            "activeTasks": active_tasks.iter().map(|t| &t.title).collect::<Vec<_>>(),
        }))
    }

    /// Tool 11.
    pub async fn subscribe_to_events(
        &self,
        agent_id: &str,
        agent_name: &str,
        event_types: Vec<AgentEventType>,
        exclude_self: bool,
    ) -> ToolResult {
        let subscription_id = self
            .events
            .subscribe(SubscriptionFilter {
                agent_id: agent_id.to_string(),
                agent_name: agent_name.to_string(),
                event_types,
                exclude_self,
            })
            .await;
        ToolResult::success(json!({ "subscriptionId": subscription_id }))
    }

    /// Tool 12.
    pub async fn unsubscribe_from_events(&self, subscription_id: &str) -> ToolResult {
        ToolResult::success(json!(self.events.unsubscribe(subscription_id).await))
    }

    /// Tool 13.
    pub async fn read_file(&self, path: &str) -> ToolResult {
        let resolved = match resolve_safely(&self.workspace_root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => ToolResult::success(json!({ "content": content })),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    /// Tool 14.
    pub async fn list_files(&self, path: &str) -> ToolResult {
        let resolved = match resolve_safely(&self.workspace_root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&resolved).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => entries.push(entry.file_name().to_string_lossy().to_string()),
                Ok(None) => break,
                Err(e) => return ToolResult::error(e.to_string()),
            }
        }
        ToolResult::success(json!(entries))
    }

    /// Tool 15.
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        caller_role: AgentRole,
    ) -> ToolResult {
        if matches!(caller_role, AgentRole::Routa | AgentRole::Gate) {
            return ToolResult::error(format!("{} may not call write_file", caller_role.as_str()));
        }
        let resolved = match resolve_safely(&self.workspace_root, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(e.to_string());
            }
        }
        match tokio::fs::write(&resolved, content).await {
            Ok(()) => ToolResult::success(json!({ "written": true })),
            Err(e) => ToolResult::error(e.to_string()),
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

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryAgentStore, InMemoryConversationStore, InMemoryTaskStore};

    fn tools(workspace_root: PathBuf) -> CoordinationTools {
        CoordinationTools::new(
            Arc::new(InMemoryAgentStore::new()),
            Arc::new(InMemoryTaskStore::new()),
            Arc::new(InMemoryConversationStore::new()),
            EventBus::new(),
            workspace_root,
        )
    }

    #[tokio::test]
    async fn create_agent_rejects_crafter_caller() {
        let tools = tools(PathBuf::from("/tmp/ws"));
        let result = tools
            .create_agent(
                "sub-agent",
                AgentRole::Crafter,
                "ws1",
                None,
                ModelTier::Fast,
                AgentRole::Crafter,
            )
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn delegate_task_fails_for_unknown_ids() {
        let tools = tools(PathBuf::from("/tmp/ws"));
        let result = tools
            .delegate_task("missing-agent", "missing-task", "caller", AgentRole::Routa)
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn report_to_parent_completes_task_and_notifies_parent() {
        let tools = tools(PathBuf::from("/tmp/ws"));
        let parent = Agent::new(
            "parent".into(), "routa-main".into(), AgentRole::Routa, "ws1".into(), None,
            ModelTier::Smart,
        );
        tools.agents.save(parent).await.unwrap();
        let child = Agent::new(
            "child".into(), "crafter-1".into(), AgentRole::Crafter, "ws1".into(),
            Some("parent".into()), ModelTier::Fast,
        );
        tools.agents.save(child).await.unwrap();
        let mut task = Task::new("task1".into(), "ws1".into());
        task.status = TaskStatus::ReviewRequired;
        task.assigned_to = Some("child".into());
        tools.tasks.save(task).await.unwrap();

        let result = tools
            .report_to_parent(
                "child",
                CompletionReport {
                    agent_id: "child".into(),
                    task_id: "task1".into(),
                    summary: "done".into(),
                    files_modified: Some(vec!["src/lib.rs".into()]),
                    verification_results: None,
                    success: true,
                },
            )
            .await;
        assert!(result.success);

        let updated = tools.tasks.get("task1").await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Completed);
        let child_agent = tools.agents.get("child").await.unwrap().unwrap();
        assert_eq!(child_agent.status, AgentStatus::Completed);
        let parent_conversation = tools.conversations.get_conversation("parent").await.unwrap();
        assert_eq!(parent_conversation.len(), 1);
        assert!(parent_conversation[0].content.contains("task1"));
    }

    #[tokio::test]
    async fn write_file_rejects_routa_and_gate() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools(dir.path().to_path_buf());
        let routa_result = tools.write_file("out.txt", "hi", AgentRole::Routa).await;
        assert!(!routa_result.success);
        let gate_result = tools.write_file("out.txt", "hi", AgentRole::Gate).await;
        assert!(!gate_result.success);
        let crafter_result = tools.write_file("out.txt", "hi", AgentRole::Crafter).await;
        assert!(crafter_result.success);
    }

    #[tokio::test]
    async fn read_file_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let tools = tools(dir.path().to_path_buf());
        let result = tools.read_file("../../../etc/passwd").await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Access denied — path outside workspace"));
    }

    #[test]
    fn crafter_name_derivation_is_slug_like() {
        assert_eq!(crafter_name_from_title("Add greet()"), "add-greet");
        assert_eq!(crafter_name_from_title("Fix bug #42!"), "fix-bug-42");
    }
}
