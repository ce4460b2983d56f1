use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AgentStore, ConversationStore, TaskStore};
use crate::error::Result;
use crate::models::{Agent, AgentRole, AgentStatus, Message, Task, TaskStatus};

/// In-memory [`AgentStore`]. Guards a map from id to entity; every getter
/// clones out of the lock so callers never hold a reference into it.
#[derive(Default, Clone)]
pub struct InMemoryAgentStore {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn save(&self, agent: Agent) -> Result<()> {
        self.agents.write().await.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Agent>> {
        Ok(self.agents.read().await.get(id).cloned())
    }

    async fn list_by_workspace(&self, workspace_id: &str) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn list_by_parent(&self, parent_id: &str) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn list_by_role(&self, workspace_id: &str, role: AgentRole) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.workspace_id == workspace_id && a.role == role)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, workspace_id: &str, status: AgentStatus) -> Result<Vec<Agent>> {
        Ok(self
            .agents
            .read()
            .await
            .values()
            .filter(|a| a.workspace_id == workspace_id && a.status == status)
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: &str, status: AgentStatus) -> Result<()> {
        let mut agents = self.agents.write().await;
        if let Some(agent) = agents.get_mut(id) {
            agent.status = status;
            agent.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.agents.write().await.remove(id);
        Ok(())
    }
}

/// In-memory [`TaskStore`].
#[derive(Default, Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<RwLock<HashMap<String, Task>>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: Task) -> Result<()> {
        self.tasks.write().await.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn list_by_workspace(&self, workspace_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn list_by_status(&self, workspace_id: &str, status: TaskStatus) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.workspace_id == workspace_id && t.status == status)
            .cloned()
            .collect())
    }

    async fn list_by_assignee(&self, agent_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.assigned_to.as_deref() == Some(agent_id))
            .cloned()
            .collect())
    }

    async fn find_ready_tasks(&self, workspace_id: &str) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let completed_ids: std::collections::HashSet<String> = tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id && t.status == TaskStatus::Completed)
            .map(|t| t.id.clone())
            .collect();
        Ok(tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id && t.is_ready(&completed_ids))
            .cloned()
            .collect())
    }

    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(id) {
            task.status = status;
            task.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.tasks.write().await.remove(id);
        Ok(())
    }
}

/// In-memory [`ConversationStore`]; one append-ordered vector per agent.
#[derive(Default, Clone)]
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, message: Message) -> Result<()> {
        self.conversations
            .write()
            .await
            .entry(message.agent_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn get_conversation(&self, agent_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .conversations
            .read()
            .await
            .get(agent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_last_n(&self, agent_id: &str, n: usize) -> Result<Vec<Message>> {
        let conversations = self.conversations.read().await;
        let messages = conversations.get(agent_id).map(|v| v.as_slice()).unwrap_or(&[]);
        let start = messages.len().saturating_sub(n);
        Ok(messages[start..].to_vec())
    }

    async fn get_by_turn_range(
        &self,
        agent_id: &str,
        start_turn: u64,
        end_turn: u64,
    ) -> Result<Vec<Message>> {
        Ok(self
            .conversations
            .read()
            .await
            .get(agent_id)
            .map(|msgs| {
                msgs.iter()
                    .filter(|m| matches!(m.turn, Some(t) if t >= start_turn && t <= end_turn))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_message_count(&self, agent_id: &str) -> Result<usize> {
        Ok(self
            .conversations
            .read()
            .await
            .get(agent_id)
            .map(|v| v.len())
            .unwrap_or(0))
    }

    async fn delete_conversation(&self, agent_id: &str) -> Result<()> {
        self.conversations.write().await.remove(agent_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Agent, AgentRole, ModelTier, MessageRole};

    #[tokio::test]
    async fn agent_store_roundtrips_and_filters() {
        let store = InMemoryAgentStore::new();
        let agent = Agent::new(
            "a1".into(),
            "routa-main".into(),
            AgentRole::Routa,
            "ws1".into(),
            None,
            ModelTier::Smart,
        );
        store.save(agent.clone()).await.unwrap();

        assert_eq!(store.get("a1").await.unwrap().unwrap().name, "routa-main");
        assert_eq!(store.list_by_workspace("ws1").await.unwrap().len(), 1);
        assert_eq!(store.list_by_workspace("ws2").await.unwrap().len(), 0);
        assert_eq!(
            store
                .list_by_role("ws1", AgentRole::Routa)
                .await
                .unwrap()
                .len(),
            1
        );

        store.update_status("a1", AgentStatus::Active).await.unwrap();
        assert_eq!(store.get("a1").await.unwrap().unwrap().status, AgentStatus::Active);

        store.delete("a1").await.unwrap();
        assert!(store.get("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_workspace_returns_empty_not_error() {
        let store = InMemoryTaskStore::new();
        assert!(store.list_by_workspace("nope").await.unwrap().is_empty());
        assert!(store.find_ready_tasks("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_ready_tasks_respects_dependencies() {
        let store = InMemoryTaskStore::new();
        let mut done = Task::new("t1".into(), "ws1".into());
        done.status = TaskStatus::Completed;
        let mut blocked = Task::new("t2".into(), "ws1".into());
        blocked.dependencies = vec!["t3".into()];
        let mut ready = Task::new("t3".into(), "ws1".into());
        ready.dependencies = vec!["t1".into()];

        store.save(done).await.unwrap();
        store.save(blocked).await.unwrap();
        store.save(ready).await.unwrap();

        let ready_tasks = store.find_ready_tasks("ws1").await.unwrap();
        let ids: Vec<_> = ready_tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t3"]);
    }

    #[tokio::test]
    async fn conversation_store_is_append_ordered() {
        let store = InMemoryConversationStore::new();
        for i in 0..3u64 {
            store
                .append(
                    Message::new("m".into(), "a1".into(), MessageRole::User, format!("turn {i}"))
                        .with_turn(i),
                )
                .await
                .unwrap();
        }
        let conversation = store.get_conversation("a1").await.unwrap();
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[0].content, "turn 0");
        assert_eq!(conversation[2].content, "turn 2");

        let last_two = store.get_last_n("a1", 2).await.unwrap();
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "turn 1");
    }
}
