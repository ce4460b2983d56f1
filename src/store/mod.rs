//! Pluggable persistence contracts (§3 Ownership, §4.1).
//!
//! Stores own their entities; every read returns a deep copy so concurrent
//! readers (event subscribers, UI) never observe a write in progress and
//! never need a lock of their own. The reference implementation here is
//! in-memory; a persistent backend only needs to satisfy these traits.

mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Agent, AgentRole, AgentStatus, Message, Task, TaskStatus};

pub use memory::{InMemoryAgentStore, InMemoryConversationStore, InMemoryTaskStore};

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn save(&self, agent: Agent) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Agent>>;
    async fn list_by_workspace(&self, workspace_id: &str) -> Result<Vec<Agent>>;
    async fn list_by_parent(&self, parent_id: &str) -> Result<Vec<Agent>>;
    async fn list_by_role(&self, workspace_id: &str, role: AgentRole) -> Result<Vec<Agent>>;
    async fn list_by_status(&self, workspace_id: &str, status: AgentStatus) -> Result<Vec<Agent>>;
    async fn update_status(&self, id: &str, status: AgentStatus) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: Task) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Task>>;
    async fn list_by_workspace(&self, workspace_id: &str) -> Result<Vec<Task>>;
    async fn list_by_status(&self, workspace_id: &str, status: TaskStatus) -> Result<Vec<Task>>;
    async fn list_by_assignee(&self, agent_id: &str) -> Result<Vec<Task>>;
    /// Tasks whose status is PENDING/NEEDS_FIX and whose dependencies are
    /// all COMPLETED (§8 property 4).
    async fn find_ready_tasks(&self, workspace_id: &str) -> Result<Vec<Task>>;
    async fn update_status(&self, id: &str, status: TaskStatus) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, message: Message) -> Result<()>;
    async fn get_conversation(&self, agent_id: &str) -> Result<Vec<Message>>;
    async fn get_last_n(&self, agent_id: &str, n: usize) -> Result<Vec<Message>>;
    async fn get_by_turn_range(
        &self,
        agent_id: &str,
        start_turn: u64,
        end_turn: u64,
    ) -> Result<Vec<Message>>;
    async fn get_message_count(&self, agent_id: &str) -> Result<usize>;
    async fn delete_conversation(&self, agent_id: &str) -> Result<()>;
}
