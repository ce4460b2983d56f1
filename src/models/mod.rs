//! Core data model (§3): agents, tasks, conversation messages, reports,
//! coordination state, and domain events. Every entity here is plain data;
//! the stores in [`crate::store`] own storage and the tools in
//! [`crate::tools`] own the side-effecting operations on it.

mod agent;
mod coordination;
mod event;
mod message;
mod report;
mod task;

pub use agent::{Agent, AgentRole, AgentStatus, ModelTier};
pub use coordination::{CoordinationPhase, CoordinationState};
pub use event::{AgentEvent, AgentEventType};
pub use message::{Message, MessageRole};
pub use report::{CompletionReport, Verdict, VerificationVerdict};
pub use task::{Task, TaskStatus};
