//! Agent providers (C6): the uniform interface every backend (ACP
//! subprocess, tool-calling LLM) implements, the capability-based router
//! (C7) that dispatches a turn to the best-fit one, and the resilient
//! retry/circuit-breaker wrapper (C8) that can sit around any of them.

mod acp;
mod capability;
mod circuit_breaker;
mod llm;
mod resilient;
mod router;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::AgentRole;

pub use acp::{AcpProvider, AcpSessionConfig};
pub use capability::{mode_for_role, ProviderCapabilities, RequiredCapabilities};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
pub use llm::LlmProvider;
pub use resilient::ResilientProvider;
pub use router::CapabilityBasedRouter;

/// One chunk of a streamed provider turn (§4.6).
#[derive(Debug, Clone)]
pub enum StreamChunk {
    Text { content: String },
    ToolCall { name: String, status: ToolCallStatus, arguments: Option<serde_json::Value> },
    ToolResult { name: String, content: String },
    Error { message: String },
    Status { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// A callback invoked once per stream chunk; pipeline stages forward it to
/// `PipelineContext::on_stream_chunk`. Must not block indefinitely (§5).
pub type ChunkCallback<'a> = &'a (dyn Fn(StreamChunk) + Send + Sync);

/// Executes one turn for a given role+agent+prompt (§4.6). Implementors
/// own whatever per-agent resources a turn needs (subprocess handle,
/// session id, ...), keyed by `agent_id`.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn run(&self, role: AgentRole, agent_id: &str, prompt: &str) -> Result<String> {
        self.run_streaming(role, agent_id, prompt, &|_| {}).await
    }

    async fn run_streaming(
        &self,
        role: AgentRole,
        agent_id: &str,
        prompt: &str,
        on_chunk: ChunkCallback<'_>,
    ) -> Result<String>;

    async fn is_healthy(&self, agent_id: &str) -> bool;

    async fn interrupt(&self, agent_id: &str);

    /// Releases per-agent resources; subsequent calls for the agent create
    /// fresh state.
    async fn cleanup(&self, agent_id: &str);

    /// Releases everything this provider owns.
    async fn shutdown(&self);

    fn capabilities(&self) -> ProviderCapabilities;
}
