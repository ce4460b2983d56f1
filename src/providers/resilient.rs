//! Retry + circuit-breaker wrapper (C8) around any [`Provider`] (§4.6).
//!
//! Two layers stay separate by design (§9): this wrapper only retries
//! transient I/O failures. Semantic retries ("GATE says no") are the
//! pipeline's job via `RepeatPipeline`.

use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{instrument, warn};

use super::{ChunkCallback, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, Provider, ProviderCapabilities};
use crate::config::ResilientConfig;
use crate::error::{Result, RoutaError};
use crate::models::{AgentRole, Message, MessageRole};
use crate::store::ConversationStore;

pub struct ResilientProvider {
    inner: Arc<dyn Provider>,
    config: ResilientConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    conversations: Arc<dyn ConversationStore>,
}

impl ResilientProvider {
    pub fn new(
        inner: Arc<dyn Provider>,
        config: ResilientConfig,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            inner,
            config,
            breakers: RwLock::new(HashMap::new()),
            conversations,
        }
    }

    async fn breaker_for(&self, agent_id: &str) -> Arc<CircuitBreaker> {
        if let Some(b) = self.breakers.read().await.get(agent_id) {
            return b.clone();
        }
        let mut breakers = self.breakers.write().await;
        breakers
            .entry(agent_id.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                    failure_threshold: self.config.circuit_failure_threshold,
                    timeout_duration: Duration::from_secs(self.config.circuit_half_open_secs),
                }))
            })
            .clone()
    }

    /// Exposes per-agent breaker counters for an external health dashboard.
    pub async fn breaker_metrics(&self, agent_id: &str) -> Option<CircuitBreakerMetrics> {
        let breakers = self.breakers.read().await;
        match breakers.get(agent_id) {
            Some(b) => Some(b.get_metrics().await),
            None => None,
        }
    }

    async fn append_failure_message(&self, agent_id: &str, error: &RoutaError) {
        let _ = self
            .conversations
            .append(Message::new(
                uuid::Uuid::new_v4().to_string(),
                agent_id.to_string(),
                MessageRole::Tool,
                format!("ERROR: {error}"),
            ))
            .await;
    }
}

#[async_trait]
impl Provider for ResilientProvider {
    #[instrument(name = "resilient_turn", skip(self, prompt, on_chunk), fields(role = role.as_str(), agent_id))]
    async fn run_streaming(
        &self,
        role: AgentRole,
        agent_id: &str,
        prompt: &str,
        on_chunk: ChunkCallback<'_>,
    ) -> Result<String> {
        let breaker = self.breaker_for(agent_id).await;
        if !breaker.should_allow_request().await {
            return Err(RoutaError::CircuitOpen {
                agent_id: agent_id.to_string(),
            });
        }

        let mut delay_ms = self.config.base_delay_ms;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.inner.run_streaming(role, agent_id, prompt, on_chunk).await {
                Ok(output) => {
                    breaker.record_success().await;
                    return Ok(output);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    breaker.record_failure().await;
                    warn!(attempt, %e, "transient provider error, retrying");
                    let jitter: u64 = rand::thread_rng().gen_range(0..=(delay_ms / 4).max(1));
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms as f64 * self.config.backoff_multiplier) as u64;
                }
                Err(e) => {
                    breaker.record_failure().await;
                    self.append_failure_message(agent_id, &e).await;
                    return Err(e);
                }
            }
        }
    }

    async fn is_healthy(&self, agent_id: &str) -> bool {
        self.inner.is_healthy(agent_id).await
    }

    async fn interrupt(&self, agent_id: &str) {
        self.inner.interrupt(agent_id).await
    }

    async fn cleanup(&self, agent_id: &str) {
        self.inner.cleanup(agent_id).await
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryConversationStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        fail_times: AtomicU32,
        caps: ProviderCapabilities,
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        async fn run_streaming(
            &self,
            _role: AgentRole,
            _agent_id: &str,
            _prompt: &str,
            _on_chunk: ChunkCallback<'_>,
        ) -> Result<String> {
            if self.fail_times.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(RoutaError::Transient("flaky".into()))
            } else {
                Ok("ok".to_string())
            }
        }
        async fn is_healthy(&self, _agent_id: &str) -> bool {
            true
        }
        async fn interrupt(&self, _agent_id: &str) {}
        async fn cleanup(&self, _agent_id: &str) {}
        async fn shutdown(&self) {}
        fn capabilities(&self) -> ProviderCapabilities {
            self.caps.clone()
        }
    }

    fn caps() -> ProviderCapabilities {
        ProviderCapabilities {
            name: "flaky".into(),
            supports_streaming: true,
            supports_interrupt: true,
            supports_health_check: true,
            supports_file_editing: true,
            supports_terminal: true,
            supports_tool_calling: true,
            max_concurrent_agents: 1,
            priority: 0,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let flaky = Arc::new(FlakyProvider { fail_times: AtomicU32::new(1), caps: caps() });
        let wrapper = ResilientProvider::new(
            flaky,
            ResilientConfig {
                base_delay_ms: 1,
                backoff_multiplier: 1.0,
                max_attempts: 3,
                circuit_failure_threshold: 5,
                circuit_half_open_secs: 30,
            },
            Arc::new(InMemoryConversationStore::new()),
        );
        let result = wrapper.run(AgentRole::Routa, "a1", "hi").await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test]
    async fn opens_circuit_after_exhausting_retries_and_logs_error() {
        let flaky = Arc::new(FlakyProvider { fail_times: AtomicU32::new(100), caps: caps() });
        let conversations = Arc::new(InMemoryConversationStore::new());
        let wrapper = ResilientProvider::new(
            flaky,
            ResilientConfig {
                base_delay_ms: 1,
                backoff_multiplier: 1.0,
                max_attempts: 2,
                circuit_failure_threshold: 1,
                circuit_half_open_secs: 30,
            },
            conversations.clone(),
        );
        let result = wrapper.run(AgentRole::Routa, "a1", "hi").await;
        assert!(result.is_err());

        let second = wrapper.run(AgentRole::Routa, "a1", "hi").await;
        assert!(matches!(second, Err(RoutaError::CircuitOpen { .. })));

        let conversation = conversations.get_conversation("a1").await.unwrap();
        assert!(conversation.iter().any(|m| m.content.starts_with("ERROR:")));
    }
}
