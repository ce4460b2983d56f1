//! Capability-based dispatch (C7, §4.6): picks the highest-priority
//! registered provider whose declared capabilities satisfy a role's
//! required set. The router itself implements [`Provider`] by delegating
//! every call to the selected provider — no per-role subclassing (§9).

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ChunkCallback, Provider, ProviderCapabilities, RequiredCapabilities};
use crate::error::{Result, RoutaError};
use crate::models::AgentRole;

struct RegisteredProvider {
    name: String,
    provider: Arc<dyn Provider>,
}

#[derive(Default)]
pub struct CapabilityBasedRouter {
    providers: RwLock<Vec<RegisteredProvider>>,
}

impl CapabilityBasedRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.capabilities().name.clone();
        self.providers.write().await.push(RegisteredProvider { name, provider });
    }

    pub async fn unregister(&self, name: &str) -> bool {
        let mut providers = self.providers.write().await;
        let before = providers.len();
        providers.retain(|p| p.name != name);
        providers.len() != before
    }

    pub async fn select_provider(&self, role: AgentRole) -> Result<Arc<dyn Provider>> {
        let required = RequiredCapabilities::for_role(role);
        let providers = self.providers.read().await;
        let mut best: Option<&RegisteredProvider> = None;
        for candidate in providers.iter().filter(|p| required.satisfied_by(&p.provider.capabilities())) {
            let candidate_priority = candidate.provider.capabilities().priority;
            // Ties keep the earliest-registered match (insertion order), so only
            // a strictly higher priority displaces the current best.
            if best.map_or(true, |b| candidate_priority > b.provider.capabilities().priority) {
                best = Some(candidate);
            }
        }
        best.map(|p| p.provider.clone()).ok_or_else(|| RoutaError::NoSuitableProvider {
            role: role.as_str().to_string(),
        })
    }

    /// Read-only snapshot of registered providers for an external caller's
    /// health dashboard — no internal state is exposed.
    pub async fn describe(&self) -> Vec<ProviderCapabilities> {
        self.providers
            .read()
            .await
            .iter()
            .map(|p| p.provider.capabilities())
            .collect()
    }
}

#[async_trait]
impl Provider for CapabilityBasedRouter {
    async fn run_streaming(
        &self,
        role: AgentRole,
        agent_id: &str,
        prompt: &str,
        on_chunk: ChunkCallback<'_>,
    ) -> Result<String> {
        self.select_provider(role)
            .await?
            .run_streaming(role, agent_id, prompt, on_chunk)
            .await
    }

    async fn is_healthy(&self, agent_id: &str) -> bool {
        for role in [AgentRole::Routa, AgentRole::Crafter, AgentRole::Gate] {
            if let Ok(provider) = self.select_provider(role).await {
                if provider.is_healthy(agent_id).await {
                    return true;
                }
            }
        }
        false
    }

    async fn interrupt(&self, agent_id: &str) {
        for p in self.providers.read().await.iter() {
            p.provider.interrupt(agent_id).await;
        }
    }

    async fn cleanup(&self, agent_id: &str) {
        for p in self.providers.read().await.iter() {
            p.provider.cleanup(agent_id).await;
        }
    }

    async fn shutdown(&self) {
        for p in self.providers.read().await.iter() {
            p.provider.shutdown().await;
        }
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            name: "router".to_string(),
            supports_streaming: true,
            supports_interrupt: true,
            supports_health_check: true,
            supports_file_editing: true,
            supports_terminal: true,
            supports_tool_calling: true,
            max_concurrent_agents: usize::MAX,
            priority: i32::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubProvider {
        caps: ProviderCapabilities,
        called: AtomicBool,
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn run_streaming(
            &self,
            _role: AgentRole,
            _agent_id: &str,
            _prompt: &str,
            _on_chunk: ChunkCallback<'_>,
        ) -> Result<String> {
            self.called.store(true, Ordering::SeqCst);
            Ok(self.caps.name.clone())
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

    fn caps(name: &str, tool_calling: bool, file_editing: bool, terminal: bool, priority: i32) -> ProviderCapabilities {
        ProviderCapabilities {
            name: name.to_string(),
            supports_streaming: true,
            supports_interrupt: true,
            supports_health_check: true,
            supports_file_editing: file_editing,
            supports_terminal: terminal,
            supports_tool_calling: tool_calling,
            max_concurrent_agents: 4,
            priority,
        }
    }

    #[tokio::test]
    async fn selects_highest_priority_match_for_role() {
        let router = CapabilityBasedRouter::new();
        router
            .register(Arc::new(StubProvider { caps: caps("low", true, true, true, 1), called: AtomicBool::new(false) }))
            .await;
        router
            .register(Arc::new(StubProvider { caps: caps("high", true, true, true, 10), called: AtomicBool::new(false) }))
            .await;

        let output = router.run(AgentRole::Crafter, "a1", "hi").await.unwrap();
        assert_eq!(output, "high");
    }

    #[tokio::test]
    async fn fails_when_no_provider_satisfies_role() {
        let router = CapabilityBasedRouter::new();
        router
            .register(Arc::new(StubProvider { caps: caps("readonly", false, false, true, 1), called: AtomicBool::new(false) }))
            .await;

        let result = router.select_provider(AgentRole::Crafter).await;
        assert!(matches!(result, Err(RoutaError::NoSuitableProvider { .. })));
    }

    #[tokio::test]
    async fn unregister_removes_provider() {
        let router = CapabilityBasedRouter::new();
        router
            .register(Arc::new(StubProvider { caps: caps("only", true, true, true, 1), called: AtomicBool::new(false) }))
            .await;
        assert!(router.unregister("only").await);
        assert!(router.select_provider(AgentRole::Crafter).await.is_err());
    }
}
