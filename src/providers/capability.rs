use serde::{Deserialize, Serialize};

use crate::models::AgentRole;

/// What a provider declares it can do; the router dispatches on this
/// instead of a per-role class hierarchy (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCapabilities {
    pub name: String,
    pub supports_streaming: bool,
    pub supports_interrupt: bool,
    pub supports_health_check: bool,
    pub supports_file_editing: bool,
    pub supports_terminal: bool,
    pub supports_tool_calling: bool,
    pub max_concurrent_agents: usize,
    pub priority: i32,
}

/// The capability set a role needs; `satisfies` is the router's match test.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequiredCapabilities {
    pub tool_calling: bool,
    pub file_editing: bool,
    pub terminal: bool,
}

impl RequiredCapabilities {
    pub fn for_role(role: AgentRole) -> Self {
        match role {
            AgentRole::Routa => Self {
                tool_calling: true,
                ..Default::default()
            },
            AgentRole::Crafter => Self {
                file_editing: true,
                terminal: true,
                ..Default::default()
            },
            AgentRole::Gate => Self {
                terminal: true,
                ..Default::default()
            },
        }
    }

    pub fn satisfied_by(&self, caps: &ProviderCapabilities) -> bool {
        (!self.tool_calling || caps.supports_tool_calling)
            && (!self.file_editing || caps.supports_file_editing)
            && (!self.terminal || caps.supports_terminal)
    }
}

/// Session mode selected per turn (§4.6, §6): "plan" is read-only (ROUTA,
/// GATE), "build" permits file edits and shell execution (CRAFTER).
pub fn mode_for_role(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Routa | AgentRole::Gate => crate::constants::MODE_PLAN,
        AgentRole::Crafter => crate::constants::MODE_BUILD,
    }
}
