//! Typed configuration records the core accepts from a caller.
//!
//! Loading these from YAML, environment discovery of CLI binaries, etc. is
//! explicitly out of scope — that is an external collaborator's job. What
//! lives here is just the serde-friendly shape of the values the core reads,
//! with `Default` impls carrying the defaults stated throughout the design.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants;

#[cfg(test)]
mod tests;

/// Opaque per-provider-preset record (§6): interpreted by the ACP provider
/// without the core ever parsing YAML or touching the filesystem for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPreset {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub auto_approve: Option<bool>,
    pub allowed_tools: Option<Vec<String>>,
}

/// Tuning for the resilient provider wrapper (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilientConfig {
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_attempts: u32,
    pub circuit_failure_threshold: u32,
    pub circuit_half_open_secs: u64,
}

impl Default for ResilientConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: constants::RESILIENT_BASE_DELAY_MS,
            backoff_multiplier: constants::RESILIENT_BACKOFF_MULTIPLIER,
            max_attempts: constants::RESILIENT_MAX_ATTEMPTS,
            circuit_failure_threshold: constants::CIRCUIT_FAILURE_THRESHOLD,
            circuit_half_open_secs: constants::CIRCUIT_HALF_OPEN_SECS,
        }
    }
}

/// Tuning for the orchestrator's wave loop and subprocess lifecycle (§4.10, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub max_waves: u32,
    pub turn_timeout_secs: u64,
    pub spawn_timeout_secs: u64,
    pub parallel_crafters: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_waves: constants::DEFAULT_MAX_WAVES,
            turn_timeout_secs: constants::DEFAULT_TURN_TIMEOUT_SECS,
            spawn_timeout_secs: constants::DEFAULT_SPAWN_TIMEOUT_SECS,
            parallel_crafters: false,
        }
    }
}
