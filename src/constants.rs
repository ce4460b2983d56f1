//! System-wide default values. Per-run tuning lives in [`crate::config`];
//! these are the fallbacks used when a config value is not overridden.

/// Default per-provider-turn timeout (§5): 10 minutes.
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 600;

/// Default subprocess spawn timeout (§5): 30 seconds.
pub const DEFAULT_SPAWN_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of pipeline repeats before `MaxWavesReached`.
pub const DEFAULT_MAX_WAVES: u32 = 3;

/// Resilient wrapper backoff base delay.
pub const RESILIENT_BASE_DELAY_MS: u64 = 1000;

/// Resilient wrapper backoff multiplier.
pub const RESILIENT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Resilient wrapper max retry attempts.
pub const RESILIENT_MAX_ATTEMPTS: u32 = 3;

/// Consecutive failures before the circuit opens.
pub const CIRCUIT_FAILURE_THRESHOLD: u32 = 5;

/// Circuit half-open probe delay.
pub const CIRCUIT_HALF_OPEN_SECS: u64 = 30;

/// S4 GateVerification default retry policy.
pub const GATE_STAGE_MAX_ATTEMPTS: u32 = 2;
pub const GATE_STAGE_BASE_DELAY_MS: u64 = 2000;
pub const GATE_STAGE_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Per-subscriber pending event queue bound.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Characters of each truncated CRAFTER conversation message in the GATE prompt.
pub const GATE_CONTEXT_MESSAGE_TRUNCATE_LEN: usize = 500;

/// Number of trailing CRAFTER messages included per task in the GATE prompt.
pub const GATE_CONTEXT_MESSAGE_COUNT: usize = 5;

/// `get_agent_summary` response truncation length.
pub const AGENT_SUMMARY_TRUNCATE_LEN: usize = 500;

/// Default session mode per role.
pub const MODE_PLAN: &str = "plan";
pub const MODE_BUILD: &str = "build";
