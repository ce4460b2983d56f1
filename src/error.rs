use thiserror::Error;

/// Convenience alias for Results carrying [`RoutaError`].
pub type Result<T> = std::result::Result<T, RoutaError>;

/// Error kinds propagated across the orchestration core (spec §7).
///
/// `Validation` and `NotFound`/`AccessDenied` are returned straight to the
/// caller and never retried. `Transient` is retried by the resilient
/// provider wrapper. `CircuitOpen`, `Cancelled`, `NoSuitableProvider` and
/// `PipelineFailure` are fatal to the current stage/run.
#[derive(Error, Debug)]
pub enum RoutaError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("circuit open for agent {agent_id}")]
    CircuitOpen { agent_id: String },

    #[error("cancelled")]
    Cancelled,

    #[error("no suitable provider for role {role}")]
    NoSuitableProvider { role: String },

    #[error("pipeline failure in stage {stage}: {cause}")]
    PipelineFailure { stage: String, cause: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RoutaError {
    /// Whether the resilient provider wrapper (§4.6) should retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, RoutaError::Transient(_) | RoutaError::Io(_))
    }
}
