//! Engine error taxonomy

use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// Degraded-but-valid outcomes (no eligible hosts, insufficient data) are not
/// errors and are reported through the operation's result type instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("timed out fetching {what} {id}")]
    FetchTimeout { what: &'static str, id: String },

    #[error("data source error: {0}")]
    Source(String),

    #[error("planning run already in progress for cluster {0}")]
    ConcurrentRunSkipped(String),

    #[error("profile {id} still has {instances} active instances")]
    ProfileInUse { id: String, instances: u32 },
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for faults caused by the caller's input rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Validation(_) | Self::ProfileInUse { .. }
        )
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Source(format!("{:#}", err))
    }
}
