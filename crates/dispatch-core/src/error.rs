use thiserror::Error;

/// Cross-cutting error type. Most subsystems (jobs, machines, webhook,
/// orchestrator) define their own narrower error enum and only reach for
/// this one at the handful of truly shared boundaries (config loading).
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Short error code, useful for structured log fields and client-facing
    /// error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Config(_) => "CONFIG_ERROR",
            DispatchError::Serialization(_) => "SERIALIZATION_ERROR",
            DispatchError::Io(_) => "IO_ERROR",
            DispatchError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
