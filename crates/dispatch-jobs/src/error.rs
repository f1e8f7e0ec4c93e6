use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("job not found: {id}")]
    NotFound { id: String },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JobsError>;
