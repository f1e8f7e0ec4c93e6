use thiserror::Error;

#[derive(Debug, Error)]
pub enum MachinesError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("machine not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, MachinesError>;
