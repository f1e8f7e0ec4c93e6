use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("instance already exists: {0}")]
    InstanceExists(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("machines error: {0}")]
    Machines(#[from] dispatch_machines::MachinesError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
