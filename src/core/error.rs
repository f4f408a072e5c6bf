use thiserror::Error;

use crate::core::types::SystemId;

#[derive(Error, Debug)]
pub enum SchedError {
    #[error("System already registered: {0}")]
    DuplicateSystem(SystemId),

    #[error("Scheduler already initialized")]
    AlreadyInitialized,

    #[error("Setup failed for system {system}: {source}")]
    Setup {
        system: SystemId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("System error: {0}")]
    System(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedError>;
