//! Error types for cluster-debug

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterDebugError {
    #[error("Invalid worker debug port override: {0}")]
    InvalidOverride(String),

    #[error("Debug port space exhausted: {0}")]
    PortExhausted(String),

    #[error("Lease conflict: {0}")]
    LeaseConflict(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ClusterDebugError>;
