//! Runtime client error types.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors returned by a [`crate::ContainerRuntime`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("no such container: {0}")]
    ContainerNotFound(String),

    #[error("no such image: {0}")]
    ImageNotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid snapshot for container {id}: {reason}")]
    Snapshot { id: String, reason: String },

    #[error("{operation} failed for {target}: injected fault")]
    Injected {
        operation: &'static str,
        target: String,
    },
}
