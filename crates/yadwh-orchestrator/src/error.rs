//! Orchestrator error types.

use thiserror::Error;

use yadwh_core::Stage;
use yadwh_runtime::RuntimeError;

/// Authentication failures, raised before any runtime call.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("webhook not found")]
    NotFound,

    #[error("secret mismatch")]
    Mismatch,
}

/// Errors that abort a whole invocation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("failed to list containers: {0}")]
    Discovery(#[source] RuntimeError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// A runtime failure at one stage of a single container's pipeline.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub source: RuntimeError,
}

impl StageError {
    /// Tag runtime errors with the stage they occurred in.
    pub fn at(stage: Stage) -> impl FnOnce(RuntimeError) -> Self {
        move |source| Self { stage, source }
    }
}
