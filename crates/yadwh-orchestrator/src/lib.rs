//! yadwh-orchestrator: webhook-triggered container updates.
//!
//! Given a group name, finds every running container whose opt-in label
//! lists the group and replaces each one with a fresh container built from
//! the same configuration, after pulling its image again.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::process(group, secret)
//!   ├── CredentialStore (authenticate, purge/auth policy)
//!   ├── ContainerRuntime::list_by_label_key (discovery)
//!   └── per matched container, sequentially
//!       └── UpdatePipeline: pull → inspect → stop → remove? → create → start → purge?
//! ```
//!
//! Every listed container yields exactly one `UpdateOutcome`; a failing
//! container never stops its siblings from being processed.

pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod purge;

pub use error::{AuthError, OrchestratorError, OrchestratorResult, StageError};
pub use orchestrator::{DEFAULT_STOP_GRACE, Orchestrator, OrchestratorConfig};
pub use pipeline::{Phase, UpdatePipeline};
pub use purge::{PullLogHeuristic, PurgeDecision, PurgePolicy, pull_was_noop};
