//! Group discovery and batch update.
//!
//! The `Orchestrator` is the entry point a webhook call lands in:
//! - Authenticates the group name and secret against the credential store
//! - Lists running containers carrying the group label key
//! - Matches each label value against the group locally
//! - Runs the update pipeline for every match, one container at a time
//!
//! Concurrent calls are not serialized against each other; two overlapping
//! calls for the same group may both try to update the same container.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use yadwh_core::{CredentialStore, DEFAULT_LABEL_KEY, GroupCredential, ProcessResult};
use yadwh_runtime::ContainerRuntime;

use crate::error::{AuthError, OrchestratorError, OrchestratorResult};
use crate::pipeline::UpdatePipeline;
use crate::purge::{PullLogHeuristic, PurgePolicy};

/// Default time a container gets to stop before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(60);

/// Tunables for discovery and the update pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Label key containers set to opt into groups.
    pub label_key: String,
    /// Grace period for the stop stage.
    pub stop_grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            label_key: DEFAULT_LABEL_KEY.to_string(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Runs webhook-triggered updates against a container runtime.
///
/// Cheap to clone; all clones share the runtime client and credentials.
#[derive(Clone)]
pub struct Orchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    credentials: Arc<CredentialStore>,
    purge_policy: Arc<dyn PurgePolicy>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            runtime,
            credentials,
            purge_policy: Arc::new(PullLogHeuristic),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the policy deciding whether old images are deleted.
    pub fn with_purge_policy(mut self, policy: Arc<dyn PurgePolicy>) -> Self {
        self.purge_policy = policy;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Resolve the credential for `group` if `secret` matches.
    pub fn authenticate(&self, group: &str, secret: &str) -> Result<&GroupCredential, AuthError> {
        let credential = self.credentials.lookup(group).ok_or(AuthError::NotFound)?;
        if !credential.secret_matches(secret) {
            return Err(AuthError::Mismatch);
        }
        Ok(credential)
    }

    /// Authenticate, then update every container in the group.
    pub async fn process(&self, group: &str, secret: &str) -> OrchestratorResult<ProcessResult> {
        let credential = match self.authenticate(group, secret) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(group = %group.trim(), error = %e, "webhook rejected");
                return Err(e.into());
            }
        };
        self.run(credential).await
    }

    /// Update every container in the credential's group.
    ///
    /// Fails only if the runtime cannot list containers. Per-container
    /// failures are reported in the result, one outcome per listed
    /// container, in listing order.
    pub async fn run(&self, credential: &GroupCredential) -> OrchestratorResult<ProcessResult> {
        let group = credential.name.as_str();
        let label_key = self.config.label_key.as_str();

        let candidates = self
            .runtime
            .list_by_label_key(label_key)
            .await
            .map_err(OrchestratorError::Discovery)?;

        info!(
            group,
            label = label_key,
            candidates = candidates.len(),
            "finding and updating containers"
        );

        let mut result = ProcessResult::new(group);
        for descriptor in candidates {
            let mut pipeline = UpdatePipeline::new(
                self.runtime.as_ref(),
                credential,
                self.purge_policy.as_ref(),
                self.config.stop_grace,
                descriptor,
            );
            pipeline.admit(label_key);
            result.push(pipeline.run().await);
        }

        info!(
            group,
            updated = result.succeeded_count(),
            failed = result.failed_count(),
            skipped = result.skipped_count(),
            "webhook finished"
        );
        Ok(result)
    }
}
