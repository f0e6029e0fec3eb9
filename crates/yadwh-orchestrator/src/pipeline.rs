//! Per-container update pipeline.
//!
//! Drives one matched container through pull, inspect, stop, remove,
//! create and start. The snapshot is captured before anything destructive
//! happens, so the replacement can always be built from it. A failure ends
//! this container's pipeline only; nothing is rolled back, so a failed
//! create after a successful remove leaves the container gone.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use yadwh_core::{
    ContainerDescriptor, ContainerSnapshot, GroupCredential, Stage, UpdateOutcome, is_member,
    short_id,
};
use yadwh_runtime::ContainerRuntime;

use crate::error::StageError;
use crate::purge::{PurgeDecision, PurgePolicy};

/// Where a container is in its update.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Phase {
    /// Listed by the runtime with the group label key.
    Discovered,
    /// Label value names the requested group.
    Matched,
    Pulling,
    Inspecting,
    Stopping,
    /// Only entered when the runtime does not auto-remove the container.
    Removing,
    Creating,
    Starting,
    /// Replacement is running.
    Done,
    /// Pipeline ended at `stage`.
    Failed { stage: Stage },
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed { .. })
    }
}

/// One container's update, run to completion or first failure.
pub struct UpdatePipeline<'a> {
    runtime: &'a dyn ContainerRuntime,
    credential: &'a GroupCredential,
    purge_policy: &'a dyn PurgePolicy,
    stop_grace: Duration,
    descriptor: ContainerDescriptor,
    phase: Phase,
}

impl<'a> UpdatePipeline<'a> {
    /// Create a pipeline for a listed container. It does nothing until
    /// [`admit`](Self::admit) matches the container to the group.
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        credential: &'a GroupCredential,
        purge_policy: &'a dyn PurgePolicy,
        stop_grace: Duration,
        descriptor: ContainerDescriptor,
    ) -> Self {
        Self {
            runtime,
            credential,
            purge_policy,
            stop_grace,
            descriptor,
            phase: Phase::Discovered,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Move to `Matched` if the container's `label_key` value names the
    /// credential's group.
    pub fn admit(&mut self, label_key: &str) -> bool {
        let label_value = self.descriptor.label(label_key).unwrap_or_default();
        if !is_member(label_value, &self.credential.name) {
            debug!(
                container = %self.descriptor.short_id(),
                label = label_value,
                "not monitored by this webhook"
            );
            return false;
        }
        self.enter(Phase::Matched);
        true
    }

    /// Run every stage and report the outcome.
    ///
    /// A pipeline that was not admitted reports the container as skipped
    /// and makes no runtime call.
    pub async fn run(&mut self) -> UpdateOutcome {
        if self.phase != Phase::Matched {
            return UpdateOutcome::skipped(self.descriptor.clone());
        }
        match self.execute().await {
            Ok(replacement) => {
                self.enter(Phase::Done);
                info!(
                    container = %self.descriptor.short_id(),
                    replacement = %replacement.short_id(),
                    image = %self.descriptor.image,
                    "container updated"
                );
                UpdateOutcome::succeeded(self.descriptor.clone(), replacement)
            }
            Err(e) => {
                self.enter(Phase::Failed { stage: e.stage });
                if e.stage == Stage::Create || e.stage == Stage::Start {
                    error!(
                        container = %self.descriptor.short_id(),
                        stage = %e.stage,
                        error = %e.source,
                        "update failed after the old container was stopped"
                    );
                } else {
                    warn!(
                        container = %self.descriptor.short_id(),
                        stage = %e.stage,
                        error = %e.source,
                        "update failed"
                    );
                }
                UpdateOutcome::failed(self.descriptor.clone(), e.stage, &e.source)
            }
        }
    }

    async fn execute(&mut self) -> Result<ContainerDescriptor, StageError> {
        let id = self.descriptor.id.clone();

        self.enter(Phase::Pulling);
        info!(container = %short_id(&id), image = %self.descriptor.image, "pulling image");
        let pull_log = self
            .runtime
            .pull(&self.descriptor.image, self.credential.registry_auth.as_ref())
            .await
            .map_err(StageError::at(Stage::Pull))?;
        debug!(container = %short_id(&id), log = %pull_log, "pull finished");

        self.enter(Phase::Inspecting);
        let snapshot = self
            .runtime
            .inspect(&id)
            .await
            .map_err(StageError::at(Stage::Inspect))?;

        self.enter(Phase::Stopping);
        info!(
            container = %short_id(&id),
            image = %self.descriptor.image,
            image_id = %short_id(&self.descriptor.image_id),
            grace_secs = self.stop_grace.as_secs(),
            "stopping container"
        );
        self.runtime
            .stop(&id, self.stop_grace)
            .await
            .map_err(StageError::at(Stage::Stop))?;

        if snapshot.auto_remove {
            debug!(container = %short_id(&id), "auto-remove set, runtime disposes of the container");
        } else {
            self.enter(Phase::Removing);
            info!(container = %short_id(&id), "removing container");
            self.runtime
                .remove(&id)
                .await
                .map_err(StageError::at(Stage::Remove))?;
        }

        self.enter(Phase::Creating);
        let name = self.descriptor.first_name().or(snapshot.name.as_deref());
        info!(container = %short_id(&id), name = ?name, image = %snapshot.image, "re-creating container");
        let new_id = self
            .runtime
            .create(&snapshot, name)
            .await
            .map_err(StageError::at(Stage::Create))?;

        self.enter(Phase::Starting);
        info!(container = %short_id(&new_id), "starting container");
        self.runtime
            .start(&new_id)
            .await
            .map_err(StageError::at(Stage::Start))?;

        let replacement = self.describe_replacement(&new_id, &snapshot).await;

        if self.credential.purge_old_image {
            self.purge_old_image(&pull_log, &replacement).await;
        }

        Ok(replacement)
    }

    /// Descriptor of the new container; falls back to the snapshot when the
    /// runtime cannot describe it, since the update itself succeeded.
    async fn describe_replacement(
        &self,
        new_id: &str,
        snapshot: &ContainerSnapshot,
    ) -> ContainerDescriptor {
        match self.runtime.describe(new_id).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(container = %short_id(new_id), error = %e, "cannot describe new container");
                ContainerDescriptor {
                    id: new_id.to_string(),
                    image: snapshot.image.clone(),
                    image_id: String::new(),
                    labels: self.descriptor.labels.clone(),
                    names: snapshot.name.iter().map(|n| format!("/{n}")).collect(),
                    state: None,
                    status: None,
                }
            }
        }
    }

    async fn purge_old_image(&self, pull_log: &str, replacement: &ContainerDescriptor) {
        let old_image_id = self.descriptor.image_id.as_str();
        if !replacement.image_id.is_empty() && replacement.image_id == old_image_id {
            info!(image_id = %short_id(old_image_id), "image unchanged, skipped removing");
            return;
        }
        match self.purge_policy.decide(pull_log, old_image_id) {
            PurgeDecision::Keep(reason) => {
                info!(image_id = %short_id(old_image_id), reason, "skipped removing old image");
            }
            PurgeDecision::Delete => {
                info!(image_id = %short_id(old_image_id), "deleting old image");
                if let Err(e) = self.runtime.remove_image(old_image_id).await {
                    warn!(image_id = %short_id(old_image_id), error = %e, "cannot remove old image");
                }
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        debug!(
            container = %self.descriptor.short_id(),
            from = ?self.phase,
            to = ?phase,
            "pipeline transition"
        );
        self.phase = phase;
    }
}
