//! Container and update-outcome types shared across yadwh crates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Runtime-assigned container identifier.
pub type ContainerId = String;

/// Runtime-assigned image identifier (`sha256:...`).
pub type ImageId = String;

// ── Containers ─────────────────────────────────────────────────────

/// A container as reported by the runtime's listing or inspection.
///
/// Value type: the orchestrator reads descriptors but never mutates them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContainerDescriptor {
    pub id: ContainerId,
    /// Image reference the container was started from, e.g. `nginx:latest`.
    pub image: String,
    pub image_id: ImageId,
    pub labels: HashMap<String, String>,
    /// Runtime names, usually with a leading `/`.
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ContainerDescriptor {
    /// Value of a label, if set.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// First runtime name without the leading `/`, if any.
    pub fn first_name(&self) -> Option<&str> {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .filter(|n| !n.is_empty())
    }

    /// Abbreviated id for log output.
    pub fn short_id(&self) -> &str {
        short_id(&self.id)
    }
}

/// Abbreviate a runtime id to its first 12 characters.
pub fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    match id.char_indices().nth(12) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Configuration captured from a container before any destructive step.
///
/// `config`, `host_config` and `endpoints` are runtime-native documents
/// handed back to the runtime verbatim when the container is recreated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ContainerSnapshot {
    pub id: ContainerId,
    /// Name without the leading `/`.
    pub name: Option<String>,
    /// Image reference from the container config.
    pub image: String,
    pub image_id: ImageId,
    /// Whether the runtime disposes of the container once it stops.
    pub auto_remove: bool,
    pub config: serde_json::Value,
    pub host_config: serde_json::Value,
    /// Per-network endpoint settings keyed by network name.
    pub endpoints: serde_json::Value,
}

// ── Pipeline ───────────────────────────────────────────────────────

/// One step of the per-container update pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pull,
    Inspect,
    Stop,
    Remove,
    Create,
    Start,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pull => "pull",
            Stage::Inspect => "inspect",
            Stage::Stop => "stop",
            Stage::Remove => "remove",
            Stage::Create => "create",
            Stage::Start => "start",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of one container within an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Recreated and started; carries the replacement container.
    Succeeded { container: ContainerDescriptor },
    /// Carries the label key but is not a member of the requested group.
    SkippedNotMonitored,
    /// The pipeline stopped at `stage`.
    Failed { stage: Stage, cause: String },
}

/// Outcome for a single listed container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    /// The container as listed before the update.
    pub descriptor: ContainerDescriptor,
    #[serde(flatten)]
    pub status: UpdateStatus,
}

impl UpdateOutcome {
    pub fn succeeded(descriptor: ContainerDescriptor, container: ContainerDescriptor) -> Self {
        Self {
            descriptor,
            status: UpdateStatus::Succeeded { container },
        }
    }

    pub fn skipped(descriptor: ContainerDescriptor) -> Self {
        Self {
            descriptor,
            status: UpdateStatus::SkippedNotMonitored,
        }
    }

    pub fn failed(descriptor: ContainerDescriptor, stage: Stage, cause: impl ToString) -> Self {
        Self {
            descriptor,
            status: UpdateStatus::Failed {
                stage,
                cause: cause.to_string(),
            },
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self.status, UpdateStatus::Succeeded { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, UpdateStatus::SkippedNotMonitored)
    }

    /// Stage the pipeline failed at, if it failed.
    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.status {
            UpdateStatus::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Ordered outcomes of one webhook invocation, in runtime listing order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub group: String,
    pub outcomes: Vec<UpdateOutcome>,
}

impl ProcessResult {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: UpdateOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Replacement containers of every successful update, in order.
    pub fn updated(&self) -> Vec<&ContainerDescriptor> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                UpdateStatus::Succeeded { container } => Some(container),
                _ => None,
            })
            .collect()
    }

    pub fn failed(&self) -> impl Iterator<Item = &UpdateOutcome> {
        self.outcomes.iter().filter(|o| o.failed_stage().is_some())
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_succeeded()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_skipped()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> ContainerDescriptor {
        ContainerDescriptor {
            id: id.to_string(),
            image: "nginx:latest".to_string(),
            image_id: "sha256:aaaa".to_string(),
            names: vec![format!("/{id}-name")],
            ..Default::default()
        }
    }

    #[test]
    fn first_name_strips_slash() {
        assert_eq!(descriptor("c1").first_name(), Some("c1-name"));
        let anon = ContainerDescriptor {
            names: vec!["/".to_string()],
            ..Default::default()
        };
        assert_eq!(anon.first_name(), None);
        assert_eq!(ContainerDescriptor::default().first_name(), None);
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(short_id("0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short_id("sha256:0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn result_counts_and_updated_order() {
        let mut result = ProcessResult::new("web");
        result.push(UpdateOutcome::succeeded(descriptor("a"), descriptor("a2")));
        result.push(UpdateOutcome::skipped(descriptor("b")));
        result.push(UpdateOutcome::failed(descriptor("c"), Stage::Stop, "timeout"));
        result.push(UpdateOutcome::succeeded(descriptor("d"), descriptor("d2")));

        assert_eq!(result.len(), 4);
        assert_eq!(result.succeeded_count(), 2);
        assert_eq!(result.skipped_count(), 1);
        assert_eq!(result.failed_count(), 1);
        let ids: Vec<_> = result.updated().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "d2"]);
        assert_eq!(result.outcomes[2].failed_stage(), Some(Stage::Stop));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = UpdateOutcome::failed(descriptor("c"), Stage::Create, "no such image");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["stage"], "create");
        assert_eq!(json["cause"], "no such image");
        assert_eq!(json["descriptor"]["id"], "c");
    }
}
