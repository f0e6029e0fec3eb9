//! Old-image purge policy.
//!
//! After a successful update in purge mode, the image the container ran
//! before may be deleted. Whether the pull actually fetched something new
//! is not reported directly by the runtime, so the decision is delegated to
//! a [`PurgePolicy`].
//!
//! [`PullLogHeuristic`] is the default: it keeps the old image when the
//! pull log mentions the old image id. This is a string match against
//! progress output and can misfire in both directions; comparing the
//! image id of the recreated container against the old one is the reliable
//! signal and is checked first by the pipeline.

/// Outcome of a purge decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeDecision {
    /// Delete the old image.
    Delete,
    /// Keep it, with the reason for the log.
    Keep(&'static str),
}

/// Decides whether an updated container's previous image should be deleted.
pub trait PurgePolicy: Send + Sync {
    fn decide(&self, pull_log: &str, old_image_id: &str) -> PurgeDecision;
}

/// Keeps the old image when the pull log contains its id.
#[derive(Debug, Clone, Copy, Default)]
pub struct PullLogHeuristic;

impl PurgePolicy for PullLogHeuristic {
    fn decide(&self, pull_log: &str, old_image_id: &str) -> PurgeDecision {
        if old_image_id.is_empty() {
            return PurgeDecision::Keep("old image id unknown");
        }
        if pull_was_noop(pull_log, old_image_id) {
            PurgeDecision::Keep("old image was pulled again")
        } else {
            PurgeDecision::Delete
        }
    }
}

/// Whether the pull log suggests the image was already current.
pub fn pull_was_noop(pull_log: &str, old_image_id: &str) -> bool {
    pull_log
        .to_ascii_lowercase()
        .contains(&old_image_id.to_ascii_lowercase())
}
