//! Change detection: is a new build warranted?

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::contract::RemoteGateway;
use crate::revision::{head_commit_id, RecordedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    NoChanges,
    Changed,
    /// No usable baseline to compare against.
    Unknown,
}

impl PollOutcome {
    pub fn should_trigger(self) -> bool {
        matches!(self, PollOutcome::Changed | PollOutcome::Unknown)
    }
}

/// Compare the current head of `reference` against `baseline`.
///
/// Never fails: a gateway error reads as "no changes" so a flaky remote cannot trigger
/// spurious builds.
pub async fn poll<G>(
    gateway: &G,
    repository_id: &str,
    reference: &str,
    baseline: Option<&RecordedState>,
) -> PollOutcome
where
    G: RemoteGateway + ?Sized,
{
    let head = match head_commit_id(gateway, repository_id, reference).await {
        Ok(id) => id,
        Err(e) => {
            warn!(repository_id, reference, error = %e, "[POLL] Head lookup failed, reporting no changes");
            return PollOutcome::NoChanges;
        }
    };

    let outcome = match baseline.and_then(RecordedState::revision) {
        None => PollOutcome::Unknown,
        Some(state) if state.commit_id == head => PollOutcome::NoChanges,
        Some(_) => PollOutcome::Changed,
    };
    info!(repository_id, head = %head, outcome = ?outcome, "[POLL] Poll complete");
    outcome
}
