//! Revision baselines and head lookups.
//!
//! A build persists a [`RevisionState`] so the next pass can compute a delta. What the host
//! hands back may come from a build that checked out several sources, or none of ours at all,
//! so it arrives as a [`RecordedState`] and the revision is pulled out with
//! [`RecordedState::revision`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::{Commit, RemoteGateway};
use crate::error::{GatewayError, SyncError};

/// Durable baseline: the commit a build synchronised to and its creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionState {
    pub commit_id: String,
    pub timestamp: i64,
}

impl RevisionState {
    pub fn new(commit_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            commit_id: commit_id.into(),
            timestamp,
        }
    }
}

impl From<&Commit> for RevisionState {
    fn from(commit: &Commit) -> Self {
        Self::new(commit.id.clone(), commit.created_at)
    }
}

/// Every shape of recorded state a previous build can leave behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordedState {
    /// A single source synchronised by this crate.
    Revision(RevisionState),
    /// Several sources checked out by one build, in checkout order.
    Composite { states: Vec<RecordedState> },
    /// State written by some other source type; carries nothing we can compare.
    Foreign { scm: String },
}

impl RecordedState {
    /// First revision found, depth-first.
    pub fn revision(&self) -> Option<&RevisionState> {
        match self {
            RecordedState::Revision(state) => Some(state),
            RecordedState::Composite { states } => states.iter().find_map(|s| s.revision()),
            RecordedState::Foreign { .. } => None,
        }
    }
}

impl From<RevisionState> for RecordedState {
    fn from(state: RevisionState) -> Self {
        RecordedState::Revision(state)
    }
}

/// Persist the state a build recorded, for the next build to read back.
pub fn write_state(path: &Path, state: &RecordedState) -> crate::error::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(state)?)?;
    Ok(())
}

/// Read a recorded state. `Ok(None)` when no state was ever written.
pub fn read_state(path: &Path) -> crate::error::Result<Option<RecordedState>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::Io(e)),
    }
}

/// Resolved head of a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadRevision {
    pub branch_id: String,
    pub branch_name: String,
    pub commit_id: String,
}

/// Head commit id of `reference`: the branch pointer, or the newest feed commit if the
/// branch carries none.
pub async fn head_commit_id<G>(
    gateway: &G,
    repository_id: &str,
    reference: &str,
) -> Result<String, GatewayError>
where
    G: RemoteGateway + ?Sized,
{
    let branch = gateway.get_branch(repository_id, reference).await?;
    match branch.head_commit_id.filter(|id| !id.is_empty()) {
        Some(id) => Ok(id),
        None => newest_commit(gateway, repository_id).await.map(|c| c.id),
    }
}

/// Full head commit of `reference`, with the same fallback as [`head_commit_id`].
pub async fn head_commit<G>(
    gateway: &G,
    repository_id: &str,
    reference: &str,
) -> Result<Commit, GatewayError>
where
    G: RemoteGateway + ?Sized,
{
    let branch = gateway.get_branch(repository_id, reference).await?;
    match branch.head_commit_id.filter(|id| !id.is_empty()) {
        Some(id) => gateway.get_commit(repository_id, &id).await,
        None => newest_commit(gateway, repository_id).await,
    }
}

/// Branch identity plus head commit, for callers that track heads rather than baselines.
pub async fn head_revision<G>(
    gateway: &G,
    repository_id: &str,
    reference: &str,
) -> Result<HeadRevision, GatewayError>
where
    G: RemoteGateway + ?Sized,
{
    let branch = gateway.get_branch(repository_id, reference).await?;
    let commit_id = match branch.head_commit_id.clone().filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => newest_commit(gateway, repository_id).await?.id,
    };
    Ok(HeadRevision {
        branch_id: branch.id,
        branch_name: branch.name,
        commit_id,
    })
}

/// The baseline a build should record after synchronising `reference`.
pub async fn current_revision_state<G>(
    gateway: &G,
    repository_id: &str,
    reference: &str,
) -> Result<RevisionState, GatewayError>
where
    G: RemoteGateway + ?Sized,
{
    let commit = head_commit(gateway, repository_id, reference).await?;
    debug!(commit_id = %commit.id, "[REVISION] Current revision state computed");
    Ok(RevisionState::from(&commit))
}

pub(crate) async fn newest_commit<G>(
    gateway: &G,
    repository_id: &str,
) -> Result<Commit, GatewayError>
where
    G: RemoteGateway + ?Sized,
{
    gateway
        .list_commits(repository_id, 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::NotFound(format!("no commits in repository {repository_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_state_yields_first_revision() {
        let state = RecordedState::Composite {
            states: vec![
                RecordedState::Foreign { scm: "git".into() },
                RecordedState::Revision(RevisionState::new("dv.commit.7", 70)),
                RecordedState::Revision(RevisionState::new("dv.commit.9", 90)),
            ],
        };
        assert_eq!(state.revision().map(|s| s.commit_id.as_str()), Some("dv.commit.7"));
    }

    #[test]
    fn foreign_state_has_no_revision() {
        assert!(RecordedState::Foreign { scm: "svn".into() }.revision().is_none());
    }

    #[test]
    fn recorded_state_round_trips_through_json() {
        let state = RecordedState::from(RevisionState::new("dv.commit.1", 10));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"kind\":\"revision\""));
        assert_eq!(serde_json::from_str::<RecordedState>(&json).unwrap(), state);
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(RevisionState::new("a", 1), RevisionState::new("a", 1));
        assert_ne!(RevisionState::new("a", 1), RevisionState::new("a", 2));
    }
}
