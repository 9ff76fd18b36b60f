//! Changelog reconciliation between a previous baseline and the current head.
//!
//! [`reconcile`] turns `(previous baseline, current head)` into an ordered [`ChangelogRecord`]:
//! - no baseline: a single entry for the head commit;
//! - baseline equals head: an empty record, without touching the commit feed;
//! - otherwise: a bounded, newest-first window of the feed is scanned from the head down to
//!   (excluding) the baseline. A baseline outside the window yields every scanned commit.
//!
//! Records persist as JSON. An empty record on disk is a valid state of its own, distinct from
//! a missing file ([`read_changelog`] returns `None` for the latter).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::contract::{Commit, RemoteGateway};
use crate::error::{Result, SyncError};
use crate::revision::{newest_commit, RevisionState};

/// Number of newest commits scanned when looking for the previous baseline.
pub const DEFAULT_COMMIT_WINDOW: usize = 100;

/// One commit as recorded in a changelog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub commit_id: String,
    pub message: String,
    pub author_name: String,
    /// Commit creation time in unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub changed_paths: Vec<String>,
}

impl From<&Commit> for ChangelogEntry {
    fn from(commit: &Commit) -> Self {
        Self {
            commit_id: commit.id.clone(),
            message: commit.message.clone(),
            author_name: commit.author.display_name().to_string(),
            timestamp: commit.created_at,
            changed_paths: commit.changed_paths.clone(),
        }
    }
}

/// Ordered, newest-first changelog of one synchronisation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogRecord {
    #[serde(default)]
    pub entries: Vec<ChangelogEntry>,
}

impl ChangelogRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn commit_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.commit_id.as_str()).collect()
    }
}

impl FromIterator<ChangelogEntry> for ChangelogRecord {
    fn from_iter<I: IntoIterator<Item = ChangelogEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Compute the commits between `previous` and the head of `reference`.
///
/// Failures propagate: a wrong or partial changelog is worse than a failed pass.
pub async fn reconcile<G>(
    gateway: &G,
    repository_id: &str,
    reference: &str,
    previous: Option<&RevisionState>,
    window: usize,
) -> Result<ChangelogRecord>
where
    G: RemoteGateway + ?Sized,
{
    if repository_id.is_empty() {
        return Err(SyncError::ConfigurationInvalid(
            "repository id is required".to_string(),
        ));
    }
    if window == 0 {
        return Err(SyncError::ConfigurationInvalid(
            "commit window must be at least 1".to_string(),
        ));
    }

    let branch = gateway.get_branch(repository_id, reference).await?;
    let head_id = branch.head_commit_id.filter(|id| !id.is_empty());

    let Some(previous) = previous else {
        let head = match head_id {
            Some(id) => gateway.get_commit(repository_id, &id).await?,
            None => newest_commit(gateway, repository_id).await?,
        };
        info!(commit_id = %head.id, "[CHANGELOG] First build, recording head commit only");
        return Ok(std::iter::once(ChangelogEntry::from(&head)).collect());
    };

    let head_id = match head_id {
        Some(id) => id,
        None => newest_commit(gateway, repository_id).await?.id,
    };

    if previous.commit_id == head_id {
        info!(commit_id = %head_id, "[CHANGELOG] No new commits since last build");
        return Ok(ChangelogRecord::empty());
    }

    info!(
        previous = %previous.commit_id,
        current = %head_id,
        window,
        "[CHANGELOG] Finding commits between baseline and head"
    );
    let feed = gateway.list_commits(repository_id, window).await?;
    let record = collect_between(&feed, &head_id, &previous.commit_id);
    info!(count = record.len(), scanned = feed.len(), "[CHANGELOG] Commits collected");
    Ok(record)
}

/// Walk a newest-first feed: start at `head_id`, stop before `baseline_id`.
fn collect_between(feed: &[Commit], head_id: &str, baseline_id: &str) -> ChangelogRecord {
    feed.iter()
        .skip_while(|commit| commit.id != head_id)
        .take_while(|commit| commit.id != baseline_id)
        .map(ChangelogEntry::from)
        .collect()
}

/// Persist `record` at `path`, replacing whatever was there.
pub fn write_changelog(path: &Path, record: &ChangelogRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json)?;
    debug!(path = %path.display(), entries = record.len(), "[CHANGELOG] Written");
    Ok(())
}

/// Read a persisted changelog. `Ok(None)` means no changelog was ever written.
pub fn read_changelog(path: &Path) -> Result<Option<ChangelogRecord>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::Io(e)),
    }
}
