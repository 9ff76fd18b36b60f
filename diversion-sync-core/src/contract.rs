//! # contract: Remote source gateway and host build interfaces
//!
//! This module defines the two seams the core is driven through:
//!
//! - [`RemoteGateway`]: the flat-listing / blob-fetching API of a commit-versioned remote
//!   repository. Retries, authentication and transport belong to the implementor.
//! - [`HostBuild`]: the capabilities the host build system injects into a synchronisation
//!   pass (build identity, the previous build's recorded state, the primary source's repo).
//!
//! Plus the plain data types that cross those seams ([`PathEntry`], [`Commit`], [`Branch`], ...).
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`; the generated `MockRemoteGateway` and
//! `MockHostBuild` are exported with the `test-export-mocks` feature for integration tests
//! and downstream crates.
//!
//! ## Implementing a Gateway
//! - Map every failure into one [`GatewayError`] variant; the pipeline decides whether to
//!   propagate, degrade or swallow it.
//! - `list_commits` must return the feed newest-first.
//! - `get_branch` accepts either a branch identifier or a branch name.

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::revision::RecordedState;

/// One row of a remote path listing for a single revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    /// Slash-separated path relative to the repository root.
    pub path: String,
    /// Whether a content object backs this path. Directories usually carry none.
    pub has_blob: bool,
}

impl PathEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            has_blob: true,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            has_blob: false,
        }
    }
}

/// Commit author as reported by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Option<String>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl Author {
    /// Best display name: short name, then full name, then empty.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.full_name.as_deref())
            .unwrap_or("")
    }
}

/// A commit from the remote feed. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    /// Creation time in unix seconds.
    pub created_at: i64,
    pub message: String,
    pub author: Author,
    pub branch_id: Option<String>,
    pub parent_ids: Vec<String>,
    pub changed_paths: Vec<String>,
}

/// Snapshot of a remote branch at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: String,
    pub name: String,
    /// The tip commit; some remotes omit it for freshly created branches.
    pub head_commit_id: Option<String>,
}

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub description: String,
    pub default_branch: String,
}

/// A named, immutable pointer to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub commit_id: Option<String>,
    pub description: Option<String>,
    pub author: Option<Author>,
    /// Creation time in unix seconds, 0 when unknown.
    pub time: i64,
}

/// The remote source gateway consumed by every synchronisation component.
///
/// Calls are awaited one at a time within a pass; the core adds no timeout and no retry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Flat listing of every path at `reference`.
    async fn list_paths(
        &self,
        repository_id: &str,
        reference: &str,
    ) -> Result<Vec<PathEntry>, GatewayError>;

    /// Raw content of the blob at `path` for `reference`.
    async fn read_blob(
        &self,
        repository_id: &str,
        reference: &str,
        path: &str,
    ) -> Result<Vec<u8>, GatewayError>;

    /// Branch lookup by identifier or name.
    async fn get_branch(&self, repository_id: &str, reference: &str)
        -> Result<Branch, GatewayError>;

    /// Newest-first commit feed, at most `limit` entries.
    async fn list_commits(
        &self,
        repository_id: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, GatewayError>;

    /// Full details of one commit, including changed paths.
    async fn get_commit(&self, repository_id: &str, commit_id: &str)
        -> Result<Commit, GatewayError>;

    async fn get_repository(&self, repository_id: &str) -> Result<Repository, GatewayError>;

    async fn list_branches(&self, repository_id: &str) -> Result<Vec<Branch>, GatewayError>;

    async fn list_tags(&self, repository_id: &str) -> Result<Vec<Tag>, GatewayError>;

    async fn get_tag(&self, repository_id: &str, tag_id: &str) -> Result<Tag, GatewayError>;
}

/// What the host build system exposes to a synchronisation pass.
///
/// The host answers these directly; nothing inspects the running job type.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait HostBuild: Send + Sync {
    /// Stable identifier of the running build; keys the deduplication session.
    fn build_id(&self) -> String;

    /// Job name, used for script auto-detection.
    fn job_name(&self) -> String;

    /// Whatever state the previous build recorded, if there was a previous build.
    fn previous_state(&self) -> Option<RecordedState>;

    /// Repository the primary (script) source of this build points at, when known.
    fn primary_repository_id(&self) -> Option<String>;
}
