//! Per-build changelog deduplication.
//!
//! A build that checks out several sources must end up with exactly one non-empty changelog,
//! preferably the primary source's. Each pass [`claim`](BuildSyncSession::claim)s the
//! session before reconciling; the claim is a single check-and-set under the session lock, so
//! two concurrent passes of one build can never both be told to write a full changelog
//! (except for the auxiliary-then-primary hand-over, which retracts the provisional file).
//!
//! Reconciliation runs outside the lock, so the write is checked again: passes write through
//! [`commit`](BuildSyncSession::commit) and [`retract`](BuildSyncSession::retract), which hold
//! the session lock while touching the file. An auxiliary pass whose provisional claim was
//! taken over while it reconciled writes an empty record.
//!
//! Sessions are looked up through a [`SessionRegistry`] keyed by build identifier. Each session
//! carries its own lock; unrelated builds never contend.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::changelog::{write_changelog, ChangelogRecord};
use crate::error::Result;

/// Which configured source a pass is synchronising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRole {
    /// The source holding the pipeline script.
    Primary,
    /// A shared-library source.
    Auxiliary,
}

impl SourceRole {
    /// Hosts check out shared libraries into `...@libs/...` workspaces.
    pub fn from_workspace(workspace: &Path) -> Self {
        if workspace.to_string_lossy().contains("@libs") {
            SourceRole::Auxiliary
        } else {
            SourceRole::Primary
        }
    }
}

impl std::fmt::Display for SourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRole::Primary => f.write_str("primary"),
            SourceRole::Auxiliary => f.write_str("auxiliary"),
        }
    }
}

/// Who has written this build's changelog so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangelogMarker {
    #[default]
    Unset,
    WrittenByPrimary,
    WrittenByAuxiliary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangelogPlan {
    /// Reconcile and write the real changelog.
    Full,
    /// Write an explicit empty changelog.
    Empty,
}

/// What a pass must do with its changelog destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogDecision {
    pub plan: ChangelogPlan,
    /// A provisional auxiliary changelog to overwrite with an empty record.
    pub retract: Option<PathBuf>,
}

impl ChangelogDecision {
    fn full() -> Self {
        Self {
            plan: ChangelogPlan::Full,
            retract: None,
        }
    }

    fn empty() -> Self {
        Self {
            plan: ChangelogPlan::Empty,
            retract: None,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    marker: ChangelogMarker,
    provisional: Option<PathBuf>,
}

/// Deduplication state of one running build.
#[derive(Debug)]
pub struct BuildSyncSession {
    build_id: String,
    state: Mutex<SessionState>,
}

impl BuildSyncSession {
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            build_id: build_id.into(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn marker(&self) -> ChangelogMarker {
        self.state.lock().marker
    }

    /// Decide what the calling pass writes and move the marker accordingly.
    ///
    /// `same_repository_as_primary` only matters for an auxiliary pass on an unset marker;
    /// pass `false` when the primary repository is unknown.
    pub fn claim(
        &self,
        role: SourceRole,
        same_repository_as_primary: bool,
        destination: &Path,
    ) -> ChangelogDecision {
        let mut state = self.state.lock();
        let decision = match (state.marker, role) {
            (ChangelogMarker::Unset, SourceRole::Primary) => {
                state.marker = ChangelogMarker::WrittenByPrimary;
                ChangelogDecision::full()
            }
            (ChangelogMarker::Unset, SourceRole::Auxiliary) => {
                state.marker = ChangelogMarker::WrittenByAuxiliary;
                if same_repository_as_primary {
                    ChangelogDecision::empty()
                } else {
                    state.provisional = Some(destination.to_path_buf());
                    ChangelogDecision::full()
                }
            }
            (ChangelogMarker::WrittenByAuxiliary, SourceRole::Primary) => {
                state.marker = ChangelogMarker::WrittenByPrimary;
                ChangelogDecision {
                    plan: ChangelogPlan::Full,
                    retract: state.provisional.take(),
                }
            }
            (ChangelogMarker::WrittenByAuxiliary, SourceRole::Auxiliary)
            | (ChangelogMarker::WrittenByPrimary, _) => ChangelogDecision::empty(),
        };
        debug!(
            build_id = %self.build_id,
            role = %role,
            marker = ?state.marker,
            plan = ?decision.plan,
            "[SESSION] Changelog claim"
        );
        decision
    }

    /// Write a pass's changelog while holding the session lock.
    ///
    /// The full `record` is written only when the pass still owns its claim; otherwise an
    /// empty record is. Returns the plan that was actually applied.
    pub fn commit(
        &self,
        role: SourceRole,
        plan: ChangelogPlan,
        destination: &Path,
        record: &ChangelogRecord,
    ) -> Result<ChangelogPlan> {
        let state = self.state.lock();
        let owner = match (plan, role) {
            (ChangelogPlan::Full, SourceRole::Primary) => {
                state.marker == ChangelogMarker::WrittenByPrimary
            }
            (ChangelogPlan::Full, SourceRole::Auxiliary) => {
                state.provisional.as_deref() == Some(destination)
            }
            (ChangelogPlan::Empty, _) => false,
        };
        let applied = if owner {
            write_changelog(destination, record)?;
            ChangelogPlan::Full
        } else {
            write_changelog(destination, &ChangelogRecord::empty())?;
            ChangelogPlan::Empty
        };
        if plan != applied {
            info!(
                build_id = %self.build_id,
                path = %destination.display(),
                "[SESSION] Claim lost while reconciling, writing empty changelog"
            );
        }
        Ok(applied)
    }

    /// Overwrite a retracted provisional changelog with an empty record.
    pub fn retract(&self, provisional: &Path) -> Result<()> {
        let _state = self.state.lock();
        info!(
            build_id = %self.build_id,
            path = %provisional.display(),
            "[SESSION] Retracting provisional auxiliary changelog"
        );
        write_changelog(provisional, &ChangelogRecord::empty())
    }
}

/// Build identifier → session map.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<BuildSyncSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session of `build_id`, created on first use.
    pub fn session(&self, build_id: &str) -> Arc<BuildSyncSession> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(build_id.to_string())
            .or_insert_with(|| {
                info!(build_id, "[SESSION] New build session");
                Arc::new(BuildSyncSession::new(build_id))
            })
            .clone()
    }

    /// Forget a finished build. Returns whether a session existed.
    pub fn end(&self, build_id: &str) -> bool {
        let removed = self.sessions.lock().remove(build_id).is_some();
        if removed {
            debug!(build_id, "[SESSION] Build session ended");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
