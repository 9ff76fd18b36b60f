//! One synchronisation pass: materialise a configured source into a workspace.
//!
//! This module ties the other components together for a single source of a build:
//!   - Primary sources: resolve the pipeline script ([`crate::resolver`]) and fetch it
//!   - Auxiliary sources: fetch every file under the library path, prefix stripped
//!   - Changelog: claim the build session ([`crate::session`]), reconcile
//!     ([`crate::changelog`]) and persist the record
//!   - Report the revision the next build should use as its baseline
//!
//! # Error Handling
//! A missing script, a failed listing for a library, a failed reconcile and any changelog
//! write failure abort the pass. Individual library files that cannot be fetched or written
//! are logged and skipped. Failing to compute the next baseline is logged and reported as
//! `None`.
//!
//! # Navigation
//! - Main entrypoint: [`checkout`]
//! - Supporting types: [`CheckoutRequest`], [`CheckoutReport`]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::changelog::{reconcile, ChangelogRecord};
use crate::config::{SourceConfig, SyncSettings};
use crate::contract::{HostBuild, RemoteGateway};
use crate::error::{Result, SyncError};
use crate::resolver::{resolve_script_in_tree, ResolvedScript};
use crate::revision::{current_revision_state, RevisionState};
use crate::session::{BuildSyncSession, ChangelogPlan, SourceRole};
use crate::tree::RevisionTree;

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub source: SourceConfig,
    pub workspace: PathBuf,
    /// Where to write this pass's changelog. No changelog handling at all when absent.
    pub changelog: Option<PathBuf>,
}

#[derive(Debug)]
pub struct CheckoutReport {
    pub role: SourceRole,
    pub repository_id: String,
    /// Script chosen for a primary pass.
    pub script: Option<ResolvedScript>,
    /// Workspace files written, in fetch order.
    pub written: Vec<PathBuf>,
    /// Remote paths that were skipped, with the reason.
    pub skipped: Vec<(String, String)>,
    pub changelog_plan: Option<ChangelogPlan>,
    pub changelog_entries: usize,
    /// Baseline for the next build.
    pub state: Option<RevisionState>,
}

pub async fn checkout<H>(
    gateway: Arc<dyn RemoteGateway>,
    host: &H,
    session: &BuildSyncSession,
    request: &CheckoutRequest,
    settings: &SyncSettings,
) -> Result<CheckoutReport>
where
    H: HostBuild + ?Sized,
{
    let source = &request.source;
    if source.repository_id.trim().is_empty() {
        return Err(SyncError::ConfigurationInvalid(
            "repository id is required".to_string(),
        ));
    }
    let role = source.effective_role(&request.workspace);
    let repository_id = source.repository_id.as_str();
    let reference = source.branch.as_str();

    info!(
        build_id = %session.build_id(),
        repository_id,
        reference,
        role = %role,
        workspace = %request.workspace.display(),
        "[SYNC] Starting checkout"
    );

    let mut report = CheckoutReport {
        role,
        repository_id: repository_id.to_string(),
        script: None,
        written: Vec::new(),
        skipped: Vec::new(),
        changelog_plan: None,
        changelog_entries: 0,
        state: None,
    };

    match role {
        SourceRole::Primary => {
            checkout_script(Arc::clone(&gateway), host, request, settings, &mut report).await?
        }
        SourceRole::Auxiliary => {
            checkout_library(Arc::clone(&gateway), request, settings, &mut report).await?
        }
    }

    if let Some(destination) = &request.changelog {
        let same_repository = host
            .primary_repository_id()
            .is_some_and(|primary| primary == repository_id);
        let decision = session.claim(role, same_repository, destination);

        if let Some(provisional) = &decision.retract {
            session.retract(provisional)?;
        }

        let record = match decision.plan {
            ChangelogPlan::Full => {
                let previous = host.previous_state();
                let baseline = previous.as_ref().and_then(|state| state.revision());
                match reconcile(
                    gateway.as_ref(),
                    repository_id,
                    reference,
                    baseline,
                    settings.commit_window,
                )
                .await
                {
                    Ok(record) => record,
                    Err(e) => {
                        error!(repository_id, error = %e, "[SYNC][ERROR] Changelog reconciliation failed");
                        return Err(e);
                    }
                }
            }
            ChangelogPlan::Empty => ChangelogRecord::empty(),
        };
        let applied = session.commit(role, decision.plan, destination, &record)?;
        let entries = match applied {
            ChangelogPlan::Full => record.len(),
            ChangelogPlan::Empty => 0,
        };
        info!(
            path = %destination.display(),
            plan = ?applied,
            entries,
            "[SYNC][CHANGELOG] Changelog written"
        );
        report.changelog_plan = Some(applied);
        report.changelog_entries = entries;
    }

    report.state = match current_revision_state(gateway.as_ref(), repository_id, reference).await {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(repository_id, error = %e, "[SYNC] Could not compute revision state");
            None
        }
    };

    info!(
        repository_id,
        written = report.written.len(),
        skipped = report.skipped.len(),
        "[SYNC] Checkout complete"
    );
    Ok(report)
}

async fn checkout_script<H>(
    gateway: Arc<dyn RemoteGateway>,
    host: &H,
    request: &CheckoutRequest,
    settings: &SyncSettings,
    report: &mut CheckoutReport,
) -> Result<()>
where
    H: HostBuild + ?Sized,
{
    let source = &request.source;
    let tree = Arc::new(
        RevisionTree::new(gateway, source.repository_id.clone(), source.branch.clone())
            .with_conventional_dirs(settings.conventional_dirs.clone()),
    );
    let job = host.job_name();
    let resolved = resolve_script_in_tree(
        &tree,
        source.script_path.as_deref(),
        &job,
        &settings.default_script_name,
        &settings.naming(),
    )
    .await;
    info!(job = %job, script = ?resolved, "[SYNC] Script resolved");

    let path = resolved.path().trim_start_matches('/');
    if !is_safe_relative(path) {
        return Err(SyncError::ConfigurationInvalid(format!(
            "refusing to write script outside the workspace: {path}"
        )));
    }
    let content = match tree.root_node().child(path).content().await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(path, error = %e, "[SYNC][ERROR] Script fetch failed");
            return Err(e.into());
        }
    };
    let target = write_into(&request.workspace, path, &content)?;
    report.written.push(target);
    report.script = Some(resolved);
    Ok(())
}

async fn checkout_library(
    gateway: Arc<dyn RemoteGateway>,
    request: &CheckoutRequest,
    settings: &SyncSettings,
    report: &mut CheckoutReport,
) -> Result<()> {
    let source = &request.source;
    let root = source.library_root();
    let tree = RevisionTree::new(
        Arc::clone(&gateway),
        source.repository_id.clone(),
        source.branch.clone(),
    )
    .with_root(root)
    .with_conventional_dirs(settings.conventional_dirs.clone());

    let index = tree.index().await?;
    let files = index.files_under(tree.root_path());
    info!(library_path = %tree.root_path(), files = files.len(), "[SYNC] Fetching library files");

    for remote_path in files {
        let relative = strip_root(remote_path, tree.root_path());
        if !is_safe_relative(relative) {
            warn!(path = remote_path, "[SYNC] Skipping path escaping the workspace");
            report
                .skipped
                .push((remote_path.to_string(), "unsafe path".to_string()));
            continue;
        }
        let content = match gateway
            .read_blob(tree.repository_id(), tree.reference(), remote_path)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = remote_path, error = %e, "[SYNC] Library file fetch failed, skipping");
                report.skipped.push((remote_path.to_string(), e.to_string()));
                continue;
            }
        };
        match write_into(&request.workspace, relative, &content) {
            Ok(target) => {
                debug!(path = %target.display(), bytes = content.len(), "[SYNC] Library file written");
                report.written.push(target);
            }
            Err(e) => {
                warn!(path = remote_path, error = %e, "[SYNC] Library file write failed, skipping");
                report.skipped.push((remote_path.to_string(), e.to_string()));
            }
        }
    }
    Ok(())
}

fn strip_root<'a>(path: &'a str, root: &str) -> &'a str {
    if root.is_empty() {
        return path;
    }
    path.strip_prefix(root)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(path)
}

fn is_safe_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.split(['/', '\\']).any(|segment| segment == "..")
}

fn write_into(workspace: &Path, relative: &str, content: &[u8]) -> Result<PathBuf> {
    let target = workspace.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&target, content)?;
    Ok(target)
}
