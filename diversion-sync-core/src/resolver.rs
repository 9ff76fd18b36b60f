//! Script path resolution for primary-source checkouts.
//!
//! Priority, first match wins:
//! 1. an explicitly configured path, returned verbatim without an existence check;
//! 2. for a request of the default script name (case-insensitive), a scan of the listing for
//!    `{job}.{ext}`, then `{job}`, then the default name, each matched as a path suffix;
//! 3. the constructed `{job}.{ext}`, unverified. A later blob fetch reports it missing.
//!
//! Matching walks the listing in the order the gateway returned it; it is never re-sorted.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::PathEntry;
use crate::tree::RevisionTree;

pub const DEFAULT_SCRIPT_NAME: &str = "Jenkinsfile";
pub const DEFAULT_SCRIPT_EXTENSION: &str = "groovy";

/// Naming conventions for pipeline scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptNaming {
    pub default_name: String,
    pub extension: String,
}

impl Default for ScriptNaming {
    fn default() -> Self {
        Self {
            default_name: DEFAULT_SCRIPT_NAME.to_string(),
            extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
        }
    }
}

/// Outcome of script resolution, tagged with how it was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedScript {
    Configured(String),
    Detected(String),
    Fallback(String),
    /// A non-default name was requested and is used as is.
    AsRequested(String),
}

impl ResolvedScript {
    pub fn path(&self) -> &str {
        match self {
            ResolvedScript::Configured(p)
            | ResolvedScript::Detected(p)
            | ResolvedScript::Fallback(p)
            | ResolvedScript::AsRequested(p) => p,
        }
    }

    pub fn into_path(self) -> String {
        match self {
            ResolvedScript::Configured(p)
            | ResolvedScript::Detected(p)
            | ResolvedScript::Fallback(p)
            | ResolvedScript::AsRequested(p) => p,
        }
    }
}

/// Resolve the script to fetch for `job` against an already-fetched listing.
pub fn resolve_script_path(
    listing: &[PathEntry],
    configured: Option<&str>,
    job: &str,
    requested: &str,
    naming: &ScriptNaming,
) -> ResolvedScript {
    if let Some(path) = configured.filter(|p| !p.trim().is_empty()) {
        return ResolvedScript::Configured(path.to_string());
    }

    if !requested.eq_ignore_ascii_case(&naming.default_name) {
        return ResolvedScript::AsRequested(requested.to_string());
    }

    let mut candidates = Vec::with_capacity(3);
    if !job.is_empty() {
        candidates.push(format!("{job}.{}", naming.extension));
        candidates.push(job.to_string());
    }
    candidates.push(naming.default_name.clone());

    for candidate in &candidates {
        if let Some(entry) = listing
            .iter()
            .find(|entry| matches_suffix(&entry.path, candidate))
        {
            debug!(candidate = %candidate, path = %entry.path, "[RESOLVE] Script detected");
            return ResolvedScript::Detected(entry.path.clone());
        }
    }

    if job.is_empty() {
        return ResolvedScript::AsRequested(requested.to_string());
    }
    ResolvedScript::Fallback(format!("{job}.{}", naming.extension))
}

/// Like [`resolve_script_path`], pulling the listing from `tree`. A failed listing counts as
/// "nothing matched".
pub async fn resolve_script_in_tree(
    tree: &RevisionTree,
    configured: Option<&str>,
    job: &str,
    requested: &str,
    naming: &ScriptNaming,
) -> ResolvedScript {
    if configured.is_some_and(|p| !p.trim().is_empty()) {
        return resolve_script_path(&[], configured, job, requested, naming);
    }
    match tree.index().await {
        Ok(index) => resolve_script_path(index.entries(), configured, job, requested, naming),
        Err(e) => {
            warn!(error = %e, job, "[RESOLVE] Listing unavailable, skipping auto-detection");
            resolve_script_path(&[], configured, job, requested, naming)
        }
    }
}

fn matches_suffix(path: &str, name: &str) -> bool {
    path == name
        || path
            .strip_suffix(name)
            .is_some_and(|head| head.ends_with('/'))
}
