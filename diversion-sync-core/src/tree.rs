//! Virtual file tree reconstructed from a flat `(path, has_blob)` listing.
//!
//! The listing for one `(repository, reference)` pair is fetched once per [`RevisionTree`]
//! and grouped in a single pass into a [`TreeIndex`]: directory path → ordered child names,
//! full path → kind. Every later query is a map lookup.
//!
//! Classification rules:
//! - a path with anything nested under it is a [`NodeKind::Directory`], whatever its blob flag;
//! - a leaf is a [`NodeKind::File`] only when it carries a blob, otherwise it is an empty directory;
//! - a name seen once as a directory is never downgraded.
//!
//! If the listing cannot be fetched the whole tree reads as absent: [`RevisionTree::resolve`]
//! answers [`NodeKind::Nonexistent`] for every path, while [`RevisionTree::build_children`]
//! hands the gateway error to the caller. The exception is the fast path: the tree root
//! (including `""`) and the conventional directories directly under it resolve as
//! [`NodeKind::Directory`] without consulting the listing, so they stay directories even then.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::contract::{PathEntry, RemoteGateway};
use crate::error::GatewayError;

/// Resolved kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    File,
    Directory,
    Nonexistent,
}

/// Index over one revision's listing, built once and shared by every node of the tree.
#[derive(Debug)]
pub struct TreeIndex {
    entries: Vec<PathEntry>,
    kinds: HashMap<String, NodeKind>,
    children: HashMap<String, Vec<String>>,
}

impl TreeIndex {
    pub fn build(entries: Vec<PathEntry>) -> Self {
        let mut kinds: HashMap<String, NodeKind> = HashMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        children.insert(String::new(), Vec::new());

        for entry in &entries {
            let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
            let mut parent = String::new();

            for (i, segment) in segments.iter().enumerate() {
                let full = join_path(&parent, segment);
                let is_leaf = i + 1 == segments.len();
                let kind = if is_leaf && entry.has_blob {
                    NodeKind::File
                } else {
                    NodeKind::Directory
                };

                match kinds.get(&full).copied() {
                    None => {
                        children
                            .entry(parent.clone())
                            .or_default()
                            .push((*segment).to_string());
                        kinds.insert(full.clone(), kind);
                    }
                    Some(NodeKind::File) if kind == NodeKind::Directory => {
                        kinds.insert(full.clone(), NodeKind::Directory);
                    }
                    _ => {}
                }

                if kinds.get(&full) == Some(&NodeKind::Directory) {
                    children.entry(full.clone()).or_default();
                }
                parent = full;
            }
        }

        Self {
            entries,
            kinds,
            children,
        }
    }

    /// Kind of `path`; the empty path is the repository root.
    pub fn kind(&self, path: &str) -> NodeKind {
        let path = normalize(path);
        if path.is_empty() {
            return NodeKind::Directory;
        }
        self.kinds
            .get(path)
            .copied()
            .unwrap_or(NodeKind::Nonexistent)
    }

    /// Direct children of `path` in first-seen listing order. Empty for files and absent paths.
    pub fn children(&self, path: &str) -> Vec<(String, NodeKind)> {
        let path = normalize(path);
        self.children
            .get(path)
            .map(|names| {
                names
                    .iter()
                    .map(|name| {
                        let kind = self.kind(&join_path(path, name));
                        (name.clone(), kind)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The listing exactly as the gateway returned it.
    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    /// Every file path under `prefix` (empty = whole repository), in listing order.
    pub fn files_under(&self, prefix: &str) -> Vec<&str> {
        let prefix = normalize(prefix);
        self.entries
            .iter()
            .map(|entry| normalize(&entry.path))
            .filter(|path| self.kinds.get(*path) == Some(&NodeKind::File))
            .filter(|path| {
                prefix.is_empty()
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .collect()
    }
}

/// A lazily-fetched, navigable view of one revision of a remote repository.
pub struct RevisionTree {
    gateway: Arc<dyn RemoteGateway>,
    repository_id: String,
    reference: String,
    root: String,
    conventional_dirs: Vec<String>,
    index: OnceCell<Result<Arc<TreeIndex>, GatewayError>>,
    last_modified: Mutex<Option<i64>>,
}

impl RevisionTree {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        repository_id: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            repository_id: repository_id.into(),
            reference: reference.into(),
            root: String::new(),
            conventional_dirs: Vec::new(),
            index: OnceCell::new(),
            last_modified: Mutex::new(None),
        }
    }

    /// Roots navigation at a library path instead of the repository root.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = normalize(&root.into()).to_string();
        self
    }

    /// Top-level directory names (relative to the root) that resolve without a listing scan.
    pub fn with_conventional_dirs(mut self, dirs: Vec<String>) -> Self {
        self.conventional_dirs = dirs;
        self
    }

    pub fn repository_id(&self) -> &str {
        &self.repository_id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn root_path(&self) -> &str {
        &self.root
    }

    /// The grouped listing, fetched on first use. A failed fetch is cached as well.
    pub async fn index(&self) -> Result<Arc<TreeIndex>, GatewayError> {
        self.index
            .get_or_init(|| async {
                match self
                    .gateway
                    .list_paths(&self.repository_id, &self.reference)
                    .await
                {
                    Ok(entries) => {
                        info!(
                            repository_id = %self.repository_id,
                            reference = %self.reference,
                            entries = entries.len(),
                            "[TREE] Listing fetched"
                        );
                        Ok(Arc::new(TreeIndex::build(entries)))
                    }
                    Err(e) => {
                        warn!(
                            repository_id = %self.repository_id,
                            reference = %self.reference,
                            error = %e,
                            "[TREE] Listing fetch failed, tree reads as absent"
                        );
                        Err(e)
                    }
                }
            })
            .await
            .clone()
    }

    /// Kind of a repository-relative path.
    pub async fn resolve(&self, path: &str) -> NodeKind {
        if self.is_fast_path(path) {
            debug!(path, "[TREE] Fast-path directory");
            return NodeKind::Directory;
        }
        match self.index().await {
            Ok(index) => index.kind(path),
            Err(_) => NodeKind::Nonexistent,
        }
    }

    /// Direct children of a repository-relative path, kinds already resolved.
    pub async fn build_children(
        self: &Arc<Self>,
        parent_path: &str,
    ) -> Result<Vec<TreeNode>, GatewayError> {
        let parent = normalize(parent_path);
        let index = self.index().await?;
        Ok(index
            .children(parent)
            .into_iter()
            .map(|(name, kind)| TreeNode {
                tree: Arc::clone(self),
                full_path: join_path(parent, &name),
                name,
                kind: OnceCell::from(kind),
            })
            .collect())
    }

    /// Node for the configured root (library path or repository root).
    pub fn root_node(self: &Arc<Self>) -> TreeNode {
        let name = self.root.rsplit('/').next().unwrap_or_default().to_string();
        TreeNode {
            tree: Arc::clone(self),
            name,
            full_path: self.root.clone(),
            kind: OnceCell::new(),
        }
    }

    /// Creation time (unix seconds) of the reference's head commit.
    ///
    /// Cached until [`RevisionTree::invalidate_last_modified`]. When the head cannot be read the
    /// current time is returned, so consumers reload rather than keep stale content.
    pub async fn last_modified(&self) -> i64 {
        if let Some(cached) = *self.last_modified.lock() {
            return cached;
        }
        let timestamp = match crate::revision::head_commit(
            self.gateway.as_ref(),
            &self.repository_id,
            &self.reference,
        )
        .await
        {
            Ok(commit) => commit.created_at,
            Err(e) => {
                warn!(
                    repository_id = %self.repository_id,
                    error = %e,
                    "[TREE] Head commit lookup failed, using current time"
                );
                chrono::Utc::now().timestamp()
            }
        };
        *self.last_modified.lock() = Some(timestamp);
        timestamp
    }

    pub fn invalidate_last_modified(&self) {
        *self.last_modified.lock() = None;
    }

    fn is_fast_path(&self, path: &str) -> bool {
        let path = normalize(path);
        let relative = if self.root.is_empty() {
            Some(path)
        } else if path == self.root {
            Some("")
        } else {
            path.strip_prefix(self.root.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
        };
        match relative {
            Some("") => true,
            Some(rel) => self.conventional_dirs.iter().any(|dir| dir == rel),
            None => false,
        }
    }
}

/// A node of a [`RevisionTree`]. Its kind is resolved at most once.
#[derive(Clone)]
pub struct TreeNode {
    tree: Arc<RevisionTree>,
    name: String,
    full_path: String,
    kind: OnceCell<NodeKind>,
}

impl std::fmt::Debug for TreeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeNode")
            .field("full_path", &self.full_path)
            .field("kind", &self.kind.get())
            .finish()
    }
}

impl TreeNode {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path relative to the repository root.
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Path relative to the tree's root.
    pub fn relative_path(&self) -> &str {
        let root = self.tree.root_path();
        if root.is_empty() {
            return &self.full_path;
        }
        self.full_path
            .strip_prefix(root)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(&self.full_path)
    }

    /// The kind if it has already been resolved; `None` means unknown.
    pub fn cached_kind(&self) -> Option<NodeKind> {
        self.kind.get().copied()
    }

    pub async fn kind(&self) -> NodeKind {
        *self
            .kind
            .get_or_init(|| async { self.tree.resolve(&self.full_path).await })
            .await
    }

    pub async fn is_file(&self) -> bool {
        self.kind().await == NodeKind::File
    }

    pub async fn is_directory(&self) -> bool {
        self.kind().await == NodeKind::Directory
    }

    /// Unresolved handle for a child; nothing is fetched until it is queried.
    pub fn child(&self, name: &str) -> TreeNode {
        let full_path = name
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.full_path.clone(), |acc, segment| join_path(&acc, segment));
        let name = full_path.rsplit('/').next().unwrap_or_default().to_string();
        TreeNode {
            tree: Arc::clone(&self.tree),
            name,
            full_path,
            kind: OnceCell::new(),
        }
    }

    pub async fn children(&self) -> Result<Vec<TreeNode>, GatewayError> {
        self.tree.build_children(&self.full_path).await
    }

    /// Blob content. Errors propagate: a missing file is the caller's failure to surface.
    pub async fn content(&self) -> Result<Vec<u8>, GatewayError> {
        self.tree
            .gateway
            .read_blob(self.tree.repository_id(), self.tree.reference(), &self.full_path)
            .await
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(rows: &[(&str, bool)]) -> Vec<PathEntry> {
        rows.iter()
            .map(|(path, has_blob)| PathEntry {
                path: path.to_string(),
                has_blob: *has_blob,
            })
            .collect()
    }

    #[test]
    fn nested_entries_win_over_blob_flag() {
        let index = TreeIndex::build(listing(&[
            ("vars", true),
            ("vars/build.groovy", true),
            ("README.md", true),
        ]));
        assert_eq!(index.kind("vars"), NodeKind::Directory);
        assert_eq!(index.kind("README.md"), NodeKind::File);
        assert_eq!(index.kind("vars/build.groovy"), NodeKind::File);
    }

    #[test]
    fn directory_is_never_downgraded() {
        let index = TreeIndex::build(listing(&[("a/b", true), ("a", true)]));
        assert_eq!(index.kind("a"), NodeKind::Directory);
        assert_eq!(index.children(""), vec![("a".to_string(), NodeKind::Directory)]);
    }

    #[test]
    fn leaf_without_blob_is_an_empty_directory() {
        let index = TreeIndex::build(listing(&[("empty", false)]));
        assert_eq!(index.kind("empty"), NodeKind::Directory);
        assert!(index.children("empty").is_empty());
    }

    #[test]
    fn files_under_strips_nothing_and_keeps_order() {
        let index = TreeIndex::build(listing(&[
            ("lib/vars/b.groovy", true),
            ("lib", false),
            ("library/x.groovy", true),
            ("lib/vars/a.groovy", true),
        ]));
        assert_eq!(
            index.files_under("lib"),
            vec!["lib/vars/b.groovy", "lib/vars/a.groovy"]
        );
        assert_eq!(index.files_under("").len(), 3);
    }
}
