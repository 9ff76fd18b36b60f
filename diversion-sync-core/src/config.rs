use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::changelog::DEFAULT_COMMIT_WINDOW;
use crate::error::{Result, SyncError};
use crate::resolver::{ScriptNaming, DEFAULT_SCRIPT_EXTENSION, DEFAULT_SCRIPT_NAME};
use crate::session::SourceRole;

pub const DEFAULT_BRANCH: &str = "main";
/// Library root used when an auxiliary source sets no `library_path`.
pub const DEFAULT_LIBRARY_PATH: &str = "Meta/Jenkins/SharedLibs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub settings: SyncSettings,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Remote API root; the environment may override it.
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Tunables shared by every source of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub commit_window: usize,
    pub script_extension: String,
    pub default_script_name: String,
    /// Directory names that always resolve as directories directly under a tree root.
    pub conventional_dirs: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            commit_window: DEFAULT_COMMIT_WINDOW,
            script_extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
            default_script_name: DEFAULT_SCRIPT_NAME.to_string(),
            conventional_dirs: vec!["vars".into(), "src".into(), "resources".into()],
        }
    }
}

impl SyncSettings {
    pub fn naming(&self) -> ScriptNaming {
        ScriptNaming {
            default_name: self.default_script_name.clone(),
            extension: self.script_extension.clone(),
        }
    }
}

/// One repository a build checks out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Inferred from the workspace path when omitted.
    #[serde(default)]
    pub role: Option<SourceRole>,
    pub repository_id: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub script_path: Option<String>,
    /// Unset or empty means [`DEFAULT_LIBRARY_PATH`]; `/` selects the whole repository.
    #[serde(default)]
    pub library_path: Option<String>,
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

impl SourceConfig {
    pub fn new(role: SourceRole, repository_id: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            repository_id: repository_id.into(),
            branch: default_branch(),
            script_path: None,
            library_path: None,
        }
    }

    pub fn library_root(&self) -> &str {
        self.library_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .unwrap_or(DEFAULT_LIBRARY_PATH)
    }

    pub fn effective_role(&self, workspace: &Path) -> SourceRole {
        self.role
            .unwrap_or_else(|| SourceRole::from_workspace(workspace))
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(SyncError::ConfigurationInvalid(
                "at least one source must be configured".to_string(),
            ));
        }
        if let Some(i) = self
            .sources
            .iter()
            .position(|s| s.repository_id.trim().is_empty())
        {
            return Err(SyncError::ConfigurationInvalid(format!(
                "source {i} has an empty repository_id"
            )));
        }
        let primaries = self
            .sources
            .iter()
            .filter(|s| s.role == Some(SourceRole::Primary))
            .count();
        if primaries > 1 {
            return Err(SyncError::ConfigurationInvalid(format!(
                "at most one primary source is allowed, found {primaries}"
            )));
        }
        if self.settings.commit_window == 0 {
            return Err(SyncError::ConfigurationInvalid(
                "settings.commit_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Role of every source checked out under `workspace`, omitted roles inferred from it.
    pub fn effective_roles(&self, workspace: &Path) -> Vec<SourceRole> {
        self.sources
            .iter()
            .map(|s| s.effective_role(workspace))
            .collect()
    }

    /// [`Config::effective_roles`], rejecting more than one primary after inference.
    pub fn validate_roles(&self, workspace: &Path) -> Result<Vec<SourceRole>> {
        let roles = self.effective_roles(workspace);
        let primaries = roles.iter().filter(|r| **r == SourceRole::Primary).count();
        if primaries > 1 {
            return Err(SyncError::ConfigurationInvalid(format!(
                "at most one primary source is allowed, found {primaries} for workspace {}; \
                 set `role: auxiliary` on library sources",
                workspace.display()
            )));
        }
        Ok(roles)
    }

    /// Repository of the source that is primary under `workspace`, if any.
    pub fn primary_repository_id(&self, workspace: &Path) -> Option<&str> {
        self.sources
            .iter()
            .find(|s| s.effective_role(workspace) == SourceRole::Primary)
            .map(|s| s.repository_id.as_str())
    }

    pub fn trace_loaded(&self) {
        info!(
            sources_count = self.sources.len(),
            commit_window = self.settings.commit_window,
            base_url = self.api.base_url.as_deref().unwrap_or("<default>"),
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }
}
