#![doc = "HTTP gateway for the CLI: implements the core's RemoteGateway against the Diversion REST API."]
//
//! # Remote Gateway (CLI <-> Core)
//!
//! This module wires the [`RemoteGateway`] trait from `diversion-sync-core` to the Diversion
//! v0 REST API and provides the [`HttpGateway`] used by every CLI command that talks to the
//! remote.
//!
//! - Construct with [`HttpGateway::new_from_env`] (`DIVERSION_ACCESS_TOKEN`, optional
//!   `DIVERSION_API_URL`).
//! - The token is a pre-authenticated bearer token; obtaining and refreshing it is out of scope.
//! - Every failure is mapped to one [`GatewayError`] variant; nothing is retried here.

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{redirect, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;

use diversion_sync_core::contract::{
    Author, Branch, Commit, PathEntry, RemoteGateway, Repository, Tag,
};
use diversion_sync_core::error::GatewayError;

pub const DEFAULT_API_URL: &str = "https://api.diversion.dev/v0";
pub const TOKEN_ENV: &str = "DIVERSION_ACCESS_TOKEN";
pub const API_URL_ENV: &str = "DIVERSION_API_URL";

const BRANCH_ID_PREFIX: &str = "dv.branch.";

pub struct HttpGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> anyhow::Result<Self> {
        // Blob redirects carry presigned URLs and are followed by hand, without the bearer.
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Build from the environment. `configured_url` (from the YAML config) is used when
    /// `DIVERSION_API_URL` is unset.
    pub fn new_from_env(configured_url: Option<&str>) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let token = match env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => token,
            _ => {
                tracing::error!("{TOKEN_ENV} missing in environment");
                anyhow::bail!("{TOKEN_ENV} must be set to a Diversion access token");
            }
        };
        let base_url = env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .or_else(|| configured_url.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        tracing::info!(base_url = %base_url, "Initialized HttpGateway from environment");
        Self::new(base_url, token)
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn send(&self, url: &str) -> Result<Response, GatewayError> {
        tracing::debug!(url, "GET");
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| GatewayError::TransportFailure(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, GatewayError> {
        let url = self.url(endpoint);
        let response = check_status(self.send(&url).await?).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::TransportFailure(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(url = %url, error = %e, "Undecodable response body");
            GatewayError::Malformed(format!("{endpoint}: {e}"))
        })
    }
}

async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.as_u16() < 400 {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> GatewayError {
    let detail = format!("{status}: {body}");
    match status {
        StatusCode::NOT_FOUND => GatewayError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized(detail),
        _ => GatewayError::TransportFailure(detail),
    }
}

/// Collections come either wrapped in `{"items": [...]}` or as a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Wrapped { items: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Wrapped { items } => items,
            Listing::Bare(items) => items,
        }
    }
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(default)]
    blob: Option<serde_json::Value>,
}

impl From<TreeItem> for PathEntry {
    fn from(item: TreeItem) -> Self {
        PathEntry {
            path: item.path,
            has_blob: item.blob.is_some_and(|b| !b.is_null()),
        }
    }
}

#[derive(Deserialize)]
struct CommitBody {
    commit_id: String,
    #[serde(default)]
    created_ts: i64,
    #[serde(default)]
    commit_message: String,
    #[serde(default)]
    branch_id: Option<String>,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    files: Vec<serde_json::Value>,
}

impl From<CommitBody> for Commit {
    fn from(body: CommitBody) -> Self {
        let changed_paths = body
            .files
            .into_iter()
            .filter_map(|file| match file {
                serde_json::Value::String(path) => Some(path),
                serde_json::Value::Object(map) => map
                    .get("path")
                    .and_then(|p| p.as_str())
                    .map(str::to_string),
                _ => None,
            })
            .collect();
        Commit {
            id: body.commit_id,
            created_at: body.created_ts,
            message: body.commit_message,
            author: body.author.unwrap_or_default(),
            branch_id: body.branch_id,
            parent_ids: body.parents,
            changed_paths,
        }
    }
}

#[derive(Deserialize)]
struct BranchBody {
    #[serde(alias = "id")]
    branch_id: String,
    #[serde(alias = "name", default)]
    branch_name: String,
    #[serde(alias = "commit", default)]
    commit_id: Option<String>,
}

impl From<BranchBody> for Branch {
    fn from(body: BranchBody) -> Self {
        Branch {
            id: body.branch_id,
            name: body.branch_name,
            head_commit_id: body.commit_id,
        }
    }
}

#[derive(Deserialize)]
struct RepositoryBody {
    repo_id: String,
    #[serde(default)]
    repo_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    default_branch_id: Option<String>,
}

impl From<RepositoryBody> for Repository {
    fn from(body: RepositoryBody) -> Self {
        Repository {
            id: body.repo_id,
            name: body.repo_name,
            description: body.description.unwrap_or_default(),
            default_branch: body.default_branch_id.unwrap_or_else(|| "main".to_string()),
        }
    }
}

#[derive(Deserialize)]
struct TagBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    commit_id: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    author: Option<Author>,
    #[serde(default)]
    time: i64,
}

impl From<TagBody> for Tag {
    fn from(body: TagBody) -> Self {
        Tag {
            id: body.id,
            name: body.name,
            commit_id: body.commit_id,
            description: body.description,
            author: body.author,
            time: body.time,
        }
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list_paths(
        &self,
        repository_id: &str,
        reference: &str,
    ) -> Result<Vec<PathEntry>, GatewayError> {
        let items: Listing<TreeItem> = self
            .get_json(&format!("/repos/{repository_id}/trees/{reference}"))
            .await?;
        let entries: Vec<PathEntry> = items.into_vec().into_iter().map(Into::into).collect();
        tracing::info!(repository_id, reference, entries = entries.len(), "Fetched tree listing");
        Ok(entries)
    }

    async fn read_blob(
        &self,
        repository_id: &str,
        reference: &str,
        path: &str,
    ) -> Result<Vec<u8>, GatewayError> {
        let url = self.url(&format!(
            "/repos/{repository_id}/blobs/{reference}/{}",
            urlencoding::encode(path)
        ));
        let response = check_status(self.send(&url).await?).await?;

        let response = match response.status() {
            StatusCode::NO_CONTENT | StatusCode::FOUND => {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        GatewayError::Malformed(format!(
                            "blob redirect for {path} carries no Location header"
                        ))
                    })?;
                tracing::debug!(path, "Following blob redirect");
                let redirected = self
                    .client
                    .get(&location)
                    .send()
                    .await
                    .map_err(|e| GatewayError::TransportFailure(e.to_string()))?;
                check_status(redirected).await?
            }
            _ => response,
        };

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GatewayError::TransportFailure(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn get_branch(
        &self,
        repository_id: &str,
        reference: &str,
    ) -> Result<Branch, GatewayError> {
        if reference.starts_with(BRANCH_ID_PREFIX) {
            let body: BranchBody = self
                .get_json(&format!("/repos/{repository_id}/branches/{reference}"))
                .await?;
            return Ok(body.into());
        }
        self.list_branches(repository_id)
            .await?
            .into_iter()
            .find(|branch| branch.name == reference)
            .ok_or_else(|| GatewayError::NotFound(format!("branch {reference}")))
    }

    async fn list_commits(
        &self,
        repository_id: &str,
        limit: usize,
    ) -> Result<Vec<Commit>, GatewayError> {
        let items: Listing<CommitBody> = self
            .get_json(&format!("/repos/{repository_id}/commits?limit={limit}"))
            .await?;
        Ok(items.into_vec().into_iter().map(Into::into).collect())
    }

    async fn get_commit(
        &self,
        repository_id: &str,
        commit_id: &str,
    ) -> Result<Commit, GatewayError> {
        let body: CommitBody = self
            .get_json(&format!("/repos/{repository_id}/commits/{commit_id}"))
            .await?;
        Ok(body.into())
    }

    async fn get_repository(&self, repository_id: &str) -> Result<Repository, GatewayError> {
        let body: RepositoryBody = self.get_json(&format!("/repos/{repository_id}")).await?;
        Ok(body.into())
    }

    async fn list_branches(&self, repository_id: &str) -> Result<Vec<Branch>, GatewayError> {
        let items: Listing<BranchBody> = self
            .get_json(&format!("/repos/{repository_id}/branches"))
            .await?;
        Ok(items.into_vec().into_iter().map(Into::into).collect())
    }

    async fn list_tags(&self, repository_id: &str) -> Result<Vec<Tag>, GatewayError> {
        let items: Listing<TagBody> = self
            .get_json(&format!("/repos/{repository_id}/tags"))
            .await?;
        Ok(items.into_vec().into_iter().map(Into::into).collect())
    }

    async fn get_tag(&self, repository_id: &str, tag_id: &str) -> Result<Tag, GatewayError> {
        let body: TagBody = self
            .get_json(&format!("/repos/{repository_id}/tags/{tag_id}"))
            .await?;
        Ok(body.into())
    }
}
