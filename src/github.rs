//! GitHub REST implementation of [`RepositoryClient`].
//!
//! # Endpoints used
//!
//! | Operation | Request |
//! |-----------|---------|
//! | tree | `GET /repos/{owner}/{repo}` then `GET /repos/{owner}/{repo}/git/trees/{branch}?recursive=1` |
//! | file | `GET /repos/{owner}/{repo}/contents/{path}` |
//! | commits | `GET /repos/{owner}/{repo}/commits?path=&since=&per_page=&page=` |
//! | commit | `GET /repos/{owner}/{repo}/commits/{sha}` |
//!
//! Tree listings and decoded files are kept in a [`TtlCache`] so repeated
//! explorer reads inside the TTL cost no API calls. Each read states its
//! [`Freshness`]: a cached file is only served when its blob hash is the
//! one asked for, and sync runs always list the live tree. Commit listings
//! are never cached because the sync cursor depends on seeing fresh history.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::{Config, GithubConfig};
use crate::metadata::extract_metadata;
use crate::models::{
    filename_of, CommitDetail, CommitFile, CommitSummary, FileContent, FileStatus, TreeEntry,
};
use crate::repo_client::{CommitQuery, ConnectionStatus, Freshness, RepoError, RepositoryClient};

const TREE_CACHE_KEY: &str = "repo_tree";

pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    owner: String,
    repo: String,
    trees: TtlCache<Vec<TreeEntry>>,
    files: TtlCache<FileContent>,
}

// ============ Wire types ============

#[derive(Deserialize)]
struct RepoInfo {
    full_name: String,
    default_branch: String,
    #[serde(default)]
    visibility: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct Signature {
    date: DateTime<Utc>,
}

#[derive(Deserialize)]
struct CommitBody {
    #[serde(default)]
    committer: Option<Signature>,
    #[serde(default)]
    author: Option<Signature>,
    #[serde(default)]
    message: String,
}

impl CommitBody {
    fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.committer
            .as_ref()
            .or(self.author.as_ref())
            .map(|s| s.date)
    }
}

#[derive(Deserialize)]
struct CommitListItem {
    sha: String,
    commit: CommitBody,
}

#[derive(Deserialize)]
struct FileChange {
    filename: String,
    status: String,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    previous_filename: Option<String>,
}

#[derive(Deserialize)]
struct CommitDetailResponse {
    sha: String,
    commit: CommitBody,
    #[serde(default)]
    files: Vec<FileChange>,
}

impl GitHubClient {
    pub fn new(config: &GithubConfig, token: Option<String>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static("2022-11-28"));
        headers.insert(USER_AGENT, HeaderValue::from_static("dsa-mirror"));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let ttl = Duration::from_secs(config.cache_ttl_secs);
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            trees: TtlCache::new(ttl),
            files: TtlCache::new(ttl),
        })
    }

    /// Builds a client from config, reading the token from the environment.
    pub fn from_config(config: &GithubConfig) -> anyhow::Result<Self> {
        Self::new(config, config.token())
    }

    /// Builds `{api_base}/repos/{owner}/{repo}/{segments...}` with each
    /// segment percent-encoded.
    fn repo_url(&self, segments: &[&str]) -> Result<Url, RepoError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| RepoError::Api(format!("invalid api base '{}': {}", self.api_base, e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RepoError::Api(format!("api base '{}' cannot hold a path", self.api_base)))?;
            path.pop_if_empty();
            path.extend(["repos", self.owner.as_str(), self.repo.as_str()]);
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T, RepoError> {
        debug!(url = %url, "github request");
        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| RepoError::Api(format!("{}: {}", what, e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(map_status(status, what));
        }

        resp.json::<T>()
            .await
            .map_err(|e| RepoError::Api(format!("{}: invalid response body: {}", what, e)))
    }

    async fn repo_info(&self) -> Result<RepoInfo, RepoError> {
        self.get_json(self.repo_url(&[])?, &[], "repository lookup")
            .await
    }

    async fn full_tree(&self, freshness: Freshness<'_>) -> Result<Vec<TreeEntry>, RepoError> {
        if let Some(tree) = self.trees.get(TREE_CACHE_KEY) {
            if freshness.accepts(None) {
                return Ok(tree);
            }
        }

        let info = self.repo_info().await?;
        let url = self.repo_url(&["git", "trees", info.default_branch.as_str()])?;
        let resp: TreeResponse = self
            .get_json(url, &[("recursive", "1".to_string())], "tree fetch")
            .await?;
        if resp.truncated {
            tracing::warn!("repository tree listing was truncated by the API");
        }

        self.trees.set(TREE_CACHE_KEY, resp.tree.clone());
        Ok(resp.tree)
    }
}

/// Run the check command: verify the token and repository and print the result.
pub async fn run_check(config: &Config) -> anyhow::Result<()> {
    let client = GitHubClient::from_config(&config.github)?;
    if config.github.token().is_none() {
        println!(
            "Warning: ${} is not set, using unauthenticated requests",
            config.github.token_env
        );
    }

    let status = client.check_connection().await?;
    println!("GitHub connection: {}", status.status);
    println!("  Repository:  {}", status.repo);
    println!(
        "  Visibility:  {}",
        status.visibility.as_deref().unwrap_or("unknown")
    );
    println!(
        "  Updated:     {}",
        status.last_updated.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

/// Maps a non-success HTTP status onto the two error kinds.
pub fn map_status(status: StatusCode, what: &str) -> RepoError {
    match status {
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            RepoError::RateLimited(format!("{} (HTTP {})", what, status.as_u16()))
        }
        _ => RepoError::Api(format!("{} failed (HTTP {})", what, status.as_u16())),
    }
}

/// Decodes a contents-API payload: base64 wrapped at 60 columns.
pub fn decode_content(raw: &str) -> Result<String, RepoError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| RepoError::Api(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| RepoError::Api(format!("content is not UTF-8: {}", e)))
}

fn missing_date(sha: &str) -> RepoError {
    RepoError::Api(format!("commit {} has no committer date", short_sha(sha)))
}

pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[async_trait]
impl RepositoryClient for GitHubClient {
    async fn get_tree(
        &self,
        prefix: &str,
        freshness: Freshness<'_>,
    ) -> Result<Vec<TreeEntry>, RepoError> {
        let tree = self.full_tree(freshness).await?;
        Ok(tree
            .into_iter()
            .filter(|entry| entry.path.starts_with(prefix))
            .collect())
    }

    async fn get_file_content(
        &self,
        path: &str,
        freshness: Freshness<'_>,
    ) -> Result<FileContent, RepoError> {
        let cache_key = format!("file_{}", path);
        if let Some(file) = self.files.get(&cache_key) {
            if freshness.accepts(Some(&file.sha)) {
                return Ok(file);
            }
            debug!(path, cached = short_sha(&file.sha), "cached file is stale, refetching");
        }

        let url = self.repo_url(&["contents", path])?;
        let resp: ContentsResponse = self
            .get_json(url, &[], "file fetch")
            .await
            .map_err(|e| match e {
                RepoError::Api(msg) if msg.contains("HTTP 404") => {
                    RepoError::Api(format!("File not found: {}", path))
                }
                other => other,
            })?;

        let code = decode_content(&resp.content)?;
        let metadata = extract_metadata(&code);
        let file = FileContent {
            path: path.to_string(),
            code,
            sha: resp.sha,
            size: resp.size,
            html_url: resp.html_url,
            metadata,
        };

        debug!(path, file = filename_of(path), "fetched file content");
        self.files.set(cache_key, file.clone());
        Ok(file)
    }

    async fn list_commits(&self, query: &CommitQuery<'_>) -> Result<Vec<CommitSummary>, RepoError> {
        let mut params = vec![
            ("path", query.path.to_string()),
            ("per_page", query.per_page.to_string()),
            ("page", query.page.to_string()),
        ];
        if let Some(since) = query.since {
            params.push(("since", since.to_rfc3339()));
        }

        let items: Vec<CommitListItem> = self
            .get_json(self.repo_url(&["commits"])?, &params, "commit list")
            .await?;

        items
            .into_iter()
            .map(|item| {
                let committed_at = item.commit.committed_at().ok_or_else(|| missing_date(&item.sha))?;
                Ok(CommitSummary {
                    sha: item.sha,
                    committed_at,
                    message: item.commit.message,
                })
            })
            .collect()
    }

    async fn get_commit_detail(&self, sha: &str) -> Result<CommitDetail, RepoError> {
        let resp: CommitDetailResponse = self
            .get_json(self.repo_url(&["commits", sha])?, &[], "commit detail")
            .await?;

        let committed_at = resp.commit.committed_at().ok_or_else(|| missing_date(&resp.sha))?;
        Ok(CommitDetail {
            sha: resp.sha,
            committed_at,
            files: resp
                .files
                .into_iter()
                .map(|f| CommitFile {
                    status: FileStatus::parse(&f.status),
                    filename: f.filename,
                    sha: f.sha,
                    previous_filename: f.previous_filename,
                })
                .collect(),
        })
    }

    async fn check_connection(&self) -> Result<ConnectionStatus, RepoError> {
        let info = self.repo_info().await.map_err(|e| match e {
            RepoError::Api(msg) if msg.contains("HTTP 401") => {
                RepoError::Api("Invalid GitHub token".to_string())
            }
            RepoError::Api(msg) if msg.contains("HTTP 404") => {
                RepoError::Api("Repository not found".to_string())
            }
            other => other,
        })?;
        Ok(ConnectionStatus {
            status: "connected".to_string(),
            repo: info.full_name,
            visibility: info.visibility,
            last_updated: info.updated_at,
        })
    }

    fn clear_cache(&self) -> usize {
        let evicted = self.trees.clear() + self.files.clear();
        tracing::info!(evicted, "GitHub cache cleared");
        evicted
    }
}
