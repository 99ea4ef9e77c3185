//! Remote repository capability consumed by the sync engine.
//!
//! The engine never talks HTTP itself. It is handed an implementation of
//! [`RepositoryClient`] once per process (the GitHub client in
//! [`crate::github`], or a scripted fake in tests) and calls it
//! sequentially during a run.
//!
//! # Error taxonomy
//!
//! Every operation fails with one of two [`RepoError`] kinds. Neither is
//! retried at this layer; the caller decides what a failure means:
//!
//! | Kind | Typical cause |
//! |------|---------------|
//! | [`RepoError::RateLimited`] | HTTP 403/429 from the API |
//! | [`RepoError::Api`] | Any other transport, status, or decoding failure |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::models::{CommitDetail, CommitSummary, FileContent, TreeEntry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("repository API error: {0}")]
    Api(String),
}

impl RepoError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RepoError::RateLimited(_))
    }
}

/// One page request against the commit history of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitQuery<'a> {
    /// Only commits touching this path (the tracked prefix).
    pub path: &'a str,
    /// Lower bound on commit time, inclusive. `None` means unbounded.
    pub since: Option<DateTime<Utc>>,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

/// How far a read may trust the implementation's response cache.
///
/// Sync runs must never record a new blob hash next to content read from
/// an older blob, so the engine asks for [`Freshness::Matching`] on files
/// and [`Freshness::Latest`] on trees. Explorer reads accept any cached copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness<'a> {
    /// Any unexpired cached copy will do.
    Cached,
    /// Only a copy of this blob hash will do; anything else is refetched.
    Matching(&'a str),
    /// Always ask the remote. The answer replaces the cached copy.
    Latest,
}

impl Freshness<'_> {
    /// Whether a cached value with blob hash `cached_sha` may be served.
    /// Values without a single hash (trees) pass `None`.
    pub fn accepts(&self, cached_sha: Option<&str>) -> bool {
        match self {
            Freshness::Cached => true,
            Freshness::Matching(expected) => cached_sha == Some(*expected),
            Freshness::Latest => false,
        }
    }
}

/// Result of a connection check against the configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub status: String,
    pub repo: String,
    pub visibility: Option<String>,
    pub last_updated: Option<String>,
}

/// Read access to a remote source-control repository.
///
/// Commit listings are returned newest first, as the GitHub API does.
/// Implementations own their response cache; [`clear_cache`](RepositoryClient::clear_cache)
/// empties it.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Lists tree entries whose path starts with `prefix`.
    async fn get_tree(
        &self,
        prefix: &str,
        freshness: Freshness<'_>,
    ) -> Result<Vec<TreeEntry>, RepoError>;

    /// Fetches and decodes a single file, extracting its header metadata.
    async fn get_file_content(
        &self,
        path: &str,
        freshness: Freshness<'_>,
    ) -> Result<FileContent, RepoError>;

    /// Returns one page of commits. An empty page means history is exhausted.
    async fn list_commits(&self, query: &CommitQuery<'_>) -> Result<Vec<CommitSummary>, RepoError>;

    /// Returns the per-file changeset of one commit.
    async fn get_commit_detail(&self, sha: &str) -> Result<CommitDetail, RepoError>;

    /// Verifies credentials and that the repository is reachable.
    async fn check_connection(&self) -> Result<ConnectionStatus, RepoError>;

    /// Drops cached responses, returning how many entries were evicted.
    fn clear_cache(&self) -> usize {
        0
    }
}
