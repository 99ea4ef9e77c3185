//! Scripted in-memory repository shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dsa_mirror::config::Config;
use dsa_mirror::metadata::extract_metadata;
use dsa_mirror::models::{
    filename_of, CommitDetail, CommitFile, CommitSummary, FileContent, FileStatus, TreeEntry,
};
use dsa_mirror::repo_client::{
    CommitQuery, ConnectionStatus, Freshness, RepoError, RepositoryClient,
};
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

#[derive(Clone)]
struct FakeCommit {
    sha: String,
    committed_at: DateTime<Utc>,
    files: Vec<CommitFile>,
}

#[derive(Default)]
struct RepoState {
    /// path → (blob sha, code)
    files: BTreeMap<String, (String, String)>,
    /// Oldest first.
    commits: Vec<FakeCommit>,
    fail_tree: bool,
    fail_commit_list: bool,
    empty_tree: bool,
    ignore_since: bool,
    fail_files: HashSet<String>,
    fail_details: HashSet<String>,
}

/// A repository whose tree and history are scripted by the test.
#[derive(Default)]
pub struct FakeRepo {
    state: Mutex<RepoState>,
    pub file_fetches: AtomicUsize,
    pub cache_clears: AtomicUsize,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_file(&self, path: &str, sha: &str, code: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), (sha.to_string(), code.to_string()));
    }

    /// Records a commit that adds or modifies `path` to blob `sha`.
    pub fn commit_write(&self, commit: &str, at: DateTime<Utc>, path: &str, sha: &str, code: &str) {
        let status = if self.state.lock().unwrap().files.contains_key(path) {
            FileStatus::Modified
        } else {
            FileStatus::Added
        };
        self.put_file(path, sha, code);
        self.push_commit(
            commit,
            at,
            vec![CommitFile {
                filename: path.to_string(),
                status,
                sha: Some(sha.to_string()),
                previous_filename: None,
            }],
        );
    }

    /// Records a commit that deletes `path`.
    pub fn commit_remove(&self, commit: &str, at: DateTime<Utc>, path: &str) {
        self.state.lock().unwrap().files.remove(path);
        self.push_commit(
            commit,
            at,
            vec![CommitFile {
                filename: path.to_string(),
                status: FileStatus::Removed,
                sha: None,
                previous_filename: None,
            }],
        );
    }

    /// Records a commit with an arbitrary changeset; the tree is not touched.
    pub fn push_commit(&self, commit: &str, at: DateTime<Utc>, files: Vec<CommitFile>) {
        self.state.lock().unwrap().commits.push(FakeCommit {
            sha: commit.to_string(),
            committed_at: at,
            files,
        });
    }

    pub fn fail_tree(&self, fail: bool) {
        self.state.lock().unwrap().fail_tree = fail;
    }

    pub fn fail_commit_list(&self, fail: bool) {
        self.state.lock().unwrap().fail_commit_list = fail;
    }

    /// Tree listing succeeds but comes back empty.
    pub fn empty_tree(&self, empty: bool) {
        self.state.lock().unwrap().empty_tree = empty;
    }

    /// Return commits regardless of the `since` bound, as an API with a
    /// coarse time filter would.
    pub fn ignore_since(&self, ignore: bool) {
        self.state.lock().unwrap().ignore_since = ignore;
    }

    pub fn fail_file(&self, path: &str) {
        self.state.lock().unwrap().fail_files.insert(path.to_string());
    }

    pub fn fail_detail(&self, commit: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_details
            .insert(commit.to_string());
    }

    pub fn file_fetch_count(&self) -> usize {
        self.file_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryClient for FakeRepo {
    async fn get_tree(
        &self,
        prefix: &str,
        _freshness: Freshness<'_>,
    ) -> Result<Vec<TreeEntry>, RepoError> {
        let state = self.state.lock().unwrap();
        if state.fail_tree {
            return Err(RepoError::RateLimited("tree fetch (HTTP 403)".into()));
        }
        if state.empty_tree {
            return Ok(Vec::new());
        }
        Ok(state
            .files
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(path, (sha, code))| TreeEntry {
                path: path.clone(),
                entry_type: "blob".to_string(),
                sha: sha.clone(),
                size: Some(code.len() as u64),
            })
            .collect())
    }

    async fn get_file_content(
        &self,
        path: &str,
        _freshness: Freshness<'_>,
    ) -> Result<FileContent, RepoError> {
        self.file_fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.fail_files.contains(path) {
            return Err(RepoError::Api(format!("file fetch failed (HTTP 500): {}", path)));
        }
        let (sha, code) = state
            .files
            .get(path)
            .ok_or_else(|| RepoError::Api(format!("File not found: {}", path)))?;
        Ok(FileContent {
            path: path.to_string(),
            code: code.clone(),
            sha: sha.clone(),
            size: code.len() as u64,
            html_url: Some(format!("https://github.com/octo/dsa/blob/main/{}", path)),
            metadata: extract_metadata(code),
        })
    }

    async fn list_commits(&self, query: &CommitQuery<'_>) -> Result<Vec<CommitSummary>, RepoError> {
        let state = self.state.lock().unwrap();
        if state.fail_commit_list {
            return Err(RepoError::Api("commit list failed (HTTP 502)".into()));
        }

        let mut matching: Vec<&FakeCommit> = state
            .commits
            .iter()
            .filter(|c| c.files.iter().any(|f| f.filename.starts_with(query.path)))
            .filter(|c| state.ignore_since || query.since.map_or(true, |s| c.committed_at >= s))
            .collect();
        matching.reverse();
        matching.sort_by(|a, b| b.committed_at.cmp(&a.committed_at));

        let skip = (query.page.saturating_sub(1) * query.per_page) as usize;
        Ok(matching
            .into_iter()
            .skip(skip)
            .take(query.per_page as usize)
            .map(|c| CommitSummary {
                sha: c.sha.clone(),
                committed_at: c.committed_at,
                message: format!("update {}", filename_of(&c.files[0].filename)),
            })
            .collect())
    }

    async fn get_commit_detail(&self, sha: &str) -> Result<CommitDetail, RepoError> {
        let state = self.state.lock().unwrap();
        if state.fail_details.contains(sha) {
            return Err(RepoError::RateLimited("commit detail (HTTP 429)".into()));
        }
        let commit = state
            .commits
            .iter()
            .find(|c| c.sha == sha)
            .ok_or_else(|| RepoError::Api(format!("commit detail failed (HTTP 404): {}", sha)))?;
        Ok(CommitDetail {
            sha: commit.sha.clone(),
            committed_at: commit.committed_at,
            files: commit.files.clone(),
        })
    }

    async fn check_connection(&self) -> Result<ConnectionStatus, RepoError> {
        Ok(ConnectionStatus {
            status: "connected".to_string(),
            repo: "octo/dsa".to_string(),
            visibility: Some("public".to_string()),
            last_updated: None,
        })
    }

    fn clear_cache(&self) -> usize {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
        0
    }
}

pub fn test_config(tmp: &TempDir, extra: &str) -> Config {
    let db_path = tmp.path().join("dsa.sqlite");
    let content = format!(
        r#"
[db]
path = "{}"

[github]
owner = "octo"
repo = "dsa"

{}
"#,
        db_path.display(),
        extra
    );
    toml::from_str(&content).unwrap()
}

/// Fresh database with the schema applied.
pub async fn test_pool(tmp: &TempDir) -> SqlitePool {
    let cfg = test_config(tmp, "");
    let pool = dsa_mirror::db::connect(&cfg).await.unwrap();
    dsa_mirror::migrate::apply_schema(&pool).await.unwrap();
    pool
}

pub const TWO_SUM: &str = "solutions/arrays/two-sum.py";

pub const TWO_SUM_CODE: &str = "# @difficulty: Easy\n# @tags: array, hash-map\n# @time: O(n)\n# @space: O(n)\n# @leetcode: https://leetcode.com/problems/two-sum/\n\ndef two_sum(nums, target):\n    pass\n";
