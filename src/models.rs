//! Core data models used throughout dsa-mirror.
//!
//! Three groups of types live here: rows of the local mirror (problems,
//! daily activity, topic aggregates, the sync cursor), values returned by
//! the remote repository client, and the reports a sync run produces.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============ Mirror rows ============

/// One mirrored solution file, keyed by its repo-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub path: String,
    pub filename: String,
    pub folder: Option<String>,
    pub language: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub time_complexity: Option<String>,
    pub space_complexity: Option<String>,
    pub leetcode_link: Option<String>,
    /// Blob hash recorded at the last sync that touched this file.
    pub sha: String,
    pub first_seen_at: i64,
    pub last_updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub commit_count: i64,
    pub problems_added: i64,
    pub problems_modified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicAggregate {
    pub folder: String,
    pub problem_count: i64,
    pub last_updated_file: Option<String>,
    pub last_updated_at: Option<i64>,
}

/// The singleton bookmark enabling incremental resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub last_commit_sha: Option<String>,
    pub last_synced_at: Option<i64>,
    pub total_commits_processed: i64,
}

// ============ Remote repository values ============

/// Classification fields extracted from a file's header annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub difficulty: String,
    pub tags: Vec<String>,
    pub time_complexity: Option<String>,
    pub space_complexity: Option<String>,
    pub leetcode_link: Option<String>,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            difficulty: "Medium".to_string(),
            tags: Vec::new(),
            time_complexity: None,
            space_complexity: None,
            leetcode_link: None,
        }
    }
}

/// One entry of the remote tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_file(&self) -> bool {
        self.entry_type == "blob"
    }
}

/// Decoded file content plus the metadata extracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileContent {
    pub path: String,
    pub code: String,
    pub sha: String,
    pub size: u64,
    pub html_url: Option<String>,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub sha: String,
    pub committed_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDetail {
    pub sha: String,
    pub committed_at: DateTime<Utc>,
    pub files: Vec<CommitFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    pub filename: String,
    pub status: FileStatus,
    /// Blob hash after the commit. Absent for some removals.
    pub sha: Option<String>,
    /// Old path of a rename.
    pub previous_filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Renamed,
    Removed,
    Other,
}

impl FileStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "added" => FileStatus::Added,
            "modified" | "changed" => FileStatus::Modified,
            "renamed" => FileStatus::Renamed,
            "removed" => FileStatus::Removed,
            _ => FileStatus::Other,
        }
    }
}

/// Outcome of comparing a remote blob hash with the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Modified,
    Unchanged,
}

/// No stored row means added; an identical stored hash means no-op.
pub fn classify(stored_sha: Option<&str>, incoming_sha: &str) -> Change {
    match stored_sha {
        None => Change::Added,
        Some(stored) if stored == incoming_sha => Change::Unchanged,
        Some(_) => Change::Modified,
    }
}

// ============ Path derivation ============

/// `solutions/arrays/two-sum.py` → `two-sum.py`
pub fn filename_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `solutions/arrays/two-sum.py` → `arrays`. Files directly under the
/// prefix have no folder.
pub fn extract_folder(path: &str) -> Option<String> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() >= 3 && !parts[1].is_empty() {
        Some(parts[1].to_string())
    } else {
        None
    }
}

/// Maps a file extension to a display language.
pub fn language_for(filename: &str) -> String {
    let ext = match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return "Other".to_string(),
    };
    let known = match ext {
        "py" => "Python",
        "js" => "JavaScript",
        "ts" => "TypeScript",
        "cpp" => "C++",
        "java" => "Java",
        "go" => "Go",
        "rs" => "Rust",
        "c" => "C",
        "rb" => "Ruby",
        "swift" => "Swift",
        "kt" => "Kotlin",
        "" => return "Other".to_string(),
        other => return other.to_uppercase(),
    };
    known.to_string()
}

// ============ Sync reports ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullSyncReport {
    pub problems_synced: u64,
    pub problems_pruned: u64,
    pub commits_processed: u64,
    pub failed_items: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncrementalSyncReport {
    pub problems_added: u64,
    pub problems_modified: u64,
    pub problems_removed: u64,
    pub commits_processed: u64,
    pub failed_items: u64,
    pub duration_ms: u64,
}

/// Result of a sync entry point. Serializes with a `type` tag of
/// `full` or `incremental`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SyncReport {
    Full(FullSyncReport),
    Incremental(IncrementalSyncReport),
}

impl SyncReport {
    pub fn mode(&self) -> SyncMode {
        match self {
            SyncReport::Full(_) => SyncMode::Full,
            SyncReport::Incremental(_) => SyncMode::Incremental,
        }
    }

    pub fn commits_processed(&self) -> u64 {
        match self {
            SyncReport::Full(r) => r.commits_processed,
            SyncReport::Incremental(r) => r.commits_processed,
        }
    }
}
