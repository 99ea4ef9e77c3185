//! Sync orchestration: remote repository → SQLite mirror.
//!
//! A run is one of two strategies, chosen by [`SyncEngine::run`]:
//!
//! - **Full**: mirror every file in the remote tree, prune rows whose file
//!   disappeared, and rebuild the daily activity ledger for a bounded
//!   window of commit history. Ledger rows inside the window are replaced,
//!   so repeating a full sync never counts a commit twice.
//! - **Incremental**: replay only commits newer than the stored cursor,
//!   applying adds, edits and removals file by file.
//!
//! Both strategies finish by rebuilding `topic_stats` from `problems` and
//! advancing the cursor. All writes of a run share one transaction that is
//! committed at the very end, so an aborted run leaves the previous state
//! (and cursor) untouched.
//!
//! # Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | tree or commit-list fetch | run aborts, nothing committed |
//! | single file or commit-detail fetch | logged, counted in `failed_items`, skipped |
//! | database error | run aborts, nothing committed |
//!
//! The engine does not serialize runs. Callers must ensure at most one run
//! is active at a time (see [`crate::server`]).

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, SyncConfig};
use crate::db;
use crate::github::{short_sha, GitHubClient};
use crate::migrate;
use crate::models::{
    classify, Change, CommitSummary, FileStatus, FullSyncReport, IncrementalSyncReport,
    SyncReport, TreeEntry,
};
use crate::repo_client::{CommitQuery, Freshness, RepositoryClient};
use crate::store::{self, CommitTotal};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Tracked folder, e.g. `solutions/`.
    pub prefix: String,
    /// History window replayed by a full sync.
    pub lookback_days: i64,
    pub per_page: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            lookback_days: config.lookback_days,
            per_page: config.per_page,
        }
    }
}

/// Counters accumulated over one run and turned into its report.
#[derive(Debug, Default, Clone)]
struct SyncTally {
    problems_synced: u64,
    problems_pruned: u64,
    problems_added: u64,
    problems_modified: u64,
    problems_removed: u64,
    commits_processed: u64,
    failed_items: u64,
}

pub struct SyncEngine {
    pool: SqlitePool,
    client: Arc<dyn RepositoryClient>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(pool: SqlitePool, client: Arc<dyn RepositoryClient>, options: SyncOptions) -> Self {
        Self {
            pool,
            client,
            options,
        }
    }

    pub fn client(&self) -> &Arc<dyn RepositoryClient> {
        &self.client
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Full sync when no cursor exists yet, incremental otherwise.
    pub async fn run(&self) -> Result<SyncReport> {
        let mut conn = self.pool.acquire().await?;
        let cursor = store::get_cursor(&mut conn).await?;
        drop(conn);

        match cursor {
            None => Ok(SyncReport::Full(self.run_full_sync().await?)),
            Some(_) => self.run_incremental_sync().await,
        }
    }

    // ============ Full sync ============

    pub async fn run_full_sync(&self) -> Result<FullSyncReport> {
        let started = Instant::now();
        let prefix = self.options.prefix.as_str();
        let mut tally = SyncTally::default();

        let mut tx = self.pool.begin().await?;
        let previous = store::get_cursor(&mut *tx).await?;

        let tree = self
            .client
            .get_tree(prefix, Freshness::Latest)
            .await
            .with_context(|| format!("Failed to fetch repository tree under '{}'", prefix))?;
        let files: Vec<TreeEntry> = tree.into_iter().filter(TreeEntry::is_file).collect();
        info!(prefix, files = files.len(), "full sync: fetched tree");

        let observed = self.mirror_tree(&mut *tx, &files, &mut tally).await?;

        if observed.is_empty() {
            warn!(prefix, "full sync: remote tree is empty, skipping prune");
        } else {
            tally.problems_pruned = store::prune_problems(&mut *tx, &observed).await?;
            if tally.problems_pruned > 0 {
                info!(pruned = tally.problems_pruned, "full sync: pruned deleted problems");
            }
        }

        let since = window_start(Utc::now(), self.options.lookback_days);
        let cleared = store::clear_activity_since(&mut *tx, since.date_naive()).await?;
        debug!(cleared, since = %since.date_naive(), "full sync: cleared activity window");
        let newest = self.replay_history(&mut *tx, since, &mut tally).await?;

        let topics = store::rebuild_topic_stats(&mut *tx).await?;
        debug!(topics, "full sync: rebuilt topic stats");

        // Keep the old boundary when the window held no commits. The total
        // restarts from the window, matching the rebuilt ledger.
        let last_sha = newest.or_else(|| previous.and_then(|c| c.last_commit_sha));
        store::save_cursor(
            &mut *tx,
            last_sha.as_deref(),
            Utc::now().timestamp(),
            CommitTotal::Replace(tally.commits_processed as i64),
        )
        .await?;

        tx.commit().await?;

        let report = FullSyncReport {
            problems_synced: tally.problems_synced,
            problems_pruned: tally.problems_pruned,
            commits_processed: tally.commits_processed,
            failed_items: tally.failed_items,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            problems = report.problems_synced,
            commits = report.commits_processed,
            failed = report.failed_items,
            duration_ms = report.duration_ms,
            "full sync complete"
        );
        Ok(report)
    }

    /// Upserts every file of the tree and returns the set of paths seen,
    /// including files whose content could not be fetched.
    async fn mirror_tree(
        &self,
        conn: &mut SqliteConnection,
        files: &[TreeEntry],
        tally: &mut SyncTally,
    ) -> Result<HashSet<String>> {
        let mut observed = HashSet::with_capacity(files.len());
        let now = Utc::now().timestamp();

        for entry in files {
            observed.insert(entry.path.clone());

            let content = match self
                .client
                .get_file_content(&entry.path, Freshness::Matching(&entry.sha))
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %entry.path, error = %e, "failed to sync file");
                    tally.failed_items += 1;
                    continue;
                }
            };

            store::upsert_problem(conn, &entry.path, &entry.sha, &content.metadata, now).await?;
            tally.problems_synced += 1;
        }

        Ok(observed)
    }

    /// Walks commit history since `since` into the activity ledger and
    /// returns the newest commit id seen.
    async fn replay_history(
        &self,
        conn: &mut SqliteConnection,
        since: DateTime<Utc>,
        tally: &mut SyncTally,
    ) -> Result<Option<String>> {
        let prefix = self.options.prefix.as_str();
        let mut newest = None;
        let mut page = 1;

        loop {
            let query = CommitQuery {
                path: prefix,
                since: Some(since),
                page,
                per_page: self.options.per_page,
            };
            let commits = self
                .client
                .list_commits(&query)
                .await
                .with_context(|| format!("Failed to list commits (page {})", page))?;
            if commits.is_empty() {
                break;
            }

            if newest.is_none() {
                newest = Some(commits[0].sha.clone());
            }

            for commit in &commits {
                self.replay_commit(conn, commit, tally).await?;
            }

            if commits.len() < self.options.per_page as usize {
                break;
            }
            page += 1;
        }

        info!(commits = tally.commits_processed, "full sync: replayed history");
        Ok(newest)
    }

    async fn replay_commit(
        &self,
        conn: &mut SqliteConnection,
        commit: &CommitSummary,
        tally: &mut SyncTally,
    ) -> Result<()> {
        let prefix = self.options.prefix.as_str();
        let ts = commit.committed_at.timestamp();
        let mut added = 0;
        let mut modified = 0;

        match self.client.get_commit_detail(&commit.sha).await {
            Ok(detail) => {
                for file in detail.files.iter().filter(|f| f.filename.starts_with(prefix)) {
                    match file.status {
                        FileStatus::Added => added += 1,
                        FileStatus::Modified | FileStatus::Renamed => modified += 1,
                        FileStatus::Removed | FileStatus::Other => {}
                    }
                    store::widen_problem_bounds(conn, &file.filename, ts).await?;
                }
            }
            Err(e) => {
                warn!(sha = short_sha(&commit.sha), error = %e, "failed to get commit detail");
                tally.failed_items += 1;
            }
        }

        store::record_activity(conn, commit.committed_at.date_naive(), added, modified).await?;
        tally.commits_processed += 1;
        Ok(())
    }

    // ============ Incremental sync ============

    /// Replays commits newer than the cursor. Falls back to a full sync
    /// when no cursor exists.
    pub async fn run_incremental_sync(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let mut tally = SyncTally::default();

        let mut tx = self.pool.begin().await?;
        let cursor = match store::get_cursor(&mut *tx).await? {
            Some(cursor) => cursor,
            None => {
                drop(tx);
                info!("no sync cursor found, running full sync instead");
                return Ok(SyncReport::Full(self.run_full_sync().await?));
            }
        };

        // The API filters `since` on commit dates, so a commit dated before
        // the last sync but pushed after it is never listed here. A full
        // sync picks it up.
        let since = cursor
            .last_synced_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0));
        let fresh = self
            .collect_new_commits(since, cursor.last_commit_sha.as_deref())
            .await?;
        info!(new_commits = fresh.len(), "incremental sync: scanned history");

        // Oldest first, so per-file state ends at the newest commit.
        for commit in fresh.iter().rev() {
            self.apply_commit(&mut *tx, commit, &mut tally).await?;
        }

        let topics = store::rebuild_topic_stats(&mut *tx).await?;
        debug!(topics, "incremental sync: rebuilt topic stats");

        // With nothing consumed the cursor stays as it was, which keeps a
        // no-op run from changing any row.
        if let Some(newest) = fresh.first() {
            store::save_cursor(
                &mut *tx,
                Some(&newest.sha),
                Utc::now().timestamp(),
                CommitTotal::Add(tally.commits_processed as i64),
            )
            .await?;
        }

        tx.commit().await?;

        let report = IncrementalSyncReport {
            problems_added: tally.problems_added,
            problems_modified: tally.problems_modified,
            problems_removed: tally.problems_removed,
            commits_processed: tally.commits_processed,
            failed_items: tally.failed_items,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            added = report.problems_added,
            modified = report.problems_modified,
            removed = report.problems_removed,
            commits = report.commits_processed,
            duration_ms = report.duration_ms,
            "incremental sync complete"
        );
        Ok(SyncReport::Incremental(report))
    }

    /// Pages through history newest first and stops at the cursor's
    /// commit. Returns the unseen commits, newest first.
    async fn collect_new_commits(
        &self,
        since: Option<DateTime<Utc>>,
        boundary: Option<&str>,
    ) -> Result<Vec<CommitSummary>> {
        let mut fresh = Vec::new();
        let mut page = 1;

        loop {
            let query = CommitQuery {
                path: &self.options.prefix,
                since,
                page,
                per_page: self.options.per_page,
            };
            let commits = self
                .client
                .list_commits(&query)
                .await
                .with_context(|| format!("Failed to list commits (page {})", page))?;
            if commits.is_empty() {
                break;
            }

            let full_page = commits.len() >= self.options.per_page as usize;
            let (unseen, reached_boundary) = split_at_boundary(commits, boundary);
            fresh.extend(unseen);

            if reached_boundary || !full_page {
                break;
            }
            page += 1;
        }

        Ok(fresh)
    }

    async fn apply_commit(
        &self,
        conn: &mut SqliteConnection,
        commit: &CommitSummary,
        tally: &mut SyncTally,
    ) -> Result<()> {
        let prefix = self.options.prefix.as_str();
        let ts = commit.committed_at.timestamp();
        let mut added = 0;
        let mut modified = 0;

        let detail = match self.client.get_commit_detail(&commit.sha).await {
            Ok(detail) => Some(detail),
            Err(e) => {
                warn!(sha = short_sha(&commit.sha), error = %e, "commit detail fetch failed");
                tally.failed_items += 1;
                None
            }
        };

        let files = detail.map(|d| d.files).unwrap_or_default();
        for file in files.iter().filter(|f| f.filename.starts_with(prefix)) {
            if file.status == FileStatus::Removed {
                tally.problems_removed += store::delete_problem(conn, &file.filename).await?;
                continue;
            }

            if file.status == FileStatus::Renamed {
                if let Some(old) = file.previous_filename.as_deref() {
                    tally.problems_removed += store::delete_problem(conn, old).await?;
                }
            }

            let stored = store::get_problem_sha(conn, &file.filename).await?;
            let reported = file.sha.as_deref().unwrap_or_default();
            if !reported.is_empty() && classify(stored.as_deref(), reported) == Change::Unchanged {
                debug!(path = %file.filename, "content unchanged, skipping");
                continue;
            }

            let freshness = if reported.is_empty() {
                Freshness::Latest
            } else {
                Freshness::Matching(reported)
            };
            let content = match self.client.get_file_content(&file.filename, freshness).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %file.filename, error = %e, "failed to fetch changed file");
                    tally.failed_items += 1;
                    continue;
                }
            };

            let sha = if reported.is_empty() {
                content.sha.as_str()
            } else {
                reported
            };
            match store::upsert_problem(conn, &file.filename, sha, &content.metadata, ts).await? {
                Change::Added => {
                    added += 1;
                    tally.problems_added += 1;
                }
                Change::Modified => {
                    modified += 1;
                    tally.problems_modified += 1;
                }
                Change::Unchanged => {}
            }
        }

        store::record_activity(conn, commit.committed_at.date_naive(), added, modified).await?;
        tally.commits_processed += 1;
        Ok(())
    }
}

/// Run the sync command: apply the schema, run one sync and print its report.
pub async fn run_sync(config: &Config, full: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let client: Arc<dyn RepositoryClient> = Arc::new(GitHubClient::from_config(&config.github)?);
    let engine = SyncEngine::new(pool.clone(), client, SyncOptions::from(&config.sync));

    let report = if full {
        SyncReport::Full(engine.run_full_sync().await?)
    } else {
        engine.run().await?
    };
    pool.close().await;

    match &report {
        SyncReport::Full(r) => {
            println!("sync full ({}/{})", config.github.owner, config.github.repo);
            println!("  problems synced:    {}", r.problems_synced);
            println!("  problems pruned:    {}", r.problems_pruned);
            println!("  commits processed:  {}", r.commits_processed);
            println!("  failed items:       {}", r.failed_items);
            println!("  duration:           {}ms", r.duration_ms);
        }
        SyncReport::Incremental(r) => {
            println!("sync incremental ({}/{})", config.github.owner, config.github.repo);
            println!("  problems added:     {}", r.problems_added);
            println!("  problems modified:  {}", r.problems_modified);
            println!("  problems removed:   {}", r.problems_removed);
            println!("  commits processed:  {}", r.commits_processed);
            println!("  failed items:       {}", r.failed_items);
            println!("  duration:           {}ms", r.duration_ms);
        }
    }
    Ok(())
}

/// Midnight UTC `lookback_days` before `now`, so the replayed history
/// covers whole ledger days.
fn window_start(now: DateTime<Utc>, lookback_days: i64) -> DateTime<Utc> {
    (now - Duration::days(lookback_days))
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Cuts a newest-first page at the boundary commit. The boundary and
/// everything older are dropped; the flag reports whether it was found.
fn split_at_boundary(
    mut page: Vec<CommitSummary>,
    boundary: Option<&str>,
) -> (Vec<CommitSummary>, bool) {
    match boundary.and_then(|b| page.iter().position(|c| c.sha == b)) {
        Some(idx) => {
            page.truncate(idx);
            (page, true)
        }
        None => (page, false),
    }
}
