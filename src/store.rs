//! Row-level helpers over the mirror tables.
//!
//! Every function takes a `&mut SqliteConnection` so the sync engine can
//! run all of them inside one transaction (`&mut *tx`) and the stats
//! reader can run them on a read snapshot. None of them commit.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;

use crate::models::{
    extract_folder, filename_of, language_for, Change, DailyActivity, FileMetadata, Problem,
    SyncCursor, TopicAggregate,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| format!("bad date in ledger: {}", s))
}

// ============ Sync cursor ============

pub async fn get_cursor(conn: &mut SqliteConnection) -> Result<Option<SyncCursor>> {
    let row = sqlx::query(
        "SELECT last_commit_sha, last_synced_at, total_commits_processed FROM sync_state WHERE id = 1",
    )
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| SyncCursor {
        last_commit_sha: r.get("last_commit_sha"),
        last_synced_at: r.get("last_synced_at"),
        total_commits_processed: r.get("total_commits_processed"),
    }))
}

/// How a run's commit count folds into the cursor's running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTotal {
    /// Incremental runs add the commits they consumed.
    Add(i64),
    /// Full runs rebuild history, so their count replaces the total.
    Replace(i64),
}

/// Writes the singleton cursor.
pub async fn save_cursor(
    conn: &mut SqliteConnection,
    last_commit_sha: Option<&str>,
    synced_at: i64,
    total: CommitTotal,
) -> Result<()> {
    let (count, replace) = match total {
        CommitTotal::Add(n) => (n, false),
        CommitTotal::Replace(n) => (n, true),
    };
    sqlx::query(
        r#"
        INSERT INTO sync_state (id, last_commit_sha, last_synced_at, total_commits_processed)
        VALUES (1, ?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            last_commit_sha = excluded.last_commit_sha,
            last_synced_at = excluded.last_synced_at,
            total_commits_processed = CASE
                WHEN ?4 THEN excluded.total_commits_processed
                ELSE sync_state.total_commits_processed + excluded.total_commits_processed
            END
        "#,
    )
    .bind(last_commit_sha)
    .bind(synced_at)
    .bind(count)
    .bind(replace)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============ Problems ============

fn problem_from_row(row: &SqliteRow) -> Result<Problem> {
    let tags_json: String = row.get("tags_json");
    // Malformed tag documents degrade to no tags.
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    Ok(Problem {
        path: row.get("path"),
        filename: row.get("filename"),
        folder: row.get("folder"),
        language: row
            .get::<Option<String>, _>("language")
            .unwrap_or_else(|| "Other".to_string()),
        difficulty: row.get("difficulty"),
        tags,
        time_complexity: row.get("time_complexity"),
        space_complexity: row.get("space_complexity"),
        leetcode_link: row.get("leetcode_link"),
        sha: row.get("sha"),
        first_seen_at: row.get("first_seen_at"),
        last_updated_at: row.get("last_updated_at"),
    })
}

const PROBLEM_COLUMNS: &str = "path, filename, folder, language, difficulty, tags_json, \
     time_complexity, space_complexity, leetcode_link, sha, first_seen_at, last_updated_at";

pub async fn get_problem(conn: &mut SqliteConnection, path: &str) -> Result<Option<Problem>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM problems WHERE path = ?",
        PROBLEM_COLUMNS
    ))
    .bind(path)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(problem_from_row).transpose()
}

pub async fn get_problem_sha(conn: &mut SqliteConnection, path: &str) -> Result<Option<String>> {
    let sha = sqlx::query_scalar("SELECT sha FROM problems WHERE path = ?")
        .bind(path)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sha)
}

/// All problems, most recently updated first.
pub async fn list_problems(conn: &mut SqliteConnection, limit: Option<i64>) -> Result<Vec<Problem>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM problems ORDER BY last_updated_at DESC, path ASC LIMIT ?",
        PROBLEM_COLUMNS
    ))
    .bind(limit.unwrap_or(-1))
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(problem_from_row).collect()
}

/// Inserts or updates a problem row and reports which it was.
///
/// New rows get `timestamp` as both first-seen and last-updated. Existing
/// rows keep their first-seen; hash, classification fields and
/// last-updated are overwritten.
pub async fn upsert_problem(
    conn: &mut SqliteConnection,
    path: &str,
    sha: &str,
    metadata: &FileMetadata,
    timestamp: i64,
) -> Result<Change> {
    let exists = get_problem_sha(conn, path).await?.is_some();
    let tags_json = serde_json::to_string(&metadata.tags)?;

    if exists {
        sqlx::query(
            r#"
            UPDATE problems SET
                sha = ?,
                difficulty = ?,
                tags_json = ?,
                time_complexity = ?,
                space_complexity = ?,
                leetcode_link = ?,
                last_updated_at = ?
            WHERE path = ?
            "#,
        )
        .bind(sha)
        .bind(&metadata.difficulty)
        .bind(&tags_json)
        .bind(&metadata.time_complexity)
        .bind(&metadata.space_complexity)
        .bind(&metadata.leetcode_link)
        .bind(timestamp)
        .bind(path)
        .execute(&mut *conn)
        .await?;
        return Ok(Change::Modified);
    }

    let filename = filename_of(path);
    sqlx::query(
        r#"
        INSERT INTO problems (path, filename, folder, language, difficulty, tags_json,
                              time_complexity, space_complexity, leetcode_link, sha,
                              first_seen_at, last_updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(path)
    .bind(filename)
    .bind(extract_folder(path))
    .bind(language_for(filename))
    .bind(&metadata.difficulty)
    .bind(&tags_json)
    .bind(&metadata.time_complexity)
    .bind(&metadata.space_complexity)
    .bind(&metadata.leetcode_link)
    .bind(sha)
    .bind(timestamp)
    .bind(timestamp)
    .execute(&mut *conn)
    .await?;
    Ok(Change::Added)
}

pub async fn delete_problem(conn: &mut SqliteConnection, path: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM problems WHERE path = ?")
        .bind(path)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Deletes every problem whose path is not in `observed`.
///
/// An empty `observed` set deletes nothing: an empty listing is far more
/// likely a transient upstream failure than a repository with no files.
pub async fn prune_problems(conn: &mut SqliteConnection, observed: &HashSet<String>) -> Result<u64> {
    if observed.is_empty() {
        return Ok(0);
    }

    let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM problems")
        .fetch_all(&mut *conn)
        .await?;

    let mut pruned = 0;
    for path in paths.iter().filter(|p| !observed.contains(*p)) {
        pruned += delete_problem(conn, path).await?;
    }
    Ok(pruned)
}

/// Pulls first-seen back and last-updated forward so both bracket
/// `timestamp`. Returns false when no row exists for `path`.
pub async fn widen_problem_bounds(
    conn: &mut SqliteConnection,
    path: &str,
    timestamp: i64,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE problems SET
            first_seen_at = MIN(first_seen_at, ?),
            last_updated_at = MAX(last_updated_at, ?)
        WHERE path = ?
        "#,
    )
    .bind(timestamp)
    .bind(timestamp)
    .bind(path)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ============ Daily activity ============

/// Counts one commit on `date`, creating the ledger row on first use.
pub async fn record_activity(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    added: i64,
    modified: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO daily_activity (date, commit_count, problems_added, problems_modified)
        VALUES (?, 1, ?, ?)
        ON CONFLICT(date) DO UPDATE SET
            commit_count = daily_activity.commit_count + 1,
            problems_added = daily_activity.problems_added + excluded.problems_added,
            problems_modified = daily_activity.problems_modified + excluded.problems_modified
        "#,
    )
    .bind(format_date(date))
    .bind(added)
    .bind(modified)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Deletes ledger rows on or after `since` ahead of a replay of that window.
pub async fn clear_activity_since(conn: &mut SqliteConnection, since: NaiveDate) -> Result<u64> {
    let result = sqlx::query("DELETE FROM daily_activity WHERE date >= ?")
        .bind(format_date(since))
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Ledger rows on or after `since`, oldest first.
pub async fn list_activity(
    conn: &mut SqliteConnection,
    since: NaiveDate,
) -> Result<Vec<DailyActivity>> {
    let rows = sqlx::query(
        r#"
        SELECT date, commit_count, problems_added, problems_modified
        FROM daily_activity
        WHERE date >= ?
        ORDER BY date ASC
        "#,
    )
    .bind(format_date(since))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|r| {
            let date: String = r.get("date");
            Ok(DailyActivity {
                date: parse_date(&date)?,
                commit_count: r.get("commit_count"),
                problems_added: r.get("problems_added"),
                problems_modified: r.get("problems_modified"),
            })
        })
        .collect()
}

// ============ Topic aggregates ============

/// Recomputes `topic_stats` from `problems`: delete everything, then
/// insert one row per distinct non-empty folder. Returns the row count.
pub async fn rebuild_topic_stats(conn: &mut SqliteConnection) -> Result<u64> {
    sqlx::query("DELETE FROM topic_stats")
        .execute(&mut *conn)
        .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO topic_stats (folder, problem_count, last_updated_file, last_updated_at)
        SELECT
            p1.folder,
            COUNT(*),
            (SELECT p2.filename FROM problems p2
             WHERE p2.folder = p1.folder
             ORDER BY p2.last_updated_at DESC, p2.path ASC
             LIMIT 1),
            MAX(p1.last_updated_at)
        FROM problems p1
        WHERE p1.folder IS NOT NULL AND p1.folder != ''
        GROUP BY p1.folder
        "#,
    )
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Topic rows, largest first.
pub async fn list_topics(conn: &mut SqliteConnection) -> Result<Vec<TopicAggregate>> {
    let rows = sqlx::query(
        r#"
        SELECT folder, problem_count, last_updated_file, last_updated_at
        FROM topic_stats
        ORDER BY problem_count DESC, folder ASC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|r| TopicAggregate {
            folder: r.get("folder"),
            problem_count: r.get("problem_count"),
            last_updated_file: r.get("last_updated_file"),
            last_updated_at: r.get("last_updated_at"),
        })
        .collect())
}

/// Problem counts keyed by lower-cased difficulty.
pub async fn difficulty_counts(conn: &mut SqliteConnection) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        "SELECT LOWER(difficulty) AS difficulty, COUNT(*) AS n FROM problems GROUP BY LOWER(difficulty)",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .iter()
        .map(|r| (r.get::<String, _>("difficulty"), r.get::<i64, _>("n")))
        .collect())
}
