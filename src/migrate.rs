use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates every table and index if missing. Safe to run repeatedly.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Problem mirror: one row per remote file under the tracked prefix.
    // `tags_json` holds a JSON array of strings.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS problems (
            path TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            folder TEXT,
            language TEXT,
            difficulty TEXT NOT NULL DEFAULT 'Medium',
            tags_json TEXT NOT NULL DEFAULT '[]',
            time_complexity TEXT,
            space_complexity TEXT,
            leetcode_link TEXT,
            sha TEXT NOT NULL,
            first_seen_at INTEGER NOT NULL,
            last_updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Daily activity ledger, keyed by YYYY-MM-DD.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_activity (
            date TEXT PRIMARY KEY,
            commit_count INTEGER NOT NULL DEFAULT 0 CHECK (commit_count >= 0),
            problems_added INTEGER NOT NULL DEFAULT 0 CHECK (problems_added >= 0),
            problems_modified INTEGER NOT NULL DEFAULT 0 CHECK (problems_modified >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_stats (
            folder TEXT PRIMARY KEY,
            problem_count INTEGER NOT NULL DEFAULT 0,
            last_updated_file TEXT,
            last_updated_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Singleton cursor row.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            last_commit_sha TEXT,
            last_synced_at INTEGER,
            total_commits_processed INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_problems_folder ON problems(folder)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_problems_difficulty ON problems(difficulty)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_problems_last_updated ON problems(last_updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
