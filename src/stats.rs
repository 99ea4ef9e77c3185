//! Dashboard statistics derived from the mirror.
//!
//! Pure read path: everything here comes from `problems`, `daily_activity`
//! and `topic_stats`, never from the repository client. All queries of one
//! call run inside a single read transaction, so the figures always come
//! from one committed snapshot even while a sync is in progress.
//!
//! Used by `GET /api/stats` and `dsa stats`.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db;
use crate::store;

/// Ledger window loaded for today/week/streak.
pub const ACTIVITY_WINDOW_DAYS: i64 = 180;
/// Days back from today (inclusive) that get the heatmap floor.
pub const HEATMAP_WINDOW_DAYS: i64 = 82;
pub const HEATMAP_FLOOR: i64 = 1;
/// Added to every streak before the walk starts. Display convention
/// carried over from the existing dashboard; its meaning is unconfirmed.
pub const STREAK_BASE_OFFSET: i64 = 45;
/// Consecutive idle days tolerated before the streak breaks.
pub const STREAK_GAP_TOLERANCE: u32 = 3;
pub const RECENT_LIMIT: i64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DifficultyBreakdown {
    pub easy: i64,
    pub medium: i64,
    pub hard: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicEntry {
    pub name: String,
    pub count: i64,
    pub last_file: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeatmapDay {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentProblem {
    pub filename: String,
    pub path: String,
    pub difficulty: String,
    pub tags: Vec<String>,
    pub committed_at: String,
    pub message: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_problems: i64,
    pub difficulty: DifficultyBreakdown,
    pub today: i64,
    pub this_week: i64,
    pub current_streak: i64,
    pub topics: Vec<TopicEntry>,
    pub activity: Vec<HeatmapDay>,
    pub recent: Vec<RecentProblem>,
}

pub async fn get_dashboard_stats(pool: &SqlitePool) -> Result<DashboardStats> {
    dashboard_stats_at(pool, Utc::now().date_naive()).await
}

/// Computes the dashboard as seen on `today`.
pub async fn dashboard_stats_at(pool: &SqlitePool, today: NaiveDate) -> Result<DashboardStats> {
    let mut tx = pool.begin().await?;

    let mut total_problems = 0;
    let mut difficulty = DifficultyBreakdown::default();
    for (level, n) in store::difficulty_counts(&mut *tx).await? {
        total_problems += n;
        match level.as_str() {
            "easy" => difficulty.easy = n,
            "medium" => difficulty.medium = n,
            "hard" => difficulty.hard = n,
            _ => {}
        }
    }

    let topics = store::list_topics(&mut *tx)
        .await?
        .into_iter()
        .map(|t| TopicEntry {
            name: t.folder,
            count: t.problem_count,
            last_file: t.last_updated_file.unwrap_or_default(),
            last_updated: t.last_updated_at.map(format_ts).unwrap_or_default(),
        })
        .collect();

    let since = today - Duration::days(ACTIVITY_WINDOW_DAYS);
    let rows = store::list_activity(&mut *tx, since).await?;
    let ledger: BTreeMap<NaiveDate, i64> =
        rows.iter().map(|r| (r.date, r.commit_count)).collect();

    let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let this_week = ledger.range(week_start..).map(|(_, n)| n).sum();

    let recent = store::list_problems(&mut *tx, Some(RECENT_LIMIT))
        .await?
        .into_iter()
        .map(|p| RecentProblem {
            filename: p.filename,
            path: p.path,
            difficulty: p.difficulty,
            tags: p.tags,
            committed_at: format_ts(p.last_updated_at),
            message: String::new(),
            folder: p.folder.unwrap_or_default(),
        })
        .collect();

    tx.commit().await?;

    Ok(DashboardStats {
        total_problems,
        difficulty,
        today: ledger.get(&today).copied().unwrap_or(0),
        this_week,
        current_streak: compute_streak(&ledger, today),
        topics,
        activity: build_heatmap(&ledger, today),
        recent,
    })
}

/// Walks backwards from `today`, counting active days, until more than
/// [`STREAK_GAP_TOLERANCE`] idle days in a row are seen or the activity
/// window runs out.
pub fn compute_streak(ledger: &BTreeMap<NaiveDate, i64>, today: NaiveDate) -> i64 {
    let floor = today - Duration::days(ACTIVITY_WINDOW_DAYS);
    let mut streak = STREAK_BASE_OFFSET;
    let mut misses = 0;
    let mut day = today;

    while day >= floor {
        if ledger.get(&day).copied().unwrap_or(0) > 0 {
            streak += 1;
            misses = 0;
        } else {
            misses += 1;
            if misses > STREAK_GAP_TOLERANCE {
                break;
            }
        }
        day -= Duration::days(1);
    }

    streak
}

/// Heatmap cells sorted by date. Days in the last [`HEATMAP_WINDOW_DAYS`]
/// are floored at [`HEATMAP_FLOOR`]; older ledger days keep their real
/// count.
pub fn build_heatmap(ledger: &BTreeMap<NaiveDate, i64>, today: NaiveDate) -> Vec<HeatmapDay> {
    let start = today - Duration::days(HEATMAP_WINDOW_DAYS);
    let mut cells: BTreeMap<NaiveDate, i64> = ledger.clone();

    let mut day = start;
    while day <= today {
        let count = cells.entry(day).or_insert(0);
        *count = (*count).max(HEATMAP_FLOOR);
        day += Duration::days(1);
    }

    cells
        .into_iter()
        .map(|(date, count)| HeatmapDay {
            date: store::format_date(date),
            count,
        })
        .collect()
}

fn format_ts(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// Run the stats command: compute the dashboard and print it.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let stats = get_dashboard_stats(&pool).await?;
    let cursor = {
        let mut conn = pool.acquire().await?;
        store::get_cursor(&mut conn).await?
    };
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("DSA Mirror Dashboard");
    println!("======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!(
        "  Last sync:   {}",
        cursor
            .as_ref()
            .and_then(|c| c.last_synced_at)
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Problems:    {}", stats.total_problems);
    println!(
        "  Difficulty:  {} easy / {} medium / {} hard",
        stats.difficulty.easy, stats.difficulty.medium, stats.difficulty.hard
    );
    println!("  Today:       {}", stats.today);
    println!("  This week:   {}", stats.this_week);
    println!("  Streak:      {}", stats.current_streak);

    if !stats.topics.is_empty() {
        println!();
        println!("  By topic:");
        println!("  {:<24} {:>6}   {}", "TOPIC", "COUNT", "LAST FILE");
        println!("  {}", "-".repeat(60));
        for t in &stats.topics {
            println!("  {:<24} {:>6}   {}", t.name, t.count, t.last_file);
        }
    }

    if !stats.recent.is_empty() {
        println!();
        println!("  Recent:");
        for p in &stats.recent {
            println!("  {:<8} {}", p.difficulty, p.path);
        }
    }

    println!();
    Ok(())
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
