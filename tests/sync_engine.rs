//! End-to-end tests for full and incremental sync against a scripted
//! repository.

mod common;

use chrono::{Duration, NaiveDate, Utc};
use common::{test_pool, FakeRepo, TWO_SUM, TWO_SUM_CODE};
use dsa_mirror::models::{CommitFile, DailyActivity, FileStatus, Problem, SyncCursor, SyncReport};
use dsa_mirror::repo_client::RepositoryClient;
use dsa_mirror::store;
use dsa_mirror::sync::{SyncEngine, SyncOptions};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

fn engine(pool: &SqlitePool, repo: &Arc<FakeRepo>) -> SyncEngine {
    engine_with(pool, repo, SyncOptions::default())
}

fn engine_with(pool: &SqlitePool, repo: &Arc<FakeRepo>, options: SyncOptions) -> SyncEngine {
    let client: Arc<dyn RepositoryClient> = repo.clone();
    SyncEngine::new(pool.clone(), client, options)
}

async fn problem(pool: &SqlitePool, path: &str) -> Option<Problem> {
    let mut conn = pool.acquire().await.unwrap();
    store::get_problem(&mut conn, path).await.unwrap()
}

async fn cursor(pool: &SqlitePool) -> Option<SyncCursor> {
    let mut conn = pool.acquire().await.unwrap();
    store::get_cursor(&mut conn).await.unwrap()
}

async fn activity_on(pool: &SqlitePool, date: NaiveDate) -> Option<DailyActivity> {
    let mut conn = pool.acquire().await.unwrap();
    store::list_activity(&mut conn, date)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.date == date)
}

async fn topic_counts(pool: &SqlitePool) -> Vec<(String, i64)> {
    let mut conn = pool.acquire().await.unwrap();
    let mut topics: Vec<(String, i64)> = store::list_topics(&mut conn)
        .await
        .unwrap()
        .into_iter()
        .map(|t| (t.folder, t.problem_count))
        .collect();
    topics.sort();
    topics
}

/// Topic rows must match the folders present in `problems`, with matching counts.
async fn assert_topics_consistent(pool: &SqlitePool) {
    let expected: Vec<(String, i64)> = sqlx::query_as(
        "SELECT folder, COUNT(*) FROM problems WHERE folder IS NOT NULL AND folder != '' \
         GROUP BY folder ORDER BY folder",
    )
    .fetch_all(pool)
    .await
    .unwrap();
    assert_eq!(topic_counts(pool).await, expected);
}

/// Every mirrored row rendered as text, for byte-level comparisons.
async fn snapshot(pool: &SqlitePool) -> Vec<String> {
    let queries = [
        "SELECT path || '|' || sha || '|' || difficulty || '|' || tags_json || '|' || \
         first_seen_at || '|' || last_updated_at FROM problems ORDER BY path",
        "SELECT date || '|' || commit_count || '|' || problems_added || '|' || problems_modified \
         FROM daily_activity ORDER BY date",
        "SELECT folder || '|' || problem_count || '|' || COALESCE(last_updated_file, '') || '|' || \
         COALESCE(last_updated_at, '') FROM topic_stats ORDER BY folder",
        "SELECT COALESCE(last_commit_sha, '') || '|' || COALESCE(last_synced_at, '') || '|' || \
         total_commits_processed FROM sync_state",
    ];
    let mut rows = Vec::new();
    for q in queries {
        let part: Vec<String> = sqlx::query_scalar(q).fetch_all(pool).await.unwrap();
        rows.extend(part);
    }
    rows
}

fn incremental(report: SyncReport) -> dsa_mirror::models::IncrementalSyncReport {
    match report {
        SyncReport::Incremental(r) => r,
        SyncReport::Full(r) => panic!("expected incremental sync, got full: {:?}", r),
    }
}

#[tokio::test]
async fn test_first_run_is_full_sync() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let report = engine(&pool, &repo).run().await.unwrap();
    let SyncReport::Full(full) = report else {
        panic!("first run should be a full sync");
    };
    assert_eq!(full.problems_synced, 1);
    assert_eq!(full.failed_items, 0);

    let p = problem(&pool, TWO_SUM).await.expect("problem row");
    assert_eq!(p.filename, "two-sum.py");
    assert_eq!(p.folder.as_deref(), Some("arrays"));
    assert_eq!(p.language, "Python");
    assert_eq!(p.difficulty, "Easy");
    assert_eq!(p.tags, vec!["array", "hash-map"]);
    assert_eq!(p.time_complexity.as_deref(), Some("O(n)"));
    assert_eq!(p.sha, "abc");

    assert_eq!(topic_counts(&pool).await, vec![("arrays".to_string(), 1)]);

    let c = cursor(&pool).await.expect("cursor written");
    assert!(c.last_synced_at.is_some());
    assert!(c.total_commits_processed >= 0);
}

#[tokio::test]
async fn test_two_sum_modified_incrementally() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();
    let before = problem(&pool, TWO_SUM).await.unwrap();

    let at = Utc::now() + Duration::seconds(5);
    let edited = TWO_SUM_CODE.replace("Easy", "Medium");
    repo.commit_write("c1", at, TWO_SUM, "def", &edited);

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.problems_modified, 1);
    assert_eq!(report.problems_added, 0);
    assert_eq!(report.commits_processed, 1);

    let after = problem(&pool, TWO_SUM).await.unwrap();
    assert_eq!(after.sha, "def");
    assert_eq!(after.difficulty, "Medium");
    assert!(after.last_updated_at > before.last_updated_at);
    assert_eq!(after.first_seen_at, before.first_seen_at);

    let day = activity_on(&pool, at.date_naive()).await.expect("ledger row");
    assert_eq!(day.commit_count, 1);
    assert_eq!(day.problems_modified, 1);
    assert_eq!(day.problems_added, 0);

    assert_eq!(topic_counts(&pool).await, vec![("arrays".to_string(), 1)]);
    assert_eq!(cursor(&pool).await.unwrap().last_commit_sha.as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_full_sync_replays_only_lookback_window() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());

    let old = Utc::now() - Duration::days(200);
    let recent = Utc::now() - Duration::days(10);
    repo.commit_write("c-old", old, "solutions/graphs/bfs.py", "g1", "# bfs\n");
    repo.commit_write("c-recent", recent, TWO_SUM, "abc", TWO_SUM_CODE);

    let full = engine(&pool, &repo).run_full_sync().await.unwrap();
    assert_eq!(full.problems_synced, 2);
    assert_eq!(full.commits_processed, 1);

    assert!(activity_on(&pool, old.date_naive()).await.is_none());
    let day = activity_on(&pool, recent.date_naive()).await.unwrap();
    assert_eq!(day.commit_count, 1);
    assert_eq!(day.problems_added, 1);

    // History widens the first-seen bound of the file it touched.
    let two_sum = problem(&pool, TWO_SUM).await.unwrap();
    assert_eq!(two_sum.first_seen_at, recent.timestamp());
    let bfs = problem(&pool, "solutions/graphs/bfs.py").await.unwrap();
    assert!(bfs.first_seen_at > recent.timestamp());

    let c = cursor(&pool).await.unwrap();
    assert_eq!(c.last_commit_sha.as_deref(), Some("c-recent"));
    assert_eq!(c.total_commits_processed, 1);
}

#[tokio::test]
async fn test_full_sync_prunes_missing_files() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);
    repo.put_file("solutions/graphs/bfs.py", "g1", "# bfs\n");

    let engine = engine(&pool, &repo);
    engine.run_full_sync().await.unwrap();
    assert_eq!(topic_counts(&pool).await.len(), 2);

    repo.commit_remove("c-del", Utc::now() - Duration::days(400), "solutions/graphs/bfs.py");
    let full = engine.run_full_sync().await.unwrap();
    assert_eq!(full.problems_pruned, 1);
    assert!(problem(&pool, "solutions/graphs/bfs.py").await.is_none());
    assert_eq!(topic_counts(&pool).await, vec![("arrays".to_string(), 1)]);
}

#[tokio::test]
async fn test_empty_tree_never_prunes() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run_full_sync().await.unwrap();

    repo.empty_tree(true);
    let full = engine.run_full_sync().await.unwrap();
    assert_eq!(full.problems_pruned, 0);
    assert_eq!(full.problems_synced, 0);
    assert!(problem(&pool, TWO_SUM).await.is_some());
    assert_topics_consistent(&pool).await;
}

#[tokio::test]
async fn test_unchanged_hash_is_noop() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();
    let fetches = repo.file_fetch_count();
    let before = problem(&pool, TWO_SUM).await.unwrap();

    let at = Utc::now() + Duration::seconds(5);
    repo.push_commit(
        "c-touch",
        at,
        vec![CommitFile {
            filename: TWO_SUM.to_string(),
            status: FileStatus::Modified,
            sha: Some("abc".to_string()),
            previous_filename: None,
        }],
    );

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.commits_processed, 1);
    assert_eq!(report.problems_added, 0);
    assert_eq!(report.problems_modified, 0);
    assert_eq!(repo.file_fetch_count(), fetches);
    assert_eq!(problem(&pool, TWO_SUM).await.unwrap(), before);

    let day = activity_on(&pool, at.date_naive()).await.unwrap();
    assert_eq!(day.commit_count, 1);
    assert_eq!(day.problems_added + day.problems_modified, 0);
}

#[tokio::test]
async fn test_new_file_classified_added() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();

    let at = Utc::now() + Duration::seconds(5);
    repo.commit_write("c-add", at, "solutions/dp/climb-stairs.rs", "d1", "// @difficulty: easy\n");

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.problems_added, 1);

    let p = problem(&pool, "solutions/dp/climb-stairs.rs").await.unwrap();
    assert_eq!(p.language, "Rust");
    assert_eq!(p.first_seen_at, at.timestamp());
    assert_eq!(p.last_updated_at, at.timestamp());
    assert_eq!(activity_on(&pool, at.date_naive()).await.unwrap().problems_added, 1);
    assert_topics_consistent(&pool).await;
}

#[tokio::test]
async fn test_incremental_twice_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();
    repo.commit_write("c1", Utc::now() + Duration::seconds(5), TWO_SUM, "def", TWO_SUM_CODE);
    engine.run().await.unwrap();

    let first = snapshot(&pool).await;
    let report = incremental(engine.run_incremental_sync().await.unwrap());
    assert_eq!(report.commits_processed, 0);
    assert_eq!(snapshot(&pool).await, first);

    engine.run_incremental_sync().await.unwrap();
    assert_eq!(snapshot(&pool).await, first);
}

#[tokio::test]
async fn test_topics_track_problems_through_mixed_changes() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);
    repo.put_file("solutions/arrays/three-sum.py", "a3", "# 3sum\n");
    repo.put_file("solutions/graphs/bfs.py", "g1", "# bfs\n");
    repo.put_file("solutions/README.md", "r1", "# index\n");

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();
    assert_topics_consistent(&pool).await;
    assert_eq!(
        topic_counts(&pool).await,
        vec![("arrays".to_string(), 2), ("graphs".to_string(), 1)]
    );

    let t = Utc::now();
    repo.commit_remove("c1", t + Duration::seconds(5), "solutions/graphs/bfs.py");
    repo.commit_write("c2", t + Duration::seconds(6), "solutions/dp/knapsack.py", "k1", "# dp\n");
    repo.commit_write("c3", t + Duration::seconds(7), TWO_SUM, "def", TWO_SUM_CODE);

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.problems_removed, 1);
    assert_eq!(report.problems_added, 1);
    assert_eq!(report.problems_modified, 1);
    assert_eq!(report.commits_processed, 3);

    assert_topics_consistent(&pool).await;
    assert_eq!(
        topic_counts(&pool).await,
        vec![("arrays".to_string(), 2), ("dp".to_string(), 1)]
    );

    let mut conn = pool.acquire().await.unwrap();
    let arrays = store::list_topics(&mut conn)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.folder == "arrays")
        .unwrap();
    assert_eq!(arrays.last_updated_file.as_deref(), Some("two-sum.py"));
    assert_eq!(arrays.last_updated_at, Some((t + Duration::seconds(7)).timestamp()));
}

#[tokio::test]
async fn test_top_level_failure_aborts_without_side_effects() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);

    repo.fail_tree(true);
    assert!(engine.run().await.is_err());
    assert!(cursor(&pool).await.is_none());
    assert!(problem(&pool, TWO_SUM).await.is_none());

    repo.fail_tree(false);
    engine.run().await.unwrap();
    let before = snapshot(&pool).await;

    repo.commit_write("c1", Utc::now() + Duration::seconds(5), TWO_SUM, "def", TWO_SUM_CODE);
    repo.fail_commit_list(true);
    let err = engine.run_incremental_sync().await.unwrap_err();
    assert!(format!("{:#}", err).contains("list commits"));
    assert_eq!(snapshot(&pool).await, before);

    repo.fail_commit_list(false);
    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.problems_modified, 1);
}

#[tokio::test]
async fn test_per_file_failure_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);
    repo.put_file("solutions/graphs/bfs.py", "g1", "# bfs\n");
    repo.fail_file("solutions/graphs/bfs.py");

    let engine = engine(&pool, &repo);
    let full = engine.run_full_sync().await.unwrap();
    assert_eq!(full.problems_synced, 1);
    assert_eq!(full.failed_items, 1);
    assert!(problem(&pool, "solutions/graphs/bfs.py").await.is_none());

    let at = Utc::now() + Duration::seconds(5);
    repo.fail_file(TWO_SUM);
    repo.commit_write("c1", at, TWO_SUM, "def", TWO_SUM_CODE);

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.failed_items, 1);
    assert_eq!(report.problems_modified, 0);
    assert_eq!(report.commits_processed, 1);
    assert_eq!(problem(&pool, TWO_SUM).await.unwrap().sha, "abc");
    assert_eq!(cursor(&pool).await.unwrap().last_commit_sha.as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_commit_detail_failure_still_counts_commit() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();

    let at = Utc::now() + Duration::seconds(5);
    repo.commit_write("c1", at, TWO_SUM, "def", TWO_SUM_CODE);
    repo.fail_detail("c1");

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.failed_items, 1);
    assert_eq!(report.commits_processed, 1);

    let day = activity_on(&pool, at.date_naive()).await.unwrap();
    assert_eq!(day.commit_count, 1);
    assert_eq!(day.problems_modified, 0);
}

#[tokio::test]
async fn test_removed_file_deleted_incrementally() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);
    repo.put_file("solutions/graphs/bfs.py", "g1", "# bfs\n");

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();

    repo.commit_remove("c1", Utc::now() + Duration::seconds(5), "solutions/graphs/bfs.py");
    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.problems_removed, 1);
    assert!(problem(&pool, "solutions/graphs/bfs.py").await.is_none());
    assert_eq!(topic_counts(&pool).await, vec![("arrays".to_string(), 1)]);
}

#[tokio::test]
async fn test_rename_moves_problem() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();

    let renamed = "solutions/hashing/two-sum.py";
    repo.put_file(renamed, "abc", TWO_SUM_CODE);
    repo.push_commit(
        "c-mv",
        Utc::now() + Duration::seconds(5),
        vec![CommitFile {
            filename: renamed.to_string(),
            status: FileStatus::Renamed,
            sha: Some("abc".to_string()),
            previous_filename: Some(TWO_SUM.to_string()),
        }],
    );

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.problems_removed, 1);
    assert_eq!(report.problems_added, 1);
    assert!(problem(&pool, TWO_SUM).await.is_none());
    assert_eq!(problem(&pool, renamed).await.unwrap().folder.as_deref(), Some("hashing"));
    assert_eq!(topic_counts(&pool).await, vec![("hashing".to_string(), 1)]);
}

#[tokio::test]
async fn test_overlapping_history_stops_at_cursor() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.ignore_since(true);

    let seen_at = Utc::now() - Duration::days(3);
    repo.commit_write("c0", seen_at, TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    let first = engine.run().await.unwrap();
    assert_eq!(first.commits_processed(), 1);
    assert_eq!(cursor(&pool).await.unwrap().last_commit_sha.as_deref(), Some("c0"));

    repo.commit_write("c1", Utc::now() + Duration::seconds(5), TWO_SUM, "def", TWO_SUM_CODE);
    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.commits_processed, 1);
    assert_eq!(report.problems_modified, 1);

    // c0 came back in the listing but was not counted again.
    assert_eq!(activity_on(&pool, seen_at.date_naive()).await.unwrap().commit_count, 1);
    let c = cursor(&pool).await.unwrap();
    assert_eq!(c.last_commit_sha.as_deref(), Some("c1"));
    assert_eq!(c.total_commits_processed, 2);
}

#[tokio::test]
async fn test_pagination_follows_pages_and_boundary() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.ignore_since(true);

    let base = Utc::now() - Duration::days(20);
    for i in 0..5 {
        let path = format!("solutions/arrays/p{}.py", i);
        repo.commit_write(&format!("h{}", i), base + Duration::days(i), &path, &format!("s{}", i), "#\n");
    }

    let options = SyncOptions {
        per_page: 2,
        ..SyncOptions::default()
    };
    let engine = engine_with(&pool, &repo, options);
    let full = engine.run_full_sync().await.unwrap();
    assert_eq!(full.commits_processed, 5);
    assert_eq!(cursor(&pool).await.unwrap().last_commit_sha.as_deref(), Some("h4"));

    let now = Utc::now();
    for i in 5..8 {
        let path = format!("solutions/arrays/p{}.py", i);
        repo.commit_write(&format!("h{}", i), now + Duration::seconds(i), &path, &format!("s{}", i), "#\n");
    }

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.commits_processed, 3);
    assert_eq!(report.problems_added, 3);
    assert_eq!(cursor(&pool).await.unwrap().last_commit_sha.as_deref(), Some("h7"));
    assert_eq!(topic_counts(&pool).await, vec![("arrays".to_string(), 8)]);
}

#[tokio::test]
async fn test_incremental_applies_commits_oldest_first() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();

    let t = Utc::now();
    repo.commit_write("c1", t + Duration::seconds(5), TWO_SUM, "v1", TWO_SUM_CODE);
    repo.commit_write("c2", t + Duration::seconds(9), TWO_SUM, "v2", TWO_SUM_CODE);

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.problems_modified, 2);

    let p = problem(&pool, TWO_SUM).await.unwrap();
    assert_eq!(p.sha, "v2");
    assert_eq!(p.last_updated_at, (t + Duration::seconds(9)).timestamp());
    assert_eq!(cursor(&pool).await.unwrap().last_commit_sha.as_deref(), Some("c2"));
}

#[tokio::test]
async fn test_incremental_without_cursor_falls_back_to_full() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let report = engine(&pool, &repo).run_incremental_sync().await.unwrap();
    assert!(matches!(report, SyncReport::Full(_)));
    assert!(problem(&pool, TWO_SUM).await.is_some());
}

#[tokio::test]
async fn test_repeated_full_sync_rebuilds_activity_window() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    let at = Utc::now() - Duration::days(2);
    repo.commit_write("c1", at, TWO_SUM, "abc", TWO_SUM_CODE);

    // A ledger day older than the replay window is left alone.
    let archived = (Utc::now() - Duration::days(300)).date_naive();
    {
        let mut conn = pool.acquire().await.unwrap();
        store::record_activity(&mut conn, archived, 1, 0).await.unwrap();
    }

    let engine = engine(&pool, &repo);
    engine.run_full_sync().await.unwrap();
    let full = engine.run_full_sync().await.unwrap();
    assert_eq!(full.commits_processed, 1);

    let day = activity_on(&pool, at.date_naive()).await.unwrap();
    assert_eq!(day.commit_count, 1);
    assert_eq!(day.problems_added, 1);
    assert_eq!(activity_on(&pool, archived).await.unwrap().commit_count, 1);
    assert_eq!(cursor(&pool).await.unwrap().total_commits_processed, 1);
}

#[tokio::test]
async fn test_full_sync_replaces_commit_total() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.commit_write("c1", Utc::now() - Duration::days(2), TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();
    repo.commit_write("c2", Utc::now() + Duration::seconds(5), TWO_SUM, "def", TWO_SUM_CODE);
    engine.run().await.unwrap();
    assert_eq!(cursor(&pool).await.unwrap().total_commits_processed, 2);

    let full = engine.run_full_sync().await.unwrap();
    assert_eq!(full.commits_processed, 2);
    let c = cursor(&pool).await.unwrap();
    assert_eq!(c.total_commits_processed, 2);
    assert_eq!(c.last_commit_sha.as_deref(), Some("c2"));
}

#[tokio::test]
async fn test_backdated_commit_waits_for_full_sync() {
    let tmp = TempDir::new().unwrap();
    let pool = test_pool(&tmp).await;
    let repo = Arc::new(FakeRepo::new());
    repo.put_file(TWO_SUM, "abc", TWO_SUM_CODE);

    let engine = engine(&pool, &repo);
    engine.run().await.unwrap();

    // Committed an hour ago, pushed after the last sync.
    let authored = Utc::now() - Duration::hours(1);
    repo.commit_write("c-late", authored, "solutions/graphs/bfs.py", "g1", "# bfs\n");

    let report = incremental(engine.run().await.unwrap());
    assert_eq!(report.commits_processed, 0);
    assert!(problem(&pool, "solutions/graphs/bfs.py").await.is_none());

    let full = engine.run_full_sync().await.unwrap();
    assert_eq!(full.commits_processed, 1);
    assert!(problem(&pool, "solutions/graphs/bfs.py").await.is_some());
    assert_eq!(activity_on(&pool, authored.date_naive()).await.unwrap().commit_count, 1);
    assert_eq!(cursor(&pool).await.unwrap().last_commit_sha.as_deref(), Some("c-late"));
}
