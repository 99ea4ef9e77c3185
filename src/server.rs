//! HTTP host for the dashboard and sync triggers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/stats` | Dashboard statistics from the mirror |
//! | `POST` | `/api/sync?mode=full\|incremental` | Run a sync and return its report |
//! | `POST` | `/api/webhook` | Signed GitHub push notification |
//! | `GET`  | `/api/github/health` | Repository connection check |
//! | `GET`  | `/api/github/tree` | Remote tree under the tracked prefix |
//! | `GET`  | `/api/github/file/{*path}` | Decoded file content with metadata |
//! | `POST` | `/api/github/cache/clear` | Drop cached GitHub responses |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown sync mode: partial" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `sync_in_progress` (409), `rate_limited` (429), `upstream_error` (502),
//! `internal` (500). The explorer reads (`tree`, `file`) report non-rate-limit
//! upstream failures as `internal`.
//!
//! # Sync serialization
//!
//! Every trigger (startup, interval, manual, webhook) goes through one
//! `tokio::sync::Mutex`, so at most one run touches the database at a
//! time. Manual requests fail fast with 409 while a run is active;
//! background triggers queue behind it.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::github::GitHubClient;
use crate::migrate;
use crate::models::{FileContent, SyncMode, SyncReport, TreeEntry};
use crate::repo_client::{Freshness, RepoError, RepositoryClient};
use crate::stats::{get_dashboard_stats, DashboardStats};
use crate::sync::{SyncEngine, SyncOptions};
use crate::webhook::{verify_signature, PushEvent, EVENT_HEADER, SIGNATURE_HEADER};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    engine: Arc<SyncEngine>,
    sync_lock: Arc<Mutex<()>>,
    webhook_secret: Option<Arc<str>>,
}

impl AppState {
    /// Reads the webhook secret from the environment variable named in
    /// `[server].webhook_secret_env`.
    pub fn new(config: Config, pool: SqlitePool, client: Arc<dyn RepositoryClient>) -> Self {
        let engine = SyncEngine::new(pool.clone(), client, SyncOptions::from(&config.sync));
        let webhook_secret = config.server.webhook_secret().map(Arc::from);
        Self {
            config: Arc::new(config),
            pool,
            engine: Arc::new(engine),
            sync_lock: Arc::new(Mutex::new(())),
            webhook_secret,
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<&str>) -> Self {
        self.webhook_secret = secret.map(Arc::from);
        self
    }

    /// Runs one sync while holding the run lock, waiting for any active run.
    pub async fn sync_exclusive(&self, mode: Option<SyncMode>) -> anyhow::Result<SyncReport> {
        let _guard = self.sync_lock.lock().await;
        self.run_sync(mode).await
    }

    async fn run_sync(&self, mode: Option<SyncMode>) -> anyhow::Result<SyncReport> {
        match mode {
            None => self.engine.run().await,
            Some(SyncMode::Full) => Ok(SyncReport::Full(self.engine.run_full_sync().await?)),
            Some(SyncMode::Incremental) => self.engine.run_incremental_sync().await,
        }
    }

    fn client(&self) -> &Arc<dyn RepositoryClient> {
        self.engine.client()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/stats", get(handle_stats))
        .route("/api/sync", post(handle_sync))
        .route("/api/webhook", post(handle_webhook))
        .route("/api/github/health", get(handle_github_health))
        .route("/api/github/tree", get(handle_github_tree))
        .route("/api/github/file/{*path}", get(handle_github_file))
        .route("/api/github/cache/clear", post(handle_cache_clear))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, applies the schema, and starts the startup and
/// interval sync triggers when configured. Runs until the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply_schema(&pool).await?;

    let client: Arc<dyn RepositoryClient> = Arc::new(GitHubClient::from_config(&config.github)?);
    let state = AppState::new(config.clone(), pool, client);
    if state.webhook_secret.is_none() {
        warn!(
            env = %config.server.webhook_secret_env,
            "webhook secret not set, all webhook deliveries will be rejected"
        );
    }

    spawn_background_triggers(&state);

    let bind_addr = config.server.bind.clone();
    let app = router(state);

    info!(addr = %bind_addr, "server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_background_triggers(state: &AppState) {
    if state.config.server.sync_on_startup {
        let state = state.clone();
        tokio::spawn(async move {
            match state.sync_exclusive(None).await {
                Ok(report) => info!(mode = ?report.mode(), "startup sync finished"),
                Err(e) => error!(error = %format!("{:#}", e), "startup sync failed"),
            }
        });
    }

    if let Some(secs) = state.config.server.sync_interval_secs {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match state.sync_exclusive(Some(SyncMode::Incremental)).await {
                    Ok(report) => info!(commits = report.commits_processed(), "scheduled sync finished"),
                    Err(e) => error!(error = %format!("{:#}", e), "scheduled sync failed"),
                }
            }
        });
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    app_error(StatusCode::BAD_REQUEST, "bad_request", message)
}

fn internal(message: impl Into<String>) -> AppError {
    app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
}

fn from_repo_error(err: &RepoError) -> AppError {
    match err {
        RepoError::RateLimited(_) => {
            app_error(StatusCode::TOO_MANY_REQUESTS, "rate_limited", err.to_string())
        }
        RepoError::Api(_) => app_error(StatusCode::BAD_GATEWAY, "upstream_error", err.to_string()),
    }
}

/// Explorer reads: rate limits stay 429, a missing file is 404, anything
/// else is 500.
fn from_explorer_error(err: &RepoError) -> AppError {
    match err {
        RepoError::RateLimited(_) => from_repo_error(err),
        RepoError::Api(msg) if msg.to_lowercase().contains("not found") => {
            app_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        RepoError::Api(_) => internal(err.to_string()),
    }
}

/// Upstream failures keep their kind through `anyhow` context; everything
/// else is internal.
fn classify_sync_error(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    match err.downcast_ref::<RepoError>() {
        Some(repo_err) => AppError {
            message,
            ..from_repo_error(repo_err)
        },
        None => internal(message),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /api/stats ============

async fn handle_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, AppError> {
    get_dashboard_stats(&state.pool)
        .await
        .map(Json)
        .map_err(|e| internal(format!("{:#}", e)))
}

// ============ POST /api/sync ============

#[derive(Deserialize)]
struct SyncParams {
    mode: Option<String>,
}

/// Runs a sync inline and returns its report. Fails with 409 instead of
/// queueing when another run holds the lock.
async fn handle_sync(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncReport>, AppError> {
    let mode = match params.mode.as_deref() {
        None | Some("") => None,
        Some("full") => Some(SyncMode::Full),
        Some("incremental") => Some(SyncMode::Incremental),
        Some(other) => return Err(bad_request(format!("unknown sync mode: {}", other))),
    };

    let _guard = state.sync_lock.try_lock().map_err(|_| {
        app_error(
            StatusCode::CONFLICT,
            "sync_in_progress",
            "a sync run is already in progress",
        )
    })?;

    state
        .run_sync(mode)
        .await
        .map(Json)
        .map_err(classify_sync_error)
}

// ============ POST /api/webhook ============

async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    verify_signature(state.webhook_secret.as_deref(), &body, signature).map_err(|e| {
        warn!(reason = %e, "rejected webhook delivery");
        app_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string())
    })?;

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match event {
        "ping" => Ok((StatusCode::OK, Json(json!({ "status": "pong" })))),
        "push" => {
            let push: PushEvent = serde_json::from_slice(&body)
                .map_err(|e| bad_request(format!("invalid push payload: {}", e)))?;

            if !push.touches_prefix(&state.config.sync.prefix) {
                return Ok((
                    StatusCode::OK,
                    Json(json!({ "status": "ignored", "reason": "no tracked files changed" })),
                ));
            }

            let task_state = state.clone();
            tokio::spawn(async move {
                let _guard = task_state.sync_lock.lock().await;
                let evicted = task_state.client().clear_cache();
                info!(evicted, "webhook: cache cleared, starting incremental sync");
                match task_state.run_sync(Some(SyncMode::Incremental)).await {
                    Ok(report) => info!(commits = report.commits_processed(), "webhook sync finished"),
                    Err(e) => error!(error = %format!("{:#}", e), "webhook sync failed"),
                }
            });

            Ok((StatusCode::ACCEPTED, Json(json!({ "status": "accepted" }))))
        }
        other => Ok((
            StatusCode::OK,
            Json(json!({ "status": "ignored", "event": other })),
        )),
    }
}

// ============ GitHub maintenance ============

async fn handle_github_health(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let status = state
        .client()
        .check_connection()
        .await
        .map_err(|e| from_repo_error(&e))?;
    Ok(Json(json!(status)))
}

#[derive(Serialize)]
struct TreeResponse {
    tree: Vec<TreeEntry>,
}

async fn handle_github_tree(State(state): State<AppState>) -> Result<Json<TreeResponse>, AppError> {
    let tree = state
        .client()
        .get_tree(&state.config.sync.prefix, Freshness::Cached)
        .await
        .map_err(|e| from_explorer_error(&e))?;
    Ok(Json(TreeResponse { tree }))
}

async fn handle_github_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<FileContent>, AppError> {
    state
        .client()
        .get_file_content(&path, Freshness::Cached)
        .await
        .map(Json)
        .map_err(|e| from_explorer_error(&e))
}

async fn handle_cache_clear(State(state): State<AppState>) -> Json<serde_json::Value> {
    let evicted = state.client().clear_cache();
    Json(json!({ "status": "cleared", "evicted": evicted }))
}
