use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub github: GithubConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Remote repository coordinates and client tuning.
#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_timeout_secs() -> u64 {
    15
}

impl GithubConfig {
    /// Reads the token from the configured environment variable.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            lookback_days: default_lookback_days(),
            per_page: default_per_page(),
        }
    }
}

fn default_prefix() -> String {
    "solutions/".to_string()
}
fn default_lookback_days() -> i64 {
    180
}
fn default_per_page() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_webhook_secret_env")]
    pub webhook_secret_env: String,
    #[serde(default = "default_sync_on_startup")]
    pub sync_on_startup: bool,
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            webhook_secret_env: default_webhook_secret_env(),
            sync_on_startup: default_sync_on_startup(),
            sync_interval_secs: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_webhook_secret_env() -> String {
    "GITHUB_WEBHOOK_SECRET".to_string()
}
fn default_sync_on_startup() -> bool {
    true
}

impl ServerConfig {
    pub fn webhook_secret(&self) -> Option<String> {
        std::env::var(&self.webhook_secret_env)
            .ok()
            .filter(|s| !s.is_empty())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.github.owner.trim().is_empty() || config.github.repo.trim().is_empty() {
        anyhow::bail!("github.owner and github.repo must be set");
    }

    if config.sync.prefix.is_empty() || !config.sync.prefix.ends_with('/') {
        anyhow::bail!(
            "sync.prefix must be a non-empty folder path ending in '/', got '{}'",
            config.sync.prefix
        );
    }

    if !(1..=100).contains(&config.sync.per_page) {
        anyhow::bail!("sync.per_page must be in [1, 100]");
    }

    if config.sync.lookback_days <= 0 {
        anyhow::bail!("sync.lookback_days must be > 0");
    }

    if config.server.sync_interval_secs == Some(0) {
        anyhow::bail!("server.sync_interval_secs must be > 0 when set");
    }

    Ok(())
}
