//! Configuration for the screenwatch service.
//!
//! Configuration is read from a single JSON file (`~/.screenwatch/config.json`
//! unless `SCREENWATCH_CONFIG` points elsewhere). Every section is optional and
//! falls back to its defaults, so an empty object is a valid configuration.
//!
//! ```json
//! {
//!   "scheduler": {
//!     "screening_time": "17:30",
//!     "retry_policy": "attempt_once_per_day"
//!   },
//!   "batch": { "max_concurrency": 10 },
//!   "upstream": { "base_url": "http://127.0.0.1:8003" }
//! }
//! ```

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "SCREENWATCH_CONFIG";

/// Get the screenwatch data directory.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".screenwatch"),
        |dirs| dirs.home_dir().join(".screenwatch"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Daily screening scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Ranked watchlist, cache and snapshot settings
    #[serde(default)]
    pub watchlist: WatchlistConfig,

    /// Batch analysis fan-out
    #[serde(default)]
    pub batch: BatchConfig,

    /// Upstream data/analysis services
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied and validated.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("SCREENWATCH_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("SCREENWATCH_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Ok(url) = std::env::var("SCREENWATCH_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Ok(time) = std::env::var("SCREENWATCH_SCREENING_TIME") {
            self.scheduler.screening_time = time;
        }

        // Alpaca accepts both naming schemes
        if let Some(key) = env_first(&["ALPACA_API_KEY", "APCA_API_KEY_ID"]) {
            self.upstream.alpaca_api_key = Some(key);
        }
        if let Some(secret) = env_first(&["ALPACA_SECRET_KEY", "APCA_API_SECRET_KEY"]) {
            self.upstream.alpaca_secret_key = Some(secret);
        }
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.screening_time()?;

        if self.scheduler.refresh_batch_size == 0 {
            anyhow::bail!("scheduler.refresh_batch_size must be at least 1");
        }
        if self.watchlist.snapshot_capacity == 0 {
            anyhow::bail!("watchlist.snapshot_capacity must be at least 1");
        }
        if self.batch.max_concurrency == 0 {
            anyhow::bail!("batch.max_concurrency must be at least 1");
        }
        if self.batch.max_tickers == 0 {
            anyhow::bail!("batch.max_tickers must be at least 1");
        }
        Ok(())
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// What the scheduler does after a run whose screening algorithms failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Mark the day as done once the pipeline has been attempted.
    #[default]
    AttemptOncePerDay,
    /// Only mark the day as done when every algorithm succeeded.
    RetryUntilSuccess,
}

impl std::fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AttemptOncePerDay => write!(f, "attempt_once_per_day"),
            Self::RetryUntilSuccess => write!(f, "retry_until_success"),
        }
    }
}

/// How exchange-local (US Eastern) time is derived from UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstRule {
    /// IANA timezone database (`America/New_York`)
    #[default]
    TzDatabase,
    /// Second Sunday of March 02:00 to first Sunday of November 02:00
    Simplified,
}

/// Daily screening scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Start the scheduler with the service
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Exchange-local trigger time, `HH:MM`
    #[serde(default = "default_screening_time")]
    pub screening_time: String,

    /// Seconds between trigger checks
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Seconds to back off after a failed iteration
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,

    /// Same-day retry behaviour
    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Exchange clock rule
    #[serde(default)]
    pub dst_rule: DstRule,

    /// Lookback for the routine daily bar refresh (covers weekends/holidays)
    #[serde(default = "default_daily_lookback_days")]
    pub daily_lookback_days: i64,

    /// Lookback for targeted refreshes (seeds long moving averages)
    #[serde(default = "default_targeted_lookback_days")]
    pub targeted_lookback_days: i64,

    /// Tickers per price-history request
    #[serde(default = "default_refresh_batch_size")]
    pub refresh_batch_size: usize,

    /// Persist the last-run date across restarts
    #[serde(default = "default_true")]
    pub durable_marker: bool,

    /// SQLite file for the durable marker (default: `~/.screenwatch/scheduler.db`)
    #[serde(default)]
    pub marker_path: Option<PathBuf>,

    /// Active ticker universe seeded into the in-process store
    #[serde(default)]
    pub universe: Vec<String>,
}

impl SchedulerConfig {
    /// Parse the configured trigger time.
    pub fn screening_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.screening_time.trim(), "%H:%M").with_context(|| {
            format!(
                "Invalid scheduler.screening_time '{}', expected HH:MM",
                self.screening_time
            )
        })
    }

    /// Resolved path of the durable marker database.
    pub fn marker_path(&self) -> PathBuf {
        self.marker_path
            .clone()
            .unwrap_or_else(|| config_dir().join("scheduler.db"))
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            screening_time: default_screening_time(),
            check_interval_secs: default_check_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            retry_policy: RetryPolicy::default(),
            dst_rule: DstRule::default(),
            daily_lookback_days: default_daily_lookback_days(),
            targeted_lookback_days: default_targeted_lookback_days(),
            refresh_batch_size: default_refresh_batch_size(),
            durable_marker: true,
            marker_path: None,
            universe: Vec::new(),
        }
    }
}

// ============================================================================
// Watchlist
// ============================================================================

/// Ranked watchlist, cache and snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistConfig {
    /// Ranked watchlist cache TTL
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,

    /// Snapshot ring buffer capacity (24 ≈ 6 hours at a 15-minute cadence)
    #[serde(default = "default_snapshot_capacity")]
    pub snapshot_capacity: usize,

    /// Watchlist size used by change-hash and delta checks
    #[serde(default = "default_change_hash_max_symbols")]
    pub change_hash_max_symbols: usize,

    /// Default `max_symbols` for ranked watchlist requests
    #[serde(default = "default_max_symbols")]
    pub default_max_symbols: usize,

    /// Default `days_back` for ranked watchlist requests
    #[serde(default = "default_days_back")]
    pub default_days_back: i64,

    /// Breakout rows scanned before the recency filter
    #[serde(default = "default_breakout_scan_limit")]
    pub breakout_scan_limit: usize,
}

impl Default for WatchlistConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            snapshot_capacity: default_snapshot_capacity(),
            change_hash_max_symbols: default_change_hash_max_symbols(),
            default_max_symbols: default_max_symbols(),
            default_days_back: default_days_back(),
            breakout_scan_limit: default_breakout_scan_limit(),
        }
    }
}

// ============================================================================
// Batch Analysis
// ============================================================================

/// Batch analysis fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Process-wide cap on tickers analysed at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Maximum tickers per call
    #[serde(default = "default_max_tickers")]
    pub max_tickers: usize,

    /// Default technical lookback in days
    #[serde(default = "default_batch_days")]
    pub default_days: u32,

    /// News sentiment timeframe
    #[serde(default = "default_news_timeframe")]
    pub news_timeframe: String,

    /// News articles per ticker
    #[serde(default = "default_news_limit")]
    pub news_limit: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_tickers: default_max_tickers(),
            default_days: default_batch_days(),
            news_timeframe: default_news_timeframe(),
            news_limit: default_news_limit(),
        }
    }
}

// ============================================================================
// Upstream Services
// ============================================================================

/// Upstream analysis service and market data endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the analysis service
    #[serde(default = "default_upstream_url")]
    pub base_url: String,

    /// Request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Alpaca market data base URL
    #[serde(default = "default_alpaca_data_url")]
    pub alpaca_data_url: String,

    /// Alpaca API key id
    #[serde(default)]
    pub alpaca_api_key: Option<String>,

    /// Alpaca API secret
    #[serde(default)]
    pub alpaca_secret_key: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            timeout_secs: default_timeout_secs(),
            alpaca_data_url: default_alpaca_data_url(),
            alpaca_api_key: None,
            alpaca_secret_key: None,
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_true() -> bool {
    true
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "pretty".into()
}
fn default_screening_time() -> String {
    "17:30".into()
}
fn default_check_interval_secs() -> u64 {
    60
}
fn default_error_backoff_secs() -> u64 {
    300
}
fn default_daily_lookback_days() -> i64 {
    7
}
fn default_targeted_lookback_days() -> i64 {
    730
}
fn default_refresh_batch_size() -> usize {
    100
}
fn default_cache_ttl_secs() -> i64 {
    1800
}
fn default_snapshot_capacity() -> usize {
    24
}
fn default_change_hash_max_symbols() -> usize {
    20
}
fn default_max_symbols() -> usize {
    10
}
fn default_days_back() -> i64 {
    3
}
fn default_breakout_scan_limit() -> usize {
    100
}
fn default_max_concurrency() -> usize {
    10
}
fn default_max_tickers() -> usize {
    50
}
fn default_batch_days() -> u32 {
    365
}
fn default_news_timeframe() -> String {
    "7d".into()
}
fn default_news_limit() -> u32 {
    10
}
fn default_upstream_url() -> String {
    "http://127.0.0.1:8003".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_alpaca_data_url() -> String {
    "https://data.alpaca.markets".into()
}

// ============================================================================
// Tests
// ============================================================================
