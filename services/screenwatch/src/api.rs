//! Caller-facing operations.
//!
//! Every operation validates its input before touching any state. Invalid
//! input is returned as [`Error::InvalidInput`]; degraded results come back
//! as a response with [`OperationStatus::Partial`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use screenwatch_common::validation::{check_range, normalize_ticker, normalize_tickers};
use screenwatch_common::{Error, Result};

use crate::analysis::BatchOptions;
use crate::data::IntradayBar;
use crate::delta::{DeltaResult, Snapshot, Staleness, CACHE_INFO_LABEL};
use crate::screener::{RankedWatchlist, RunStatus, RunSummary, SchedulerStatus, WatchlistRequest};
use crate::ScreenwatchState;

/// Most snapshots one listing call may return.
pub const MAX_SNAPSHOT_LIMIT: usize = 50;

/// Longest recency window a watchlist request may ask for.
pub const MAX_DAYS_BACK: i64 = 365;

// ============================================================================
// Status
// ============================================================================

/// Outcome class carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Success,
    /// Completed with some sources or tickers missing
    Partial,
    Error,
}

impl OperationStatus {
    /// Classify by how many of `total` parts failed.
    pub fn from_failures(failed: usize, total: usize) -> Self {
        if failed == 0 {
            Self::Success
        } else if failed < total {
            Self::Partial
        } else {
            Self::Error
        }
    }
}

impl From<RunStatus> for OperationStatus {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Completed => Self::Success,
            RunStatus::Partial => Self::Partial,
            RunStatus::Failed => Self::Error,
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    pub timestamp: DateTime<Utc>,
}

/// Error body for callers that serialize failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: OperationStatus,
    pub code: u16,
    pub error: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            status: OperationStatus::Error,
            code: err.status_code(),
            error: err.to_string(),
        }
    }
}

/// Ranked watchlist parameters; unset fields take configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchlistParams {
    pub max_symbols: Option<usize>,
    #[serde(default)]
    pub include_bearish: bool,
    pub days_back: Option<i64>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub bypass_cache: bool,
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub status: OperationStatus,
    pub count: usize,
    #[serde(flatten)]
    pub result: RankedWatchlist,
}

#[derive(Debug, Serialize)]
pub struct ChangeHashResponse {
    pub status: OperationStatus,
    pub content_hash: String,
    pub count: usize,
    pub staleness: Staleness,
    /// When the hashed watchlist was generated
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DeltaResponse {
    pub status: OperationStatus,
    #[serde(flatten)]
    pub delta: DeltaResult,
}

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub status: OperationStatus,
    pub count: usize,
    pub snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchAnalysisRequest {
    pub tickers: Vec<String>,
    #[serde(default)]
    pub include_news: bool,
    pub days: Option<u32>,
    #[serde(default)]
    pub intraday_bars: HashMap<String, IntradayBar>,
    #[serde(default)]
    pub fingerprints: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct BatchAnalysisResponse {
    pub status: OperationStatus,
    /// Successful tickers
    pub count: usize,
    /// Successful tickers only; a missing requested ticker failed
    pub results: BTreeMap<String, Value>,
    /// Failure reason per failed ticker
    pub failed: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ScreeningResponse {
    pub status: OperationStatus,
    pub run: RunSummary,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStatusResponse {
    pub status: OperationStatus,
    #[serde(flatten)]
    pub scheduler: SchedulerStatus,
}

// ============================================================================
// Operations
// ============================================================================

/// Health check
pub fn health() -> HealthResponse {
    HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "screenwatch".to_string(),
        timestamp: Utc::now(),
    }
}

/// Ranked, de-duplicated watchlist across algorithms.
pub async fn get_ranked_watchlist(
    state: &ScreenwatchState,
    params: WatchlistParams,
) -> Result<WatchlistResponse> {
    let defaults = state.watchlist.config();
    let max_symbols = params.max_symbols.unwrap_or(defaults.default_max_symbols);
    let days_back = params.days_back.unwrap_or(defaults.default_days_back);

    if max_symbols < 1 {
        return Err(Error::InvalidInput("max_symbols must be at least 1".into()));
    }
    let days_back = check_range("days_back", days_back, 1, MAX_DAYS_BACK)?;
    let exclude = params
        .exclude
        .iter()
        .map(|t| normalize_ticker(t))
        .collect::<Result<Vec<_>>>()?;

    let request = WatchlistRequest {
        max_symbols,
        include_bearish: params.include_bearish,
        days_back,
        exclude,
        bypass_cache: params.bypass_cache,
    };
    let result = state.watchlist.ranked(&request).await?;

    let requested = if request.include_bearish { 3 } else { 2 };
    Ok(WatchlistResponse {
        status: OperationStatus::from_failures(result.failed_sources.len(), requested),
        count: result.watchlist.len(),
        result,
    })
}

/// Short hash of the current default watchlist, for cheap "anything new?"
/// polling. Records a snapshot.
pub async fn get_change_hash(state: &ScreenwatchState) -> Result<ChangeHashResponse> {
    let result = state.watchlist.ranked(&change_request(state)).await?;
    let snapshot = state.deltas.snapshot(&result.watchlist, CACHE_INFO_LABEL);
    let staleness = Staleness::classify(&result.generated_at.to_rfc3339(), state.clock.now());

    debug!(hash = %snapshot.content_hash, staleness = %staleness, "Change hash computed");

    Ok(ChangeHashResponse {
        status: OperationStatus::from_failures(result.failed_sources.len(), 2),
        content_hash: snapshot.content_hash,
        count: snapshot.count,
        staleness,
        timestamp: result.generated_at,
    })
}

/// Entries and exits since the watchlist identified by `since_hash`.
pub async fn get_delta(state: &ScreenwatchState, since_hash: &str) -> Result<DeltaResponse> {
    let result = state.watchlist.ranked(&change_request(state)).await?;
    let delta = state.deltas.delta(&result.watchlist, since_hash);

    Ok(DeltaResponse {
        status: OperationStatus::from_failures(result.failed_sources.len(), 2),
        delta,
    })
}

/// Most recent snapshots, newest first.
pub fn list_recent_snapshots(state: &ScreenwatchState, limit: usize) -> Result<SnapshotsResponse> {
    let limit = check_range("limit", limit, 1, MAX_SNAPSHOT_LIMIT)?;
    let snapshots = state.deltas.recent(limit);

    Ok(SnapshotsResponse {
        status: OperationStatus::Success,
        count: snapshots.len(),
        snapshots,
    })
}

/// Technical analysis plus extras for up to `max_tickers` tickers.
pub async fn run_batch_analysis(
    state: &ScreenwatchState,
    request: BatchAnalysisRequest,
) -> Result<BatchAnalysisResponse> {
    let config = state.batch.config();
    let tickers = normalize_tickers(&request.tickers, config.max_tickers)?;
    let days = request.days.unwrap_or(config.default_days);
    if days < 1 {
        return Err(Error::InvalidInput("days must be at least 1".into()));
    }

    let options = BatchOptions {
        include_news: request.include_news,
        days,
        intraday_bars: upper_keys(request.intraday_bars),
        fingerprints: upper_keys(request.fingerprints),
    };

    let results = state.batch.analyze(&tickers, &options).await;

    let successes: BTreeMap<String, Value> = results
        .successes()
        .map(|(ticker, value)| (ticker.to_string(), value.clone()))
        .collect();
    let failed: BTreeMap<String, String> = results
        .failures()
        .map(|(ticker, reason)| (ticker.to_string(), reason.to_string()))
        .collect();

    info!(
        requested = tickers.len(),
        succeeded = successes.len(),
        failed = failed.len(),
        "Batch analysis finished"
    );

    Ok(BatchAnalysisResponse {
        status: OperationStatus::from_failures(failed.len(), tickers.len()),
        count: successes.len(),
        results: successes,
        failed,
        timestamp: results.timestamp,
    })
}

/// Run screening now, optionally for a subset of tickers.
pub async fn trigger_screening(
    state: &ScreenwatchState,
    symbols: Option<Vec<String>>,
) -> Result<ScreeningResponse> {
    let symbols = match symbols {
        Some(symbols) => Some(normalize_tickers(&symbols, usize::MAX)?),
        None => None,
    };

    let run = state.pipeline.run_screening(symbols.as_deref()).await;
    Ok(ScreeningResponse {
        status: run.status.into(),
        run,
    })
}

pub async fn scheduler_status(state: &ScreenwatchState) -> SchedulerStatusResponse {
    SchedulerStatusResponse {
        status: OperationStatus::Success,
        scheduler: state.scheduler.status().await,
    }
}

/// Default watchlist used for change detection: bullish and breakout only.
fn change_request(state: &ScreenwatchState) -> WatchlistRequest {
    let config = state.watchlist.config();
    WatchlistRequest::top(config.change_hash_max_symbols, config.default_days_back)
}

fn upper_keys<V>(map: HashMap<String, V>) -> HashMap<String, V> {
    map.into_iter()
        .map(|(k, v)| (k.trim().to_uppercase(), v))
        .collect()
}
