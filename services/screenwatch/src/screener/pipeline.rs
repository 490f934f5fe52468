//! Daily bar refresh and screening pipeline.
//!
//! The pipeline is what the scheduler runs once per trading day and what
//! on-demand screening triggers call directly:
//!
//! 1. Refresh daily bars for the ticker universe (best effort)
//! 2. Run every screening algorithm, isolating failures per algorithm
//! 3. Persist each algorithm's rows and invalidate cached rankings

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use screenwatch_common::SchedulerConfig;

use super::clock::{Clock, ExchangeCalendar};
use super::watchlist::WatchlistService;
use crate::data::{Algorithm, PriceDataProvider, ScreeningSource, ScreeningStore};

// ============================================================================
// Reports
// ============================================================================

/// Outcome of a bar refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    /// Tickers requested
    pub symbols: usize,
    /// Bars not previously stored
    pub new_records: usize,
    /// Provider batches that failed and were skipped
    pub failed_batches: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// Overall status of a screening run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every algorithm ran and persisted
    Completed,
    /// Some algorithms failed
    Partial,
    /// No algorithm succeeded
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Summary of one screening run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: RunStatus,
    pub symbols_requested: Option<Vec<String>>,
    /// Rows persisted per algorithm
    pub counts: BTreeMap<Algorithm, usize>,
    pub failed_algorithms: Vec<Algorithm>,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_algorithms.is_empty()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Refresh-then-screen pipeline.
pub struct ScreeningPipeline {
    store: Arc<dyn ScreeningStore>,
    sources: Vec<Arc<dyn ScreeningSource>>,
    prices: Option<Arc<dyn PriceDataProvider>>,
    watchlist: Arc<WatchlistService>,
    clock: Arc<dyn Clock>,
    calendar: ExchangeCalendar,
    config: SchedulerConfig,
}

impl ScreeningPipeline {
    pub fn new(
        store: Arc<dyn ScreeningStore>,
        sources: Vec<Arc<dyn ScreeningSource>>,
        prices: Option<Arc<dyn PriceDataProvider>>,
        watchlist: Arc<WatchlistService>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sources,
            prices,
            watchlist,
            clock,
            calendar: ExchangeCalendar::new(config.dst_rule),
            config,
        }
    }

    /// Fetch daily bars and persist them.
    ///
    /// Without `symbols` the whole active universe is refreshed with the short
    /// daily lookback. With `symbols` only those tickers are fetched, with the
    /// long lookback so new tickers have enough history. A failing provider
    /// batch is logged and skipped.
    pub async fn refresh_daily_bars(&self, symbols: Option<&[String]>) -> Result<RefreshReport> {
        let prices = self
            .prices
            .as_ref()
            .context("No price data provider configured")?;

        let end = self.clock.now().date_naive();
        let (targets, lookback) = match symbols {
            Some(symbols) => {
                let targets: Vec<String> = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
                info!(
                    symbols = targets.len(),
                    lookback_days = self.config.targeted_lookback_days,
                    tickers = %targets.join(", "),
                    "Targeted bar refresh"
                );
                (targets, self.config.targeted_lookback_days)
            }
            None => {
                let targets = self
                    .store
                    .active_tickers()
                    .await
                    .context("Failed to list active tickers")?;
                info!(symbols = targets.len(), "Refreshing daily bars for active tickers");
                (targets, self.config.daily_lookback_days)
            }
        };
        let start = end - Duration::days(lookback);

        let mut report = RefreshReport {
            symbols: targets.len(),
            start: Some(start),
            end: Some(end),
            ..Default::default()
        };

        let batch_size = self.config.refresh_batch_size.max(1);
        for (i, batch) in targets.chunks(batch_size).enumerate() {
            let bars = match prices.batch_get_history(batch, start, end).await {
                Ok(bars) => bars,
                Err(e) => {
                    error!(
                        provider = prices.name(),
                        batch = i + 1,
                        error = %e,
                        "Bar batch fetch failed"
                    );
                    report.failed_batches += 1;
                    continue;
                }
            };

            for (ticker, series) in bars.iter().filter(|(_, s)| !s.is_empty()) {
                match self.store.insert_price_bars(ticker, series).await {
                    Ok(count) => report.new_records += count,
                    Err(e) => warn!(ticker = %ticker, error = %e, "Failed to store bars"),
                }
            }
        }

        info!(
            new_records = report.new_records,
            symbols = report.symbols,
            failed_batches = report.failed_batches,
            "Bar refresh complete"
        );
        Ok(report)
    }

    /// Run every screening algorithm and persist the results.
    ///
    /// With `symbols`, their bars are refreshed first and only they are
    /// screened. One algorithm failing never stops the others.
    pub async fn run_screening(&self, symbols: Option<&[String]>) -> RunSummary {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = self.clock.now();
        let scope = symbols
            .map(|s| format!("{} symbols", s.len()))
            .unwrap_or_else(|| "all stocks".to_string());

        info!(run_id = %run_id, scope = %scope, "Starting screening run");

        if let Some(symbols) = symbols {
            match self.refresh_daily_bars(Some(symbols)).await {
                Ok(report) => info!(
                    new_records = report.new_records,
                    symbols = report.symbols,
                    "Pre-screening bar fetch complete"
                ),
                Err(e) => warn!(error = %e, "Pre-screening bar fetch failed, screening cached data"),
            }
        }

        let today = self.calendar.to_exchange(started_at).date_naive();
        let mut counts = BTreeMap::new();
        let mut failed_algorithms = Vec::new();
        let mut errors = Vec::new();

        for source in &self.sources {
            let algorithm = source.algorithm();
            let result = match source.run_screening(symbols).await {
                Ok(rows) if rows.is_empty() => Ok(0),
                Ok(rows) => self
                    .store
                    .insert_screening_rows(algorithm, &rows, today)
                    .await
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match result {
                Ok(count) => {
                    info!(algorithm = %algorithm, count, "Screening complete");
                    counts.insert(algorithm, count);
                }
                Err(e) => {
                    error!(algorithm = %algorithm, error = %e, "Screening failed");
                    counts.insert(algorithm, 0);
                    failed_algorithms.push(algorithm);
                    errors.push(format!("{}: {}", algorithm, e));
                }
            }
        }

        let status = if failed_algorithms.is_empty() {
            RunStatus::Completed
        } else if failed_algorithms.len() < self.sources.len() {
            RunStatus::Partial
        } else {
            RunStatus::Failed
        };

        self.watchlist.invalidate();

        let summary = RunSummary {
            run_id,
            started_at,
            completed_at: self.clock.now(),
            status,
            symbols_requested: symbols.map(|s| s.to_vec()),
            counts,
            failed_algorithms,
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        };

        info!(
            run_id = %summary.run_id,
            status = %summary.status,
            scope = %scope,
            counts = ?summary.counts,
            "Screening run finished"
        );
        summary
    }
}
