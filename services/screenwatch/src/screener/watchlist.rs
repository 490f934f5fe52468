//! Ranked watchlist service.
//!
//! Reads stored screening rows per algorithm, merges them through the ranking
//! engine and caches the result until the next screening run.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use screenwatch_common::{Error, Result, WatchlistConfig};

use super::cache::TtlCache;
use super::clock::Clock;
use super::ranking::{merge_sources, Candidate, DataFreshness, SourceRows};
use crate::data::{Algorithm, ScreeningQuery, ScreeningStore};

/// Parameters for one ranked watchlist read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchlistRequest {
    pub max_symbols: usize,
    pub include_bearish: bool,
    pub days_back: i64,
    /// Tickers removed before ranking
    pub exclude: Vec<String>,
    pub bypass_cache: bool,
}

impl WatchlistRequest {
    /// Bullish + breakout only, `max_symbols` long, default lookback.
    pub fn top(max_symbols: usize, days_back: i64) -> Self {
        Self {
            max_symbols,
            include_bearish: false,
            days_back,
            exclude: Vec::new(),
            bypass_cache: false,
        }
    }

    fn cache_key(&self) -> CacheKey {
        let mut exclude = self.exclude.clone();
        exclude.sort();
        exclude.dedup();
        CacheKey {
            max_symbols: self.max_symbols,
            include_bearish: self.include_bearish,
            days_back: self.days_back,
            exclude,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    max_symbols: usize,
    include_bearish: bool,
    days_back: i64,
    exclude: Vec<String>,
}

/// A ranked, de-duplicated watchlist with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedWatchlist {
    pub watchlist: Vec<Candidate>,
    pub total_candidates: usize,
    /// Algorithms whose rows were actually merged
    pub algorithms_queried: Vec<Algorithm>,
    /// Algorithms that were requested but could not be read
    pub failed_sources: Vec<Algorithm>,
    /// Latest bullish analysis date
    pub screening_date: Option<NaiveDate>,
    pub data_freshness: DataFreshness,
    pub generated_at: DateTime<Utc>,
}

/// Builds ranked watchlists from stored screening rows.
pub struct WatchlistService {
    store: Arc<dyn ScreeningStore>,
    cache: TtlCache<CacheKey, RankedWatchlist>,
    config: WatchlistConfig,
    clock: Arc<dyn Clock>,
}

impl WatchlistService {
    pub fn new(store: Arc<dyn ScreeningStore>, config: WatchlistConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache: TtlCache::with_ttl(config.cache_ttl_secs, clock.clone()),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &WatchlistConfig {
        &self.config
    }

    /// Drop cached rankings; called after a screening run writes new rows.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Ranked watchlist for `request`, served from cache when possible.
    pub async fn ranked(&self, request: &WatchlistRequest) -> Result<RankedWatchlist> {
        let key = request.cache_key();
        if !request.bypass_cache {
            if let Some(cached) = self.cache.get(&key) {
                debug!(max_symbols = request.max_symbols, "Ranked watchlist cache hit");
                return Ok(cached);
            }
        }

        let now = self.clock.now();
        let cutoff = Duration::try_days(request.days_back)
            .and_then(|window| now.date_naive().checked_sub_signed(window))
            .ok_or_else(|| {
                Error::InvalidInput(format!("days_back {} is out of range", request.days_back))
            })?;

        let mut algorithms = vec![Algorithm::Bullish, Algorithm::Breakout];
        if request.include_bearish {
            algorithms.push(Algorithm::Bearish);
        }

        let mut sources = Vec::with_capacity(algorithms.len());
        let mut failed_sources = Vec::new();
        for algorithm in algorithms {
            match self.read_source(algorithm, cutoff, &key.exclude).await {
                Ok(source) => sources.push(source),
                Err(e) => {
                    warn!(algorithm = %algorithm, error = %e, "Screening source unavailable, ranking without it");
                    failed_sources.push(algorithm);
                }
            }
        }

        let ranking = merge_sources(&sources, request.max_symbols);
        let result = RankedWatchlist {
            screening_date: ranking.data_freshness.date_for(Algorithm::Bullish),
            watchlist: ranking.watchlist,
            total_candidates: ranking.total_candidates,
            algorithms_queried: ranking.algorithms_queried,
            failed_sources,
            data_freshness: ranking.data_freshness,
            generated_at: now,
        };

        debug!(
            count = result.watchlist.len(),
            total_candidates = result.total_candidates,
            "Ranked watchlist built"
        );

        self.cache.insert(key, result.clone());
        Ok(result)
    }

    async fn read_source(
        &self,
        algorithm: Algorithm,
        cutoff: NaiveDate,
        exclude: &[String],
    ) -> Result<SourceRows> {
        let rows = match algorithm {
            // Breakouts: best N overall, then drop anything older than the window
            Algorithm::Breakout => {
                let query = ScreeningQuery {
                    since: None,
                    limit: Some(self.config.breakout_scan_limit),
                };
                self.store
                    .screening_rows(algorithm, query)
                    .await?
                    .into_iter()
                    .filter(|row| row.date_analyzed.map_or(true, |d| d >= cutoff))
                    .collect()
            }
            Algorithm::Bullish | Algorithm::Bearish => {
                let query = ScreeningQuery {
                    since: Some(cutoff),
                    limit: None,
                };
                self.store.screening_rows(algorithm, query).await?
            }
        };

        let rows = rows
            .into_iter()
            .filter(|row| !exclude.contains(&row.ticker))
            .collect();
        Ok(SourceRows::new(algorithm, rows))
    }
}
