//! End-to-end change detection: screening runs write rows, the change hash
//! and delta operations report what moved.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;

use screenwatch::api::{self, OperationStatus, WatchlistParams};
use screenwatch::data::{
    Algorithm, AlgorithmMetrics, AnalysisProvider, MemoryStore, ProviderError, ScreeningRow,
    ScreeningSource, TechnicalRequest,
};
use screenwatch::delta::{watchlist_hash, Staleness, CACHE_INFO_LABEL, DELTA_LABEL};
use screenwatch::screener::{Clock, ManualClock, MemoryRunMarker};
use screenwatch::{Collaborators, ScreenwatchState};
use screenwatch_common::Config;

// ============================================================================
// Test Doubles
// ============================================================================

/// Bullish source replaying queued ticker sets, one per run.
struct ScriptedSource {
    runs: Mutex<VecDeque<Vec<(&'static str, f64)>>>,
    calls: AtomicU32,
}

impl ScriptedSource {
    fn new(runs: Vec<Vec<(&'static str, f64)>>) -> Self {
        Self {
            runs: Mutex::new(runs.into()),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl ScreeningSource for ScriptedSource {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Bullish
    }

    async fn run_screening(
        &self,
        _symbols: Option<&[String]>,
    ) -> Result<Vec<ScreeningRow>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.runs.lock().unwrap().pop_front().unwrap_or_default();
        Ok(next
            .into_iter()
            .map(|(ticker, momentum)| ScreeningRow {
                ticker: ticker.to_string(),
                momentum_score: momentum,
                close_price: 50.0,
                date_analyzed: None,
                metrics: AlgorithmMetrics::Bullish { combined_score: 4.0 },
            })
            .collect())
    }
}

/// Analysis is not exercised here.
struct NoAnalysis;

#[async_trait]
impl AnalysisProvider for NoAnalysis {
    async fn technical_analysis(&self, _request: &TechnicalRequest) -> Result<Value, ProviderError> {
        Err(ProviderError::Unavailable("unused".into()))
    }

    async fn support_resistance(&self, _ticker: &str, _days: u32) -> Result<Value, ProviderError> {
        Err(ProviderError::Unavailable("unused".into()))
    }

    async fn news_sentiment(
        &self,
        _ticker: &str,
        _timeframe: &str,
        _limit: u32,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::Unavailable("unused".into()))
    }
}

fn state(clock: Arc<ManualClock>, source: Arc<ScriptedSource>) -> ScreenwatchState {
    let collaborators = Collaborators {
        store: Arc::new(MemoryStore::new()),
        sources: vec![source as Arc<dyn ScreeningSource>],
        prices: None,
        analysis: Arc::new(NoAnalysis),
        marker: Arc::new(MemoryRunMarker::new()),
        clock,
    };
    ScreenwatchState::new(Config::default(), collaborators).unwrap()
}

// ============================================================================
// Entries and Exits
// ============================================================================

#[tokio::test]
async fn test_entries_and_exits_between_screenings() {
    // Wednesday 2026-10-14 after the close
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 14, 22, 0, 0).unwrap()));
    let source = Arc::new(ScriptedSource::new(vec![
        vec![("A", 90.0), ("B", 80.0), ("C", 70.0)],
        vec![("B", 80.0), ("C", 70.0), ("D", 60.0)],
    ]));
    let state = state(clock.clone(), source.clone());

    let first = api::trigger_screening(&state, None).await.unwrap();
    assert_eq!(first.status, OperationStatus::Success);

    let info = api::get_change_hash(&state).await.unwrap();
    assert_eq!(info.count, 3);
    assert_eq!(info.staleness, Staleness::Fresh);

    // Monday: Wednesday's rows fall outside the 3-day window
    clock.set(Utc.with_ymd_and_hms(2026, 10, 19, 22, 0, 0).unwrap());
    api::trigger_screening(&state, None).await.unwrap();

    let delta = api::get_delta(&state, &info.content_hash).await.unwrap().delta;
    assert!(delta.changed);
    assert_eq!(delta.entries, vec!["D"]);
    assert_eq!(delta.exits, vec!["A"]);
    assert_eq!(delta.unchanged_count, 2);
    assert_eq!(delta.current_count, 3);
    assert_eq!(delta.previous_hash.as_deref(), Some(info.content_hash.as_str()));

    // Polling again with the new hash reports no change
    let again = api::get_delta(&state, &delta.content_hash).await.unwrap().delta;
    assert!(!again.changed);
    assert_eq!(again.unchanged_count, 3);

    let listing = api::list_recent_snapshots(&state, 10).unwrap();
    let labels: Vec<_> = listing.snapshots.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec![DELTA_LABEL, DELTA_LABEL, CACHE_INFO_LABEL]);
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_change_hash_matches_ranked_watchlist() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 22, 0, 0).unwrap()));
    let source = Arc::new(ScriptedSource::new(vec![vec![("AAPL", 90.0), ("NVDA", 95.0)]]));
    let state = state(clock, source);

    api::trigger_screening(&state, None).await.unwrap();

    let ranked = api::get_ranked_watchlist(
        &state,
        WatchlistParams {
            max_symbols: Some(20),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let info = api::get_change_hash(&state).await.unwrap();

    assert_eq!(info.content_hash, watchlist_hash(&ranked.result.watchlist));
    assert_eq!(ranked.result.watchlist[0].ticker, "NVDA");
    assert_eq!(ranked.result.watchlist[0].rank, 1);
}

// ============================================================================
// Staleness
// ============================================================================

#[tokio::test]
async fn test_staleness_follows_cached_result_age() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 22, 0, 0).unwrap()));
    let source = Arc::new(ScriptedSource::new(vec![vec![("AAPL", 90.0)]]));
    let state = state(clock.clone(), source);

    api::trigger_screening(&state, None).await.unwrap();
    assert_eq!(api::get_change_hash(&state).await.unwrap().staleness, Staleness::Fresh);

    clock.advance(Duration::hours(1));
    assert_eq!(api::get_change_hash(&state).await.unwrap().staleness, Staleness::Stale);

    clock.advance(Duration::hours(2));
    assert_eq!(api::get_change_hash(&state).await.unwrap().staleness, Staleness::Expired);
}

// ============================================================================
// Snapshot Ring
// ============================================================================

#[tokio::test]
async fn test_snapshot_history_is_bounded() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 16, 22, 0, 0).unwrap()));
    let state = state(clock.clone(), Arc::new(ScriptedSource::new(vec![])));

    let mut first_timestamp = None;
    for i in 0..25 {
        let info = api::get_change_hash(&state).await.unwrap();
        if i == 0 {
            first_timestamp = Some(clock.now());
        }
        assert_eq!(info.count, 0);
        clock.advance(Duration::minutes(1));
    }

    assert_eq!(state.deltas.len(), 24);
    let listing = api::list_recent_snapshots(&state, 50).unwrap();
    assert_eq!(listing.count, 24);
    assert!(listing
        .snapshots
        .iter()
        .all(|s| Some(s.timestamp) != first_timestamp));
    assert!(listing.snapshots[0].timestamp > listing.snapshots[23].timestamp);
}

#[tokio::test]
async fn test_snapshot_limit_validation() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = state(clock, Arc::new(ScriptedSource::new(vec![])));

    assert!(api::list_recent_snapshots(&state, 0).unwrap_err().is_invalid_input());
    assert!(api::list_recent_snapshots(&state, 51).is_err());
    assert_eq!(api::list_recent_snapshots(&state, 50).unwrap().count, 0);
}

#[tokio::test]
async fn test_watchlist_validation() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = state(clock, Arc::new(ScriptedSource::new(vec![])));

    let zero = WatchlistParams {
        max_symbols: Some(0),
        ..Default::default()
    };
    assert!(api::get_ranked_watchlist(&state, zero).await.is_err());

    let huge_window = WatchlistParams {
        days_back: Some(1_000_000_000),
        ..Default::default()
    };
    assert!(api::get_ranked_watchlist(&state, huge_window)
        .await
        .unwrap_err()
        .is_invalid_input());

    let year = WatchlistParams {
        days_back: Some(api::MAX_DAYS_BACK),
        ..Default::default()
    };
    assert!(api::get_ranked_watchlist(&state, year).await.is_ok());

    let bad_exclude = WatchlistParams {
        exclude: vec!["$$$".into()],
        ..Default::default()
    };
    assert!(api::get_ranked_watchlist(&state, bad_exclude).await.is_err());

    let empty = api::get_ranked_watchlist(&state, WatchlistParams::default())
        .await
        .unwrap();
    assert_eq!(empty.status, OperationStatus::Success);
    assert_eq!(empty.count, 0);
}
