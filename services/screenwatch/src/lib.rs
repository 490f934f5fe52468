//! Screenwatch Library
//!
//! Screening orchestration for a US equities watchlist: runs the screening
//! algorithms once per trading day, merges their output into one ranked
//! watchlist, tracks how that watchlist changes between polls, and fans out
//! per-ticker analysis with bounded concurrency.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     screenwatch (Rust Service)                      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐      │
//! │  │  Scheduler +    │  │  Ranking +      │  │  Batch          │      │
//! │  │  Pipeline       │  │  Delta Tracker  │  │  Analyzer       │      │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘      │
//! │           │                    │                    │               │
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │  Collaborators: price data, screening sources, analysis,    │    │
//! │  │  screening store                                            │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Composite score
//! Each algorithm's raw signals are blended into one 0-100 score so rows from
//! different algorithms can be ranked together. A ticker found by several
//! algorithms keeps its best score.
//!
//! ## Content hash
//! A 16-hex-character fingerprint of the ranked tickers and scores; callers
//! poll with the last hash they saw and get entries and exits back.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analysis;
pub mod api;
pub mod data;
pub mod delta;
pub mod screener;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use screenwatch_common::Config;

use crate::analysis::BatchAnalyzer;
use crate::data::{
    Algorithm, AlpacaBarsClient, AnalysisProvider, MemoryStore, PriceDataProvider,
    ScreeningSource, ScreeningStore, UpstreamClient,
};
use crate::delta::DeltaTracker;
use crate::screener::{
    Clock, MemoryRunMarker, RunMarker, ScreeningPipeline, ScreeningScheduler, SqliteRunMarker,
    SystemClock, WatchlistService,
};

/// External collaborators the service is wired against.
pub struct Collaborators {
    pub store: Arc<dyn ScreeningStore>,
    /// One source per algorithm, run in order
    pub sources: Vec<Arc<dyn ScreeningSource>>,
    pub prices: Option<Arc<dyn PriceDataProvider>>,
    pub analysis: Arc<dyn AnalysisProvider>,
    pub marker: Arc<dyn RunMarker>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Production adapters built from configuration.
    ///
    /// Screening sources and analysis go to the upstream analysis service;
    /// bars come from Alpaca when credentials are configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let upstream = UpstreamClient::from_config(&config.upstream);

        // Bullish first, then bearish, then breakouts
        let sources: Vec<Arc<dyn ScreeningSource>> = [
            Algorithm::Bullish,
            Algorithm::Bearish,
            Algorithm::Breakout,
        ]
        .into_iter()
        .map(|a| Arc::new(upstream.screening_source(a)) as Arc<dyn ScreeningSource>)
        .collect();

        let prices = AlpacaBarsClient::from_config(&config.upstream)
            .map(|client| Arc::new(client) as Arc<dyn PriceDataProvider>);
        if prices.is_none() {
            info!("No Alpaca credentials configured, daily bar refresh disabled");
        }

        let marker: Arc<dyn RunMarker> = if config.scheduler.durable_marker {
            let path = config.scheduler.marker_path();
            Arc::new(
                SqliteRunMarker::open(&path)
                    .with_context(|| format!("Failed to open run marker at {}", path.display()))?,
            )
        } else {
            Arc::new(MemoryRunMarker::new())
        };

        Ok(Self {
            store: Arc::new(MemoryStore::with_tickers(config.scheduler.universe.clone())),
            sources,
            prices,
            analysis: Arc::new(upstream),
            marker,
            clock: Arc::new(SystemClock),
        })
    }
}

/// Service state shared by every caller-facing operation.
pub struct ScreenwatchState {
    /// Configuration
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn ScreeningStore>,
    /// Ranked watchlist service (with cache)
    pub watchlist: Arc<WatchlistService>,
    /// Snapshot ring and delta computation
    pub deltas: Arc<DeltaTracker>,
    /// Batch analysis fan-out
    pub batch: Arc<BatchAnalyzer>,
    pub pipeline: Arc<ScreeningPipeline>,
    pub scheduler: Arc<ScreeningScheduler>,
    pub started_at: DateTime<Utc>,
}

impl ScreenwatchState {
    /// Wire the service against `collaborators`.
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            store,
            sources,
            prices,
            analysis,
            marker,
            clock,
        } = collaborators;

        let watchlist = Arc::new(WatchlistService::new(
            Arc::clone(&store),
            config.watchlist.clone(),
            Arc::clone(&clock),
        ));
        let deltas = Arc::new(DeltaTracker::new(
            config.watchlist.snapshot_capacity,
            Arc::clone(&clock),
        ));
        let batch = Arc::new(BatchAnalyzer::new(analysis, config.batch.clone()));
        let pipeline = Arc::new(ScreeningPipeline::new(
            Arc::clone(&store),
            sources,
            prices,
            Arc::clone(&watchlist),
            Arc::clone(&clock),
            config.scheduler.clone(),
        ));
        let scheduler = Arc::new(ScreeningScheduler::new(
            Arc::clone(&pipeline),
            marker,
            Arc::clone(&clock),
            config.scheduler.clone(),
        )?);

        Ok(Self {
            started_at: clock.now(),
            config,
            clock,
            store,
            watchlist,
            deltas,
            batch,
            pipeline,
            scheduler,
        })
    }
}

/// Main screenwatch service
pub struct ScreenwatchService {
    state: Arc<ScreenwatchState>,
}

impl ScreenwatchService {
    /// Create a service with production adapters
    pub fn new(config: Config) -> Result<Self> {
        let collaborators = Collaborators::from_config(&config)?;
        Self::with_collaborators(config, collaborators)
    }

    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Result<Self> {
        let state = Arc::new(ScreenwatchState::new(config, collaborators)?);
        Ok(Self { state })
    }

    pub fn state(&self) -> Arc<ScreenwatchState> {
        Arc::clone(&self.state)
    }

    /// Start background work (the daily scheduler)
    pub async fn start(&self) -> Result<()> {
        self.state.scheduler.start().await;
        info!(
            upstream = %self.state.config.upstream.base_url,
            universe = self.state.config.scheduler.universe.len(),
            "Screenwatch service started"
        );
        Ok(())
    }

    /// Stop background work
    pub async fn shutdown(&self) {
        self.state.scheduler.stop().await;
        info!("Screenwatch service stopped");
    }
}
