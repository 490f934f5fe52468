//! Screening orchestration.
//!
//! - Merge and rank per-algorithm screening rows into one watchlist
//! - Cache ranked watchlists between screening runs
//! - Refresh bars and run the screening algorithms once per trading day

mod cache;
pub mod clock;
mod marker;
mod pipeline;
mod ranking;
mod scheduler;
mod watchlist;

pub use cache::{CacheStats, TtlCache};
pub use clock::{Clock, ExchangeCalendar, ManualClock, SystemClock};
pub use marker::{MemoryRunMarker, RunMarker, SqliteRunMarker};
pub use pipeline::{RefreshReport, RunStatus, RunSummary, ScreeningPipeline};
pub use ranking::{
    merge_sources, round1, Candidate, CandidateMerger, DataFreshness, DisplayMetrics, Ranking,
    SourceRows,
};
pub use scheduler::{
    SchedulerState, SchedulerStatus, ScreeningScheduler, TickOutcome,
};
pub use watchlist::{RankedWatchlist, WatchlistRequest, WatchlistService};
