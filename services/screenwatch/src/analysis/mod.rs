//! Per-ticker analysis fan-out.

mod batch;

pub use batch::{BatchAnalyzer, BatchOptions, BatchResults, TickerOutcome};
