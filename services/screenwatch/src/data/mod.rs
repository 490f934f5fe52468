//! Market and screening data.
//!
//! Domain types shared by the screening pipeline, the ranking engine and the
//! batch analyzer, plus the collaborator traits they are written against.
//!
//! # Collaborators
//! - **Price data** ([`PriceDataProvider`]): daily bars, Alpaca in production
//! - **Screening sources** ([`ScreeningSource`]): one per algorithm
//! - **Analysis** ([`AnalysisProvider`]): technical analysis and extras
//! - **Persistence** ([`ScreeningStore`]): bars, screening rows, active tickers

mod provider;
mod store;
mod upstream;
mod alpaca;

pub use provider::{
    is_unchanged, AnalysisProvider, PriceDataProvider, ProviderError, ScreeningQuery,
    ScreeningSource, ScreeningStore, TechnicalRequest, UNCHANGED_STATUS,
};
pub use store::MemoryStore;
pub use upstream::{UpstreamClient, UpstreamScreeningSource};
pub use alpaca::AlpacaBarsClient;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Algorithms
// ============================================================================

/// Screening algorithm that produced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    /// Momentum/trend-following longs
    #[serde(rename = "maverick_bullish")]
    Bullish,
    /// Supply/demand breakouts from accumulation
    #[serde(rename = "supply_demand_breakout")]
    Breakout,
    /// Weakening names for short setups
    #[serde(rename = "maverick_bearish")]
    Bearish,
}

impl Algorithm {
    /// Merge order. Ties after rounding resolve in this order.
    pub const ALL: [Algorithm; 3] = [Algorithm::Bullish, Algorithm::Breakout, Algorithm::Bearish];

    /// Wire name of the algorithm.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "maverick_bullish",
            Self::Breakout => "supply_demand_breakout",
            Self::Bearish => "maverick_bearish",
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Screening Rows
// ============================================================================

/// Algorithm-specific raw signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum AlgorithmMetrics {
    #[serde(rename = "maverick_bullish")]
    Bullish {
        /// Combined pattern score on a 0-8 scale
        combined_score: f64,
    },
    #[serde(rename = "supply_demand_breakout")]
    Breakout {
        /// Accumulation rating, 0-100
        accumulation_rating: f64,
        /// Breakout strength on a 0-5 scale
        breakout_strength: f64,
    },
    #[serde(rename = "maverick_bearish")]
    Bearish {
        /// Bear score, 0-100
        bear_score: f64,
    },
}

impl AlgorithmMetrics {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Bullish { .. } => Algorithm::Bullish,
            Self::Breakout { .. } => Algorithm::Breakout,
            Self::Bearish { .. } => Algorithm::Bearish,
        }
    }
}

/// One row produced by a screening algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningRow {
    pub ticker: String,
    pub momentum_score: f64,
    #[serde(default)]
    pub close_price: f64,
    #[serde(default)]
    pub date_analyzed: Option<NaiveDate>,
    #[serde(flatten)]
    pub metrics: AlgorithmMetrics,
}

impl ScreeningRow {
    pub fn algorithm(&self) -> Algorithm {
        self.metrics.algorithm()
    }

    /// Blend the row's raw signals into a 0-100 composite score.
    pub fn composite_score(&self) -> f64 {
        let momentum = self.momentum_score;
        match self.metrics {
            AlgorithmMetrics::Bullish { combined_score } => {
                (combined_score / 8.0 * 100.0 * 0.6) + (momentum * 0.4)
            }
            AlgorithmMetrics::Breakout {
                accumulation_rating,
                breakout_strength,
            } => (momentum * 0.5) + (accumulation_rating * 0.3) + (breakout_strength * 20.0 * 0.2),
            AlgorithmMetrics::Bearish { bear_score } => {
                (bear_score * 0.6) + ((100.0 - momentum) * 0.4)
            }
        }
    }

    /// Score the store orders rows by when listing an algorithm's results.
    pub fn primary_score(&self) -> f64 {
        match self.metrics {
            AlgorithmMetrics::Bullish { combined_score } => combined_score,
            AlgorithmMetrics::Breakout { .. } => self.momentum_score,
            AlgorithmMetrics::Bearish { bear_score } => bear_score,
        }
    }
}

// ============================================================================
// Bars
// ============================================================================

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Partial bar for the current session, supplied by callers that watch
/// intraday prices so technical analysis can include today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}
