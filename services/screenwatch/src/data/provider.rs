//! Collaborator traits.
//!
//! The orchestration core never talks to a data vendor, the analysis service
//! or a database directly; it is written against these traits so adapters and
//! test doubles can be swapped freely.

use async_trait::async_trait;
use chrono::NaiveDate;
use screenwatch_common::Result as StoreResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::{Algorithm, IntradayBar, PriceBar, ScreeningRow};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors reported by external data and analysis providers.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider is temporarily unavailable
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Data not available for the requested symbol
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Response could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(", retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Internal provider error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<ProviderError> for screenwatch_common::Error {
    fn from(err: ProviderError) -> Self {
        screenwatch_common::Error::Provider(err.to_string())
    }
}

// ============================================================================
// Price Data
// ============================================================================

/// Source of daily price history.
#[async_trait]
pub trait PriceDataProvider: Send + Sync {
    /// Provider name for logs (e.g., "alpaca")
    fn name(&self) -> &'static str;

    /// Fetch daily bars for many tickers over `start..=end`.
    ///
    /// Tickers the provider has no data for are simply absent from the map.
    async fn batch_get_history(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Vec<PriceBar>>, ProviderError>;
}

// ============================================================================
// Screening Sources
// ============================================================================

/// One screening algorithm.
#[async_trait]
pub trait ScreeningSource: Send + Sync {
    /// Which algorithm this source runs
    fn algorithm(&self) -> Algorithm;

    /// Run the algorithm over `symbols`, or over the whole universe when `None`.
    ///
    /// Rows are already filtered by the algorithm's own quality gate.
    async fn run_screening(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<ScreeningRow>, ProviderError>;
}

// ============================================================================
// Analysis
// ============================================================================

/// Status value the technical provider returns when the caller's fingerprint
/// still matches the underlying dataset.
pub const UNCHANGED_STATUS: &str = "unchanged";

/// Whether a technical analysis payload is the "unchanged" sentinel.
pub fn is_unchanged(payload: &Value) -> bool {
    payload.get("status").and_then(Value::as_str) == Some(UNCHANGED_STATUS)
}

/// Parameters for one technical analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalRequest {
    pub ticker: String,
    pub days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub today_bar: Option<IntradayBar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_fingerprint: Option<String>,
}

/// Per-ticker analysis provider.
///
/// Payloads are opaque JSON; the core only inspects the `status` field of the
/// technical result.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    async fn technical_analysis(&self, request: &TechnicalRequest) -> Result<Value, ProviderError>;

    async fn support_resistance(&self, ticker: &str, days: u32) -> Result<Value, ProviderError>;

    async fn news_sentiment(
        &self,
        ticker: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Value, ProviderError>;
}

// ============================================================================
// Persistence
// ============================================================================

/// Filter for reading stored screening rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreeningQuery {
    /// Only rows analysed on or after this date
    pub since: Option<NaiveDate>,
    /// Keep at most this many rows after ordering
    pub limit: Option<usize>,
}

/// Storage for bars, screening results and the active ticker universe.
#[async_trait]
pub trait ScreeningStore: Send + Sync {
    /// Upsert daily bars; returns the number of bars not previously stored.
    async fn insert_price_bars(&self, ticker: &str, bars: &[PriceBar]) -> StoreResult<usize>;

    /// Upsert an algorithm's rows for `date`, keyed by (date, ticker).
    ///
    /// Returns the number of distinct rows written. Writing the same rows twice
    /// leaves the store unchanged.
    async fn insert_screening_rows(
        &self,
        algorithm: Algorithm,
        rows: &[ScreeningRow],
        date: NaiveDate,
    ) -> StoreResult<usize>;

    /// Tickers that should be refreshed by the daily job.
    async fn active_tickers(&self) -> StoreResult<Vec<String>>;

    /// Stored rows for one algorithm, best first (by its primary score).
    async fn screening_rows(
        &self,
        algorithm: Algorithm,
        query: ScreeningQuery,
    ) -> StoreResult<Vec<ScreeningRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("timeout".into()).is_recoverable());
        assert!(ProviderError::RateLimited { retry_after_secs: Some(60) }.is_recoverable());
        assert!(ProviderError::Unavailable("maintenance".into()).is_recoverable());
        assert!(!ProviderError::DataNotAvailable("no data".into()).is_recoverable());
        assert!(!ProviderError::InvalidResponse("bad json".into()).is_recoverable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::RateLimited { retry_after_secs: Some(30) };
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
        let err = ProviderError::RateLimited { retry_after_secs: None };
        assert_eq!(err.to_string(), "Rate limited");
    }

    #[test]
    fn test_provider_error_into_common() {
        let err: screenwatch_common::Error = ProviderError::Network("reset".into()).into();
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_is_unchanged() {
        assert!(is_unchanged(&json!({"status": "unchanged", "fingerprint": "abc"})));
        assert!(!is_unchanged(&json!({"status": "ok"})));
        assert!(!is_unchanged(&json!({"error": "boom"})));
    }
}
