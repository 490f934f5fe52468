//! Upstream analysis service adapter.
//!
//! The analysis service owns indicator math, support/resistance detection,
//! news sentiment and the screening algorithms themselves. This adapter turns
//! its REST endpoints into [`AnalysisProvider`] and [`ScreeningSource`].

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use screenwatch_common::UpstreamConfig;

use super::provider::{AnalysisProvider, ProviderError, ScreeningSource, TechnicalRequest};
use super::{Algorithm, AlgorithmMetrics, ScreeningRow};

// ============================================================================
// Constants
// ============================================================================

const FULL_ANALYSIS_ENDPOINT: &str = "/v1/technical/full-analysis";
const SUPPORT_RESISTANCE_ENDPOINT: &str = "/v1/technical/support-resistance";
const NEWS_SENTIMENT_ENDPOINT: &str = "/v1/news/sentiment";

/// Retry hint when the service rate-limits without a `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

fn screening_endpoint(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::Bullish => "/v1/screening/maverick",
        Algorithm::Breakout => "/v1/screening/breakouts",
        Algorithm::Bearish => "/v1/screening/bear",
    }
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ScreeningResponse {
    #[serde(default)]
    stocks: Vec<UpstreamRow>,
}

/// Screening row as the analysis service reports it. Field presence depends on
/// the algorithm.
#[derive(Debug, Deserialize)]
struct UpstreamRow {
    #[serde(alias = "stock_symbol")]
    ticker: Option<String>,
    momentum_score: Option<f64>,
    combined_score: Option<f64>,
    accumulation_rating: Option<f64>,
    breakout_strength: Option<f64>,
    #[serde(alias = "score")]
    bear_score: Option<f64>,
    close_price: Option<f64>,
    date_analyzed: Option<NaiveDate>,
}

impl UpstreamRow {
    /// Convert to a [`ScreeningRow`]; rows without a ticker are dropped.
    fn into_row(self, algorithm: Algorithm) -> Option<ScreeningRow> {
        let ticker = self.ticker.filter(|t| !t.trim().is_empty())?;
        let metrics = match algorithm {
            Algorithm::Bullish => AlgorithmMetrics::Bullish {
                combined_score: self.combined_score.unwrap_or(0.0),
            },
            Algorithm::Breakout => AlgorithmMetrics::Breakout {
                accumulation_rating: self.accumulation_rating.unwrap_or(0.0),
                breakout_strength: self.breakout_strength.unwrap_or(0.0),
            },
            Algorithm::Bearish => AlgorithmMetrics::Bearish {
                bear_score: self.bear_score.unwrap_or(0.0),
            },
        };

        Some(ScreeningRow {
            ticker: ticker.trim().to_uppercase(),
            momentum_score: self.momentum_score.unwrap_or(0.0),
            close_price: self.close_price.unwrap_or(0.0),
            date_analyzed: self.date_analyzed,
            metrics,
        })
    }
}

// ============================================================================
// Upstream Client
// ============================================================================

/// HTTP client for the upstream analysis service.
#[derive(Clone)]
pub struct UpstreamClient {
    base_url: String,
    client: reqwest::Client,
}

impl UpstreamClient {
    /// Create a client for `base_url` with a request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Create from config
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    /// Screening source backed by this client for one algorithm.
    pub fn screening_source(&self, algorithm: Algorithm) -> UpstreamScreeningSource {
        UpstreamScreeningSource {
            client: self.clone(),
            algorithm,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn decode(response: reqwest::Response) -> Result<Value, ProviderError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(retry_after),
            });
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::DataNotAvailable(body));
        }

        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let url = self.url(path);
        debug!(url = %url, "GET upstream");

        let response = self.client.get(&url).query(query).send().await?;
        Self::decode(response).await
    }

    async fn fetch_screening(
        &self,
        algorithm: Algorithm,
        symbols: Option<&[String]>,
    ) -> Result<Vec<ScreeningRow>, ProviderError> {
        let mut query = Vec::new();
        if let Some(symbols) = symbols {
            query.push(("symbols", symbols.join(",")));
        }

        let payload = self.get(screening_endpoint(algorithm), &query).await?;
        let response: ScreeningResponse = serde_json::from_value(payload)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(response
            .stocks
            .into_iter()
            .filter_map(|row| row.into_row(algorithm))
            .collect())
    }
}

#[async_trait]
impl AnalysisProvider for UpstreamClient {
    async fn technical_analysis(&self, request: &TechnicalRequest) -> Result<Value, ProviderError> {
        let url = self.url(FULL_ANALYSIS_ENDPOINT);
        debug!(url = %url, ticker = %request.ticker, "POST upstream");

        let response = self.client.post(&url).json(request).send().await?;
        Self::decode(response).await
    }

    async fn support_resistance(&self, ticker: &str, days: u32) -> Result<Value, ProviderError> {
        self.get(
            SUPPORT_RESISTANCE_ENDPOINT,
            &[("ticker", ticker.to_string()), ("days", days.to_string())],
        )
        .await
    }

    async fn news_sentiment(
        &self,
        ticker: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Value, ProviderError> {
        self.get(
            NEWS_SENTIMENT_ENDPOINT,
            &[
                ("ticker", ticker.to_string()),
                ("timeframe", timeframe.to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }
}

/// One algorithm's screening endpoint.
pub struct UpstreamScreeningSource {
    client: UpstreamClient,
    algorithm: Algorithm,
}

#[async_trait]
impl ScreeningSource for UpstreamScreeningSource {
    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    async fn run_screening(
        &self,
        symbols: Option<&[String]>,
    ) -> Result<Vec<ScreeningRow>, ProviderError> {
        self.client.fetch_screening(self.algorithm, symbols).await
    }
}
