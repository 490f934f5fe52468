//! Alpaca market data adapter.
//!
//! # API Documentation
//! <https://docs.alpaca.markets/reference/stockbars>
//!
//! Daily bars for many symbols come back from one paginated endpoint, so a
//! refresh batch of 100 tickers is usually a handful of requests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use screenwatch_common::UpstreamConfig;

use super::provider::{PriceDataProvider, ProviderError};
use super::PriceBar;

// ============================================================================
// Constants
// ============================================================================

const BARS_ENDPOINT: &str = "/v2/stocks/bars";

/// Maximum bars per page accepted by the API
const PAGE_LIMIT: u32 = 10_000;

/// Guard against a server that keeps returning page tokens
const MAX_PAGES: usize = 100;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct BarsResponse {
    #[serde(default)]
    bars: Option<HashMap<String, Vec<AlpacaBar>>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
}

impl From<AlpacaBar> for PriceBar {
    fn from(bar: AlpacaBar) -> Self {
        Self {
            date: bar.t.date_naive(),
            open: bar.o,
            high: bar.h,
            low: bar.l,
            close: bar.c,
            volume: bar.v.max(0.0) as u64,
        }
    }
}

// ============================================================================
// Alpaca Client
// ============================================================================

/// Daily bar client for the Alpaca market data API.
pub struct AlpacaBarsClient {
    base_url: String,
    api_key: String,
    secret_key: String,
    client: reqwest::Client,
}

impl AlpacaBarsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            client,
        }
    }

    /// Create from config; `None` when credentials are missing.
    pub fn from_config(config: &UpstreamConfig) -> Option<Self> {
        let api_key = config.alpaca_api_key.clone()?;
        let secret_key = config.alpaca_secret_key.clone()?;
        Some(Self::new(
            &config.alpaca_data_url,
            api_key,
            secret_key,
            Duration::from_secs(config.timeout_secs),
        ))
    }

    async fn fetch_page(
        &self,
        symbols: &str,
        start: NaiveDate,
        end: NaiveDate,
        page_token: Option<&str>,
    ) -> Result<BarsResponse, ProviderError> {
        let url = format!("{}{}", self.base_url, BARS_ENDPOINT);
        let mut query = vec![
            ("symbols", symbols.to_string()),
            ("timeframe", "1Day".to_string()),
            ("start", start.format("%Y-%m-%d").to_string()),
            ("end", end.format("%Y-%m-%d").to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("page_token", token.to_string()));
        }

        debug!(url = %url, page_token = ?page_token, "Fetching bars from Alpaca");

        let response = self
            .client
            .get(&url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: None,
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Unavailable(format!(
                "Alpaca rejected credentials (HTTP {})",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse bars: {}", e)))
    }
}

#[async_trait]
impl PriceDataProvider for AlpacaBarsClient {
    fn name(&self) -> &'static str {
        "alpaca"
    }

    async fn batch_get_history(
        &self,
        tickers: &[String],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Vec<PriceBar>>, ProviderError> {
        if tickers.is_empty() {
            return Ok(HashMap::new());
        }

        info!(symbols = tickers.len(), %start, %end, "Fetching Alpaca bars");

        let symbols = tickers.join(",");
        let mut result: HashMap<String, Vec<PriceBar>> = HashMap::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let page = self
                .fetch_page(&symbols, start, end, page_token.as_deref())
                .await?;

            for (symbol, bars) in page.bars.unwrap_or_default() {
                result
                    .entry(symbol)
                    .or_default()
                    .extend(bars.into_iter().map(PriceBar::from));
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => {
                    page_token = None;
                    break;
                }
            }
        }

        if page_token.is_some() {
            warn!(max_pages = MAX_PAGES, "Alpaca pagination truncated");
        }

        for bars in result.values_mut() {
            bars.sort_by_key(|b| b.date);
        }
        result.retain(|_, bars| !bars.is_empty());

        info!(
            received = result.len(),
            requested = tickers.len(),
            "Got Alpaca bars"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_conversion_uses_utc_date() {
        let bar: AlpacaBar = serde_json::from_str(
            r#"{"t": "2026-10-16T04:00:00Z", "o": 10.0, "h": 11.0, "l": 9.5, "c": 10.5, "v": 12345, "n": 10, "vw": 10.2}"#,
        )
        .unwrap();
        let bar = PriceBar::from(bar);
        assert_eq!(bar.date, NaiveDate::from_ymd_opt(2026, 10, 16).unwrap());
        assert_eq!(bar.volume, 12345);
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let mut config = UpstreamConfig::default();
        assert!(AlpacaBarsClient::from_config(&config).is_none());

        config.alpaca_api_key = Some("key".into());
        config.alpaca_secret_key = Some("secret".into());
        assert!(AlpacaBarsClient::from_config(&config).is_some());
    }
}
