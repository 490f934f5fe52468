//! Batch analysis fan-out.
//!
//! One task per ticker, all admitted through a single shared semaphore so no
//! more than `max_concurrency` tickers are analysed at once across every
//! concurrent batch call.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use screenwatch_common::BatchConfig;

use crate::data::{is_unchanged, AnalysisProvider, IntradayBar, ProviderError, TechnicalRequest};

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    #[serde(default)]
    pub include_news: bool,
    pub days: u32,
    /// Synthetic "today" bar per ticker
    #[serde(default)]
    pub intraday_bars: HashMap<String, IntradayBar>,
    /// Last-seen dataset fingerprint per ticker
    #[serde(default)]
    pub fingerprints: HashMap<String, String>,
}

impl BatchOptions {
    pub fn new(days: u32) -> Self {
        Self {
            days,
            ..Default::default()
        }
    }
}

/// Result of analysing one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickerOutcome {
    /// Merged technical + extras payload
    Success(Value),
    /// The ticker's task failed outright
    Failure(String),
}

impl TickerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Outcomes of one batch call, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResults {
    pub outcomes: Vec<(String, TickerOutcome)>,
    pub timestamp: DateTime<Utc>,
}

impl BatchResults {
    pub fn successes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.outcomes.iter().filter_map(|(ticker, outcome)| match outcome {
            TickerOutcome::Success(value) => Some((ticker.as_str(), value)),
            TickerOutcome::Failure(_) => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes.iter().filter_map(|(ticker, outcome)| match outcome {
            TickerOutcome::Failure(reason) => Some((ticker.as_str(), reason.as_str())),
            TickerOutcome::Success(_) => None,
        })
    }
}

/// Settings copied into each per-ticker task.
#[derive(Debug, Clone)]
struct ExtrasSettings {
    include_news: bool,
    days: u32,
    news_timeframe: String,
    news_limit: u32,
}

/// Runs technical analysis and extras for many tickers with bounded
/// concurrency.
pub struct BatchAnalyzer {
    provider: Arc<dyn AnalysisProvider>,
    semaphore: Arc<Semaphore>,
    config: BatchConfig,
}

impl BatchAnalyzer {
    pub fn new(provider: Arc<dyn AnalysisProvider>, config: BatchConfig) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Analyse `tickers`; one failing ticker never affects the others.
    pub async fn analyze(&self, tickers: &[String], options: &BatchOptions) -> BatchResults {
        let settings = ExtrasSettings {
            include_news: options.include_news,
            days: options.days,
            news_timeframe: self.config.news_timeframe.clone(),
            news_limit: self.config.news_limit,
        };

        let mut handles = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&self.semaphore);
            let settings = settings.clone();
            let request = TechnicalRequest {
                ticker: ticker.clone(),
                days: options.days,
                today_bar: options.intraday_bars.get(ticker).cloned(),
                known_fingerprint: options.fingerprints.get(ticker).cloned(),
            };

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| format!("Batch semaphore closed: {}", e))?;
                analyze_ticker(provider.as_ref(), request, &settings)
                    .await
                    .map_err(|e| e.to_string())
            });
            handles.push(handle);
        }

        let joined = join_all(handles).await;
        let mut outcomes = Vec::with_capacity(joined.len());
        for (ticker, joined) in tickers.iter().cloned().zip(joined) {
            let outcome = match joined {
                Ok(Ok(value)) => TickerOutcome::Success(value),
                Ok(Err(reason)) => {
                    error!(ticker = %ticker, error = %reason, "Batch analysis failed");
                    TickerOutcome::Failure(reason)
                }
                Err(e) => {
                    error!(ticker = %ticker, error = %e, "Batch analysis task panicked");
                    TickerOutcome::Failure(format!("Task failed: {}", e))
                }
            };
            outcomes.push((ticker, outcome));
        }

        debug!(
            tickers = tickers.len(),
            succeeded = outcomes.iter().filter(|(_, o)| o.is_success()).count(),
            "Batch analysis complete"
        );

        BatchResults {
            outcomes,
            timestamp: Utc::now(),
        }
    }
}

/// Wrap an extras failure as an inline error payload.
fn inline_error(result: Result<Value, ProviderError>) -> Value {
    result.unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

async fn fetch_extras(
    provider: &dyn AnalysisProvider,
    ticker: &str,
    settings: &ExtrasSettings,
) -> Map<String, Value> {
    let support = provider.support_resistance(ticker, settings.days);
    let mut extras = Map::new();

    if settings.include_news {
        let news = provider.news_sentiment(ticker, &settings.news_timeframe, settings.news_limit);
        let (support, news) = tokio::join!(support, news);
        extras.insert("support_resistance".into(), inline_error(support));
        extras.insert("news".into(), inline_error(news));
    } else {
        extras.insert("support_resistance".into(), inline_error(support.await));
    }

    for (field, value) in &extras {
        if value.get("error").is_some() {
            warn!(ticker = %ticker, field = %field, "Extras fetch failed");
        }
    }
    extras
}

/// Analyse one ticker.
///
/// A technical failure fails the ticker. Without a fingerprint, technical
/// analysis and extras run concurrently. With a fingerprint, technical runs
/// first and both a failure and an "unchanged" answer skip extras.
async fn analyze_ticker(
    provider: &dyn AnalysisProvider,
    request: TechnicalRequest,
    settings: &ExtrasSettings,
) -> Result<Value, ProviderError> {
    let ticker = request.ticker.clone();

    if request.known_fingerprint.is_none() {
        let (technical, extras) = tokio::join!(
            provider.technical_analysis(&request),
            fetch_extras(provider, &ticker, settings)
        );
        let mut result = extras;
        result.insert("technical".into(), technical?);
        return Ok(Value::Object(result));
    }

    let technical = provider.technical_analysis(&request).await?;
    if is_unchanged(&technical) {
        debug!(ticker = %ticker, "Dataset unchanged, skipping extras");
        return Ok(json!({ "technical": technical, "changed": false }));
    }

    let mut result = fetch_extras(provider, &ticker, settings).await;
    result.insert("technical".into(), technical);
    Ok(Value::Object(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Echoes the ticker; fails technical for "BAD", news for "NONEWS".
    struct EchoProvider;

    #[async_trait]
    impl AnalysisProvider for EchoProvider {
        async fn technical_analysis(&self, request: &TechnicalRequest) -> Result<Value, ProviderError> {
            if request.ticker == "BAD" {
                return Err(ProviderError::DataNotAvailable("BAD".into()));
            }
            if request.known_fingerprint.as_deref() == Some("same") {
                return Ok(json!({ "status": "unchanged", "fingerprint": "same" }));
            }
            Ok(json!({ "ticker": request.ticker, "days": request.days }))
        }

        async fn support_resistance(&self, ticker: &str, _days: u32) -> Result<Value, ProviderError> {
            Ok(json!({ "ticker": ticker, "levels": [1.0, 2.0] }))
        }

        async fn news_sentiment(
            &self,
            ticker: &str,
            _timeframe: &str,
            _limit: u32,
        ) -> Result<Value, ProviderError> {
            if ticker == "NONEWS" {
                return Err(ProviderError::Unavailable("news".into()));
            }
            Ok(json!({ "sentiment": "bullish" }))
        }
    }

    fn analyzer() -> BatchAnalyzer {
        BatchAnalyzer::new(Arc::new(EchoProvider), BatchConfig::default())
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_merges_technical_and_extras() {
        let options = BatchOptions {
            include_news: true,
            ..BatchOptions::new(30)
        };
        let results = analyzer().analyze(&tickers(&["AAPL"]), &options).await;

        let (ticker, outcome) = &results.outcomes[0];
        assert_eq!(ticker, "AAPL");
        let TickerOutcome::Success(value) = outcome else {
            panic!("expected success");
        };
        assert_eq!(value["technical"]["days"], 30);
        assert_eq!(value["support_resistance"]["ticker"], "AAPL");
        assert_eq!(value["news"]["sentiment"], "bullish");
        assert!(value.get("changed").is_none());
    }

    #[tokio::test]
    async fn test_news_omitted_unless_requested() {
        let results = analyzer().analyze(&tickers(&["AAPL"]), &BatchOptions::new(30)).await;
        let (_, value) = results.successes().next().unwrap();
        assert!(value.get("news").is_none());
        assert!(value.get("support_resistance").is_some());
    }

    #[tokio::test]
    async fn test_extras_failure_is_inlined() {
        let options = BatchOptions {
            include_news: true,
            ..BatchOptions::new(30)
        };
        let results = analyzer().analyze(&tickers(&["NONEWS"]), &options).await;
        let (_, value) = results.successes().next().unwrap();
        assert!(value["news"]["error"].as_str().unwrap().contains("news"));
        assert!(value["technical"].get("error").is_none());
    }

    #[tokio::test]
    async fn test_technical_failure_without_fingerprint_fails_ticker() {
        let results = analyzer()
            .analyze(&tickers(&["AAPL", "BAD"]), &BatchOptions::new(30))
            .await;

        assert_eq!(results.successes().count(), 1);
        let failures: Vec<_> = results.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "BAD");
    }

    #[tokio::test]
    async fn test_technical_failure_with_fingerprint_fails_ticker() {
        let mut options = BatchOptions::new(30);
        options.fingerprints.insert("BAD".into(), "old".into());
        let results = analyzer().analyze(&tickers(&["BAD"]), &options).await;

        assert_eq!(results.successes().count(), 0);
        let (ticker, reason) = results.failures().next().unwrap();
        assert_eq!(ticker, "BAD");
        assert!(reason.contains("BAD"));
    }

    #[tokio::test]
    async fn test_unchanged_fingerprint_short_circuits() {
        let mut options = BatchOptions::new(30);
        options.fingerprints.insert("AAPL".into(), "same".into());
        let results = analyzer().analyze(&tickers(&["AAPL"]), &options).await;

        let (_, value) = results.successes().next().unwrap();
        assert_eq!(value["changed"], false);
        assert_eq!(value["technical"]["status"], "unchanged");
        assert!(value.get("support_resistance").is_none());
    }

    #[test]
    fn test_outcome_serialization_is_tagged() {
        let failure = serde_json::to_value(TickerOutcome::Failure("boom".into())).unwrap();
        assert_eq!(failure, json!({ "failure": "boom" }));
        let success = serde_json::to_value(TickerOutcome::Success(json!({ "a": 1 }))).unwrap();
        assert_eq!(success, json!({ "success": { "a": 1 } }));
    }
}
