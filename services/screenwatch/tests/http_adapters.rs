//! HTTP adapter tests against a mock server.

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use screenwatch::data::{
    Algorithm, AlgorithmMetrics, AlpacaBarsClient, AnalysisProvider, PriceDataProvider,
    ProviderError, ScreeningSource, TechnicalRequest, UpstreamClient,
};

fn upstream(server: &MockServer) -> UpstreamClient {
    UpstreamClient::new(server.uri(), Duration::from_secs(5))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

// ============================================================================
// Upstream Screening
// ============================================================================

#[tokio::test]
async fn test_screening_source_parses_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/screening/maverick"))
        .and(query_param("symbols", "AAPL,MSFT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stocks": [
                {
                    "stock_symbol": "aapl",
                    "momentum_score": 92.5,
                    "combined_score": 7,
                    "close_price": 181.2,
                    "date_analyzed": "2026-10-16"
                },
                { "momentum_score": 50.0 }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = upstream(&server).screening_source(Algorithm::Bullish);
    let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
    let rows = source.run_screening(Some(&symbols)).await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].ticker, "AAPL");
    assert_eq!(rows[0].date_analyzed, Some(date(2026, 10, 16)));
    assert_eq!(rows[0].metrics, AlgorithmMetrics::Bullish { combined_score: 7.0 });
}

#[tokio::test]
async fn test_bear_source_accepts_score_alias() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/screening/bear"))
        .and(query_param_is_missing("symbols"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stocks": [{ "ticker": "XOM", "momentum_score": 12.0, "score": 88.0 }]
        })))
        .mount(&server)
        .await;

    let rows = upstream(&server)
        .screening_source(Algorithm::Bearish)
        .run_screening(None)
        .await
        .unwrap();

    assert_eq!(rows[0].metrics, AlgorithmMetrics::Bearish { bear_score: 88.0 });
}

#[tokio::test]
async fn test_status_codes_map_to_provider_errors() {
    let server = MockServer::start().await;
    Mock::given(path("/v1/screening/breakouts"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(path("/v1/technical/support-resistance"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
        .mount(&server)
        .await;
    Mock::given(path("/v1/news/sentiment"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no news"))
        .mount(&server)
        .await;

    let client = upstream(&server);

    let err = client
        .screening_source(Algorithm::Breakout)
        .run_screening(None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
    assert!(err.is_recoverable());

    let err = client.support_resistance("AAPL", 30).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::RateLimited {
            retry_after_secs: Some(12)
        }
    ));

    let err = client.news_sentiment("AAPL", "7d", 10).await.unwrap_err();
    assert!(matches!(err, ProviderError::DataNotAvailable(ref body) if body == "no news"));
}

// ============================================================================
// Upstream Analysis
// ============================================================================

#[tokio::test]
async fn test_technical_analysis_posts_fingerprint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/technical/full-analysis"))
        .and(body_partial_json(json!({
            "ticker": "NVDA",
            "days": 365,
            "known_fingerprint": "abc123"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "unchanged" })))
        .expect(1)
        .mount(&server)
        .await;

    let request = TechnicalRequest {
        ticker: "NVDA".into(),
        days: 365,
        today_bar: None,
        known_fingerprint: Some("abc123".into()),
    };
    let payload = upstream(&server).technical_analysis(&request).await.unwrap();
    assert!(screenwatch::data::is_unchanged(&payload));
}

#[tokio::test]
async fn test_extras_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/news/sentiment"))
        .and(query_param("ticker", "AAPL"))
        .and(query_param("timeframe", "7d"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sentiment": "bullish" })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = upstream(&server).news_sentiment("AAPL", "7d", 10).await.unwrap();
    assert_eq!(payload["sentiment"], "bullish");
}

// ============================================================================
// Alpaca Bars
// ============================================================================

#[tokio::test]
async fn test_alpaca_bars_paginate_and_sort() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/stocks/bars"))
        .and(header("APCA-API-KEY-ID", "key"))
        .and(header("APCA-API-SECRET-KEY", "secret"))
        .and(query_param("symbols", "AAPL,MSFT"))
        .and(query_param("timeframe", "1Day"))
        .and(query_param("start", "2026-10-09"))
        .and(query_param("end", "2026-10-16"))
        .and(query_param_is_missing("page_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bars": {
                "AAPL": [
                    { "t": "2026-10-15T04:00:00Z", "o": 2.0, "h": 2.0, "l": 2.0, "c": 2.0, "v": 200.0 }
                ],
                "MSFT": []
            },
            "next_page_token": "page2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/stocks/bars"))
        .and(query_param("page_token", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bars": {
                "AAPL": [
                    { "t": "2026-10-14T04:00:00Z", "o": 1.0, "h": 1.0, "l": 1.0, "c": 1.0, "v": 100.0 }
                ]
            },
            "next_page_token": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = AlpacaBarsClient::new(server.uri(), "key", "secret", Duration::from_secs(5));
    let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];
    let bars = client
        .batch_get_history(&tickers, date(2026, 10, 9), date(2026, 10, 16))
        .await
        .unwrap();

    assert!(!bars.contains_key("MSFT"));
    let aapl = &bars["AAPL"];
    assert_eq!(aapl.len(), 2);
    assert_eq!(aapl[0].date, date(2026, 10, 14));
    assert_eq!(aapl[1].date, date(2026, 10, 15));
    assert_eq!(aapl[1].volume, 200);
}

#[tokio::test]
async fn test_alpaca_rejected_credentials() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/stocks/bars"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let client = AlpacaBarsClient::new(server.uri(), "bad", "bad", Duration::from_secs(5));
    let err = client
        .batch_get_history(&["AAPL".to_string()], date(2026, 10, 9), date(2026, 10, 16))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unavailable(_)));
}

#[tokio::test]
async fn test_alpaca_empty_request_makes_no_call() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/stocks/bars"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let client = AlpacaBarsClient::new(server.uri(), "key", "secret", Duration::from_secs(5));
    let bars = client
        .batch_get_history(&[], date(2026, 10, 9), date(2026, 10, 16))
        .await
        .unwrap();
    assert!(bars.is_empty());
}
