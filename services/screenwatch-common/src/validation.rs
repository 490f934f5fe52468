//! Input validation for caller-facing operations.
//!
//! Everything here runs before any state is touched; a failure is reported
//! as [`Error::InvalidInput`].

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn ticker_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9.\-]{1,10}$").expect("ticker pattern is valid"))
}

/// Normalize and validate a ticker symbol.
///
/// Allows 1-10 characters: letters, digits, hyphens and dots (`BRK-B`, `BF.B`).
pub fn normalize_ticker(raw: &str) -> Result<String> {
    let normalized = raw.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(Error::InvalidInput("Ticker symbol cannot be empty".into()));
    }
    if !ticker_pattern().is_match(&normalized) {
        return Err(Error::InvalidInput(format!(
            "Invalid ticker symbol '{}': use 1-10 characters (letters, digits, hyphens, and dots only)",
            raw
        )));
    }
    Ok(normalized)
}

/// Normalize a ticker list, dropping duplicates while keeping first-seen order.
///
/// `max` bounds the list length after de-duplication.
pub fn normalize_tickers(raw: &[String], max: usize) -> Result<Vec<String>> {
    if raw.is_empty() {
        return Err(Error::InvalidInput("At least one ticker is required".into()));
    }

    let mut seen = HashSet::new();
    let mut tickers = Vec::with_capacity(raw.len());
    for ticker in raw {
        let normalized = normalize_ticker(ticker)?;
        if seen.insert(normalized.clone()) {
            tickers.push(normalized);
        }
    }

    if tickers.len() > max {
        return Err(Error::InvalidInput(format!(
            "Too many tickers: {} (maximum {})",
            tickers.len(),
            max
        )));
    }
    Ok(tickers)
}

/// Check that `value` lies in `min..=max`.
pub fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < min || value > max {
        return Err(Error::InvalidInput(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(value)
}
