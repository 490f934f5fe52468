//! Content hash of a ranked watchlist.
//!
//! The hash covers the multiset of `(ticker, score)` pairs only, so two
//! watchlists with the same members and scores hash equal regardless of order.
//! The canonical form is the JSON list `[{"s": <score>, "t": "<ticker>"}, ...]`
//! with `", "` / `": "` separators, entries sorted by ticker then score, and
//! scores rounded to two decimals.

use sha2::{Digest, Sha256};

use crate::screener::Candidate;

/// Hex characters kept from the SHA-256 digest.
pub const HASH_LEN: usize = 16;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Float text matching the shortest round-trip form, always with a decimal point.
fn format_score(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Canonical JSON text hashed by [`content_hash`].
pub fn canonical_json<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let mut pairs: Vec<(&str, f64)> = entries
        .into_iter()
        .map(|(ticker, score)| (ticker, round2(score)))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0).then(a.1.total_cmp(&b.1)));

    let items: Vec<String> = pairs
        .iter()
        .map(|(ticker, score)| {
            let ticker = serde_json::to_string(ticker).unwrap_or_else(|_| format!("\"{}\"", ticker));
            format!("{{\"s\": {}, \"t\": {}}}", format_score(*score), ticker)
        })
        .collect();

    format!("[{}]", items.join(", "))
}

/// Hash a list of `(ticker, score)` pairs.
pub fn content_hash<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, f64)>,
{
    let digest = Sha256::digest(canonical_json(entries).as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_LEN);
    hex
}

/// Hash a ranked watchlist by ticker and composite score.
pub fn watchlist_hash(watchlist: &[Candidate]) -> String {
    content_hash(
        watchlist
            .iter()
            .map(|c| (c.ticker.as_str(), c.composite_score)),
    )
}
