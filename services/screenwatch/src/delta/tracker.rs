//! Snapshot and delta tracking.
//!
//! Callers poll with the hash they last saw. An equal hash means nothing
//! changed; otherwise the tracker looks the old hash up in its snapshot ring
//! and reports which tickers entered and left the watchlist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::hash::watchlist_hash;
use super::ring::{Snapshot, SnapshotRing};
use crate::screener::clock::Clock;
use crate::screener::Candidate;

/// Snapshot label used by delta checks.
pub const DELTA_LABEL: &str = "delta";

/// Snapshot label used by change-hash checks.
pub const CACHE_INFO_LABEL: &str = "cache-info";

/// Age below which data is fresh (seconds).
pub const FRESH_SECS: f64 = 1800.0;

/// Age below which data is stale rather than expired (seconds).
pub const STALE_SECS: f64 = 7200.0;

// ============================================================================
// Staleness
// ============================================================================

/// Coarse age classification of a result timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Staleness {
    Fresh,
    Stale,
    Expired,
    Unknown,
}

impl Staleness {
    /// Classify an age in seconds.
    pub fn from_age_secs(age: f64) -> Self {
        if age < FRESH_SECS {
            Self::Fresh
        } else if age < STALE_SECS {
            Self::Stale
        } else {
            Self::Expired
        }
    }

    /// Classify an RFC 3339 timestamp relative to `now`; unparsable input is
    /// [`Staleness::Unknown`].
    pub fn classify(timestamp: &str, now: DateTime<Utc>) -> Self {
        match DateTime::parse_from_rfc3339(timestamp) {
            Ok(ts) => {
                let age = now.signed_duration_since(ts.with_timezone(&Utc));
                Self::from_age_secs(age.num_milliseconds() as f64 / 1000.0)
            }
            Err(_) => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Staleness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Stale => write!(f, "stale"),
            Self::Expired => write!(f, "expired"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Delta Result
// ============================================================================

/// Difference between the current watchlist and an earlier observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaResult {
    pub changed: bool,
    pub content_hash: String,
    pub previous_hash: Option<String>,
    /// Tickers present now but not before, sorted
    pub entries: Vec<String>,
    /// Tickers present before but not now, sorted
    pub exits: Vec<String>,
    pub unchanged_count: usize,
    pub current_count: usize,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Delta Tracker
// ============================================================================

/// Owns the snapshot ring and computes deltas against it.
pub struct DeltaTracker {
    ring: Mutex<SnapshotRing>,
    clock: Arc<dyn Clock>,
}

impl DeltaTracker {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ring: Mutex::new(SnapshotRing::new(capacity)),
            clock,
        }
    }

    /// Record an observation of `watchlist`.
    pub fn snapshot(&self, watchlist: &[Candidate], label: &str) -> Snapshot {
        let snapshot = Snapshot {
            timestamp: self.clock.now(),
            content_hash: watchlist_hash(watchlist),
            count: watchlist.len(),
            tickers: watchlist.iter().map(|c| c.ticker.clone()).collect(),
            label: label.to_string(),
        };

        if let Ok(mut ring) = self.ring.lock() {
            if let Some(evicted) = ring.push(snapshot.clone()) {
                debug!(evicted_hash = %evicted.content_hash, "Snapshot evicted");
            }
        }
        snapshot
    }

    /// Compare `watchlist` with the state identified by `since_hash`.
    ///
    /// A hash missing from the ring is treated as an empty previous state, so
    /// every current ticker is reported as an entry. The current watchlist is
    /// snapshotted after the lookup.
    pub fn delta(&self, watchlist: &[Candidate], since_hash: &str) -> DeltaResult {
        let current_hash = watchlist_hash(watchlist);
        let since_hash = since_hash.trim();

        if !since_hash.is_empty() && since_hash == current_hash {
            let snapshot = self.snapshot(watchlist, DELTA_LABEL);
            return DeltaResult {
                changed: false,
                content_hash: current_hash,
                previous_hash: Some(since_hash.to_string()),
                entries: Vec::new(),
                exits: Vec::new(),
                unchanged_count: watchlist.len(),
                current_count: watchlist.len(),
                timestamp: snapshot.timestamp,
            };
        }

        let previous: BTreeSet<String> = self
            .ring
            .lock()
            .ok()
            .and_then(|ring| {
                ring.find_latest(since_hash)
                    .map(|s| s.tickers.iter().cloned().collect())
            })
            .unwrap_or_default();
        let current: BTreeSet<String> = watchlist.iter().map(|c| c.ticker.clone()).collect();

        let snapshot = self.snapshot(watchlist, DELTA_LABEL);

        DeltaResult {
            changed: true,
            content_hash: current_hash,
            previous_hash: (!since_hash.is_empty()).then(|| since_hash.to_string()),
            entries: current.difference(&previous).cloned().collect(),
            exits: previous.difference(&current).cloned().collect(),
            unchanged_count: current.intersection(&previous).count(),
            current_count: watchlist.len(),
            timestamp: snapshot.timestamp,
        }
    }

    /// Up to `limit` snapshots, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<Snapshot> {
        self.ring
            .lock()
            .map(|ring| ring.recent(limit))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().map(|ring| ring.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
