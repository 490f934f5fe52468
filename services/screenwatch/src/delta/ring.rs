//! Bounded snapshot history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One observation of a ranked watchlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub content_hash: String,
    pub count: usize,
    /// Tickers in rank order
    pub tickers: Vec<String>,
    pub label: String,
}

/// FIFO ring of recent snapshots; the oldest is evicted past capacity.
#[derive(Debug, Clone)]
pub struct SnapshotRing {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl SnapshotRing {
    /// Create a ring holding at most `capacity` snapshots (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Append a snapshot, returning the evicted one if the ring was full.
    pub fn push(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        let evicted = if self.snapshots.len() >= self.capacity {
            self.snapshots.pop_front()
        } else {
            None
        };
        self.snapshots.push_back(snapshot);
        evicted
    }

    /// Most recent snapshot with the given hash.
    pub fn find_latest(&self, content_hash: &str) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|s| s.content_hash == content_hash)
    }

    /// Up to `limit` snapshots, most recent first.
    pub fn recent(&self, limit: usize) -> Vec<Snapshot> {
        self.snapshots.iter().rev().take(limit).cloned().collect()
    }

    /// All snapshots, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }
}
