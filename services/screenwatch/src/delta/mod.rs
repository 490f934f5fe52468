//! Change detection for the ranked watchlist.
//!
//! A short content hash lets callers ask "did anything change?" without
//! re-fetching the watchlist; a bounded snapshot history turns a stale hash
//! into a list of entries and exits.

mod hash;
mod ring;
mod tracker;

pub use hash::{canonical_json, content_hash, watchlist_hash, HASH_LEN};
pub use ring::{Snapshot, SnapshotRing};
pub use tracker::{DeltaResult, DeltaTracker, Staleness, CACHE_INFO_LABEL, DELTA_LABEL};
