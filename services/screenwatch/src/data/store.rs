//! In-process screening store.
//!
//! Keeps bars and screening rows in memory. Used by the service binary and by
//! tests; a database-backed store only has to implement [`ScreeningStore`].

use async_trait::async_trait;
use chrono::NaiveDate;
use screenwatch_common::{Error, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use super::provider::{ScreeningQuery, ScreeningStore};
use super::{Algorithm, PriceBar, ScreeningRow};

/// In-memory implementation of [`ScreeningStore`].
#[derive(Default)]
pub struct MemoryStore {
    /// ticker -> date -> bar
    bars: RwLock<HashMap<String, BTreeMap<NaiveDate, PriceBar>>>,
    /// (algorithm, date, ticker) -> row
    screening: RwLock<BTreeMap<(Algorithm, NaiveDate, String), ScreeningRow>>,
    active: RwLock<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose active universe is `tickers`.
    pub fn with_tickers<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        store.set_active(tickers);
        store
    }

    /// Add tickers to the active universe.
    pub fn set_active<I, S>(&self, tickers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut active) = self.active.write() {
            active.extend(tickers.into_iter().map(Into::into));
        }
    }

    /// Number of stored bars for a ticker.
    pub fn bar_count(&self, ticker: &str) -> usize {
        self.bars
            .read()
            .ok()
            .and_then(|bars| bars.get(ticker).map(BTreeMap::len))
            .unwrap_or(0)
    }
}

fn poisoned(what: &str) -> Error {
    Error::Storage(format!("{} lock poisoned", what))
}

#[async_trait]
impl ScreeningStore for MemoryStore {
    async fn insert_price_bars(&self, ticker: &str, bars: &[PriceBar]) -> Result<usize> {
        let mut store = self.bars.write().map_err(|_| poisoned("bars"))?;
        let series = store.entry(ticker.to_string()).or_default();

        let mut inserted = 0;
        for bar in bars {
            if series.insert(bar.date, bar.clone()).is_none() {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_screening_rows(
        &self,
        algorithm: Algorithm,
        rows: &[ScreeningRow],
        date: NaiveDate,
    ) -> Result<usize> {
        let mut store = self.screening.write().map_err(|_| poisoned("screening"))?;

        let mut written = BTreeSet::new();
        for row in rows {
            if row.algorithm() != algorithm {
                return Err(Error::Storage(format!(
                    "row for {} tagged {} written to {}",
                    row.ticker,
                    row.algorithm(),
                    algorithm
                )));
            }
            let mut row = row.clone();
            row.date_analyzed = Some(date);
            written.insert(row.ticker.clone());
            store.insert((algorithm, date, row.ticker.clone()), row);
        }
        Ok(written.len())
    }

    async fn active_tickers(&self) -> Result<Vec<String>> {
        let active = self.active.read().map_err(|_| poisoned("active"))?;
        Ok(active.iter().cloned().collect())
    }

    async fn screening_rows(
        &self,
        algorithm: Algorithm,
        query: ScreeningQuery,
    ) -> Result<Vec<ScreeningRow>> {
        let store = self.screening.read().map_err(|_| poisoned("screening"))?;

        let mut rows: Vec<ScreeningRow> = store
            .iter()
            .filter(|((algo, date, _), _)| {
                *algo == algorithm && query.since.map_or(true, |since| *date >= since)
            })
            .map(|(_, row)| row.clone())
            .collect();

        rows.sort_by(|a, b| b.primary_score().total_cmp(&a.primary_score()));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}
