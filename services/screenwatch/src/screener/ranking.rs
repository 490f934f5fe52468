//! Multi-algorithm merge and ranking.
//!
//! Rows from every screening algorithm are scored onto one 0-100 scale,
//! de-duplicated by ticker (keeping the best score), sorted and ranked.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::data::{Algorithm, AlgorithmMetrics, ScreeningRow};

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ============================================================================
// Types
// ============================================================================

/// Display metrics taken from the row that produced a candidate's best score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayMetrics {
    Bullish { combined_score: i64 },
    Breakout { breakout_strength: f64 },
    Bearish { bear_score: i64 },
}

impl From<&AlgorithmMetrics> for DisplayMetrics {
    fn from(metrics: &AlgorithmMetrics) -> Self {
        match *metrics {
            AlgorithmMetrics::Bullish { combined_score } => Self::Bullish {
                combined_score: combined_score.trunc() as i64,
            },
            AlgorithmMetrics::Breakout {
                breakout_strength, ..
            } => Self::Breakout {
                breakout_strength: round1(breakout_strength),
            },
            AlgorithmMetrics::Bearish { bear_score } => Self::Bearish {
                bear_score: bear_score.trunc() as i64,
            },
        }
    }
}

/// One ranked ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub ticker: String,
    /// 0-100, one decimal
    pub composite_score: f64,
    /// Contributing algorithms in order of first appearance
    pub algorithms: Vec<Algorithm>,
    pub momentum_score: f64,
    pub close_price: f64,
    #[serde(flatten)]
    pub metrics: DisplayMetrics,
    /// 1-based, assigned after sorting
    pub rank: usize,
}

impl Candidate {
    fn from_row(row: &ScreeningRow, score: f64) -> Self {
        Self {
            ticker: row.ticker.clone(),
            composite_score: score,
            algorithms: vec![row.algorithm()],
            momentum_score: round1(row.momentum_score),
            close_price: row.close_price,
            metrics: DisplayMetrics::from(&row.metrics),
            rank: 0,
        }
    }
}

/// Rows returned by one algorithm for a merge pass.
#[derive(Debug, Clone)]
pub struct SourceRows {
    pub algorithm: Algorithm,
    pub rows: Vec<ScreeningRow>,
}

impl SourceRows {
    pub fn new(algorithm: Algorithm, rows: Vec<ScreeningRow>) -> Self {
        Self { algorithm, rows }
    }

    /// Most recent analysis date among the rows.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.iter().filter_map(|r| r.date_analyzed).max()
    }
}

/// Per-source analysis dates for staleness judgments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFreshness {
    /// Latest analysis date per queried algorithm (absent when it had no dated rows)
    pub sources: BTreeMap<Algorithm, NaiveDate>,
    pub newest_date: Option<NaiveDate>,
    pub oldest_date: Option<NaiveDate>,
}

impl DataFreshness {
    pub fn date_for(&self, algorithm: Algorithm) -> Option<NaiveDate> {
        self.sources.get(&algorithm).copied()
    }
}

/// Output of one merge pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub watchlist: Vec<Candidate>,
    /// Rows seen across all sources before de-duplication
    pub total_candidates: usize,
    pub algorithms_queried: Vec<Algorithm>,
    pub data_freshness: DataFreshness,
}

// ============================================================================
// Merge
// ============================================================================

/// Merges screening rows into a ranked candidate list.
///
/// Insertion order is kept so that exact score ties resolve by the order the
/// sources (and rows within them) were merged.
#[derive(Debug, Default)]
pub struct CandidateMerger {
    candidates: Vec<Candidate>,
    index: HashMap<String, usize>,
    total_rows: usize,
    queried: Vec<Algorithm>,
    freshness: DataFreshness,
}

impl CandidateMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one row.
    pub fn push(&mut self, row: &ScreeningRow) {
        let score = round1(row.composite_score());
        let algorithm = row.algorithm();
        self.total_rows += 1;

        match self.index.get(&row.ticker) {
            None => {
                self.index.insert(row.ticker.clone(), self.candidates.len());
                self.candidates.push(Candidate::from_row(row, score));
            }
            Some(&i) => {
                let existing = &mut self.candidates[i];
                if score > existing.composite_score {
                    existing.composite_score = score;
                    existing.momentum_score = round1(row.momentum_score);
                    existing.close_price = row.close_price;
                    existing.metrics = DisplayMetrics::from(&row.metrics);
                }
                if !existing.algorithms.contains(&algorithm) {
                    existing.algorithms.push(algorithm);
                }
            }
        }
    }

    /// Merge all rows of one source and record it as queried.
    pub fn push_source(&mut self, source: &SourceRows) {
        if !self.queried.contains(&source.algorithm) {
            self.queried.push(source.algorithm);
        }
        if let Some(date) = source.latest_date() {
            self.freshness
                .sources
                .entry(source.algorithm)
                .and_modify(|d| *d = (*d).max(date))
                .or_insert(date);
        }
        for row in &source.rows {
            self.push(row);
        }
    }

    /// Sort descending by score, keep `max_results`, assign ranks.
    pub fn finish(self, max_results: usize) -> Ranking {
        let mut watchlist = self.candidates;
        watchlist.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        watchlist.truncate(max_results);
        for (i, candidate) in watchlist.iter_mut().enumerate() {
            candidate.rank = i + 1;
        }

        let mut freshness = self.freshness;
        freshness.newest_date = freshness.sources.values().max().copied();
        freshness.oldest_date = freshness.sources.values().min().copied();

        Ranking {
            watchlist,
            total_candidates: self.total_rows,
            algorithms_queried: self.queried,
            data_freshness: freshness,
        }
    }
}

/// Merge sources in the given order and rank the result.
pub fn merge_sources(sources: &[SourceRows], max_results: usize) -> Ranking {
    let mut merger = CandidateMerger::new();
    for source in sources {
        merger.push_source(source);
    }
    merger.finish(max_results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullish(ticker: &str, combined: f64, momentum: f64) -> ScreeningRow {
        ScreeningRow {
            ticker: ticker.into(),
            momentum_score: momentum,
            close_price: 100.0,
            date_analyzed: NaiveDate::from_ymd_opt(2026, 10, 16),
            metrics: AlgorithmMetrics::Bullish { combined_score: combined },
        }
    }

    fn breakout(ticker: &str, momentum: f64, accumulation: f64, strength: f64) -> ScreeningRow {
        ScreeningRow {
            ticker: ticker.into(),
            momentum_score: momentum,
            close_price: 50.0,
            date_analyzed: NaiveDate::from_ymd_opt(2026, 10, 15),
            metrics: AlgorithmMetrics::Breakout {
                accumulation_rating: accumulation,
                breakout_strength: strength,
            },
        }
    }

    fn bearish(ticker: &str, bear: f64, momentum: f64) -> ScreeningRow {
        ScreeningRow {
            ticker: ticker.into(),
            momentum_score: momentum,
            close_price: 20.0,
            date_analyzed: NaiveDate::from_ymd_opt(2026, 10, 14),
            metrics: AlgorithmMetrics::Bearish { bear_score: bear },
        }
    }

    #[test]
    fn test_empty_sources_yield_empty_ranking() {
        let ranking = merge_sources(&[], 10);
        assert!(ranking.watchlist.is_empty());
        assert_eq!(ranking.total_candidates, 0);
        assert_eq!(ranking.data_freshness.newest_date, None);

        let ranking = merge_sources(
            &[
                SourceRows::new(Algorithm::Bullish, vec![]),
                SourceRows::new(Algorithm::Breakout, vec![]),
                SourceRows::new(Algorithm::Bearish, vec![]),
            ],
            10,
        );
        assert!(ranking.watchlist.is_empty());
        assert_eq!(ranking.algorithms_queried.len(), 3);
    }

    #[test]
    fn test_duplicate_keeps_max_score_and_all_tags() {
        // Bullish: 6/8*100*0.6 + 90*0.4 = 81.0
        // Breakout: 95*0.5 + 90*0.3 + 4*20*0.2 = 90.5
        let ranking = merge_sources(
            &[
                SourceRows::new(Algorithm::Bullish, vec![bullish("NVDA", 6.0, 90.0)]),
                SourceRows::new(Algorithm::Breakout, vec![breakout("NVDA", 95.0, 90.0, 4.0)]),
            ],
            10,
        );

        assert_eq!(ranking.watchlist.len(), 1);
        let nvda = &ranking.watchlist[0];
        assert_eq!(nvda.composite_score, 90.5);
        assert_eq!(nvda.algorithms, vec![Algorithm::Bullish, Algorithm::Breakout]);
        assert_eq!(nvda.metrics, DisplayMetrics::Breakout { breakout_strength: 4.0 });
        assert_eq!(nvda.rank, 1);
        assert_eq!(ranking.total_candidates, 2);
    }

    #[test]
    fn test_lower_repeat_keeps_first_metrics() {
        let ranking = merge_sources(
            &[
                SourceRows::new(Algorithm::Bullish, vec![bullish("AAPL", 8.0, 100.0)]),
                SourceRows::new(Algorithm::Bearish, vec![bearish("AAPL", 10.0, 90.0)]),
            ],
            10,
        );
        let aapl = &ranking.watchlist[0];
        assert_eq!(aapl.composite_score, 100.0);
        assert_eq!(aapl.metrics, DisplayMetrics::Bullish { combined_score: 8 });
        assert_eq!(aapl.algorithms, vec![Algorithm::Bullish, Algorithm::Bearish]);
    }

    #[test]
    fn test_score_is_max_of_contributions() {
        let sources = vec![
            SourceRows::new(
                Algorithm::Bullish,
                vec![bullish("A", 5.0, 70.0), bullish("B", 7.0, 60.0), bullish("C", 3.0, 40.0)],
            ),
            SourceRows::new(
                Algorithm::Breakout,
                vec![breakout("B", 80.0, 70.0, 2.0), breakout("C", 99.0, 95.0, 5.0)],
            ),
            SourceRows::new(
                Algorithm::Bearish,
                vec![bearish("A", 90.0, 10.0), bearish("D", 50.0, 50.0)],
            ),
        ];
        let ranking = merge_sources(&sources, 10);

        for candidate in &ranking.watchlist {
            let best = sources
                .iter()
                .flat_map(|s| s.rows.iter())
                .filter(|r| r.ticker == candidate.ticker)
                .map(|r| round1(r.composite_score()))
                .fold(f64::MIN, f64::max);
            assert_eq!(candidate.composite_score, best, "ticker {}", candidate.ticker);
        }
    }

    #[test]
    fn test_sort_truncate_and_rank() {
        let ranking = merge_sources(
            &[SourceRows::new(
                Algorithm::Bullish,
                vec![
                    bullish("LOW", 2.0, 20.0),
                    bullish("HIGH", 8.0, 90.0),
                    bullish("MID", 5.0, 50.0),
                ],
            )],
            2,
        );
        let tickers: Vec<_> = ranking.watchlist.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["HIGH", "MID"]);
        assert_eq!(ranking.watchlist[1].rank, 2);
        assert_eq!(ranking.total_candidates, 3);
    }

    #[test]
    fn test_ties_resolve_by_merge_order() {
        // Both score 50.0 exactly
        let ranking = merge_sources(
            &[
                SourceRows::new(Algorithm::Bullish, vec![bullish("FIRST", 4.0, 50.0)]),
                SourceRows::new(Algorithm::Breakout, vec![breakout("SECOND", 50.0, 50.0, 2.5)]),
            ],
            10,
        );
        assert_eq!(ranking.watchlist[0].ticker, "FIRST");
        assert_eq!(ranking.watchlist[1].ticker, "SECOND");
    }

    #[test]
    fn test_freshness_per_source() {
        let ranking = merge_sources(
            &[
                SourceRows::new(Algorithm::Bullish, vec![bullish("A", 5.0, 50.0)]),
                SourceRows::new(Algorithm::Bearish, vec![bearish("B", 50.0, 50.0)]),
            ],
            10,
        );
        let freshness = &ranking.data_freshness;
        assert_eq!(freshness.date_for(Algorithm::Bullish), NaiveDate::from_ymd_opt(2026, 10, 16));
        assert_eq!(freshness.date_for(Algorithm::Breakout), None);
        assert_eq!(freshness.newest_date, NaiveDate::from_ymd_opt(2026, 10, 16));
        assert_eq!(freshness.oldest_date, NaiveDate::from_ymd_opt(2026, 10, 14));
    }

    #[test]
    fn test_candidate_serializes_flat_metrics() {
        let ranking = merge_sources(
            &[SourceRows::new(Algorithm::Bearish, vec![bearish("X", 72.9, 30.0)])],
            1,
        );
        let value = serde_json::to_value(&ranking.watchlist[0]).unwrap();
        assert_eq!(value["bear_score"], 72);
        assert_eq!(value["algorithms"][0], "maverick_bearish");
        assert_eq!(value["rank"], 1);
    }
}
