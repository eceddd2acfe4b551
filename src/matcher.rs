//! Pairwise matching over the candidate mask and result accumulation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{Algorithm, Combine, CompareMode, MatchConfig};
use crate::distance::DistanceKernel;
use crate::error::{MatchError, Result};
use crate::index::{AuthorIndex, NameVariant};
use crate::prefilter::{pair_count, CandidateMask};

/// Placeholder for padding and separator rows
pub const BLANK: &str = " ";

/// Receives result rows in order
pub trait ResultSink {
    fn push_row(&mut self, left: &str, right: &str, band: bool);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub left: String,
    pub right: String,
    pub band: bool,
}

impl ResultSink for Vec<ResultRow> {
    fn push_row(&mut self, left: &str, right: &str, band: bool) {
        self.push(ResultRow {
            left: left.to_string(),
            right: right.to_string(),
            band,
        });
    }
}

/// Two authors found to match, as positions in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub authors: usize,
    pub pairs: usize,
    /// Pairs left by the prefilter
    pub candidates: usize,
    /// Pairs handed to the distance kernel
    pub compared: usize,
    pub matched: usize,
}

/// Parallel result sequences plus the matched pairs behind them
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchOutput {
    pub left: Vec<String>,
    pub right: Vec<String>,
    pub banding: Vec<bool>,
    pub pairs: Vec<MatchedPair>,
    pub stats: MatchStats,
}

impl ResultSink for MatchOutput {
    fn push_row(&mut self, left: &str, right: &str, band: bool) {
        self.left.push(left.to_string());
        self.right.push(right.to_string());
        self.banding.push(band);
    }
}

impl MatchOutput {
    pub fn len(&self) -> usize {
        self.banding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banding.is_empty()
    }

    /// Replay the rows into another sink
    pub fn write_to<S: ResultSink + ?Sized>(&self, sink: &mut S) {
        for ((left, right), &band) in self.left.iter().zip(&self.right).zip(&self.banding) {
            sink.push_row(left, right, band);
        }
    }
}

/// Cooperative cancellation shared with the caller
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs one matching pass over an index
pub struct Matcher<'a> {
    index: &'a AuthorIndex,
    config: &'a MatchConfig,
    cancel: Option<CancelFlag>,
}

impl<'a> Matcher<'a> {
    pub fn new(index: &'a AuthorIndex, config: &'a MatchConfig) -> Self {
        Self {
            index,
            config,
            cancel: None,
        }
    }

    /// Check `flag` before each row of pairs. A cancelled run returns
    /// [`MatchError::Cancelled`] and no rows.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run(&self, today: NaiveDate) -> Result<MatchOutput> {
        let mut output = MatchOutput::default();
        let (pairs, stats) = self.run_into(today, &mut output)?;
        output.pairs = pairs;
        output.stats = stats;
        Ok(output)
    }

    /// Match and stream the rows into `sink`
    pub fn run_into<S: ResultSink + ?Sized>(
        &self,
        today: NaiveDate,
        sink: &mut S,
    ) -> Result<(Vec<MatchedPair>, MatchStats)> {
        self.config.validate()?;

        let n = self.index.len();
        let mask = CandidateMask::build(self.index, self.config, today);
        let kernel = self.kernel();

        let rows_total = n.saturating_sub(1);
        let rows_done = AtomicUsize::new(0);
        let compared = AtomicUsize::new(0);
        let rows: Vec<Vec<usize>> = (0..rows_total)
            .into_par_iter()
            .map(|i| {
                if self.is_cancelled() {
                    return Err(MatchError::Cancelled {
                        rows_done: rows_done.load(Ordering::Relaxed),
                        rows_total,
                    });
                }
                let flags = mask.row(i);
                let matched = self.match_row(i, flags, &kernel);
                compared.fetch_add(flags.iter().filter(|&&keep| keep).count(), Ordering::Relaxed);
                rows_done.fetch_add(1, Ordering::Relaxed);
                Ok(matched)
            })
            .collect::<Result<Vec<Vec<usize>>>>()
            .inspect_err(|e| tracing::warn!("{}", e))?;

        // Banding follows the cumulative match count, so it is assigned here
        let mut band = false;
        let mut pairs = Vec::new();
        for (i, matches) in rows.into_iter().enumerate() {
            for j in matches {
                self.emit(i, j, band, sink);
                pairs.push(MatchedPair { left: i, right: j });
                band = !band;
            }
        }

        let stats = MatchStats {
            authors: n,
            pairs: pair_count(n),
            candidates: mask.survivors(),
            compared: compared.into_inner(),
            matched: pairs.len(),
        };
        tracing::info!(
            authors = stats.authors,
            pairs = stats.pairs,
            candidates = stats.candidates,
            compared = stats.compared,
            matched = stats.matched,
            "author matching finished"
        );
        Ok((pairs, stats))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Resolve the distance variant.
    ///
    /// Averaging lets one field exceed the threshold as long as the other
    /// makes up for it, so early stopping may only give up past twice the
    /// threshold.
    fn kernel(&self) -> DistanceKernel {
        let threshold = self.config.threshold;
        let kernel = DistanceKernel::select(self.config.algorithm, threshold);
        match (self.config.compare_mode, self.config.combine, kernel) {
            (CompareMode::BothNames, Combine::Avg, DistanceKernel::LevenshteinEarlyStop { .. }) => {
                DistanceKernel::LevenshteinEarlyStop {
                    threshold: (2.0 * threshold).min(1.0),
                }
            }
            (
                CompareMode::BothNames,
                Combine::Avg,
                DistanceKernel::DamerauLevenshteinEarlyStop { .. },
            ) => DistanceKernel::DamerauLevenshteinEarlyStop {
                threshold: (2.0 * threshold).min(1.0),
            },
            _ => kernel,
        }
    }

    /// Matching partners of author `i` among the surviving pairs of its row
    fn match_row(&self, i: usize, flags: &[bool], kernel: &DistanceKernel) -> Vec<usize> {
        flags
            .iter()
            .enumerate()
            .filter(|&(_, &keep)| keep)
            .map(|(offset, _)| i + 1 + offset)
            .filter(|&j| self.is_match(i, j, kernel))
            .collect()
    }

    fn is_match(&self, i: usize, j: usize, kernel: &DistanceKernel) -> bool {
        let a = self.names(i);
        let b = self.names(j);
        // Exact matching is pass/fail whatever the threshold
        let threshold = match self.config.algorithm {
            Algorithm::Exact => 0.0,
            _ => self.config.threshold,
        };

        match self.config.compare_mode {
            CompareMode::LastName => kernel.distance(&a.last, &b.last) <= threshold,
            CompareMode::FirstName => kernel.distance(&a.first, &b.first) <= threshold,
            CompareMode::BothNames => self.config.combine.within(
                kernel.distance(&a.last, &b.last),
                kernel.distance(&a.first, &b.first),
                threshold,
            ),
        }
    }

    fn names(&self, i: usize) -> &NameVariant {
        self.index.names(i, self.config.use_diacritics)
    }

    /// Display string: the compared field first
    fn label(&self, i: usize) -> String {
        let names = self.names(i);
        match self.config.compare_mode {
            CompareMode::FirstName => format!("{}, {}", names.first.text, names.last.text),
            CompareMode::LastName | CompareMode::BothNames => {
                format!("{}, {}", names.last.text, names.first.text)
            }
        }
    }

    fn emit<S: ResultSink + ?Sized>(&self, i: usize, j: usize, band: bool, sink: &mut S) {
        sink.push_row(&self.label(i), &self.label(j), band);

        if self.config.include_citation_keys {
            let left = &self.index.author(i).display_keys;
            let right = &self.index.author(j).display_keys;
            for row in 0..left.len().max(right.len()) {
                sink.push_row(
                    left.get(row).map_or(BLANK, String::as_str),
                    right.get(row).map_or(BLANK, String::as_str),
                    band,
                );
            }
        }

        sink.push_row(BLANK, BLANK, band);
    }
}

/// Run a full matching pass with no cancellation
pub fn find_matches(
    index: &AuthorIndex,
    config: &MatchConfig,
    today: NaiveDate,
) -> Result<MatchOutput> {
    Matcher::new(index, config).run(today)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TemporalCutoff;
    use crate::index::SourceRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 6, 1)
    }

    fn index_of(names: &[(&str, &str, &str)]) -> AuthorIndex {
        AuthorIndex::from_records(
            names
                .iter()
                .map(|(last, first, key)| SourceRecord::new(*last, *first, date(2024, 1, 1), *key)),
        )
    }

    #[test]
    fn test_single_pair_on_last_name() {
        let index = index_of(&[
            ("Smith", "John", "a"),
            ("Smith", "Jon", "b"),
            ("Doe", "Jane", "c"),
        ]);
        let config = MatchConfig::new(CompareMode::LastName, Algorithm::Levenshtein, 0.2);
        let output = find_matches(&index, &config, today()).unwrap();

        assert_eq!(output.pairs, vec![MatchedPair { left: 1, right: 2 }]);
        assert_eq!(output.left, vec!["Smith, John", " "]);
        assert_eq!(output.right, vec!["Smith, Jon", " "]);
        assert_eq!(output.banding, vec![false, false]);
        assert_eq!(output.stats.pairs, 3);
        assert_eq!(output.stats.candidates, 1);
        assert_eq!(output.stats.compared, 1);
        assert_eq!(output.stats.matched, 1);
    }

    #[test]
    fn test_banding_toggles_per_matched_pair() {
        let index = index_of(&[
            ("Adams", "A", "a"),
            ("Adams", "B", "b"),
            ("Adams", "C", "c"),
        ]);
        let config = MatchConfig::new(CompareMode::LastName, Algorithm::Exact, 0.0);
        let output = find_matches(&index, &config, today()).unwrap();

        assert_eq!(output.pairs.len(), 3);
        assert_eq!(output.banding, vec![false, false, true, true, false, false]);
    }

    #[test]
    fn test_citation_keys_padded_in_lockstep() {
        let index = AuthorIndex::from_records(vec![
            SourceRecord::new("Smith", "John", date(2024, 1, 1), "smith2020"),
            SourceRecord::new("Smith", "John", date(2024, 1, 1), "smith2021"),
            SourceRecord::new("Smith", "J.", date(2024, 1, 1), "smith2019"),
        ]);
        let mut config = MatchConfig::new(CompareMode::LastName, Algorithm::Exact, 0.0);
        config.include_citation_keys = true;
        let output = find_matches(&index, &config, today()).unwrap();

        assert_eq!(
            output.left,
            vec!["Smith, J.", "smith2019", " ", " "]
        );
        assert_eq!(
            output.right,
            vec!["Smith, John", "smith2020", "smith2021", " "]
        );
        assert_eq!(output.banding, vec![false; 4]);
    }

    #[test]
    fn test_first_name_mode_label_order() {
        let index = index_of(&[("Smith", "Anna", "a"), ("Jones", "Anna", "b")]);
        let config = MatchConfig::new(CompareMode::FirstName, Algorithm::Exact, 0.0);
        let output = find_matches(&index, &config, today()).unwrap();

        assert_eq!(output.left[0], "Anna, Jones");
        assert_eq!(output.right[0], "Anna, Smith");
    }

    #[test]
    fn test_exact_ignores_threshold() {
        let index = index_of(&[("Smith", "John", "a"), ("Smyth", "John", "b")]);
        let config = MatchConfig::new(CompareMode::LastName, Algorithm::Exact, 1.0);
        let output = find_matches(&index, &config, today()).unwrap();
        assert!(output.pairs.is_empty());
    }

    #[test]
    fn test_diacritics_toggle() {
        let index = index_of(&[("Gödel", "Kurt", "a"), ("Godel", "Kurt", "b")]);
        let mut config = MatchConfig::new(CompareMode::LastName, Algorithm::Exact, 0.0);

        let output = find_matches(&index, &config, today()).unwrap();
        assert_eq!(output.pairs.len(), 1);
        assert_eq!(output.left[0], "Godel, Kurt");

        config.use_diacritics = true;
        let output = find_matches(&index, &config, today()).unwrap();
        assert!(output.pairs.is_empty());
    }

    #[test]
    fn test_both_names_average_tolerates_one_field() {
        // last names 1/6 apart, first names 2/5 apart
        let index = index_of(&[("Miller", "Clara", "a"), ("Muller", "Klare", "b")]);
        let mut config = MatchConfig::new(CompareMode::BothNames, Algorithm::Levenshtein, 0.3);

        config.combine = Combine::Avg;
        assert_eq!(find_matches(&index, &config, today()).unwrap().pairs.len(), 1);

        config.combine = Combine::And;
        assert!(find_matches(&index, &config, today()).unwrap().pairs.is_empty());

        config.combine = Combine::Or;
        assert_eq!(find_matches(&index, &config, today()).unwrap().pairs.len(), 1);
    }

    #[test]
    fn test_transliterated_names_match_exactly() {
        let index = index_of(&[("Łukasiewicz", "Jan", "a"), ("Lukasiewicz", "Jan", "b")]);
        let mut config = MatchConfig::new(CompareMode::BothNames, Algorithm::Exact, 0.0);

        let output = find_matches(&index, &config, today()).unwrap();
        assert_eq!(output.pairs.len(), 1);
        assert_eq!(output.stats.compared, 1);

        config.use_diacritics = true;
        assert!(find_matches(&index, &config, today()).unwrap().pairs.is_empty());
    }

    #[test]
    fn test_temporal_cutoff_applies() {
        let index = AuthorIndex::from_records(vec![
            SourceRecord::new("Smith", "John", date(2020, 1, 1), "a"),
            SourceRecord::new("Smith", "Jon", date(2024, 5, 30), "b"),
        ]);
        let mut config = MatchConfig::new(CompareMode::LastName, Algorithm::Exact, 0.0);
        config.temporal_cutoff = TemporalCutoff::OneYear;
        let output = find_matches(&index, &config, today()).unwrap();
        assert!(output.pairs.is_empty());
        assert_eq!(output.stats.compared, 0);
    }

    #[test]
    fn test_invalid_threshold_fails_fast() {
        let index = index_of(&[("Smith", "John", "a")]);
        let config = MatchConfig::new(CompareMode::LastName, Algorithm::Levenshtein, 1.5);
        assert!(matches!(
            find_matches(&index, &config, today()),
            Err(MatchError::Config(_))
        ));
    }

    #[test]
    fn test_cancelled_run_aborts() {
        let index = index_of(&[("Smith", "John", "a"), ("Smith", "Jon", "b")]);
        let config = MatchConfig::new(CompareMode::LastName, Algorithm::Exact, 0.0);
        let flag = CancelFlag::new();
        flag.cancel();

        let result = Matcher::new(&index, &config).with_cancel(flag).run(today());
        assert!(matches!(
            result,
            Err(MatchError::Cancelled { rows_total: 1, .. })
        ));
    }

    #[test]
    fn test_write_to_replays_rows() {
        let index = index_of(&[("Smith", "John", "a"), ("Smith", "Jon", "b")]);
        let config = MatchConfig::new(CompareMode::LastName, Algorithm::Exact, 0.0);
        let output = find_matches(&index, &config, today()).unwrap();

        let mut rows: Vec<ResultRow> = Vec::new();
        output.write_to(&mut rows);
        assert_eq!(rows.len(), output.len());
        assert_eq!(rows[0].left, "Smith, John");
        assert_eq!(rows[1].right, BLANK);
    }

    #[test]
    fn test_empty_and_single_author_index() {
        let config = MatchConfig::new(CompareMode::LastName, Algorithm::Levenshtein, 0.2);
        let output = find_matches(&AuthorIndex::default(), &config, today()).unwrap();
        assert!(output.is_empty());

        let index = index_of(&[("Smith", "John", "a")]);
        let output = find_matches(&index, &config, today()).unwrap();
        assert_eq!(output.stats.pairs, 0);
    }
}
