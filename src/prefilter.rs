//! Canonical pair enumeration and the candidate mask.
//!
//! Pairs (i, j) with i < j are numbered row by row: (0,1), (0,2), ..., (0,n-1),
//! (1,2), ... The mask and the matcher both follow this order.

use chrono::NaiveDate;
use rayon::prelude::*;

use crate::config::{CompareMode, MatchConfig};
use crate::index::{AuthorIndex, NameField, NameVariant};

/// Number of unordered pairs over `n` authors
pub fn pair_count(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Flattened index of the first pair in row `i`
pub fn row_offset(i: usize, n: usize) -> usize {
    i * (2 * n - i - 1) / 2
}

/// Flattened index of pair (i, j), `i < j < n`
pub fn pair_index(i: usize, j: usize, n: usize) -> usize {
    debug_assert!(i < j && j < n);
    row_offset(i, n) + (j - i - 1)
}

/// All pairs in canonical order
pub fn canonical_pairs(n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..n.saturating_sub(1)).flat_map(move |i| (i + 1..n).map(move |j| (i, j)))
}

/// `min/max` of two name lengths, 0 when both are empty
#[allow(clippy::cast_precision_loss)]
fn length_ratio(a: &NameField, b: &NameField) -> f64 {
    let (lo, hi) = if a.len() <= b.len() {
        (a.len(), b.len())
    } else {
        (b.len(), a.len())
    };
    if hi == 0 {
        0.0
    } else {
        lo as f64 / hi as f64
    }
}

/// Lower bound on the normalized edit distance from letter counts.
///
/// Substitutions move two units of the L1 histogram distance, insertions and
/// deletions one, transpositions none, so half of it never exceeds the edit
/// count. An empty side means the field is absent and the bound is infinite.
#[allow(clippy::cast_precision_loss)]
pub fn histogram_bound(a: &NameField, b: &NameField) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }
    let max_len = a.len().max(b.len());
    f64::from(a.histogram.city_block(&b.histogram)) / 2.0 / max_len as f64
}

/// The per-pair predicates selected by a configuration
struct PairFilter<'a> {
    index: &'a AuthorIndex,
    config: &'a MatchConfig,
    cutoff: Option<NaiveDate>,
}

impl PairFilter<'_> {
    fn keep(&self, i: usize, j: usize) -> bool {
        if let Some(cutoff) = self.cutoff {
            let dates = self.index.dates();
            if dates[i] < cutoff || dates[j] < cutoff {
                return false;
            }
        }

        if self.config.filter_abbreviations {
            let abbreviated = self.index.abbreviated();
            if !(abbreviated[i] && abbreviated[j]) {
                return false;
            }
        }

        if !self.config.algorithm.is_edit_distance() {
            return true;
        }

        let a = self.index.names(i, self.config.use_diacritics);
        let b = self.index.names(j, self.config.use_diacritics);
        self.keep_lengths(a, b) && self.keep_histograms(a, b)
    }

    /// Length ratio on the field not being compared
    fn keep_lengths(&self, a: &NameVariant, b: &NameVariant) -> bool {
        let t = self.config.threshold;
        match self.config.compare_mode {
            CompareMode::LastName => length_ratio(&a.first, &b.first) > t,
            CompareMode::FirstName => length_ratio(&a.last, &b.last) > t,
            CompareMode::BothNames => self.config.combine.above(
                length_ratio(&a.last, &b.last),
                length_ratio(&a.first, &b.first),
                t,
            ),
        }
    }

    fn keep_histograms(&self, a: &NameVariant, b: &NameVariant) -> bool {
        let t = self.config.threshold;
        match self.config.compare_mode {
            CompareMode::LastName => histogram_bound(&a.last, &b.last) <= t,
            CompareMode::FirstName => histogram_bound(&a.first, &b.first) <= t,
            CompareMode::BothNames => self.config.combine.within(
                histogram_bound(&a.last, &b.last),
                histogram_bound(&a.first, &b.first),
                t,
            ),
        }
    }
}

/// One flag per canonical pair; `false` pairs are never compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMask {
    n: usize,
    bits: Vec<bool>,
}

impl CandidateMask {
    /// Mask keeping every pair
    pub fn all(n: usize) -> Self {
        Self {
            n,
            bits: vec![true; pair_count(n)],
        }
    }

    /// Evaluate the filters selected by `config` over every pair.
    ///
    /// Rows are filtered in parallel and joined in row order.
    pub fn build(index: &AuthorIndex, config: &MatchConfig, today: NaiveDate) -> Self {
        let n = index.len();
        let filter = PairFilter {
            index,
            config,
            cutoff: config.temporal_cutoff.cutoff(today),
        };

        let rows: Vec<Vec<bool>> = (0..n.saturating_sub(1))
            .into_par_iter()
            .map(|i| (i + 1..n).map(|j| filter.keep(i, j)).collect())
            .collect();

        let mask = Self {
            n,
            bits: rows.concat(),
        };
        tracing::debug!(
            pairs = mask.len(),
            candidates = mask.survivors(),
            "built candidate mask"
        );
        mask
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Flag at a flattened pair index
    pub fn get(&self, k: usize) -> bool {
        self.bits[k]
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        self.bits[pair_index(i, j, self.n)]
    }

    /// Flags of pairs (i, i+1), ..., (i, n-1)
    pub fn row(&self, i: usize) -> &[bool] {
        let start = row_offset(i, self.n);
        &self.bits[start..start + (self.n - i - 1)]
    }

    pub fn survivors(&self) -> usize {
        self.bits.iter().filter(|&&keep| keep).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }
}
