//! Normalized string distances in [0, 1], 0 meaning identical.
//!
//! Full variants delegate to `strsim`. Early-stopping variants run the same
//! recurrence on rolling rows and give up with `1.0` once the row minimum
//! shows the threshold can no longer be met. For a given threshold both
//! variants accept and reject the same pairs.

use crate::config::{validate_threshold, Algorithm};
use crate::error::Result;
use crate::index::NameField;

/// Thresholds at or above this run the full Levenshtein variant
pub const LEVENSHTEIN_CROSSOVER: f64 = 0.74;
/// Thresholds at or above this run the full Damerau-Levenshtein variant
pub const DAMERAU_CROSSOVER: f64 = 0.72;

/// Value reported when a pair is known to exceed the threshold
pub const REJECTED: f64 = 1.0;

#[allow(clippy::cast_precision_loss)]
fn normalize(raw: usize, max_len: usize) -> f64 {
    if max_len == 0 {
        0.0
    } else {
        raw as f64 / max_len as f64
    }
}

fn max_char_len(a: &str, b: &str) -> usize {
    a.chars().count().max(b.chars().count())
}

/// Report the final value, or [`REJECTED`] when it lies above the threshold
fn finish(raw: usize, max_len: usize, threshold: f64) -> f64 {
    let distance = normalize(raw, max_len);
    if distance > threshold {
        REJECTED
    } else {
        distance
    }
}

/// Longer operand first, so the rolling rows span the shorter one
fn by_length<'a>(a: &'a [char], b: &'a [char]) -> (&'a [char], &'a [char]) {
    if a.len() >= b.len() {
        (a, b)
    } else {
        (b, a)
    }
}

/// 0 when both names are identical, 1 otherwise
pub fn exact(a: &str, b: &str) -> f64 {
    if a == b {
        0.0
    } else {
        1.0
    }
}

/// Levenshtein distance divided by the longer operand's length
pub fn levenshtein(a: &str, b: &str) -> f64 {
    normalize(strsim::levenshtein(a, b), max_char_len(a, b))
}

/// Damerau-Levenshtein (optimal string alignment) divided by the longer operand's length
pub fn damerau_levenshtein(a: &str, b: &str) -> f64 {
    normalize(strsim::osa_distance(a, b), max_char_len(a, b))
}

/// Levenshtein with row-wise early termination
pub fn levenshtein_early_stop(a: &[char], b: &[char], threshold: f64) -> f64 {
    let (long, short) = by_length(a, b);
    let max_len = long.len();
    if max_len == 0 {
        return 0.0;
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0; short.len() + 1];

    for (i, &lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &sc) in short.iter().enumerate() {
            let cost = usize::from(lc != sc);
            curr[j + 1] = (curr[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
        }

        let row_min = curr.iter().copied().min().unwrap_or(0);
        if normalize(row_min, max_len) > threshold {
            return REJECTED;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    finish(prev[short.len()], max_len, threshold)
}

/// Damerau-Levenshtein (optimal string alignment) with row-wise early termination.
///
/// The row minimum is reduced by one before the check: a transposition
/// reaching back two rows may still lower the final value.
pub fn damerau_levenshtein_early_stop(a: &[char], b: &[char], threshold: f64) -> f64 {
    let (long, short) = by_length(a, b);
    let max_len = long.len();
    if max_len == 0 {
        return 0.0;
    }

    let width = short.len() + 1;
    let mut prev2 = vec![0; width];
    let mut prev: Vec<usize> = (0..width).collect();
    let mut curr = vec![0; width];

    for (i, &lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &sc) in short.iter().enumerate() {
            let cost = usize::from(lc != sc);
            let mut best = (curr[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
            if i > 0 && j > 0 && lc == short[j - 1] && long[i - 1] == sc {
                best = best.min(prev2[j - 1] + 1);
            }
            curr[j + 1] = best;
        }

        let row_min = curr.iter().copied().min().unwrap_or(0);
        if normalize(row_min.saturating_sub(1), max_len) > threshold {
            return REJECTED;
        }
        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    finish(prev[short.len()], max_len, threshold)
}

/// A comparison algorithm resolved for one threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceKernel {
    Exact,
    Levenshtein,
    LevenshteinEarlyStop { threshold: f64 },
    DamerauLevenshtein,
    DamerauLevenshteinEarlyStop { threshold: f64 },
}

impl DistanceKernel {
    /// Pick the full or early-stopping variant for `threshold`
    pub fn select(algorithm: Algorithm, threshold: f64) -> Self {
        match algorithm {
            Algorithm::Exact => DistanceKernel::Exact,
            Algorithm::Levenshtein if threshold >= LEVENSHTEIN_CROSSOVER => {
                DistanceKernel::Levenshtein
            }
            Algorithm::Levenshtein => DistanceKernel::LevenshteinEarlyStop { threshold },
            Algorithm::DamerauLevenshtein if threshold >= DAMERAU_CROSSOVER => {
                DistanceKernel::DamerauLevenshtein
            }
            Algorithm::DamerauLevenshtein => {
                DistanceKernel::DamerauLevenshteinEarlyStop { threshold }
            }
        }
    }

    pub fn is_early_stop(&self) -> bool {
        matches!(
            self,
            DistanceKernel::LevenshteinEarlyStop { .. }
                | DistanceKernel::DamerauLevenshteinEarlyStop { .. }
        )
    }

    /// Distance between two prepared name fields.
    ///
    /// Exact matching compares the names as written; the edit distances work
    /// on the names without spaces and dots.
    pub fn distance(&self, a: &NameField, b: &NameField) -> f64 {
        match *self {
            DistanceKernel::Exact => exact(&a.text, &b.text),
            DistanceKernel::Levenshtein => levenshtein(&a.stripped, &b.stripped),
            DistanceKernel::LevenshteinEarlyStop { threshold } => {
                levenshtein_early_stop(&a.chars, &b.chars, threshold)
            }
            DistanceKernel::DamerauLevenshtein => damerau_levenshtein(&a.stripped, &b.stripped),
            DistanceKernel::DamerauLevenshteinEarlyStop { threshold } => {
                damerau_levenshtein_early_stop(&a.chars, &b.chars, threshold)
            }
        }
    }
}

/// Distance between two names with the variant the dispatch rule picks for `threshold`.
///
/// Fails with [`MatchError::Config`](crate::MatchError::Config) when the
/// threshold is not a finite value in [0, 1].
pub fn normalized_distance(algorithm: Algorithm, a: &str, b: &str, threshold: f64) -> Result<f64> {
    validate_threshold(threshold)?;
    Ok(DistanceKernel::select(algorithm, threshold).distance(&NameField::new(a), &NameField::new(b)))
}
