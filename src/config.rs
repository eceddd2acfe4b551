//! Configuration surface of the matcher.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result, ThresholdError};

/// Comparison algorithm selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Exact,
    Levenshtein,
    DamerauLevenshtein,
}

impl Algorithm {
    /// Exact matching is a pass/fail predicate and skips the distance-based prefilters.
    pub fn is_edit_distance(self) -> bool {
        !matches!(self, Algorithm::Exact)
    }
}

/// Which name field drives the comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    #[serde(alias = "lastname")]
    LastName,
    #[serde(alias = "firstname")]
    FirstName,
    #[serde(alias = "bothname")]
    BothNames,
}

/// How the two per-field results are combined in [`CompareMode::BothNames`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    #[default]
    And,
    Or,
    Avg,
}

impl Combine {
    /// Combine two distance-like values against an upper bound.
    ///
    /// `And`/`Or` test each value separately, `Avg` tests their mean.
    pub fn within(self, last: f64, first: f64, bound: f64) -> bool {
        match self {
            Combine::And => last <= bound && first <= bound,
            Combine::Or => last <= bound || first <= bound,
            Combine::Avg => (last + first) / 2.0 <= bound,
        }
    }

    /// Combine two similarity-like values against a strict lower bound.
    pub fn above(self, last: f64, first: f64, bound: f64) -> bool {
        match self {
            Combine::And => last > bound && first > bound,
            Combine::Or => last > bound || first > bound,
            Combine::Avg => (last + first) / 2.0 > bound,
        }
    }
}

/// Keep only authors touched recently
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalCutoff {
    #[default]
    None,
    Today,
    #[serde(alias = "tod-1w")]
    OneWeek,
    #[serde(alias = "tod-1m")]
    OneMonth,
    #[serde(alias = "tod-1y")]
    OneYear,
}

impl TemporalCutoff {
    /// Earliest date an author must have been seen on, or `None` when the filter is off.
    pub fn cutoff(self, today: NaiveDate) -> Option<NaiveDate> {
        let days = match self {
            TemporalCutoff::None => return None,
            TemporalCutoff::Today => 0,
            TemporalCutoff::OneWeek => 7,
            TemporalCutoff::OneMonth => 31,
            TemporalCutoff::OneYear => 365,
        };
        today.checked_sub_days(Days::new(days))
    }
}

/// Everything the matcher needs to know about one pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub compare_mode: CompareMode,
    pub algorithm: Algorithm,
    pub threshold: f64,
    #[serde(default)]
    pub combine: Combine,
    #[serde(default)]
    pub use_diacritics: bool,
    #[serde(default)]
    pub filter_abbreviations: bool,
    #[serde(default)]
    pub include_citation_keys: bool,
    #[serde(default)]
    pub temporal_cutoff: TemporalCutoff,
}

impl MatchConfig {
    pub fn new(compare_mode: CompareMode, algorithm: Algorithm, threshold: f64) -> Self {
        Self {
            compare_mode,
            algorithm,
            threshold,
            combine: Combine::default(),
            use_diacritics: false,
            filter_abbreviations: false,
            include_citation_keys: false,
            temporal_cutoff: TemporalCutoff::None,
        }
    }

    /// Fail fast on a threshold the engine cannot honour. Values are never clamped.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)
    }
}

/// Check that `threshold` is finite and within [0, 1]
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() {
        return Err(MatchError::Config(format!(
            "threshold must be a finite number, got {}",
            threshold
        )));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(MatchError::Config(format!(
            "threshold must be in range [0.0, 1.0], got {}",
            threshold
        )));
    }
    Ok(())
}

/// Parse a user-typed threshold.
///
/// Accepts `.` or `,` as the decimal separator. Rejects, in this order:
/// empty input, a negative sign, more than one separator, a leading
/// separator, a leading zero followed by a digit, unparsable text and
/// values above 1.
pub fn parse_threshold(text: &str) -> std::result::Result<f64, ThresholdError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ThresholdError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(ThresholdError::Negative);
    }

    let is_separator = |c: char| c == '.' || c == ',';
    if trimmed.chars().filter(|&c| is_separator(c)).count() > 1 {
        return Err(ThresholdError::MultipleSeparators);
    }

    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), _) if is_separator(c) => return Err(ThresholdError::LeadingSeparator),
        (Some('0'), Some(next)) if !is_separator(next) => {
            return Err(ThresholdError::LeadingZero)
        }
        _ => {}
    }

    let value: f64 = trimmed
        .replace(',', ".")
        .parse()
        .map_err(|_| ThresholdError::NotANumber(trimmed.to_string()))?;

    if !value.is_finite() {
        return Err(ThresholdError::NotANumber(trimmed.to_string()));
    }
    if value < 0.0 {
        return Err(ThresholdError::Negative);
    }
    if value > 1.0 {
        return Err(ThresholdError::AboveOne);
    }
    Ok(value)
}
