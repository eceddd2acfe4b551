use thiserror::Error;

/// Reasons a threshold string is rejected by [`crate::parse_threshold`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThresholdError {
    #[error("threshold is empty")]
    Empty,
    #[error("threshold has more than one decimal separator")]
    MultipleSeparators,
    #[error("threshold starts with a decimal separator")]
    LeadingSeparator,
    #[error("threshold has a leading zero not followed by a decimal separator")]
    LeadingZero,
    #[error("threshold is greater than 1")]
    AboveOne,
    #[error("threshold is negative")]
    Negative,
    #[error("threshold is not a number: {0:?}")]
    NotANumber(String),
}

/// Errors raised by the matching engine.
#[derive(Debug, Error)]
pub enum MatchError {
    /// The configuration violates a precondition (threshold outside [0, 1], NaN, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    /// The run was cancelled; no partial output is produced.
    #[error("matching cancelled after {rows_done} of {rows_total} rows")]
    Cancelled { rows_done: usize, rows_total: usize },
}

pub type Result<T> = std::result::Result<T, MatchError>;
