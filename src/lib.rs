//! Approximate author matching for reference-manager libraries.
//!
//! Authors harvested from a bibliographic database are deduplicated into an
//! [`AuthorIndex`], pruned pairwise by the [`CandidateMask`] and compared with
//! one of the [`distance`] algorithms. Matching pairs come back as two
//! parallel display columns with a banding flag.

pub mod config;
pub mod distance;
pub mod error;
pub mod index;
pub mod matcher;
pub mod prefilter;

#[cfg(feature = "python")]
mod python;

pub use config::{
    parse_threshold, validate_threshold, Algorithm, Combine, CompareMode, MatchConfig,
    TemporalCutoff,
};
pub use distance::{normalized_distance, DistanceKernel};
pub use error::{MatchError, Result, ThresholdError};
pub use index::{
    AuthorIndex, AuthorIndexBuilder, AuthorRecord, CharCount, DisplayBudget, LetterHistogram,
    NameField, SourceRecord, TextWidth,
};
pub use matcher::{
    find_matches, CancelFlag, MatchOutput, MatchStats, MatchedPair, Matcher, ResultRow, ResultSink,
};
pub use prefilter::{canonical_pairs, pair_count, CandidateMask};
