//! Python bindings, built with the `python` feature.

use chrono::NaiveDate;
use pyo3::create_exception;
use pyo3::prelude::*;

use crate::config::{Algorithm, Combine, CompareMode, MatchConfig, TemporalCutoff};
use crate::error::MatchError;
use crate::index::{AuthorIndex, AuthorIndexBuilder, DisplayBudget, SourceRecord};
use crate::matcher::{MatchOutput, Matcher};

create_exception!(author_matcher, AuthorMatcherError, pyo3::exceptions::PyException);
create_exception!(author_matcher, ConfigError, AuthorMatcherError);
create_exception!(author_matcher, ThresholdError, AuthorMatcherError);
create_exception!(author_matcher, CancelledError, AuthorMatcherError);

impl From<MatchError> for PyErr {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::Config(_) => ConfigError::new_err(err.to_string()),
            MatchError::Threshold(_) => ThresholdError::new_err(err.to_string()),
            MatchError::Cancelled { .. } => CancelledError::new_err(err.to_string()),
        }
    }
}

/// One author occurrence as extracted from the reference database
#[derive(Debug, FromPyObject)]
struct RecordData {
    #[pyo3(item)]
    last_name: String,
    #[pyo3(item)]
    first_name: String,
    #[pyo3(item)]
    date: NaiveDate,
    #[pyo3(item)]
    citation_key: String,
}

impl From<RecordData> for SourceRecord {
    fn from(data: RecordData) -> Self {
        SourceRecord::new(data.last_name, data.first_name, data.date, data.citation_key)
    }
}

/// Rows handed back to Python
#[derive(Clone, Debug, IntoPyObject)]
struct MatchResultData {
    left: Vec<String>,
    right: Vec<String>,
    banding: Vec<bool>,
    pairs: Vec<(usize, usize)>,
    candidates: usize,
    compared: usize,
}

impl From<MatchOutput> for MatchResultData {
    fn from(output: MatchOutput) -> Self {
        Self {
            pairs: output.pairs.iter().map(|p| (p.left, p.right)).collect(),
            candidates: output.stats.candidates,
            compared: output.stats.compared,
            left: output.left,
            right: output.right,
            banding: output.banding,
        }
    }
}

fn parse_algorithm(name: &str) -> PyResult<Algorithm> {
    match name.to_lowercase().as_str() {
        "exact" => Ok(Algorithm::Exact),
        "levenshtein" => Ok(Algorithm::Levenshtein),
        "damerau_levenshtein" | "damerau-levenshtein" => Ok(Algorithm::DamerauLevenshtein),
        _ => Err(ConfigError::new_err(format!("unknown algorithm: {}", name))),
    }
}

fn parse_compare_mode(name: &str) -> PyResult<CompareMode> {
    match name.to_lowercase().as_str() {
        "lastname" | "last_name" => Ok(CompareMode::LastName),
        "firstname" | "first_name" => Ok(CompareMode::FirstName),
        "bothname" | "both_names" => Ok(CompareMode::BothNames),
        _ => Err(ConfigError::new_err(format!("unknown compare mode: {}", name))),
    }
}

fn parse_combine(name: &str) -> PyResult<Combine> {
    match name.to_lowercase().as_str() {
        "and" => Ok(Combine::And),
        "or" => Ok(Combine::Or),
        "avg" => Ok(Combine::Avg),
        _ => Err(ConfigError::new_err(format!("unknown combination: {}", name))),
    }
}

fn parse_cutoff(name: Option<&str>) -> PyResult<TemporalCutoff> {
    match name {
        None | Some("none") => Ok(TemporalCutoff::None),
        Some("today") => Ok(TemporalCutoff::Today),
        Some("tod-1w") | Some("one_week") => Ok(TemporalCutoff::OneWeek),
        Some("tod-1m") | Some("one_month") => Ok(TemporalCutoff::OneMonth),
        Some("tod-1y") | Some("one_year") => Ok(TemporalCutoff::OneYear),
        Some(other) => Err(ConfigError::new_err(format!(
            "unknown temporal cutoff: {}",
            other
        ))),
    }
}

/// Author index exposed to Python
#[pyclass(name = "AuthorIndex", frozen)]
struct PyAuthorIndex {
    inner: AuthorIndex,
}

#[pymethods]
impl PyAuthorIndex {
    #[new]
    #[pyo3(signature = (records, display_lower=None, display_upper=None))]
    fn new(
        records: Vec<RecordData>,
        display_lower: Option<f64>,
        display_upper: Option<f64>,
    ) -> Self {
        let defaults = DisplayBudget::default();
        let budget = DisplayBudget {
            lower: display_lower.unwrap_or(defaults.lower),
            upper: display_upper.unwrap_or(defaults.upper),
        };
        let mut builder = AuthorIndexBuilder::new(crate::index::CharCount, budget);
        builder.extend(records.into_iter().map(SourceRecord::from));
        Self {
            inner: builder.build(),
        }
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    /// Author keys in canonical order
    fn keys(&self) -> Vec<String> {
        self.inner.authors().iter().map(|a| a.key()).collect()
    }

    #[allow(clippy::too_many_arguments)]
    #[pyo3(signature = (
        compare_mode,
        algorithm,
        threshold,
        combine="and",
        use_diacritics=false,
        filter_abbreviations=false,
        include_citation_keys=false,
        temporal_cutoff=None,
        today=None
    ))]
    fn find_matches(
        &self,
        py: Python,
        compare_mode: &str,
        algorithm: &str,
        threshold: f64,
        combine: &str,
        use_diacritics: bool,
        filter_abbreviations: bool,
        include_citation_keys: bool,
        temporal_cutoff: Option<&str>,
        today: Option<NaiveDate>,
    ) -> PyResult<MatchResultData> {
        let config = MatchConfig {
            compare_mode: parse_compare_mode(compare_mode)?,
            algorithm: parse_algorithm(algorithm)?,
            threshold,
            combine: parse_combine(combine)?,
            use_diacritics,
            filter_abbreviations,
            include_citation_keys,
            temporal_cutoff: parse_cutoff(temporal_cutoff)?,
        };
        let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());

        let index = &self.inner;
        let output = py.allow_threads(|| Matcher::new(index, &config).run(today))?;
        Ok(output.into())
    }
}

/// Normalized distance between two names, 0 meaning identical
#[pyfunction]
#[pyo3(signature = (a, b, algorithm="levenshtein", threshold=1.0))]
fn normalized_distance(a: &str, b: &str, algorithm: &str, threshold: f64) -> PyResult<f64> {
    let distance =
        crate::distance::normalized_distance(parse_algorithm(algorithm)?, a, b, threshold)?;
    Ok(distance)
}

/// Validate a threshold typed by the user
#[pyfunction]
fn parse_threshold(text: &str) -> PyResult<f64> {
    crate::config::parse_threshold(text).map_err(|e| MatchError::from(e).into())
}

#[pymodule]
fn author_matcher(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyAuthorIndex>()?;
    m.add_function(wrap_pyfunction!(normalized_distance, m)?)?;
    m.add_function(wrap_pyfunction!(parse_threshold, m)?)?;
    m.add("AuthorMatcherError", m.py().get_type::<AuthorMatcherError>())?;
    m.add("ConfigError", m.py().get_type::<ConfigError>())?;
    m.add("ThresholdError", m.py().get_type::<ThresholdError>())?;
    m.add("CancelledError", m.py().get_type::<CancelledError>())?;
    Ok(())
}
