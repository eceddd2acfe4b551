//! Author index: deduplicated authors in canonical order plus the per-author
//! data the prefilter and the distance engine read.

use ahash::AHashMap;
use chrono::NaiveDate;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Suffix appended to truncated display keys
pub const ELLIPSIS: &str = "...";

/// One raw tuple handed over by the extraction step
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub last_name: String,
    pub first_name: String,
    /// Diacritic-free variants, derived from the raw names when absent
    pub last_name_plain: Option<String>,
    pub first_name_plain: Option<String>,
    pub date: NaiveDate,
    pub citation_key: String,
}

impl SourceRecord {
    pub fn new(
        last_name: impl Into<String>,
        first_name: impl Into<String>,
        date: NaiveDate,
        citation_key: impl Into<String>,
    ) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            last_name_plain: None,
            first_name_plain: None,
            date,
            citation_key: citation_key.into(),
        }
    }

    pub fn with_plain(mut self, last: impl Into<String>, first: impl Into<String>) -> Self {
        self.last_name_plain = Some(last.into());
        self.first_name_plain = Some(first.into());
        self
    }
}

/// Remove diacritics and transliterate to ASCII.
///
/// Compatibility decomposition with combining marks dropped handles accented
/// letters; `deunicode` then covers letters without a decomposition
/// (`Ł`, `Ø`, `ß`, ...). Characters it has no mapping for are dropped.
pub fn strip_diacritics(text: &str) -> String {
    let decomposed: String = text.nfkd().filter(|&c| !is_combining_mark(c)).collect();
    deunicode::deunicode_with_tofu(&decomposed, "")
}

/// Characters of a name with spaces and dots removed
fn strip_name(text: &str) -> Vec<char> {
    text.chars().filter(|&c| c != ' ' && c != '.').collect()
}

/// Letter counts of a stripped name.
///
/// Stored sparse and sorted by character, so the layout does not depend on
/// the order in which names were indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LetterHistogram {
    counts: Vec<(char, u32)>,
}

impl LetterHistogram {
    pub fn from_chars(chars: &[char]) -> Self {
        let mut sorted = chars.to_vec();
        sorted.sort_unstable();

        let mut counts: Vec<(char, u32)> = Vec::new();
        for c in sorted {
            match counts.last_mut() {
                Some((last, n)) if *last == c => *n += 1,
                _ => counts.push((c, 1)),
            }
        }
        Self { counts }
    }

    pub fn count(&self, c: char) -> u32 {
        self.counts
            .binary_search_by_key(&c, |&(k, _)| k)
            .map_or(0, |i| self.counts[i].1)
    }

    /// Number of distinct letters
    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// L1 distance between two histograms
    pub fn city_block(&self, other: &Self) -> u32 {
        let (mut a, mut b) = (self.counts.iter().peekable(), other.counts.iter().peekable());
        let mut total = 0;
        loop {
            match (a.peek(), b.peek()) {
                (Some(&&(ca, na)), Some(&&(cb, nb))) => {
                    if ca == cb {
                        total += na.abs_diff(nb);
                        a.next();
                        b.next();
                    } else if ca < cb {
                        total += na;
                        a.next();
                    } else {
                        total += nb;
                        b.next();
                    }
                }
                (Some(&&(_, na)), None) => {
                    total += na;
                    a.next();
                }
                (None, Some(&&(_, nb))) => {
                    total += nb;
                    b.next();
                }
                (None, None) => return total,
            }
        }
    }
}

/// A name field prepared for comparison
#[derive(Debug, Clone, PartialEq)]
pub struct NameField {
    /// Name as displayed and as compared by exact matching
    pub text: String,
    /// Name without spaces and dots, fed to the edit distances
    pub stripped: String,
    pub chars: Vec<char>,
    pub histogram: LetterHistogram,
}

impl NameField {
    pub fn new(text: &str) -> Self {
        let chars = strip_name(text);
        let histogram = LetterHistogram::from_chars(&chars);
        Self {
            text: text.to_string(),
            stripped: chars.iter().collect(),
            chars,
            histogram,
        }
    }

    /// Length after stripping spaces and dots
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// Last and first name in one spelling variant (raw or diacritic-free)
#[derive(Debug, Clone, PartialEq)]
pub struct NameVariant {
    pub last: NameField,
    pub first: NameField,
}

impl NameVariant {
    fn new(last: &str, first: &str) -> Self {
        Self {
            last: NameField::new(last),
            first: NameField::new(first),
        }
    }
}

/// Rendered width of a text, as measured by whatever displays the results
pub trait TextWidth {
    fn width(&self, text: &str) -> f64;
}

/// Width in characters
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCount;

impl TextWidth for CharCount {
    #[allow(clippy::cast_precision_loss)]
    fn width(&self, text: &str) -> f64 {
        text.chars().count() as f64
    }
}

impl<F: Fn(&str) -> f64> TextWidth for F {
    fn width(&self, text: &str) -> f64 {
        self(text)
    }
}

/// Two-threshold budget for display keys: keys wider than `upper` get cut
/// back to at most `lower` before the ellipsis is added.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayBudget {
    pub lower: f64,
    pub upper: f64,
}

impl Default for DisplayBudget {
    fn default() -> Self {
        Self {
            lower: 38.0,
            upper: 38.5,
        }
    }
}

/// Shorten a citation key for display
pub fn display_key<W: TextWidth + ?Sized>(key: &str, width: &W, budget: DisplayBudget) -> String {
    if width.width(key) <= budget.upper {
        return key.to_string();
    }

    let mut end = key.len();
    while end > 0 && width.width(&key[..end]) > budget.lower {
        end = key[..end].char_indices().next_back().map_or(0, |(i, _)| i);
    }
    format!("{}{}", &key[..end], ELLIPSIS)
}

/// A deduplicated author
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorRecord {
    pub last_name: String,
    pub first_name: String,
    pub last_name_plain: String,
    pub first_name_plain: String,
    pub most_recent_date: NaiveDate,
    pub citation_keys: Vec<String>,
    pub display_keys: Vec<String>,
}

impl AuthorRecord {
    pub fn key(&self) -> String {
        author_key(&self.last_name, &self.first_name)
    }
}

/// `"last, first"`, the unique identity of an author
pub fn author_key(last_name: &str, first_name: &str) -> String {
    format!("{}, {}", last_name, first_name)
}

/// Accumulates source records into authors
pub struct AuthorIndexBuilder<W = CharCount> {
    positions: AHashMap<String, usize>,
    authors: Vec<AuthorRecord>,
    width: W,
    budget: DisplayBudget,
}

impl Default for AuthorIndexBuilder<CharCount> {
    fn default() -> Self {
        Self::new(CharCount, DisplayBudget::default())
    }
}

impl<W: TextWidth> AuthorIndexBuilder<W> {
    pub fn new(width: W, budget: DisplayBudget) -> Self {
        Self {
            positions: AHashMap::new(),
            authors: Vec::new(),
            width,
            budget,
        }
    }

    pub fn push(&mut self, record: SourceRecord) {
        let key = author_key(&record.last_name, &record.first_name);

        let position = match self.positions.get(&key) {
            Some(&position) => position,
            None => {
                let last_name_plain = record
                    .last_name_plain
                    .unwrap_or_else(|| strip_diacritics(&record.last_name));
                let first_name_plain = record
                    .first_name_plain
                    .unwrap_or_else(|| strip_diacritics(&record.first_name));
                self.authors.push(AuthorRecord {
                    last_name: record.last_name,
                    first_name: record.first_name,
                    last_name_plain,
                    first_name_plain,
                    most_recent_date: record.date,
                    citation_keys: Vec::new(),
                    display_keys: Vec::new(),
                });
                self.positions.insert(key, self.authors.len() - 1);
                self.authors.len() - 1
            }
        };

        let author = &mut self.authors[position];
        if !author.citation_keys.contains(&record.citation_key) {
            author
                .display_keys
                .push(display_key(&record.citation_key, &self.width, self.budget));
            author.citation_keys.push(record.citation_key);
        }
        if record.date > author.most_recent_date {
            author.most_recent_date = record.date;
        }
    }

    pub fn extend<I: IntoIterator<Item = SourceRecord>>(&mut self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    /// Sort authors by key and derive the per-author comparison data
    pub fn build(self) -> AuthorIndex {
        let mut keyed: Vec<(String, AuthorRecord)> = self
            .authors
            .into_iter()
            .map(|author| (author.key(), author))
            .collect();
        keyed.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let authors: Vec<AuthorRecord> = keyed.into_iter().map(|(_, author)| author).collect();

        let dates = authors.iter().map(|a| a.most_recent_date).collect();
        let abbreviated = authors.iter().map(|a| a.first_name.contains('.')).collect();
        let raw = authors
            .iter()
            .map(|a| NameVariant::new(&a.last_name, &a.first_name))
            .collect();
        let plain = authors
            .iter()
            .map(|a| NameVariant::new(&a.last_name_plain, &a.first_name_plain))
            .collect();

        tracing::debug!(authors = authors.len(), "built author index");

        AuthorIndex {
            authors,
            dates,
            abbreviated,
            raw,
            plain,
        }
    }
}

/// Immutable, sorted author collection
#[derive(Debug, Clone, Default)]
pub struct AuthorIndex {
    authors: Vec<AuthorRecord>,
    dates: Vec<NaiveDate>,
    abbreviated: Vec<bool>,
    raw: Vec<NameVariant>,
    plain: Vec<NameVariant>,
}

impl AuthorIndex {
    /// Build with the default width metric and display budget
    pub fn from_records<I: IntoIterator<Item = SourceRecord>>(records: I) -> Self {
        let mut builder = AuthorIndexBuilder::default();
        builder.extend(records);
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    pub fn authors(&self) -> &[AuthorRecord] {
        &self.authors
    }

    /// Author at canonical position `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`; see [`AuthorIndex::get`].
    pub fn author(&self, i: usize) -> &AuthorRecord {
        &self.authors[i]
    }

    pub fn get(&self, i: usize) -> Option<&AuthorRecord> {
        self.authors.get(i)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Whether each author's first name contains a dot
    pub fn abbreviated(&self) -> &[bool] {
        &self.abbreviated
    }

    /// Names of author `i`, raw when `use_diacritics` is set, diacritic-free otherwise
    pub fn names(&self, i: usize, use_diacritics: bool) -> &NameVariant {
        if use_diacritics {
            &self.raw[i]
        } else {
            &self.plain[i]
        }
    }

    /// Position of an author by key
    pub fn position(&self, key: &str) -> Option<usize> {
        self.authors
            .binary_search_by(|a| a.key().as_str().cmp(key))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_strip_diacritics() {
        assert_eq!(strip_diacritics("Gödel"), "Godel");
        assert_eq!(strip_diacritics("Frédéric"), "Frederic");
        assert_eq!(strip_diacritics("Smith"), "Smith");
        assert_eq!(strip_diacritics("Nguyễn"), "Nguyen");
    }

    #[test]
    fn test_strip_diacritics_transliterates_undecomposable_letters() {
        assert_eq!(strip_diacritics("Łukasiewicz"), "Lukasiewicz");
        assert_eq!(strip_diacritics("Ørsted"), "Orsted");
        assert_eq!(strip_diacritics("Straße"), "Strasse");
        assert_eq!(strip_diacritics("J. R."), "J. R.");
    }

    #[test]
    fn test_plain_names_derived_without_source_variant() {
        let index = AuthorIndex::from_records(vec![SourceRecord::new(
            "Łukasiewicz",
            "Jan",
            date(2020, 1, 1),
            "a",
        )]);

        assert_eq!(index.author(0).last_name_plain, "Lukasiewicz");
        assert_eq!(index.names(0, false).last.text, "Lukasiewicz");
        assert_eq!(index.names(0, true).last.text, "Łukasiewicz");
    }

    #[test]
    fn test_name_field_strips_spaces_and_dots() {
        let field = NameField::new("J. R. R.");
        assert_eq!(field.stripped, "JRR");
        assert_eq!(field.len(), 3);
        assert_eq!(field.text, "J. R. R.");
    }

    #[test]
    fn test_histogram_counts() {
        let hist = LetterHistogram::from_chars(&['a', 'n', 'n', 'a', 'b']);
        assert_eq!(hist.count('a'), 2);
        assert_eq!(hist.count('n'), 2);
        assert_eq!(hist.count('b'), 1);
        assert_eq!(hist.count('z'), 0);
        assert_eq!(hist.distinct(), 3);
    }

    #[test]
    fn test_histogram_city_block() {
        let smith = NameField::new("Smith");
        let smyth = NameField::new("Smyth");
        let doe = NameField::new("Doe");
        assert_eq!(smith.histogram.city_block(&smith.histogram), 0);
        assert_eq!(smith.histogram.city_block(&smyth.histogram), 2);
        assert_eq!(smith.histogram.city_block(&doe.histogram), 8);
        assert_eq!(doe.histogram.city_block(&smith.histogram), 8);
        assert_eq!(
            smith.histogram.city_block(&LetterHistogram::default()),
            5
        );
    }

    #[test]
    fn test_display_key_short_kept() {
        let budget = DisplayBudget {
            lower: 8.0,
            upper: 10.0,
        };
        assert_eq!(display_key("Smith2020", &CharCount, budget), "Smith2020");
        assert_eq!(display_key("Smith2020a", &CharCount, budget), "Smith2020a");
    }

    #[test]
    fn test_display_key_truncated_to_lower_bound() {
        let budget = DisplayBudget {
            lower: 8.0,
            upper: 10.0,
        };
        assert_eq!(
            display_key("SmithJones2020", &CharCount, budget),
            "SmithJon..."
        );
    }

    #[test]
    fn test_display_key_custom_width() {
        let wide = |text: &str| 2.0 * text.chars().count() as f64;
        let budget = DisplayBudget {
            lower: 6.0,
            upper: 7.0,
        };
        assert_eq!(display_key("Gödel1931", &wide, budget), "Göd...");
    }

    #[test]
    fn test_builder_deduplicates_authors() {
        let index = AuthorIndex::from_records(vec![
            SourceRecord::new("Smith", "John", date(2020, 1, 1), "smith2020"),
            SourceRecord::new("Smith", "John", date(2022, 5, 3), "smith2022"),
            SourceRecord::new("Smith", "John", date(2021, 1, 1), "smith2020"),
            SourceRecord::new("Doe", "Jane", date(2019, 1, 1), "doe2019"),
        ]);

        assert_eq!(index.len(), 2);
        let smith = index.author(index.position("Smith, John").unwrap());
        assert_eq!(smith.citation_keys, vec!["smith2020", "smith2022"]);
        assert_eq!(smith.display_keys, vec!["smith2020", "smith2022"]);
        assert_eq!(smith.most_recent_date, date(2022, 5, 3));
    }

    #[test]
    fn test_builder_sorts_by_author_key() {
        let index = AuthorIndex::from_records(vec![
            SourceRecord::new("Smith", "Jon", date(2020, 1, 1), "a"),
            SourceRecord::new("Doe", "Jane", date(2020, 1, 1), "b"),
            SourceRecord::new("Smith", "John", date(2020, 1, 1), "c"),
        ]);

        let keys: Vec<String> = index.authors().iter().map(AuthorRecord::key).collect();
        assert_eq!(keys, vec!["Doe, Jane", "Smith, John", "Smith, Jon"]);
        assert_eq!(index.position("Smith, Jon"), Some(2));
        assert_eq!(index.position("Nobody, X"), None);
        assert_eq!(index.get(0).map(AuthorRecord::key).as_deref(), Some("Doe, Jane"));
        assert!(index.get(3).is_none());
    }

    #[test]
    fn test_diacritic_variants_are_distinct_authors() {
        let index = AuthorIndex::from_records(vec![
            SourceRecord::new("Gödel", "Kurt", date(2020, 1, 1), "a"),
            SourceRecord::new("Godel", "Kurt", date(2020, 1, 1), "b"),
        ]);

        assert_eq!(index.len(), 2);
        let names: Vec<&str> = (0..2)
            .map(|i| index.names(i, false).last.text.as_str())
            .collect();
        assert_eq!(names, vec!["Godel", "Godel"]);
        assert_eq!(index.names(1, true).last.text, "Gödel");
    }

    #[test]
    fn test_plain_names_from_source_win() {
        let index = AuthorIndex::from_records(vec![SourceRecord::new(
            "Łukasiewicz",
            "Jan",
            date(2020, 1, 1),
            "a",
        )
        .with_plain("Lukasiewicz", "Jan")]);

        assert_eq!(index.author(0).last_name_plain, "Lukasiewicz");
    }

    #[test]
    fn test_abbreviation_flags() {
        let index = AuthorIndex::from_records(vec![
            SourceRecord::new("Adams", "E. M.", date(2020, 1, 1), "a"),
            SourceRecord::new("Adams", "Ernest", date(2020, 1, 1), "b"),
        ]);
        assert_eq!(index.abbreviated(), &[true, false]);
    }
}
