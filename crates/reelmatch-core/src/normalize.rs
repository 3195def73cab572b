//! Title normalisation for cross-source comparison.
//!
//! Sources disagree on case, spacing, leading articles, and whether the
//! release year is appended to the title ("Devotion (2022)",
//! "Title (2016) Director's Cut"). Normalisation removes those differences
//! and nothing else: internal punctuation (colons, ampersands, apostrophes)
//! is kept because stripping it makes unrelated titles collide.

use once_cell::sync::Lazy;
use regex::Regex;

/// First "(" followed by four ASCII digits: the start of a year annotation.
static YEAR_ANNOTATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([0-9]{4}").unwrap());

const ARTICLES: &[&str] = &["the ", "a ", "an "];

/// Normalise a title for comparison.
///
/// Input: raw title like `"  The Ritual (2017)  "`
/// Output: `"ritual"`
///
/// # Algorithm
///
/// 1. Lower-case, trim, collapse whitespace runs to one space
/// 2. Cut everything from the first `(YYYY` onwards, then trim
/// 3. Drop one leading article (`the`, `a`, `an`) followed by a space,
///    unless what remains itself starts with an article ("The A Team"
///    keeps its article, so a second pass cannot strip again)
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(title: &str) -> String {
    let lowered = title.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");

    let without_year = match YEAR_ANNOTATION.find(&collapsed) {
        Some(m) => collapsed[..m.start()].trim_end(),
        None => collapsed.as_str(),
    };

    strip_leading_article(without_year).to_string()
}

fn strip_leading_article(s: &str) -> &str {
    for article in ARTICLES {
        if let Some(rest) = s.strip_prefix(article) {
            if starts_with_article(rest) {
                return s;
            }
            return rest;
        }
    }
    s
}

fn starts_with_article(s: &str) -> bool {
    ARTICLES.iter().any(|a| s.starts_with(a))
}
