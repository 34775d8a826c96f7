//! Tolerant lookup of a table title inside page text.
//!
//! PDF text extraction wraps, hyphenates and mangles titles, so matching
//! escalates through four tiers and stops at the first one that succeeds:
//! exact line, partial line (substring or token coverage), two adjacent lines
//! joined, and finally Jaccard similarity against every token on the page.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::normalize::{normalize, rejoin_hyphenated, tokenize};
use crate::options::TitleQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ExactLine,
    Partial,
    TwoLine,
    Jaccard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleMatch {
    pub tier: MatchTier,
    /// Index of the first line of the matched span. Page-level Jaccard
    /// matches have no line.
    pub line: Option<usize>,
}

impl TitleMatch {
    /// Number of lines the matched span covers.
    #[must_use]
    pub fn span(&self) -> usize {
        match self.tier {
            MatchTier::TwoLine => 2,
            MatchTier::Jaccard => 0,
            MatchTier::ExactLine | MatchTier::Partial => 1,
        }
    }
}

fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn jaccard(left: &BTreeSet<String>, right: &BTreeSet<String>) -> f64 {
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(right).count();
    let union = left.union(right).count();
    intersection as f64 / union as f64
}

/// Fraction of `reference` tokens present in `candidate`.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn token_coverage(reference: &BTreeSet<String>, candidate: &BTreeSet<String>) -> f64 {
    if reference.is_empty() {
        return 0.0;
    }
    let found = reference.intersection(candidate).count();
    found as f64 / reference.len() as f64
}

/// Splits page text into lines after rejoining hyphenated line wraps.
#[must_use]
pub fn page_lines(text: &str) -> Vec<String> {
    rejoin_hyphenated(text).lines().map(str::to_string).collect()
}

struct Target {
    text: String,
    tokens: BTreeSet<String>,
}

impl Target {
    fn partially_matches(&self, line: &str, query: &TitleQuery) -> bool {
        line.contains(&self.text)
            || token_coverage(&self.tokens, &token_set(line)) >= query.min_token_coverage
    }
}

#[must_use]
pub fn find_title<S: AsRef<str>>(lines: &[S], query: &TitleQuery) -> Option<TitleMatch> {
    let target = Target {
        text: normalize(&query.title),
        tokens: token_set(&query.title),
    };
    if target.text.is_empty() {
        return None;
    }

    let normalized = lines
        .iter()
        .map(|line| normalize(line.as_ref()))
        .collect::<Vec<_>>();

    if let Some(index) = normalized.iter().position(|line| *line == target.text) {
        return Some(TitleMatch {
            tier: MatchTier::ExactLine,
            line: Some(index),
        });
    }

    if query.allow_partial {
        if let Some(index) = normalized
            .iter()
            .position(|line| target.partially_matches(line, query))
        {
            return Some(TitleMatch {
                tier: MatchTier::Partial,
                line: Some(index),
            });
        }
    }

    let two_line = lines.windows(2).position(|pair| {
        let joined = normalize(&format!("{} {}", pair[0].as_ref(), pair[1].as_ref()));
        joined == target.text || (query.allow_partial && target.partially_matches(&joined, query))
    });
    if let Some(index) = two_line {
        return Some(TitleMatch {
            tier: MatchTier::TwoLine,
            line: Some(index),
        });
    }

    let page_tokens = lines
        .iter()
        .flat_map(|line| tokenize(line.as_ref()))
        .collect::<BTreeSet<_>>();
    if jaccard(&target.tokens, &page_tokens) >= query.jaccard_threshold {
        return Some(TitleMatch {
            tier: MatchTier::Jaccard,
            line: None,
        });
    }

    None
}

#[must_use]
pub fn page_contains_title<S: AsRef<str>>(lines: &[S], query: &TitleQuery) -> bool {
    find_title(lines, query).is_some()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{MatchTier, find_title, jaccard, page_contains_title, page_lines, token_coverage};
    use crate::options::TitleQuery;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|item| (*item).to_string()).collect()
    }

    #[test]
    fn jaccard_boundaries() {
        assert!((jaccard(&set(&[]), &set(&[])) - 1.0).abs() < f64::EPSILON);
        assert!(jaccard(&set(&[]), &set(&["x"])).abs() < f64::EPSILON);
        assert!((jaccard(&set(&["a", "b"]), &set(&["a", "b"])) - 1.0).abs() < f64::EPSILON);
        assert!((jaccard(&set(&["a", "b"]), &set(&["a", "c"])) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn coverage_of_empty_reference_is_zero() {
        assert!(token_coverage(&set(&[]), &set(&["a"])).abs() < f64::EPSILON);
        assert!((token_coverage(&set(&["a", "b"]), &set(&["a"])) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn exact_line_wins_first() {
        let lines = ["Intro", "  PARAMETER   table results ", "x  y"];
        let found = find_title(&lines, &TitleQuery::new("Parameter Table Results"))
            .expect("title should match");
        assert_eq!(found.tier, MatchTier::ExactLine);
        assert_eq!(found.line, Some(1));
    }

    #[test]
    fn substring_match_needs_partial_flag() {
        let lines = ["Table 2: Parameter Table Results (measured)"];
        let query = TitleQuery::new("Parameter Table Results");
        let found = find_title(&lines, &query).expect("substring should match");
        assert_eq!(found.tier, MatchTier::Partial);

        let strict = query.exact_only().with_jaccard_threshold(0.9);
        assert!(!page_contains_title(&lines, &strict));
    }

    #[test]
    fn ocr_noise_matches_through_token_coverage() {
        let lines = ["Measured Parameter Tab1e Results Summary", "a  b"];
        let query = TitleQuery::new("Measured Parameter Table Results Summary")
            .with_jaccard_threshold(1.0);
        let found = find_title(&lines, &query).expect("coverage should match");
        assert_eq!(found.tier, MatchTier::Partial);
    }

    #[test]
    fn ocr_noise_below_coverage_does_not_match_a_line() {
        let lines = ["Parameter Tab1e Resu1ts"];
        let query = TitleQuery::new("Parameter Table Results");
        assert!(!page_contains_title(&lines, &query));
        let relaxed = query.with_min_token_coverage(0.3);
        assert_eq!(
            find_title(&lines, &relaxed).map(|found| found.tier),
            Some(MatchTier::Partial)
        );
    }

    #[test]
    fn title_wrapped_across_two_lines() {
        let lines = ["Header", "Parameter Table", "Results", "Body text."];
        let query = TitleQuery::new("Parameter Table Results").with_min_token_coverage(1.0);
        let found = find_title(&lines, &query).expect("two-line join should match");
        assert_eq!(found.tier, MatchTier::TwoLine);
        assert_eq!(found.line, Some(1));
        assert_eq!(found.span(), 2);
    }

    #[test]
    fn exact_only_two_line_join_needs_equality() {
        let query = TitleQuery::new("Parameter Table Results")
            .exact_only()
            .with_jaccard_threshold(0.9);

        let wrapped = ["Parameter Table", "Results"];
        let found = find_title(&wrapped, &query).expect("exact two-line join should match");
        assert_eq!(found.tier, MatchTier::TwoLine);
        assert_eq!(found.line, Some(0));

        let annotated = ["Parameter Table", "Results (measured)"];
        assert!(!page_contains_title(&annotated, &query));

        let partial = TitleQuery::new("Parameter Table Results").with_jaccard_threshold(0.9);
        let found = find_title(&annotated, &partial).expect("partial two-line join should match");
        assert_eq!(found.tier, MatchTier::TwoLine);
    }

    #[test]
    fn jaccard_fallback_over_whole_page() {
        let lines = ["results", "for", "parameter"];
        let query = TitleQuery::new("Parameter Results").with_min_token_coverage(1.1);
        let found = find_title(&lines, &query).expect("page jaccard should match");
        assert_eq!(found.tier, MatchTier::Jaccard);
        assert_eq!(found.line, None);
    }

    #[test]
    fn hyphenated_title_is_rejoined() {
        let lines = page_lines("Calibra-\ntion Data\nA  B");
        assert!(page_contains_title(&lines, &TitleQuery::new("Calibration Data")));
    }

    #[test]
    fn empty_title_never_matches() {
        assert!(!page_contains_title(&[""], &TitleQuery::new("  ")));
    }
}
