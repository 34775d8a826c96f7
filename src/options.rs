use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    pages: BTreeSet<u32>,
}

impl PageSelection {
    #[must_use]
    pub fn contains(&self, page: u32) -> bool {
        self.pages.contains(&page)
    }

}

impl FromStr for PageSelection {
    type Err = String;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut pages = BTreeSet::new();
        for token in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some((start, end)) = token.split_once('-') {
                let start: u32 = start
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range start: '{start}'"))?;
                let end: u32 = end
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid page range end: '{end}'"))?;
                if start == 0 || end == 0 {
                    return Err("pages are 1-based".to_string());
                }
                if end < start {
                    return Err(format!(
                        "invalid range '{token}': end is smaller than start"
                    ));
                }
                pages.extend(start..=end);
            } else {
                let page: u32 = token
                    .parse()
                    .map_err(|_| format!("invalid page number: '{token}'"))?;
                if page == 0 {
                    return Err("pages are 1-based".to_string());
                }
                pages.insert(page);
            }
        }

        if pages.is_empty() {
            return Err("page selection cannot be empty".to_string());
        }

        Ok(Self { pages })
    }
}

/// Parses a `first,second` pair of 0-based candidate table indexes.
pub fn parse_table_indexes(spec: &str) -> Result<(usize, usize), String> {
    let (first, second) = spec
        .split_once(',')
        .ok_or_else(|| format!("invalid table indexes '{spec}', expected first,second"))?;
    let first: usize = first
        .trim()
        .parse()
        .map_err(|_| format!("invalid table index: '{}'", first.trim()))?;
    let second: usize = second
        .trim()
        .parse()
        .map_err(|_| format!("invalid table index: '{}'", second.trim()))?;
    Ok((first, second))
}

pub const DEFAULT_MIN_TOKEN_COVERAGE: f64 = 0.8;
pub const DEFAULT_JACCARD_THRESHOLD: f64 = 0.6;

/// Target title plus the tolerances used to find it on a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleQuery {
    pub title: String,
    pub allow_partial: bool,
    pub min_token_coverage: f64,
    pub jaccard_threshold: f64,
}

impl TitleQuery {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            allow_partial: true,
            min_token_coverage: DEFAULT_MIN_TOKEN_COVERAGE,
            jaccard_threshold: DEFAULT_JACCARD_THRESHOLD,
        }
    }

    #[must_use]
    pub fn exact_only(mut self) -> Self {
        self.allow_partial = false;
        self
    }

    #[must_use]
    pub fn with_min_token_coverage(mut self, coverage: f64) -> Self {
        self.min_token_coverage = coverage;
        self
    }

    #[must_use]
    pub fn with_jaccard_threshold(mut self, threshold: f64) -> Self {
        self.jaccard_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOptions {
    pub pages: Option<PageSelection>,
    /// Try the ruled-grid extractor before the text-layout one.
    pub structural: bool,
    pub table_indexes: Option<(usize, usize)>,
    pub min_cols: usize,
    pub delimiter: u8,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            pages: None,
            structural: true,
            table_indexes: None,
            min_cols: 2,
            delimiter: b',',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_JACCARD_THRESHOLD, DEFAULT_MIN_TOKEN_COVERAGE, PageSelection, TitleQuery,
        parse_table_indexes,
    };
    use std::str::FromStr;

    #[test]
    fn parse_page_selection_range_and_single() {
        let selection = PageSelection::from_str("1-3,5").expect("selection should parse");
        assert!(selection.contains(1));
        assert!(selection.contains(2));
        assert!(selection.contains(3));
        assert!(selection.contains(5));
        assert!(!selection.contains(4));
    }

    #[test]
    fn reject_invalid_page_selection() {
        let err = PageSelection::from_str("3-1").expect_err("invalid range should fail");
        assert!(err.contains("invalid range"));
    }

    #[test]
    fn parse_index_pair() {
        assert_eq!(parse_table_indexes("0, 2"), Ok((0, 2)));
        let err = parse_table_indexes("1").expect_err("single index should fail");
        assert!(err.contains("expected first,second"));
    }

    #[test]
    fn title_query_defaults() {
        let query = TitleQuery::new("Results");
        assert!(query.allow_partial);
        assert!((query.min_token_coverage - DEFAULT_MIN_TOKEN_COVERAGE).abs() < f64::EPSILON);
        assert!((query.jaccard_threshold - DEFAULT_JACCARD_THRESHOLD).abs() < f64::EPSILON);
        assert!((DEFAULT_MIN_TOKEN_COVERAGE - 0.8).abs() < f64::EPSILON);
        assert!(!query.exact_only().allow_partial);
    }
}
