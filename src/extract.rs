//! Table extraction entry points and the strategy chain behind them.
//!
//! Each strategy turns a document (or a few of its pages) into candidate
//! grids. The chain runs strategies in order, records what every attempt
//! produced, and only reports an error once no strategy found anything.

use serde::Serialize;
use tracing::{debug, warn};

use crate::column_map::project_columns;
use crate::error::MergeError;
use crate::header::{detected_to_table, header_warning};
use crate::lattice::LatticeExtractor;
use crate::layout::{PageLayout, page_layout};
use crate::model::{DetectedTable, Table, TablePair};
use crate::normalize::normalize;
use crate::options::{ExtractOptions, TitleQuery};
use crate::pdf_reader::PdfDocument;
use crate::table_detect::{LOW_CONFIDENCE_THRESHOLD, LayoutExtractor, detect_tables_in_text};
use crate::title_match::{TitleMatch, find_title, page_lines};
use crate::warning::{ExtractWarning, WarningCode};

pub trait TableStrategy {
    fn name(&self) -> &'static str;

    /// Candidate grids found on `pages`, in page order then top to bottom.
    fn extract(
        &self,
        document: &PdfDocument,
        pages: &[u32],
    ) -> Result<Vec<DetectedTable>, MergeError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Found { tables: usize },
    Empty,
    Failed { reason: String },
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub strategy: &'static str,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Result of an extraction plus the trail of strategy attempts behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub output: T,
    pub attempts: Vec<Attempt>,
    pub warnings: Vec<ExtractWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TitledTable {
    pub table: Table,
    pub page: u32,
    pub title_match: TitleMatch,
    pub candidate_count: usize,
}

#[derive(Default)]
pub struct ExtractorChain {
    strategies: Vec<Box<dyn TableStrategy>>,
    disabled: Vec<&'static str>,
}

struct ChainRun {
    tables: Vec<DetectedTable>,
    attempts: Vec<Attempt>,
}

impl ExtractorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(mut self, strategy: impl TableStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Records a strategy that is configured off, so reports show it was
    /// skipped rather than silently missing.
    #[must_use]
    pub fn disabled(mut self, name: &'static str) -> Self {
        self.disabled.push(name);
        self
    }

    /// Structural extraction (when enabled) followed by `fallback`.
    #[must_use]
    pub fn structural_then(
        options: &ExtractOptions,
        fallback: impl TableStrategy + 'static,
    ) -> Self {
        Self::with_structural(options, LatticeExtractor::default(), fallback)
    }

    fn with_structural(
        options: &ExtractOptions,
        structural: impl TableStrategy + 'static,
        fallback: impl TableStrategy + 'static,
    ) -> Self {
        let chain = if options.structural {
            Self::new().then(structural)
        } else {
            Self::new().disabled(structural.name())
        };
        chain.then(fallback)
    }

    /// Runs strategies in order, appending their candidates, until at least
    /// `wanted` candidates exist.
    fn run(&self, document: &PdfDocument, pages: &[u32], wanted: usize) -> ChainRun {
        let mut attempts = self
            .disabled
            .iter()
            .map(|strategy| Attempt {
                strategy,
                outcome: AttemptOutcome::Disabled,
            })
            .collect::<Vec<_>>();
        let mut tables = Vec::new();

        for strategy in &self.strategies {
            if tables.len() >= wanted {
                break;
            }
            let outcome = match strategy.extract(document, pages) {
                Ok(found) if found.is_empty() => AttemptOutcome::Empty,
                Ok(found) => {
                    let count = found.len();
                    tables.extend(found);
                    AttemptOutcome::Found { tables: count }
                }
                Err(error) => {
                    debug!(
                        strategy = strategy.name(),
                        %error,
                        "table strategy failed; trying next"
                    );
                    AttemptOutcome::Failed {
                        reason: error.to_string(),
                    }
                }
            };
            debug!(strategy = strategy.name(), ?outcome, "table strategy attempted");
            attempts.push(Attempt {
                strategy: strategy.name(),
                outcome,
            });
        }

        ChainRun { tables, attempts }
    }
}

/// Baseline of the visual line that carries `title_line`. `occurrence` picks
/// among identical lines; otherwise the first line containing it is used.
fn title_baseline(layout: &PageLayout, title_line: &str, occurrence: usize) -> Option<f32> {
    let wanted = normalize(title_line);
    if wanted.is_empty() {
        return None;
    }

    let lines = layout
        .text_lines()
        .into_iter()
        .map(|(baseline, text)| (baseline, normalize(&text)))
        .collect::<Vec<_>>();
    lines
        .iter()
        .filter(|(_, text)| *text == wanted)
        .nth(occurrence)
        .or_else(|| lines.iter().find(|(_, text)| text.contains(&wanted)))
        .map(|(baseline, _)| *baseline)
}

/// Ruled-grid extraction limited to grids that start at or below the title.
struct TitleAnchoredLattice {
    extractor: LatticeExtractor,
    /// First matched title line and the number of identical lines before it.
    /// Page-level matches have no anchor and keep every grid.
    anchor: Option<(String, usize)>,
}

impl TableStrategy for TitleAnchoredLattice {
    fn name(&self) -> &'static str {
        self.extractor.name()
    }

    fn extract(
        &self,
        document: &PdfDocument,
        pages: &[u32],
    ) -> Result<Vec<DetectedTable>, MergeError> {
        let mut tables = Vec::new();
        for &page in pages {
            let layout = page_layout(document, page)?;
            let anchor_y = self.anchor.as_ref().and_then(|(line, occurrence)| {
                title_baseline(&layout, line, *occurrence)
            });
            if self.anchor.is_some() && anchor_y.is_none() {
                debug!(page, "title line not placed on the page; using every grid");
            }
            tables.extend(self.extractor.tables_below(&layout, anchor_y));
        }
        Ok(tables)
    }
}

/// Layout extraction that looks below a located title first and falls back
/// to the whole page.
struct TitleAnchoredLayout {
    extractor: LayoutExtractor,
    title_match: TitleMatch,
}

impl TableStrategy for TitleAnchoredLayout {
    fn name(&self) -> &'static str {
        self.extractor.name()
    }

    fn extract(
        &self,
        document: &PdfDocument,
        pages: &[u32],
    ) -> Result<Vec<DetectedTable>, MergeError> {
        let min_cols = self.extractor.min_cols.max(2);
        let mut tables = Vec::new();
        for page in pages.iter().filter_map(|&page| document.page(page)) {
            let lines = page_lines(&page.text);
            if let Some(line) = self.title_match.line {
                let start = (line + self.title_match.span()).min(lines.len());
                let following = lines[start..].join("\n");
                let below = detect_tables_in_text(page.page_number, &following, min_cols);
                if !below.is_empty() {
                    tables.extend(below);
                    continue;
                }
            }
            tables.extend(detect_tables_in_text(
                page.page_number,
                &lines.join("\n"),
                min_cols,
            ));
        }
        Ok(tables)
    }
}

fn validate(options: &ExtractOptions) -> Result<(), MergeError> {
    if options.min_cols < 2 {
        return Err(MergeError::InvalidOption("min_cols must be at least 2".to_string()));
    }
    Ok(())
}

fn collect_warnings(run: &ChainRun) -> Vec<ExtractWarning> {
    let mut warnings = Vec::new();

    for attempt in &run.attempts {
        if let AttemptOutcome::Failed { reason } = &attempt.outcome {
            warnings.push(
                ExtractWarning::new(
                    WarningCode::StructuralFallback,
                    format!("{} extraction failed ({reason}); used fallback", attempt.strategy),
                )
                .with_source(attempt.strategy),
            );
        }
    }

    for (index, table) in run.tables.iter().enumerate() {
        if table.confidence < LOW_CONFIDENCE_THRESHOLD {
            warn!(page = table.page, confidence = table.confidence, "low-confidence table");
            warnings.push(
                ExtractWarning::new(
                    WarningCode::LowConfidence,
                    "table column structure is inconsistent; kept in best-effort mode",
                )
                .with_page(table.page)
                .with_table_id(index)
                .with_confidence(table.confidence),
            );
        }
    }

    warnings
}

/// Picks the two candidate indexes to use. Without explicit indexes the
/// first two candidates are used, or the only one twice.
pub(crate) fn select_indexes(
    available: usize,
    requested: Option<(usize, usize)>,
) -> Result<(usize, usize), MergeError> {
    let (first, mut second) = requested.unwrap_or(if available > 1 { (0, 1) } else { (0, 0) });
    if first == second && available > 1 {
        second = if first == 1 { 0 } else { 1 };
    }

    if first >= available || second >= available {
        return Err(MergeError::Selection {
            requested: requested.unwrap_or((first, second)),
            available,
        });
    }
    Ok((first, second))
}

/// Extracts two tables from the whole document.
pub fn extract_two_tables(
    document: &PdfDocument,
    options: &ExtractOptions,
) -> Result<Extraction<TablePair>, MergeError> {
    validate(options)?;

    let pages = document
        .pages()
        .iter()
        .map(|page| page.page_number)
        .collect::<Vec<_>>();
    let chain = ExtractorChain::structural_then(
        options,
        LayoutExtractor {
            min_cols: options.min_cols,
        },
    );
    let run = chain.run(document, &pages, 2);

    if run.tables.is_empty() {
        return Err(MergeError::NotFound(format!("tables in '{}'", document.source())));
    }

    let indexes = select_indexes(run.tables.len(), options.table_indexes)?;
    debug!(candidates = run.tables.len(), ?indexes, "selected document tables");
    let (first, second) = (&run.tables[indexes.0], &run.tables[indexes.1]);
    let output = TablePair {
        table1: detected_to_table(first),
        table2: detected_to_table(second),
        indexes,
        candidate_count: run.tables.len(),
    };

    let mut warnings = collect_warnings(&run);
    warnings.extend(header_warning(first, &output.table1, indexes.0));
    if indexes.1 != indexes.0 {
        warnings.extend(header_warning(second, &output.table2, indexes.1));
    }

    Ok(Extraction {
        output,
        warnings,
        attempts: run.attempts,
    })
}

/// Extracts the table that follows `query`'s title, optionally projected onto
/// `required_columns`.
pub fn extract_table_by_title<S: AsRef<str>>(
    document: &PdfDocument,
    query: &TitleQuery,
    required_columns: &[S],
    options: &ExtractOptions,
) -> Result<Extraction<TitledTable>, MergeError> {
    validate(options)?;

    let located = document.pages().iter().find_map(|page| {
        let lines = page_lines(&page.text);
        find_title(&lines, query).map(|found| (page.page_number, found, lines))
    });
    let Some((page, title_match, lines)) = located else {
        return Err(MergeError::NotFound(format!(
            "title '{}' on any page of '{}'",
            query.title,
            document.source()
        )));
    };
    debug!(page, tier = ?title_match.tier, "located table title");

    let anchor = title_match.line.and_then(|index| {
        let line = lines.get(index)?;
        let wanted = normalize(line);
        let occurrence = lines[..index]
            .iter()
            .filter(|earlier| normalize(earlier) == wanted)
            .count();
        Some((line.clone(), occurrence))
    });
    let chain = ExtractorChain::with_structural(
        options,
        TitleAnchoredLattice {
            extractor: LatticeExtractor::default(),
            anchor,
        },
        TitleAnchoredLayout {
            extractor: LayoutExtractor {
                min_cols: options.min_cols,
            },
            title_match,
        },
    );
    let run = chain.run(document, &[page], 1);

    let Some(detected) = run.tables.first() else {
        return Err(MergeError::NotFound(format!(
            "table under title '{}' on page {page} of '{}'",
            query.title,
            document.source()
        )));
    };

    let mut table = detected_to_table(detected);
    let mut warnings = collect_warnings(&run);
    warnings.extend(header_warning(detected, &table, 0));
    if !required_columns.is_empty() {
        table = project_columns(&table, required_columns);
    }

    Ok(Extraction {
        output: TitledTable {
            table,
            page,
            title_match,
            candidate_count: run.tables.len(),
        },
        warnings,
        attempts: run.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::{select_indexes, title_baseline};
    use crate::error::MergeError;
    use crate::layout::{PageLayout, TextBox};

    fn text(text: &str, x: f32, y: f32) -> TextBox {
        TextBox {
            text: text.to_string(),
            x,
            y,
            width: 30.0,
            height: 10.0,
        }
    }

    #[test]
    fn title_baseline_follows_repeated_lines() {
        let layout = PageLayout {
            page_number: 1,
            text_boxes: vec![
                text("Limits", 50.0, 708.0),
                text("Note:", 50.0, 600.0),
                text("see", 90.0, 600.0),
                text("Limits", 50.0, 508.0),
                text("Table 3 -", 50.0, 300.0),
                text("Ratings", 110.0, 300.0),
            ],
            lines: Vec::new(),
        };

        assert_eq!(title_baseline(&layout, "Limits", 0), Some(708.0));
        assert_eq!(title_baseline(&layout, " LIMITS ", 1), Some(508.0));
        assert_eq!(title_baseline(&layout, "Ratings", 0), Some(300.0));
        assert_eq!(title_baseline(&layout, "Summary", 0), None);
        assert_eq!(title_baseline(&layout, "  ", 0), None);
    }

    #[test]
    fn defaults_to_first_two_candidates() {
        assert_eq!(select_indexes(3, None).ok(), Some((0, 1)));
        assert_eq!(select_indexes(1, None).ok(), Some((0, 0)));
    }

    #[test]
    fn coinciding_indexes_pick_a_distinct_second() {
        assert_eq!(select_indexes(3, Some((2, 2))).ok(), Some((2, 1)));
        assert_eq!(select_indexes(3, Some((1, 1))).ok(), Some((1, 0)));
        assert_eq!(select_indexes(1, Some((0, 0))).ok(), Some((0, 0)));
    }

    #[test]
    fn out_of_range_indexes_report_the_request() {
        let error = select_indexes(2, Some((0, 5))).expect_err("index 5 should not resolve");
        assert!(matches!(
            error,
            MergeError::Selection {
                requested: (0, 5),
                available: 2
            }
        ));
        assert!(error.to_string().contains("0 and 5"));
    }
}
