mod column_map;
mod csv_out;
mod enrich;
mod error;
mod extract;
mod header;
mod lattice;
mod layout;
mod loader;
mod merge;
mod model;
mod normalize;
mod options;
mod pdf_reader;
mod table_detect;
mod table_parse;
mod title_match;
mod warning;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

pub use column_map::{map_column, project_columns};
pub use csv_out::{write_records, write_records_to_string};
pub use enrich::{DEFAULT_CUTOFF, EnrichSpec, UNKNOWN, enrich, similarity};
pub use error::MergeError;
pub use extract::{
    Attempt, AttemptOutcome, Extraction, ExtractorChain, TableStrategy, TitledTable,
    extract_table_by_title, extract_two_tables,
};
pub use lattice::LatticeExtractor;
pub use layout::{LineSegment, PageLayout, TextBox, page_layout};
pub use loader::{LoadedTable, PARAMETER_TABLE_COLUMNS, load_reference_table};
pub use merge::{MergeOutcome, infer_join_key, merge};
pub use model::{
    CellValue, DetectedTable, MergedRecord, PageText, Row, Table, TableOrigin, TablePair,
};
pub use normalize::{
    collapse_cell, normalize, normalize_preserving_lines, rejoin_hyphenated, tokenize,
};
pub use options::{
    DEFAULT_JACCARD_THRESHOLD, DEFAULT_MIN_TOKEN_COVERAGE, ExtractOptions, PageSelection,
    TitleQuery, parse_table_indexes,
};
pub use pdf_reader::PdfDocument;
pub use table_detect::LayoutExtractor;
pub use title_match::{
    MatchTier, TitleMatch, find_title, jaccard, page_contains_title, page_lines, token_coverage,
};
pub use warning::{ExtractWarning, WarningCode};

/// Inputs of one document-to-CSV merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequest {
    pub document: PathBuf,
    /// Reference tables. The first one, when present, leads the merge and is
    /// expected to have three columns.
    pub references: Vec<PathBuf>,
    pub join_key: Option<String>,
    pub output: PathBuf,
    /// Extract the single table under this title instead of two tables from
    /// the whole document.
    pub title: Option<TitleQuery>,
    /// Columns to project the titled table onto.
    pub required_columns: Vec<String>,
    pub options: ExtractOptions,
}

impl MergeRequest {
    pub fn new(document: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            references: Vec::new(),
            join_key: None,
            output: output.into(),
            title: None,
            required_columns: Vec::new(),
            options: ExtractOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeReport {
    pub output: PathBuf,
    pub join_key: Option<String>,
    pub record_count: usize,
    pub candidate_count: usize,
    pub attempts: Vec<Attempt>,
    pub warnings: Vec<ExtractWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TitleExtractReport {
    pub output: PathBuf,
    pub page: u32,
    pub tier: MatchTier,
    pub row_count: usize,
    pub attempts: Vec<Attempt>,
    pub warnings: Vec<ExtractWarning>,
}

struct DocumentTables {
    tables: Vec<Table>,
    candidate_count: usize,
    attempts: Vec<Attempt>,
    warnings: Vec<ExtractWarning>,
}

fn document_tables(
    document: &PdfDocument,
    request: &MergeRequest,
) -> Result<DocumentTables, MergeError> {
    if let Some(query) = &request.title {
        let extraction =
            extract_table_by_title(document, query, &request.required_columns, &request.options)?;
        return Ok(DocumentTables {
            candidate_count: extraction.output.candidate_count,
            tables: vec![extraction.output.table],
            attempts: extraction.attempts,
            warnings: extraction.warnings,
        });
    }

    let extraction = extract_two_tables(document, &request.options)?;
    let pair = extraction.output;
    Ok(DocumentTables {
        candidate_count: pair.candidate_count,
        tables: vec![pair.table1, pair.table2],
        attempts: extraction.attempts,
        warnings: extraction.warnings,
    })
}

/// Extracts the document's tables, loads the reference tables, joins them and
/// writes the merged records as CSV.
///
/// The first reference table leads the merge, followed by the document tables
/// and the remaining reference tables. Without reference tables the first
/// document table leads.
pub fn run_merge(request: &MergeRequest) -> Result<MergeReport, MergeError> {
    let document = PdfDocument::open(&request.document, request.options.pages.as_ref())?;
    let extracted = document_tables(&document, request)?;
    let mut warnings = extracted.warnings;

    let mut references = Vec::with_capacity(request.references.len());
    for (position, path) in request.references.iter().enumerate() {
        let expected = (position == 0).then_some(PARAMETER_TABLE_COLUMNS);
        let loaded = load_reference_table(path, expected)?;
        warnings.extend(loaded.warning);
        references.push(loaded.table);
    }

    let mut references = references.into_iter();
    let (primary, secondaries) = match references.next() {
        Some(primary) => (primary, extracted.tables.into_iter().chain(references).collect()),
        None => {
            let mut tables = extracted.tables.into_iter();
            let primary = tables.next().unwrap_or_default();
            (primary, tables.collect::<Vec<_>>())
        }
    };

    let outcome = merge(&primary, &secondaries, request.join_key.as_deref());
    let output = write_records(&request.output, &outcome.records, request.options.delimiter)?;
    debug!(output = %output.display(), records = outcome.records.len(), "wrote merged records");

    Ok(MergeReport {
        output,
        join_key: outcome.join_key,
        record_count: outcome.records.len(),
        candidate_count: extracted.candidate_count,
        attempts: extracted.attempts,
        warnings,
    })
}

/// Writes the table found under `query`'s title to `output` as CSV.
pub fn extract_title_to_csv<S: AsRef<str>>(
    document: &Path,
    query: &TitleQuery,
    required_columns: &[S],
    output: &Path,
    options: &ExtractOptions,
) -> Result<TitleExtractReport, MergeError> {
    let document = PdfDocument::open(document, options.pages.as_ref())?;
    let extraction = extract_table_by_title(&document, query, required_columns, options)?;
    let titled = extraction.output;
    let output = write_records(output, titled.table.rows(), options.delimiter)?;

    Ok(TitleExtractReport {
        output,
        page: titled.page,
        tier: titled.title_match.tier,
        row_count: titled.table.len(),
        attempts: extraction.attempts,
        warnings: extraction.warnings,
    })
}
