//! Reference tables supplied next to the PDF: delimited text or spreadsheets.

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use csv::ReaderBuilder;
use tracing::{debug, warn};

use crate::error::MergeError;
use crate::header::normalize_header;
use crate::model::{CellValue, Row, Table};
use crate::warning::{ExtractWarning, WarningCode};

/// Column count expected of the parameter table that leads a merge.
pub const PARAMETER_TABLE_COLUMNS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub table: Table,
    /// Set when the column count differs from the expected one. Loading
    /// still succeeds.
    pub warning: Option<ExtractWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Delimited(u8),
    Spreadsheet,
}

fn source_kind(path: &Path) -> Option<SourceKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "csv" | "txt" => Some(SourceKind::Delimited(b',')),
        "tsv" => Some(SourceKind::Delimited(b'\t')),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(SourceKind::Spreadsheet),
        _ => None,
    }
}

pub fn load_reference_table(
    path: &Path,
    expected_columns: Option<usize>,
) -> Result<LoadedTable, MergeError> {
    if !path.is_file() {
        return Err(MergeError::input(path, "file does not exist"));
    }
    let kind = source_kind(path)
        .ok_or_else(|| MergeError::input(path, "unsupported reference table format"))?;

    let (header, rows) = match kind {
        SourceKind::Delimited(delimiter) => read_delimited(path, delimiter)?,
        SourceKind::Spreadsheet => read_spreadsheet(path)?,
    };
    let table = build_table(&header, rows);
    debug!(
        path = %path.display(),
        columns = table.columns().len(),
        rows = table.len(),
        "loaded reference table"
    );

    let warning = expected_columns
        .filter(|&expected| expected != table.columns().len())
        .map(|expected| {
            warn!(
                path = %path.display(),
                expected,
                found = table.columns().len(),
                "reference table has an unexpected number of columns"
            );
            ExtractWarning::new(
                WarningCode::UnexpectedColumnCount,
                format!(
                    "expected {expected} columns, found {}; continuing",
                    table.columns().len()
                ),
            )
            .with_source(path.display().to_string())
        });

    Ok(LoadedTable { table, warning })
}

fn read_delimited(
    path: &Path,
    delimiter: u8,
) -> Result<(Vec<String>, Vec<Vec<CellValue>>), MergeError> {
    let bytes = std::fs::read(path).map_err(|error| MergeError::input(path, error.to_string()))?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let header = reader
        .headers()?
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(CellValue::infer).collect());
    }
    Ok((header, rows))
}

fn read_spreadsheet(path: &Path) -> Result<(Vec<String>, Vec<Vec<CellValue>>), MergeError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|error| MergeError::input(path, format!("not a readable spreadsheet: {error}")))?;
    let Some(first_sheet) = workbook.sheet_names().first().cloned() else {
        return Err(MergeError::input(path, "workbook has no sheets"));
    };
    let range = workbook.worksheet_range(&first_sheet)?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .map(|cells| cells.iter().map(|cell| cell_value(cell).to_string()).collect())
        .unwrap_or_default();
    let rows = rows
        .map(|cells| cells.iter().map(cell_value).collect::<Vec<_>>())
        .filter(|cells| cells.iter().any(|cell| !cell.is_null()))
        .collect();
    Ok((header, rows))
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Null,
        Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
            CellValue::infer(text)
        }
        Data::Float(number) => CellValue::Number(*number),
        Data::Int(number) => CellValue::from(*number),
        Data::Bool(flag) => CellValue::Text(flag.to_string()),
        Data::DateTime(datetime) => CellValue::Number(datetime.as_f64()),
        Data::Error(error) => CellValue::Text(error.to_string()),
    }
}

fn build_table(raw_header: &[String], rows: Vec<Vec<CellValue>>) -> Table {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let columns = normalize_header(raw_header, width);
    let rows = rows
        .into_iter()
        .map(|cells| columns.iter().cloned().zip(cells).collect::<Row>())
        .collect();
    Table::from_rows(columns, rows)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use calamine::Data;
    use pretty_assertions::assert_eq;

    use super::{cell_value, load_reference_table};
    use crate::error::MergeError;
    use crate::model::CellValue;
    use crate::warning::WarningCode;

    #[test]
    fn loads_csv_with_inferred_cells() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("params.csv");
        fs::write(&path, "id,name,limit\nA,Alpha,10\nB,,2.5\n").expect("fixture should be written");

        let loaded = load_reference_table(&path, Some(3)).expect("csv should load");
        assert!(loaded.warning.is_none());
        assert_eq!(loaded.table.columns(), ["id", "name", "limit"]);
        assert_eq!(loaded.table.rows()[0]["limit"], CellValue::Number(10.0));
        assert!(loaded.table.rows()[1]["name"].is_null());
    }

    #[test]
    fn tsv_uses_tabs_and_pads_short_rows() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("map.tsv");
        fs::write(&path, "key\tvalue\nx\t1\ny\n").expect("fixture should be written");

        let loaded = load_reference_table(&path, None).expect("tsv should load");
        assert_eq!(loaded.table.len(), 2);
        assert!(loaded.table.rows()[1]["value"].is_null());
    }

    #[test]
    fn unexpected_column_count_is_a_warning() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("wide.csv");
        fs::write(&path, "a,b,c,d\n1,2,3,4\n").expect("fixture should be written");

        let loaded = load_reference_table(&path, Some(3)).expect("wide csv should still load");
        let warning = loaded.warning.expect("column-count warning should be attached");
        assert_eq!(warning.code, WarningCode::UnexpectedColumnCount);
        assert_eq!(loaded.table.columns().len(), 4);
    }

    #[test]
    fn blank_and_repeated_headers_are_renamed() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("dupes.csv");
        fs::write(&path, "Name,,Name\nx,y,z\n").expect("fixture should be written");

        let loaded = load_reference_table(&path, None).expect("csv should load");
        assert_eq!(loaded.table.columns(), ["Name", "col_1", "Name_2"]);
    }

    #[test]
    fn missing_and_unsupported_inputs_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let missing = load_reference_table(&dir.path().join("absent.csv"), None);
        assert!(matches!(missing, Err(MergeError::Input { .. })));

        let path = dir.path().join("table.json");
        fs::write(&path, "[]").expect("fixture should be written");
        let unsupported = load_reference_table(&path, None);
        assert!(matches!(unsupported, Err(MergeError::Input { .. })));
    }

    #[test]
    fn spreadsheet_cells_map_to_cell_values() {
        assert_eq!(cell_value(&Data::Empty), CellValue::Null);
        assert_eq!(cell_value(&Data::Int(4)), CellValue::Number(4.0));
        assert_eq!(cell_value(&Data::Float(2.5)), CellValue::Number(2.5));
        assert_eq!(cell_value(&Data::String(" A1 ".to_owned())), CellValue::from("A1"));
        assert_eq!(cell_value(&Data::Bool(true)), CellValue::from("true"));
    }
}
