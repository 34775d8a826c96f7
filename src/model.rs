use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// A single cell of a [`Table`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Null,
}

impl CellValue {
    /// Parses a raw cell the way delimited sources are read: blank is null,
    /// anything that reads as a finite number is numeric, the rest is text.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Self::Number(number),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Canonical text used to compare join keys across tables. Numeric and
    /// textual renderings of the same value compare equal; null and blank
    /// cells have no join text.
    #[must_use]
    pub fn as_join_text(&self) -> Option<String> {
        let text = self.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) if number.fract() == 0.0 && number.abs() < 1e15 => {
                write!(f, "{number:.0}")
            }
            Self::Number(number) => write!(f, "{number}"),
            Self::Null => Ok(()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for CellValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

/// Column name to cell, in column order.
pub type Row = IndexMap<String, CellValue>;

/// A row produced by the reconciler: primary columns followed by prefixed
/// secondary columns.
pub type MergedRecord = Row;

/// An immutable table whose rows all expose exactly `columns`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Builds a table from rows, filling absent cells with null and dropping
    /// keys that are not listed in `columns`.
    #[must_use]
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Self {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|column| {
                        let value = row.swap_remove(column).unwrap_or(CellValue::Null);
                        (column.clone(), value)
                    })
                    .collect::<Row>()
            })
            .collect();
        Self { columns, rows }
    }

    /// Builds a table from positional cells. Cells beyond `columns` are
    /// dropped; missing cells become empty text.
    #[must_use]
    pub fn from_text_grid(columns: Vec<String>, grid: Vec<Vec<String>>) -> Self {
        let rows = grid
            .into_iter()
            .map(|cells| {
                let mut cells = cells.into_iter();
                columns
                    .iter()
                    .map(|column| {
                        let value = cells.next().unwrap_or_default();
                        (column.clone(), CellValue::Text(value))
                    })
                    .collect::<Row>()
            })
            .collect();
        Self { columns, rows }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableOrigin {
    Structural,
    Layout,
}

/// A candidate grid found on a page. Row 0 is the header row.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTable {
    pub page: u32,
    pub rows: Vec<Vec<String>>,
    pub confidence: f32,
    pub origin: TableOrigin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePair {
    pub table1: Table,
    pub table2: Table,
    pub indexes: (usize, usize),
    pub candidate_count: usize,
}

#[cfg(test)]
mod tests {
    use super::{CellValue, Row, Table};

    #[test]
    fn renders_integral_numbers_without_fraction() {
        assert_eq!(CellValue::Number(100.0).to_string(), "100");
        assert_eq!(CellValue::Number(1.5).to_string(), "1.5");
        assert_eq!(CellValue::Null.to_string(), "");
    }

    #[test]
    fn infers_cell_kinds() {
        assert_eq!(CellValue::infer(" 42 "), CellValue::Number(42.0));
        assert_eq!(CellValue::infer(""), CellValue::Null);
        assert_eq!(CellValue::infer("A1"), CellValue::Text("A1".to_string()));
    }

    #[test]
    fn join_text_matches_across_kinds() {
        assert_eq!(
            CellValue::Number(7.0).as_join_text(),
            CellValue::from("7").as_join_text()
        );
        assert_eq!(CellValue::from("  ").as_join_text(), None);
        assert_eq!(CellValue::Null.as_join_text(), None);
    }

    #[test]
    fn from_rows_fills_gaps_in_column_order() {
        let mut row = Row::new();
        row.insert("b".to_string(), CellValue::from("x"));
        row.insert("extra".to_string(), CellValue::from("dropped"));
        let table = Table::from_rows(vec!["a".to_string(), "b".to_string()], vec![row]);

        let keys = table.rows()[0].keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(table.rows()[0]["a"].is_null());
    }
}
