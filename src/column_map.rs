use crate::model::{CellValue, Row, Table};
use crate::normalize::normalize;

/// Finds the extracted column that best stands for `requested`: normalized
/// equality first, then containment in either direction ("asset" vs "assets").
#[must_use]
pub fn map_column<'a, S: AsRef<str>>(existing: &'a [S], requested: &str) -> Option<&'a str> {
    let wanted = normalize(requested);
    let normalized = existing
        .iter()
        .map(|column| (column.as_ref(), normalize(column.as_ref())))
        .collect::<Vec<_>>();

    if let Some((column, _)) = normalized.iter().find(|(_, name)| *name == wanted) {
        return Some(*column);
    }

    if wanted.is_empty() {
        return None;
    }

    normalized
        .iter()
        .find(|(_, name)| !name.is_empty() && (name.contains(&wanted) || wanted.contains(name)))
        .map(|(column, _)| *column)
}

/// Re-projects `table` onto `requested` columns, in the requested order.
/// Columns that cannot be mapped are emitted as empty text.
#[must_use]
pub fn project_columns<S: AsRef<str>>(table: &Table, requested: &[S]) -> Table {
    let mapping = requested
        .iter()
        .map(|name| {
            let source = map_column(table.columns(), name.as_ref()).map(str::to_string);
            (name.as_ref().to_string(), source)
        })
        .collect::<Vec<_>>();

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            mapping
                .iter()
                .map(|(name, source)| {
                    let value = source
                        .as_ref()
                        .and_then(|source| row.get(source))
                        .cloned()
                        .unwrap_or_else(|| CellValue::Text(String::new()));
                    (name.clone(), value)
                })
                .collect::<Row>()
        })
        .collect();

    let columns = mapping.into_iter().map(|(name, _)| name).collect();
    Table::from_rows(columns, rows)
}
