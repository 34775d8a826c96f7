use std::collections::HashSet;

use crate::model::{DetectedTable, Table};
use crate::normalize::collapse_cell;
use crate::warning::{ExtractWarning, WarningCode};

/// Returns `base` if it is free, otherwise the first `base_{n}` (n >= 2) that
/// is not in `taken`.
pub(crate) fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (2..)
        .map(|suffix| format!("{base}_{suffix}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Makes header cells usable as column names: cells are whitespace
/// collapsed, blanks become `col_{index}` and repeats get a numeric suffix.
/// The result has at least `width` names.
pub(crate) fn normalize_header(raw: &[String], width: usize) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut header = Vec::with_capacity(width.max(raw.len()));

    for index in 0..width.max(raw.len()) {
        let cell = raw.get(index).map(|cell| collapse_cell(cell)).unwrap_or_default();
        let base = if cell.is_empty() {
            format!("col_{index}")
        } else {
            cell
        };
        let name = unique_name(&base, &taken);
        taken.insert(name.clone());
        header.push(name);
    }

    header
}

/// Turns a candidate grid into a [`Table`], using row 0 as the header.
pub(crate) fn detected_to_table(detected: &DetectedTable) -> Table {
    let Some((raw_header, data)) = detected.rows.split_first() else {
        return Table::default();
    };

    let width = data
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(raw_header.len()))
        .max()
        .unwrap_or(0);
    let columns = normalize_header(raw_header, width);
    let grid = data
        .iter()
        .map(|row| row.iter().map(|cell| collapse_cell(cell)).collect())
        .collect();

    Table::from_text_grid(columns, grid)
}

/// Warns about header cells of `detected` that had to be renamed to build
/// `table`'s columns.
pub(crate) fn header_warning(
    detected: &DetectedTable,
    table: &Table,
    table_id: usize,
) -> Option<ExtractWarning> {
    let raw = detected.rows.first()?;
    let renamed = table
        .columns()
        .iter()
        .enumerate()
        .filter_map(|(index, column)| {
            let original = raw.get(index).map(|cell| collapse_cell(cell)).unwrap_or_default();
            (original != *column).then(|| format!("'{original}' -> '{column}'"))
        })
        .collect::<Vec<_>>();
    if renamed.is_empty() {
        return None;
    }

    Some(
        ExtractWarning::new(
            WarningCode::DuplicateHeader,
            format!("blank or repeated header cells renamed: {}", renamed.join(", ")),
        )
        .with_page(detected.page)
        .with_table_id(table_id),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{detected_to_table, header_warning, normalize_header};
    use crate::model::{CellValue, DetectedTable, TableOrigin};
    use crate::warning::WarningCode;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| (*item).to_string()).collect()
    }

    #[test]
    fn deduplicates_blank_and_repeated_headers() {
        let header = normalize_header(&strings(&["Name", "", "Name"]), 3);
        assert_eq!(header, vec!["Name", "col_1", "Name_2"]);
    }

    #[test]
    fn suffix_skips_names_already_present() {
        let header = normalize_header(&strings(&["a", "a_2", "a", "col_3"]), 5);
        assert_eq!(header, vec!["a", "a_2", "a_3", "col_3", "col_4"]);
    }

    #[test]
    fn converts_grid_with_wrapped_cells() {
        let detected = DetectedTable {
            page: 1,
            rows: vec![
                strings(&["Max\nVoltage", "Unit"]),
                strings(&[" 12\n 5 ", "V", "extra"]),
                strings(&["3"]),
            ],
            confidence: 0.9,
            origin: TableOrigin::Structural,
        };

        let table = detected_to_table(&detected);
        assert_eq!(table.columns(), ["Max Voltage", "Unit", "col_2"]);
        assert_eq!(table.rows()[0]["Max Voltage"], CellValue::from("12 5"));
        assert_eq!(table.rows()[0]["col_2"], CellValue::from("extra"));
        assert_eq!(table.rows()[1]["Unit"], CellValue::from(""));
    }

    #[test]
    fn renamed_header_cells_are_reported() {
        let detected = DetectedTable {
            page: 4,
            rows: vec![strings(&["id", "", "id"]), strings(&["A", "1", "2"])],
            confidence: 0.9,
            origin: TableOrigin::Layout,
        };
        let table = detected_to_table(&detected);

        let warning = header_warning(&detected, &table, 3).expect("renames should warn");
        assert_eq!(warning.code, WarningCode::DuplicateHeader);
        assert_eq!(warning.page, Some(4));
        assert_eq!(warning.table_id, Some(3));
        assert_eq!(
            warning.message,
            "blank or repeated header cells renamed: '' -> 'col_1', 'id' -> 'id_2'"
        );
    }

    #[test]
    fn clean_headers_do_not_warn() {
        let detected = DetectedTable {
            page: 1,
            rows: vec![strings(&["Max  Voltage", "Unit"]), strings(&["12", "V"])],
            confidence: 0.9,
            origin: TableOrigin::Layout,
        };
        let table = detected_to_table(&detected);
        assert_eq!(header_warning(&detected, &table, 0), None);
    }
}
