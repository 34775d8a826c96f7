use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use indexmap::IndexSet;

use crate::error::MergeError;
use crate::model::Row;

/// Union of the records' column names in first-seen order.
fn union_header(records: &[Row]) -> Vec<&str> {
    records
        .iter()
        .flat_map(|record| record.keys().map(String::as_str))
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

fn write_to<W: Write>(writer: W, records: &[Row], delimiter: u8) -> Result<W, MergeError> {
    let header = union_header(records);
    let mut writer = WriterBuilder::new().delimiter(delimiter).from_writer(writer);
    if !header.is_empty() {
        writer.write_record(&header)?;
    }
    for record in records {
        writer.write_record(header.iter().map(|column| {
            record
                .get(*column)
                .map(ToString::to_string)
                .unwrap_or_default()
        }))?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|error| MergeError::Io(error.into_error()))
}

/// Writes `records` to `path`, creating missing parent directories, and
/// returns the absolute path written.
pub fn write_records(path: &Path, records: &[Row], delimiter: u8) -> Result<PathBuf, MergeError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_to(file, records, delimiter)?;
    Ok(std::path::absolute(path)?)
}

pub fn write_records_to_string(records: &[Row], delimiter: u8) -> Result<String, MergeError> {
    let bytes = write_to(Vec::new(), records, delimiter)?;
    String::from_utf8(bytes)
        .map_err(|error| MergeError::InvalidOption(format!("invalid utf-8 csv output: {error}")))
}

#[cfg(test)]
mod tests {
    use super::{write_records, write_records_to_string};
    use crate::model::{CellValue, Row};

    fn row(cells: &[(&str, CellValue)]) -> Row {
        cells
            .iter()
            .map(|(column, value)| ((*column).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn header_is_the_union_in_first_seen_order() {
        let records = vec![
            row(&[("id", "A".into()), ("x", 1.0.into())]),
            row(&[("id", "B".into()), ("t1_y", "q".into())]),
        ];
        let csv = write_records_to_string(&records, b',').expect("records should render");
        assert_eq!(csv, "id,x,t1_y\nA,1,\nB,,q\n");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let target = dir.path().join("nested").join("out.csv");
        let records = vec![row(&[("id", "A".into()), ("n", CellValue::Null)])];

        let written = write_records(&target, &records, b';').expect("csv should be written");
        assert!(written.is_absolute());
        let content = std::fs::read_to_string(&written).expect("output should be readable");
        assert_eq!(content, "id;n\nA;\n");
    }

    #[test]
    fn empty_records_produce_empty_output() {
        let csv = write_records_to_string(&[], b',').expect("empty input should render");
        assert!(csv.is_empty());
    }
}
