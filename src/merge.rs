use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::header::unique_name;
use crate::model::{CellValue, MergedRecord, Row, Table};

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub join_key: Option<String>,
    pub records: Vec<MergedRecord>,
}

/// Picks the column the tables are joined on.
///
/// An explicit key wins when the primary table has it. Otherwise the first
/// secondary sharing any column with the primary decides, using the
/// lexicographically smallest shared name. Without shared columns the
/// smallest primary column is used.
#[must_use]
pub fn infer_join_key(
    primary: &Table,
    secondaries: &[Table],
    explicit: Option<&str>,
) -> Option<String> {
    if let Some(key) = explicit {
        if primary.has_column(key) {
            return Some(key.to_string());
        }
        warn!(key, "requested join key is not a primary column; inferring one");
    }

    let primary_columns = primary.columns().iter().collect::<BTreeSet<_>>();
    for secondary in secondaries {
        let shared = secondary
            .columns()
            .iter()
            .filter(|column| primary_columns.contains(column))
            .min();
        if let Some(column) = shared {
            return Some(column.clone());
        }
    }

    primary_columns.first().map(|column| (*column).clone())
}

fn index_rows<'a>(table: &'a Table, key: &str) -> HashMap<String, Vec<&'a Row>> {
    let mut index: HashMap<String, Vec<&Row>> = HashMap::new();
    for row in table.rows() {
        if let Some(value) = row.get(key).and_then(CellValue::as_join_text) {
            index.entry(value).or_default().push(row);
        }
    }
    index
}

fn attach(record: &mut MergedRecord, position: usize, secondary: &Row) {
    for (column, value) in secondary {
        let prefixed = format!("t{position}_{column}");
        let name = if record.contains_key(&prefixed) {
            let taken = record.keys().cloned().collect::<HashSet<_>>();
            unique_name(&prefixed, &taken)
        } else {
            prefixed
        };
        record.insert(name, value.clone());
    }
}

/// Joins `secondaries` onto `primary`.
///
/// Each primary row yields the Cartesian product of its matches across the
/// secondaries, ordered lexicographically by secondary position. A secondary
/// without a match contributes no columns. Rows whose key is null or blank
/// never match.
#[must_use]
pub fn merge(primary: &Table, secondaries: &[Table], explicit_key: Option<&str>) -> MergeOutcome {
    let Some(join_key) = infer_join_key(primary, secondaries, explicit_key) else {
        return MergeOutcome {
            join_key: None,
            records: primary.rows().to_vec(),
        };
    };
    debug!(join_key = %join_key, secondaries = secondaries.len(), "merging tables");

    let indexes = secondaries
        .iter()
        .map(|secondary| index_rows(secondary, &join_key))
        .collect::<Vec<_>>();

    let mut records = Vec::new();
    for row in primary.rows() {
        let key = row.get(&join_key).and_then(CellValue::as_join_text);
        let mut partial = vec![row.clone()];

        for (position, index) in indexes.iter().enumerate() {
            let Some(matches) = key.as_ref().and_then(|key| index.get(key)) else {
                continue;
            };
            partial = partial
                .iter()
                .flat_map(|record| {
                    matches.iter().map(move |secondary| {
                        let mut record = record.clone();
                        attach(&mut record, position + 1, secondary);
                        record
                    })
                })
                .collect();
        }

        records.extend(partial);
    }

    MergeOutcome {
        join_key: Some(join_key),
        records,
    }
}
