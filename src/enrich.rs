//! Attaches columns from a mapping table to merged records by key, with a
//! close-match fallback for keys that differ by small typos.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::model::{CellValue, Row, Table};

/// Value written for fields that have no mapping.
pub const UNKNOWN: &str = "UNKNOWN";

pub const DEFAULT_CUTOFF: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichSpec {
    pub record_key: String,
    pub mapping_key: String,
    pub fields: Vec<String>,
    pub cutoff: f64,
}

impl EnrichSpec {
    /// Looks up `record_key` in a mapping column of the same name.
    pub fn new(record_key: impl Into<String>, fields: Vec<String>) -> Self {
        let record_key = record_key.into();
        Self {
            mapping_key: record_key.clone(),
            record_key,
            fields,
            cutoff: DEFAULT_CUTOFF,
        }
    }

    #[must_use]
    pub fn with_mapping_key(mut self, mapping_key: impl Into<String>) -> Self {
        self.mapping_key = mapping_key.into();
        self
    }

    #[must_use]
    pub fn with_cutoff(mut self, cutoff: f64) -> Self {
        self.cutoff = cutoff;
        self
    }
}

fn normalize_key(value: &CellValue) -> String {
    value
        .to_string()
        .to_lowercase()
        .trim()
        .trim_end_matches('/')
        .to_string()
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as
/// `(start_a, start_b, len)`, earliest in `a` on ties.
fn longest_match(
    a: &[char],
    b: &[char],
    (alo, ahi): (usize, usize),
    (blo, bhi): (usize, usize),
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let mut previous = vec![0_usize; bhi - blo + 1];
    for i in alo..ahi {
        let mut current = vec![0_usize; bhi - blo + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let length = previous[j - blo] + 1;
                current[j - blo + 1] = length;
                if length > best.2 {
                    best = (i + 1 - length, j + 1 - length, length);
                }
            }
        }
        previous = current;
    }
    best
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, length) = longest_match(a, b, (alo, ahi), (blo, bhi));
        if length == 0 {
            continue;
        }
        total += length;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + length < ahi && j + length < bhi {
            pending.push((i + length, ahi, j + length, bhi));
        }
    }
    total
}

/// Ratcliff/Obershelp similarity: twice the matched characters over the
/// combined length, in `[0, 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn similarity(left: &str, right: &str) -> f64 {
    let left = left.chars().collect::<Vec<_>>();
    let right = right.chars().collect::<Vec<_>>();
    let combined = left.len() + right.len();
    if combined == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&left, &right) as f64 / combined as f64
}

/// The candidate most similar to `key` scoring at least `cutoff`. Ties go to
/// the lexicographically greatest candidate.
fn closest<'a>(
    key: &str,
    candidates: impl Iterator<Item = &'a String>,
    cutoff: f64,
) -> Option<&'a String> {
    candidates
        .map(|candidate| (similarity(key, candidate), candidate))
        .filter(|(score, _)| *score >= cutoff)
        .max_by(|left, right| left.0.total_cmp(&right.0).then_with(|| left.1.cmp(right.1)))
        .map(|(_, candidate)| candidate)
}

/// Adds `spec.fields` to every record from the mapping row whose key matches
/// the record's key, exactly after normalization or by close match. Fields
/// without a match are set to [`UNKNOWN`]. Record order is kept.
#[must_use]
pub fn enrich(records: &[Row], mapping: &Table, spec: &EnrichSpec) -> Vec<Row> {
    let mut index: HashMap<String, &Row> = HashMap::new();
    for row in mapping.rows() {
        if let Some(value) = row.get(&spec.mapping_key) {
            let key = normalize_key(value);
            if !key.is_empty() {
                index.insert(key, row);
            }
        }
    }

    records
        .iter()
        .map(|record| {
            let key = record.get(&spec.record_key).map(normalize_key).unwrap_or_default();
            let matched = if key.is_empty() {
                None
            } else {
                index.get(&key).copied().or_else(|| {
                    let close = closest(&key, index.keys(), spec.cutoff)?;
                    debug!(key = %key, matched = %close, "enrichment key matched approximately");
                    index.get(close).copied()
                })
            };

            let mut enriched = record.clone();
            for field in &spec.fields {
                let value = matched
                    .and_then(|row| row.get(field))
                    .filter(|value| !value.is_null())
                    .cloned()
                    .unwrap_or_else(|| CellValue::from(UNKNOWN));
                enriched.insert(field.clone(), value);
            }
            enriched
        })
        .collect()
}
