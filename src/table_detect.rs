//! Text-layout table extraction: tables inferred from column gaps in page
//! text, used when no ruled grid is found.

use crate::error::MergeError;
use crate::extract::TableStrategy;
use crate::model::{DetectedTable, PageText, TableOrigin};
use crate::pdf_reader::PdfDocument;
use crate::table_parse::{modal_width, row_cells};

pub(crate) const LOW_CONFIDENCE_THRESHOLD: f32 = 0.60;

#[allow(clippy::cast_precision_loss)]
fn table_confidence(rows: &[Vec<String>]) -> f32 {
    if rows.len() < 2 {
        return 0.0;
    }

    let modal = modal_width(rows);
    if modal == 0 {
        return 0.0;
    }

    let consistent =
        rows.iter().filter(|row| row.len() == modal).count() as f32 / rows.len() as f32;
    let max_width = rows.iter().map(Vec::len).max().unwrap_or(modal);
    let min_width = rows.iter().map(Vec::len).min().unwrap_or(modal);
    let uniformity = if max_width == 0 {
        0.0
    } else {
        1.0 - ((max_width - min_width) as f32 / max_width as f32)
    };

    (consistent * 0.75 + uniformity * 0.25).clamp(0.0, 1.0)
}

/// Groups consecutive row-like lines of `text` into candidate tables of at
/// least two rows.
pub(crate) fn detect_tables_in_text(page: u32, text: &str, min_cols: usize) -> Vec<DetectedTable> {
    let mut tables = Vec::new();
    let mut current_rows: Vec<Vec<String>> = Vec::new();

    let flush_current = |rows: &mut Vec<Vec<String>>, tables: &mut Vec<DetectedTable>| {
        if rows.len() >= 2 {
            let confidence = table_confidence(rows);
            tables.push(DetectedTable {
                page,
                rows: std::mem::take(rows),
                confidence,
                origin: TableOrigin::Layout,
            });
        } else {
            rows.clear();
        }
    };

    for line in text.lines() {
        match row_cells(line, min_cols) {
            Some(cells) => current_rows.push(cells),
            None => flush_current(&mut current_rows, &mut tables),
        }
    }

    flush_current(&mut current_rows, &mut tables);
    tables
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutExtractor {
    pub min_cols: usize,
}

impl Default for LayoutExtractor {
    fn default() -> Self {
        Self { min_cols: 2 }
    }
}

impl LayoutExtractor {
    #[must_use]
    pub fn tables_on_page(&self, page: &PageText) -> Vec<DetectedTable> {
        detect_tables_in_text(page.page_number, &page.text, self.min_cols.max(2))
    }
}

impl TableStrategy for LayoutExtractor {
    fn name(&self) -> &'static str {
        "layout"
    }

    fn extract(
        &self,
        document: &PdfDocument,
        pages: &[u32],
    ) -> Result<Vec<DetectedTable>, MergeError> {
        Ok(pages
            .iter()
            .filter_map(|&page| document.page(page))
            .flat_map(|page| self.tables_on_page(page))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{LOW_CONFIDENCE_THRESHOLD, LayoutExtractor, detect_tables_in_text};
    use crate::model::PageText;

    #[test]
    fn splits_tables_on_prose_lines() {
        let text = "Intro paragraph.\n\
                    id  x\n\
                    A  100\n\
                    B  200\n\
                    Second table follows.\n\
                    id  y\n\
                    A  300\n";
        let tables = detect_tables_in_text(1, text, 2);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows[0], vec!["id", "x"]);
        assert_eq!(tables[1].rows[1], vec!["A", "300"]);
        assert!(tables[0].confidence >= LOW_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn single_row_runs_are_not_tables() {
        let page = PageText {
            page_number: 2,
            text: "Only  one  row\nThe end.".to_string(),
        };
        assert!(LayoutExtractor::default().tables_on_page(&page).is_empty());
    }

    #[test]
    fn ragged_tables_have_low_confidence() {
        let tables = detect_tables_in_text(1, "A  B  C\n1  2\n3  4  5  6\n7  8", 2);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].confidence < LOW_CONFIDENCE_THRESHOLD);
    }
}
