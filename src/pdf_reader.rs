use std::collections::BTreeMap;
use std::path::Path;

use encoding_rs::{BIG5, UTF_16BE};
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use crate::error::MergeError;
use crate::model::PageText;
use crate::options::PageSelection;
use crate::table_parse::split_line_into_cells;

/// A loaded PDF with its per-page text resolved once up front.
#[derive(Debug)]
pub struct PdfDocument {
    source: String,
    document: Document,
    pages: Vec<PageText>,
}

impl PdfDocument {
    pub fn open(path: &Path, selection: Option<&PageSelection>) -> Result<Self, MergeError> {
        if !path.exists() {
            return Err(MergeError::input(path, "file does not exist"));
        }
        let bytes =
            std::fs::read(path).map_err(|error| MergeError::input(path, error.to_string()))?;
        Self::load(&bytes, path.display().to_string(), selection)
    }

    pub fn from_bytes(bytes: &[u8], selection: Option<&PageSelection>) -> Result<Self, MergeError> {
        Self::load(bytes, "<memory>".to_string(), selection)
    }

    fn load(
        bytes: &[u8],
        source: String,
        selection: Option<&PageSelection>,
    ) -> Result<Self, MergeError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| MergeError::input(&source, format!("not a readable PDF: {error}")))?;
        let extracted = match pdf_extract::extract_text_from_mem(bytes) {
            Ok(text) => Some(text),
            Err(error) => {
                debug!(%source, ?error, "pdf-extract failed; using content streams only");
                None
            }
        };
        let pages = read_pages(&document, extracted.as_deref(), selection)?;
        Ok(Self {
            source,
            document,
            pages,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Text of the selected pages, in page order.
    #[must_use]
    pub fn pages(&self) -> &[PageText] {
        &self.pages
    }

    #[must_use]
    pub fn page(&self, page_number: u32) -> Option<&PageText> {
        self.pages.iter().find(|page| page.page_number == page_number)
    }

    pub(crate) fn lopdf(&self) -> &Document {
        &self.document
    }

    pub(crate) fn page_id(&self, page_number: u32) -> Option<ObjectId> {
        self.document.get_pages().get(&page_number).copied()
    }
}

fn split_text_into_pages(raw_text: &str) -> Vec<String> {
    let mut pages = raw_text
        .split('\u{000C}')
        .map(str::to_string)
        .collect::<Vec<_>>();
    if pages.last().is_some_and(String::is_empty) {
        pages.pop();
    }
    pages
}

fn looks_decoding_broken(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    if text.contains("?Identity-H Unimplemented?") {
        return true;
    }

    let total = text.chars().count();
    let replacement = text.matches('\u{FFFD}').count();
    let control = text
        .chars()
        .filter(|ch| ch.is_control() && !matches!(ch, '\n' | '\r' | '\t'))
        .count();

    replacement * 8 > total || control * 5 > total
}

pub(crate) fn decode_pdf_bytes(encoding: Option<&str>, bytes: &[u8]) -> String {
    let decoded = Document::decode_text(encoding, bytes);
    if !looks_decoding_broken(&decoded) {
        return decoded;
    }

    if bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]) {
        let bytes = if bytes.len() > 2 { &bytes[2..] } else { bytes };
        let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
        if !had_errors && !utf16.is_empty() {
            return utf16.into_owned();
        }
    }

    if let Some(name) = encoding {
        let lower = name.to_ascii_lowercase();

        if lower.contains("utf16")
            || lower.contains("ucs2")
            || lower.contains("identity-h")
            || lower.contains("unicode")
        {
            let (utf16, had_errors) = UTF_16BE.decode_without_bom_handling(bytes);
            if !had_errors && !utf16.is_empty() {
                return utf16.into_owned();
            }
        }

        if lower.contains("big5") || lower.contains("b5") || lower.contains("eten") {
            let (big5, _, had_errors) = BIG5.decode(bytes);
            if !had_errors && !big5.is_empty() {
                return big5.into_owned();
            }
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}

/// Scores candidate page text: lines that split into several cells weigh
/// most, then numeric lines, then plain line count.
fn extraction_quality_score(text: &str) -> i64 {
    if text.trim().is_empty() {
        return i64::MIN / 4;
    }

    let mut non_empty_lines = 0_i64;
    let mut multi_cell_lines = 0_i64;
    let mut numeric_lines = 0_i64;

    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        non_empty_lines += 1;
        if split_line_into_cells(line).len() >= 2 {
            multi_cell_lines += 1;
        }
        if line.chars().any(|ch| ch.is_ascii_digit()) {
            numeric_lines += 1;
        }
    }

    let broken_penalty = if looks_decoding_broken(text) { 800 } else { 0 };
    multi_cell_lines * 50 + numeric_lines * 5 + non_empty_lines - broken_penalty
}

fn choose_best_text(candidates: &[String]) -> String {
    candidates
        .iter()
        .max_by_key(|text| extraction_quality_score(text))
        .cloned()
        .unwrap_or_default()
}

/// Font resource name to encoding name for one page.
pub(crate) fn page_encodings(document: &Document, page_id: ObjectId) -> BTreeMap<Vec<u8>, &str> {
    document
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, font.get_font_encoding()))
        .collect()
}

pub(crate) fn collect_shown_text(text: &mut String, encoding: Option<&str>, operands: &[Object]) {
    for operand in operands {
        match operand {
            Object::String(bytes, _) => {
                text.push_str(&decode_pdf_bytes(encoding, bytes));
            }
            Object::Array(items) => {
                collect_shown_text(text, encoding, items);
            }
            Object::Integer(value) if *value < -100 => text.push(' '),
            Object::Real(value) if f64::from(*value) < -100.0 => text.push(' '),
            _ => {}
        }
    }
}

fn extract_text_from_page_content(document: &Document, page_id: ObjectId) -> Option<String> {
    let raw_content = document.get_page_content(page_id).ok()?;
    let content = Content::decode(&raw_content).ok()?;
    let encodings = page_encodings(document, page_id);

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_encoding = None;
    for operation in content.operations {
        match operation.operator.as_str() {
            "Tf" => {
                if let Some(font_name) = operation
                    .operands
                    .first()
                    .and_then(|operand| operand.as_name().ok())
                {
                    current_encoding = encodings.get(font_name).copied();
                }
            }
            "Tj" | "TJ" | "'" | "\"" => {
                collect_shown_text(&mut current, current_encoding, &operation.operands);
            }
            "T*" | "Td" | "TD" | "Tm" | "ET" => {
                if !current.trim().is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                current.clear();
            }
            _ => {}
        }
    }

    if !current.trim().is_empty() {
        lines.push(current);
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn read_pages(
    document: &Document,
    extracted: Option<&str>,
    selection: Option<&PageSelection>,
) -> Result<Vec<PageText>, MergeError> {
    let pages_map = document.get_pages();

    let (extracted_pages, extracted_whole) = match extracted {
        Some(text) => {
            let pages = split_text_into_pages(text);
            if pages.len() == pages_map.len() {
                (Some(pages), None)
            } else {
                (None, Some(text))
            }
        }
        None => (None, None),
    };

    let mut pages = Vec::new();
    for (index, (page_no, page_id)) in pages_map.iter().enumerate() {
        if selection.is_some_and(|selection| !selection.contains(*page_no)) {
            continue;
        }

        let mut candidates = Vec::new();
        if let Some(text) = extracted_pages
            .as_ref()
            .and_then(|pages| pages.get(index).cloned())
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text);
        }
        if let Some(text) = extract_text_from_page_content(document, *page_id) {
            candidates.push(text);
        }
        if let Some(text) = document
            .extract_text(&[*page_no])
            .ok()
            .filter(|text| !text.trim().is_empty())
        {
            candidates.push(text);
        }

        // A single-page document whose per-page splits failed can still use
        // the whole extracted text.
        if candidates.is_empty() && pages_map.len() == 1 {
            if let Some(text) = extracted_whole.filter(|text| !text.trim().is_empty()) {
                candidates.push(text.to_string());
            }
        }

        pages.push(PageText {
            page_number: *page_no,
            text: choose_best_text(&candidates),
        });
    }

    if pages.is_empty() {
        return Err(MergeError::NoPagesSelected);
    }

    Ok(pages)
}
