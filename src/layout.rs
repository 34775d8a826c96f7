//! Page geometry recovered from PDF content streams.
//!
//! Walks a page's operators keeping the graphics state stack, the current
//! transformation matrix and the text matrices, and records where text was
//! shown and which straight rulings were painted. Glyph widths are estimated
//! from the font size since font metrics are not loaded.

use lopdf::Object;
use lopdf::content::Content;

use crate::error::MergeError;
use crate::pdf_reader::{PdfDocument, collect_shown_text, page_encodings};

/// Average glyph advance as a fraction of the font size.
const GLYPH_ADVANCE: f32 = 0.5;

/// Painted rectangles thinner than this are treated as rulings.
const RULE_THICKNESS: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub text: String,
    /// Baseline origin in page space.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl TextBox {
    /// Point used to place the box into a cell: just inside its left edge,
    /// a third of the way up from the baseline.
    #[must_use]
    pub fn anchor(&self) -> (f32, f32) {
        (self.x + self.width.min(2.0), self.y + self.height / 3.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl LineSegment {
    #[must_use]
    pub fn is_horizontal(&self, tolerance: f32) -> bool {
        (self.y1 - self.y2).abs() <= tolerance && (self.x1 - self.x2).abs() > tolerance
    }

    #[must_use]
    pub fn is_vertical(&self, tolerance: f32) -> bool {
        (self.x1 - self.x2).abs() <= tolerance && (self.y1 - self.y2).abs() > tolerance
    }

    #[must_use]
    pub fn length(&self) -> f32 {
        (self.x2 - self.x1).hypot(self.y2 - self.y1)
    }

    #[must_use]
    pub fn min_x(&self) -> f32 {
        self.x1.min(self.x2)
    }

    #[must_use]
    pub fn max_x(&self) -> f32 {
        self.x1.max(self.x2)
    }

    #[must_use]
    pub fn min_y(&self) -> f32 {
        self.y1.min(self.y2)
    }

    #[must_use]
    pub fn max_y(&self) -> f32 {
        self.y1.max(self.y2)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub page_number: u32,
    pub text_boxes: Vec<TextBox>,
    pub lines: Vec<LineSegment>,
}

impl PageLayout {
    /// Text boxes grouped into visual lines by baseline, top to bottom. Each
    /// entry is the line's baseline and its boxes joined left to right.
    #[must_use]
    pub fn text_lines(&self) -> Vec<(f32, String)> {
        let mut boxes = self.text_boxes.iter().collect::<Vec<_>>();
        boxes.sort_by(|left, right| right.y.total_cmp(&left.y).then(left.x.total_cmp(&right.x)));

        let mut lines: Vec<(f32, Vec<&TextBox>)> = Vec::new();
        for text_box in boxes {
            let tolerance = text_box.height.max(1.0) / 2.0;
            match lines.last_mut() {
                Some((baseline, members)) if (*baseline - text_box.y).abs() <= tolerance => {
                    members.push(text_box);
                }
                _ => lines.push((text_box.y, vec![text_box])),
            }
        }

        lines
            .into_iter()
            .map(|(baseline, mut members)| {
                members.sort_by(|left, right| left.x.total_cmp(&right.x));
                let text = members
                    .iter()
                    .map(|text_box| text_box.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                (baseline, text)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other` in PDF row-vector convention.
    fn then(self, other: Self) -> Self {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Self([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    fn horizontal_scale(self) -> f32 {
        self.0[0].hypot(self.0[1])
    }

    fn vertical_scale(self) -> f32 {
        self.0[2].hypot(self.0[3])
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number(operand: &Object) -> Option<f32> {
    match operand {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(out)
}

/// Sum of `TJ` kerning adjustments, in thousandths of text space.
fn kerning(operands: &[Object]) -> f32 {
    operands
        .iter()
        .map(|operand| match operand {
            Object::Array(items) => kerning(items),
            other => number(other).unwrap_or(0.0),
        })
        .sum()
}

struct Interpreter<'a> {
    encodings: std::collections::BTreeMap<Vec<u8>, &'a str>,
    ctm: Matrix,
    stack: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_size: f32,
    leading: f32,
    encoding: Option<&'a str>,
    current: Option<(f32, f32)>,
    subpath_start: Option<(f32, f32)>,
    pending: Vec<LineSegment>,
    layout: PageLayout,
}

impl<'a> Interpreter<'a> {
    fn new(page_number: u32, encodings: std::collections::BTreeMap<Vec<u8>, &'a str>) -> Self {
        Self {
            encodings,
            ctm: Matrix::IDENTITY,
            stack: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_size: 12.0,
            leading: 0.0,
            encoding: None,
            current: None,
            subpath_start: None,
            pending: Vec::new(),
            layout: PageLayout {
                page_number,
                ..PageLayout::default()
            },
        }
    }

    fn next_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = Matrix::translate(tx, ty).then(self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn push_segment(&mut self, from: (f32, f32), to: (f32, f32)) {
        let (x1, y1) = self.ctm.apply(from.0, from.1);
        let (x2, y2) = self.ctm.apply(to.0, to.1);
        self.pending.push(LineSegment { x1, y1, x2, y2 });
    }

    fn rectangle(&mut self, x: f32, y: f32, width: f32, height: f32) {
        if height.abs() <= RULE_THICKNESS {
            let mid = y + height / 2.0;
            self.push_segment((x, mid), (x + width, mid));
        } else if width.abs() <= RULE_THICKNESS {
            let mid = x + width / 2.0;
            self.push_segment((mid, y), (mid, y + height));
        } else {
            self.push_segment((x, y), (x + width, y));
            self.push_segment((x + width, y), (x + width, y + height));
            self.push_segment((x + width, y + height), (x, y + height));
            self.push_segment((x, y + height), (x, y));
        }
    }

    fn show_text(&mut self, operands: &[Object]) {
        let mut text = String::new();
        collect_shown_text(&mut text, self.encoding, operands);
        let glyphs = text.chars().count();

        #[allow(clippy::cast_precision_loss)]
        let advance = glyphs as f32 * self.font_size * GLYPH_ADVANCE
            - kerning(operands) / 1000.0 * self.font_size;
        let rendering = self.text_matrix.then(self.ctm);
        let (x, y) = rendering.apply(0.0, 0.0);

        if !text.trim().is_empty() {
            self.layout.text_boxes.push(TextBox {
                text: text.trim().to_string(),
                x,
                y,
                width: (advance * rendering.horizontal_scale()).max(0.0),
                height: self.font_size * rendering.vertical_scale(),
            });
        }

        self.text_matrix = Matrix::translate(advance, 0.0).then(self.text_matrix);
    }

    fn step(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.stack.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.stack.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(values) = numbers::<6>(operands) {
                    self.ctm = Matrix(values).then(self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(name) = operands.first().and_then(|operand| operand.as_name().ok()) {
                    self.encoding = self.encodings.get(name).copied();
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    self.font_size = size;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    self.leading = leading;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    self.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(values) = numbers::<6>(operands) {
                    self.line_matrix = Matrix(values);
                    self.text_matrix = self.line_matrix;
                }
            }
            "T*" => self.next_line(0.0, -self.leading),
            "Tj" | "TJ" => self.show_text(operands),
            "'" => {
                self.next_line(0.0, -self.leading);
                self.show_text(operands);
            }
            "\"" => {
                self.next_line(0.0, -self.leading);
                self.show_text(operands.get(2..).unwrap_or_default());
            }
            "m" => {
                if let Some([x, y]) = numbers::<2>(operands) {
                    self.current = Some((x, y));
                    self.subpath_start = Some((x, y));
                }
            }
            "l" => {
                if let Some([x, y]) = numbers::<2>(operands) {
                    if let Some(from) = self.current {
                        self.push_segment(from, (x, y));
                    }
                    self.current = Some((x, y));
                }
            }
            "c" => {
                if let Some([.., x, y]) = numbers::<6>(operands) {
                    self.current = Some((x, y));
                }
            }
            "v" | "y" => {
                if let Some([.., x, y]) = numbers::<4>(operands) {
                    self.current = Some((x, y));
                }
            }
            "h" => {
                if let (Some(from), Some(start)) = (self.current, self.subpath_start) {
                    self.push_segment(from, start);
                    self.current = Some(start);
                }
            }
            "re" => {
                if let Some([x, y, width, height]) = numbers::<4>(operands) {
                    self.rectangle(x, y, width, height);
                    self.current = Some((x, y));
                    self.subpath_start = Some((x, y));
                }
            }
            "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                self.layout.lines.append(&mut self.pending);
                self.current = None;
            }
            "n" => {
                self.pending.clear();
                self.current = None;
            }
            _ => {}
        }
    }
}

/// Text boxes and rulings painted on one page.
pub fn page_layout(document: &PdfDocument, page_number: u32) -> Result<PageLayout, MergeError> {
    let Some(page_id) = document.page_id(page_number) else {
        return Err(MergeError::NotFound(format!(
            "page {page_number} in '{}'",
            document.source()
        )));
    };
    let pdf = document.lopdf();
    let raw = pdf.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;

    let mut interpreter = Interpreter::new(page_number, page_encodings(pdf, page_id));
    for operation in &content.operations {
        interpreter.step(&operation.operator, &operation.operands);
    }
    Ok(interpreter.layout)
}
