#![allow(dead_code)]

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

const CELL_WIDTH: i64 = 100;
const CELL_HEIGHT: i64 = 20;

/// A table drawn with full cell borders, `top`/`left` being its top-left
/// corner in page space. An optional title is printed just above it.
pub struct RuledTable<'a> {
    pub title: Option<&'a str>,
    pub left: i64,
    pub top: i64,
    pub rows: Vec<Vec<&'a str>>,
}

fn write_pdf(path: &Path, pages: Vec<Vec<Operation>>) -> Result<(), Box<dyn std::error::Error>> {
    let mut doc = Document::with_version("1.5");

    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut page_ids = Vec::new();
    for operations in pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        page_ids.push(page_id);
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| (*id).into()).collect::<Vec<_>>(),
            "Count" => i64::try_from(page_ids.len())?,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(path)?;
    Ok(())
}

/// One text line per entry, top to bottom; column gaps are written as runs
/// of spaces.
pub fn create_test_pdf(path: &Path, pages: &[Vec<&str>]) -> Result<(), Box<dyn std::error::Error>> {
    let pages = pages
        .iter()
        .map(|lines| {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("TL", vec![16.into()]),
                Operation::new("Td", vec![50.into(), 780.into()]),
            ];
            for (index, line) in lines.iter().enumerate() {
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                if index + 1 < lines.len() {
                    operations.push(Operation::new("T*", vec![]));
                }
            }
            operations.push(Operation::new("ET", vec![]));
            operations
        })
        .collect();
    write_pdf(path, pages)
}

fn show_text(operations: &mut Vec<Operation>, text: &str, size: i64, x: i64, y: i64) {
    operations.extend([
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]);
}

fn stroke_line(operations: &mut Vec<Operation>, from: (i64, i64), to: (i64, i64)) {
    operations.extend([
        Operation::new("m", vec![from.0.into(), from.1.into()]),
        Operation::new("l", vec![to.0.into(), to.1.into()]),
        Operation::new("S", vec![]),
    ]);
}

fn ruled_table_operations(table: &RuledTable<'_>, operations: &mut Vec<Operation>) {
    let height = i64::try_from(table.rows.len()).unwrap_or_default();
    let columns = table.rows.iter().map(Vec::len).max().unwrap_or(0);
    let width = i64::try_from(columns).unwrap_or_default();
    let right = table.left + CELL_WIDTH * width;
    let bottom = table.top - CELL_HEIGHT * height;

    if let Some(title) = table.title {
        show_text(operations, title, 12, table.left, table.top + 8);
    }
    for row in 0..=height {
        let y = table.top - CELL_HEIGHT * row;
        stroke_line(operations, (table.left, y), (right, y));
    }
    for column in 0..=width {
        let x = table.left + CELL_WIDTH * column;
        stroke_line(operations, (x, table.top), (x, bottom));
    }

    for (row, cells) in (0_i64..).zip(&table.rows) {
        for (column, cell) in (0_i64..).zip(cells) {
            if cell.is_empty() {
                continue;
            }
            let x = table.left + CELL_WIDTH * column + 5;
            let y = table.top - CELL_HEIGHT * (row + 1) + 6;
            show_text(operations, cell, 10, x, y);
        }
    }
}

/// Each page holds the given ruled tables.
pub fn create_ruled_pdf(
    path: &Path,
    pages: &[Vec<RuledTable<'_>>],
) -> Result<(), Box<dyn std::error::Error>> {
    let pages = pages
        .iter()
        .map(|tables| {
            let mut operations = Vec::new();
            for table in tables {
                ruled_table_operations(table, &mut operations);
            }
            operations
        })
        .collect();
    write_pdf(path, pages)
}

pub fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("fixture file should be written");
}
