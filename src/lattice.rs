//! Ruled-table extraction: tables whose cells are drawn with border lines.

use crate::error::MergeError;
use crate::extract::TableStrategy;
use crate::layout::{LineSegment, PageLayout, TextBox, page_layout};
use crate::model::{DetectedTable, TableOrigin};
use crate::pdf_reader::PdfDocument;

const STRUCTURAL_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeExtractor {
    /// Distance under which rulings touch and positions merge.
    pub tolerance: f32,
    /// Shorter rulings are ignored as glyph strokes or underline noise.
    pub min_rule_length: f32,
}

impl Default for LatticeExtractor {
    fn default() -> Self {
        Self {
            tolerance: 2.0,
            min_rule_length: 10.0,
        }
    }
}

impl TableStrategy for LatticeExtractor {
    fn name(&self) -> &'static str {
        "lattice"
    }

    fn extract(
        &self,
        document: &PdfDocument,
        pages: &[u32],
    ) -> Result<Vec<DetectedTable>, MergeError> {
        let mut tables = Vec::new();
        for &page in pages {
            let layout = page_layout(document, page)?;
            tables.extend(self.tables_on_page(&layout));
        }
        Ok(tables)
    }
}

impl LatticeExtractor {
    #[must_use]
    pub fn tables_on_page(&self, layout: &PageLayout) -> Vec<DetectedTable> {
        self.tables_below(layout, None)
    }

    /// Tables whose top edge is at or below `anchor_y`, top to bottom. Without
    /// an anchor every table on the page is returned.
    #[must_use]
    pub fn tables_below(&self, layout: &PageLayout, anchor_y: Option<f32>) -> Vec<DetectedTable> {
        let rulings = layout
            .lines
            .iter()
            .filter(|line| line.length() >= self.min_rule_length)
            .filter(|line| {
                line.is_horizontal(self.tolerance) || line.is_vertical(self.tolerance)
            })
            .copied()
            .collect::<Vec<_>>();

        let mut grids = self
            .connected_grids(&rulings)
            .into_iter()
            .filter_map(|group| self.grid_bounds(&group))
            .collect::<Vec<_>>();
        grids.sort_by(|left, right| right.top().total_cmp(&left.top()));

        grids
            .iter()
            .filter(|grid| anchor_y.is_none_or(|y| grid.top() <= y + self.tolerance))
            .filter_map(|grid| grid.fill(&layout.text_boxes))
            .map(|rows| DetectedTable {
                page: layout.page_number,
                rows,
                confidence: STRUCTURAL_CONFIDENCE,
                origin: TableOrigin::Structural,
            })
            .collect()
    }

    fn touches(&self, horizontal: &LineSegment, vertical: &LineSegment) -> bool {
        let x = vertical.x1;
        let y = horizontal.y1;
        x >= horizontal.min_x() - self.tolerance
            && x <= horizontal.max_x() + self.tolerance
            && y >= vertical.min_y() - self.tolerance
            && y <= vertical.max_y() + self.tolerance
    }

    /// Groups rulings into sets connected through horizontal/vertical
    /// crossings, so separate tables on one page stay apart.
    fn connected_grids(&self, rulings: &[LineSegment]) -> Vec<Vec<LineSegment>> {
        fn find(parent: &mut [usize], mut node: usize) -> usize {
            while parent[node] != node {
                parent[node] = parent[parent[node]];
                node = parent[node];
            }
            node
        }

        let mut parent = (0..rulings.len()).collect::<Vec<_>>();
        for (i, first) in rulings.iter().enumerate() {
            for (j, second) in rulings.iter().enumerate().skip(i + 1) {
                let crossing = if first.is_horizontal(self.tolerance) {
                    second.is_vertical(self.tolerance) && self.touches(first, second)
                } else {
                    second.is_horizontal(self.tolerance) && self.touches(second, first)
                };
                if crossing {
                    let (root_i, root_j) = (find(&mut parent, i), find(&mut parent, j));
                    parent[root_j] = root_i;
                }
            }
        }

        let mut groups: Vec<(usize, Vec<LineSegment>)> = Vec::new();
        for (index, ruling) in rulings.iter().enumerate() {
            let root = find(&mut parent, index);
            match groups.iter_mut().find(|(group_root, _)| *group_root == root) {
                Some((_, members)) => members.push(*ruling),
                None => groups.push((root, vec![*ruling])),
            }
        }
        groups.into_iter().map(|(_, members)| members).collect()
    }

    fn grid_bounds(&self, group: &[LineSegment]) -> Option<Grid> {
        let mut rows = cluster_positions(
            group
                .iter()
                .filter(|line| line.is_horizontal(self.tolerance))
                .map(|line| line.y1)
                .collect(),
            self.tolerance,
        );
        let columns = cluster_positions(
            group
                .iter()
                .filter(|line| line.is_vertical(self.tolerance))
                .map(|line| line.x1)
                .collect(),
            self.tolerance,
        );
        if rows.len() < 3 || columns.len() < 3 {
            return None;
        }
        rows.reverse();
        Some(Grid { rows, columns })
    }
}

/// Merges positions closer than `tolerance` into their mean, ascending.
#[allow(clippy::cast_precision_loss)]
fn cluster_positions(mut values: Vec<f32>, tolerance: f32) -> Vec<f32> {
    values.sort_by(f32::total_cmp);
    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for value in values {
        match clusters.last_mut() {
            Some(cluster) if cluster.last().is_some_and(|last| value - last <= tolerance) => {
                cluster.push(value);
            }
            _ => clusters.push(vec![value]),
        }
    }

    clusters
        .into_iter()
        .map(|cluster| cluster.iter().sum::<f32>() / cluster.len() as f32)
        .collect()
}

/// Cell boundaries of one ruled table: `rows` top to bottom (descending y),
/// `columns` left to right.
#[derive(Debug, Clone, PartialEq)]
struct Grid {
    rows: Vec<f32>,
    columns: Vec<f32>,
}

impl Grid {
    fn top(&self) -> f32 {
        self.rows[0]
    }

    fn cell_of(&self, text_box: &TextBox) -> Option<(usize, usize)> {
        let (x, y) = text_box.anchor();
        let row = self
            .rows
            .windows(2)
            .position(|edges| y <= edges[0] && y > edges[1])?;
        let column = self
            .columns
            .windows(2)
            .position(|edges| x >= edges[0] && x < edges[1])?;
        Some((row, column))
    }

    /// Places text into cells and drops rows and columns that stay empty.
    /// Grids left with fewer than two rows or columns are not tables.
    fn fill(&self, text_boxes: &[TextBox]) -> Option<Vec<Vec<String>>> {
        let height = self.rows.len() - 1;
        let width = self.columns.len() - 1;
        let mut cells: Vec<Vec<Vec<&TextBox>>> = vec![vec![Vec::new(); width]; height];
        for text_box in text_boxes {
            if let Some((row, column)) = self.cell_of(text_box) {
                cells[row][column].push(text_box);
            }
        }

        let mut grid = cells
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|mut boxes| {
                        boxes.sort_by(|left, right| {
                            right.y.total_cmp(&left.y).then(left.x.total_cmp(&right.x))
                        });
                        boxes
                            .iter()
                            .map(|text_box| text_box.text.as_str())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .collect::<Vec<_>>();

        let keep = (0..width)
            .filter(|&column| grid.iter().any(|row| !row[column].is_empty()))
            .collect::<Vec<_>>();
        for row in &mut grid {
            *row = keep.iter().map(|&column| std::mem::take(&mut row[column])).collect();
        }

        (grid.len() >= 2 && keep.len() >= 2).then_some(grid)
    }
}
