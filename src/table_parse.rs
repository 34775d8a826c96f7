use std::collections::HashMap;

/// Splits a text line into cells on tabs and on runs of two or more
/// whitespace characters.
pub(crate) fn split_line_into_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut whitespace_run = 0_usize;

    let flush = |current: &mut String, cells: &mut Vec<String>| {
        let cell = current.trim();
        if !cell.is_empty() {
            cells.push(cell.to_string());
        }
        current.clear();
    };

    for ch in trimmed.chars() {
        if ch == '\t' {
            flush(&mut current, &mut cells);
            whitespace_run = 0;
            continue;
        }

        if ch.is_whitespace() {
            whitespace_run += 1;
            if whitespace_run >= 2 {
                flush(&mut current, &mut cells);
            } else {
                current.push(' ');
            }
            continue;
        }

        whitespace_run = 0;
        current.push(ch);
    }

    flush(&mut current, &mut cells);
    cells
}

pub(crate) fn soft_split_line_into_cells(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

fn looks_like_sentence(line: &str) -> bool {
    ['.', '!', '?', ':']
        .iter()
        .any(|punctuation| line.trim_end().ends_with(*punctuation))
}

/// Returns the cells of `line` when it reads as a table row with at least
/// `min_cols` cells. Lines without a hard column gap are accepted on single
/// spaces only when they are short or carry numbers, and do not end like
/// prose.
pub(crate) fn row_cells(line: &str, min_cols: usize) -> Option<Vec<String>> {
    let cells = split_line_into_cells(line);
    if cells.len() >= min_cols {
        return Some(cells);
    }

    let soft_cells = soft_split_line_into_cells(line);
    let has_numeric = soft_cells
        .iter()
        .any(|cell| cell.chars().any(|ch| ch.is_ascii_digit()));
    if soft_cells.len() >= min_cols
        && !looks_like_sentence(line)
        && (has_numeric || soft_cells.len() <= 6)
    {
        return Some(soft_cells);
    }

    None
}

pub(crate) fn modal_width(rows: &[Vec<String>]) -> usize {
    let mut freq = HashMap::new();
    for width in rows.iter().map(Vec::len) {
        *freq.entry(width).or_insert(0_usize) += 1;
    }

    freq.into_iter()
        .max_by_key(|(width, count)| (*count, *width))
        .map_or(0, |(width, _)| width)
}

#[cfg(test)]
mod tests {
    use super::{modal_width, row_cells, soft_split_line_into_cells, split_line_into_cells};

    #[test]
    fn splits_double_space_separated_cells() {
        let cells = split_line_into_cells("Alice  30  98");
        assert_eq!(cells, vec!["Alice", "30", "98"]);
    }

    #[test]
    fn keeps_single_spaces_inside_cells() {
        let cells = split_line_into_cells("Max Voltage   12 V\tok");
        assert_eq!(cells, vec!["Max Voltage", "12 V", "ok"]);
    }

    #[test]
    fn soft_splits_single_space_cells() {
        let cells = soft_split_line_into_cells("Name Age Score");
        assert_eq!(cells, vec!["Name", "Age", "Score"]);
    }

    #[test]
    fn rejects_prose_lines() {
        assert_eq!(row_cells("The table below lists results.", 2), None);
        assert_eq!(row_cells("single", 2), None);
        assert_eq!(
            row_cells("id x", 2),
            Some(vec!["id".to_string(), "x".to_string()])
        );
    }

    #[test]
    fn detects_modal_width() {
        let rows = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["1".to_string(), "2".to_string()],
            vec!["x".to_string()],
        ];
        assert_eq!(modal_width(&rows), 2);
    }
}
