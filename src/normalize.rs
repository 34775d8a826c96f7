//! Text canonicalization shared by title matching and column mapping.

use std::sync::LazyLock;

use regex::Regex;

static HYPHEN_WRAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-[ \t]*\r?\n").expect("hyphen wrap pattern is valid"));

fn is_alternate_space(ch: char) -> bool {
    matches!(
        ch,
        '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

/// Maps alternate spaces to ' ' and removes control characters. Tabs and
/// carriage returns become spaces; '\n' is kept when `keep_newlines` is set.
fn clean_chars(text: &str, keep_newlines: bool) -> String {
    text.chars()
        .filter_map(|ch| match ch {
            '\n' if keep_newlines => Some('\n'),
            '\n' | '\t' | '\r' => Some(' '),
            ch if is_alternate_space(ch) => Some(' '),
            ch if ch.is_control() => None,
            ch => Some(ch),
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[must_use]
pub fn normalize(text: &str) -> String {
    collapse_whitespace(&clean_chars(text, false)).to_lowercase()
}

/// Like [`normalize`] but keeps line structure: each line is normalized on
/// its own and lines are joined with '\n'.
#[must_use]
pub fn normalize_preserving_lines(text: &str) -> String {
    clean_chars(text, true)
        .split('\n')
        .map(|line| collapse_whitespace(line).to_lowercase())
        .collect::<Vec<_>>()
        .join("\n")
}

#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    let kept = normalized
        .chars()
        .filter(|ch| ch.is_lowercase() || ch.is_ascii_digit() || *ch == ' ')
        .collect::<String>();
    kept.split_whitespace().map(str::to_string).collect()
}

/// Rejoins words hyphenated across a line wrap ("exam-\nple" -> "example").
#[must_use]
pub fn rejoin_hyphenated(text: &str) -> String {
    HYPHEN_WRAP.replace_all(text, "").into_owned()
}

/// Collapses interior whitespace of an extracted cell and trims it. Case is
/// preserved.
#[must_use]
pub fn collapse_cell(text: &str) -> String {
    collapse_whitespace(&clean_chars(text, false))
}

#[cfg(test)]
mod tests {
    use super::{collapse_cell, normalize, normalize_preserving_lines, rejoin_hyphenated, tokenize};

    #[test]
    fn normalizes_alternate_spaces_and_case() {
        assert_eq!(
            normalize("  Parameter\u{00A0}Table\u{202F}RESULTS \n"),
            "parameter table results"
        );
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(normalize("a\u{0007}b\tc"), "ab c");
    }

    #[test]
    fn keeps_lines_when_asked() {
        assert_eq!(normalize_preserving_lines("A  B\n C "), "a b\nc");
    }

    #[test]
    fn tokenizes_letters_and_digits_only() {
        assert_eq!(tokenize("Table 3.1: Results (final)"), vec!["table", "31", "results", "final"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize(" -- ").is_empty());
    }

    #[test]
    fn rejoins_wrapped_hyphenation() {
        assert_eq!(rejoin_hyphenated("exam-\nple"), "example");
        assert_eq!(rejoin_hyphenated("exam- \r\nple"), "example");
        assert_eq!(rejoin_hyphenated("well-known"), "well-known");
    }

    #[test]
    fn collapses_cell_wraps() {
        assert_eq!(collapse_cell(" Max\n  Voltage "), "Max Voltage");
    }
}
