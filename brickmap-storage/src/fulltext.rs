//! Full-text helpers shared by the store implementations.
//!
//! Both stores tokenize the same way: text is split on every character that
//! is not alphanumeric and folded to lowercase. A query matches a record when
//! every query token appears among the record's indexed tokens.

use brickmap_core::{PartEquivalence, Table};

/// Indexable text columns of the part table.
pub const PART_TEXT_COLUMNS: [&str; 6] = ["name", "masterid", "designid", "blid", "ldrawid", "decorid"];

/// Columns of `table` a full-text index may cover. Colors are never indexed.
pub fn text_columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::Colors => &[],
        Table::PartMapping => &PART_TEXT_COLUMNS,
    }
}

/// Split text into lowercase alphanumeric tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Build an FTS5 MATCH expression from free text.
///
/// Each whitespace-separated term becomes a quoted phrase; phrases are
/// implicitly AND-ed. Returns `None` when no term carries a token.
pub fn fts5_query(query: &str) -> Option<String> {
    let phrases: Vec<String> = query
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if phrases.is_empty() {
        None
    } else {
        Some(phrases.join(" "))
    }
}

pub(crate) fn part_column<'a>(part: &'a PartEquivalence, column: &str) -> Option<&'a str> {
    match column {
        "name" => Some(part.name.as_str()),
        "masterid" => Some(part.master_id.as_str()),
        "designid" => Some(part.design_id.as_str()),
        "blid" => Some(part.marketplace_id.as_str()),
        "ldrawid" => Some(part.open_format_id.as_str()),
        "decorid" => Some(part.decoration_id.as_str()),
        _ => None,
    }
}

/// Score `document` tokens against `query` tokens.
///
/// Returns `None` unless every query token occurs; otherwise the total number
/// of occurrences.
pub(crate) fn score(query: &[String], document: &[String]) -> Option<f32> {
    let mut total = 0usize;
    for term in query {
        let hits = document.iter().filter(|t| *t == term).count();
        if hits == 0 {
            return None;
        }
        total += hits;
    }
    Some(total as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_splits_on_punctuation() {
        assert_eq!(tokenize("3001.dat"), vec!["3001", "dat"]);
        assert_eq!(tokenize("Brick 2 x 4"), vec!["brick", "2", "x", "4"]);
        assert!(tokenize("  -- ").is_empty());
    }

    #[test]
    fn test_fts5_query_quotes_terms() {
        assert_eq!(fts5_query("brick 2x4").as_deref(), Some("\"brick\" \"2x4\""));
        assert_eq!(fts5_query("say \"hi\"").as_deref(), Some("\"say\" \"\"\"hi\"\"\""));
        assert_eq!(fts5_query("   "), None);
        assert_eq!(fts5_query("- *"), None);
    }

    #[test]
    fn test_score_requires_every_term() {
        let doc = tokenize("Brick 2 x 4 3001");
        assert_eq!(score(&tokenize("brick 3001"), &doc), Some(2.0));
        assert_eq!(score(&tokenize("plate"), &doc), None);
    }

    #[test]
    fn test_text_columns_resolve() {
        let part = PartEquivalence::new("3001", "3001b", "3001.dat").with_decoration("4113");
        for column in PART_TEXT_COLUMNS {
            assert!(part_column(&part, column).is_some());
        }
        assert_eq!(part_column(&part, "blid"), Some("3001b"));
        assert_eq!(part_column(&part, "lastmod"), None);
        assert!(text_columns(Table::Colors).is_empty());
    }
}
