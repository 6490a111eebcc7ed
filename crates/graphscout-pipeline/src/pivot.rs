//! Triple pivoting: long (subject, column, value) rows into one wide row per
//! subject, with column names becoming dynamic row keys.

use crate::rowset::{CellValue, Row, RowSet};
use std::collections::HashMap;

/// Conventional field carrying the subject identifier.
pub const SUBJECT_VAR: &str = "s";
/// Conventional field carrying the target column name.
pub const COLUMN_NAME_VAR: &str = "column_name";
/// Conventional field carrying the cell value.
pub const VALUE_VAR: &str = "entity_name";
/// Key under which the subject identifier lands in each pivoted row.
pub const SUBJECT_KEY: &str = "subject";

/// Regroup triple-shaped rows into one row per distinct subject.
///
/// Rows are consumed in order; each subject gets an accumulator on first
/// sight, seeded with the subject under [`SUBJECT_KEY`], and output order is
/// first-seen-subject order. Duplicate (subject, column) pairs are
/// last-write-wins. Rows without a subject or column name cannot be placed
/// anywhere and are skipped with a warning. The provenance tag carries over
/// unchanged, empty input included.
pub fn pivot(rows: &RowSet) -> RowSet {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut pivoted: Vec<Row> = Vec::new();

    for (position, row) in rows.rows().iter().enumerate() {
        let subject = non_empty(row, SUBJECT_VAR);
        let column = non_empty(row, COLUMN_NAME_VAR);
        let (Some(subject), Some(column)) = (subject, column) else {
            tracing::warn!(position, "skipping triple row without subject or column name");
            continue;
        };

        let slot = match index.get(subject) {
            Some(&slot) => slot,
            None => {
                let mut seeded = Row::new();
                seeded.insert(SUBJECT_KEY.to_string(), CellValue::from(subject));
                index.insert(subject.to_string(), pivoted.len());
                pivoted.push(seeded);
                pivoted.len() - 1
            }
        };

        let value = row
            .get(VALUE_VAR)
            .cloned()
            .unwrap_or_else(|| CellValue::from(""));
        // Last write wins on duplicate (subject, column) pairs.
        pivoted[slot].insert(column.to_string(), value);
    }

    rows.derived(pivoted)
}

/// Unbound variables are normalized to empty strings, so "present but empty"
/// means the same as missing here.
fn non_empty<'a>(row: &'a Row, key: &str) -> Option<&'a str> {
    row.get(key)
        .and_then(CellValue::as_plain)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, column: &str, value: &str) -> Row {
        [
            (SUBJECT_VAR.to_string(), CellValue::from(s)),
            (COLUMN_NAME_VAR.to_string(), CellValue::from(column)),
            (VALUE_VAR.to_string(), CellValue::from(value)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn groups_rows_by_subject() {
        let input = RowSet::pipeline(vec![
            triple("u1", "name", "Alice"),
            triple("u1", "age", "30"),
            triple("u2", "name", "Bob"),
        ]);
        let out = pivot(&input);
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0][SUBJECT_KEY], CellValue::from("u1"));
        assert_eq!(out.rows()[0]["name"], CellValue::from("Alice"));
        assert_eq!(out.rows()[0]["age"], CellValue::from("30"));
        assert_eq!(out.rows()[1][SUBJECT_KEY], CellValue::from("u2"));
        assert!(out.rows()[1].get("age").is_none());
    }

    #[test]
    fn output_is_first_seen_subject_order() {
        let input = RowSet::pipeline(vec![
            triple("b", "x", "1"),
            triple("a", "x", "2"),
            triple("b", "y", "3"),
        ]);
        let out = pivot(&input);
        let subjects: Vec<_> = out
            .rows()
            .iter()
            .map(|r| r[SUBJECT_KEY].as_plain().unwrap())
            .collect();
        assert_eq!(subjects, ["b", "a"]);
    }

    #[test]
    fn duplicate_subject_column_is_last_write_wins() {
        let input = RowSet::pipeline(vec![triple("s1", "a", "x"), triple("s1", "a", "y")]);
        let out = pivot(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0]["a"], CellValue::from("y"));
    }

    #[test]
    fn malformed_rows_are_skipped_without_spurious_entries() {
        let mut no_subject = triple("", "name", "Alice");
        no_subject.remove(SUBJECT_VAR);
        let unbound_column = triple("u1", "", "Alice");
        let input = RowSet::pipeline(vec![no_subject, unbound_column, triple("u2", "n", "v")]);
        let out = pivot(&input);
        assert_eq!(out.len(), 1);
        assert_eq!(out.rows()[0][SUBJECT_KEY], CellValue::from("u2"));
    }

    #[test]
    fn missing_value_field_becomes_empty_cell() {
        let mut row = triple("u1", "name", "x");
        row.remove(VALUE_VAR);
        let out = pivot(&RowSet::pipeline(vec![row]));
        assert_eq!(out.rows()[0]["name"], CellValue::from(""));
    }

    #[test]
    fn empty_input_keeps_tag() {
        let out = pivot(&RowSet::pipeline(vec![]));
        assert!(out.is_empty());
        assert!(out.from_pipeline());

        let out = pivot(&RowSet::external(vec![]));
        assert!(!out.from_pipeline());
    }

    #[test]
    fn input_already_one_row_per_subject_stays_one_row_per_subject() {
        // Each subject appears exactly once, so pivoting must not merge or
        // reorder anything: same row count, same subject order, same values.
        let input = RowSet::pipeline(vec![
            triple("u1", "name", "Alice"),
            triple("u2", "name", "Bob"),
            triple("u3", "name", "Carol"),
        ]);
        let out = pivot(&input);
        assert_eq!(out.len(), input.len());
        for (wide, long) in out.rows().iter().zip(input.rows()) {
            assert_eq!(wide[SUBJECT_KEY], long[SUBJECT_VAR]);
            assert_eq!(wide["name"], long[VALUE_VAR]);
        }
    }
}
