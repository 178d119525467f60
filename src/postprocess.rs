use crate::plan::SortKey;
use crate::types::{ResultRow, SortDirection};
use crate::value::Scalar;
use std::cmp::Ordering;

/// Drops rows whose every grouping value is `0`, `"0"`, `""` or null.
///
/// Without grouping columns the result is one legitimate summary row and is
/// left untouched. Returns the number of rows removed.
pub fn filter_total_rows(rows: &mut Vec<ResultRow>, grouping_columns: &[&str]) -> usize {
    if grouping_columns.is_empty() {
        return 0;
    }
    let before = rows.len();
    rows.retain(|row| {
        !grouping_columns.iter().all(|column| {
            row.get(*column)
                .map_or(true, Scalar::is_total_placeholder)
        })
    });
    before - rows.len()
}

/// Stable multi-key sort. Nulls sort last ascending and first descending.
pub fn sort_rows(rows: &mut [ResultRow], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|lhs, rhs| {
        for key in keys {
            let ord = compare_cells(lhs.get(&key.column), rhs.get(&key.column));
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Ascending order with nulls last.
fn compare_cells(lhs: Option<&Scalar>, rhs: Option<&Scalar>) -> Ordering {
    let lhs = lhs.filter(|v| !v.is_missing());
    let rhs = rhs.filter(|v| !v.is_missing());
    match (lhs, rhs) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(l), Some(r)) => l.compare(r),
    }
}
