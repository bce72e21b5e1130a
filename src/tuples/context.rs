//! Evaluation context for one expression invocation.

use crate::tuples::rows::Row;

/// The unit of expression evaluation: the current row, plus the fully
/// materialized row set and current index when a window function needs
/// random access within its partition.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub row: &'a Row,
    pub row_index: Option<usize>,
    pub rows: Option<&'a [Row]>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(row: &'a Row) -> Self {
        ExecutionContext {
            row,
            row_index: None,
            rows: None,
        }
    }

    pub fn with_rows(row: &'a Row, row_index: usize, rows: &'a [Row]) -> Self {
        ExecutionContext {
            row,
            row_index: Some(row_index),
            rows: Some(rows),
        }
    }
}
