//! Window functions.
//!
//! A window call sees the whole materialized row set of its operator. The
//! current row's partition is the subset of rows sharing its `PARTITION BY`
//! key, in encounter order, stably re-sorted by the `ORDER BY` terms. The
//! frame is an inclusive index range within that partition; without an
//! explicit frame the whole partition is used.
//!
//! `LAG`/`LEAD` deliberately index the ordered partition, not the frame.

use crate::error::{DbError, DbResult};
use crate::expr::ast::{
    compare_sort_keys, Expr, FrameBound, FrameSpec, SortKey, SortTerm, WindowSpec,
};
use crate::expr::eval::ExpressionEvaluator;
use crate::tuples::context::ExecutionContext;
use crate::tuples::rows::Row;
use crate::tuples::values::{group_key, FieldValue};

/// A window function evaluated once per row against that row's ordered
/// partition and resolved frame.
pub trait WindowFunction: Send + Sync {
    fn evaluate(
        &self,
        args: &[Expr],
        partition: &[Row],
        index: usize,
        frame: &[Row],
    ) -> DbResult<FieldValue>;
}

pub fn exists(name: &str) -> bool {
    lookup(name).is_ok()
}

fn lookup(name: &str) -> DbResult<&'static dyn WindowFunction> {
    match name.to_uppercase().as_str() {
        "COUNT" => Ok(&WindowCount),
        "ROW_NUMBER" => Ok(&RowNumber),
        "SUM" => Ok(&WindowSum),
        "MIN" => Ok(&WindowMin),
        "MAX" => Ok(&WindowMax),
        "AVG" | "MEAN" => Ok(&WindowAverage),
        "LAG" => Ok(&Lag),
        "LEAD" => Ok(&Lead),
        other => Err(DbError::unknown_function(other, "window")),
    }
}

/// Evaluate one window call for the row in `ctx`, which must carry the full
/// materialized row set and the current row's index within it.
pub fn evaluate_call(
    name: &str,
    args: &[Expr],
    spec: &WindowSpec,
    ctx: &ExecutionContext,
) -> DbResult<FieldValue> {
    let func = lookup(name)?;
    let rows = ctx.rows.ok_or_else(|| {
        DbError::execution(format!(
            "Window function {} requires a materialized row set",
            name
        ))
    })?;
    let row_index = ctx.row_index.ok_or_else(|| {
        DbError::execution(format!("Window function {} requires a row position", name))
    })?;

    let current_key = partition_key(&spec.partition_by, ctx.row)?;
    let mut members: Vec<usize> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if partition_key(&spec.partition_by, row)? == current_key {
            members.push(i);
        }
    }

    if !spec.order_by.is_empty() {
        let mut keyed: Vec<(Vec<SortKey>, usize)> = Vec::with_capacity(members.len());
        for i in members {
            keyed.push((sort_keys(&spec.order_by, &rows[i])?, i));
        }
        keyed.sort_by(|a, b| compare_sort_keys(&a.0, &b.0));
        members = keyed.into_iter().map(|(_, i)| i).collect();
    }

    let position = members
        .iter()
        .position(|&i| i == row_index)
        .ok_or_else(|| DbError::execution("Current row is missing from its own partition"))?;
    let partition: Vec<Row> = members.iter().map(|&i| rows[i].clone()).collect();

    let frame_spec = spec.frame.unwrap_or(FrameSpec {
        start: FrameBound::UnboundedPreceding,
        end: FrameBound::UnboundedFollowing,
    });
    let frame: &[Row] = match frame_spec.resolve(partition.len(), position) {
        Some((start, end)) => &partition[start..=end],
        None => &[],
    };

    func.evaluate(args, &partition, position, frame)
}

fn partition_key(exprs: &[Expr], row: &Row) -> DbResult<String> {
    let ctx = ExecutionContext::new(row);
    let mut values = Vec::with_capacity(exprs.len());
    for expr in exprs {
        values.push(ExpressionEvaluator::evaluate(expr, &ctx)?);
    }
    Ok(group_key(&values))
}

fn sort_keys(terms: &[SortTerm], row: &Row) -> DbResult<Vec<SortKey>> {
    let ctx = ExecutionContext::new(row);
    let mut keys = Vec::with_capacity(terms.len());
    for term in terms {
        keys.push(SortKey {
            value: ExpressionEvaluator::evaluate(&term.expr, &ctx)?,
            ascending: term.ascending,
        });
    }
    Ok(keys)
}

fn single_arg<'a>(name: &str, args: &'a [Expr]) -> DbResult<&'a Expr> {
    match args {
        [arg] => Ok(arg),
        _ => Err(DbError::validation(format!(
            "{} takes exactly one argument, got {}",
            name,
            args.len()
        ))),
    }
}

fn frame_values(expr: &Expr, frame: &[Row]) -> DbResult<Vec<FieldValue>> {
    let mut values = Vec::with_capacity(frame.len());
    for row in frame {
        values.push(ExpressionEvaluator::evaluate(
            expr,
            &ExecutionContext::new(row),
        )?);
    }
    Ok(values)
}

struct WindowCount;

impl WindowFunction for WindowCount {
    fn evaluate(
        &self,
        _args: &[Expr],
        _partition: &[Row],
        _index: usize,
        frame: &[Row],
    ) -> DbResult<FieldValue> {
        Ok(FieldValue::Integer(frame.len() as i64))
    }
}

struct RowNumber;

impl WindowFunction for RowNumber {
    fn evaluate(
        &self,
        args: &[Expr],
        _partition: &[Row],
        index: usize,
        _frame: &[Row],
    ) -> DbResult<FieldValue> {
        if !args.is_empty() {
            return Err(DbError::validation("ROW_NUMBER takes no arguments"));
        }
        Ok(FieldValue::Integer(index as i64 + 1))
    }
}

struct WindowSum;

impl WindowFunction for WindowSum {
    fn evaluate(
        &self,
        args: &[Expr],
        _partition: &[Row],
        _index: usize,
        frame: &[Row],
    ) -> DbResult<FieldValue> {
        let expr = single_arg("SUM", args)?;
        let mut total = FieldValue::Null;
        for value in frame_values(expr, frame)? {
            if value.is_null() {
                continue;
            }
            total = if total.is_null() {
                value
            } else {
                total.add(&value)?
            };
        }
        Ok(total)
    }
}

struct WindowMin;

impl WindowFunction for WindowMin {
    fn evaluate(
        &self,
        args: &[Expr],
        _partition: &[Row],
        _index: usize,
        frame: &[Row],
    ) -> DbResult<FieldValue> {
        extreme("MIN", args, frame, std::cmp::Ordering::Less)
    }
}

struct WindowMax;

impl WindowFunction for WindowMax {
    fn evaluate(
        &self,
        args: &[Expr],
        _partition: &[Row],
        _index: usize,
        frame: &[Row],
    ) -> DbResult<FieldValue> {
        extreme("MAX", args, frame, std::cmp::Ordering::Greater)
    }
}

fn extreme(
    name: &str,
    args: &[Expr],
    frame: &[Row],
    keep: std::cmp::Ordering,
) -> DbResult<FieldValue> {
    let expr = single_arg(name, args)?;
    let mut best = FieldValue::Null;
    for value in frame_values(expr, frame)? {
        if value.is_null() {
            continue;
        }
        if best.is_null() || value.compare(&best)? == Some(keep) {
            best = value;
        }
    }
    Ok(best)
}

struct WindowAverage;

impl WindowFunction for WindowAverage {
    fn evaluate(
        &self,
        args: &[Expr],
        _partition: &[Row],
        _index: usize,
        frame: &[Row],
    ) -> DbResult<FieldValue> {
        let expr = single_arg("AVG", args)?;
        let mut total = 0.0;
        let mut count = 0u64;
        for value in frame_values(expr, frame)? {
            if value.is_null() {
                continue;
            }
            total += value.as_f64().ok_or_else(|| {
                DbError::type_error("numeric value", value.type_name())
            })?;
            count += 1;
        }
        if count == 0 {
            Ok(FieldValue::Null)
        } else {
            Ok(FieldValue::Float(total / count as f64))
        }
    }
}

struct Lag;

impl WindowFunction for Lag {
    fn evaluate(
        &self,
        args: &[Expr],
        partition: &[Row],
        index: usize,
        _frame: &[Row],
    ) -> DbResult<FieldValue> {
        offset_value("LAG", args, partition, index, -1)
    }
}

struct Lead;

impl WindowFunction for Lead {
    fn evaluate(
        &self,
        args: &[Expr],
        partition: &[Row],
        index: usize,
        _frame: &[Row],
    ) -> DbResult<FieldValue> {
        offset_value("LEAD", args, partition, index, 1)
    }
}

fn offset_value(
    name: &str,
    args: &[Expr],
    partition: &[Row],
    index: usize,
    direction: i64,
) -> DbResult<FieldValue> {
    let (expr, offset) = match args {
        [expr] => (expr, 1i64),
        [expr, offset_expr] => {
            let ctx = ExecutionContext::new(&partition[index]);
            match ExpressionEvaluator::evaluate(offset_expr, &ctx)? {
                FieldValue::Integer(n) => (expr, n),
                other => {
                    return Err(DbError::type_error("integer offset", other.type_name()));
                }
            }
        }
        _ => {
            return Err(DbError::validation(format!(
                "{} takes one or two arguments, got {}",
                name,
                args.len()
            )))
        }
    };
    let target = index as i64 + direction * offset;
    if target < 0 || target as usize >= partition.len() {
        return Ok(FieldValue::Null);
    }
    ExpressionEvaluator::evaluate(expr, &ExecutionContext::new(&partition[target as usize]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ast::{FrameBound, FrameSpec};
    use crate::tuples::identifiers::FieldIdent;
    use std::sync::Arc;

    fn test_rows(values: &[(&str, i64)]) -> Vec<Row> {
        let fields = Arc::new(vec![
            FieldIdent::unqualified("grp"),
            FieldIdent::unqualified("val"),
        ]);
        values
            .iter()
            .map(|(grp, val)| {
                Row::new(
                    Arc::clone(&fields),
                    vec![
                        FieldValue::Text(grp.to_string()),
                        FieldValue::Integer(*val),
                    ],
                )
            })
            .collect()
    }

    fn call(
        name: &str,
        args: Vec<Expr>,
        spec: &WindowSpec,
        rows: &[Row],
        index: usize,
    ) -> DbResult<FieldValue> {
        let ctx = ExecutionContext::with_rows(&rows[index], index, rows);
        evaluate_call(name, &args, spec, &ctx)
    }

    #[test]
    fn test_row_number_per_partition() {
        let rows = test_rows(&[("a", 10), ("b", 20), ("a", 30)]);
        let spec = WindowSpec {
            partition_by: vec![Expr::column("grp")],
            order_by: vec![],
            frame: None,
        };
        let got = call("ROW_NUMBER", vec![], &spec, &rows, 2).unwrap();
        assert_eq!(got, FieldValue::Integer(2));
        let got = call("ROW_NUMBER", vec![], &spec, &rows, 1).unwrap();
        assert_eq!(got, FieldValue::Integer(1));
    }

    #[test]
    fn test_sum_defaults_to_whole_partition() {
        let rows = test_rows(&[("a", 1), ("a", 2), ("a", 3)]);
        let spec = WindowSpec::default();
        let got = call("SUM", vec![Expr::column("val")], &spec, &rows, 0).unwrap();
        assert_eq!(got, FieldValue::Integer(6));
    }

    #[test]
    fn test_running_sum_with_frame() {
        let rows = test_rows(&[("a", 1), ("a", 2), ("a", 3)]);
        let spec = WindowSpec {
            partition_by: vec![],
            order_by: vec![SortTerm::asc(Expr::column("val"))],
            frame: Some(FrameSpec {
                start: FrameBound::UnboundedPreceding,
                end: FrameBound::CurrentRow,
            }),
        };
        let got = call("SUM", vec![Expr::column("val")], &spec, &rows, 1).unwrap();
        assert_eq!(got, FieldValue::Integer(3));
    }

    #[test]
    fn test_lag_indexes_partition_not_frame() {
        let rows = test_rows(&[("a", 1), ("a", 2), ("a", 3)]);
        let spec = WindowSpec {
            partition_by: vec![],
            order_by: vec![SortTerm::asc(Expr::column("val"))],
            frame: Some(FrameSpec {
                start: FrameBound::CurrentRow,
                end: FrameBound::CurrentRow,
            }),
        };
        let got = call("LAG", vec![Expr::column("val")], &spec, &rows, 2).unwrap();
        assert_eq!(got, FieldValue::Integer(2));
        let got = call("LAG", vec![Expr::column("val")], &spec, &rows, 0).unwrap();
        assert_eq!(got, FieldValue::Null);
    }

    #[test]
    fn test_lead_with_offset() {
        let rows = test_rows(&[("a", 1), ("a", 2), ("a", 3)]);
        let spec = WindowSpec {
            partition_by: vec![],
            order_by: vec![SortTerm::asc(Expr::column("val"))],
            frame: None,
        };
        let got = call(
            "LEAD",
            vec![Expr::column("val"), Expr::int(2)],
            &spec,
            &rows,
            0,
        )
        .unwrap();
        assert_eq!(got, FieldValue::Integer(3));
    }

    #[test]
    fn test_unknown_window_function() {
        let rows = test_rows(&[("a", 1)]);
        let err = call("NTILE", vec![], &WindowSpec::default(), &rows, 0).unwrap_err();
        assert!(err.to_string().contains("NTILE"));
    }
}
