//! Expression evaluation against a row context.

use crate::error::{DbError, DbResult};
use crate::expr::ast::{BinaryOp, Expr};
use crate::expr::functions::{scalar, window};
use crate::tuples::context::ExecutionContext;
use crate::tuples::values::FieldValue;
use std::cmp::Ordering;

/// Pure evaluator for [`Expr`] trees. Aggregate calls are not evaluable
/// here; the aggregate operator intercepts them and feeds accumulators
/// instead. Window calls require a context carrying the materialized row
/// set.
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn evaluate(expr: &Expr, ctx: &ExecutionContext) -> DbResult<FieldValue> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Column(name) => Ok(ctx.row.field(name)?.clone()),
            Expr::Star => Err(DbError::execution(
                "* can only appear as a whole projection",
            )),
            Expr::Binary { op, left, right } => Self::evaluate_binary(*op, left, right, ctx),
            Expr::Case {
                branches,
                else_expr,
            } => {
                for (cond, value) in branches {
                    if Self::evaluate(cond, ctx)?.is_truthy() {
                        return Self::evaluate(value, ctx);
                    }
                }
                match else_expr {
                    Some(expr) => Self::evaluate(expr, ctx),
                    None => Ok(FieldValue::Null),
                }
            }
            Expr::Cast { expr, target } => Self::evaluate(expr, ctx)?.cast_to(target),
            Expr::ScalarCall { name, args } => scalar::evaluate(name, args, ctx),
            Expr::AggregateCall { name, .. } => Err(DbError::execution(format!(
                "Aggregate function {} used outside an aggregation",
                name
            ))),
            Expr::WindowCall { name, args, spec } => {
                window::evaluate_call(name, args, spec, ctx)
            }
        }
    }

    /// Evaluate and apply SQL truthiness, for filters and join predicates.
    pub fn evaluate_predicate(expr: &Expr, ctx: &ExecutionContext) -> DbResult<bool> {
        Ok(Self::evaluate(expr, ctx)?.is_truthy())
    }

    fn evaluate_binary(
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        ctx: &ExecutionContext,
    ) -> DbResult<FieldValue> {
        // AND short-circuits: the right operand is not evaluated when the
        // left is falsy.
        if op == BinaryOp::And {
            if !Self::evaluate_predicate(left, ctx)? {
                return Ok(FieldValue::Boolean(false));
            }
            return Ok(FieldValue::Boolean(Self::evaluate_predicate(right, ctx)?));
        }

        let lhs = Self::evaluate(left, ctx)?;
        let rhs = Self::evaluate(right, ctx)?;

        match op {
            BinaryOp::Add => lhs.add(&rhs),
            BinaryOp::Subtract => lhs.subtract(&rhs),
            BinaryOp::Multiply => lhs.multiply(&rhs),
            BinaryOp::Divide => lhs.divide(&rhs),
            BinaryOp::Or => match (lhs.is_null(), rhs.is_null()) {
                (true, _) | (_, true) => Ok(FieldValue::Null),
                _ => Ok(FieldValue::Boolean(lhs.is_truthy() || rhs.is_truthy())),
            },
            BinaryOp::Eq => lhs.equals(&rhs),
            BinaryOp::NotEq => match lhs.equals(&rhs)? {
                FieldValue::Boolean(b) => Ok(FieldValue::Boolean(!b)),
                other => Ok(other),
            },
            BinaryOp::Lt => Self::ordering_result(&lhs, &rhs, |o| o == Ordering::Less),
            BinaryOp::LtEq => Self::ordering_result(&lhs, &rhs, |o| o != Ordering::Greater),
            BinaryOp::Gt => Self::ordering_result(&lhs, &rhs, |o| o == Ordering::Greater),
            BinaryOp::GtEq => Self::ordering_result(&lhs, &rhs, |o| o != Ordering::Less),
            BinaryOp::Is => Ok(FieldValue::Boolean(lhs.loose_eq(&rhs))),
            BinaryOp::IsNot => Ok(FieldValue::Boolean(!lhs.loose_eq(&rhs))),
            BinaryOp::And => unreachable!("AND handled above"),
        }
    }

    fn ordering_result(
        lhs: &FieldValue,
        rhs: &FieldValue,
        check: impl Fn(Ordering) -> bool,
    ) -> DbResult<FieldValue> {
        match lhs.compare(rhs)? {
            Some(ordering) => Ok(FieldValue::Boolean(check(ordering))),
            None => Ok(FieldValue::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuples::identifiers::TableIdent;
    use crate::tuples::rows::Row;
    use std::sync::Arc;

    fn row(cols: &[(&str, FieldValue)]) -> Row {
        let table = TableIdent::relation("t");
        let fields = Arc::new(
            cols.iter()
                .map(|(name, _)| table.field(*name))
                .collect::<Vec<_>>(),
        );
        Row::new(fields, cols.iter().map(|(_, v)| v.clone()).collect())
    }

    fn eval(expr: &Expr, row: &Row) -> DbResult<FieldValue> {
        ExpressionEvaluator::evaluate(expr, &ExecutionContext::new(row))
    }

    #[test]
    fn test_column_and_arithmetic() {
        let row = row(&[("x", FieldValue::Integer(10))]);
        let expr = Expr::binary(BinaryOp::Add, Expr::column("x"), Expr::int(5));
        assert_eq!(eval(&expr, &row).unwrap(), FieldValue::Integer(15));
    }

    #[test]
    fn test_and_short_circuits_over_errors() {
        // The right side would divide by zero, but a falsy left side means
        // it is never evaluated.
        let row = row(&[("x", FieldValue::Integer(0))]);
        let divide = Expr::binary(BinaryOp::Divide, Expr::int(1), Expr::int(0));
        let expr = Expr::binary(BinaryOp::And, Expr::column("x"), divide);
        assert_eq!(eval(&expr, &row).unwrap(), FieldValue::Boolean(false));
    }

    #[test]
    fn test_comparison_null_propagation() {
        let row = row(&[("x", FieldValue::Null)]);
        let expr = Expr::binary(BinaryOp::Lt, Expr::column("x"), Expr::int(5));
        assert_eq!(eval(&expr, &row).unwrap(), FieldValue::Null);
    }

    #[test]
    fn test_is_null_is_null_safe() {
        let row = row(&[("x", FieldValue::Null)]);
        let expr = Expr::binary(BinaryOp::Is, Expr::column("x"), Expr::null());
        assert_eq!(eval(&expr, &row).unwrap(), FieldValue::Boolean(true));

        let expr = Expr::binary(BinaryOp::IsNot, Expr::column("x"), Expr::null());
        assert_eq!(eval(&expr, &row).unwrap(), FieldValue::Boolean(false));
    }

    #[test]
    fn test_case_when_falls_through_to_else() {
        let row = row(&[("x", FieldValue::Integer(3))]);
        let expr = Expr::Case {
            branches: vec![(
                Expr::binary(BinaryOp::Gt, Expr::column("x"), Expr::int(10)),
                Expr::text("big"),
            )],
            else_expr: Some(Box::new(Expr::text("small"))),
        };
        assert_eq!(
            eval(&expr, &row).unwrap(),
            FieldValue::Text("small".to_string())
        );
    }

    #[test]
    fn test_case_without_else_yields_null() {
        let row = row(&[("x", FieldValue::Integer(3))]);
        let expr = Expr::Case {
            branches: vec![(Expr::Literal(FieldValue::Boolean(false)), Expr::int(1))],
            else_expr: None,
        };
        assert_eq!(eval(&expr, &row).unwrap(), FieldValue::Null);
    }

    #[test]
    fn test_cast_chain() {
        let row = row(&[("x", FieldValue::Float(3.7))]);
        let expr = Expr::Cast {
            expr: Box::new(Expr::column("x")),
            target: "INT".to_string(),
        };
        assert_eq!(eval(&expr, &row).unwrap(), FieldValue::Integer(3));
    }

    #[test]
    fn test_aggregate_outside_aggregation_errors() {
        let row = row(&[("x", FieldValue::Integer(1))]);
        let expr = Expr::aggregate("SUM", vec![Expr::column("x")]);
        assert!(eval(&expr, &row).is_err());
    }

    #[test]
    fn test_missing_field_errors() {
        let row = row(&[("x", FieldValue::Integer(1))]);
        let expr = Expr::column("y");
        assert!(matches!(
            eval(&expr, &row).unwrap_err(),
            DbError::UnknownField { .. }
        ));
    }
}
