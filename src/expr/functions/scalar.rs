//! Scalar functions: evaluated per row, no state.

use crate::error::{DbError, DbResult};
use crate::expr::ast::Expr;
use crate::expr::eval::ExpressionEvaluator;
use crate::tuples::context::ExecutionContext;
use crate::tuples::values::FieldValue;

/// Resolve `name` case-insensitively and evaluate the call. Arguments are
/// passed unevaluated so conditional functions can stay lazy.
pub fn evaluate(name: &str, args: &[Expr], ctx: &ExecutionContext) -> DbResult<FieldValue> {
    match name.to_uppercase().as_str() {
        "SIN" => unary_float(name, args, ctx, f64::sin),
        "COS" => unary_float(name, args, ctx, f64::cos),
        // Square wave with the same period as SIN: 1 on the positive half,
        // -1 otherwise.
        "SQR" => {
            if args.len() != 1 {
                return Err(DbError::execution("SQR requires exactly 1 arg"));
            }
            let value = ExpressionEvaluator::evaluate(&args[0], ctx)?;
            match numeric(&value)? {
                Some(v) => Ok(FieldValue::Integer(if v.sin() > 0.0 { 1 } else { -1 })),
                None => Ok(FieldValue::Null),
            }
        }
        "POW" => {
            if args.len() != 2 {
                return Err(DbError::execution("POW requires 2 args"));
            }
            let base = ExpressionEvaluator::evaluate(&args[0], ctx)?;
            let exp = ExpressionEvaluator::evaluate(&args[1], ctx)?;
            match (numeric(&base)?, numeric(&exp)?) {
                (Some(base), Some(exp)) => Ok(FieldValue::Float(base.powf(exp))),
                _ => Ok(FieldValue::Null),
            }
        }
        "IFF" => {
            if args.len() != 3 {
                return Err(DbError::execution("IFF requires 3 args"));
            }
            if ExpressionEvaluator::evaluate_predicate(&args[0], ctx)? {
                ExpressionEvaluator::evaluate(&args[1], ctx)
            } else {
                ExpressionEvaluator::evaluate(&args[2], ctx)
            }
        }
        _ => Err(DbError::unknown_function(name, "scalar")),
    }
}

/// True when `name` resolves to a scalar function.
pub fn exists(name: &str) -> bool {
    matches!(
        name.to_uppercase().as_str(),
        "SIN" | "COS" | "SQR" | "POW" | "IFF"
    )
}

fn unary_float(
    name: &str,
    args: &[Expr],
    ctx: &ExecutionContext,
    f: impl Fn(f64) -> f64,
) -> DbResult<FieldValue> {
    if args.len() != 1 {
        return Err(DbError::execution(format!(
            "{} requires exactly 1 arg",
            name.to_uppercase()
        )));
    }
    let value = ExpressionEvaluator::evaluate(&args[0], ctx)?;
    match numeric(&value)? {
        Some(v) => Ok(FieldValue::Float(f(v))),
        None => Ok(FieldValue::Null),
    }
}

fn numeric(value: &FieldValue) -> DbResult<Option<f64>> {
    match value {
        FieldValue::Integer(i) => Ok(Some(*i as f64)),
        FieldValue::Float(f) => Ok(Some(*f)),
        FieldValue::Null => Ok(None),
        other => Err(DbError::type_error("numeric", other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuples::identifiers::TableIdent;
    use crate::tuples::rows::Row;
    use std::sync::Arc;

    fn empty_row() -> Row {
        Row::new(Arc::new(vec![TableIdent::relation("t").field("x")]), vec![
            FieldValue::Integer(0),
        ])
    }

    #[test]
    fn test_sin_of_zero() {
        let row = empty_row();
        let result = evaluate("sin", &[Expr::int(0)], &ExecutionContext::new(&row)).unwrap();
        assert_eq!(result, FieldValue::Float(0.0));
    }

    #[test]
    fn test_sqr_square_wave() {
        let row = empty_row();
        let ctx = ExecutionContext::new(&row);
        let up = evaluate("SQR", &[Expr::float(1.0)], &ctx).unwrap();
        assert_eq!(up, FieldValue::Integer(1));
        let down = evaluate("SQR", &[Expr::float(4.0)], &ctx).unwrap();
        assert_eq!(down, FieldValue::Integer(-1));
        let null = evaluate("SQR", &[Expr::null()], &ctx).unwrap();
        assert_eq!(null, FieldValue::Null);
    }

    #[test]
    fn test_pow() {
        let row = empty_row();
        let result = evaluate(
            "POW",
            &[Expr::int(2), Expr::int(10)],
            &ExecutionContext::new(&row),
        )
        .unwrap();
        assert_eq!(result, FieldValue::Float(1024.0));
    }

    #[test]
    fn test_iff_is_lazy() {
        // The false branch divides by zero; IFF must never evaluate it.
        let row = empty_row();
        let divide = Expr::binary(
            crate::expr::ast::BinaryOp::Divide,
            Expr::int(1),
            Expr::int(0),
        );
        let result = evaluate(
            "IFF",
            &[Expr::Literal(FieldValue::Boolean(true)), Expr::int(7), divide],
            &ExecutionContext::new(&row),
        )
        .unwrap();
        assert_eq!(result, FieldValue::Integer(7));
    }

    #[test]
    fn test_unknown_function() {
        let row = empty_row();
        let err = evaluate("FROB", &[], &ExecutionContext::new(&row)).unwrap_err();
        assert_eq!(err, DbError::unknown_function("FROB", "scalar"));
    }
}
