//! Expression trees.
//!
//! Expressions are immutable, cloneable data; no evaluation state lives in
//! the tree. Aggregate calls are *bound* to accumulator instances by the
//! aggregate operator, one fresh set per grouping key, so the same parsed
//! tree can safely describe every group.

use crate::error::{DbError, DbResult};
use crate::tuples::values::FieldValue;
use std::collections::HashSet;
use std::fmt;

/// Binary operator kinds. `And` short-circuits; `Is`/`IsNot` are the only
/// NULL-safe comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Is,
    IsNot,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Is => "IS",
            BinaryOp::IsNot => "IS NOT",
        };
        write!(f, "{}", symbol)
    }
}

/// One node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value
    Literal(FieldValue),
    /// Column reference as written in the query, possibly qualified
    Column(String),
    /// `*` — expands to every field of the current row during projection
    Star,
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        target: String,
    },
    ScalarCall {
        name: String,
        args: Vec<Expr>,
    },
    AggregateCall {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    WindowCall {
        name: String,
        args: Vec<Expr>,
        spec: WindowSpec,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }

    pub fn int(value: i64) -> Expr {
        Expr::Literal(FieldValue::Integer(value))
    }

    pub fn float(value: f64) -> Expr {
        Expr::Literal(FieldValue::Float(value))
    }

    pub fn text(value: impl Into<String>) -> Expr {
        Expr::Literal(FieldValue::Text(value.into()))
    }

    pub fn null() -> Expr {
        Expr::Literal(FieldValue::Null)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn aggregate(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::AggregateCall {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    /// The 1-based positional index this expression denotes in an ORDER BY
    /// or GROUP BY list, if it is a plain integer literal.
    pub fn as_position(&self) -> Option<usize> {
        match self {
            Expr::Literal(FieldValue::Integer(i)) if *i >= 1 => Some(*i as usize),
            _ => None,
        }
    }

    /// Fields that end up aggregated by this expression: the scalar inputs
    /// of every aggregate call in the tree. Errors if an aggregate call
    /// wraps another aggregate.
    pub fn aggregated_fields(&self) -> DbResult<HashSet<String>> {
        match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Star => Ok(HashSet::new()),
            Expr::Binary { left, right, .. } => {
                let mut fields = left.aggregated_fields()?;
                fields.extend(right.aggregated_fields()?);
                Ok(fields)
            }
            Expr::Case {
                branches,
                else_expr,
            } => {
                let mut fields = HashSet::new();
                for (cond, value) in branches {
                    fields.extend(cond.aggregated_fields()?);
                    fields.extend(value.aggregated_fields()?);
                }
                if let Some(expr) = else_expr {
                    fields.extend(expr.aggregated_fields()?);
                }
                Ok(fields)
            }
            Expr::Cast { expr, .. } => expr.aggregated_fields(),
            Expr::ScalarCall { args, .. } | Expr::WindowCall { args, .. } => {
                let mut fields = HashSet::new();
                for arg in args {
                    fields.extend(arg.aggregated_fields()?);
                }
                Ok(fields)
            }
            Expr::AggregateCall { args, .. } => {
                let mut fields = HashSet::new();
                for arg in args {
                    if !arg.aggregated_fields()?.is_empty() {
                        return Err(DbError::validation("Cannot aggregate an aggregate"));
                    }
                    fields.extend(arg.non_aggregated_fields()?);
                }
                Ok(fields)
            }
        }
    }

    /// Fields referenced outside any aggregate call.
    pub fn non_aggregated_fields(&self) -> DbResult<HashSet<String>> {
        match self {
            Expr::Literal(_) | Expr::Star => Ok(HashSet::new()),
            Expr::Column(name) => {
                let mut fields = HashSet::new();
                fields.insert(name.clone());
                Ok(fields)
            }
            Expr::Binary { left, right, .. } => {
                let mut fields = left.non_aggregated_fields()?;
                fields.extend(right.non_aggregated_fields()?);
                Ok(fields)
            }
            Expr::Case {
                branches,
                else_expr,
            } => {
                let mut fields = HashSet::new();
                for (cond, value) in branches {
                    fields.extend(cond.non_aggregated_fields()?);
                    fields.extend(value.non_aggregated_fields()?);
                }
                if let Some(expr) = else_expr {
                    fields.extend(expr.non_aggregated_fields()?);
                }
                Ok(fields)
            }
            Expr::Cast { expr, .. } => expr.non_aggregated_fields(),
            Expr::ScalarCall { args, .. } | Expr::WindowCall { args, .. } => {
                let mut fields = HashSet::new();
                for arg in args {
                    fields.extend(arg.non_aggregated_fields()?);
                }
                Ok(fields)
            }
            Expr::AggregateCall { .. } => Ok(HashSet::new()),
        }
    }

    pub fn has_window_call(&self) -> bool {
        match self {
            Expr::WindowCall { .. } => true,
            Expr::Literal(_) | Expr::Column(_) | Expr::Star => false,
            Expr::Binary { left, right, .. } => left.has_window_call() || right.has_window_call(),
            Expr::Case {
                branches,
                else_expr,
            } => {
                branches
                    .iter()
                    .any(|(c, v)| c.has_window_call() || v.has_window_call())
                    || else_expr.as_ref().is_some_and(|e| e.has_window_call())
            }
            Expr::Cast { expr, .. } => expr.has_window_call(),
            Expr::ScalarCall { args, .. } | Expr::AggregateCall { args, .. } => {
                args.iter().any(Expr::has_window_call)
            }
        }
    }

    /// A name this expression can claim on its own: only bare column
    /// references qualify, using the final path segment.
    pub fn derive_name(&self) -> Option<String> {
        match self {
            Expr::Column(name) => name.rsplit('.').next().map(str::to_string),
            _ => None,
        }
    }
}

/// One output column of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl Projection {
    pub fn new(expr: Expr) -> Self {
        Projection { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Projection {
            expr,
            alias: Some(alias.into()),
        }
    }

    pub fn is_star(&self) -> bool {
        matches!(self.expr, Expr::Star)
    }

    /// Output column name: explicit alias, then a self-derivable name, then
    /// a positional fallback.
    pub fn output_name(&self, position: usize) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        self.expr
            .derive_name()
            .unwrap_or_else(|| format!("col_{}", position + 1))
    }
}

/// An ordered projection list, the configuration of projection, window and
/// aggregate operators.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionList {
    pub projections: Vec<Projection>,
}

impl ProjectionList {
    pub fn new(projections: Vec<Projection>) -> Self {
        ProjectionList { projections }
    }

    pub fn has_window_call(&self) -> bool {
        self.projections.iter().any(|p| p.expr.has_window_call())
    }
}

/// One ORDER BY term: an expression (or 1-based positional literal) and a
/// direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SortTerm {
    pub expr: Expr,
    pub ascending: bool,
}

impl SortTerm {
    pub fn asc(expr: Expr) -> Self {
        SortTerm {
            expr,
            ascending: true,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        SortTerm {
            expr,
            ascending: false,
        }
    }
}

/// One evaluated sort key with its direction. Descending terms invert the
/// comparison, so one stable sort over composite keys handles any mix of
/// directions.
#[derive(Debug, Clone)]
pub struct SortKey {
    pub value: FieldValue,
    pub ascending: bool,
}

impl SortKey {
    fn compare(&self, other: &SortKey) -> std::cmp::Ordering {
        let ordering = self.value.sort_cmp(&other.value);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Lexicographic comparison of composite sort keys.
pub fn compare_sort_keys(a: &[SortKey], b: &[SortKey]) -> std::cmp::Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        let ordering = left.compare(right);
        if ordering != std::cmp::Ordering::Equal {
            return ordering;
        }
    }
    std::cmp::Ordering::Equal
}

/// One endpoint of a window frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(usize),
    CurrentRow,
    Following(usize),
    UnboundedFollowing,
}

/// An inclusive `[start, end]` frame relative to the current row within its
/// partition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub start: FrameBound,
    pub end: FrameBound,
}

impl FrameSpec {
    /// Resolve the frame to inclusive partition indices for the row at
    /// `index` in a partition of `len` rows. An inverted or out-of-range
    /// frame resolves to empty.
    pub fn resolve(&self, len: usize, index: usize) -> Option<(usize, usize)> {
        let start = match self.start {
            FrameBound::UnboundedPreceding => 0,
            FrameBound::Preceding(n) => index.saturating_sub(n),
            FrameBound::CurrentRow => index,
            FrameBound::Following(n) => index + n,
            FrameBound::UnboundedFollowing => len.saturating_sub(1),
        };
        let end = match self.end {
            FrameBound::UnboundedPreceding => 0,
            FrameBound::Preceding(n) => index.checked_sub(n)?,
            FrameBound::CurrentRow => index,
            FrameBound::Following(n) => (index + n).min(len.saturating_sub(1)),
            FrameBound::UnboundedFollowing => len.saturating_sub(1),
        };
        if len == 0 || start >= len || start > end {
            None
        } else {
            Some((start, end))
        }
    }
}

/// PARTITION BY / ORDER BY / frame clause of one window call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowSpec {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<SortTerm>,
    pub frame: Option<FrameSpec>,
}
