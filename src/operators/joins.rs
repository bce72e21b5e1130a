//! Nested-loop and hash joins.
//!
//! Both join operators materialize their inputs and emit rows under a
//! synthetic "merged" table identity whose fields keep their original
//! qualifiers, so `left.col` and `right.col` both stay resolvable in the
//! joined row.

use crate::error::{DbError, DbResult};
use crate::expr::ast::{BinaryOp, Expr};
use crate::expr::eval::ExpressionEvaluator;
use crate::operators::{drain_input, Operator, OperatorArgs, OperatorEnv};
use crate::stream::{RowConsumer, Rows};
use crate::tuples::context::ExecutionContext;
use crate::tuples::identifiers::{FieldIdent, TableIdent};
use crate::tuples::rows::Row;
use crate::tuples::values::{group_key, FieldValue};

use async_stream::try_stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
    FullOuter,
    Cross,
}

impl JoinKind {
    fn label(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::LeftOuter => "LEFT OUTER",
            JoinKind::RightOuter => "RIGHT OUTER",
            JoinKind::FullOuter => "FULL OUTER",
            JoinKind::Cross => "CROSS",
        }
    }

    fn check_supported(&self) -> DbResult<()> {
        match self {
            JoinKind::RightOuter | JoinKind::FullOuter => Err(DbError::unsupported(format!(
                "{} JOIN is not implemented",
                self.label()
            ))),
            _ => Ok(()),
        }
    }
}

/// Join matching condition. `Using` compares the named column on each side
/// with NULL-rejecting equality, which is also how NATURAL joins are
/// planned.
#[derive(Debug, Clone)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<String>),
    /// Cross joins have no condition; every pair matches.
    Unconditional,
}

impl JoinCondition {
    fn matches(&self, merged: &Row, left_width: usize) -> DbResult<bool> {
        match self {
            JoinCondition::Unconditional => Ok(true),
            JoinCondition::On(expr) => {
                ExpressionEvaluator::evaluate_predicate(expr, &ExecutionContext::new(merged))
            }
            JoinCondition::Using(columns) => {
                for column in columns {
                    let left = lookup_side(merged, column, 0, left_width)?;
                    let right = lookup_side(merged, column, left_width, merged.len())?;
                    if !left.equals(right)?.is_truthy() {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}

/// Resolve `name` within one side of a merged row, by position range.
fn lookup_side<'a>(
    merged: &'a Row,
    name: &str,
    start: usize,
    end: usize,
) -> DbResult<&'a FieldValue> {
    let mut found = None;
    for i in start..end {
        if merged.fields()[i].matches(name) {
            if found.is_some() {
                return Err(DbError::AmbiguousField {
                    name: name.to_string(),
                });
            }
            found = Some(i);
        }
    }
    match found {
        Some(i) => merged.index(i),
        None => Err(DbError::UnknownField {
            name: name.to_string(),
        }),
    }
}

fn merged_schema(left: &RowConsumer, right: &RowConsumer) -> Arc<Vec<FieldIdent>> {
    let mut fields = Vec::with_capacity(left.fields().len() + right.fields().len());
    fields.extend(left.fields().iter().cloned());
    fields.extend(right.fields().iter().cloned());
    Arc::new(fields)
}

/// The general-purpose join: every left row against every right row.
pub struct NestedLoopJoinOperator {
    kind: JoinKind,
    condition: JoinCondition,
}

impl NestedLoopJoinOperator {
    pub fn new(kind: JoinKind, condition: JoinCondition) -> Self {
        NestedLoopJoinOperator { kind, condition }
    }
}

#[async_trait]
impl Operator for NestedLoopJoinOperator {
    fn name(&self) -> &'static str {
        "Nested Loop Join"
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({ "join_type": self.kind.label() })
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        self.kind.check_supported()?;

        let mut left = args.take_one("left")?;
        let mut right = args.take_one("right")?;
        let schema = merged_schema(&left, &right);
        let left_width = left.fields().len();
        let right_nulls = right.null_data();
        let kind = self.kind;
        let condition = self.condition.clone();
        let env = env.clone();

        env.stats.start_running();
        let left_rows = drain_input(&mut left, &env).await?;
        let right_rows = drain_input(&mut right, &env).await?;

        let output = {
            let schema = Arc::clone(&schema);
            try_stream! {
                for lrow in left_rows {
                    env.check_cancelled()?;
                    let mut matched = false;
                    for rrow in &right_rows {
                        let merged = Row::merge(&lrow, rrow, Arc::clone(&schema));
                        if condition.matches(&merged, left_width)? {
                            matched = true;
                            env.stats.row_emitted();
                            yield merged;
                        }
                    }
                    if !matched && kind == JoinKind::LeftOuter {
                        let mut data = lrow.data().to_vec();
                        data.extend(right_nulls.iter().cloned());
                        env.stats.row_emitted();
                        yield Row::new(Arc::clone(&schema), data);
                    }
                }
                env.stats.done_running();
            }
        };
        Ok(Rows::from_parts(
            TableIdent::merged(),
            schema,
            Box::pin(output),
        ))
    }
}

/// Equality join via hash buckets on a single key column per side.
#[derive(Debug)]
pub struct HashJoinOperator {
    kind: JoinKind,
    left_key: String,
    right_key: String,
}

impl HashJoinOperator {
    /// Validates the join condition up front: anything but a two-column
    /// equality is rejected at plan construction.
    pub fn try_new(kind: JoinKind, condition: &Expr) -> DbResult<Self> {
        kind.check_supported()?;
        match condition {
            Expr::Binary {
                op: BinaryOp::Eq,
                left,
                right,
            } => match (left.as_ref(), right.as_ref()) {
                (Expr::Column(l), Expr::Column(r)) => Ok(HashJoinOperator {
                    kind,
                    left_key: l.clone(),
                    right_key: r.clone(),
                }),
                _ => Err(DbError::unsupported(
                    "HashJoin is only implemented for equi-joins",
                )),
            },
            _ => Err(DbError::unsupported(
                "HashJoin is only implemented for equi-joins",
            )),
        }
    }

    /// Orient the condition's two column names to (left input, right input).
    fn oriented_keys(&self, left: &RowConsumer) -> (String, String) {
        let resolves_left = left.fields().iter().any(|f| f.matches(&self.left_key));
        if resolves_left {
            (self.left_key.clone(), self.right_key.clone())
        } else {
            (self.right_key.clone(), self.left_key.clone())
        }
    }
}

#[async_trait]
impl Operator for HashJoinOperator {
    fn name(&self) -> &'static str {
        "Hash Join"
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "join_type": self.kind.label(),
            "on": format!("{} = {}", self.left_key, self.right_key),
        })
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut left = args.take_one("left")?;
        let mut right = args.take_one("right")?;
        let schema = merged_schema(&left, &right);
        let right_nulls = right.null_data();
        let (left_key, right_key) = self.oriented_keys(&left);
        let kind = self.kind;
        let env = env.clone();

        env.stats.start_running();
        let left_rows = drain_input(&mut left, &env).await?;
        let right_rows = drain_input(&mut right, &env).await?;

        // Build side: bucket right rows by key. NULL keys never match.
        let mut buckets: HashMap<String, Vec<Row>> = HashMap::new();
        for row in right_rows {
            let value = row.field(&right_key)?;
            if value.is_null() {
                continue;
            }
            buckets
                .entry(group_key(std::slice::from_ref(value)))
                .or_default()
                .push(row);
        }

        let output = {
            let schema = Arc::clone(&schema);
            try_stream! {
                for lrow in left_rows {
                    env.check_cancelled()?;
                    let value = lrow.field(&left_key)?.clone();
                    let bucket = if value.is_null() {
                        None
                    } else {
                        buckets.get(&group_key(std::slice::from_ref(&value)))
                    };
                    match bucket {
                        Some(matches) => {
                            for rrow in matches {
                                env.stats.row_emitted();
                                yield Row::merge(&lrow, rrow, Arc::clone(&schema));
                            }
                        }
                        None if kind == JoinKind::LeftOuter => {
                            let mut data = lrow.data().to_vec();
                            data.extend(right_nulls.iter().cloned());
                            env.stats.row_emitted();
                            yield Row::new(Arc::clone(&schema), data);
                        }
                        None => {}
                    }
                }
                env.stats.done_running();
            }
        };
        Ok(Rows::from_parts(
            TableIdent::merged(),
            schema,
            Box::pin(output),
        ))
    }
}
