//! Row ordering.

use crate::error::{DbError, DbResult};
use crate::expr::ast::{compare_sort_keys, SortKey, SortTerm};
use crate::expr::eval::ExpressionEvaluator;
use crate::operators::{drain_input, Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;
use crate::tuples::context::ExecutionContext;
use crate::tuples::rows::Row;

use async_stream::try_stream;
use async_trait::async_trait;

/// Materializes its input and emits it stably sorted by the ORDER BY terms.
/// A term that is a bare positive integer literal is a 1-based positional
/// reference into the row; anything else is evaluated per row. Key
/// evaluation happens once up front so evaluation errors surface before any
/// row is emitted.
pub struct SortOperator {
    order: Vec<SortTerm>,
}

impl SortOperator {
    pub fn new(order: Vec<SortTerm>) -> Self {
        SortOperator { order }
    }

    fn keys_for(&self, row: &Row) -> DbResult<Vec<SortKey>> {
        let ctx = ExecutionContext::new(row);
        let mut keys = Vec::with_capacity(self.order.len());
        for term in &self.order {
            let value = match term.expr.as_position() {
                Some(position) => {
                    if position > row.len() {
                        return Err(DbError::validation(format!(
                            "ORDER BY position {} is out of range",
                            position
                        )));
                    }
                    row.index(position - 1)?.clone()
                }
                None => ExpressionEvaluator::evaluate(&term.expr, &ctx)?,
            };
            keys.push(SortKey {
                value,
                ascending: term.ascending,
            });
        }
        Ok(keys)
    }
}

#[async_trait]
impl Operator for SortOperator {
    fn name(&self) -> &'static str {
        "Sort"
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let table = input.table().clone();
        let fields = input.fields_arc();
        let env = env.clone();

        env.stats.start_running();
        let rows = drain_input(&mut input, &env).await?;

        let mut keyed: Vec<(Vec<SortKey>, Row)> = Vec::with_capacity(rows.len());
        for row in rows {
            keyed.push((self.keys_for(&row)?, row));
        }
        keyed.sort_by(|a, b| compare_sort_keys(&a.0, &b.0));

        let output = try_stream! {
            for (_, row) in keyed {
                env.check_cancelled()?;
                env.stats.row_emitted();
                yield row;
            }
            env.stats.done_running();
        };
        Ok(Rows::from_parts(table, fields, Box::pin(output)))
    }
}
