//! Row filtering by predicate.

use crate::error::DbResult;
use crate::expr::ast::Expr;
use crate::expr::eval::ExpressionEvaluator;
use crate::operators::{Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;
use crate::tuples::context::ExecutionContext;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;

/// Emits the rows for which the predicate is truthy. NULL predicates drop
/// the row.
pub struct FilterOperator {
    predicate: Expr,
}

impl FilterOperator {
    pub fn new(predicate: Expr) -> Self {
        FilterOperator { predicate }
    }
}

#[async_trait]
impl Operator for FilterOperator {
    fn name(&self) -> &'static str {
        "Filter"
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let table = input.table().clone();
        let fields = input.fields_arc();
        let predicate = self.predicate.clone();
        let env = env.clone();

        env.stats.start_running();
        let output = try_stream! {
            while let Some(result) = input.next().await {
                env.check_cancelled()?;
                let row = result?;
                env.stats.row_processed();
                let keep = ExpressionEvaluator::evaluate_predicate(
                    &predicate,
                    &ExecutionContext::new(&row),
                )?;
                if keep {
                    env.stats.row_emitted();
                    yield row;
                }
            }
            env.stats.done_running();
        };
        Ok(Rows::from_parts(table, fields, Box::pin(output)))
    }
}
