//! Projection, including window evaluation.
//!
//! A projection list that contains no window call streams row by row. As
//! soon as any output expression carries an `OVER` clause, the operator
//! materializes its input first: window functions need random access to the
//! whole row set, so there is nothing to emit until the input is complete.

use crate::error::DbResult;
use crate::expr::ast::ProjectionList;
use crate::expr::eval::ExpressionEvaluator;
use crate::operators::{drain_input, Operator, OperatorArgs, OperatorEnv};
use crate::stream::{RowConsumer, Rows};
use crate::tuples::context::ExecutionContext;
use crate::tuples::identifiers::FieldIdent;
use crate::tuples::rows::Row;
use crate::tuples::values::FieldValue;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

pub struct ProjectOperator {
    projections: ProjectionList,
}

impl ProjectOperator {
    pub fn new(projections: ProjectionList) -> Self {
        ProjectOperator { projections }
    }

    /// Output schema: `*` expands to the input fields in place; everything
    /// else is named by alias, derivable name, or position.
    fn output_fields(&self, input: &RowConsumer) -> Vec<FieldIdent> {
        let mut fields = Vec::new();
        for (i, projection) in self.projections.projections.iter().enumerate() {
            if projection.is_star() {
                fields.extend(input.fields().iter().cloned());
            } else {
                fields.push(input.table().field(projection.output_name(i)));
            }
        }
        fields
    }

}

fn project_row(projections: &ProjectionList, ctx: &ExecutionContext<'_>) -> DbResult<Vec<FieldValue>> {
    let mut values = Vec::with_capacity(projections.projections.len());
    for projection in &projections.projections {
        if projection.is_star() {
            values.extend(ctx.row.data().iter().cloned());
        } else {
            values.push(ExpressionEvaluator::evaluate(&projection.expr, ctx)?);
        }
    }
    Ok(values)
}

#[async_trait]
impl Operator for ProjectOperator {
    fn name(&self) -> &'static str {
        if self.projections.has_window_call() {
            "Window"
        } else {
            "Project"
        }
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let table = input.table().clone();
        let schema = Arc::new(self.output_fields(&input));
        let env = env.clone();

        env.stats.start_running();

        if self.projections.has_window_call() {
            let rows = drain_input(&mut input, &env).await?;
            let mut projected = Vec::with_capacity(rows.len());
            for (index, row) in rows.iter().enumerate() {
                env.check_cancelled()?;
                let ctx = ExecutionContext::with_rows(row, index, &rows);
                projected.push(Row::new(
                    Arc::clone(&schema),
                    project_row(&self.projections, &ctx)?,
                ));
            }

            let output = {
                let env = env.clone();
                try_stream! {
                    for row in projected {
                        env.stats.row_emitted();
                        yield row;
                    }
                    env.stats.done_running();
                }
            };
            return Ok(Rows::from_parts(table, schema, Box::pin(output)));
        }

        let projections = self.projections.clone();
        let output = {
            let schema = Arc::clone(&schema);
            try_stream! {
                while let Some(result) = input.next().await {
                    env.check_cancelled()?;
                    let row = result?;
                    env.stats.row_processed();
                    let values = project_row(&projections, &ExecutionContext::new(&row))?;
                    env.stats.row_emitted();
                    yield Row::new(Arc::clone(&schema), values);
                }
                env.stats.done_running();
            }
        };
        Ok(Rows::from_parts(table, schema, Box::pin(output)))
    }
}
