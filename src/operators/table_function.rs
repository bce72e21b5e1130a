//! Table function leaf operator.

use crate::error::DbResult;
use crate::expr::functions::table;
use crate::operators::{Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;
use crate::tuples::identifiers::TableIdent;
use crate::tuples::values::FieldValue;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Hosts a registry table function as a row producer. Arguments are
/// evaluated to values at plan time; binding happens on each run so the
/// function's own validation errors surface through the query.
pub struct TableFunctionOperator {
    table: TableIdent,
    function_name: String,
    function_args: Vec<FieldValue>,
}

impl TableFunctionOperator {
    pub fn new(table: TableIdent, function_name: impl Into<String>, args: Vec<FieldValue>) -> Self {
        TableFunctionOperator {
            table,
            function_name: function_name.into(),
            function_args: args,
        }
    }
}

#[async_trait]
impl Operator for TableFunctionOperator {
    fn name(&self) -> &'static str {
        "Generator"
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({ "function": self.function_name })
    }

    async fn run(&self, _args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let env = env.clone();
        env.stats.start_running();

        let function = table::bind(&self.function_name, &self.function_args)?;
        let fields: Vec<_> = function
            .field_names()
            .into_iter()
            .map(|name| self.table.field(name))
            .collect();
        let schema = Arc::new(fields);

        let mut inner = function.generate(self.table.clone());
        let output = try_stream! {
            while let Some(result) = inner.next().await {
                env.check_cancelled()?;
                let row = result?;
                env.stats.row_processed();
                env.stats.row_emitted();
                yield row;
            }
            env.stats.done_running();
        };
        Ok(Rows::from_parts(
            self.table.clone(),
            schema,
            Box::pin(output),
        ))
    }
}
