//! Scope renaming for derived tables.
//!
//! A CTE body produces fields scoped to its source relations, but references
//! to the CTE must resolve against the CTE's own name:
//!
//! ```sql
//! WITH abc AS (SELECT * FROM my_table)
//! SELECT id FROM abc   -- id is abc.id here, not my_table.id
//! ```
//!
//! This operator re-qualifies every field under the derived table's identity
//! without touching row data.

use crate::error::DbResult;
use crate::operators::{Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;
use crate::tuples::identifiers::TableIdent;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

pub struct RenameScopeOperator {
    scope_name: String,
}

impl RenameScopeOperator {
    pub fn new(scope_name: impl Into<String>) -> Self {
        RenameScopeOperator {
            scope_name: scope_name.into(),
        }
    }
}

#[async_trait]
impl Operator for RenameScopeOperator {
    fn name(&self) -> &'static str {
        "Scope"
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({ "scope": self.scope_name })
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let derived = TableIdent::relation(self.scope_name.clone());
        let fields: Vec<_> = input
            .fields()
            .iter()
            .map(|field| field.rescope(&derived))
            .collect();
        let schema = Arc::new(fields.clone());
        let env = env.clone();

        env.stats.start_running();
        let output = {
            let schema = Arc::clone(&schema);
            try_stream! {
                while let Some(result) = input.next().await {
                    env.check_cancelled()?;
                    let row = result?;
                    env.stats.row_processed();
                    env.stats.row_emitted();
                    yield row.with_fields(Arc::clone(&schema));
                }
                env.stats.done_running();
            }
        };
        Ok(Rows::from_parts(derived, schema, Box::pin(output)))
    }
}
