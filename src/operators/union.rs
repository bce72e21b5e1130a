//! Stream concatenation.

use crate::error::DbResult;
use crate::operators::{Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;
use crate::tuples::values::group_key;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;

/// Concatenates its inputs in plan order, one after another. `UNION` (as
/// opposed to `UNION ALL`) additionally drops rows already emitted. The
/// output takes its shape from the first input; inputs are assumed
/// width-compatible.
pub struct UnionOperator {
    distinct: bool,
}

impl UnionOperator {
    pub fn new(distinct: bool) -> Self {
        UnionOperator { distinct }
    }
}

#[async_trait]
impl Operator for UnionOperator {
    fn name(&self) -> &'static str {
        "Union"
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({ "distinct": self.distinct })
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let inputs = args.take_many("inputs")?;
        let table = inputs[0].table().clone();
        let fields = inputs[0].fields_arc();
        let distinct = self.distinct;
        let env = env.clone();

        env.stats.start_running();
        let output = try_stream! {
            let mut seen: HashSet<String> = HashSet::new();
            for mut input in inputs {
                while let Some(result) = input.next().await {
                    env.check_cancelled()?;
                    let row = result?;
                    env.stats.row_processed();
                    if distinct && !seen.insert(group_key(row.data())) {
                        continue;
                    }
                    env.stats.row_emitted();
                    yield row;
                }
            }
            env.stats.done_running();
        };
        Ok(Rows::from_parts(table, fields, Box::pin(output)))
    }
}
