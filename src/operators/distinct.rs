//! Duplicate row elimination.

use crate::error::DbResult;
use crate::operators::{Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;
use crate::tuples::values::group_key;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;

/// Emits the first occurrence of each distinct row, preserving input order.
/// Row identity uses the grouping key encoding, so `1` and `1.0` collapse.
pub struct DistinctOperator;

impl DistinctOperator {
    pub fn new() -> Self {
        DistinctOperator
    }
}

impl Default for DistinctOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for DistinctOperator {
    fn name(&self) -> &'static str {
        "Distinct"
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let table = input.table().clone();
        let fields = input.fields_arc();
        let env = env.clone();

        env.stats.start_running();
        let output = try_stream! {
            let mut seen: HashSet<String> = HashSet::new();
            while let Some(result) = input.next().await {
                env.check_cancelled()?;
                let row = result?;
                env.stats.row_processed();
                if seen.insert(group_key(row.data())) {
                    env.stats.row_emitted();
                    yield row;
                }
            }
            env.stats.done_running();
        };
        Ok(Rows::from_parts(table, fields, Box::pin(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::test_support::{int_column_rows, int_values};

    #[tokio::test]
    async fn test_distinct_keeps_first_occurrence() {
        let rows = int_column_rows("t", "x", &[3, 1, 3, 2, 1]);
        let mut args = OperatorArgs::new();
        args.insert("rows", rows.consume());

        let out = DistinctOperator::new()
            .run(&mut args, &OperatorEnv::detached("Distinct"))
            .await
            .unwrap();
        assert_eq!(int_values(&out).await, vec![3, 1, 2]);
    }
}
