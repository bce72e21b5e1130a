//! Row limiting.

use crate::error::DbResult;
use crate::operators::{Operator, OperatorArgs, OperatorEnv};
use crate::stream::Rows;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;

/// Stops after `limit` rows. A zero limit performs no upstream pulls at all,
/// so a `LIMIT 0` over an expensive source costs nothing.
pub struct LimitOperator {
    limit: usize,
}

impl LimitOperator {
    pub fn new(limit: usize) -> Self {
        LimitOperator { limit }
    }
}

#[async_trait]
impl Operator for LimitOperator {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({ "limit": self.limit })
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let table = input.table().clone();
        let fields = input.fields_arc();
        let limit = self.limit;
        let env = env.clone();

        env.stats.start_running();
        let output = try_stream! {
            if limit > 0 {
                let mut emitted = 0usize;
                while let Some(result) = input.next().await {
                    env.check_cancelled()?;
                    let row = result?;
                    env.stats.row_processed();
                    env.stats.row_emitted();
                    yield row;
                    emitted += 1;
                    if emitted >= limit {
                        break;
                    }
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
    use crate::operators::test_support::{int_values, rows_from};
    use crate::stream::Rows;
    use crate::tuples::identifiers::TableIdent;
    use crate::tuples::rows::Row;
    use crate::tuples::values::FieldValue;
    use async_stream::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_rows(pulls: Arc<AtomicUsize>) -> Rows {
        let table = TableIdent::relation("t");
        let fields = vec![table.field("x")];
        let schema = Arc::new(fields.clone());
        let upstream = stream! {
            for i in 0..10i64 {
                pulls.fetch_add(1, Ordering::SeqCst);
                yield Ok(Row::new(Arc::clone(&schema), vec![FieldValue::Integer(i)]));
            }
        };
        Rows::new(table, fields, Box::pin(upstream))
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let rows = rows_from(
            "t",
            &["x"],
            (0..5).map(|i| vec![FieldValue::Integer(i)]).collect(),
        );
        let mut args = OperatorArgs::new();
        args.insert("rows", rows.consume());

        let out = LimitOperator::new(2)
            .run(&mut args, &OperatorEnv::detached("Limit"))
            .await
            .unwrap();
        assert_eq!(int_values(&out).await, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_limit_zero_never_pulls() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let rows = counting_rows(Arc::clone(&pulls));
        let mut args = OperatorArgs::new();
        args.insert("rows", rows.consume());

        let out = LimitOperator::new(0)
            .run(&mut args, &OperatorEnv::detached("Limit"))
            .await
            .unwrap();
        assert!(int_values(&out).await.is_empty());
        assert_eq!(pulls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_limit_stops_pulling_after_bound() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let rows = counting_rows(Arc::clone(&pulls));
        let mut args = OperatorArgs::new();
        args.insert("rows", rows.consume());

        let out = LimitOperator::new(3)
            .run(&mut args, &OperatorEnv::detached("Limit"))
            .await
            .unwrap();
        assert_eq!(int_values(&out).await, vec![0, 1, 2]);
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }
}
