//! CREATE TABLE AS sink.

use crate::error::{DbError, DbResult};
use crate::operators::{drain_input, Operator, OperatorArgs, OperatorEnv};
use crate::storage::{DataType, TableEncoder, TableTarget, WriteMode};
use crate::stream::Rows;
use crate::tuples::identifiers::TableIdent;

use async_trait::async_trait;
use log::info;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const MAX_TABLE_BYTES: usize = 1_000_000;

/// Materializes its input, infers one storage type per column from the
/// first row, and writes the encoded payload to a storage target. Emits no
/// rows; the result of a mutation is its status line.
pub struct CreateTableAsOperator {
    table: TableIdent,
    target: Arc<dyn TableTarget>,
    encoder: Arc<dyn TableEncoder>,
    rows_written: AtomicU64,
}

impl CreateTableAsOperator {
    pub fn new(
        table: TableIdent,
        target: Arc<dyn TableTarget>,
        encoder: Arc<dyn TableEncoder>,
    ) -> Self {
        CreateTableAsOperator {
            table,
            target,
            encoder,
            rows_written: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Operator for CreateTableAsOperator {
    fn name(&self) -> &'static str {
        "Create Table"
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({ "table": self.table.to_string() })
    }

    fn is_mutation(&self) -> bool {
        true
    }

    fn status_line(&self) -> Option<String> {
        Some(format!("CREATE {}", self.rows_written.load(Ordering::Relaxed)))
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows> {
        let mut input = args.take_one("rows")?;
        let table = input.table().clone();
        let fields = input.fields_arc();
        let env = env.clone();

        env.stats.start_running();
        let rows = drain_input(&mut input, &env).await?;

        // Column types come from the first row; an empty result has no
        // types to offer.
        let first = rows
            .first()
            .ok_or_else(|| DbError::execution("Cannot create an empty table"))?;
        let mut columns = Vec::with_capacity(fields.len());
        for (field, value) in fields.iter().zip(first.data()) {
            columns.push((field.name.clone(), DataType::infer(value)?));
        }

        let data: Vec<_> = rows.iter().map(|row| row.data().to_vec()).collect();
        let payload = self.encoder.encode(&columns, &data)?;
        if payload.len() > MAX_TABLE_BYTES {
            return Err(DbError::resource(
                self.table.to_string(),
                format!(
                    "Tried to write {:.2}mb, but the maximum allowed table size is about a megabyte",
                    payload.len() as f64 / MAX_TABLE_BYTES as f64
                ),
            ));
        }

        let mut handle = self.target.open(WriteMode::Create).await?;
        handle.write(&payload).await?;
        self.rows_written.store(rows.len() as u64, Ordering::Relaxed);
        info!("wrote table {} ({} rows)", self.table, rows.len());

        env.stats.done_running();
        Ok(Rows::from_parts(
            table,
            fields,
            Box::pin(futures::stream::empty()),
        ))
    }
}
