//! Table functions: registry functions that act as leaf row producers
//! instead of per-row scalars.

use crate::error::{DbError, DbResult};
use crate::stream::BoxRowStream;
use crate::tuples::identifiers::TableIdent;
use crate::tuples::rows::Row;
use crate::tuples::values::FieldValue;

use async_stream::stream;
use std::sync::Arc;
use std::time::Duration;

/// A bound table function, ready to produce rows under a table identity.
pub trait TableFunction: Send {
    /// Output column names, in order.
    fn field_names(&self) -> Vec<String>;

    fn generate(self: Box<Self>, table: TableIdent) -> BoxRowStream;
}

impl std::fmt::Debug for dyn TableFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TableFunction")
    }
}

pub fn exists(name: &str) -> bool {
    matches!(name.to_uppercase().as_str(), "GENERATE_SERIES")
}

/// Bind a table function call to its evaluated arguments.
pub fn bind(name: &str, args: &[FieldValue]) -> DbResult<Box<dyn TableFunction>> {
    match name.to_uppercase().as_str() {
        "GENERATE_SERIES" => Ok(Box::new(GenerateSeries::bind(args)?)),
        other => Err(DbError::unknown_function(other, "table")),
    }
}

/// `GENERATE_SERIES(count [, delay_secs])`: yields one integer row per value
/// of `0..count`, pausing `delay_secs` between rows. Cheap enough that it
/// also micro-yields every 100 rows so unrelated operators stay scheduled.
struct GenerateSeries {
    count: i64,
    delay: Duration,
}

impl GenerateSeries {
    fn bind(args: &[FieldValue]) -> DbResult<GenerateSeries> {
        let (count_arg, delay_arg) = match args {
            [count] => (count, None),
            [count, delay] => (count, Some(delay)),
            _ => {
                return Err(DbError::validation(
                    "GENERATE_SERIES function expects 1 or 2 args",
                ))
            }
        };
        let count = match count_arg {
            FieldValue::Integer(n) => *n,
            other => {
                return Err(DbError::type_error("integer count", other.type_name()));
            }
        };
        let delay = match delay_arg {
            None => Duration::ZERO,
            Some(value) => match value.as_f64() {
                Some(secs) if secs >= 0.0 => Duration::from_secs_f64(secs),
                _ => {
                    return Err(DbError::type_error(
                        "non-negative delay",
                        value.type_name(),
                    ))
                }
            },
        };
        Ok(GenerateSeries { count, delay })
    }
}

impl TableFunction for GenerateSeries {
    fn field_names(&self) -> Vec<String> {
        vec!["i".to_string()]
    }

    fn generate(self: Box<Self>, table: TableIdent) -> BoxRowStream {
        let fields = Arc::new(vec![table.field("i")]);
        let GenerateSeries { count, delay } = *self;
        Box::pin(stream! {
            for i in 0..count {
                yield Ok(Row::new(
                    Arc::clone(&fields),
                    vec![FieldValue::Integer(i)],
                ));
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                } else if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    }
}
