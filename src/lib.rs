//! # dbdb
//!
//! An embedded analytical query engine: queries run as DAGs of async
//! relational operators over multicast-replayable row streams, with a
//! per-query event channel reporting schema, result batches, operator
//! statistics, and completion.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dbdb::{Engine, Plan, QueryEvent};
//! use dbdb::operators::table_function::TableFunctionOperator;
//! use dbdb::tuples::identifiers::TableIdent;
//! use dbdb::tuples::values::FieldValue;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut plan = Plan::new();
//!     plan.add_node(Box::new(TableFunctionOperator::new(
//!         TableIdent::relation("series"),
//!         "GENERATE_SERIES",
//!         vec![FieldValue::Integer(5)],
//!     )));
//!
//!     let engine = Engine::new();
//!     let mut handle = engine.dispatch(plan);
//!     while let Some(event) = handle.events.recv().await {
//!         if matches!(event, QueryEvent::QueryComplete { .. }) {
//!             break;
//!         }
//!     }
//! }
//! ```

pub mod engine;
pub mod error;
pub mod expr;
pub mod operators;
pub mod plan;
pub mod storage;
pub mod stream;
pub mod tuples;

pub use engine::{Engine, QueryEvent, QueryHandle, ResultTable};
pub use error::{DbError, DbResult};
pub use expr::{Expr, Projection, ProjectionList, SortTerm};
pub use operators::{Operator, OperatorArgs, OperatorEnv};
pub use plan::{Edge, NodeId, Plan, Planner};
pub use storage::{DataType, MemoryStorage, TableData, TableSource, TableTarget};
pub use stream::{BoxRowStream, RowConsumer, Rows};
pub use tuples::identifiers::{FieldIdent, TableIdent};
pub use tuples::rows::Row;
pub use tuples::values::FieldValue;
