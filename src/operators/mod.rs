//! The relational operator library.
//!
//! Every operator consumes zero or more named input streams and produces one
//! [`Rows`] output, usually backed by an async generator that pulls its
//! inputs lazily. Operators are stateless between runs; per-run state lives
//! in the generator, and per-query state (stats sink, cancellation) arrives
//! through an [`OperatorEnv`].

pub mod aggregate;
pub mod create;
pub mod distinct;
pub mod filter;
pub mod joins;
pub mod limit;
pub mod project;
pub mod rename;
pub mod scan;
pub mod sorting;
pub mod stats;
pub mod table_function;
pub mod union;

use crate::error::{DbError, DbResult};
use crate::stream::{RowConsumer, Rows};
use stats::{CancelToken, QueryContext, StatsHandle};

use async_trait::async_trait;
use std::collections::HashMap;

/// Named input streams for one operator invocation. Most operators take a
/// single `rows` input; joins take `left`/`right`; union takes the
/// list-valued `inputs`.
#[derive(Default)]
pub struct OperatorArgs {
    single: HashMap<String, RowConsumer>,
    lists: HashMap<String, Vec<RowConsumer>>,
}

impl OperatorArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, consumer: RowConsumer) {
        self.single.insert(name.to_string(), consumer);
    }

    pub fn push_list(&mut self, name: &str, consumer: RowConsumer) {
        self.lists.entry(name.to_string()).or_default().push(consumer);
    }

    pub fn take_one(&mut self, name: &str) -> DbResult<RowConsumer> {
        self.single
            .remove(name)
            .ok_or_else(|| DbError::execution(format!("Operator input '{}' is missing", name)))
    }

    pub fn take_many(&mut self, name: &str) -> DbResult<Vec<RowConsumer>> {
        let consumers = self.lists.remove(name).unwrap_or_default();
        if consumers.is_empty() {
            return Err(DbError::execution(format!(
                "Operator input '{}' is missing",
                name
            )));
        }
        Ok(consumers)
    }
}

/// Per-invocation environment: this operator's stats handle plus the query's
/// cancellation token. Cloned into output generators.
#[derive(Clone)]
pub struct OperatorEnv {
    pub stats: StatsHandle,
    pub cancel: CancelToken,
}

impl OperatorEnv {
    pub fn new(stats: StatsHandle, cancel: CancelToken) -> Self {
        OperatorEnv { stats, cancel }
    }

    /// An environment not attached to a running query. Stats snapshots are
    /// discarded and nothing can cancel the operator.
    pub fn detached(name: &str) -> Self {
        let ctx = QueryContext::detached();
        OperatorEnv {
            stats: ctx.stats_handle(0, name),
            cancel: ctx.cancel_token(),
        }
    }

    pub fn check_cancelled(&self) -> DbResult<()> {
        self.cancel.check()
    }
}

/// Drain an input view completely, checking cancellation at each pull and
/// counting every row as processed. Blocking operators buffer through this.
pub(crate) async fn drain_input(
    input: &mut RowConsumer,
    env: &OperatorEnv,
) -> DbResult<Vec<crate::tuples::rows::Row>> {
    use futures::StreamExt;

    let mut rows = Vec::new();
    while let Some(result) = input.next().await {
        env.check_cancelled()?;
        let row = result?;
        env.stats.row_processed();
        rows.push(row);
    }
    Ok(rows)
}

/// One relational operator: a plan node that turns named input streams into
/// an output stream.
#[async_trait]
pub trait Operator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Operator-specific metadata surfaced alongside stats events.
    fn details(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    /// Mutations emit a status line instead of a result schema and rows.
    fn is_mutation(&self) -> bool {
        false
    }

    fn status_line(&self) -> Option<String> {
        None
    }

    async fn run(&self, args: &mut OperatorArgs, env: &OperatorEnv) -> DbResult<Rows>;
}
