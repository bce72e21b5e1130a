//! Query driver.
//!
//! Walks a plan in topological order, wiring each node's inputs to fresh
//! consumer views over its producers' outputs, then drains the sink in
//! batches while emitting progress events over an unbounded channel. Once a
//! result batch is delivered it is never retracted; a later failure becomes
//! one terminal `QueryError` event.

use crate::error::{DbError, DbResult};
use crate::operators::stats::{OperatorStats, QueryContext};
use crate::operators::{OperatorArgs, OperatorEnv};
use crate::plan::{NodeId, Plan, Planner};
use crate::stream::Rows;
use crate::tuples::values::FieldValue;

use log::{error, info};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;

const RESULT_BATCH_SIZE: usize = 100;

/// Everything a query can report, in emission order:
/// `QueryStart`, then any mix of `OperatorStats` / `ResultSchema` /
/// `ResultRows`, then `QueryStats`, an optional `QueryMutationStatus`, and
/// exactly one terminal `QueryComplete` or `QueryError`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum QueryEvent {
    QueryStart {
        id: String,
    },
    OperatorStats {
        id: String,
        stats: OperatorStats,
    },
    ResultSchema {
        id: String,
        columns: Vec<String>,
    },
    ResultRows {
        id: String,
        rows: Vec<Vec<FieldValue>>,
    },
    QueryStats {
        id: String,
        elapsed_secs: f64,
        bytes_read: u64,
    },
    QueryMutationStatus {
        id: String,
        status: String,
    },
    QueryError {
        id: String,
        error: String,
    },
    QueryComplete {
        id: String,
    },
}

impl QueryEvent {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryEvent::QueryComplete { .. } | QueryEvent::QueryError { .. }
        )
    }
}

/// A fully materialized query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

/// Event fan-out with a terminal guard: after one terminal event nothing
/// else goes through, so a cancellation and the cancelled task cannot both
/// land a terminal event.
#[derive(Clone)]
struct EventSink {
    sender: mpsc::UnboundedSender<QueryEvent>,
    closed: Arc<AtomicBool>,
}

impl EventSink {
    fn new(sender: mpsc::UnboundedSender<QueryEvent>) -> Self {
        EventSink {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn send(&self, event: QueryEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if event.is_terminal() {
            self.closed.store(true, Ordering::SeqCst);
        }
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.sender.send(event);
    }
}

struct RunningQuery {
    ctx: QueryContext,
    sink: EventSink,
}

/// A dispatched query: its id plus the live event stream.
pub struct QueryHandle {
    pub query_id: String,
    pub events: mpsc::UnboundedReceiver<QueryEvent>,
}

/// The embedded query engine: tracks running queries and caches their
/// materialized results until collected.
#[derive(Clone, Default)]
pub struct Engine {
    running: Arc<Mutex<HashMap<String, RunningQuery>>>,
    results: Arc<Mutex<HashMap<String, ResultTable>>>,
    next_id: Arc<AtomicU64>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a plan in the background, returning its event stream
    /// immediately. Must be called inside a tokio runtime.
    pub fn dispatch(&self, plan: Plan) -> QueryHandle {
        let query_id = format!("q-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        let ctx = self.query_context(&query_id, &sink);

        self.running.lock().expect("engine lock poisoned").insert(
            query_id.clone(),
            RunningQuery {
                ctx: ctx.clone(),
                sink: sink.clone(),
            },
        );

        let engine = self.clone();
        let id = query_id.clone();
        tokio::spawn(async move {
            engine.drive(&id, plan, ctx, sink).await;
            engine
                .running
                .lock()
                .expect("engine lock poisoned")
                .remove(&id);
        });

        QueryHandle { query_id, events: rx }
    }

    /// Plan with an external frontend and dispatch in one step.
    pub fn dispatch_sql(&self, planner: &dyn Planner, sql: &str) -> DbResult<QueryHandle> {
        Ok(self.dispatch(planner.plan(sql)?))
    }

    /// Run a plan to completion and return its materialized result,
    /// without the event machinery.
    pub async fn run(&self, plan: Plan) -> DbResult<ResultTable> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        let ctx = self.query_context("inline", &sink);
        self.execute("inline", &plan, &ctx, &sink).await
    }

    /// Flip the query's cancellation token. Every operator checks it at its
    /// next pull; the terminal error event is emitted here so callers see
    /// it even before the operators wind down.
    pub fn cancel(&self, query_id: &str) -> bool {
        let running = self.running.lock().expect("engine lock poisoned");
        match running.get(query_id) {
            Some(query) => {
                query.ctx.cancel();
                query.sink.send(QueryEvent::QueryError {
                    id: query_id.to_string(),
                    error: DbError::Cancelled.to_string(),
                });
                info!("cancelled query {}", query_id);
                true
            }
            None => {
                info!("query {} is not running", query_id);
                false
            }
        }
    }

    pub fn is_running(&self, query_id: &str) -> bool {
        self.running
            .lock()
            .expect("engine lock poisoned")
            .contains_key(query_id)
    }

    /// Collect (and drop) a completed query's cached result.
    pub fn take_result(&self, query_id: &str) -> Option<ResultTable> {
        self.results
            .lock()
            .expect("engine lock poisoned")
            .remove(query_id)
    }

    fn query_context(&self, query_id: &str, sink: &EventSink) -> QueryContext {
        let sink = sink.clone();
        let id = query_id.to_string();
        QueryContext::new(Arc::new(move |stats| {
            sink.send(QueryEvent::OperatorStats {
                id: id.clone(),
                stats,
            });
        }))
    }

    async fn drive(&self, query_id: &str, plan: Plan, ctx: QueryContext, sink: EventSink) {
        match self.execute(query_id, &plan, &ctx, &sink).await {
            Ok(_) => info!("query {} completed", query_id),
            Err(err) => {
                error!("query {} failed: {}", query_id, err);
                sink.send(QueryEvent::QueryError {
                    id: query_id.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    async fn execute(
        &self,
        query_id: &str,
        plan: &Plan,
        ctx: &QueryContext,
        sink: &EventSink,
    ) -> DbResult<ResultTable> {
        let started = Instant::now();
        sink.send(QueryEvent::QueryStart {
            id: query_id.to_string(),
        });

        let order = plan.topo_order()?;
        let mut outputs: HashMap<NodeId, Rows> = HashMap::new();
        let mut stat_handles = Vec::with_capacity(order.len());

        for node in &order {
            let mut args = OperatorArgs::new();
            for edge in plan.in_edges(*node) {
                let upstream = outputs.get(&edge.from).ok_or_else(|| {
                    DbError::execution(format!("Plan edge from unexecuted node {}", edge.from))
                })?;
                if edge.list_arg {
                    args.push_list(&edge.input_arg, upstream.consume());
                } else {
                    args.insert(&edge.input_arg, upstream.consume());
                }
            }

            let operator = plan.operator(*node);
            let stats = ctx.stats_handle(node.index(), operator.name());
            stat_handles.push((operator.name(), stats.clone()));
            let env = OperatorEnv::new(stats, ctx.cancel_token());
            let rows = operator.run(&mut args, &env).await?;
            outputs.insert(*node, rows);
        }

        let sink_node = *order
            .last()
            .ok_or_else(|| DbError::validation("Query plan is empty"))?;
        let sink_op = plan.operator(sink_node);
        let output = outputs
            .get(&sink_node)
            .ok_or_else(|| DbError::execution("Sink node produced no output"))?;

        let columns: Vec<String> = output.fields().iter().map(|f| f.name.clone()).collect();
        if !sink_op.is_mutation() {
            sink.send(QueryEvent::ResultSchema {
                id: query_id.to_string(),
                columns: columns.clone(),
            });
        }

        let mut consumer = output.consume();
        loop {
            let batch = consumer.next_batch(RESULT_BATCH_SIZE).await?;
            let done = batch.len() < RESULT_BATCH_SIZE;
            if !batch.is_empty() {
                sink.send(QueryEvent::ResultRows {
                    id: query_id.to_string(),
                    rows: batch.iter().map(|row| row.data().to_vec()).collect(),
                });
            }
            if done {
                break;
            }
            tokio::task::yield_now().await;
        }

        let rows = consumer.materialize().await?;
        let result = ResultTable {
            columns,
            rows: rows.iter().map(|row| row.data().to_vec()).collect(),
        };
        self.results
            .lock()
            .expect("engine lock poisoned")
            .insert(query_id.to_string(), result.clone());

        let elapsed_secs = started.elapsed().as_secs_f64();
        let bytes_read: u64 = stat_handles
            .iter()
            .filter(|(name, _)| *name == "Table Scan")
            .filter_map(|(_, stats)| stats.custom_u64("bytes_read"))
            .sum();
        sink.send(QueryEvent::QueryStats {
            id: query_id.to_string(),
            elapsed_secs,
            bytes_read,
        });

        if sink_op.is_mutation() {
            if let Some(status) = sink_op.status_line() {
                sink.send(QueryEvent::QueryMutationStatus {
                    id: query_id.to_string(),
                    status: format!("{} in {:.2}s", status, elapsed_secs),
                });
            }
        }

        sink.send(QueryEvent::QueryComplete {
            id: query_id.to_string(),
        });
        Ok(result)
    }
}
