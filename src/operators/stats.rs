//! Per-operator runtime statistics and per-query execution context.
//!
//! Each running query owns one [`QueryContext`] carrying its stats callback
//! and its cancellation token. Operators get a [`StatsHandle`] scoped to
//! their plan node; snapshots flow through the callback as the operator
//! starts and finishes, and the engine reads final snapshots for the
//! query-level rollup.

use crate::error::{DbError, DbResult};

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorState {
    Waiting,
    Running,
    Done,
}

/// A point-in-time view of one operator's counters.
#[derive(Debug, Clone, Serialize)]
pub struct OperatorStats {
    pub operator_id: usize,
    pub name: String,
    pub state: OperatorState,
    pub rows_processed: u64,
    pub rows_emitted: u64,
    pub elapsed_secs: f64,
    pub custom: serde_json::Map<String, serde_json::Value>,
}

pub type StatsCallback = Arc<dyn Fn(OperatorStats) + Send + Sync>;

struct Timing {
    state: OperatorState,
    started: Option<Instant>,
    elapsed_secs: f64,
    custom: serde_json::Map<String, serde_json::Value>,
}

struct StatsInner {
    operator_id: usize,
    name: String,
    rows_processed: AtomicU64,
    rows_emitted: AtomicU64,
    timing: Mutex<Timing>,
    callback: StatsCallback,
}

/// Cheap-to-clone handle to one operator's counters.
#[derive(Clone)]
pub struct StatsHandle {
    inner: Arc<StatsInner>,
}

impl StatsHandle {
    fn new(operator_id: usize, name: &str, callback: StatsCallback) -> Self {
        StatsHandle {
            inner: Arc::new(StatsInner {
                operator_id,
                name: name.to_string(),
                rows_processed: AtomicU64::new(0),
                rows_emitted: AtomicU64::new(0),
                timing: Mutex::new(Timing {
                    state: OperatorState::Waiting,
                    started: None,
                    elapsed_secs: 0.0,
                    custom: serde_json::Map::new(),
                }),
                callback,
            }),
        }
    }

    pub fn start_running(&self) {
        {
            let mut timing = self.lock_timing();
            timing.state = OperatorState::Running;
            timing.started = Some(Instant::now());
        }
        self.publish();
    }

    pub fn done_running(&self) {
        {
            let mut timing = self.lock_timing();
            timing.state = OperatorState::Done;
            if let Some(started) = timing.started {
                timing.elapsed_secs = started.elapsed().as_secs_f64();
            }
        }
        self.publish();
    }

    pub fn row_processed(&self) {
        self.inner.rows_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn row_emitted(&self) {
        self.inner.rows_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an operator-specific counter, e.g. a scan's `bytes_read`.
    pub fn set_custom(&self, key: &str, value: impl Into<serde_json::Value>) {
        self.lock_timing().custom.insert(key.to_string(), value.into());
    }

    pub fn custom_u64(&self, key: &str) -> Option<u64> {
        self.lock_timing().custom.get(key).and_then(|v| v.as_u64())
    }

    pub fn snapshot(&self) -> OperatorStats {
        let timing = self.lock_timing();
        let elapsed_secs = match (timing.state, timing.started) {
            (OperatorState::Running, Some(started)) => started.elapsed().as_secs_f64(),
            _ => timing.elapsed_secs,
        };
        OperatorStats {
            operator_id: self.inner.operator_id,
            name: self.inner.name.clone(),
            state: timing.state,
            rows_processed: self.inner.rows_processed.load(Ordering::Relaxed),
            rows_emitted: self.inner.rows_emitted.load(Ordering::Relaxed),
            elapsed_secs,
            custom: timing.custom.clone(),
        }
    }

    fn publish(&self) {
        (self.inner.callback)(self.snapshot());
    }

    fn lock_timing(&self) -> std::sync::MutexGuard<'_, Timing> {
        self.inner.timing.lock().expect("stats lock poisoned")
    }
}

/// Cooperative cancellation flag shared by every operator of one query.
/// Operators check it at each pull; a flipped token turns the next pull into
/// a terminal cancellation error.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> DbResult<()> {
        if self.is_cancelled() {
            Err(DbError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything one query's operators share: where stats snapshots go and the
/// cancellation flag. One per query, never process-global.
#[derive(Clone)]
pub struct QueryContext {
    callback: StatsCallback,
    cancel: CancelToken,
}

impl QueryContext {
    pub fn new(callback: StatsCallback) -> Self {
        QueryContext {
            callback,
            cancel: CancelToken::new(),
        }
    }

    /// A context that discards stats snapshots.
    pub fn detached() -> Self {
        Self::new(Arc::new(|_| {}))
    }

    pub fn stats_handle(&self, operator_id: usize, name: &str) -> StatsHandle {
        StatsHandle::new(operator_id, name, Arc::clone(&self.callback))
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}
