/*!
# Row Streams

The per-operator output abstraction: a named, field-typed, ordered sequence
of tuples with multicast replay.

A [`Rows`] owns exactly one upstream producer. Any number of independent
readers can attach via [`Rows::consume`]; every row pulled from the upstream
is recorded in a shared replay buffer, so the upstream is driven **at most
once per row** no matter how many consumers exist. Each consumer replays the
buffer from its own position and only advances the shared upstream when it
reads past the end, which means a slow consumer never blocks a fast one and
all consumers observe rows in exactly upstream production order.

An upstream error is buffered like a row: every consumer observes the same
failure once it reaches that position, and the stream terminates there.

This is what makes it safe to reference one bound name (a CTE, a self-join
target) from several places in a plan, and for a blocking operator to
materialize a stream that another reader has already partially consumed.
*/

use crate::error::DbResult;
use crate::tuples::identifiers::{FieldIdent, TableIdent};
use crate::tuples::rows::Row;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// Item type flowing through every operator stream.
pub type RowResult = DbResult<Row>;

/// A boxed upstream producer.
pub type BoxRowStream = Pin<Box<dyn Stream<Item = RowResult> + Send>>;

/// Shared multicast state: the single upstream plus the replay buffer.
struct Multicast {
    upstream: Option<BoxRowStream>,
    buffer: Vec<RowResult>,
    exhausted: bool,
    materialized: Option<Arc<Vec<Row>>>,
}

impl Multicast {
    fn new(upstream: BoxRowStream) -> Self {
        Multicast {
            upstream: Some(upstream),
            buffer: Vec::new(),
            exhausted: false,
            materialized: None,
        }
    }
}

/// A row stream: one upstream producer, a fixed field list, and the table
/// identity fields are re-qualified against downstream.
#[derive(Clone)]
pub struct Rows {
    table: TableIdent,
    fields: Arc<Vec<FieldIdent>>,
    shared: Arc<Mutex<Multicast>>,
}

impl std::fmt::Debug for Rows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("table", &self.table)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl Rows {
    pub fn new(table: TableIdent, fields: Vec<FieldIdent>, upstream: BoxRowStream) -> Self {
        Rows {
            table,
            fields: Arc::new(fields),
            shared: Arc::new(Mutex::new(Multicast::new(upstream))),
        }
    }

    /// Build a stream from an already-shared field list. Operators clone the
    /// shape out of their input before moving the input into a generator.
    pub fn from_parts(
        table: TableIdent,
        fields: Arc<Vec<FieldIdent>>,
        upstream: BoxRowStream,
    ) -> Self {
        Rows {
            table,
            fields,
            shared: Arc::new(Mutex::new(Multicast::new(upstream))),
        }
    }

    /// A stream with this stream's shape but a different producer. Operators
    /// that do not change row shape build their output this way.
    pub fn new_stream(&self, upstream: BoxRowStream) -> Rows {
        Rows {
            table: self.table.clone(),
            fields: Arc::clone(&self.fields),
            shared: Arc::new(Mutex::new(Multicast::new(upstream))),
        }
    }

    pub fn table(&self) -> &TableIdent {
        &self.table
    }

    pub fn fields(&self) -> &[FieldIdent] {
        &self.fields
    }

    pub fn fields_arc(&self) -> Arc<Vec<FieldIdent>> {
        Arc::clone(&self.fields)
    }

    /// Attach an independent reader starting from the first row.
    pub fn consume(&self) -> RowConsumer {
        RowConsumer {
            table: self.table.clone(),
            fields: Arc::clone(&self.fields),
            shared: Arc::clone(&self.shared),
            pos: 0,
        }
    }

    /// Drain the stream fully and cache the result; repeat calls are O(1).
    pub async fn materialize(&self) -> DbResult<Arc<Vec<Row>>> {
        self.consume().materialize().await
    }
}

/// An independent view over a [`Rows`]: replays the shared buffer, then
/// advances the shared upstream.
pub struct RowConsumer {
    table: TableIdent,
    fields: Arc<Vec<FieldIdent>>,
    shared: Arc<Mutex<Multicast>>,
    pos: usize,
}

impl RowConsumer {
    pub fn table(&self) -> &TableIdent {
        &self.table
    }

    pub fn fields(&self) -> &[FieldIdent] {
        &self.fields
    }

    pub fn fields_arc(&self) -> Arc<Vec<FieldIdent>> {
        Arc::clone(&self.fields)
    }

    /// NULL padding matching this stream's width, for outer joins.
    pub fn null_data(&self) -> Vec<crate::tuples::values::FieldValue> {
        crate::tuples::rows::null_row_data(self.fields.len())
    }

    /// A fresh stream sharing this view's shape.
    pub fn derive(&self, upstream: BoxRowStream) -> Rows {
        Rows {
            table: self.table.clone(),
            fields: Arc::clone(&self.fields),
            shared: Arc::new(Mutex::new(Multicast::new(upstream))),
        }
    }

    /// Drain this view fully, caching the complete row list on the shared
    /// stream so later calls replay from the cache.
    pub async fn materialize(&mut self) -> DbResult<Arc<Vec<Row>>> {
        {
            let shared = self.lock();
            if let Some(cached) = &shared.materialized {
                return Ok(Arc::clone(cached));
            }
        }

        while let Some(result) = self.next().await {
            result?;
        }

        let mut shared = self.lock();
        // The drain above returned early on any buffered error, so only Ok
        // rows remain here.
        let rows: Vec<Row> = shared
            .buffer
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect();
        let rows = Arc::new(rows);
        shared.materialized = Some(Arc::clone(&rows));
        Ok(rows)
    }

    /// Pull up to `take` rows; an empty batch means the view is exhausted.
    pub async fn next_batch(&mut self, take: usize) -> DbResult<Vec<Row>> {
        let mut batch = Vec::with_capacity(take);
        while batch.len() < take {
            match self.next().await {
                Some(result) => batch.push(result?),
                None => break,
            }
        }
        Ok(batch)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Multicast> {
        self.shared.lock().expect("row stream lock poisoned")
    }
}

impl Stream for RowConsumer {
    type Item = RowResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut shared = this.shared.lock().expect("row stream lock poisoned");

        // Replay anything another consumer already pulled.
        if this.pos < shared.buffer.len() {
            let item = shared.buffer[this.pos].clone();
            this.pos += 1;
            // An error terminates this view at the point it was produced.
            return Poll::Ready(Some(item));
        }

        if shared.exhausted {
            return Poll::Ready(None);
        }

        let upstream = match shared.upstream.as_mut() {
            Some(upstream) => upstream,
            None => return Poll::Ready(None),
        };

        match upstream.as_mut().poll_next(cx) {
            Poll::Ready(Some(item)) => {
                let is_err = item.is_err();
                shared.buffer.push(item.clone());
                this.pos += 1;
                if is_err {
                    // The generator is done after a failure; drop it so no
                    // consumer can drive it past the error.
                    shared.exhausted = true;
                    shared.upstream = None;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                shared.exhausted = true;
                shared.upstream = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Wrap a fully-materialized row list as a stream. Used by tests and by
/// operators that re-emit buffered rows.
pub fn stream_from_rows(rows: Vec<Row>) -> BoxRowStream {
    Box::pin(futures::stream::iter(rows.into_iter().map(Ok)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::tuples::values::FieldValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn int_rows(table: &str, values: &[i64]) -> (Rows, Arc<AtomicUsize>) {
        let table = TableIdent::relation(table);
        let fields = vec![table.field("i")];
        let schema = Arc::new(fields.clone());
        let pulls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&pulls);
        let values = values.to_vec();
        let stream = async_stream::stream! {
            for v in values {
                counter.fetch_add(1, Ordering::SeqCst);
                yield Ok(Row::new(Arc::clone(&schema), vec![FieldValue::Integer(v)]));
            }
        };

        (Rows::new(table, fields, Box::pin(stream)), pulls)
    }

    async fn collect_ints(consumer: &mut RowConsumer) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(result) = consumer.next().await {
            match result.unwrap().data()[0] {
                FieldValue::Integer(i) => out.push(i),
                ref other => panic!("unexpected value {:?}", other),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_two_consumers_see_identical_sequences() {
        let (rows, pulls) = int_rows("t", &[1, 2, 3]);
        let mut a = rows.consume();
        let mut b = rows.consume();

        assert_eq!(collect_ints(&mut a).await, vec![1, 2, 3]);
        assert_eq!(collect_ints(&mut b).await, vec![1, 2, 3]);

        // Upstream driven once per row, not once per consumer.
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_interleaved_consumers_do_not_skip() {
        let (rows, _) = int_rows("t", &[10, 20, 30]);
        let mut a = rows.consume();
        let mut b = rows.consume();

        let first_a = a.next().await.unwrap().unwrap();
        let first_b = b.next().await.unwrap().unwrap();
        assert_eq!(first_a, first_b);

        // b races ahead; a still sees everything in order.
        assert_eq!(collect_ints(&mut b).await, vec![20, 30]);
        assert_eq!(collect_ints(&mut a).await, vec![20, 30]);
    }

    #[tokio::test]
    async fn test_materialize_is_cached() {
        let (rows, pulls) = int_rows("t", &[1, 2]);
        let first = rows.materialize().await.unwrap();
        let second = rows.materialize().await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_replayed_to_every_consumer() {
        let table = TableIdent::relation("t");
        let fields = vec![table.field("i")];
        let schema = Arc::new(fields.clone());

        let stream = async_stream::stream! {
            yield Ok(Row::new(Arc::clone(&schema), vec![FieldValue::Integer(1)]));
            yield Err(DbError::execution("boom"));
        };
        let rows = Rows::new(table, fields, Box::pin(stream));

        let mut a = rows.consume();
        let mut b = rows.consume();

        assert!(a.next().await.unwrap().is_ok());
        assert!(a.next().await.unwrap().is_err());
        assert!(a.next().await.is_none());

        assert!(b.next().await.unwrap().is_ok());
        assert!(b.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_next_batch_boundaries() {
        let (rows, _) = int_rows("t", &[1, 2, 3, 4, 5]);
        let mut consumer = rows.consume();

        let batch = consumer.next_batch(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        let batch = consumer.next_batch(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        let batch = consumer.next_batch(2).await.unwrap();
        assert_eq!(batch.len(), 1);
        let batch = consumer.next_batch(2).await.unwrap();
        assert!(batch.is_empty());
    }
}
