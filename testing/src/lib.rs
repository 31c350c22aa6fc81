//! # Bookstock Testing
//!
//! In-memory test doubles for the bookstock inbound adapter.
//!
//! This crate provides:
//! - [`ScriptedSource`]: a [`RecordSource`] that replays scripted batches
//!   and faults, and counts commits and closes
//! - [`RecordingUpdater`]: a [`StockUpdater`] that records every invocation
//!   and can be told to reject specific book ids
//! - Record builders for assembling inbound records in tests
//!
//! ## Example
//!
//! ```
//! use bookstock_testing::{ScriptedSource, RecordingUpdater, stock_record};
//! use bookstock_core::BookStatus;
//!
//! let source = ScriptedSource::new();
//! source.push_batch(vec![stock_record(0, 42, BookStatus::Rented)]);
//!
//! let updater = RecordingUpdater::new();
//! assert!(updater.calls().is_empty());
//! ```

use bookstock_core::{
    ApplyError, BookStatus, InboundRecord, RecordSource, SourceError, StockUpdater,
};
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Topic name used by the record builders.
pub const TEST_TOPIC: &str = "topic_rental";

/// Build a record carrying a well-formed stock-change payload.
#[must_use]
pub fn stock_record(offset: i64, book_id: i64, status: BookStatus) -> InboundRecord {
    let payload = format!(r#"{{"bookId":{book_id},"bookStatus":"{status}"}}"#);
    raw_record(offset, payload.as_bytes())
}

/// Build a record carrying arbitrary payload bytes.
#[must_use]
pub fn raw_record(offset: i64, payload: &[u8]) -> InboundRecord {
    InboundRecord {
        topic: TEST_TOPIC.to_string(),
        partition: 0,
        offset,
        payload: Some(payload.to_vec()),
    }
}

/// Build a record with no payload at all.
#[must_use]
pub fn empty_record(offset: i64) -> InboundRecord {
    InboundRecord {
        topic: TEST_TOPIC.to_string(),
        partition: 0,
        offset,
        payload: None,
    }
}

enum FetchStep {
    Batch(Vec<InboundRecord>),
    Fault(SourceError),
}

/// A [`RecordSource`] that replays a script.
///
/// Each `fetch` pops the next scripted step: a batch is returned
/// immediately, a fault is returned as an error. Once the script runs dry,
/// `fetch` behaves like a quiet topic: it waits out `max_wait` and returns
/// an empty batch, which is how tests exercise "shutdown while a poll is
/// blocked".
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<FetchStep>>,
    marked: Mutex<Vec<(i32, i64)>>,
    commits: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptedSource {
    /// Create a source with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch to the script.
    pub fn push_batch(&self, batch: Vec<InboundRecord>) {
        self.lock_script().push_back(FetchStep::Batch(batch));
    }

    /// Append a fault to the script.
    pub fn push_fault(&self, fault: SourceError) {
        self.lock_script().push_back(FetchStep::Fault(fault));
    }

    /// Number of times `commit` was called.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// The (partition, offset) pairs marked processed, in call order.
    #[must_use]
    pub fn marked(&self) -> Vec<(i32, i64)> {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<FetchStep>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSource for ScriptedSource {
    fn fetch(
        &self,
        max_wait: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<InboundRecord>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            let step = self.lock_script().pop_front();
            match step {
                Some(FetchStep::Batch(batch)) => Ok(batch),
                Some(FetchStep::Fault(fault)) => Err(fault),
                None => {
                    // Script exhausted: emulate a topic with nothing to say.
                    tokio::time::sleep(max_wait).await;
                    Ok(Vec::new())
                }
            }
        })
    }

    fn mark_processed(&self, record: &InboundRecord) -> Result<(), SourceError> {
        self.marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((record.partition, record.offset));
        Ok(())
    }

    fn commit(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`StockUpdater`] that records every invocation.
///
/// Ids registered with [`RecordingUpdater::reject`] fail with
/// [`ApplyError::BookNotFound`]; the invocation is still recorded, so tests
/// can assert both call order and failure handling.
#[derive(Default)]
pub struct RecordingUpdater {
    calls: Mutex<Vec<(i64, BookStatus)>>,
    rejected: Mutex<HashSet<i64>>,
}

impl RecordingUpdater {
    /// Create an updater that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `apply_status` fail for this book id.
    pub fn reject(&self, book_id: i64) {
        self.rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(book_id);
    }

    /// Every invocation so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(i64, BookStatus)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StockUpdater for RecordingUpdater {
    fn apply_status(
        &self,
        book_id: i64,
        status: BookStatus,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApplyError>> + Send + '_>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((book_id, status));
            let rejected = self
                .rejected
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&book_id);
            if rejected {
                Err(ApplyError::BookNotFound { book_id })
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_source_replays_batches_in_order() {
        let source = ScriptedSource::new();
        source.push_batch(vec![stock_record(0, 1, BookStatus::Rented)]);
        source.push_batch(vec![stock_record(1, 2, BookStatus::Available)]);

        let first = source
            .fetch(Duration::from_millis(10))
            .await
            .expect("scripted batch");
        let second = source
            .fetch(Duration::from_millis(10))
            .await
            .expect("scripted batch");

        assert_eq!(first[0].offset, 0);
        assert_eq!(second[0].offset, 1);
    }

    #[tokio::test]
    async fn exhausted_script_waits_then_returns_empty() {
        let source = ScriptedSource::new();
        let batch = source
            .fetch(Duration::from_millis(5))
            .await
            .expect("idle fetch");
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn scripted_fault_is_returned() {
        let source = ScriptedSource::new();
        source.push_fault(SourceError::PollFailed("broker gone".to_string()));
        assert!(source.fetch(Duration::from_millis(5)).await.is_err());
    }

    #[tokio::test]
    async fn recording_updater_records_rejected_calls_too() {
        let updater = RecordingUpdater::new();
        updater.reject(2);

        assert!(updater.apply_status(1, BookStatus::Rented).await.is_ok());
        assert!(updater.apply_status(2, BookStatus::Rented).await.is_err());

        assert_eq!(
            updater.calls(),
            vec![(1, BookStatus::Rented), (2, BookStatus::Rented)]
        );
    }

    #[test]
    fn builders_produce_expected_payloads() {
        let rec = stock_record(3, 42, BookStatus::Rented);
        assert_eq!(rec.offset, 3);
        assert_eq!(
            rec.payload.as_deref(),
            Some(br#"{"bookId":42,"bookStatus":"RENTED"}"#.as_slice())
        );
        assert!(empty_record(0).payload.is_none());
    }
}
