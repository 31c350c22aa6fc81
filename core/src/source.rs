//! Raw inbound records and the channel subscription seam.
//!
//! A [`RecordSource`] represents one subscription to the stock-change
//! channel. The consumer loop is written against this trait so the same
//! loop runs against a real Kafka subscription or an in-memory double.
//!
//! # Progress Tracking
//!
//! Fetching a record does not advance committed progress. The loop calls
//! [`RecordSource::mark_processed`] after it has handled a record (applied
//! it, or deliberately skipped it), and [`RecordSource::commit`] once when
//! it stops. A batch abandoned mid-flight by cancellation is therefore never
//! committed and will be redelivered: at-least-once, never lost.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by a channel subscription.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Could not build or connect the underlying client.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Subscribing to the topic failed.
    #[error("subscription failed for topic '{topic}': {reason}")]
    SubscriptionFailed {
        /// The topic that could not be subscribed.
        topic: String,
        /// The reason for failure.
        reason: String,
    },

    /// A poll for records failed.
    ///
    /// During shutdown this is normal loop termination; at any other time
    /// it is a fatal channel fault.
    #[error("poll failed: {0}")]
    PollFailed(String),

    /// Recording or committing processed progress failed.
    #[error("offset commit failed: {0}")]
    CommitFailed(String),
}

/// One raw record as delivered by the channel.
///
/// Topic, partition and offset are carried so every failure can be logged
/// with enough context to find the offending record again. Keys are unused
/// by this adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRecord {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Raw payload bytes, if the record carried any.
    pub payload: Option<Vec<u8>>,
}

impl InboundRecord {
    /// A short, lossy excerpt of the payload for log lines.
    ///
    /// Long payloads are truncated so a single poison message cannot flood
    /// the log.
    #[must_use]
    pub fn payload_excerpt(&self) -> String {
        const MAX: usize = 256;
        match &self.payload {
            None => "<none>".to_string(),
            Some(bytes) if bytes.len() <= MAX => String::from_utf8_lossy(bytes).into_owned(),
            Some(bytes) => format!("{}...", String::from_utf8_lossy(&bytes[..MAX])),
        }
    }
}

/// One subscription to the stock-change channel.
///
/// At most one `RecordSource` is active per process instance, and it is
/// driven by a single consumer loop. All methods except `fetch` are quick;
/// `fetch` blocks up to its `max_wait`.
///
/// # Cancel Safety
///
/// The loop races `fetch` against a cancellation signal and drops the
/// in-flight future when shutdown is requested. Implementations must
/// tolerate that: a dropped fetch may redeliver its records later, but must
/// never corrupt the subscription.
///
/// # Dyn Compatibility
///
/// `fetch` and `commit` return explicit `Pin<Box<dyn Future>>` instead of
/// `async fn` so the source can be used as a trait object behind `Arc`.
pub trait RecordSource: Send + Sync {
    /// Wait up to `max_wait` for the next batch of records.
    ///
    /// An empty batch after the timeout is not an error; the caller simply
    /// polls again. Records within a batch are in delivery order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::PollFailed`] when the underlying channel
    /// surfaces a fault.
    fn fetch(
        &self,
        max_wait: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<InboundRecord>, SourceError>> + Send + '_>>;

    /// Record that processing has advanced past `record`.
    ///
    /// Called once per record after it has been applied or deliberately
    /// skipped, on the loop's own context only.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::CommitFailed`] when progress cannot be
    /// recorded; the loop logs this and carries on.
    fn mark_processed(&self, record: &InboundRecord) -> Result<(), SourceError>;

    /// Durably commit all progress recorded via `mark_processed`.
    ///
    /// Nothing having been marked yet is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::CommitFailed`] when the commit does not reach
    /// the channel.
    fn commit(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>>;

    /// Release the subscription.
    ///
    /// Idempotent and infallible; the loop calls this unconditionally on
    /// every exit path, including faults.
    fn close(&self);
}
