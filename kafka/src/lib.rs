//! Kafka-backed [`RecordSource`] for the bookstock inbound adapter.
//!
//! This crate subscribes one rdkafka `StreamConsumer` to the stock-change
//! topic (`topic_rental` in the reference deployment) and exposes it through
//! the [`RecordSource`] seam the consumer loop is written against.
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual offset management:
//! - `enable.auto.commit` and `enable.auto.offset.store` are both off
//! - offsets are stored only after the loop reports a record processed
//!   ([`RecordSource::mark_processed`])
//! - stored offsets are committed once, synchronously, when the loop stops
//!
//! A crash between apply and commit therefore replays already-applied
//! records on restart; the downstream updater must be idempotent. Ordering
//! is guaranteed within a partition, not across partitions.
//!
//! # Example
//!
//! ```no_run
//! use bookstock_kafka::KafkaRecordSource;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = KafkaRecordSource::builder()
//!     .brokers("localhost:9092")
//!     .group_id("book-inventory")
//!     .topic("topic_rental")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use bookstock_core::{InboundRecord, RecordSource, SourceError};
use futures::FutureExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// One subscription to the stock-change topic, backed by rdkafka.
///
/// Owned by exactly one consumer loop for the lifetime of the process.
/// Cancellation is cooperative: the loop races `fetch` against its token
/// and simply drops the in-flight future, so no cross-thread wakeup call
/// is needed on the client itself.
pub struct KafkaRecordSource {
    consumer: StreamConsumer,
    topic: String,
    max_batch: usize,
}

impl KafkaRecordSource {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> KafkaRecordSourceBuilder {
        KafkaRecordSourceBuilder::default()
    }

    /// The subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    fn to_record(message: &BorrowedMessage<'_>) -> InboundRecord {
        InboundRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        }
    }
}

impl RecordSource for KafkaRecordSource {
    fn fetch(
        &self,
        max_wait: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<InboundRecord>, SourceError>> + Send + '_>> {
        Box::pin(async move {
            // Wait up to `max_wait` for the first record; a quiet topic is
            // an empty batch, not an error.
            let first = match tokio::time::timeout(max_wait, self.consumer.recv()).await {
                Err(_elapsed) => return Ok(Vec::new()),
                Ok(Err(e)) => return Err(SourceError::PollFailed(e.to_string())),
                Ok(Ok(message)) => Self::to_record(&message),
            };

            let mut batch = Vec::with_capacity(16);
            batch.push(first);

            // Drain whatever is already buffered without waiting again, so
            // a burst arrives as one batch.
            while batch.len() < self.max_batch {
                match self.consumer.recv().now_or_never() {
                    Some(Ok(message)) => batch.push(Self::to_record(&message)),
                    Some(Err(e)) => {
                        tracing::warn!(
                            topic = %self.topic,
                            error = %e,
                            "poll fault while draining; returning partial batch"
                        );
                        break;
                    }
                    None => break,
                }
            }

            Ok(batch)
        })
    }

    fn mark_processed(&self, record: &InboundRecord) -> Result<(), SourceError> {
        // librdkafka expects the offset of the next record to consume.
        self.consumer
            .store_offset(&record.topic, record.partition, record.offset + 1)
            .map_err(|e| SourceError::CommitFailed(e.to_string()))
    }

    fn commit(&self) -> Pin<Box<dyn Future<Output = Result<(), SourceError>> + Send + '_>> {
        Box::pin(async move {
            match self.consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) => {
                    tracing::info!(topic = %self.topic, "offsets committed");
                    Ok(())
                }
                // A run that stored nothing has nothing to commit.
                Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
                Err(e) => Err(SourceError::CommitFailed(e.to_string())),
            }
        })
    }

    fn close(&self) {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "kafka record source closed");
    }
}

/// Builder for a [`KafkaRecordSource`].
///
/// `brokers` and `topic` are required. The group id defaults to
/// `bookstock-{topic}`. [`property`](Self::property) passes any further
/// connection settings straight through to the client, so deployment
/// configuration stays an opaque property set to this crate.
#[derive(Default)]
pub struct KafkaRecordSourceBuilder {
    brokers: Option<String>,
    group_id: Option<String>,
    topic: Option<String>,
    auto_offset_reset: Option<String>,
    max_batch: Option<usize>,
    properties: Vec<(String, String)>,
}

impl KafkaRecordSourceBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group id.
    ///
    /// Instances sharing a group id share the topic's partitions.
    #[must_use]
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Set the topic to subscribe to.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Where a new consumer group starts reading when no committed offset
    /// exists: `"earliest"` or `"latest"`.
    ///
    /// Default: `"earliest"`, so a freshly deployed adapter picks up stock
    /// changes published before it first connected.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Cap on how many records one `fetch` returns.
    ///
    /// Default: 500.
    ///
    /// # Panics
    ///
    /// Panics if `max_batch` is 0.
    #[must_use]
    pub fn max_batch(mut self, max_batch: usize) -> Self {
        assert!(max_batch > 0, "max_batch must be greater than 0");
        self.max_batch = Some(max_batch);
        self
    }

    /// Pass an arbitrary client property through to the connection.
    ///
    /// Applied after the builder's own settings, so deployment-supplied
    /// properties win.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Build the source: create the client and subscribe to the topic.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ConnectionFailed`] if `brokers` or `topic`
    /// is missing or the client cannot be created, and
    /// [`SourceError::SubscriptionFailed`] if subscribing fails.
    pub fn build(self) -> Result<KafkaRecordSource, SourceError> {
        let brokers = self
            .brokers
            .ok_or_else(|| SourceError::ConnectionFailed("brokers not configured".to_string()))?;
        let topic = self
            .topic
            .ok_or_else(|| SourceError::ConnectionFailed("topic not configured".to_string()))?;
        let group_id = self
            .group_id
            .unwrap_or_else(|| format!("bookstock-{topic}"));
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());
        let max_batch = self.max_batch.unwrap_or(500);

        // Manual offset management: nothing is stored or committed behind
        // the loop's back.
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", &auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        for (key, value) in &self.properties {
            config.set(key, value);
        }

        let consumer: StreamConsumer = config.create().map_err(|e| {
            SourceError::ConnectionFailed(format!("failed to create consumer: {e}"))
        })?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| SourceError::SubscriptionFailed {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            brokers = %brokers,
            group_id = %group_id,
            topic = %topic,
            auto_offset_reset = %auto_offset_reset,
            max_batch = max_batch,
            manual_commit = true,
            "kafka record source subscribed"
        );

        Ok(KafkaRecordSource {
            consumer,
            topic,
            max_batch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kafka_record_source_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<KafkaRecordSource>();
        assert_sync::<KafkaRecordSource>();
    }

    #[test]
    fn builder_requires_brokers() {
        let result = KafkaRecordSource::builder().topic("topic_rental").build();
        assert!(matches!(result, Err(SourceError::ConnectionFailed(_))));
    }

    #[test]
    fn builder_requires_topic() {
        let result = KafkaRecordSource::builder().brokers("localhost:9092").build();
        assert!(matches!(result, Err(SourceError::ConnectionFailed(_))));
    }

    #[test]
    fn builder_default_works() {
        let _builder = KafkaRecordSource::builder();
    }
}
