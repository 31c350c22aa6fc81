//! # Bookstock Consumer
//!
//! The consumer loop and lifecycle controller for the bookstock inbound
//! adapter.
//!
//! [`StockConsumer`] owns one channel subscription ([`RecordSource`]) and
//! one downstream collaborator ([`StockUpdater`]). Started, it polls the
//! subscription for record batches, decodes each record into a
//! [`StockChangedEvent`](bookstock_core::StockChangedEvent), applies it to
//! the updater in delivery order, and commits progress when it stops.
//!
//! # Lifecycle
//!
//! ```text
//! Created ──start()/run()──► Running ──shutdown()──► Stopping ──► Stopped
//! ```
//!
//! `start()` launches the loop on a background task and returns immediately;
//! `shutdown()` cancels the loop's token, which unblocks an in-flight poll
//! without waiting out its timeout; `join()` awaits the retained task handle
//! so callers can confirm the loop has actually stopped. There is no
//! transition out of `Stopped`.
//!
//! # Delivery Semantics
//!
//! At-least-once. Progress is committed once, synchronously, after the loop
//! exits (not per batch), matching the upstream contract that updaters are
//! idempotent. A record that fails to decode or apply is logged with its
//! topic, partition, offset and payload excerpt, then skipped; the loop
//! favors staying available over halting on a poison message.
//!
//! # Example
//!
//! ```no_run
//! use bookstock_consumer::{ConsumerOptions, StockConsumer};
//! use bookstock_testing::{RecordingUpdater, ScriptedSource};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Arc::new(ScriptedSource::new());
//! let updater = Arc::new(RecordingUpdater::new());
//!
//! let consumer = StockConsumer::new(source, updater, ConsumerOptions::default());
//! consumer.start()?;
//!
//! // ... later, from any task:
//! consumer.shutdown();
//! consumer.join().await?;
//! # Ok(())
//! # }
//! ```

use bookstock_core::{
    DecodeError, InboundRecord, RecordSource, SourceError, StockChangedEvent, StockUpdater,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors surfaced by the consumer lifecycle.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// The channel surfaced a fault outside of shutdown; the loop has
    /// terminated and the subscription has been released.
    #[error("channel fault: {0}")]
    Channel(#[from] SourceError),

    /// `start()` or `run()` was called on a consumer that already left the
    /// `Created` state.
    #[error("consumer already started")]
    AlreadyStarted,

    /// `join()` was called before `start()`.
    #[error("consumer not started")]
    NotStarted,

    /// The background task was cancelled or panicked.
    #[error("consumer task failed: {0}")]
    TaskFailed(String),
}

/// Where the consumer is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Constructed, loop not yet launched.
    Created,
    /// Loop launched and polling.
    Running,
    /// Shutdown requested, loop finishing its current batch.
    Stopping,
    /// Loop exited, progress committed, subscription released.
    Stopped,
}

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPING: u8 = 2;
const STOPPED: u8 = 3;

impl LifecycleState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            RUNNING => Self::Running,
            STOPPING => Self::Stopping,
            STOPPED => Self::Stopped,
            _ => Self::Created,
        }
    }
}

/// Tunables for a [`StockConsumer`].
#[derive(Clone, Debug)]
pub struct ConsumerOptions {
    /// Upper bound on how long one poll blocks waiting for records.
    ///
    /// Also bounds worst-case shutdown latency when nothing else wakes the
    /// loop. Default: 3 seconds.
    pub poll_timeout: Duration,

    /// When set, `start()` registers a Ctrl-C watcher that calls
    /// [`StockConsumer::shutdown`], so an external termination request
    /// drains the loop before the process exits. Off by default so embedded
    /// and test consumers do not capture the process signal.
    pub handle_signals: bool,
}

impl ConsumerOptions {
    /// Set the poll timeout.
    #[must_use]
    pub const fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Enable or disable the Ctrl-C watcher registered by `start()`.
    #[must_use]
    pub const fn with_signal_handler(mut self, handle_signals: bool) -> Self {
        self.handle_signals = handle_signals;
        self
    }
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(3),
            handle_signals: false,
        }
    }
}

/// Shutdown flag and lifecycle state, shared between the controller, the
/// loop task and the signal watcher.
#[derive(Clone)]
struct Shared {
    shutdown: CancellationToken,
    state: Arc<AtomicU8>,
}

impl Shared {
    fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            state: Arc::new(AtomicU8::new(CREATED)),
        }
    }

    fn request_shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("shutdown requested");
        }
        let _ = self
            .state
            .compare_exchange(RUNNING, STOPPING, Ordering::AcqRel, Ordering::Acquire);
        self.shutdown.cancel();
    }
}

/// The inbound adapter: one subscription, one updater, one loop.
///
/// Construction leaves the consumer in `Created`; exactly one of
/// [`start`](Self::start) (background task) or [`run`](Self::run)
/// (foreground) moves it to `Running`. [`shutdown`](Self::shutdown) is
/// idempotent and safe to call from any task at any time, including before
/// the first poll, in which case the loop performs at most one
/// empty-or-partial cycle before stopping.
pub struct StockConsumer<S, U> {
    worker: Worker<S, U>,
    task: Mutex<Option<JoinHandle<Result<(), ConsumerError>>>>,
}

impl<S, U> StockConsumer<S, U>
where
    S: RecordSource + 'static,
    U: StockUpdater + 'static,
{
    /// Create a consumer in the `Created` state.
    #[must_use]
    pub fn new(source: Arc<S>, updater: Arc<U>, options: ConsumerOptions) -> Self {
        Self {
            worker: Worker {
                source,
                updater,
                options,
                shared: Shared::new(),
            },
            task: Mutex::new(None),
        }
    }

    /// Where the consumer is in its life right now.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.worker.shared.state.load(Ordering::Acquire))
    }

    /// Launch the consumer loop on a background task and return immediately.
    ///
    /// When [`ConsumerOptions::handle_signals`] is set, this also registers
    /// a Ctrl-C watcher that calls [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::AlreadyStarted`] if the consumer has left
    /// the `Created` state.
    pub fn start(&self) -> Result<(), ConsumerError> {
        self.begin()?;
        if self.worker.options.handle_signals {
            spawn_signal_watcher(self.worker.shared.clone());
        }
        let worker = self.worker.clone();
        let handle = tokio::spawn(async move { worker.run_to_completion().await });
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Run the consumer loop on the calling task.
    ///
    /// Resolves when [`shutdown`](Self::shutdown) is observed (returning
    /// `Ok`) or on a fatal channel fault (returning the fault). Either way
    /// the subscription has been released by the time this returns.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::AlreadyStarted`] if the consumer has left
    /// the `Created` state, or [`ConsumerError::Channel`] on a fatal fault.
    pub async fn run(&self) -> Result<(), ConsumerError> {
        self.begin()?;
        self.worker.run_to_completion().await
    }

    /// Request shutdown.
    ///
    /// Idempotent and safe to call concurrently with the running loop: the
    /// first call cancels the loop's token (unblocking an in-flight poll
    /// immediately); later calls are no-ops. May be called before `start()`,
    /// in which case a subsequently started loop stops after at most one
    /// cycle.
    pub fn shutdown(&self) {
        self.worker.shared.request_shutdown();
    }

    /// Wait for the background loop launched by `start()` to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::NotStarted`] if `start()` was never called,
    /// [`ConsumerError::TaskFailed`] if the task panicked or was aborted,
    /// or the loop's own outcome otherwise.
    pub async fn join(&self) -> Result<(), ConsumerError> {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            None => Err(ConsumerError::NotStarted),
            Some(handle) => handle
                .await
                .unwrap_or_else(|e| Err(ConsumerError::TaskFailed(e.to_string()))),
        }
    }

    fn begin(&self) -> Result<(), ConsumerError> {
        self.worker
            .shared
            .state
            .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ConsumerError::AlreadyStarted)?;
        Ok(())
    }
}

fn spawn_signal_watcher(shared: Shared) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("termination signal received");
                shared.request_shutdown();
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for termination signal");
            }
        }
    });
}

/// The loop itself: everything it touches is cheaply cloneable so `start()`
/// can move a copy onto a background task.
struct Worker<S, U> {
    source: Arc<S>,
    updater: Arc<U>,
    options: ConsumerOptions,
    shared: Shared,
}

impl<S, U> Clone for Worker<S, U> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            updater: Arc::clone(&self.updater),
            options: self.options.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<S, U> Worker<S, U>
where
    S: RecordSource + 'static,
    U: StockUpdater + 'static,
{
    /// Drive the poll loop, then commit and release no matter how it ended.
    async fn run_to_completion(&self) -> Result<(), ConsumerError> {
        tracing::info!(
            poll_timeout = ?self.options.poll_timeout,
            "stock consumer started"
        );

        let outcome = self.poll_loop().await;

        match &outcome {
            Ok(()) => {
                // One synchronous commit for everything processed this run.
                if let Err(e) = self.source.commit().await {
                    tracing::warn!(
                        error = %e,
                        "final offset commit failed; processed records may be redelivered"
                    );
                }
            }
            Err(e) => {
                // A fault skips the commit: unmarked progress is simply
                // redelivered on restart.
                tracing::error!(error = %e, "consumer loop terminated by channel fault");
            }
        }

        self.source.close();
        self.shared.state.store(STOPPED, Ordering::Release);
        tracing::info!("stock consumer stopped");
        outcome
    }

    async fn poll_loop(&self) -> Result<(), ConsumerError> {
        while !self.shared.shutdown.is_cancelled() {
            let batch = tokio::select! {
                biased;
                () = self.shared.shutdown.cancelled() => break,
                fetched = self.source.fetch(self.options.poll_timeout) => match fetched {
                    Ok(batch) => batch,
                    Err(e) if self.shared.shutdown.is_cancelled() => {
                        // Unblocked by shutdown, not a genuine fault.
                        tracing::debug!(error = %e, "poll interrupted by shutdown");
                        break;
                    }
                    Err(e) => return Err(ConsumerError::Channel(e)),
                },
            };

            if batch.is_empty() {
                continue;
            }
            tracing::debug!(records = batch.len(), "fetched batch");

            for record in &batch {
                self.handle_record(record).await;
                if let Err(e) = self.source.mark_processed(record) {
                    tracing::warn!(
                        topic = %record.topic,
                        partition = record.partition,
                        offset = record.offset,
                        error = %e,
                        "failed to record progress"
                    );
                }
            }
        }
        Ok(())
    }

    /// Decode and apply one record. Never fails the loop: a bad record is
    /// logged and skipped so one poison message cannot take the adapter
    /// down (availability over strict consistency).
    async fn handle_record(&self, record: &InboundRecord) {
        let decoded = record
            .payload
            .as_deref()
            .ok_or(DecodeError::EmptyPayload)
            .and_then(StockChangedEvent::decode);

        let event = match decoded {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    payload = %record.payload_excerpt(),
                    error = %e,
                    "skipping undecodable message"
                );
                return;
            }
        };

        tracing::debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            %event,
            "consumed stock-change message"
        );

        match self
            .updater
            .apply_status(event.book_id, event.book_status)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    book_id = event.book_id,
                    status = %event.book_status,
                    "applied stock change"
                );
            }
            Err(e) => {
                tracing::warn!(
                    book_id = event.book_id,
                    status = %event.book_status,
                    error = %e,
                    "skipping stock change the inventory rejected"
                );
            }
        }
    }
}
