//! # Bookstock Core
//!
//! Core traits and types for the bookstock inbound adapter.
//!
//! This crate defines the domain event carried on the stock-change topic,
//! the decoder that turns raw payloads into that event, and the two seams
//! the consumer loop is written against:
//!
//! - [`StockUpdater`](updater::StockUpdater): the downstream collaborator
//!   that applies a status change to a book
//! - [`RecordSource`](source::RecordSource): the channel subscription that
//!   delivers raw record batches
//!
//! Keeping both seams as traits lets the consumer loop run unchanged against
//! a real Kafka subscription (`bookstock-kafka`) or in-memory doubles
//! (`bookstock-testing`).
//!
//! ## Delivery Semantics
//!
//! The adapter is at-least-once: progress is committed after processing, so
//! a crash between apply and commit replays already-applied records on
//! restart. [`StockUpdater`](updater::StockUpdater) implementations must
//! therefore be idempotent (applying the same status twice is a no-op).

/// Stock-change domain event and payload decoding.
pub mod event;

/// Raw inbound records and the channel subscription seam.
pub mod source;

/// The downstream state-updater seam.
pub mod updater;

pub use event::{BookStatus, DecodeError, StockChangedEvent};
pub use source::{InboundRecord, RecordSource, SourceError};
pub use updater::{ApplyError, StockUpdater};
