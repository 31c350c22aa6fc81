//! Stock-change domain event and payload decoding.
//!
//! The rental side publishes one JSON object per stock change:
//!
//! ```json
//! {"bookId": 42, "bookStatus": "RENTED"}
//! ```
//!
//! [`StockChangedEvent::decode`] turns one raw payload into the typed event.
//! Decoding is pure and deterministic: the same payload always yields the
//! same event, and a malformed payload yields no event at all.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors produced while decoding a raw payload.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The record carried no payload bytes at all.
    #[error("message has no payload")]
    EmptyPayload,

    /// The payload is not well-formed JSON, or is missing a required field,
    /// or carries a status outside the closed set.
    #[error("malformed stock-change payload: {0}")]
    Malformed(String),
}

/// The closed set of book stock states carried on the wire.
///
/// The wire encoding is the upper-case variant name (`"AVAILABLE"`,
/// `"RENTED"`, `"UNAVAILABLE"`); anything else fails decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookStatus {
    /// The book is on the shelf and can be rented.
    Available,
    /// The book is currently rented out.
    Rented,
    /// The book is out of circulation (lost, damaged, withdrawn).
    Unavailable,
}

impl BookStatus {
    /// The wire representation of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Rented => "RENTED",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stock change for a single book, as announced by the rental side.
///
/// Immutable value created by decoding one raw message; it has no lifecycle
/// beyond the processing of that message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockChangedEvent {
    /// Identifier of the book whose stock changed.
    pub book_id: i64,
    /// The new stock status.
    pub book_status: BookStatus,
}

impl StockChangedEvent {
    /// Decode one raw payload into a stock-change event.
    ///
    /// Unknown extra fields are ignored so the producer can evolve its
    /// payload without breaking this adapter.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::EmptyPayload`] for a zero-length payload and
    /// [`DecodeError::Malformed`] for anything `serde_json` rejects:
    /// invalid JSON, missing `bookId` or `bookStatus`, or a status string
    /// outside [`BookStatus`].
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }
        serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))
    }
}

// Display is used in log lines, where `book 42 -> RENTED` reads better than
// the derived Debug output.
impl fmt::Display for StockChangedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "book {} -> {}", self.book_id, self.book_status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_well_formed_payload() {
        let event = StockChangedEvent::decode(br#"{"bookId":42,"bookStatus":"RENTED"}"#).unwrap();
        assert_eq!(event.book_id, 42);
        assert_eq!(event.book_status, BookStatus::Rented);
    }

    #[test]
    fn ignores_unknown_fields() {
        let payload = br#"{"bookId":7,"bookStatus":"AVAILABLE","publishedAt":"2020-01-01"}"#;
        let event = StockChangedEvent::decode(payload).unwrap();
        assert_eq!(event.book_id, 7);
        assert_eq!(event.book_status, BookStatus::Available);
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            StockChangedEvent::decode(b""),
            Err(DecodeError::EmptyPayload)
        ));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            StockChangedEvent::decode(b"not json at all"),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_book_id() {
        assert!(matches!(
            StockChangedEvent::decode(br#"{"bookStatus":"RENTED"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_missing_status() {
        assert!(matches!(
            StockChangedEvent::decode(br#"{"bookId":42}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_status_outside_closed_set() {
        assert!(matches!(
            StockChangedEvent::decode(br#"{"bookId":42,"bookStatus":"ON_FIRE"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in [
            BookStatus::Available,
            BookStatus::Rented,
            BookStatus::Unavailable,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            let back: BookStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
    }

    #[test]
    fn event_display_names_book_and_status() {
        let event = StockChangedEvent {
            book_id: 42,
            book_status: BookStatus::Rented,
        };
        assert_eq!(event.to_string(), "book 42 -> RENTED");
    }

    proptest! {
        #[test]
        fn decoding_is_deterministic(book_id in any::<i64>(), status_idx in 0usize..3) {
            let status = ["AVAILABLE", "RENTED", "UNAVAILABLE"][status_idx];
            let payload = format!(r#"{{"bookId":{book_id},"bookStatus":"{status}"}}"#);

            let first = StockChangedEvent::decode(payload.as_bytes()).unwrap();
            let second = StockChangedEvent::decode(payload.as_bytes()).unwrap();

            prop_assert_eq!(first, second);
            prop_assert_eq!(first.book_id, book_id);
            prop_assert_eq!(first.book_status.as_str(), status);
        }
    }
}
