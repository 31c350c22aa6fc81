//! In-memory book inventory.
//!
//! Stands in for the inventory's own store (persistence and REST exposure
//! live in the inventory service, not in this adapter). Upserts are
//! idempotent, which is what the at-least-once channel requires: replaying
//! a stock change leaves the inventory unchanged.

use bookstock_core::{ApplyError, BookStatus, StockUpdater};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

/// A [`StockUpdater`] backed by a process-local map.
///
/// Unknown book ids are accepted and registered: a freshly deployed adapter
/// must be able to take stock for books it has not seen yet. Real stores
/// that reject unknown ids report [`ApplyError::BookNotFound`] instead.
#[derive(Default)]
pub struct InMemoryInventory {
    books: RwLock<HashMap<i64, BookStatus>>,
}

impl InMemoryInventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of a book, if it has been seen.
    #[must_use]
    pub fn status_of(&self, book_id: i64) -> Option<BookStatus> {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&book_id)
            .copied()
    }

    /// Number of books tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no books are tracked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StockUpdater for InMemoryInventory {
    fn apply_status(
        &self,
        book_id: i64,
        status: BookStatus,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApplyError>> + Send + '_>> {
        Box::pin(async move {
            let previous = self
                .books
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(book_id, status);

            match previous {
                Some(old) if old == status => {
                    debug!(book_id, status = %status, "stock status unchanged");
                }
                Some(old) => {
                    info!(book_id, from = %old, to = %status, "book status updated");
                }
                None => {
                    info!(book_id, status = %status, "book registered with initial status");
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upserts_and_reads_back() {
        let inventory = InMemoryInventory::new();
        assert!(inventory.is_empty());

        inventory
            .apply_status(42, BookStatus::Rented)
            .await
            .expect("apply");
        inventory
            .apply_status(42, BookStatus::Available)
            .await
            .expect("apply");

        assert_eq!(inventory.status_of(42), Some(BookStatus::Available));
        assert_eq!(inventory.len(), 1);
    }

    #[tokio::test]
    async fn reapplying_same_status_is_a_no_op() {
        let inventory = InMemoryInventory::new();

        inventory
            .apply_status(7, BookStatus::Rented)
            .await
            .expect("apply");
        inventory
            .apply_status(7, BookStatus::Rented)
            .await
            .expect("replay");

        assert_eq!(inventory.status_of(7), Some(BookStatus::Rented));
        assert_eq!(inventory.len(), 1);
    }

    #[tokio::test]
    async fn unknown_book_is_registered() {
        let inventory = InMemoryInventory::new();
        inventory
            .apply_status(1, BookStatus::Unavailable)
            .await
            .expect("apply");
        assert_eq!(inventory.status_of(1), Some(BookStatus::Unavailable));
    }
}
