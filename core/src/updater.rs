//! The downstream state-updater seam.
//!
//! The inventory itself (persistence, REST exposure, pagination) lives
//! outside this adapter. The consumer loop only needs one operation from
//! it: "set the status of book N". [`StockUpdater`] is that operation.

use crate::event::BookStatus;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors an updater may report for a single status change.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The store rejected the id as unknown.
    #[error("book {book_id} not found")]
    BookNotFound {
        /// The id that was rejected.
        book_id: i64,
    },

    /// The store failed to persist the change.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Applies a stock-status change to the book inventory.
///
/// One decoded event triggers exactly one `apply_status` call. The adapter
/// delivers at-least-once, so implementations must be idempotent: applying
/// the same (`book_id`, `status`) pair twice must be indistinguishable from
/// applying it once.
///
/// Failures are the updater's own; the consumer loop logs them and moves on
/// to the next record rather than aborting the batch.
///
/// # Dyn Compatibility
///
/// Returns an explicit `Pin<Box<dyn Future>>` instead of `async fn` so the
/// updater can be injected as `Arc<dyn StockUpdater>`.
pub trait StockUpdater: Send + Sync {
    /// Set the stock status of one book.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] when the change cannot be applied; the caller
    /// treats this as a per-message failure, not a loop failure.
    fn apply_status(
        &self,
        book_id: i64,
        status: BookStatus,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApplyError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;

    impl StockUpdater for AlwaysOk {
        fn apply_status(
            &self,
            _book_id: i64,
            _status: BookStatus,
        ) -> Pin<Box<dyn Future<Output = Result<(), ApplyError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn updater_is_dyn_compatible() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn StockUpdater>();

        let _boxed: Box<dyn StockUpdater> = Box::new(AlwaysOk);
    }

    #[tokio::test]
    async fn apply_status_resolves_through_the_trait_object() {
        let updater: Box<dyn StockUpdater> = Box::new(AlwaysOk);
        assert!(updater.apply_status(1, BookStatus::Available).await.is_ok());
    }

    #[test]
    fn apply_error_display_carries_context() {
        let err = ApplyError::BookNotFound { book_id: 7 };
        assert_eq!(err.to_string(), "book 7 not found");
    }
}
