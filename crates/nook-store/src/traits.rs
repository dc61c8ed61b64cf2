use async_trait::async_trait;

use crate::error::StoreResult;
use crate::query::{Document, Fields, OrderBy, Predicate, QueryPage, StoreCursor};

/// Request/response boundary to the managed document store.
///
/// All implementations must satisfy these invariants:
/// - No client-side state is kept between calls.
/// - `query` returns documents matching every predicate, sorted by `order`
///   (ties by document id in the same direction), at most `limit` of them,
///   strictly after `cursor` when one is given.
/// - A write replaces the whole field map of one document. Nothing spans two
///   documents atomically.
/// - Timeouts are reported as [`crate::StoreError::Timeout`], never as a hang.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Run a filtered, ordered, limited query over a collection.
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order: &OrderBy,
        limit: usize,
        cursor: Option<&StoreCursor>,
    ) -> StoreResult<QueryPage>;

    /// Read one document.
    ///
    /// Returns [`crate::StoreError::NotFound`] if it does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Document>;

    /// Create or replace one document.
    async fn set_document(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()>;
}
