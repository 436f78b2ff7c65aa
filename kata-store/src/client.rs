//! Async remote store contract.

use crate::{Document, OrderBy, Predicate};
use async_trait::async_trait;
use kata_core::StoreResult;
use serde_json::Value;

/// Thin async interface over a remote document store.
///
/// Two instances back the engine: the user-private primary store and the
/// shared multi-tenant secondary store. Both are reached through this one
/// contract; store-specific error codes are normalized to `StoreError`
/// behind it, and any callback-style vendor SDK is wrapped at this
/// boundary only.
///
/// Timeouts are this layer's responsibility; callers above it never impose
/// their own timeout/retry loop on individual calls.
#[async_trait]
pub trait RemoteStoreClient: Send + Sync {
    /// Fetch one document by key. `Ok(None)` when absent; absence is not
    /// an error at this level.
    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Query a collection. Predicates are ANDed; `order_by` and `limit`
    /// are optional.
    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>>;

    /// Write a document. With `merge` set, provided fields are merged into
    /// the existing document (nested maps merge per key); otherwise the
    /// document is replaced wholesale.
    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        merge: bool,
    ) -> StoreResult<()>;

    /// Delete a document by key. Deleting an absent document succeeds.
    async fn delete_document(&self, collection: &str, id: &str) -> StoreResult<()>;
}
