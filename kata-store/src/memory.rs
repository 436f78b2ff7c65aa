//! In-memory implementation of the remote store contract.
//!
//! Reference implementation used by unit tests across the workspace. It
//! honors the full contract, including merge-writes and query semantics,
//! and supports fault injection so callers can exercise the engine's
//! partial-failure paths.

use crate::document::compare_values;
use crate::{Document, OrderBy, Predicate, RemoteStoreClient};
use async_trait::async_trait;
use kata_core::{StoreError, StoreResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct Fault {
    error: StoreError,
    once: bool,
}

/// In-memory document store keyed by collection name.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    faults: StdMutex<HashMap<String, Fault>>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `collection` fail with `error` until
    /// cleared.
    pub fn fail_collection(&self, collection: &str, error: StoreError) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.insert(collection.to_string(), Fault { error, once: false });
    }

    /// Make the next operation on `collection` fail with `error`, then
    /// recover.
    pub fn fail_once(&self, collection: &str, error: StoreError) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.insert(collection.to_string(), Fault { error, once: true });
    }

    /// Clear all injected faults.
    pub fn clear_faults(&self) {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        faults.clear();
    }

    /// Number of documents currently in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }

    fn check_fault(&self, collection: &str) -> StoreResult<()> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(fault) = faults.get(collection).cloned() {
            if fault.once {
                faults.remove(collection);
            }
            return Err(fault.error);
        }
        Ok(())
    }
}

/// Merge `incoming` into `existing`: nested maps merge per key, everything
/// else is replaced.
fn merge_fields(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) if slot.is_object() && value.is_object() => {
                        merge_fields(slot, value);
                    }
                    _ => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

#[async_trait]
impl RemoteStoreClient for InMemoryRemoteStore {
    async fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        self.check_fault(collection)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    async fn query(
        &self,
        collection: &str,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<Document>> {
        self.check_fault(collection)?;
        let collections = self.collections.read().await;
        let mut results: Vec<Document> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| predicates.iter().all(|p| p.matches(fields)))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order_by {
            results.sort_by(|a, b| {
                let ordering = compare_values(
                    a.fields.get(&order.field).unwrap_or(&Value::Null),
                    b.fields.get(&order.field).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = limit {
            results.truncate(limit);
        }
        Ok(results)
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        merge: bool,
    ) -> StoreResult<()> {
        self.check_fault(collection)?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => merge_fields(existing, fields),
            _ => {
                docs.insert(id.to_string(), fields);
            }
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.check_fault(collection)?;
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ]
    }

    proptest! {
        /// A merge-write never loses fields absent from the incoming
        /// document, and every incoming field wins.
        #[test]
        fn merge_keeps_keys_absent_from_incoming(
            base in proptest::collection::btree_map("[a-z]{1,6}", json_scalar(), 0..8),
            incoming in proptest::collection::btree_map("[a-z]{1,6}", json_scalar(), 0..8),
        ) {
            let mut existing = Value::Object(base.clone().into_iter().collect());
            merge_fields(&mut existing, Value::Object(incoming.clone().into_iter().collect()));
            let merged = existing.as_object().unwrap();

            for (key, value) in &base {
                if !incoming.contains_key(key) {
                    prop_assert_eq!(merged.get(key), Some(value));
                }
            }
            for (key, value) in &incoming {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryRemoteStore::new();
        store
            .set_document("programs", "p1", json!({"name": "Karate"}), false)
            .await
            .unwrap();

        let doc = store.get_document("programs", "p1").await.unwrap().unwrap();
        assert_eq!(doc.fields["name"], "Karate");
        assert!(store.get_document("programs", "p2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_preserves_sibling_fields() {
        let store = InMemoryRemoteStore::new();
        store
            .set_document(
                "rank_progress",
                "rp1",
                json!({"completion": 0.2, "item_completion": {"kata": 0.5}}),
                false,
            )
            .await
            .unwrap();
        store
            .set_document(
                "rank_progress",
                "rp1",
                json!({"item_completion": {"kihon": 1.0}}),
                true,
            )
            .await
            .unwrap();

        let doc = store
            .get_document("rank_progress", "rp1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.fields["completion"], 0.2);
        assert_eq!(doc.fields["item_completion"]["kata"], 0.5);
        assert_eq!(doc.fields["item_completion"]["kihon"], 1.0);
    }

    #[tokio::test]
    async fn test_replace_drops_absent_fields() {
        let store = InMemoryRemoteStore::new();
        store
            .set_document("programs", "p1", json!({"name": "Karate", "active": true}), false)
            .await
            .unwrap();
        store
            .set_document("programs", "p1", json!({"name": "Judo"}), false)
            .await
            .unwrap();

        let doc = store.get_document("programs", "p1").await.unwrap().unwrap();
        assert!(doc.fields.get("active").is_none());
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let store = InMemoryRemoteStore::new();
        for (id, name, ordinal) in [("a", "White", 0), ("b", "Yellow", 1), ("c", "Orange", 2)] {
            store
                .set_document(
                    "ranks",
                    id,
                    json!({"name": name, "ordinal": ordinal, "active": true}),
                    false,
                )
                .await
                .unwrap();
        }

        let docs = store
            .query(
                "ranks",
                &[Predicate::eq("active", true)],
                Some(&OrderBy::desc("ordinal")),
                Some(2),
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].fields["name"], "Orange");
        assert_eq!(docs[1].fields["name"], "Yellow");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryRemoteStore::new();
        store
            .set_document("programs", "p1", json!({"name": "Karate"}), false)
            .await
            .unwrap();
        store.delete_document("programs", "p1").await.unwrap();
        store.delete_document("programs", "p1").await.unwrap();
        assert!(store.get_document("programs", "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let store = InMemoryRemoteStore::new();
        store.fail_once(
            "subscriptions",
            StoreError::Unavailable {
                reason: "injected".into(),
            },
        );

        let err = store
            .get_document("subscriptions", "s1")
            .await
            .unwrap_err();
        assert!(err.is_transient());

        // Once-faults clear after firing
        assert!(store
            .get_document("subscriptions", "s1")
            .await
            .unwrap()
            .is_none());

        store.fail_collection("subscriptions", StoreError::PermissionDenied);
        assert_eq!(
            store.get_document("subscriptions", "s1").await.unwrap_err(),
            StoreError::PermissionDenied
        );
        store.clear_faults();
        assert!(store
            .get_document("subscriptions", "s1")
            .await
            .unwrap()
            .is_none());
    }
}
