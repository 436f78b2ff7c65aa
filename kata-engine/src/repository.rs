//! Generic repository scaffolding shared by the per-entity repositories.
//!
//! One `RepositoryCore` wraps one remote store client, one entity cache,
//! and one change notifier. The per-entity repositories layer their
//! invariants (uniqueness, existence, referential checks) on top of these
//! primitives; the locking and read-through discipline lives here once
//! instead of being re-derived per entity kind.

use kata_core::{EngineError, EngineResult, EntityId, StoreError};
use kata_events::ChangeNotifier;
use kata_store::{Document, EntityCache, OrderBy, Predicate, RemoteStoreClient, StoredEntity};
use std::sync::Arc;
use tracing::debug;

/// Map a store error from an unkeyed call (query, raw write) into the
/// engine catalog. `NotFound` is not expected from these calls.
pub(crate) fn store_call_error(err: StoreError) -> EngineError {
    match err {
        StoreError::PermissionDenied => EngineError::PermissionDenied,
        StoreError::Unavailable { .. } => EngineError::Network { source: err },
        StoreError::Unknown { reason } => EngineError::Unknown { reason },
        StoreError::NotFound => EngineError::Unknown {
            reason: "unexpected not-found from store call".into(),
        },
    }
}

pub(crate) struct RepositoryCore<T: StoredEntity> {
    store: Arc<dyn RemoteStoreClient>,
    cache: EntityCache<T>,
    notifier: ChangeNotifier<T>,
    page_size: usize,
}

impl<T: StoredEntity> RepositoryCore<T> {
    pub fn new(
        store: Arc<dyn RemoteStoreClient>,
        notifier: ChangeNotifier<T>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            cache: EntityCache::new(),
            notifier,
            page_size: page_size.max(1),
        }
    }

    pub fn cache(&self) -> &EntityCache<T> {
        &self.cache
    }

    pub fn notifier(&self) -> &ChangeNotifier<T> {
        &self.notifier
    }

    pub fn store(&self) -> &Arc<dyn RemoteStoreClient> {
        &self.store
    }

    /// Read-through get: cache hit returns immediately, a miss queries the
    /// remote store and populates the cache. Remote not-found is `None`,
    /// not an error.
    pub async fn get_by_id(&self, id: EntityId) -> EngineResult<Option<T>> {
        if let Some(entity) = self.cache.get(id) {
            return Ok(Some(entity));
        }
        self.fetch_remote(id).await
    }

    /// Authoritative get that bypasses the cache; used for existence
    /// checks before mutations, since the cache may be stale relative to
    /// other processes. A found entity still refreshes the cache.
    pub async fn fetch_remote(&self, id: EntityId) -> EngineResult<Option<T>> {
        let doc = self
            .store
            .get_document(T::COLLECTION, &id.to_string())
            .await
            .map_err(store_call_error)?;
        match doc {
            Some(doc) => {
                let entity = T::from_document(&doc).map_err(store_call_error)?;
                self.cache.put(&entity);
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    /// Replace-write the entity and update the cache synchronously, so the
    /// writer observes its own write on the next read.
    pub async fn write(&self, entity: &T) -> EngineResult<()> {
        let id = entity.entity_id();
        let fields = entity.to_fields().map_err(store_call_error)?;
        self.store
            .set_document(T::COLLECTION, &id.to_string(), fields, false)
            .await
            .map_err(|e| EngineError::from_store(e, T::kind(), id))?;
        self.cache.put(entity);
        Ok(())
    }

    /// Merge-write partial fields into the entity's document, then refresh
    /// the cache with the caller-supplied post-merge value.
    pub async fn merge_write(
        &self,
        id: EntityId,
        fields: serde_json::Value,
        merged: &T,
    ) -> EngineResult<()> {
        self.store
            .set_document(T::COLLECTION, &id.to_string(), fields, true)
            .await
            .map_err(|e| EngineError::from_store(e, T::kind(), id))?;
        self.cache.put(merged);
        Ok(())
    }

    /// Delete the document and evict it from the cache.
    pub async fn delete(&self, id: EntityId) -> EngineResult<()> {
        self.store
            .delete_document(T::COLLECTION, &id.to_string())
            .await
            .map_err(|e| EngineError::from_store(e, T::kind(), id))?;
        self.cache.remove(id);
        Ok(())
    }

    /// Query and decode entities, populating the cache for each item
    /// returned. The cache is additive: entries absent from the result are
    /// not evicted. Limited queries larger than one page are fetched with
    /// cursor pagination on the id field.
    pub async fn query_entities(
        &self,
        predicates: &[Predicate],
        order_by: Option<&OrderBy>,
        limit: Option<usize>,
    ) -> EngineResult<Vec<T>> {
        let docs = match (order_by, limit) {
            (None, Some(limit)) if limit > self.page_size => {
                self.query_paged(predicates, limit).await?
            }
            _ => self
                .store
                .query(T::COLLECTION, predicates, order_by, limit)
                .await
                .map_err(store_call_error)?,
        };

        let mut entities = Vec::with_capacity(docs.len());
        for doc in &docs {
            let entity = T::from_document(doc).map_err(store_call_error)?;
            self.cache.put(&entity);
            entities.push(entity);
        }
        debug!(
            collection = T::COLLECTION,
            count = entities.len(),
            "query populated cache"
        );
        Ok(entities)
    }

    async fn query_paged(
        &self,
        predicates: &[Predicate],
        limit: usize,
    ) -> EngineResult<Vec<Document>> {
        let order = OrderBy::asc(T::ID_FIELD);
        let mut results: Vec<Document> = Vec::new();
        let mut cursor: Option<String> = None;

        while results.len() < limit {
            let page_limit = self.page_size.min(limit - results.len());
            let mut page_predicates = predicates.to_vec();
            if let Some(cursor) = &cursor {
                page_predicates.push(Predicate::gt(T::ID_FIELD, cursor.clone()));
            }
            let page = self
                .store
                .query(T::COLLECTION, &page_predicates, Some(&order), Some(page_limit))
                .await
                .map_err(store_call_error)?;
            let fetched = page.len();
            if fetched == 0 {
                break;
            }
            cursor = page.last().map(|d| d.id.clone());
            results.extend(page);
            if fetched < page_limit {
                break;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_core::{Program, ProgramCategory};
    use kata_store::{InMemoryRemoteStore, StoredEntity};

    fn core_with_store() -> (RepositoryCore<Program>, Arc<InMemoryRemoteStore>) {
        let store = Arc::new(InMemoryRemoteStore::new());
        let core = RepositoryCore::new(
            Arc::clone(&store) as Arc<dyn RemoteStoreClient>,
            ChangeNotifier::new(8),
            3,
        );
        (core, store)
    }

    #[tokio::test]
    async fn test_get_by_id_reads_through_and_caches() {
        let (core, store) = core_with_store();
        let program = Program::new("Karate", ProgramCategory::Striking);
        store
            .set_document(
                Program::COLLECTION,
                &program.program_id.to_string(),
                program.to_fields().unwrap(),
                false,
            )
            .await
            .unwrap();

        let fetched = core.get_by_id(program.program_id).await.unwrap().unwrap();
        assert_eq!(fetched, program);

        // Second read is served from cache even if the store goes away
        store.fail_collection(
            Program::COLLECTION,
            StoreError::Unavailable {
                reason: "down".into(),
            },
        );
        assert!(core.get_by_id(program.program_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_then_read_own_write() {
        let (core, _store) = core_with_store();
        let program = Program::new("Judo", ProgramCategory::Grappling);
        core.write(&program).await.unwrap();
        assert_eq!(core.get_by_id(program.program_id).await.unwrap().unwrap(), program);
    }

    #[tokio::test]
    async fn test_query_paginates_past_page_size() {
        let (core, _store) = core_with_store();
        for i in 0..10 {
            let program = Program::new(format!("p-{i:02}"), ProgramCategory::Hybrid);
            core.write(&program).await.unwrap();
        }

        // page_size is 3; a limit of 8 takes three cursor pages
        let results = core.query_entities(&[], None, Some(8)).await.unwrap();
        assert_eq!(results.len(), 8);

        let all = core.query_entities(&[], None, None).await.unwrap();
        assert_eq!(all.len(), 10);
    }

    #[tokio::test]
    async fn test_store_failure_maps_to_network_error() {
        let (core, store) = core_with_store();
        store.fail_collection(
            Program::COLLECTION,
            StoreError::Unavailable {
                reason: "down".into(),
            },
        );
        let err = core.query_entities(&[], None, None).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
