//! Stored entity marker trait and implementations.
//!
//! `StoredEntity` ties a typed record to its collection, its identity, and
//! its optional natural key, and provides the document conversion used at
//! the store boundary. The repositories and the cache are generic over it,
//! so the locking and read-through discipline is derived once instead of
//! per entity kind.

use crate::{collections, Document};
use kata_core::{
    Enrollment, EntityId, EntityKind, ProgressEntry, Program, RankProgress, StoreError,
    StoreProfile, StoreResult, StudioMembership, Subscription,
};
use serde::{de::DeserializeOwned, Serialize};

/// Marker trait for records persisted in a remote store collection.
///
/// # Implementation Requirements
///
/// - `COLLECTION` and `ID_FIELD` must be consistent with the serialized
///   field layout (the id field appears inside the document too, which is
///   what cursor pagination orders on).
/// - `natural_key()` returns the non-id uniqueness key, if the kind has
///   one (Program name, Enrollment (user, program) pair).
/// - Implementations must be `Clone + Serialize + DeserializeOwned +
///   Send + Sync + 'static` for cache storage and async use.
pub trait StoredEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection this entity kind lives in.
    const COLLECTION: &'static str;

    /// Name of the serialized id field, used as the pagination cursor.
    const ID_FIELD: &'static str;

    /// Entity kind discriminator.
    fn kind() -> EntityKind;

    /// Unique identifier of this instance.
    fn entity_id(&self) -> EntityId;

    /// Natural (non-id) uniqueness key, if this kind has one.
    fn natural_key(&self) -> Option<String> {
        None
    }

    /// Serialize into a store field map.
    fn to_fields(&self) -> StoreResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| StoreError::Unknown {
            reason: format!("encode {:?}: {e}", Self::kind()),
        })
    }

    /// Decode from a fetched document.
    fn from_document(doc: &Document) -> StoreResult<Self> {
        serde_json::from_value(doc.fields.clone()).map_err(|e| StoreError::Unknown {
            reason: format!("decode {:?} {}: {e}", Self::kind(), doc.id),
        })
    }
}

impl StoredEntity for Program {
    const COLLECTION: &'static str = collections::PROGRAMS;
    const ID_FIELD: &'static str = "program_id";

    fn kind() -> EntityKind {
        EntityKind::Program
    }

    fn entity_id(&self) -> EntityId {
        self.program_id
    }

    fn natural_key(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

impl StoredEntity for Enrollment {
    const COLLECTION: &'static str = collections::ENROLLMENTS;
    const ID_FIELD: &'static str = "enrollment_id";

    fn kind() -> EntityKind {
        EntityKind::Enrollment
    }

    fn entity_id(&self) -> EntityId {
        self.enrollment_id
    }

    /// Only the currently-enrolled record for a pair is indexed; lapsed
    /// records share the pair but carry no uniqueness claim.
    fn natural_key(&self) -> Option<String> {
        self.enrolled.then(|| self.pair_key())
    }
}

impl StoredEntity for ProgressEntry {
    const COLLECTION: &'static str = collections::PROGRESS_ENTRIES;
    const ID_FIELD: &'static str = "entry_id";

    fn kind() -> EntityKind {
        EntityKind::ProgressEntry
    }

    fn entity_id(&self) -> EntityId {
        self.entry_id
    }
}

impl StoredEntity for RankProgress {
    const COLLECTION: &'static str = collections::RANK_PROGRESS;
    const ID_FIELD: &'static str = "rank_progress_id";

    fn kind() -> EntityKind {
        EntityKind::RankProgress
    }

    fn entity_id(&self) -> EntityId {
        self.rank_progress_id
    }

    fn natural_key(&self) -> Option<String> {
        Some(self.composite_key())
    }
}

impl StoredEntity for StoreProfile {
    const COLLECTION: &'static str = collections::PROFILES;
    const ID_FIELD: &'static str = "profile_id";

    fn kind() -> EntityKind {
        EntityKind::Profile
    }

    fn entity_id(&self) -> EntityId {
        self.profile_id
    }

    fn natural_key(&self) -> Option<String> {
        self.auth_id.clone()
    }
}

impl StoredEntity for Subscription {
    const COLLECTION: &'static str = collections::SUBSCRIPTIONS;
    const ID_FIELD: &'static str = "subscription_id";

    fn kind() -> EntityKind {
        EntityKind::Subscription
    }

    fn entity_id(&self) -> EntityId {
        self.subscription_id
    }

    fn natural_key(&self) -> Option<String> {
        // One subscription per user at this boundary.
        Some(self.user_id.to_string())
    }
}

impl StoredEntity for StudioMembership {
    const COLLECTION: &'static str = collections::STUDIO_MEMBERSHIPS;
    const ID_FIELD: &'static str = "membership_id";

    fn kind() -> EntityKind {
        EntityKind::StudioMembership
    }

    fn entity_id(&self) -> EntityId {
        self.membership_id
    }

    fn natural_key(&self) -> Option<String> {
        Some(self.user_id.to_string())
    }
}
