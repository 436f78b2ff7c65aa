//! Error types for KATA operations

use crate::{EntityId, EntityKind};
use thiserror::Error;

/// Normalized error taxonomy for the remote document stores.
///
/// Both backing stores surface their vendor-specific codes through this
/// common shape; the engine never sees a raw store error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Document not found")]
    NotFound,

    #[error("Permission denied by store")]
    PermissionDenied,

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Unknown store error: {reason}")]
    Unknown { reason: String },
}

impl StoreError {
    /// Transient errors are worth retrying; the rest are terminal.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Result alias for store-boundary calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Engine-level error catalog returned by repositories and the reconciler.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("Entity not found: {kind:?} with id {id}")]
    NotFound { kind: EntityKind, id: EntityId },

    #[error("Duplicate {kind:?} for natural key {natural_key}")]
    Duplicate {
        kind: EntityKind,
        natural_key: String,
    },

    #[error("Conflict on {kind:?} {id}: {reason}")]
    Conflict {
        kind: EntityKind,
        id: EntityId,
        reason: String,
    },

    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Store call failed: {source}")]
    Network {
        #[source]
        source: StoreError,
    },

    #[error("Permission denied")]
    PermissionDenied,

    /// A cascading delete purged the primary entity but left dependent
    /// collections behind. The caller may retry just the cleanup step.
    #[error("Cascade incomplete for {kind:?} {id}: {remaining:?} not purged")]
    CascadeIncomplete {
        kind: EntityKind,
        id: EntityId,
        remaining: Vec<String>,
    },

    #[error("Unknown error: {reason}")]
    Unknown { reason: String },
}

impl EngineError {
    /// Map a store error into the engine catalog, attaching entity context.
    ///
    /// `NotFound` is contextual: a missing document during an operation
    /// that requires existence becomes `EngineError::NotFound` for that
    /// entity; transient and unknown failures pass through as `Network`
    /// and `Unknown`.
    pub fn from_store(err: StoreError, kind: EntityKind, id: EntityId) -> Self {
        match err {
            StoreError::NotFound => EngineError::NotFound { kind, id },
            StoreError::PermissionDenied => EngineError::PermissionDenied,
            StoreError::Unavailable { .. } => EngineError::Network { source: err },
            StoreError::Unknown { reason } => EngineError::Unknown { reason },
        }
    }

    /// Whether the consuming layer may usefully retry the operation.
    ///
    /// Validation, duplicate, and conflict errors are terminal: retrying
    /// without changing inputs cannot change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Network { .. })
    }
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    #[test]
    fn test_store_not_found_maps_to_entity_not_found() {
        let id = new_entity_id();
        let err = EngineError::from_store(StoreError::NotFound, EntityKind::Program, id);
        assert_eq!(
            err,
            EngineError::NotFound {
                kind: EntityKind::Program,
                id
            }
        );
    }

    #[test]
    fn test_only_network_errors_are_retryable() {
        let id = new_entity_id();
        let network = EngineError::from_store(
            StoreError::Unavailable {
                reason: "timeout".into(),
            },
            EntityKind::Enrollment,
            id,
        );
        assert!(network.is_retryable());

        let duplicate = EngineError::Duplicate {
            kind: EntityKind::Program,
            natural_key: "Karate".into(),
        };
        assert!(!duplicate.is_retryable());
        assert!(!EngineError::PermissionDenied.is_retryable());
    }

    #[test]
    fn test_cascade_error_names_remaining_collections() {
        let err = EngineError::CascadeIncomplete {
            kind: EntityKind::Program,
            id: new_entity_id(),
            remaining: vec!["progress_entries".into(), "rank_progress".into()],
        };
        let text = err.to_string();
        assert!(text.contains("progress_entries"));
        assert!(text.contains("rank_progress"));
    }
}
