//! KATA Store - Remote Store Contract and Entity Cache
//!
//! Defines the storage boundary of the engine: the `RemoteStoreClient`
//! trait both backing stores implement, the generic `EntityCache` used as a
//! read-accelerating layer in front of a store, and the in-memory store
//! used by tests and as the reference implementation of the contract.
//!
//! The cache is deliberately not a source of truth. Every mutating
//! operation in the repositories still performs its authoritative check
//! against the remote store; the cache only accelerates reads and is
//! eventually consistent with writes made through this process.

pub mod cache;
pub mod client;
pub mod document;
pub mod entity;
pub mod memory;

pub use cache::{CacheStats, EntityCache};
pub use client::RemoteStoreClient;
pub use document::{collections, Document, OrderBy, Predicate, PredicateOp};
pub use entity::StoredEntity;
pub use memory::InMemoryRemoteStore;
