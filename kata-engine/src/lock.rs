//! Keyed in-process locks for enrollment writes.

use kata_core::{ProgramId, UserId};
use std::collections::HashMap;
use std::sync::{Mutex as StdMutex, PoisonError};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes enrollment creation per (user, program) pair.
///
/// The backing store exposes no uniqueness constraint on the pair, so the
/// query-then-write check in `EnrollmentRepository::enroll` is only safe
/// when writes for one pair cannot interleave. One lock per pair closes
/// that window for this process; the engine serves a single session per
/// process, so no cross-process coordination is needed.
pub(crate) struct KeyedLocks {
    locks: StdMutex<HashMap<(UserId, ProgramId), Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self {
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Acquire the lock for a pair, creating it on first use. The guard is
    /// held across the check-then-write sequence, never across unrelated
    /// calls.
    pub async fn acquire(&self, user_id: UserId, program_id: ProgramId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                locks
                    .entry((user_id, program_id))
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kata_core::new_entity_id;

    #[tokio::test]
    async fn test_same_pair_serializes() {
        let locks = Arc::new(KeyedLocks::new());
        let user = new_entity_id();
        let program = new_entity_id();

        let guard = locks.acquire(user, program).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(user, program).await })
        };
        // The contender cannot finish while the guard is held.
        tokio::task::yield_now().await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_pairs_do_not_contend() {
        let locks = KeyedLocks::new();
        let user = new_entity_id();
        let _a = locks.acquire(user, new_entity_id()).await;
        let _b = locks.acquire(user, new_entity_id()).await;
    }
}
