//! Enrollment repository: joining programs and rank advancement.

use crate::lock::KeyedLocks;
use crate::repository::RepositoryCore;
use chrono::Utc;
use kata_core::{
    enrollment_key, EngineConfig, EngineError, EngineResult, Enrollment, EnrollmentId, EntityKind,
    Program, ProgramId, RankId, UserId,
};
use kata_events::ChangeHub;
use kata_store::{Predicate, RemoteStoreClient};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Repository for enrollments, backed by the secondary store.
///
/// The "at most one enrolled record per (user, program)" invariant is
/// enforced by query-before-write; creation is serialized per pair with an
/// in-process lock since the store itself offers no uniqueness constraint.
pub struct EnrollmentRepository {
    core: RepositoryCore<Enrollment>,
    locks: KeyedLocks,
}

impl EnrollmentRepository {
    pub fn new(
        store: Arc<dyn RemoteStoreClient>,
        hub: &ChangeHub,
        config: &EngineConfig,
    ) -> Self {
        Self {
            core: RepositoryCore::new(store, hub.enrollments.clone(), config.list_page_size),
            locks: KeyedLocks::new(),
        }
    }

    /// Enroll a user in a program.
    ///
    /// The starting rank must exist in the program at assignment time;
    /// when none is given, the program's lowest-ordinal rank is assigned.
    /// A second enroll for the same pair fails with `Duplicate` while an
    /// enrolled record exists.
    #[instrument(skip(self, program), fields(program_id = %program.program_id))]
    pub async fn enroll(
        &self,
        user_id: UserId,
        program: &Program,
        rank_id: Option<RankId>,
    ) -> EngineResult<Enrollment> {
        let starting_rank = match rank_id {
            Some(rank_id) => Some(
                program
                    .rank_for(rank_id)
                    .ok_or_else(|| EngineError::Validation {
                        field: "current_rank_id".into(),
                        reason: "rank does not exist in the program".into(),
                    })?
                    .rank_id,
            ),
            None => program.entry_rank().map(|r| r.rank_id),
        };

        let _guard = self.locks.acquire(user_id, program.program_id).await;

        let key = enrollment_key(user_id, program.program_id);
        let duplicate = || EngineError::Duplicate {
            kind: EntityKind::Enrollment,
            natural_key: key.clone(),
        };

        // Cache-first check is best-effort only
        if self.core.cache().get_by_natural_key(&key).is_some() {
            return Err(duplicate());
        }
        let existing = self.enrolled_query(user_id, program.program_id).await?;
        if existing.is_some() {
            return Err(duplicate());
        }

        let mut enrollment = Enrollment::new(user_id, program.program_id);
        enrollment.current_rank_id = starting_rank;
        enrollment.rank_changed_at = starting_rank.map(|_| enrollment.enrolled_at);

        self.core.write(&enrollment).await?;
        self.core.notifier().created(enrollment.clone());
        debug!(enrollment_id = %enrollment.enrollment_id, "user enrolled");
        Ok(enrollment)
    }

    /// Read-through get by enrollment id.
    pub async fn get(&self, id: EnrollmentId) -> EngineResult<Option<Enrollment>> {
        self.core.get_by_id(id).await
    }

    /// The currently-enrolled record for a (user, program) pair, if any.
    pub async fn get_by_user_and_program(
        &self,
        user_id: UserId,
        program_id: ProgramId,
    ) -> EngineResult<Option<Enrollment>> {
        let key = enrollment_key(user_id, program_id);
        if let Some(enrollment) = self.core.cache().get_by_natural_key(&key) {
            return Ok(Some(enrollment));
        }
        self.enrolled_query(user_id, program_id).await
    }

    /// Advance the user's rank within a program. The target rank must
    /// exist in the program; the change stamps `rank_changed_at`.
    #[instrument(skip(self, program), fields(program_id = %program.program_id))]
    pub async fn advance_rank(
        &self,
        user_id: UserId,
        program: &Program,
        new_rank_id: RankId,
    ) -> EngineResult<Enrollment> {
        if program.rank_for(new_rank_id).is_none() {
            return Err(EngineError::Validation {
                field: "current_rank_id".into(),
                reason: "rank does not exist in the program".into(),
            });
        }

        let enrollment = self
            .get_by_user_and_program(user_id, program.program_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Enrollment,
                id: user_id,
            })?;

        let mut enrollment = self.require_remote(enrollment.enrollment_id).await?;
        let now = Utc::now();
        enrollment.current_rank_id = Some(new_rank_id);
        enrollment.rank_changed_at = Some(now);
        enrollment.updated_at = now;

        self.core.write(&enrollment).await?;
        self.core.notifier().updated(enrollment.clone());
        debug!(enrollment_id = %enrollment.enrollment_id, rank_id = %new_rank_id, "rank advanced");
        Ok(enrollment)
    }

    /// End the enrollment for a pair. The record is kept (never
    /// hard-deleted here) with `enrolled` and `active` cleared, freeing
    /// the pair for a later re-enrollment.
    #[instrument(skip(self))]
    pub async fn deactivate(
        &self,
        user_id: UserId,
        program_id: ProgramId,
    ) -> EngineResult<Enrollment> {
        let enrollment = self
            .get_by_user_and_program(user_id, program_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Enrollment,
                id: user_id,
            })?;

        let mut enrollment = self.require_remote(enrollment.enrollment_id).await?;
        enrollment.enrolled = false;
        enrollment.active = false;
        enrollment.updated_at = Utc::now();

        self.core.write(&enrollment).await?;
        self.core.notifier().updated(enrollment.clone());
        Ok(enrollment)
    }

    /// Update an enrollment after verifying it still exists remotely.
    pub async fn update(&self, mut enrollment: Enrollment) -> EngineResult<Enrollment> {
        self.require_remote(enrollment.enrollment_id).await?;
        enrollment.updated_at = Utc::now();
        self.core.write(&enrollment).await?;
        self.core.notifier().updated(enrollment.clone());
        Ok(enrollment)
    }

    /// Administrative hard delete of one enrollment record.
    pub async fn delete(&self, id: EnrollmentId) -> EngineResult<()> {
        let enrollment = self.require_remote(id).await?;
        self.core.delete(id).await?;
        self.core.notifier().deleted(enrollment);
        Ok(())
    }

    /// All enrollment records for a user, enrolled or lapsed.
    pub async fn list_for_user(&self, user_id: UserId) -> EngineResult<Vec<Enrollment>> {
        self.core
            .query_entities(
                &[Predicate::eq("user_id", user_id.to_string())],
                None,
                None,
            )
            .await
    }

    /// All enrollment records referencing a program.
    pub async fn list_for_program(&self, program_id: ProgramId) -> EngineResult<Vec<Enrollment>> {
        self.core
            .query_entities(
                &[Predicate::eq("program_id", program_id.to_string())],
                None,
                None,
            )
            .await
    }

    /// Remove every enrollment record for a program; cascade step of a
    /// program delete. Idempotent.
    pub async fn purge_for_program(&self, program_id: ProgramId) -> EngineResult<usize> {
        let records = self.list_for_program(program_id).await?;
        let count = records.len();
        for enrollment in records {
            self.core.delete(enrollment.enrollment_id).await?;
            self.core.notifier().deleted(enrollment);
        }
        Ok(count)
    }

    async fn enrolled_query(
        &self,
        user_id: UserId,
        program_id: ProgramId,
    ) -> EngineResult<Option<Enrollment>> {
        let results = self
            .core
            .query_entities(
                &[
                    Predicate::eq("user_id", user_id.to_string()),
                    Predicate::eq("program_id", program_id.to_string()),
                    Predicate::eq("enrolled", true),
                ],
                None,
                Some(1),
            )
            .await?;
        Ok(results.into_iter().next())
    }

    async fn require_remote(&self, id: EnrollmentId) -> EngineResult<Enrollment> {
        self.core
            .fetch_remote(id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Enrollment,
                id,
            })
    }
}
