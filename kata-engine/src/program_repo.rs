//! Program repository: curriculum browsing and administration.

use crate::repository::{store_call_error, RepositoryCore};
use crate::{EnrollmentRepository, ProgressRepository};
use chrono::Utc;
use kata_core::{
    EngineConfig, EngineError, EngineResult, EntityKind, Program, ProgramCategory, ProgramId,
    Rank, RankId,
};
use kata_events::ChangeHub;
use kata_store::{collections, Predicate, RemoteStoreClient};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Filter for program listings and search.
#[derive(Debug, Clone, Default)]
pub struct ProgramFilter {
    pub category: Option<ProgramCategory>,
    pub active_only: bool,
    pub name_contains: Option<String>,
    pub limit: Option<usize>,
}

impl ProgramFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: ProgramCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn with_name_contains(mut self, text: impl Into<String>) -> Self {
        self.name_contains = Some(text.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(category) = self.category {
            predicates.push(Predicate::eq(
                "category",
                serde_json::to_value(category).unwrap_or_default(),
            ));
        }
        if self.active_only {
            predicates.push(Predicate::eq("active", true));
        }
        if let Some(text) = &self.name_contains {
            predicates.push(Predicate::contains("name", text.clone()));
        }
        predicates
    }
}

/// Repository for training programs, backed by the secondary store.
///
/// Holds the dependent repositories so a program delete can cascade
/// through their collections and caches in one place.
pub struct ProgramRepository {
    core: RepositoryCore<Program>,
    enrollments: Arc<EnrollmentRepository>,
    progress: Arc<ProgressRepository>,
}

impl ProgramRepository {
    pub fn new(
        store: Arc<dyn RemoteStoreClient>,
        hub: &ChangeHub,
        config: &EngineConfig,
        enrollments: Arc<EnrollmentRepository>,
        progress: Arc<ProgressRepository>,
    ) -> Self {
        Self {
            core: RepositoryCore::new(store, hub.programs.clone(), config.list_page_size),
            enrollments,
            progress,
        }
    }

    /// Create a program. The name must be unique among active programs;
    /// checked cache-first and then against the store. The check-then-write
    /// window is not closed by the store itself.
    #[instrument(skip(self, program), fields(name = %program.name))]
    pub async fn create(&self, mut program: Program) -> EngineResult<Program> {
        program.validate()?;

        let duplicate = |name: &str| EngineError::Duplicate {
            kind: EntityKind::Program,
            natural_key: name.to_string(),
        };

        // Cache-first check is best-effort only
        let cached = self
            .core
            .cache()
            .find_by(|p| p.active && p.name == program.name);
        if !cached.is_empty() {
            return Err(duplicate(&program.name));
        }

        let existing = self
            .core
            .query_entities(
                &[
                    Predicate::eq("name", program.name.clone()),
                    Predicate::eq("active", true),
                ],
                None,
                Some(1),
            )
            .await?;
        if !existing.is_empty() {
            return Err(duplicate(&program.name));
        }

        let now = Utc::now();
        program.created_at = now;
        program.updated_at = now;
        self.core.write(&program).await?;
        self.core.notifier().created(program.clone());
        debug!(program_id = %program.program_id, "program created");
        Ok(program)
    }

    /// Read-through get; `Ok(None)` when the store has no such program.
    pub async fn get_by_id(&self, id: ProgramId) -> EngineResult<Option<Program>> {
        self.core.get_by_id(id).await
    }

    /// Update a program after verifying it still exists remotely; the
    /// cache may be stale relative to other processes.
    #[instrument(skip(self, program), fields(program_id = %program.program_id))]
    pub async fn update(&self, mut program: Program) -> EngineResult<Program> {
        program.validate()?;
        if self.core.fetch_remote(program.program_id).await?.is_none() {
            return Err(EngineError::NotFound {
                kind: EntityKind::Program,
                id: program.program_id,
            });
        }
        program.updated_at = Utc::now();
        self.core.write(&program).await?;
        self.core.notifier().updated(program.clone());
        Ok(program)
    }

    /// Delete a program, blocked while enrolled dependents exist.
    ///
    /// On success the dependent enrollment, progress, and rank-progress
    /// records for the program are purged in sequence. The cascade is
    /// best-effort: a failure partway through leaves the program deleted
    /// and returns `CascadeIncomplete` naming the collections left behind,
    /// which `purge_dependents` can retry.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ProgramId) -> EngineResult<()> {
        let program = self
            .core
            .fetch_remote(id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Program,
                id,
            })?;

        let enrolled = self
            .core
            .store()
            .query(
                collections::ENROLLMENTS,
                &[
                    Predicate::eq("program_id", id.to_string()),
                    Predicate::eq("enrolled", true),
                ],
                None,
                Some(1),
            )
            .await
            .map_err(store_call_error)?;
        if !enrolled.is_empty() {
            return Err(EngineError::Conflict {
                kind: EntityKind::Program,
                id,
                reason: "enrolled students reference this program".into(),
            });
        }

        self.core.delete(id).await?;
        self.core.notifier().deleted(program);
        debug!(program_id = %id, "program deleted, purging dependents");
        self.purge_dependents(id).await
    }

    /// Purge dependent records for a (deleted) program. Idempotent; safe
    /// to retry after a `CascadeIncomplete`.
    pub async fn purge_dependents(&self, id: ProgramId) -> EngineResult<()> {
        let mut remaining = Vec::new();

        if let Err(err) = self.enrollments.purge_for_program(id).await {
            warn!(program_id = %id, %err, "enrollment purge failed");
            remaining.push(collections::ENROLLMENTS.to_string());
        }
        if let Err(err) = self.progress.purge_entries_for_program(id).await {
            warn!(program_id = %id, %err, "progress entry purge failed");
            remaining.push(collections::PROGRESS_ENTRIES.to_string());
        }
        if let Err(err) = self.progress.purge_rank_progress_for_program(id).await {
            warn!(program_id = %id, %err, "rank progress purge failed");
            remaining.push(collections::RANK_PROGRESS.to_string());
        }

        if remaining.is_empty() {
            Ok(())
        } else {
            Err(EngineError::CascadeIncomplete {
                kind: EntityKind::Program,
                id,
                remaining,
            })
        }
    }

    /// List programs matching the filter, populating the cache for each
    /// item returned. Never publishes.
    pub async fn list(&self, filter: &ProgramFilter) -> EngineResult<Vec<Program>> {
        self.core
            .query_entities(&filter.predicates(), None, filter.limit)
            .await
    }

    /// The rank following `rank_id` in the program's progression order.
    /// `Ok(None)` when `rank_id` is the highest rank.
    pub async fn next_rank(
        &self,
        program_id: ProgramId,
        rank_id: RankId,
    ) -> EngineResult<Option<Rank>> {
        let program = self
            .core
            .get_by_id(program_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Program,
                id: program_id,
            })?;
        Ok(program.next_rank(rank_id).cloned())
    }

}
