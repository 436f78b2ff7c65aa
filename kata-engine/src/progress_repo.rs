//! Progress repository: the append-only journal and per-rank completion.

use crate::repository::{store_call_error, RepositoryCore};
use kata_core::{
    rank_progress_key, EngineConfig, EngineError, EngineResult, ProgramId, ProgressEntry,
    ProgressKind, RankId, RankProgress, RankProgressUpdate, Timestamp, UserId,
};
use kata_events::ChangeHub;
use kata_store::{OrderBy, Predicate, RemoteStoreClient};
use serde_json::Map;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Filter for journal entry listings.
#[derive(Debug, Clone, Default)]
pub struct ProgressFilter {
    pub user_id: Option<UserId>,
    pub program_id: Option<ProgramId>,
    pub kind: Option<ProgressKind>,
    pub limit: Option<usize>,
}

impl ProgressFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn for_program(mut self, program_id: ProgramId) -> Self {
        self.program_id = Some(program_id);
        self
    }

    pub fn with_kind(mut self, kind: ProgressKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(user_id) = self.user_id {
            predicates.push(Predicate::eq("user_id", user_id.to_string()));
        }
        if let Some(program_id) = self.program_id {
            predicates.push(Predicate::eq("program_id", program_id.to_string()));
        }
        if let Some(kind) = self.kind {
            predicates.push(Predicate::eq(
                "kind",
                serde_json::to_value(kind).unwrap_or_default(),
            ));
        }
        predicates
    }
}

/// Aggregated view over a user's journal entries for one program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingSummary {
    pub total_entries: usize,
    pub total_duration_minutes: i64,
    pub entries_by_kind: BTreeMap<ProgressKind, usize>,
    pub last_recorded_at: Option<Timestamp>,
}

/// Repository for journal entries and rank-progress rows, backed by the
/// secondary store.
pub struct ProgressRepository {
    entries: RepositoryCore<ProgressEntry>,
    ranks: RepositoryCore<RankProgress>,
}

impl ProgressRepository {
    pub fn new(
        store: Arc<dyn RemoteStoreClient>,
        hub: &ChangeHub,
        config: &EngineConfig,
    ) -> Self {
        Self {
            entries: RepositoryCore::new(
                Arc::clone(&store),
                hub.progress.clone(),
                config.list_page_size,
            ),
            ranks: RepositoryCore::new(store, hub.rank_progress.clone(), config.list_page_size),
        }
    }

    /// Append a journal entry. Entries are immutable once written.
    #[instrument(skip(self, entry), fields(user_id = %entry.user_id, kind = ?entry.kind))]
    pub async fn record(&self, entry: ProgressEntry) -> EngineResult<ProgressEntry> {
        if entry.duration_minutes.is_some_and(|d| d < 0) {
            return Err(EngineError::Validation {
                field: "duration_minutes".into(),
                reason: "must not be negative".into(),
            });
        }
        self.entries.write(&entry).await?;
        self.entries.notifier().created(entry.clone());
        Ok(entry)
    }

    /// The consumer API names this an update, but entries are never
    /// mutated in place: the amended value is inserted as a new record
    /// with a fresh id and timestamp, keeping the journal append-only.
    pub async fn amend(&self, entry: &ProgressEntry) -> EngineResult<ProgressEntry> {
        let mut amended = entry.clone();
        amended.entry_id = kata_core::new_entity_id();
        amended.recorded_at = chrono::Utc::now();
        self.record(amended).await
    }

    /// Read-through get by entry id.
    pub async fn get_entry(&self, id: kata_core::EntryId) -> EngineResult<Option<ProgressEntry>> {
        self.entries.get_by_id(id).await
    }

    /// Journal entries matching the filter, most recent first.
    pub async fn list_entries(&self, filter: &ProgressFilter) -> EngineResult<Vec<ProgressEntry>> {
        self.entries
            .query_entities(
                &filter.predicates(),
                Some(&OrderBy::desc("recorded_at")),
                filter.limit,
            )
            .await
    }

    /// Merge-write the rank-progress row for (user, program, rank).
    ///
    /// Only the fields present in `update` reach the store, so concurrent
    /// partial updates are additive by field rather than whole-record
    /// replacement. Creates the row when none exists.
    #[instrument(skip(self, update))]
    pub async fn upsert_rank_progress(
        &self,
        user_id: UserId,
        program_id: ProgramId,
        rank_id: RankId,
        update: &RankProgressUpdate,
    ) -> EngineResult<RankProgress> {
        match self.lookup_rank_progress(user_id, program_id, rank_id).await? {
            Some(mut row) => {
                row.apply(update);
                let fields = partial_fields(update, row.updated_at)?;
                self.ranks
                    .merge_write(row.rank_progress_id, fields, &row)
                    .await?;
                self.ranks.notifier().updated(row.clone());
                Ok(row)
            }
            None => {
                let mut row = RankProgress::new(user_id, program_id, rank_id);
                row.apply(update);
                self.ranks.write(&row).await?;
                self.ranks.notifier().created(row.clone());
                debug!(rank_progress_id = %row.rank_progress_id, "rank progress row created");
                Ok(row)
            }
        }
    }

    /// The rank-progress row for a (user, program, rank) triple, if any.
    pub async fn get_rank_progress(
        &self,
        user_id: UserId,
        program_id: ProgramId,
        rank_id: RankId,
    ) -> EngineResult<Option<RankProgress>> {
        self.lookup_rank_progress(user_id, program_id, rank_id).await
    }

    /// Aggregate a user's journal for one program.
    pub async fn training_summary(
        &self,
        user_id: UserId,
        program_id: ProgramId,
    ) -> EngineResult<TrainingSummary> {
        let entries = self
            .list_entries(&ProgressFilter::new().for_user(user_id).for_program(program_id))
            .await?;

        let mut summary = TrainingSummary {
            total_entries: entries.len(),
            ..TrainingSummary::default()
        };
        for entry in &entries {
            summary.total_duration_minutes += entry.duration_minutes.unwrap_or(0);
            *summary.entries_by_kind.entry(entry.kind).or_insert(0) += 1;
            if summary.last_recorded_at.is_none_or(|t| entry.recorded_at > t) {
                summary.last_recorded_at = Some(entry.recorded_at);
            }
        }
        Ok(summary)
    }

    /// Remove every journal entry for a program; cascade step of a
    /// program delete. Idempotent.
    pub async fn purge_entries_for_program(&self, program_id: ProgramId) -> EngineResult<usize> {
        let rows = self
            .entries
            .query_entities(
                &[Predicate::eq("program_id", program_id.to_string())],
                None,
                None,
            )
            .await?;
        let count = rows.len();
        for entry in rows {
            self.entries.delete(entry.entry_id).await?;
            self.entries.notifier().deleted(entry);
        }
        Ok(count)
    }

    /// Remove every rank-progress row for a program; cascade step of a
    /// program delete. Idempotent.
    pub async fn purge_rank_progress_for_program(
        &self,
        program_id: ProgramId,
    ) -> EngineResult<usize> {
        let rows = self
            .ranks
            .query_entities(
                &[Predicate::eq("program_id", program_id.to_string())],
                None,
                None,
            )
            .await?;
        let count = rows.len();
        for row in rows {
            self.ranks.delete(row.rank_progress_id).await?;
            self.ranks.notifier().deleted(row);
        }
        Ok(count)
    }

    async fn lookup_rank_progress(
        &self,
        user_id: UserId,
        program_id: ProgramId,
        rank_id: RankId,
    ) -> EngineResult<Option<RankProgress>> {
        let key = rank_progress_key(user_id, program_id, rank_id);
        if let Some(row) = self.ranks.cache().get_by_natural_key(&key) {
            return Ok(Some(row));
        }
        let rows = self
            .ranks
            .query_entities(
                &[
                    Predicate::eq("user_id", user_id.to_string()),
                    Predicate::eq("program_id", program_id.to_string()),
                    Predicate::eq("rank_id", rank_id.to_string()),
                ],
                None,
                Some(1),
            )
            .await?;
        Ok(rows.into_iter().next())
    }
}

/// Serialize only the fields carried by the update, plus identity and the
/// new timestamp, for the merge-write.
fn partial_fields(
    update: &RankProgressUpdate,
    updated_at: Timestamp,
) -> EngineResult<serde_json::Value> {
    let mut fields = Map::new();
    if let Some(completion) = update.completion {
        fields.insert("completion".into(), completion.clamp(0.0, 1.0).into());
    }
    if !update.item_completion.is_empty() {
        let items: Map<String, serde_json::Value> = update
            .item_completion
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clamp(0.0, 1.0))))
            .collect();
        fields.insert("item_completion".into(), items.into());
    }
    fields.insert(
        "updated_at".into(),
        serde_json::to_value(updated_at).map_err(|e| {
            store_call_error(kata_core::StoreError::Unknown {
                reason: format!("encode timestamp: {e}"),
            })
        })?,
    );
    Ok(serde_json::Value::Object(fields))
}
