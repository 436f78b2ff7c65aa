//! Journal progress records

use crate::{EntryId, ProgramId, ProgressKind, RankId, Timestamp, UserId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Append-only journal event.
///
/// Immutable once written; analytics aggregate over these rows. Amendments
/// insert a new record rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub entry_id: EntryId,
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub session_id: Option<EntryId>,
    pub rank_id: Option<RankId>,
    pub form: Option<String>,
    pub technique: Option<String>,
    pub kind: ProgressKind,
    pub duration_minutes: Option<i64>,
    pub score: Option<f64>,
    pub notes: Option<String>,
    pub recorded_at: Timestamp,
}

impl ProgressEntry {
    pub fn new(user_id: UserId, program_id: ProgramId, kind: ProgressKind) -> Self {
        Self {
            entry_id: crate::new_entity_id(),
            user_id,
            program_id,
            session_id: None,
            rank_id: None,
            form: None,
            technique: None,
            kind,
            duration_minutes: None,
            score: None,
            notes: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_rank(mut self, rank_id: RankId) -> Self {
        self.rank_id = Some(rank_id);
        self
    }

    pub fn with_form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    pub fn with_technique(mut self, technique: impl Into<String>) -> Self {
        self.technique = Some(technique.into());
        self
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_session(mut self, session_id: EntryId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Per-rank completion state, one row per (user, program, rank).
///
/// Upserted with merge-writes: concurrent partial updates are additive by
/// field, never whole-record replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankProgress {
    pub rank_progress_id: EntryId,
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub rank_id: RankId,
    /// Overall completion fraction in [0, 1].
    pub completion: f64,
    /// Completion fraction per curriculum item name.
    pub item_completion: BTreeMap<String, f64>,
    pub updated_at: Timestamp,
}

impl RankProgress {
    pub fn new(user_id: UserId, program_id: ProgramId, rank_id: RankId) -> Self {
        Self {
            rank_progress_id: crate::new_entity_id(),
            user_id,
            program_id,
            rank_id,
            completion: 0.0,
            item_completion: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Composite key for upsert lookups.
    pub fn composite_key(&self) -> String {
        rank_progress_key(self.user_id, self.program_id, self.rank_id)
    }

    /// Apply a partial update: provided fields replace, item entries merge
    /// per key. Absent fields are untouched.
    pub fn apply(&mut self, update: &RankProgressUpdate) {
        if let Some(completion) = update.completion {
            self.completion = completion.clamp(0.0, 1.0);
        }
        for (item, fraction) in &update.item_completion {
            self.item_completion
                .insert(item.clone(), fraction.clamp(0.0, 1.0));
        }
        self.updated_at = Utc::now();
    }
}

/// Natural-key encoding for a (user, program, rank) triple.
pub fn rank_progress_key(user_id: UserId, program_id: ProgramId, rank_id: RankId) -> String {
    format!("{user_id}:{program_id}:{rank_id}")
}

/// Partial update for a rank-progress row. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankProgressUpdate {
    pub completion: Option<f64>,
    pub item_completion: BTreeMap<String, f64>,
}

impl RankProgressUpdate {
    pub fn with_completion(mut self, completion: f64) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn with_item(mut self, item: impl Into<String>, fraction: f64) -> Self {
        self.item_completion.insert(item.into(), fraction);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    #[test]
    fn test_apply_merges_items_without_erasing() {
        let mut rp = RankProgress::new(new_entity_id(), new_entity_id(), new_entity_id());
        rp.apply(
            &RankProgressUpdate::default()
                .with_completion(0.25)
                .with_item("heian shodan", 0.5),
        );
        rp.apply(&RankProgressUpdate::default().with_item("mae geri", 1.0));

        // First item survives the second partial update
        assert_eq!(rp.completion, 0.25);
        assert_eq!(rp.item_completion["heian shodan"], 0.5);
        assert_eq!(rp.item_completion["mae geri"], 1.0);
    }

    #[test]
    fn test_apply_clamps_fractions() {
        let mut rp = RankProgress::new(new_entity_id(), new_entity_id(), new_entity_id());
        rp.apply(
            &RankProgressUpdate::default()
                .with_completion(1.7)
                .with_item("kata", -0.3),
        );
        assert_eq!(rp.completion, 1.0);
        assert_eq!(rp.item_completion["kata"], 0.0);
    }
}
