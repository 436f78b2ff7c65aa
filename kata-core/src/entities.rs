//! Program, rank, and enrollment entity structures

use crate::{
    CurriculumKind, EngineError, EnrollmentId, ProgramCategory, ProgramId, RankId, Timestamp,
    UserId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single curriculum requirement attached to a rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumItem {
    pub name: String,
    pub kind: CurriculumKind,
}

impl CurriculumItem {
    pub fn new(name: impl Into<String>, kind: CurriculumKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A rank within a program's progression ladder.
///
/// Ordinal positions are unique within a program and define the total order
/// used for next-rank lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rank {
    pub rank_id: RankId,
    pub name: String,
    /// Position in the progression order; unique within the program.
    pub ordinal: i32,
    pub color: Option<String>,
    pub curriculum: Vec<CurriculumItem>,
}

impl Rank {
    pub fn new(name: impl Into<String>, ordinal: i32) -> Self {
        Self {
            rank_id: crate::new_entity_id(),
            name: name.into(),
            ordinal,
            color: None,
            curriculum: Vec::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_curriculum(mut self, items: Vec<CurriculumItem>) -> Self {
        self.curriculum = items;
        self
    }
}

/// A training program (curriculum) with an ordered rank ladder.
///
/// Name uniqueness among active programs is checked at creation time by the
/// repository, not enforced by the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub program_id: ProgramId,
    pub name: String,
    pub description: Option<String>,
    pub category: ProgramCategory,
    pub ranks: Vec<Rank>,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Program {
    /// Create a new active program with server timestamps.
    pub fn new(name: impl Into<String>, category: ProgramCategory) -> Self {
        let now = Utc::now();
        Self {
            program_id: crate::new_entity_id(),
            name: name.into(),
            description: None,
            category,
            ranks: Vec::new(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_ranks(mut self, ranks: Vec<Rank>) -> Self {
        self.ranks = ranks;
        self
    }

    /// Look up a rank by id.
    pub fn rank_for(&self, rank_id: RankId) -> Option<&Rank> {
        self.ranks.iter().find(|r| r.rank_id == rank_id)
    }

    /// The rank following `rank_id` in ordinal order.
    ///
    /// Returns `None` when `rank_id` is the highest-ordinal rank (not an
    /// error), or when `rank_id` does not belong to this program.
    pub fn next_rank(&self, rank_id: RankId) -> Option<&Rank> {
        let current = self.rank_for(rank_id)?;
        self.ranks
            .iter()
            .filter(|r| r.ordinal > current.ordinal)
            .min_by_key(|r| r.ordinal)
    }

    /// The lowest-ordinal rank, assigned on enrollment.
    pub fn entry_rank(&self) -> Option<&Rank> {
        self.ranks.iter().min_by_key(|r| r.ordinal)
    }

    /// Check local invariants: non-empty name, unique rank ordinals.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation {
                field: "name".into(),
                reason: "must not be empty".into(),
            });
        }
        let mut ordinals: Vec<i32> = self.ranks.iter().map(|r| r.ordinal).collect();
        ordinals.sort_unstable();
        ordinals.dedup();
        if ordinals.len() != self.ranks.len() {
            return Err(EngineError::Validation {
                field: "ranks".into(),
                reason: "rank ordinals must be unique within a program".into(),
            });
        }
        Ok(())
    }
}

/// A user's enrollment in a program.
///
/// At most one *enrolled* record exists per (user, program) pair; the
/// repository enforces this by query-before-write under a per-pair lock.
/// Never hard-deleted except by explicit administrative delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub enrollment_id: EnrollmentId,
    pub user_id: UserId,
    pub program_id: ProgramId,
    pub enrolled: bool,
    pub enrolled_at: Timestamp,
    /// Must reference a rank that exists in the program at assignment time.
    pub current_rank_id: Option<RankId>,
    pub rank_changed_at: Option<Timestamp>,
    pub active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Enrollment {
    pub fn new(user_id: UserId, program_id: ProgramId) -> Self {
        let now = Utc::now();
        Self {
            enrollment_id: crate::new_entity_id(),
            user_id,
            program_id,
            enrolled: true,
            enrolled_at: now,
            current_rank_id: None,
            rank_changed_at: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rank(mut self, rank_id: RankId) -> Self {
        self.current_rank_id = Some(rank_id);
        self.rank_changed_at = Some(self.enrolled_at);
        self
    }

    /// Composite key for the (user, program) pair.
    pub fn pair_key(&self) -> String {
        enrollment_key(self.user_id, self.program_id)
    }
}

/// Natural-key encoding for a (user, program) pair.
pub fn enrollment_key(user_id: UserId, program_id: ProgramId) -> String {
    format!("{user_id}:{program_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder() -> Program {
        Program::new("Judo", ProgramCategory::Grappling).with_ranks(vec![
            Rank::new("White", 0).with_color("#ffffff"),
            Rank::new("Yellow", 1).with_color("#ffd500"),
            Rank::new("Orange", 2),
            Rank::new("Green", 3),
        ])
    }

    #[test]
    fn test_next_rank_follows_ordinal_order() {
        let program = ladder();
        let yellow = program.ranks[1].rank_id;
        let next = program.next_rank(yellow).unwrap();
        assert_eq!(next.ordinal, 2);
        assert_eq!(next.name, "Orange");
    }

    #[test]
    fn test_next_rank_at_top_is_none() {
        let program = ladder();
        let green = program.ranks[3].rank_id;
        assert!(program.next_rank(green).is_none());
    }

    #[test]
    fn test_next_rank_unknown_rank_is_none() {
        let program = ladder();
        assert!(program.next_rank(crate::new_entity_id()).is_none());
    }

    #[test]
    fn test_entry_rank_is_lowest_ordinal() {
        // Out-of-order vector still resolves by ordinal
        let program = Program::new("Kali", ProgramCategory::Weapons)
            .with_ranks(vec![Rank::new("Advanced", 2), Rank::new("Beginner", 0)]);
        assert_eq!(program.entry_rank().unwrap().name, "Beginner");
    }

    #[test]
    fn test_validate_rejects_duplicate_ordinals() {
        let program = Program::new("Boxing", ProgramCategory::Striking)
            .with_ranks(vec![Rank::new("A", 1), Rank::new("B", 1)]);
        assert!(matches!(
            program.validate(),
            Err(EngineError::Validation { field, .. }) if field == "ranks"
        ));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let program = Program::new("  ", ProgramCategory::Hybrid);
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_enrollment_pair_key_is_stable() {
        let rank_id = crate::new_entity_id();
        let e = Enrollment::new(crate::new_entity_id(), crate::new_entity_id()).with_rank(rank_id);
        assert_eq!(e.pair_key(), enrollment_key(e.user_id, e.program_id));
        assert_eq!(e.current_rank_id, Some(rank_id));
        assert_eq!(e.rank_changed_at, Some(e.enrolled_at));
    }
}
