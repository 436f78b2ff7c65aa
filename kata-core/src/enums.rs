//! Shared enums for KATA entities

use serde::{Deserialize, Serialize};

/// Entity kind discriminator for errors, caches, and change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Program,
    Enrollment,
    ProgressEntry,
    RankProgress,
    Profile,
    Subscription,
    StudioMembership,
    CompositeProfile,
}

impl EntityKind {
    /// Stable lowercase name, used for log fields and cascade reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Program => "program",
            EntityKind::Enrollment => "enrollment",
            EntityKind::ProgressEntry => "progress_entry",
            EntityKind::RankProgress => "rank_progress",
            EntityKind::Profile => "profile",
            EntityKind::Subscription => "subscription",
            EntityKind::StudioMembership => "studio_membership",
            EntityKind::CompositeProfile => "composite_profile",
        }
    }
}

/// Discipline category of a training program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgramCategory {
    Striking,
    Grappling,
    Weapons,
    Hybrid,
    Conditioning,
}

/// Kind of a curriculum item required for a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurriculumKind {
    Form,
    Technique,
    Drill,
    Sparring,
}

/// Progress-type tag on an append-only journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProgressKind {
    /// Full training session log.
    SessionLog,
    /// Practice of a specific form.
    FormPractice,
    /// Drilling a specific technique.
    TechniqueDrill,
    /// Sparring round(s).
    Sparring,
    /// Rank examination attempt.
    Grading,
}

/// Role carried by a primary-store profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

/// Access level derived from subscription and roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    Basic,
    Premium,
    Staff,
}

/// Subscription plan in the secondary store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionPlan {
    Monthly,
    Annual,
    Lifetime,
}

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    /// Whether this status grants access right now.
    pub fn grants_access(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }
}

/// Standing of a studio membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MembershipStanding {
    Good,
    Lapsed,
    Suspended,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_names_are_stable() {
        assert_eq!(EntityKind::Program.as_str(), "program");
        assert_eq!(EntityKind::RankProgress.as_str(), "rank_progress");
        assert_eq!(EntityKind::StudioMembership.as_str(), "studio_membership");
    }

    #[test]
    fn test_subscription_access() {
        assert!(SubscriptionStatus::Active.grants_access());
        assert!(SubscriptionStatus::Trial.grants_access());
        assert!(!SubscriptionStatus::Expired.grants_access());
        assert!(!SubscriptionStatus::Cancelled.grants_access());
    }
}
