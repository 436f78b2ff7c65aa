//! Profile fragments and the reconciled composite

use crate::{
    AccessLevel, Enrollment, EntityId, MembershipStanding, ProfileId, ProgramId, Role,
    SubscriptionPlan, SubscriptionStatus, Timestamp, UserId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary-store profile record. Authoritative for identity, roles, and
/// access level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreProfile {
    pub profile_id: ProfileId,
    /// External auth-provider id; legacy records may lack one.
    pub auth_id: Option<String>,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub access: AccessLevel,
    /// Programs the user participates in; scopes secondary-store fetches.
    pub program_ids: Vec<ProgramId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StoreProfile {
    pub fn new(display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            profile_id: crate::new_entity_id(),
            auth_id: None,
            display_name: display_name.into(),
            roles: vec![Role::Student],
            access: AccessLevel::Basic,
            program_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_auth_id(mut self, auth_id: impl Into<String>) -> Self {
        self.auth_id = Some(auth_id.into());
        self
    }

    pub fn with_programs(mut self, program_ids: Vec<ProgramId>) -> Self {
        self.program_ids = program_ids;
        self
    }
}

/// Secondary-store subscription fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: EntityId,
    pub user_id: UserId,
    pub plan: SubscriptionPlan,
    pub status: SubscriptionStatus,
    pub started_at: Timestamp,
    pub renews_at: Option<Timestamp>,
}

/// Secondary-store studio membership fragment.
///
/// Legacy accounts may predate this entity; the reconciler backfills it
/// from enrollment data (write-on-read).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudioMembership {
    pub membership_id: EntityId,
    pub user_id: UserId,
    pub program_ids: Vec<ProgramId>,
    pub joined_at: Timestamp,
    pub standing: MembershipStanding,
    pub updated_at: Timestamp,
}

impl StudioMembership {
    /// Derive a membership from enrollment records.
    ///
    /// Returns `None` when no enrollment is currently enrolled; membership
    /// metadata comes from the enrolled records (earliest enrollment date,
    /// covered programs).
    pub fn from_enrollments(user_id: UserId, enrollments: &[Enrollment]) -> Option<Self> {
        let enrolled: Vec<&Enrollment> = enrollments.iter().filter(|e| e.enrolled).collect();
        let joined_at = enrolled.iter().map(|e| e.enrolled_at).min()?;
        Some(Self {
            membership_id: crate::new_entity_id(),
            user_id,
            program_ids: enrolled.iter().map(|e| e.program_id).collect(),
            joined_at,
            standing: MembershipStanding::Good,
            updated_at: Utc::now(),
        })
    }
}

/// The merged read-model for one user session.
///
/// Identity fields come from the primary store; program, subscription, and
/// membership fields are overlaid from the secondary store. Recomputed on
/// each reconciliation pass; a denormalized copy may be cached in the
/// primary store for offline reads, but the composite itself is never the
/// source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeProfile {
    pub profile_id: ProfileId,
    pub auth_id: Option<String>,
    pub display_name: String,
    pub roles: Vec<Role>,
    pub access: AccessLevel,
    pub enrollments: BTreeMap<ProgramId, Enrollment>,
    pub subscription: Option<Subscription>,
    pub membership: Option<StudioMembership>,
    /// True when a secondary fetch failed and fragments may be outdated.
    pub partially_stale: bool,
    pub reconciled_at: Timestamp,
}

impl CompositeProfile {
    /// Start a composite from the primary profile alone.
    pub fn from_profile(profile: &StoreProfile) -> Self {
        Self {
            profile_id: profile.profile_id,
            auth_id: profile.auth_id.clone(),
            display_name: profile.display_name.clone(),
            roles: profile.roles.clone(),
            access: profile.access,
            enrollments: BTreeMap::new(),
            subscription: None,
            membership: None,
            partially_stale: false,
            reconciled_at: Utc::now(),
        }
    }

    /// Refresh the identity fields from a newly fetched primary profile.
    pub fn apply_identity(&mut self, profile: &StoreProfile) {
        self.profile_id = profile.profile_id;
        self.auth_id = profile.auth_id.clone();
        self.display_name = profile.display_name.clone();
        self.roles = profile.roles.clone();
        self.access = profile.access;
    }

    /// Overlay enrollment records. An empty fetch result does not erase a
    /// previously-known map; a transient secondary failure must not
    /// visibly drop known-good data.
    pub fn overlay_enrollments(&mut self, enrollments: Vec<Enrollment>) {
        if enrollments.is_empty() {
            return;
        }
        self.enrollments = enrollments
            .into_iter()
            .map(|e| (e.program_id, e))
            .collect();
    }

    /// Overlay the subscription fragment; `None` leaves the prior value.
    pub fn overlay_subscription(&mut self, subscription: Option<Subscription>) {
        if let Some(subscription) = subscription {
            self.subscription = Some(subscription);
        }
    }

    /// Overlay the membership fragment; `None` leaves the prior value.
    pub fn overlay_membership(&mut self, membership: Option<StudioMembership>) {
        if let Some(membership) = membership {
            self.membership = Some(membership);
        }
    }

    /// Whether the user holds an enrolled record for the program.
    pub fn is_enrolled(&self, program_id: ProgramId) -> bool {
        self.enrollments
            .get(&program_id)
            .map(|e| e.enrolled)
            .unwrap_or(false)
    }
}

/// Identity handed to the reconciler by the session layer.
///
/// Lookup tries the external auth id first, then falls back to a direct
/// profile-id get for legacy records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub auth_id: Option<String>,
    pub profile_id: Option<ProfileId>,
}

impl SessionIdentity {
    pub fn from_auth(auth_id: impl Into<String>) -> Self {
        Self {
            auth_id: Some(auth_id.into()),
            profile_id: None,
        }
    }

    pub fn from_profile_id(profile_id: ProfileId) -> Self {
        Self {
            auth_id: None,
            profile_id: Some(profile_id),
        }
    }

    pub fn with_profile_id(mut self, profile_id: ProfileId) -> Self {
        self.profile_id = Some(profile_id);
        self
    }
}

/// Reconciler state machine per user session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    Ready,
    Refreshing,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    #[test]
    fn test_overlay_empty_enrollments_keeps_previous() {
        let profile = StoreProfile::new("Aiko");
        let mut composite = CompositeProfile::from_profile(&profile);
        let enrollment = Enrollment::new(new_entity_id(), new_entity_id());
        let program_id = enrollment.program_id;
        composite.overlay_enrollments(vec![enrollment]);

        composite.overlay_enrollments(Vec::new());
        assert!(composite.enrollments.contains_key(&program_id));
    }

    #[test]
    fn test_overlay_none_subscription_keeps_previous() {
        let profile = StoreProfile::new("Aiko");
        let mut composite = CompositeProfile::from_profile(&profile);
        composite.subscription = Some(Subscription {
            subscription_id: new_entity_id(),
            user_id: profile.profile_id,
            plan: SubscriptionPlan::Annual,
            status: SubscriptionStatus::Active,
            started_at: Utc::now(),
            renews_at: None,
        });

        composite.overlay_subscription(None);
        assert!(composite.subscription.is_some());
    }

    #[test]
    fn test_membership_derivation_skips_unenrolled() {
        let user_id = new_entity_id();
        let enrolled = Enrollment::new(user_id, new_entity_id());
        let mut lapsed = Enrollment::new(user_id, new_entity_id());
        lapsed.enrolled = false;

        let membership =
            StudioMembership::from_enrollments(user_id, &[enrolled.clone(), lapsed.clone()])
                .unwrap();
        assert_eq!(membership.program_ids, vec![enrolled.program_id]);
        assert_eq!(membership.joined_at, enrolled.enrolled_at);

        assert!(StudioMembership::from_enrollments(user_id, &[lapsed]).is_none());
    }

    #[test]
    fn test_is_enrolled_reflects_flag() {
        let profile = StoreProfile::new("Kenji");
        let mut composite = CompositeProfile::from_profile(&profile);
        let mut enrollment = Enrollment::new(new_entity_id(), new_entity_id());
        let program_id = enrollment.program_id;
        enrollment.enrolled = false;
        composite.overlay_enrollments(vec![enrollment]);

        assert!(!composite.is_enrolled(program_id));
    }
}
