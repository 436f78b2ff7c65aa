//! Cross-store profile reconciliation.
//!
//! The reconciler owns no storage of its own. It orchestrates the primary
//! store (identity) and the secondary store (enrollments, subscription,
//! studio membership) to produce one composite profile per session, and
//! keeps it current across refreshes.
//!
//! Failure policy: a primary-store failure is fatal to `load`. Secondary
//! failures are non-fatal; the reconciler proceeds with whatever it has
//! and marks the composite partially stale, retaining previously-known
//! fragments so a transient outage never visibly erases good data.

use crate::repository::store_call_error;
use crate::EnrollmentRepository;
use async_trait::async_trait;
use chrono::Utc;
use kata_core::{
    CompositeProfile, EngineConfig, EngineError, EngineResult, Enrollment, EntityKind,
    SessionIdentity, SessionPhase, StoreProfile, StudioMembership, Subscription, UserId,
};
use kata_store::{collections, Predicate, RemoteStoreClient, StoredEntity};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// External onboarding collaborator.
///
/// Invoked when `load` finds no primary profile. Given a session identity
/// it eventually produces a primary-store profile record; the reconciler
/// polls for the result rather than being called back.
#[async_trait]
pub trait OnboardingHandoff: Send + Sync {
    async fn begin_onboarding(&self, identity: &SessionIdentity) -> EngineResult<()>;
}

struct SessionState {
    phase: SessionPhase,
    profile: Option<StoreProfile>,
    composite: Option<CompositeProfile>,
}

/// Produces and keeps current a `CompositeProfile` for one user session.
pub struct ProfileReconciler {
    primary: Arc<dyn RemoteStoreClient>,
    secondary: Arc<dyn RemoteStoreClient>,
    enrollments: Arc<EnrollmentRepository>,
    onboarding: Arc<dyn OnboardingHandoff>,
    config: EngineConfig,
    state: RwLock<SessionState>,
}

impl ProfileReconciler {
    pub fn new(
        primary: Arc<dyn RemoteStoreClient>,
        secondary: Arc<dyn RemoteStoreClient>,
        enrollments: Arc<EnrollmentRepository>,
        onboarding: Arc<dyn OnboardingHandoff>,
        config: EngineConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            enrollments,
            onboarding,
            config,
            state: RwLock::new(SessionState {
                phase: SessionPhase::Uninitialized,
                profile: None,
                composite: None,
            }),
        }
    }

    /// Current phase of the session state machine.
    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    /// The most recently reconciled composite, if any.
    pub async fn composite(&self) -> Option<CompositeProfile> {
        self.state.read().await.composite.clone()
    }

    /// Load the composite profile for a session identity.
    ///
    /// Resolves the primary profile (auth-id query first, direct id get
    /// for legacy records), delegating to onboarding and polling with a
    /// fixed backoff when none exists yet, then reconciles the secondary
    /// fragments into the composite.
    #[instrument(skip(self, identity))]
    pub async fn load(&self, identity: &SessionIdentity) -> EngineResult<CompositeProfile> {
        self.state.write().await.phase = SessionPhase::Loading;

        let profile = match self.resolve_profile(identity).await {
            Ok(profile) => profile,
            Err(err) => {
                self.state.write().await.phase = SessionPhase::Failed;
                return Err(err);
            }
        };

        let composite = self.reconcile(&profile).await;

        let mut state = self.state.write().await;
        state.profile = Some(profile);
        state.composite = Some(composite.clone());
        state.phase = SessionPhase::Ready;
        Ok(composite)
    }

    /// Re-run reconciliation without re-deriving identity. Idempotent:
    /// with no underlying change the same composite comes back. Used
    /// after mutations that may have changed secondary-store state.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> EngineResult<CompositeProfile> {
        let profile = {
            let mut state = self.state.write().await;
            let Some(profile) = state.profile.clone() else {
                return Err(EngineError::Validation {
                    field: "session".into(),
                    reason: "refresh called before a successful load".into(),
                });
            };
            state.phase = SessionPhase::Refreshing;
            profile
        };

        let composite = self.reconcile(&profile).await;

        let mut state = self.state.write().await;
        state.composite = Some(composite.clone());
        state.phase = SessionPhase::Ready;
        Ok(composite)
    }

    /// Two-strategy primary lookup: external auth id first, then direct
    /// id for legacy records. First success wins.
    async fn lookup_profile(
        &self,
        identity: &SessionIdentity,
    ) -> EngineResult<Option<StoreProfile>> {
        if let Some(auth_id) = &identity.auth_id {
            let docs = self
                .primary
                .query(
                    collections::PROFILES,
                    &[Predicate::eq("auth_id", auth_id.clone())],
                    None,
                    Some(1),
                )
                .await
                .map_err(store_call_error)?;
            if let Some(doc) = docs.first() {
                return Ok(Some(StoreProfile::from_document(doc).map_err(store_call_error)?));
            }
        }

        if let Some(profile_id) = identity.profile_id {
            let doc = self
                .primary
                .get_document(collections::PROFILES, &profile_id.to_string())
                .await
                .map_err(store_call_error)?;
            if let Some(doc) = doc {
                return Ok(Some(StoreProfile::from_document(&doc).map_err(store_call_error)?));
            }
        }

        Ok(None)
    }

    async fn resolve_profile(&self, identity: &SessionIdentity) -> EngineResult<StoreProfile> {
        if let Some(profile) = self.lookup_profile(identity).await? {
            return Ok(profile);
        }

        debug!("no primary profile found, delegating to onboarding");
        self.onboarding.begin_onboarding(identity).await?;

        for attempt in 1..=self.config.profile_poll_attempts {
            sleep(self.config.profile_poll_backoff).await;
            if let Some(profile) = self.lookup_profile(identity).await? {
                debug!(attempt, "profile appeared after onboarding");
                return Ok(profile);
            }
        }

        warn!(
            attempts = self.config.profile_poll_attempts,
            "profile still missing after onboarding"
        );
        Err(EngineError::NotFound {
            kind: EntityKind::Profile,
            id: identity.profile_id.unwrap_or_else(Uuid::nil),
        })
    }

    /// Steps 3-6 of a load: parallel secondary fetches, membership
    /// backfill, non-erasing merge, and write-back of the denormalized
    /// composite.
    async fn reconcile(&self, profile: &StoreProfile) -> CompositeProfile {
        let user_id = profile.profile_id;

        // Independent fragments are fetched concurrently; only the profile
        // fetch had to come first, since these are scoped to it.
        let (enrollments, subscription, membership) = tokio::join!(
            self.enrollments.list_for_user(user_id),
            self.fetch_subscription(user_id),
            self.fetch_membership(user_id),
        );

        // Start from the previous composite so an absent fragment cannot
        // null out known-good data.
        let mut composite = {
            let state = self.state.read().await;
            state
                .composite
                .clone()
                .unwrap_or_else(|| CompositeProfile::from_profile(profile))
        };
        composite.apply_identity(profile);

        let mut stale = false;

        let enrollments = match enrollments {
            Ok(enrollments) => {
                composite.overlay_enrollments(enrollments.clone());
                Some(enrollments)
            }
            Err(err) => {
                warn!(%err, "enrollment fetch failed, keeping cached fragment");
                stale = true;
                None
            }
        };

        match subscription {
            Ok(subscription) => composite.overlay_subscription(subscription),
            Err(err) => {
                warn!(%err, "subscription fetch failed, keeping cached fragment");
                stale = true;
            }
        }

        match membership {
            Ok(Some(membership)) => composite.overlay_membership(Some(membership)),
            Ok(None) => {
                // Definitive absence: legacy accounts may predate the
                // membership entity, so synthesize one from enrollment
                // data. Never attempted on a transient fetch failure.
                if let Some(enrollments) = &enrollments {
                    let backfilled = self.backfill_membership(user_id, enrollments).await;
                    composite.overlay_membership(backfilled);
                }
            }
            Err(err) => {
                warn!(%err, "membership fetch failed, keeping cached fragment");
                stale = true;
            }
        }

        composite.partially_stale = stale;
        composite.reconciled_at = Utc::now();

        self.persist_composite(&composite).await;
        composite
    }

    /// The system's one write-on-read: derive a studio membership from
    /// enrolled records and persist it. Returns the created record, or
    /// `None` when there is nothing to derive or the write failed.
    async fn backfill_membership(
        &self,
        user_id: UserId,
        enrollments: &[Enrollment],
    ) -> Option<StudioMembership> {
        let membership = StudioMembership::from_enrollments(user_id, enrollments)?;
        let fields = match membership.to_fields() {
            Ok(fields) => fields,
            Err(err) => {
                warn!(%err, "membership encode failed, skipping backfill");
                return None;
            }
        };
        match self
            .secondary
            .set_document(
                collections::STUDIO_MEMBERSHIPS,
                &membership.membership_id.to_string(),
                fields,
                false,
            )
            .await
        {
            Ok(()) => {
                debug!(membership_id = %membership.membership_id, "studio membership backfilled");
                Some(membership)
            }
            Err(err) => {
                // The write is not cancelled or retried here; the next
                // reconciliation pass attempts the backfill again.
                warn!(%err, "membership backfill write failed");
                None
            }
        }
    }

    async fn fetch_subscription(&self, user_id: UserId) -> EngineResult<Option<Subscription>> {
        let docs = self
            .secondary
            .query(
                collections::SUBSCRIPTIONS,
                &[Predicate::eq("user_id", user_id.to_string())],
                None,
                Some(1),
            )
            .await
            .map_err(store_call_error)?;
        docs.first()
            .map(|doc| Subscription::from_document(doc).map_err(store_call_error))
            .transpose()
    }

    async fn fetch_membership(&self, user_id: UserId) -> EngineResult<Option<StudioMembership>> {
        let docs = self
            .secondary
            .query(
                collections::STUDIO_MEMBERSHIPS,
                &[Predicate::eq("user_id", user_id.to_string())],
                None,
                Some(1),
            )
            .await
            .map_err(store_call_error)?;
        docs.first()
            .map(|doc| StudioMembership::from_document(doc).map_err(store_call_error))
            .transpose()
    }

    /// Persist the merged composite back to the primary store as a
    /// denormalized cache for offline reads. Best-effort: the composite
    /// is a read-model, so a failed write-back only costs offline
    /// availability.
    async fn persist_composite(&self, composite: &CompositeProfile) {
        let fields = match serde_json::to_value(composite) {
            Ok(fields) => fields,
            Err(err) => {
                warn!(%err, "composite encode failed, skipping write-back");
                return;
            }
        };
        if let Err(err) = self
            .primary
            .set_document(
                collections::COMPOSITE_PROFILES,
                &composite.profile_id.to_string(),
                fields,
                false,
            )
            .await
        {
            warn!(%err, "composite write-back failed");
        }
    }
}
