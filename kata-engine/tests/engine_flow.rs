//! End-to-end flows through the `JournalEngine` facade.

use async_trait::async_trait;
use kata_core::{
    new_entity_id, EngineConfig, EngineResult, ProgressEntry, ProgressKind, RankProgressUpdate,
    SessionIdentity, SessionPhase, StoreError,
};
use kata_engine::{JournalEngine, OnboardingHandoff, ProgramFilter};
use kata_events::ChangeKind;
use kata_store::{collections, InMemoryRemoteStore, RemoteStoreClient};
use kata_test_utils::{active_subscription, karate_program, profile, seed};
use std::sync::Arc;
use std::time::Duration;

struct NoopOnboarding;

#[async_trait]
impl OnboardingHandoff for NoopOnboarding {
    async fn begin_onboarding(&self, _identity: &SessionIdentity) -> EngineResult<()> {
        Ok(())
    }
}

struct World {
    primary: Arc<InMemoryRemoteStore>,
    secondary: Arc<InMemoryRemoteStore>,
    engine: JournalEngine,
}

fn world() -> World {
    let primary = Arc::new(InMemoryRemoteStore::new());
    let secondary = Arc::new(InMemoryRemoteStore::new());
    let engine = JournalEngine::new(
        Arc::clone(&primary) as Arc<dyn RemoteStoreClient>,
        Arc::clone(&secondary) as Arc<dyn RemoteStoreClient>,
        Arc::new(NoopOnboarding),
        EngineConfig::new()
            .with_profile_poll_attempts(1)
            .with_profile_poll_backoff(Duration::from_millis(5)),
    );
    World {
        primary,
        secondary,
        engine,
    }
}

#[tokio::test]
async fn full_session_journey() {
    let w = world();

    // A student profile exists in the primary store, with a subscription
    // in the secondary store.
    let student = profile("Aiko Tanaka", "auth-aiko");
    let user_id = student.profile_id;
    seed(&w.primary, &student).await;
    seed(&w.secondary, &active_subscription(user_id)).await;

    // An instructor sets up the curriculum.
    let program = w.engine.programs().create(karate_program()).await.unwrap();

    // The session loads: subscription present, nothing enrolled yet.
    let composite = w
        .engine
        .load(&SessionIdentity::from_auth("auth-aiko"))
        .await
        .unwrap();
    assert!(composite.subscription.is_some());
    assert!(composite.enrollments.is_empty());
    assert!(!composite.partially_stale);

    // Enroll through the facade; the program fetch is sequenced first.
    let enrollment = w
        .engine
        .enroll(user_id, program.program_id, None)
        .await
        .unwrap();
    assert_eq!(enrollment.current_rank_id, Some(program.ranks[0].rank_id));

    // A refresh folds the new enrollment into the composite and backfills
    // the studio membership from it.
    let composite = w.engine.refresh().await.unwrap();
    assert!(composite.is_enrolled(program.program_id));
    let membership = composite.membership.expect("membership backfilled");
    assert_eq!(membership.program_ids, vec![program.program_id]);
    assert_eq!(w.engine.session_phase().await, SessionPhase::Ready);

    // Journal a session and some rank progress.
    w.engine
        .record_progress(
            ProgressEntry::new(user_id, program.program_id, ProgressKind::SessionLog)
                .with_duration(60),
        )
        .await
        .unwrap();
    w.engine
        .progress()
        .upsert_rank_progress(
            user_id,
            program.program_id,
            program.ranks[0].rank_id,
            &RankProgressUpdate::default()
                .with_completion(0.5)
                .with_item("heian shodan", 1.0),
        )
        .await
        .unwrap();

    let summary = w
        .engine
        .progress()
        .training_summary(user_id, program.program_id)
        .await
        .unwrap();
    assert_eq!(summary.total_entries, 1);
    assert_eq!(summary.total_duration_minutes, 60);

    // Advance to the next rank along the ladder.
    let next = w
        .engine
        .programs()
        .next_rank(program.program_id, program.ranks[0].rank_id)
        .await
        .unwrap()
        .unwrap();
    let advanced = w
        .engine
        .enrollments()
        .advance_rank(user_id, &program, next.rank_id)
        .await
        .unwrap();
    assert_eq!(advanced.current_rank_id, Some(next.rank_id));

    let read = w
        .engine
        .get_enrollment(user_id, program.program_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, advanced);
}

#[tokio::test]
async fn change_streams_fan_out_through_facade() {
    let w = world();
    let mut enrollments_a = w.engine.subscribe_enrollment_changes();
    let mut enrollments_b = w.engine.subscribe_enrollment_changes();
    let mut progress_stream = w.engine.subscribe_progress_changes();

    let program = w.engine.programs().create(karate_program()).await.unwrap();
    let user_id = new_entity_id();
    let enrollment = w
        .engine
        .enroll(user_id, program.program_id, None)
        .await
        .unwrap();

    let a = enrollments_a.next().await.unwrap();
    let b = enrollments_b.next().await.unwrap();
    assert_eq!(a.kind, ChangeKind::Created);
    assert_eq!(a.entity, enrollment);
    assert_eq!(b.entity, enrollment);
    assert!(enrollments_a.try_next().is_none());
    assert!(enrollments_b.try_next().is_none());

    // Lists and reads never publish
    w.engine
        .enrollments()
        .list_for_user(user_id)
        .await
        .unwrap();
    assert!(enrollments_a.try_next().is_none());

    w.engine
        .record_progress(ProgressEntry::new(
            user_id,
            program.program_id,
            ProgressKind::Sparring,
        ))
        .await
        .unwrap();
    assert_eq!(
        progress_stream.next().await.unwrap().kind,
        ChangeKind::Created
    );
}

#[tokio::test]
async fn composite_survives_secondary_outage_between_refreshes() {
    let w = world();
    let student = profile("Kenji Sato", "auth-kenji");
    let user_id = student.profile_id;
    seed(&w.primary, &student).await;
    seed(&w.secondary, &active_subscription(user_id)).await;

    let program = w.engine.programs().create(karate_program()).await.unwrap();
    w.engine
        .enroll(user_id, program.program_id, None)
        .await
        .unwrap();

    let loaded = w
        .engine
        .load(&SessionIdentity::from_auth("auth-kenji"))
        .await
        .unwrap();
    assert!(loaded.membership.is_some());
    assert!(loaded.subscription.is_some());

    // The whole secondary store goes dark.
    for collection in [
        collections::ENROLLMENTS,
        collections::SUBSCRIPTIONS,
        collections::STUDIO_MEMBERSHIPS,
    ] {
        w.secondary.fail_collection(
            collection,
            StoreError::Unavailable {
                reason: "outage".into(),
            },
        );
    }

    let stale = w.engine.refresh().await.unwrap();
    assert!(stale.partially_stale);
    // Known-good fragments survive the outage unchanged
    assert_eq!(stale.membership, loaded.membership);
    assert_eq!(stale.subscription, loaded.subscription);
    assert_eq!(stale.enrollments, loaded.enrollments);

    w.secondary.clear_faults();
    let recovered = w.engine.refresh().await.unwrap();
    assert!(!recovered.partially_stale);
}

#[tokio::test]
async fn program_listing_and_search() {
    let w = world();
    w.engine.programs().create(karate_program()).await.unwrap();
    w.engine
        .programs()
        .create(kata_test_utils::small_program(
            "Judo",
            kata_core::ProgramCategory::Grappling,
        ))
        .await
        .unwrap();

    let found = w
        .engine
        .programs()
        .list(&ProgramFilter::new().with_name_contains("kara").active_only())
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Karate");

    let fetched = w
        .engine
        .get_program(found[0].program_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.name, "Karate");
}
