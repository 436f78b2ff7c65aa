//! KATA Test Utilities
//!
//! Centralized test infrastructure for the KATA workspace: entity
//! fixtures and store seeding helpers shared by the crate test suites.

// Re-export the in-memory store from its source crate
pub use kata_store::InMemoryRemoteStore;

use kata_core::{
    CurriculumItem, CurriculumKind, Program, ProgramCategory, Rank, StoreProfile, Subscription,
    SubscriptionPlan, SubscriptionStatus, UserId,
};
use kata_store::StoredEntity;

/// A four-rank striking program with curriculum on each rank.
pub fn karate_program() -> Program {
    Program::new("Karate", ProgramCategory::Striking)
        .with_description("Shotokan curriculum")
        .with_ranks(vec![
            Rank::new("White", 0).with_curriculum(vec![
                CurriculumItem::new("heian shodan", CurriculumKind::Form),
                CurriculumItem::new("mae geri", CurriculumKind::Technique),
            ]),
            Rank::new("Yellow", 1).with_curriculum(vec![CurriculumItem::new(
                "heian nidan",
                CurriculumKind::Form,
            )]),
            Rank::new("Orange", 2),
            Rank::new("Green", 3).with_curriculum(vec![CurriculumItem::new(
                "jiyu kumite",
                CurriculumKind::Sparring,
            )]),
        ])
}

/// A minimal two-rank program under the given name.
pub fn small_program(name: &str, category: ProgramCategory) -> Program {
    Program::new(name, category).with_ranks(vec![Rank::new("Beginner", 0), Rank::new("Adept", 1)])
}

/// A profile with an auth id, for reconciler tests.
pub fn profile(display_name: &str, auth_id: &str) -> StoreProfile {
    StoreProfile::new(display_name).with_auth_id(auth_id)
}

/// An active annual subscription for the user.
pub fn active_subscription(user_id: UserId) -> Subscription {
    Subscription {
        subscription_id: kata_core::new_entity_id(),
        user_id,
        plan: SubscriptionPlan::Annual,
        status: SubscriptionStatus::Active,
        started_at: chrono::Utc::now(),
        renews_at: None,
    }
}

/// Write an entity straight into a store collection, bypassing the
/// repositories; used to arrange pre-existing remote state.
pub async fn seed<T: StoredEntity>(store: &InMemoryRemoteStore, entity: &T) {
    use kata_store::RemoteStoreClient;
    store
        .set_document(
            T::COLLECTION,
            &entity.entity_id().to_string(),
            entity.to_fields().expect("fixture entity serializes"),
            false,
        )
        .await
        .expect("seed write succeeds");
}
