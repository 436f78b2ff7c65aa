//! Consumer facade over the repositories and the reconciler.

use crate::{
    EnrollmentRepository, OnboardingHandoff, ProfileReconciler, ProgramRepository,
    ProgressRepository,
};
use kata_core::{
    CompositeProfile, EngineConfig, EngineError, EngineResult, Enrollment, EntityKind, Program,
    ProgramId, ProgressEntry, RankId, RankProgress, SessionIdentity, SessionPhase, UserId,
};
use kata_events::{ChangeHub, ChangeStream};
use kata_store::RemoteStoreClient;
use std::sync::Arc;

/// The engine's consumer surface: plain data records in, plain data
/// records out, plus per-kind change streams.
///
/// Construct one per process at startup, handing it the two store clients
/// and the onboarding collaborator. All state flows through the injected
/// dependencies; nothing here is global.
pub struct JournalEngine {
    programs: Arc<ProgramRepository>,
    enrollments: Arc<EnrollmentRepository>,
    progress: Arc<ProgressRepository>,
    reconciler: ProfileReconciler,
    hub: ChangeHub,
}

impl JournalEngine {
    pub fn new(
        primary: Arc<dyn RemoteStoreClient>,
        secondary: Arc<dyn RemoteStoreClient>,
        onboarding: Arc<dyn OnboardingHandoff>,
        config: EngineConfig,
    ) -> Self {
        let hub = ChangeHub::new(config.notifier_capacity);
        let enrollments = Arc::new(EnrollmentRepository::new(
            Arc::clone(&secondary),
            &hub,
            &config,
        ));
        let progress = Arc::new(ProgressRepository::new(
            Arc::clone(&secondary),
            &hub,
            &config,
        ));
        let programs = Arc::new(ProgramRepository::new(
            Arc::clone(&secondary),
            &hub,
            &config,
            Arc::clone(&enrollments),
            Arc::clone(&progress),
        ));
        let reconciler = ProfileReconciler::new(
            primary,
            secondary,
            Arc::clone(&enrollments),
            onboarding,
            config,
        );
        Self {
            programs,
            enrollments,
            progress,
            reconciler,
            hub,
        }
    }

    /// Load the composite profile for the session.
    pub async fn load(&self, identity: &SessionIdentity) -> EngineResult<CompositeProfile> {
        self.reconciler.load(identity).await
    }

    /// Re-reconcile after a mutation that may have changed secondary-store
    /// state (enrollment, subscription purchase, ...).
    pub async fn refresh(&self) -> EngineResult<CompositeProfile> {
        self.reconciler.refresh().await
    }

    pub async fn session_phase(&self) -> SessionPhase {
        self.reconciler.phase().await
    }

    pub async fn get_program(&self, id: ProgramId) -> EngineResult<Option<Program>> {
        self.programs.get_by_id(id).await
    }

    pub async fn get_enrollment(
        &self,
        user_id: UserId,
        program_id: ProgramId,
    ) -> EngineResult<Option<Enrollment>> {
        self.enrollments.get_by_user_and_program(user_id, program_id).await
    }

    /// Enroll a user in a program by id: the program fetch is sequenced
    /// before the enrollment write, which validates against it.
    pub async fn enroll(
        &self,
        user_id: UserId,
        program_id: ProgramId,
        rank_id: Option<RankId>,
    ) -> EngineResult<Enrollment> {
        let program = self
            .programs
            .get_by_id(program_id)
            .await?
            .ok_or(EngineError::NotFound {
                kind: EntityKind::Program,
                id: program_id,
            })?;
        self.enrollments.enroll(user_id, &program, rank_id).await
    }

    pub async fn record_progress(&self, entry: ProgressEntry) -> EngineResult<ProgressEntry> {
        self.progress.record(entry).await
    }

    pub fn subscribe_program_changes(&self) -> ChangeStream<Program> {
        self.hub.programs.subscribe()
    }

    pub fn subscribe_enrollment_changes(&self) -> ChangeStream<Enrollment> {
        self.hub.enrollments.subscribe()
    }

    pub fn subscribe_progress_changes(&self) -> ChangeStream<ProgressEntry> {
        self.hub.progress.subscribe()
    }

    pub fn subscribe_rank_progress_changes(&self) -> ChangeStream<RankProgress> {
        self.hub.rank_progress.subscribe()
    }

    /// Direct access for call sites that need the full repository surface.
    pub fn programs(&self) -> &ProgramRepository {
        &self.programs
    }

    pub fn enrollments(&self) -> &EnrollmentRepository {
        &self.enrollments
    }

    pub fn progress(&self) -> &ProgressRepository {
        &self.progress
    }
}
