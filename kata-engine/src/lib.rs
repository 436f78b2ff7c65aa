//! KATA Engine - Repositories and Profile Reconciliation
//!
//! The business-logic layer over the two remote document stores: typed
//! repositories with entity-level invariants, and the reconciler that
//! merges per-store profile fragments into one composite per session.
//!
//! Construction is explicit dependency injection: build the store clients,
//! the hub, the repositories, and the reconciler once at process start and
//! pass references down. There are no global singletons.

mod engine;
mod enrollment_repo;
mod lock;
mod program_repo;
mod progress_repo;
mod reconciler;
mod repository;

pub use engine::JournalEngine;
pub use enrollment_repo::EnrollmentRepository;
pub use program_repo::{ProgramFilter, ProgramRepository};
pub use progress_repo::{ProgressFilter, ProgressRepository, TrainingSummary};
pub use reconciler::{OnboardingHandoff, ProfileReconciler};
