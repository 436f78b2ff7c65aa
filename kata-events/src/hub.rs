//! Per-kind notifier bundle shared across repositories.

use crate::ChangeNotifier;
use kata_core::{Enrollment, ProgressEntry, Program, RankProgress};

/// The one piece of cross-repository shared state: a notifier per entity
/// kind. Subscriber lists are synchronized internally by the channels,
/// independent of any entity cache lock.
pub struct ChangeHub {
    pub programs: ChangeNotifier<Program>,
    pub enrollments: ChangeNotifier<Enrollment>,
    pub progress: ChangeNotifier<ProgressEntry>,
    pub rank_progress: ChangeNotifier<RankProgress>,
}

impl ChangeHub {
    /// Create a hub whose per-subscriber buffers hold `capacity` changes.
    pub fn new(capacity: usize) -> Self {
        Self {
            programs: ChangeNotifier::new(capacity),
            enrollments: ChangeNotifier::new(capacity),
            progress: ChangeNotifier::new(capacity),
            rank_progress: ChangeNotifier::new(capacity),
        }
    }
}
