//! Configuration types

use std::time::Duration;

/// Tunables for the engine's repositories and reconciler.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many times to poll for a newly onboarded profile before
    /// surfacing not-found.
    pub profile_poll_attempts: u32,
    /// Fixed backoff between profile-creation polls.
    pub profile_poll_backoff: Duration,
    /// Page size for internally paginated list queries.
    pub list_page_size: usize,
    /// Per-subscriber buffer capacity of the change notifier.
    pub notifier_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile_poll_attempts: 3,
            profile_poll_backoff: Duration::from_secs(2),
            list_page_size: 50,
            notifier_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile_poll_attempts(mut self, attempts: u32) -> Self {
        self.profile_poll_attempts = attempts;
        self
    }

    pub fn with_profile_poll_backoff(mut self, backoff: Duration) -> Self {
        self.profile_poll_backoff = backoff;
        self
    }

    pub fn with_list_page_size(mut self, page_size: usize) -> Self {
        self.list_page_size = page_size;
        self
    }

    pub fn with_notifier_capacity(mut self, capacity: usize) -> Self {
        self.notifier_capacity = capacity;
        self
    }
}
