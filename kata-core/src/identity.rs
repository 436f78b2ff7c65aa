//! Identity types for KATA entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a training program.
pub type ProgramId = EntityId;

/// Identifier of a rank within a program.
pub type RankId = EntityId;

/// Identifier of an enrollment record.
pub type EnrollmentId = EntityId;

/// Identifier of a progress entry or rank-progress row.
pub type EntryId = EntityId;

/// Identifier of a primary-store profile.
pub type ProfileId = EntityId;

/// Identifier of the user owning a session.
pub type UserId = EntityId;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_v7_and_unique() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_eq!(a.get_version_num(), 7);
        assert_ne!(a, b);
    }

    #[test]
    fn test_entity_ids_sort_by_creation_across_time() {
        let a = new_entity_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_entity_id();
        // UUIDv7 embeds the timestamp in the high bits
        assert!(a < b);
    }
}
