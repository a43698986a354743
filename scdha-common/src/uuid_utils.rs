//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// First 8 hex digits of a UUID, used to disambiguate colliding prefixes
pub fn short(id: &Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}
