pub mod api;
pub mod events;
pub mod models;

use uuid::Uuid;

/// The well-known group every new identity is added to. Seeded by the
/// database migrations at startup.
pub const DEFAULT_GROUP_ID: Uuid = Uuid::from_u128(1);

/// Display name shown for anonymous authors.
pub const ANONYMOUS_NAME: &str = "Anonymous";
