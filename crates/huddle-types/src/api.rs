use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Identity --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub display_name: String,
    #[serde(default)]
    pub is_anonymous: bool,
}

#[derive(Debug, Serialize)]
pub struct CreateUserResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub is_anonymous: bool,
}

// -- Groups --

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- History --

/// One history entry: the stored message joined with its author, projected
/// with the author's stored anonymity flag.
#[derive(Debug, Serialize)]
pub struct HistoryMessageResponse {
    pub id: i64,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub kind: crate::models::MessageKind,
    pub created_at: DateTime<Utc>,
    pub display_name: String,
    pub is_anonymous: bool,
    pub avatar_url: Option<String>,
}
