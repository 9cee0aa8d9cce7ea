/// Database row types — these map directly to SQLite rows.
/// Distinct from huddle-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_anonymous: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: Option<String>,
    pub created_by_name: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub group_id: String,
    pub user_id: String,
    pub body: String,
    pub kind: String,
    pub created_at: String,
}

/// History row: message joined with its author's identity.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub message: MessageRow,
    pub display_name: String,
    pub is_anonymous: bool,
    pub avatar_url: Option<String>,
}
