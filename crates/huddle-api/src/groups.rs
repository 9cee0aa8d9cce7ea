use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};
use uuid::Uuid;

use huddle_db::models::GroupRow;
use huddle_types::ANONYMOUS_NAME;
use huddle_types::api::{GroupResponse, HistoryMessageResponse};
use huddle_types::models::MessageKind;

use crate::AppState;

pub async fn list_groups(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_groups())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let groups: Vec<GroupResponse> = rows.into_iter().map(group_response).collect();
    Ok(Json(groups))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let gid = group_id.to_string();
    let row = tokio::task::spawn_blocking(move || db.get_group(&gid))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(group_response(row)))
}

/// Full message history for a group, ascending by creation order — the
/// read path clients use on join/reconnect. Anonymous authors project as
/// the anonymous label; the per-send override is not persisted, so history
/// reflects the author's stored flag.
pub async fn get_group_messages(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let gid = group_id.to_string();
    let rows = tokio::task::spawn_blocking(move || db.fetch_history(&gid))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<HistoryMessageResponse> = rows
        .into_iter()
        .map(|row| {
            let display_name = if row.is_anonymous {
                ANONYMOUS_NAME.to_string()
            } else {
                row.display_name
            };
            HistoryMessageResponse {
                id: row.message.id,
                group_id: parse_uuid(&row.message.group_id, row.message.id),
                user_id: parse_uuid(&row.message.user_id, row.message.id),
                text: row.message.body,
                kind: MessageKind::from_str_or_text(&row.message.kind),
                created_at: parse_timestamp(&row.message.created_at, row.message.id),
                display_name,
                is_anonymous: row.is_anonymous,
                avatar_url: row.avatar_url,
            }
        })
        .collect();

    Ok(Json(messages))
}

fn group_response(row: GroupRow) -> GroupResponse {
    GroupResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt group id '{}': {}", row.id, e);
            Uuid::default()
        }),
        name: row.name,
        description: row.description,
        avatar_url: row.avatar_url,
        created_by_name: row.created_by_name,
        created_at: parse_sqlite_timestamp(&row.created_at).unwrap_or_default(),
    }
}

fn parse_uuid(raw: &str, message_id: i64) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt uuid '{}' on message {}: {}", raw, message_id, e);
        Uuid::default()
    })
}

fn parse_timestamp(raw: &str, message_id: i64) -> chrono::DateTime<chrono::Utc> {
    parse_sqlite_timestamp(raw).unwrap_or_else(|| {
        warn!("Corrupt created_at '{}' on message {}", raw, message_id);
        chrono::DateTime::default()
    })
}

/// SQLite default timestamps are "YYYY-MM-DD HH:MM:SS" without a timezone;
/// broker-written rows are RFC 3339. Accept both.
fn parse_sqlite_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .ok()
        })
}
