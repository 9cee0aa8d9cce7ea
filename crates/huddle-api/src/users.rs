use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use rand::Rng;
use rand::distr::Alphanumeric;
use tracing::{error, info};
use uuid::Uuid;

use huddle_types::{ANONYMOUS_NAME, DEFAULT_GROUP_ID};
use huddle_types::api::{CreateUserRequest, CreateUserResponse};

use crate::AppState;

/// Create an identity with a chosen display name. The id and username are
/// assigned server-side; the new user is added to the default group.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let display_name = req.display_name.trim().to_string();
    if display_name.is_empty() || display_name.chars().count() > 50 {
        return Err(StatusCode::BAD_REQUEST);
    }

    create_identity(&state, display_name, req.is_anonymous).await
}

/// Shorthand kept from the original API: a throwaway anonymous identity.
pub async fn create_anonymous_user(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    create_identity(&state, ANONYMOUS_NAME.to_string(), true).await
}

async fn create_identity(
    state: &AppState,
    display_name: String,
    is_anonymous: bool,
) -> Result<(StatusCode, Json<CreateUserResponse>), StatusCode> {
    let user_id = Uuid::new_v4();
    let username = generate_username(is_anonymous);

    let db = state.db.clone();
    let uid = user_id.to_string();
    let uname = username.clone();
    let dname = display_name.clone();
    tokio::task::spawn_blocking(move || {
        db.create_user_in_group(
            &uid,
            &uname,
            &dname,
            is_anonymous,
            &DEFAULT_GROUP_ID.to_string(),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|e| {
        error!("failed to create user: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    info!(%user_id, %username, "identity created");

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            user_id,
            username,
            display_name,
            is_anonymous,
        }),
    ))
}

/// Server-assigned usernames: `anon_` or `user_` plus a random lowercase
/// alphanumeric suffix. Identity issuance is the single authoritative path;
/// clients never pick identifiers.
fn generate_username(is_anonymous: bool) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    let prefix = if is_anonymous { "anon" } else { "user" };
    format!("{prefix}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_prefix_follows_anonymity() {
        assert!(generate_username(true).starts_with("anon_"));
        assert!(generate_username(false).starts_with("user_"));
    }

    #[test]
    fn usernames_are_unique_enough() {
        let a = generate_username(false);
        let b = generate_username(false);
        assert_ne!(a, b);
        assert_eq!(a.len(), "user_".len() + 9);
    }
}
