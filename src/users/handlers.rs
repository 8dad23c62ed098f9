use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    state::AppState,
    users::{
        json::{json_array_to_users, json_to_user, CodecError},
        repo::StoreError,
        repo_types::User,
        services::{normalize_email, validate_user, ValidationError},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/batch", post(create_users))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, (StatusCode, String)> {
    let users = state.store.list().await.map_err(store_error)?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<User>, (StatusCode, String)> {
    match state.store.find_by_id(id).await.map_err(store_error)? {
        Some(user) => Ok(Json(user)),
        None => Err(not_found(id)),
    }
}

#[instrument(skip(state, body))]
pub async fn create_user(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<User>), (StatusCode, String)> {
    let mut user = json_to_user(&body).map_err(codec_error)?;
    prepare(&mut user)?;

    let stored = state.store.insert(&user).await.map_err(store_error)?;
    info!(user_id = stored.user_id, user_name = %stored.user_name, "user created");
    Ok((StatusCode::CREATED, Json(stored)))
}

/// Inserts in input order as one unit: if any user fails, none are stored.
#[instrument(skip(state, body))]
pub async fn create_users(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<Vec<User>>), (StatusCode, String)> {
    let mut users = json_array_to_users(&body).map_err(codec_error)?;
    for u in &mut users {
        prepare(u)?;
    }

    let stored = state.store.insert_many(&users).await.map_err(store_error)?;
    info!(count = stored.len(), "users created");
    Ok((StatusCode::CREATED, Json(stored)))
}

#[instrument(skip(state, body))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    body: String,
) -> Result<Json<User>, (StatusCode, String)> {
    let mut user = json_to_user(&body).map_err(codec_error)?;
    user.user_id = id;
    user.relink_roles();
    prepare(&mut user)?;

    match state.store.update(&user).await.map_err(store_error)? {
        Some(stored) => {
            info!(user_id = id, "user updated");
            Ok(Json(stored))
        }
        None => Err(not_found(id)),
    }
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.store.delete(id).await.map_err(store_error)? {
        info!(user_id = id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

fn prepare(user: &mut User) -> Result<(), (StatusCode, String)> {
    user.email = normalize_email(&user.email);
    validate_user(user).map_err(validation_error)
}

fn not_found(id: i32) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("User {} not found", id))
}

fn codec_error(e: CodecError) -> (StatusCode, String) {
    warn!(error = %e, "rejected user json");
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn validation_error(e: ValidationError) -> (StatusCode, String) {
    warn!(error = %e, "invalid user");
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn store_error(e: StoreError) -> (StatusCode, String) {
    match e {
        StoreError::Conflict { .. } => (StatusCode::CONFLICT, e.to_string()),
        _ => {
            error!(error = %e, "user store failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
