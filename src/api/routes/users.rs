//! User administration and self-service endpoints

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Authed;
use crate::api::state::ApiState;
use crate::api::types::{MessageResponse, UpdatePasswordRequest, UserInfoResponse};
use crate::auth::UserUpdate;
use crate::db::SortOrder;

use super::{parse_limit, parse_offset};

/// GET /users — sorted by creation time, filtered by email prefix.
pub async fn list_users(
    State(state): State<ApiState>,
    authed: Authed,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<UserInfoResponse>>> {
    authed.require_scope("users:read")?;

    let limit = parse_limit(params.get("limit").map(String::as_str))?;
    let offset = parse_offset(params.get("offset").map(String::as_str))?;
    let order = match params.get("sort_order").map(String::as_str) {
        None => SortOrder::Asc,
        Some(raw) => SortOrder::parse(raw)
            .ok_or_else(|| ApiError::BadRequest("Invalid sort order".to_string()))?,
    };
    let email = params.get("email").cloned().unwrap_or_default();

    let users = state
        .auth
        .store()
        .list_users(&email, order, limit, offset)
        .await?;
    Ok(Json(users.iter().map(UserInfoResponse::from).collect()))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
) -> ApiResult<Json<UserInfoResponse>> {
    authed.require_scope("users:read")?;
    let user = state.auth.store().get_user_by_id(&id).await?;
    Ok(Json(UserInfoResponse::from(&user)))
}

/// PUT /users/:id — names and role assignments.
pub async fn update_user(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
    Json(update): Json<UserUpdate>,
) -> ApiResult<Json<UserInfoResponse>> {
    authed.require_scope("users:roles:update")?;
    let user = state.auth.update_user(&id, update).await?;
    Ok(Json(UserInfoResponse::from(&user)))
}

/// GET /users/me
pub async fn me(
    State(state): State<ApiState>,
    authed: Authed,
) -> ApiResult<Json<UserInfoResponse>> {
    let user = state.auth.store().get_user_by_id(authed.user_id()).await?;
    Ok(Json(UserInfoResponse::from(&user)))
}

/// PATCH /users/me — names only; nobody edits their own roles.
pub async fn update_me(
    State(state): State<ApiState>,
    authed: Authed,
    Json(update): Json<UserUpdate>,
) -> ApiResult<Json<UserInfoResponse>> {
    let update = UserUpdate {
        first_name: update.first_name,
        last_name: update.last_name,
        role_ids: None,
    };
    let user = state.auth.update_user(authed.user_id(), update).await?;
    Ok(Json(UserInfoResponse::from(&user)))
}

/// PUT /users/me/password
pub async fn update_my_password(
    State(state): State<ApiState>,
    authed: Authed,
    Json(body): Json<UpdatePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .auth
        .update_password(authed.user_id(), &body.current_password, &body.new_password)
        .await?;
    Ok(Json(MessageResponse {
        message: "Password updated successfully".to_string(),
    }))
}
