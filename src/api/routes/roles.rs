//! Role administration endpoints

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Authed;
use crate::api::state::ApiState;
use crate::api::types::RoleInfoResponse;
use crate::auth::store::RoleSort;
use crate::auth::{AuthError, RoleSpec};
use crate::db::SortOrder;

use super::{parse_limit, parse_offset};

/// GET /roles
pub async fn list_roles(
    State(state): State<ApiState>,
    authed: Authed,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<RoleInfoResponse>>> {
    authed.require_scope("roles:read")?;

    let limit = parse_limit(params.get("limit").map(String::as_str))?;
    let offset = parse_offset(params.get("offset").map(String::as_str))?;
    let sort_by = match params.get("sort_by").map(String::as_str) {
        None => RoleSort::CreatedAt,
        Some(raw) => RoleSort::parse(raw)
            .ok_or_else(|| ApiError::BadRequest("Invalid sort by".to_string()))?,
    };
    let order = match params.get("sort_order").map(String::as_str) {
        None => SortOrder::Asc,
        Some(raw) => SortOrder::parse(raw)
            .ok_or_else(|| ApiError::BadRequest("Invalid sort order".to_string()))?,
    };
    let name = params.get("name").cloned().unwrap_or_default();

    let roles = state
        .auth
        .store()
        .list_roles(&name, sort_by, order, limit, offset)
        .await?;
    Ok(Json(roles.iter().map(RoleInfoResponse::from).collect()))
}

/// GET /roles/:id
pub async fn get_role(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
) -> ApiResult<Json<RoleInfoResponse>> {
    authed.require_scope("roles:read")?;
    let role = state.auth.store().get_role(&id).await?;
    Ok(Json(RoleInfoResponse::from(&role)))
}

/// POST /roles
pub async fn create_role(
    State(state): State<ApiState>,
    authed: Authed,
    Json(spec): Json<RoleSpec>,
) -> ApiResult<(StatusCode, Json<RoleInfoResponse>)> {
    authed.require_scope("roles:create")?;
    validate_spec(&state, &spec).await?;

    let role = state
        .auth
        .store()
        .create_role(&spec.name, &spec.description, &spec.scope_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(RoleInfoResponse::from(&role))))
}

/// PUT /roles/:id
pub async fn update_role(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
    Json(spec): Json<RoleSpec>,
) -> ApiResult<Json<RoleInfoResponse>> {
    authed.require_scope("roles:update")?;
    validate_spec(&state, &spec).await?;

    let role = state
        .auth
        .store()
        .update_role(&id, &spec.name, &spec.description, &spec.scope_ids)
        .await?;
    Ok(Json(RoleInfoResponse::from(&role)))
}

/// DELETE /roles/:id
pub async fn delete_role(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    authed.require_scope("roles:delete")?;
    state.auth.store().delete_role(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Name must be present and every scope id must exist.
async fn validate_spec(state: &ApiState, spec: &RoleSpec) -> Result<(), ApiError> {
    if spec.name.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "The name field is required".to_string(),
        ));
    }

    let mut ids = spec.scope_ids.clone();
    ids.sort();
    ids.dedup();
    if !ids.is_empty() {
        let found = state.auth.store().count_scopes_by_ids(&ids).await?;
        if found != ids.len() {
            return Err(ApiError::from(AuthError::InvalidScopes));
        }
    }
    Ok(())
}
