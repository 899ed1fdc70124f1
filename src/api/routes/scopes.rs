//! Scope listing endpoint

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::Json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Authed;
use crate::api::state::ApiState;
use crate::api::types::ScopeInfoResponse;
use crate::db::SortOrder;

use super::{parse_limit, parse_offset};

/// GET /scopes — the scope set is static per deployment, so this is a
/// read-only listing.
pub async fn list_scopes(
    State(state): State<ApiState>,
    authed: Authed,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<ScopeInfoResponse>>> {
    authed.require_scope("scopes:read")?;

    let limit = parse_limit(params.get("limit").map(String::as_str))?;
    let offset = parse_offset(params.get("offset").map(String::as_str))?;
    let order = match params.get("sort_order").map(String::as_str) {
        None => SortOrder::Asc,
        Some(raw) => SortOrder::parse(raw)
            .ok_or_else(|| ApiError::BadRequest("Invalid sort order".to_string()))?,
    };
    let name = params.get("name").cloned().unwrap_or_default();

    let scopes = state
        .auth
        .store()
        .list_scopes(&name, order, limit, offset)
        .await?;
    Ok(Json(scopes.iter().map(ScopeInfoResponse::from).collect()))
}
