//! Server catalog endpoints: CRUD, import/export, uptime, reports

use std::collections::HashMap;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use tracing::error;

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Authed;
use crate::api::state::ApiState;
use crate::api::types::{
    ImportServersResponse, MessageResponse, ReportRequest, ServerInfoResponse, UptimeResponse,
};
use crate::catalog::{ServerPatch, ServerQuery, ServerSort};
use crate::db::SortOrder;
use crate::sheet::{self, SheetError};
use crate::{ServerSpec, ServerStatus};

use super::{parse_date_window, parse_limit, parse_offset};

/// POST /servers
pub async fn create_server(
    State(state): State<ApiState>,
    authed: Authed,
    Json(spec): Json<ServerSpec>,
) -> ApiResult<(StatusCode, Json<ServerInfoResponse>)> {
    authed.require_scope("servers:create")?;
    let server = state.catalog.create_server(&spec).await?;
    Ok((StatusCode::CREATED, Json(ServerInfoResponse::from(&server))))
}

/// GET /servers
pub async fn list_servers(
    State(state): State<ApiState>,
    authed: Authed,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<Vec<ServerInfoResponse>>> {
    authed.require_scope("servers:read")?;
    let query = parse_server_query(&params, SortOrder::Asc)?;
    let servers = state.catalog.list_servers(&query).await?;
    Ok(Json(servers.iter().map(ServerInfoResponse::from).collect()))
}

/// GET /servers/:id
pub async fn get_server(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
) -> ApiResult<Json<ServerInfoResponse>> {
    authed.require_scope("servers:read")?;
    let server = state.catalog.get_server(&id).await?;
    Ok(Json(ServerInfoResponse::from(&server)))
}

/// PATCH /servers/:id
pub async fn update_server(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
    Json(patch): Json<ServerPatch>,
) -> ApiResult<Json<ServerInfoResponse>> {
    authed.require_scope("servers:update")?;
    let server = state.catalog.update_server(&id, &patch).await?;
    Ok(Json(ServerInfoResponse::from(&server)))
}

/// DELETE /servers/:id — idempotent; deleting twice is still a 204.
pub async fn delete_server(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    authed.require_scope("servers:delete")?;
    state.catalog.delete_server(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /servers/:id/uptime
pub async fn uptime(
    State(state): State<ApiState>,
    authed: Authed,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<UptimeResponse>> {
    authed.require_scope("servers:read")?;

    let start_date = params
        .get("start_date")
        .ok_or_else(|| ApiError::BadRequest("Invalid start date".to_string()))?;
    let end_date = params
        .get("end_date")
        .ok_or_else(|| ApiError::BadRequest("Invalid end date".to_string()))?;
    let (start, end) = parse_date_window(start_date, end_date)?;

    let uptime_percentage = state.reports.uptime_percentage(&id, start, end).await?;
    Ok(Json(UptimeResponse { uptime_percentage }))
}

/// POST /servers/import — multipart workbook upload.
pub async fn import_servers(
    State(state): State<ApiState>,
    authed: Authed,
    Query(params): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportServersResponse>> {
    authed.require_scope("servers:create")?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid request body".to_string()))?;
            upload = Some((filename, bytes.to_vec()));
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("Invalid request body".to_string()))?;

    let extension = filename.rsplit('.').next().unwrap_or_default().to_lowercase();
    if !state.sheets.accepts_extension(&extension) {
        return Err(ApiError::BadRequest(
            "File must be a workbook".to_string(),
        ));
    }

    let sheet = state
        .sheets
        .decode(&bytes, params.get("sheet_name").map(String::as_str))
        .map_err(sheet_error)?;
    let (specs, mut failed) = sheet::servers_from_sheet(&sheet).map_err(sheet_error)?;

    let (imported, skipped) = state.catalog.import_servers(&specs).await?;
    failed.extend(skipped);

    let imported_servers: Vec<String> = imported
        .iter()
        .map(|server| server.server_name.clone())
        .collect();

    Ok(Json(ImportServersResponse {
        imported_count: imported_servers.len(),
        imported_servers,
        failed_count: failed.len(),
        failed_servers: failed,
    }))
}

/// GET /servers/export — workbook download of the filtered listing.
pub async fn export_servers(
    State(state): State<ApiState>,
    authed: Authed,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<impl IntoResponse> {
    authed.require_scope("servers:read")?;

    let query = parse_server_query(&params, SortOrder::Desc)?;
    let servers = state.catalog.list_servers(&query).await?;

    let sheet = sheet::sheet_from_servers(&servers);
    let bytes = state
        .sheets
        .encode(&sheet)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let filename = format!(
        "servers-{}.{}",
        Utc::now().format("%Y-%m-%dT%H:%M:%S"),
        state.sheets.file_extension()
    );

    Ok((
        [
            (header::CONTENT_TYPE, state.sheets.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    ))
}

/// POST /servers/reports — aggregate the window and mail it; the
/// heavy lifting happens off-request.
pub async fn send_report(
    State(state): State<ApiState>,
    authed: Authed,
    Json(body): Json<ReportRequest>,
) -> ApiResult<Json<MessageResponse>> {
    authed.require_scope("servers:read")?;

    if body.email.is_empty() {
        return Err(ApiError::BadRequest(
            "The email field is required".to_string(),
        ));
    }
    let (start, end) = parse_date_window(&body.start_date, &body.end_date)?;

    let reports = state.reports.clone();
    let recipient = body.email.clone();
    tokio::spawn(async move {
        if let Err(e) = reports.send_report(start, end, &recipient).await {
            error!("report generation failed: {e}");
        }
    });

    Ok(Json(MessageResponse {
        message: "Report sent successfully".to_string(),
    }))
}

fn parse_server_query(
    params: &HashMap<String, String>,
    default_order: SortOrder,
) -> Result<ServerQuery, ApiError> {
    let limit = parse_limit(params.get("limit").map(String::as_str))?;
    let offset = parse_offset(params.get("offset").map(String::as_str))?;

    let status = match params.get("status").map(String::as_str) {
        None | Some("") => None,
        Some(raw) => Some(
            ServerStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest("Invalid status".to_string()))?,
        ),
    };
    let sort_by = match params.get("sort_by").map(String::as_str) {
        None => ServerSort::CreatedAt,
        Some(raw) => ServerSort::parse(raw)
            .ok_or_else(|| ApiError::BadRequest("Invalid sort by".to_string()))?,
    };
    let order = match params.get("sort_order").map(String::as_str) {
        None => default_order,
        Some(raw) => SortOrder::parse(raw)
            .ok_or_else(|| ApiError::BadRequest("Invalid sort order".to_string()))?,
    };

    Ok(ServerQuery {
        name_prefix: params.get("server_name").cloned().unwrap_or_default(),
        status,
        sort_by,
        order,
        limit,
        offset,
    })
}

fn sheet_error(err: SheetError) -> ApiError {
    match err {
        SheetError::Empty => ApiError::BadRequest("File is empty".to_string()),
        SheetError::SheetNotFound => ApiError::BadRequest("Sheet not found".to_string()),
        SheetError::MissingColumn(_) => {
            ApiError::BadRequest("Missing required column".to_string())
        }
        SheetError::Malformed(_) => ApiError::BadRequest("Invalid file".to_string()),
    }
}
