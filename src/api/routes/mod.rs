pub mod auth;
pub mod roles;
pub mod scopes;
pub mod servers;
pub mod users;

use crate::api::error::ApiError;

/// Pagination and sort parameters arrive as raw strings so coercion
/// and error messages match the API contract: `limit <= 0` falls back
/// to 10, `offset < 0` to 0, non-integers are a 400.
pub(crate) fn parse_limit(raw: Option<&str>) -> Result<i64, ApiError> {
    let limit = match raw {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest("Limit must be an integer".to_string()))?,
        None => 10,
    };
    Ok(if limit <= 0 { 10 } else { limit })
}

pub(crate) fn parse_offset(raw: Option<&str>) -> Result<i64, ApiError> {
    let offset = match raw {
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| ApiError::BadRequest("Offset must be an integer".to_string()))?,
        None => 0,
    };
    Ok(offset.max(0))
}

/// Parse an inclusive `YYYY-MM-DD` pair into a `[start, end)` window
/// where `end` is midnight after `end_date`.
pub(crate) fn parse_date_window(
    start_date: &str,
    end_date: &str,
) -> Result<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>), ApiError> {
    let start = chrono::NaiveDate::parse_from_str(start_date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid start date".to_string()))?;
    let end = chrono::NaiveDate::parse_from_str(end_date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("Invalid end date".to_string()))?;
    if end < start {
        return Err(ApiError::BadRequest("Invalid end date".to_string()));
    }

    let start = start
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    let end = (end + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc();
    Ok((start, end))
}
