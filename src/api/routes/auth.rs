//! Authentication endpoints
//!
//! The refresh token only ever travels in an HttpOnly cookie scoped to
//! the refresh path; the JSON body carries the access token alone.

use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::api::error::{ApiError, ApiResult};
use crate::api::middleware::Authed;
use crate::api::state::ApiState;
use crate::api::types::{
    AuthenticationResponse, LoginRequest, MessageResponse, UserInfoResponse,
};
use crate::auth::{AuthError, AuthTokens, NewUser};

const REFRESH_COOKIE: &str = "refresh_token";
const REFRESH_PATH: &str = "/auth/refresh";

fn refresh_cookie(tokens: &AuthTokens) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), tokens.refresh_token.clone()))
        .path(REFRESH_PATH.to_string())
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(tokens.refresh_ttl.as_secs() as i64))
        .build()
}

fn clear_refresh_cookie() -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE.to_string(), String::new()))
        .path(REFRESH_PATH.to_string())
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .build()
}

fn token_response(tokens: &AuthTokens) -> AuthenticationResponse {
    AuthenticationResponse {
        access_token: tokens.access_token.clone(),
        token_type: "Bearer",
        expires_in: tokens.access_ttl.as_secs(),
    }
}

/// POST /auth/login
///
/// An unknown email and a wrong password are the same 401: an
/// unauthenticated caller must not be able to probe which emails are
/// registered.
pub async fn login(
    State(state): State<ApiState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<AuthenticationResponse>)> {
    if body.email.is_empty() {
        return Err(ApiError::BadRequest(
            "The email field is required".to_string(),
        ));
    }
    if body.password.is_empty() {
        return Err(ApiError::BadRequest(
            "The password field is required".to_string(),
        ));
    }

    let tokens = state
        .auth
        .login(&body.email, &body.password)
        .await
        .map_err(|err| match err {
            AuthError::UserNotFound | AuthError::InvalidPassword => {
                ApiError::Unauthorized("Invalid credentials".to_string())
            }
            other => ApiError::from(other),
        })?;
    let jar = jar.add(refresh_cookie(&tokens));
    Ok((jar, Json(token_response(&tokens))))
}

/// POST /auth/refresh
///
/// Reads the cookie, rotates the pair, sets the new cookie. Every
/// rejection is the same 401 so a caller cannot distinguish a revoked
/// session from a forged token.
pub async fn refresh(
    State(state): State<ApiState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<AuthenticationResponse>)> {
    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Unauthorized("Cookie not found".to_string()))?;

    let tokens = state
        .auth
        .refresh(&refresh_token)
        .await
        .map_err(|err| match err {
            AuthError::InvalidToken
            | AuthError::SessionExpired
            | AuthError::SessionNotFound => {
                ApiError::Unauthorized("Invalid refresh token".to_string())
            }
            other => ApiError::from(other),
        })?;

    let jar = jar.add(refresh_cookie(&tokens));
    Ok((jar, Json(token_response(&tokens))))
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<ApiState>,
    authed: Authed,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<MessageResponse>)> {
    state.auth.logout(authed.user_id()).await?;
    let jar = jar.add(clear_refresh_cookie());
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logout successfully".to_string(),
        }),
    ))
}

/// GET /auth/verify
///
/// 204 with the caller's identity echoed in headers, for downstream
/// services that trust this service to terminate authentication.
pub async fn verify(authed: Authed) -> ApiResult<(StatusCode, HeaderMap)> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "X-User-ID",
        HeaderValue::from_str(authed.user_id())
            .map_err(|_| ApiError::Internal("user id is not header-safe".to_string()))?,
    );
    headers.insert(
        "X-User-Scopes",
        HeaderValue::from_str(&authed.scopes().join(","))
            .map_err(|_| ApiError::Internal("scopes are not header-safe".to_string()))?,
    );
    Ok((StatusCode::NO_CONTENT, headers))
}

/// POST /auth/register
pub async fn register(
    State(state): State<ApiState>,
    authed: Authed,
    Json(body): Json<NewUser>,
) -> ApiResult<Json<UserInfoResponse>> {
    authed.require_scope("users:create")?;
    let user = state.auth.register(body).await?;
    Ok(Json(UserInfoResponse::from(&user)))
}
