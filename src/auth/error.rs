//! Error kinds for authentication and user administration

use std::fmt;

pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by the auth core. Boundary handlers map these to
/// HTTP statuses exactly once; nothing below the handler layer
/// inspects a kind twice.
#[derive(Debug)]
pub enum AuthError {
    /// No user with the given id or email
    UserNotFound,

    /// Unique-email collision on register or update
    EmailExists,

    /// No role with the given id
    RoleNotFound,

    /// Unique-role-name collision
    RoleNameExists,

    /// A referenced role id does not exist
    InvalidRoles,

    /// A referenced scope id does not exist
    InvalidScopes,

    /// Password does not match the stored hash
    InvalidPassword,

    /// Signature, algorithm or claim validation failed, or a rotated
    /// refresh token was replayed
    InvalidToken,

    /// The token's expiry has passed
    SessionExpired,

    /// No live refresh session for the user
    SessionNotFound,

    /// Caller lacks the required scope
    PermissionDenied,

    /// Request-level validation failure (first offending field)
    InvalidInput(String),

    /// Session store unavailable
    SessionStore(String),

    /// Catalog store failure
    Store(String),

    /// Hashing or signing failure
    Internal(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::UserNotFound => write!(f, "user not found"),
            AuthError::EmailExists => write!(f, "user mail already exists"),
            AuthError::RoleNotFound => write!(f, "role not found"),
            AuthError::RoleNameExists => write!(f, "role name already exists"),
            AuthError::InvalidRoles => write!(f, "invalid roles"),
            AuthError::InvalidScopes => write!(f, "invalid scopes"),
            AuthError::InvalidPassword => write!(f, "invalid password"),
            AuthError::InvalidToken => write!(f, "invalid token"),
            AuthError::SessionExpired => write!(f, "session expired"),
            AuthError::SessionNotFound => write!(f, "refresh token not found"),
            AuthError::PermissionDenied => write!(f, "permission denied"),
            AuthError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            AuthError::SessionStore(msg) => write!(f, "session store error: {}", msg),
            AuthError::Store(msg) => write!(f, "store error: {}", msg),
            AuthError::Internal(msg) => write!(f, "internal auth error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AuthError::UserNotFound,
            other => AuthError::Store(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        AuthError::SessionStore(err.to_string())
    }
}
