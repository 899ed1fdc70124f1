//! Authentication and authorization core
//!
//! Issues and validates session credentials for the management API:
//!
//! - **Access tokens**: short-lived signed JWTs carrying
//!   `{user_id, scopes, exp}`; presented as a bearer token on every
//!   call.
//! - **Refresh tokens**: longer-lived JWTs carrying
//!   `{user_id, jti, exp}`; exchanged on a dedicated path for a fresh
//!   pair, rotating the `jti` on each use.
//! - **Refresh sessions**: exactly one live `jti` per user, stored
//!   with a TTL. A presented `jti` that does not match the stored one
//!   destroys the session — a previously-rotated (likely stolen)
//!   token invalidates the whole chain.
//!
//! Permissions are flat scope strings; a user's effective scopes are
//! the deduplicated union over their roles' scopes.

pub mod error;
pub mod model;
pub mod password;
pub mod service;
pub mod session;
pub mod store;
pub mod token;

pub use error::{AuthError, AuthResult};
pub use model::{NewUser, Role, RoleSpec, Scope, User, UserUpdate};
pub use service::{AuthService, AuthTokens};
pub use session::{MemorySessionStore, RedisSessionStore, SessionStore};
pub use store::AuthStore;
pub use token::{AccessClaims, TokenSigner};

/// Authorizes iff `required` is among the caller's scopes.
pub fn require_scope(required: &str, scopes: &[String]) -> AuthResult<()> {
    if scopes.iter().any(|s| s == required) {
        Ok(())
    } else {
        Err(AuthError::PermissionDenied)
    }
}
