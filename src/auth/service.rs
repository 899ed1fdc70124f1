//! Authentication service
//!
//! Orchestrates the store, the session store and the token signer.
//! The refresh-session state machine lives here:
//!
//! ```text
//! absent ──Login──> active(jti₁) ──Refresh──> active(jti₂) ──...──> absent
//!                        │                        │
//!                        └── Logout / TTL expiry ─┘
//!                        └── jti mismatch on Refresh (reuse) ──> absent
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::error::{AuthError, AuthResult};
use super::model::{NewUser, User, UserUpdate};
use super::password::{hash_password, verify_password};
use super::session::SessionStore;
use super::store::AuthStore;
use super::token::{AccessClaims, TokenSigner};

/// Minted token pair handed back to the HTTP layer.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

#[derive(Clone)]
pub struct AuthService {
    store: AuthStore,
    sessions: Arc<dyn SessionStore>,
    signer: TokenSigner,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        store: AuthStore,
        sessions: Arc<dyn SessionStore>,
        signer: TokenSigner,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            sessions,
            signer,
            session_ttl,
        }
    }

    pub fn store(&self) -> &AuthStore {
        &self.store
    }

    /// Register a new user. Role ids must all exist; the password is
    /// hashed before it reaches the store.
    #[instrument(skip(self, new_user), fields(email = %new_user.email))]
    pub async fn register(&self, new_user: NewUser) -> AuthResult<User> {
        validate_email(&new_user.email)?;
        if new_user.password.is_empty() {
            return Err(AuthError::InvalidInput(
                "the password field is required".to_string(),
            ));
        }

        let mut role_ids = new_user.role_ids.clone();
        role_ids.sort();
        role_ids.dedup();
        if !role_ids.is_empty() {
            let found = self.store.count_roles_by_ids(&role_ids).await?;
            if found != role_ids.len() {
                return Err(AuthError::InvalidRoles);
            }
        }

        let password_hash = hash_password(&new_user.password)?;
        let user = self
            .store
            .create_user(
                &new_user.email,
                &password_hash,
                &new_user.first_name,
                &new_user.last_name,
                &role_ids,
            )
            .await?;

        info!("registered user {}", user.id);
        Ok(user)
    }

    /// Verify credentials, mint a token pair and start a fresh
    /// session. A previous session for the user is superseded.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<AuthTokens> {
        let user = self.store.get_user_by_email(email).await?;
        verify_password(password, &user.password_hash)?;

        let scopes = user.effective_scopes();
        let access = self.signer.create_access_token(&user.id, scopes)?;
        let refresh = self.signer.create_refresh_token(&user.id)?;

        self.sessions
            .put(&user.id, &refresh.jti, Some(self.session_ttl))
            .await?;

        Ok(AuthTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            access_ttl: access.ttl,
            refresh_ttl: refresh.ttl,
        })
    }

    /// Exchange a refresh token for a new pair, rotating the stored
    /// `jti`. Presenting a rotated-out token destroys the session so
    /// neither the thief nor the legitimate holder can continue the
    /// chain.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
        let claims = self.signer.verify_refresh(refresh_token)?;

        let stored = self
            .sessions
            .get(&claims.user_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if stored != claims.jti {
            warn!("refresh token reuse detected for user {}", claims.user_id);
            self.sessions.delete(&claims.user_id).await?;
            return Err(AuthError::InvalidToken);
        }

        let user = self.store.get_user_by_id(&claims.user_id).await?;
        let scopes = user.effective_scopes();
        let access = self.signer.create_access_token(&user.id, scopes)?;
        let refresh = self.signer.create_refresh_token(&user.id)?;

        // Rotate the jti but keep the session TTL set at login.
        self.sessions.put(&user.id, &refresh.jti, None).await?;

        Ok(AuthTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            access_ttl: access.ttl,
            refresh_ttl: refresh.ttl,
        })
    }

    /// Delete the refresh session. Already-issued access tokens stay
    /// valid until their `exp`.
    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: &str) -> AuthResult<()> {
        self.sessions.delete(user_id).await
    }

    /// Validate an access token and return its claims.
    pub fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        self.signer.verify_access(token)
    }

    // ------------------------------------------------------------------
    // User administration
    // ------------------------------------------------------------------

    /// Update names and/or role assignments; role ids are validated
    /// the same way as at registration.
    #[instrument(skip(self, update))]
    pub async fn update_user(&self, id: &str, update: UserUpdate) -> AuthResult<User> {
        if let Some(role_ids) = &update.role_ids {
            let mut ids = role_ids.clone();
            ids.sort();
            ids.dedup();
            if !ids.is_empty() && self.store.count_roles_by_ids(&ids).await? != ids.len() {
                return Err(AuthError::InvalidRoles);
            }
        }
        self.store.update_user(id, &update, None).await
    }

    /// Self-service password change; the current password must verify
    /// first.
    #[instrument(skip(self, current_password, new_password))]
    pub async fn update_password(
        &self,
        id: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        if new_password.is_empty() {
            return Err(AuthError::InvalidInput(
                "the new_password field is required".to_string(),
            ));
        }
        let user = self.store.get_user_by_id(id).await?;
        verify_password(current_password, &user.password_hash)?;

        let password_hash = hash_password(new_password)?;
        self.store
            .update_user(id, &UserUpdate::default(), Some(&password_hash))
            .await?;
        Ok(())
    }
}

fn validate_email(email: &str) -> AuthResult<()> {
    let mut parts = email.splitn(2, '@');
    let local = parts.next().unwrap_or("");
    let domain = parts.next().unwrap_or("");
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.ends_with('.') {
        return Err(AuthError::InvalidInput(
            "the email field is not a valid email".to_string(),
        ));
    }
    Ok(())
}
