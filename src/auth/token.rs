//! Signed token minting and verification
//!
//! Access and refresh tokens are HS256 JWTs signed with the deployment
//! secret. Verification accepts the HMAC family only — a token whose
//! header advertises any other signing method is rejected before the
//! signature is checked (algorithm-confusion defense).

use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: String,
    pub scopes: Vec<String>,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: String,
    pub jti: String,
    pub exp: i64,
}

/// A freshly minted token together with its lifetime.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub ttl: Duration,
}

/// A freshly minted refresh token; the `jti` is what the session store
/// remembers.
#[derive(Debug, Clone)]
pub struct MintedRefreshToken {
    pub token: String,
    pub ttl: Duration,
    pub jti: String,
}

#[derive(Clone)]
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn create_access_token(
        &self,
        user_id: &str,
        scopes: Vec<String>,
    ) -> AuthResult<MintedToken> {
        let exp = chrono::Utc::now().timestamp() + self.access_ttl.as_secs() as i64;
        let claims = AccessClaims {
            user_id: user_id.to_string(),
            scopes,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("signing access token: {e}")))?;
        Ok(MintedToken {
            token,
            ttl: self.access_ttl,
        })
    }

    pub fn create_refresh_token(&self, user_id: &str) -> AuthResult<MintedRefreshToken> {
        let jti = Uuid::new_v4().to_string();
        let exp = chrono::Utc::now().timestamp() + self.refresh_ttl.as_secs() as i64;
        let claims = RefreshClaims {
            user_id: user_id.to_string(),
            jti: jti.clone(),
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("signing refresh token: {e}")))?;
        Ok(MintedRefreshToken {
            token,
            ttl: self.refresh_ttl,
            jti,
        })
    }

    pub fn verify_access(&self, token: &str) -> AuthResult<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    pub fn verify_refresh(&self, token: &str) -> AuthResult<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    fn validation() -> Validation {
        // HMAC family only; exact expiry, no leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::SessionExpired,
        _ => AuthError::InvalidToken,
    }
}
