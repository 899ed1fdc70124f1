//! Password hashing
//!
//! bcrypt with the default adaptive cost. The plaintext never leaves
//! this module's arguments; only the salted hash is stored.

use super::error::{AuthError, AuthResult};

pub fn hash_password(password: &str) -> AuthResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Constant-time comparison against the stored hash. A mismatch is
/// `InvalidPassword`, never a description of which part failed.
pub fn verify_password(password: &str, hash: &str) -> AuthResult<()> {
    let ok = bcrypt::verify(password, hash)
        .map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))?;
    if ok {
        Ok(())
    } else {
        Err(AuthError::InvalidPassword)
    }
}
