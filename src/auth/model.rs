//! User, role and scope entities
//!
//! Roles and scopes are many-to-many on both edges (users↔roles,
//! roles↔scopes), stored as association tables. Associations are not
//! owners: deleting a role removes its rows from both tables and
//! nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
    pub scopes: Vec<Scope>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Salted bcrypt hash; the plaintext is never stored or logged.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Union of the scopes of the user's roles, deduplicated and
    /// sorted for stable token claims.
    pub fn effective_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .roles
            .iter()
            .flat_map(|role| role.scopes.iter().map(|scope| scope.name.clone()))
            .collect();
        scopes.sort();
        scopes.dedup();
        scopes
    }
}

/// Registration input. The password is still plaintext here; hashing
/// happens in the auth service before anything touches a store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub role_ids: Vec<String>,
}

/// Partial user update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_ids: Option<Vec<String>>,
}

/// Role creation/update input.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope_ids: Vec<String>,
}
