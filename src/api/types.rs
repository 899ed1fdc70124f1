//! Request and response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{Role, Scope, User};
use crate::Server;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthenticationResponse {
    pub access_token: String,
    pub token_type: &'static str,
    /// Access-token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ScopeInfoResponse {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl From<&Scope> for ScopeInfoResponse {
    fn from(scope: &Scope) -> Self {
        Self {
            id: scope.id.clone(),
            name: scope.name.clone(),
            description: scope.description.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleInfoResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub scopes: Vec<ScopeInfoResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Role> for RoleInfoResponse {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.clone(),
            name: role.name.clone(),
            description: role.description.clone(),
            scopes: role.scopes.iter().map(ScopeInfoResponse::from).collect(),
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub roles: Vec<RoleInfoResponse>,
}

impl From<&User> for UserInfoResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            roles: user.roles.iter().map(RoleInfoResponse::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct ServerInfoResponse {
    pub id: String,
    pub server_name: String,
    pub status: String,
    pub ipv4: String,
    pub port: u16,
    pub health_endpoint: String,
    pub health_check_interval: u32,
    pub next_health_check_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Server> for ServerInfoResponse {
    fn from(server: &Server) -> Self {
        Self {
            id: server.id.clone(),
            server_name: server.server_name.clone(),
            status: server.status.to_string(),
            ipv4: server.ipv4.to_string(),
            port: server.port,
            health_endpoint: server.health_endpoint.clone(),
            health_check_interval: server.health_check_interval,
            next_health_check_at: server.next_health_check_at,
            created_at: server.created_at,
            updated_at: server.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ImportServersResponse {
    pub imported_count: usize,
    pub imported_servers: Vec<String>,
    pub failed_count: usize,
    pub failed_servers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UptimeResponse {
    pub uptime_percentage: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    /// Inclusive, `YYYY-MM-DD`.
    pub start_date: String,
    /// Inclusive, `YYYY-MM-DD`; the window ends at the following
    /// midnight.
    pub end_date: String,
    pub email: String,
}
