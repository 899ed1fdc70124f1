use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod api;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod ingest;
pub mod mail;
pub mod observation;
pub mod prober;
pub mod report;
pub mod schedule;
pub mod scheduler;
pub mod sheet;
pub mod stream;

/// Terminal classification of a server, plus the initial `Pending`
/// state assigned at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Pending,
    Healthy,
    Unhealthy,
    Inactive,
    ConfigurationError,
    NetworkError,
}

impl ServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Pending => "pending",
            ServerStatus::Healthy => "healthy",
            ServerStatus::Unhealthy => "unhealthy",
            ServerStatus::Inactive => "inactive",
            ServerStatus::ConfigurationError => "configuration_error",
            ServerStatus::NetworkError => "network_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ServerStatus::Pending),
            "healthy" => Some(ServerStatus::Healthy),
            "unhealthy" => Some(ServerStatus::Unhealthy),
            "inactive" => Some(ServerStatus::Inactive),
            "configuration_error" => Some(ServerStatus::ConfigurationError),
            "network_error" => Some(ServerStatus::NetworkError),
            _ => None,
        }
    }

    /// 1 for `Healthy`, 0 for everything else. Weights the uptime
    /// average together with `interval_since_last_check_ms`.
    pub fn numeric(&self) -> i64 {
        match self {
            ServerStatus::Healthy => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered server as stored in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub server_name: String,
    pub status: ServerStatus,
    pub ipv4: Ipv4Addr,
    pub port: u16,
    pub health_endpoint: String,
    /// Seconds between health checks.
    pub health_check_interval: u32,
    pub next_health_check_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an operator supplies when registering a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub server_name: String,
    pub ipv4: Ipv4Addr,
    pub port: u16,
    pub health_endpoint: String,
    pub health_check_interval: u32,
}

/// Message dispatched by the scheduler for each due server, keyed by
/// server id on the probe-request stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub id: String,
    pub ipv4: Ipv4Addr,
    pub port: u16,
    pub health_endpoint: String,
    pub health_check_interval: u32,
}

/// Immutable record produced by a completed probe. Appended to the
/// observation store exactly as it travels on the probe-result stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub server_id: String,
    pub status: ServerStatus,
    pub status_numeric: i64,
    pub timestamp: DateTime<Utc>,
    /// 1-based attempt count of the probe that produced this record.
    pub attempts: u32,
    pub interval_since_last_check_ms: i64,
}

/// Catalog change operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeOp {
    #[serde(rename = "c")]
    Create,
    #[serde(rename = "u")]
    Update,
    #[serde(rename = "d")]
    Delete,
}

/// Probe-relevant server fields carried in change events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeImage {
    pub id: String,
    #[serde(default)]
    pub ipv4: Option<Ipv4Addr>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub health_check_interval: Option<u32>,
    #[serde(default)]
    pub health_endpoint: Option<String>,
}

/// Envelope emitted on the change stream for every catalog commit,
/// keyed by server id so a single consumer sees per-server events in
/// commit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub payload: ChangePayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    pub op: ChangeOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<ChangeImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<ChangeImage>,
}

impl ChangeEvent {
    pub fn create(server: &Server) -> Self {
        Self {
            payload: ChangePayload {
                op: ChangeOp::Create,
                before: None,
                after: Some(ChangeImage::from_server(server)),
            },
        }
    }

    pub fn update(server: &Server) -> Self {
        Self {
            payload: ChangePayload {
                op: ChangeOp::Update,
                before: None,
                after: Some(ChangeImage::from_server(server)),
            },
        }
    }

    pub fn delete(server_id: &str) -> Self {
        Self {
            payload: ChangePayload {
                op: ChangeOp::Delete,
                before: Some(ChangeImage {
                    id: server_id.to_string(),
                    ipv4: None,
                    port: None,
                    health_check_interval: None,
                    health_endpoint: None,
                }),
                after: None,
            },
        }
    }
}

impl ChangeImage {
    fn from_server(server: &Server) -> Self {
        Self {
            id: server.id.clone(),
            ipv4: Some(server.ipv4),
            port: Some(server.port),
            health_check_interval: Some(server.health_check_interval),
            health_endpoint: Some(server.health_endpoint.clone()),
        }
    }
}
