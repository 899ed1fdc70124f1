//! Append-only observation store
//!
//! One row per completed probe, never mutated. Uptime is the weighted
//! average of `status_numeric` with `interval_since_last_check_ms` as
//! the weight, so servers with long check intervals are not
//! under-represented and duplicate deliveries only re-add their own
//! weight.

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, instrument};

use crate::db;
use crate::{Observation, ServerStatus};

pub type ObservationResult<T> = Result<T, ObservationError>;

#[derive(Debug)]
pub enum ObservationError {
    /// Store connection failed
    ConnectionFailed(String),

    /// Query failed
    QueryFailed(String),
}

impl fmt::Display for ObservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to observation store: {}", msg)
            }
            ObservationError::QueryFailed(msg) => write!(f, "observation query failed: {}", msg),
        }
    }
}

impl std::error::Error for ObservationError {}

impl From<sqlx::Error> for ObservationError {
    fn from(err: sqlx::Error) -> Self {
        ObservationError::QueryFailed(err.to_string())
    }
}

/// Fleet-wide rollup over a time window. Counts bucket each observed
/// server by its latest in-window status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetHealth {
    pub total_servers: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub inactive: usize,
    pub configuration_error: usize,
    pub network_error: usize,
    pub average_uptime_percentage: f64,
}

#[derive(Clone)]
pub struct ObservationStore {
    pool: Pool<Sqlite>,
}

impl ObservationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn connect(path: &str) -> ObservationResult<Self> {
        let pool = db::open_pool(path)
            .await
            .map_err(|e| ObservationError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Append one observation. Duplicates are appended as-is; the
    /// aggregates tolerate them because every record carries its own
    /// weight.
    #[instrument(skip(self, observation), fields(server_id = %observation.server_id))]
    pub async fn append(&self, observation: &Observation) -> ObservationResult<()> {
        sqlx::query(
            "INSERT INTO observations
                 (server_id, status, status_numeric, timestamp, attempts, interval_since_last_check_ms)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&observation.server_id)
        .bind(observation.status.as_str())
        .bind(observation.status_numeric)
        .bind(db::to_millis(&observation.timestamp))
        .bind(observation.attempts)
        .bind(observation.interval_since_last_check_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Weighted uptime percentage over `[start, end)`, 0 when the
    /// window holds no observations.
    #[instrument(skip(self))]
    pub async fn uptime_percentage(
        &self,
        server_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ObservationResult<f64> {
        let row = sqlx::query(
            "SELECT CAST(SUM(status_numeric * interval_since_last_check_ms) AS REAL) * 100.0
                        / SUM(interval_since_last_check_ms) AS uptime
             FROM observations
             WHERE server_id = ? AND timestamp >= ? AND timestamp < ?",
        )
        .bind(server_id)
        .bind(db::to_millis(&start))
        .bind(db::to_millis(&end))
        .fetch_one(&self.pool)
        .await?;

        let uptime: Option<f64> = row.get("uptime");
        Ok(uptime.unwrap_or(0.0))
    }

    /// Single-pass rollup: distinct servers observed in the window,
    /// counts per latest-status, and the overall weighted uptime.
    #[instrument(skip(self))]
    pub async fn fleet_health(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ObservationResult<FleetHealth> {
        let start_millis = db::to_millis(&start);
        let end_millis = db::to_millis(&end);

        // SQLite keeps the row belonging to MAX(timestamp) for bare
        // columns in a grouped select, which is exactly the
        // latest-status-per-server we need.
        let rows = sqlx::query(
            "SELECT server_id, status, MAX(timestamp) AS latest
             FROM observations
             WHERE timestamp >= ? AND timestamp < ?
             GROUP BY server_id",
        )
        .bind(start_millis)
        .bind(end_millis)
        .fetch_all(&self.pool)
        .await?;

        let mut health = FleetHealth {
            total_servers: rows.len(),
            ..Default::default()
        };
        for row in &rows {
            let status_str: String = row.get("status");
            match ServerStatus::parse(&status_str) {
                Some(ServerStatus::Healthy) => health.healthy += 1,
                Some(ServerStatus::Unhealthy) => health.unhealthy += 1,
                Some(ServerStatus::ConfigurationError) => health.configuration_error += 1,
                Some(ServerStatus::NetworkError) => health.network_error += 1,
                _ => health.inactive += 1,
            }
        }

        let row = sqlx::query(
            "SELECT CAST(SUM(status_numeric * interval_since_last_check_ms) AS REAL) * 100.0
                        / SUM(interval_since_last_check_ms) AS uptime
             FROM observations
             WHERE timestamp >= ? AND timestamp < ?",
        )
        .bind(start_millis)
        .bind(end_millis)
        .fetch_one(&self.pool)
        .await?;
        let uptime: Option<f64> = row.get("uptime");
        health.average_uptime_percentage = uptime.unwrap_or(0.0);

        debug!(
            "fleet health over window: {} servers, {:.2}% uptime",
            health.total_servers, health.average_uptime_percentage
        );
        Ok(health)
    }

    /// Observations for one server in `[start, end)`, oldest first.
    #[instrument(skip(self))]
    pub async fn observations_for_server(
        &self,
        server_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ObservationResult<Vec<Observation>> {
        let rows = sqlx::query(
            "SELECT server_id, status, status_numeric, timestamp, attempts,
                    interval_since_last_check_ms
             FROM observations
             WHERE server_id = ? AND timestamp >= ? AND timestamp < ?
             ORDER BY timestamp ASC",
        )
        .bind(server_id)
        .bind(db::to_millis(&start))
        .bind(db::to_millis(&end))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status_str: String = row.get("status");
                let attempts: i64 = row.get("attempts");
                Ok(Observation {
                    server_id: row.get("server_id"),
                    status: ServerStatus::parse(&status_str).ok_or_else(|| {
                        ObservationError::QueryFailed(format!("unknown status: {status_str}"))
                    })?,
                    status_numeric: row.get("status_numeric"),
                    timestamp: db::from_millis(row.get("timestamp")),
                    attempts: attempts as u32,
                    interval_since_last_check_ms: row.get("interval_since_last_check_ms"),
                })
            })
            .collect()
    }
}
