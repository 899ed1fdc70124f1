//! Scheduler-owned replica of the probe-relevant server fields
//!
//! Fed by the change-event consumer, scanned by the tick loop. The
//! `next_check_at` column is the single source of truth for "when is
//! this server due"; advancement is computed inside the store (from
//! the database clock) so N stateless scheduler replicas never drift
//! apart.

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, instrument};

use crate::db;
use crate::stream::{StreamError, StreamResult};
use crate::{ChangeImage, ProbeRequest};

#[derive(Clone)]
pub struct ScheduleStore {
    pool: Pool<Sqlite>,
}

impl ScheduleStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn connect(path: &str) -> StreamResult<Self> {
        let pool = db::open_pool(path)
            .await
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Apply a create or update image. A fresh row becomes due one
    /// second from now; an existing row keeps its outstanding
    /// `next_check_at` — an interval change never rewinds the next
    /// check earlier than the one already scheduled.
    #[instrument(skip(self, image), fields(server_id = %image.id))]
    pub async fn upsert(&self, image: &ChangeImage) -> StreamResult<()> {
        let (Some(ipv4), Some(port), Some(interval), Some(endpoint)) = (
            image.ipv4,
            image.port,
            image.health_check_interval,
            image.health_endpoint.as_ref(),
        ) else {
            return Err(StreamError::QueryFailed(format!(
                "change image for {} is missing probe fields",
                image.id
            )));
        };

        let first_check = Utc::now() + Duration::seconds(1);

        sqlx::query(
            "INSERT INTO schedule (id, ipv4, port, health_endpoint, health_check_interval, next_check_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                 ipv4 = excluded.ipv4,
                 port = excluded.port,
                 health_endpoint = excluded.health_endpoint,
                 health_check_interval = excluded.health_check_interval",
        )
        .bind(&image.id)
        .bind(ipv4.to_string())
        .bind(port)
        .bind(interval)
        .bind(endpoint)
        .bind(db::to_millis(&first_check))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, server_id: &str) -> StreamResult<()> {
        sqlx::query("DELETE FROM schedule WHERE id = ?")
            .bind(server_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Servers whose next check time has elapsed.
    #[instrument(skip(self))]
    pub async fn due_servers(&self, now: DateTime<Utc>) -> StreamResult<Vec<ProbeRequest>> {
        let rows = sqlx::query(
            "SELECT id, ipv4, port, health_endpoint, health_check_interval
             FROM schedule WHERE next_check_at <= ?",
        )
        .bind(db::to_millis(&now))
        .fetch_all(&self.pool)
        .await?;

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let ipv4_str: String = row.get("ipv4");
            let port: i64 = row.get("port");
            let interval: i64 = row.get("health_check_interval");
            due.push(ProbeRequest {
                id: row.get("id"),
                ipv4: ipv4_str.parse().map_err(|_| {
                    StreamError::QueryFailed(format!("bad ipv4 in schedule: {ipv4_str}"))
                })?,
                port: port as u16,
                health_endpoint: row.get("health_endpoint"),
                health_check_interval: interval as u32,
            });
        }
        Ok(due)
    }

    /// Bulk-advance the selected rows:
    /// `next_check_at = store_now + interval`. The store clock, not
    /// the caller's, decides `now`.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn advance(&self, ids: &[String]) -> StreamResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE schedule
             SET next_check_at = CAST(strftime('%s', 'now') AS INTEGER) * 1000
                                 + health_check_interval * 1000
             WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(&self.pool).await?;

        debug!("advanced {} schedule rows", ids.len());
        Ok(())
    }
}
