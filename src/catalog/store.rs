//! Server catalog persistence
//!
//! New servers start `pending` with their first check due one second
//! after creation. `server_name` is globally unique; collisions map to
//! `NameExists` so handlers can answer 409 without string matching.

use std::net::Ipv4Addr;

use chrono::{Duration, Utc};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::{self, SortOrder};
use crate::{Server, ServerSpec, ServerStatus};

use super::error::{CatalogError, CatalogResult};

/// Import batches are written in chunks of this many rows, each chunk
/// atomic.
const IMPORT_CHUNK_SIZE: usize = 1000;

/// Sort field for server listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerSort {
    ServerName,
    #[default]
    CreatedAt,
}

impl ServerSort {
    fn as_sql(&self) -> &'static str {
        match self {
            ServerSort::ServerName => "server_name",
            ServerSort::CreatedAt => "created_at",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "server_name" => Some(ServerSort::ServerName),
            "created_at" => Some(ServerSort::CreatedAt),
            _ => None,
        }
    }
}

/// Validated listing parameters.
#[derive(Debug, Clone, Default)]
pub struct ServerQuery {
    pub name_prefix: String,
    pub status: Option<ServerStatus>,
    pub sort_by: ServerSort,
    pub order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

/// Partial server update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ServerPatch {
    pub server_name: Option<String>,
    pub ipv4: Option<Ipv4Addr>,
    pub port: Option<u16>,
    pub health_endpoint: Option<String>,
    pub health_check_interval: Option<u32>,
}

#[derive(Clone)]
pub struct CatalogStore {
    pool: Pool<Sqlite>,
}

fn name_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if db.is_unique_violation() && db.message().contains("servers.server_name")
    )
}

impl CatalogStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn connect(path: &str) -> CatalogResult<Self> {
        let pool = db::open_pool(path)
            .await
            .map_err(|e| CatalogError::Store(e.to_string()))?;
        Ok(Self::new(pool))
    }

    #[instrument(skip(self, spec), fields(server_name = %spec.server_name))]
    pub async fn create_server(&self, spec: &ServerSpec) -> CatalogResult<Server> {
        validate_spec(spec)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let next_check = now + Duration::seconds(1);

        sqlx::query(
            "INSERT INTO servers
                 (id, server_name, status, ipv4, port, health_endpoint,
                  health_check_interval, next_health_check_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&spec.server_name)
        .bind(ServerStatus::Pending.as_str())
        .bind(spec.ipv4.to_string())
        .bind(spec.port)
        .bind(&spec.health_endpoint)
        .bind(spec.health_check_interval)
        .bind(db::to_millis(&next_check))
        .bind(db::to_millis(&now))
        .bind(db::to_millis(&now))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if name_violation(&e) {
                CatalogError::NameExists
            } else {
                e.into()
            }
        })?;

        debug!("created server {}", id);
        self.get_server(&id).await
    }

    /// Batched insert, `ON CONFLICT DO NOTHING` by name. Returns the
    /// inserted servers and the names that were skipped.
    #[instrument(skip(self, specs), fields(count = specs.len()))]
    pub async fn import_servers(
        &self,
        specs: &[ServerSpec],
    ) -> CatalogResult<(Vec<Server>, Vec<String>)> {
        let mut inserted = Vec::new();
        let mut skipped = Vec::new();

        for chunk in specs.chunks(IMPORT_CHUNK_SIZE) {
            let mut tx = self.pool.begin().await?;
            let mut chunk_ids = Vec::new();

            for spec in chunk {
                if validate_spec(spec).is_err() {
                    skipped.push(spec.server_name.clone());
                    continue;
                }

                let id = Uuid::new_v4().to_string();
                let now = Utc::now();
                let next_check = now + Duration::seconds(1);

                let row = sqlx::query(
                    "INSERT INTO servers
                         (id, server_name, status, ipv4, port, health_endpoint,
                          health_check_interval, next_health_check_at, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT (server_name) DO NOTHING
                     RETURNING id",
                )
                .bind(&id)
                .bind(&spec.server_name)
                .bind(ServerStatus::Pending.as_str())
                .bind(spec.ipv4.to_string())
                .bind(spec.port)
                .bind(&spec.health_endpoint)
                .bind(spec.health_check_interval)
                .bind(db::to_millis(&next_check))
                .bind(db::to_millis(&now))
                .bind(db::to_millis(&now))
                .fetch_optional(&mut *tx)
                .await?;

                match row {
                    Some(row) => chunk_ids.push(row.get::<String, _>("id")),
                    None => skipped.push(spec.server_name.clone()),
                }
            }

            tx.commit().await?;

            for id in chunk_ids {
                inserted.push(self.get_server(&id).await?);
            }
        }

        debug!(
            "import complete: {} inserted, {} skipped",
            inserted.len(),
            skipped.len()
        );
        Ok((inserted, skipped))
    }

    #[instrument(skip(self))]
    pub async fn get_server(&self, id: &str) -> CatalogResult<Server> {
        let row = sqlx::query(
            "SELECT id, server_name, status, ipv4, port, health_endpoint,
                    health_check_interval, next_health_check_at, created_at, updated_at
             FROM servers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CatalogError::ServerNotFound)?;

        Self::server_from_row(&row)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_server(&self, id: &str, patch: &ServerPatch) -> CatalogResult<Server> {
        if let Some(port) = patch.port {
            if port == 0 {
                return Err(CatalogError::InvalidInput(
                    "the port field must be greater than or equal to 1".to_string(),
                ));
            }
        }
        if patch.health_check_interval == Some(0) {
            return Err(CatalogError::InvalidInput(
                "the health_check_interval field must be greater than or equal to 1".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE servers SET
                 server_name = COALESCE(?, server_name),
                 ipv4 = COALESCE(?, ipv4),
                 port = COALESCE(?, port),
                 health_endpoint = COALESCE(?, health_endpoint),
                 health_check_interval = COALESCE(?, health_check_interval),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(patch.server_name.as_deref())
        .bind(patch.ipv4.map(|ip| ip.to_string()))
        .bind(patch.port)
        .bind(patch.health_endpoint.as_deref())
        .bind(patch.health_check_interval)
        .bind(db::to_millis(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if name_violation(&e) {
                CatalogError::NameExists
            } else {
                e.into()
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::ServerNotFound);
        }

        self.get_server(id).await
    }

    /// Status-only update used by the ingestion consumer; scheduling
    /// fields are untouched.
    #[instrument(skip(self))]
    pub async fn update_status(&self, id: &str, status: ServerStatus) -> CatalogResult<()> {
        sqlx::query("UPDATE servers SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(db::to_millis(&Utc::now()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Idempotent. Returns whether a row was actually removed so the
    /// service can decide whether to emit a delete event.
    #[instrument(skip(self))]
    pub async fn delete_server(&self, id: &str) -> CatalogResult<bool> {
        let result = sqlx::query("DELETE FROM servers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, query))]
    pub async fn list_servers(&self, query: &ServerQuery) -> CatalogResult<Vec<Server>> {
        let mut sql = String::from(
            "SELECT id, server_name, status, ipv4, port, health_endpoint,
                    health_check_interval, next_health_check_at, created_at, updated_at
             FROM servers WHERE server_name LIKE ? || '%'",
        );
        if query.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        sql.push_str(&format!(
            " ORDER BY {} {} LIMIT ? OFFSET ?",
            query.sort_by.as_sql(),
            query.order.as_sql()
        ));

        let mut q = sqlx::query(&sql).bind(&query.name_prefix);
        if let Some(status) = query.status {
            q = q.bind(status.as_str());
        }
        let rows = q
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::server_from_row).collect()
    }

    fn server_from_row(row: &sqlx::sqlite::SqliteRow) -> CatalogResult<Server> {
        let status_str: String = row.get("status");
        let ipv4_str: String = row.get("ipv4");
        let port: i64 = row.get("port");
        let interval: i64 = row.get("health_check_interval");

        Ok(Server {
            id: row.get("id"),
            server_name: row.get("server_name"),
            status: ServerStatus::parse(&status_str)
                .ok_or_else(|| CatalogError::Store(format!("unknown status: {status_str}")))?,
            ipv4: ipv4_str
                .parse()
                .map_err(|_| CatalogError::Store(format!("bad ipv4 in store: {ipv4_str}")))?,
            port: port as u16,
            health_endpoint: row.get("health_endpoint"),
            health_check_interval: interval as u32,
            next_health_check_at: db::from_millis(row.get("next_health_check_at")),
            created_at: db::from_millis(row.get("created_at")),
            updated_at: db::from_millis(row.get("updated_at")),
        })
    }
}

fn validate_spec(spec: &ServerSpec) -> CatalogResult<()> {
    if spec.server_name.trim().is_empty() {
        return Err(CatalogError::InvalidInput(
            "the server_name field is required".to_string(),
        ));
    }
    if spec.port == 0 {
        return Err(CatalogError::InvalidInput(
            "the port field must be greater than or equal to 1".to_string(),
        ));
    }
    if spec.health_check_interval == 0 {
        return Err(CatalogError::InvalidInput(
            "the health_check_interval field must be greater than or equal to 1".to_string(),
        ));
    }
    Ok(())
}
