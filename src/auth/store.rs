//! User, role and scope persistence
//!
//! All queries are runtime-bound; rows are mapped by hand. Unique
//! violations are told apart by the constraint column in the driver
//! message so email and role-name collisions surface as their own
//! error kinds.

use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::{self, SortOrder};

use super::error::{AuthError, AuthResult};
use super::model::{Role, Scope, User, UserUpdate};

/// Sort field for role listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleSort {
    Name,
    #[default]
    CreatedAt,
}

impl RoleSort {
    fn as_sql(&self) -> &'static str {
        match self {
            RoleSort::Name => "name",
            RoleSort::CreatedAt => "created_at",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(RoleSort::Name),
            "created_at" => Some(RoleSort::CreatedAt),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct AuthStore {
    pool: Pool<Sqlite>,
}

fn unique_violation(err: &sqlx::Error, column: &str) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.is_unique_violation() && db.message().contains(column)
    )
}

impl AuthStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn connect(path: &str) -> AuthResult<Self> {
        let pool = db::open_pool(path)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(Self::new(pool))
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    #[instrument(skip(self, password_hash))]
    pub async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
        role_ids: &[String],
    ) -> AuthResult<User> {
        let id = Uuid::new_v4().to_string();
        let now = db::to_millis(&Utc::now());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if unique_violation(&e, "users.email") {
                AuthError::EmailExists
            } else {
                e.into()
            }
        })?;

        for role_id in role_ids {
            sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                .bind(&id)
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("created user {}", id);

        self.get_user_by_id(&id).await
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: &str) -> AuthResult<User> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        let mut user = Self::user_from_row(&row);
        user.roles = self.roles_of_user(&user.id).await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_email(&self, email: &str) -> AuthResult<User> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, first_name, last_name, created_at, updated_at
             FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        let mut user = Self::user_from_row(&row);
        user.roles = self.roles_of_user(&user.id).await?;
        Ok(user)
    }

    /// List users sorted by creation time. Role associations are not
    /// loaded here; fetch a single user for the joined view.
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        email_prefix: &str,
        order: SortOrder,
        limit: i64,
        offset: i64,
    ) -> AuthResult<Vec<User>> {
        let sql = format!(
            "SELECT id, email, password_hash, first_name, last_name, created_at, updated_at
             FROM users WHERE email LIKE ? || '%'
             ORDER BY created_at {} LIMIT ? OFFSET ?",
            order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(email_prefix)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::user_from_row).collect())
    }

    /// Partial update. Role assignments are replaced when
    /// `update.role_ids` is present; a new password hash replaces the
    /// old one when given.
    #[instrument(skip(self, update, password_hash))]
    pub async fn update_user(
        &self,
        id: &str,
        update: &UserUpdate,
        password_hash: Option<&str>,
    ) -> AuthResult<User> {
        let now = db::to_millis(&Utc::now());
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE users SET
                 first_name = COALESCE(?, first_name),
                 last_name = COALESCE(?, last_name),
                 password_hash = COALESCE(?, password_hash),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(password_hash)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }

        if let Some(role_ids) = &update.role_ids {
            for role_id in role_ids {
                sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                    .bind(id)
                    .bind(role_id)
                    .execute(&mut *tx)
                    .await?;
            }
            if role_ids.is_empty() {
                sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                let sql = format!(
                    "DELETE FROM user_roles WHERE user_id = ? AND role_id NOT IN ({})",
                    Self::placeholders(role_ids.len())
                );
                let mut query = sqlx::query(&sql).bind(id);
                for role_id in role_ids {
                    query = query.bind(role_id);
                }
                query.execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;

        self.get_user_by_id(id).await
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Insert the role and its scope associations in one transaction.
    #[instrument(skip(self))]
    pub async fn create_role(
        &self,
        name: &str,
        description: &str,
        scope_ids: &[String],
    ) -> AuthResult<Role> {
        let id = Uuid::new_v4().to_string();
        let now = db::to_millis(&Utc::now());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO roles (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if unique_violation(&e, "roles.name") {
                AuthError::RoleNameExists
            } else {
                e.into()
            }
        })?;

        for scope_id in scope_ids {
            sqlx::query("INSERT OR IGNORE INTO role_scopes (role_id, scope_id) VALUES (?, ?)")
                .bind(&id)
                .bind(scope_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("created role {} ({})", name, id);

        self.get_role(&id).await
    }

    /// Update the role row, add missing scope associations and delete
    /// stale ones, all in one transaction.
    #[instrument(skip(self))]
    pub async fn update_role(
        &self,
        id: &str,
        name: &str,
        description: &str,
        scope_ids: &[String],
    ) -> AuthResult<Role> {
        let now = db::to_millis(&Utc::now());
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE roles SET name = ?, description = ?, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if unique_violation(&e, "roles.name") {
                AuthError::RoleNameExists
            } else {
                e.into()
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(AuthError::RoleNotFound);
        }

        for scope_id in scope_ids {
            sqlx::query("INSERT OR IGNORE INTO role_scopes (role_id, scope_id) VALUES (?, ?)")
                .bind(id)
                .bind(scope_id)
                .execute(&mut *tx)
                .await?;
        }

        if scope_ids.is_empty() {
            sqlx::query("DELETE FROM role_scopes WHERE role_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        } else {
            let sql = format!(
                "DELETE FROM role_scopes WHERE role_id = ? AND scope_id NOT IN ({})",
                Self::placeholders(scope_ids.len())
            );
            let mut query = sqlx::query(&sql).bind(id);
            for scope_id in scope_ids {
                query = query.bind(scope_id);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;

        self.get_role(id).await
    }

    /// Idempotent; association rows cascade.
    #[instrument(skip(self))]
    pub async fn delete_role(&self, id: &str) -> AuthResult<()> {
        sqlx::query("DELETE FROM roles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_role(&self, id: &str) -> AuthResult<Role> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM roles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::RoleNotFound)?;

        let mut role = Self::role_from_row(&row);
        role.scopes = self.scopes_of_role(&role.id).await?;
        Ok(role)
    }

    #[instrument(skip(self))]
    pub async fn list_roles(
        &self,
        name_prefix: &str,
        sort_by: RoleSort,
        order: SortOrder,
        limit: i64,
        offset: i64,
    ) -> AuthResult<Vec<Role>> {
        let sql = format!(
            "SELECT id, name, description, created_at, updated_at
             FROM roles WHERE name LIKE ? || '%'
             ORDER BY {} {} LIMIT ? OFFSET ?",
            sort_by.as_sql(),
            order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(name_prefix)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let mut roles: Vec<Role> = rows.iter().map(Self::role_from_row).collect();
        for role in &mut roles {
            role.scopes = self.scopes_of_role(&role.id).await?;
        }
        Ok(roles)
    }

    pub async fn count_roles_by_ids(&self, ids: &[String]) -> AuthResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM roles WHERE id IN ({})",
            Self::placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let row = query.fetch_one(&self.pool).await?;
        let count: i64 = row.get("cnt");
        Ok(count as usize)
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_scopes(
        &self,
        name_prefix: &str,
        order: SortOrder,
        limit: i64,
        offset: i64,
    ) -> AuthResult<Vec<Scope>> {
        let sql = format!(
            "SELECT id, name, description FROM scopes WHERE name LIKE ? || '%'
             ORDER BY name {} LIMIT ? OFFSET ?",
            order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(name_prefix)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::scope_from_row).collect())
    }

    pub async fn count_scopes_by_ids(&self, ids: &[String]) -> AuthResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM scopes WHERE id IN ({})",
            Self::placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let row = query.fetch_one(&self.pool).await?;
        let count: i64 = row.get("cnt");
        Ok(count as usize)
    }

    /// Scope ids for the given names; used by startup bootstrap.
    pub async fn scope_ids_by_names(&self, names: &[&str]) -> AuthResult<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id FROM scopes WHERE name IN ({})",
            Self::placeholders(names.len())
        );
        let mut query = sqlx::query(&sql);
        for name in names {
            query = query.bind(*name);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    // ------------------------------------------------------------------
    // Row mapping
    // ------------------------------------------------------------------

    async fn roles_of_user(&self, user_id: &str) -> AuthResult<Vec<Role>> {
        let rows = sqlx::query(
            "SELECT r.id, r.name, r.description, r.created_at, r.updated_at
             FROM roles r JOIN user_roles ur ON ur.role_id = r.id
             WHERE ur.user_id = ? ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut roles: Vec<Role> = rows.iter().map(Self::role_from_row).collect();
        for role in &mut roles {
            role.scopes = self.scopes_of_role(&role.id).await?;
        }
        Ok(roles)
    }

    async fn scopes_of_role(&self, role_id: &str) -> AuthResult<Vec<Scope>> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.description
             FROM scopes s JOIN role_scopes rs ON rs.scope_id = s.id
             WHERE rs.role_id = ? ORDER BY s.name",
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::scope_from_row).collect())
    }

    fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
        User {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            roles: Vec::new(),
            created_at: db::from_millis(row.get("created_at")),
            updated_at: db::from_millis(row.get("updated_at")),
        }
    }

    fn role_from_row(row: &sqlx::sqlite::SqliteRow) -> Role {
        Role {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            scopes: Vec::new(),
            created_at: db::from_millis(row.get("created_at")),
            updated_at: db::from_millis(row.get("updated_at")),
        }
    }

    fn scope_from_row(row: &sqlx::sqlite::SqliteRow) -> Scope {
        Scope {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
        }
    }

    fn placeholders(count: usize) -> String {
        vec!["?"; count].join(", ")
    }
}
