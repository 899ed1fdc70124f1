//! Refresh-session store
//!
//! One entry per user: the `jti` of the currently-valid refresh token,
//! with a TTL set at login. The entry is the single source of truth
//! for "this refresh chain is still live"; replacing it supersedes the
//! previous session atomically.
//!
//! Two backends: Redis for multi-node deployments and an in-process
//! map for tests and single-node use. Both honor the rotation
//! contract: `put` with `ttl = None` replaces the stored `jti` while
//! keeping the original expiry — refreshing never slides the session.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use super::error::AuthResult;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store `jti` for the user. `ttl = Some(d)` starts a new session
    /// expiring after `d`; `ttl = None` keeps the existing expiry
    /// (rotation).
    async fn put(&self, user_id: &str, jti: &str, ttl: Option<Duration>) -> AuthResult<()>;

    /// Currently-valid `jti`, or `None` when no session is live.
    async fn get(&self, user_id: &str) -> AuthResult<Option<String>>;

    async fn delete(&self, user_id: &str) -> AuthResult<()>;
}

fn session_key(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// In-process session store. Expiry is checked lazily on read.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, user_id: &str, jti: &str, ttl: Option<Duration>) -> AuthResult<()> {
        let key = session_key(user_id);
        let mut entries = self.entries.lock().await;
        let expiry = match ttl {
            Some(ttl) => Some(Instant::now() + ttl),
            // Keep the previous expiry; an entry created this way
            // (no prior session) never expires on its own.
            None => entries.get(&key).and_then(|(_, expiry)| *expiry),
        };
        entries.insert(key, (jti.to_string(), expiry));
        Ok(())
    }

    async fn get(&self, user_id: &str) -> AuthResult<Option<String>> {
        let key = session_key(user_id);
        let mut entries = self.entries.lock().await;
        let expired = matches!(
            entries.get(&key),
            Some((_, Some(expiry))) if *expiry <= Instant::now()
        );
        if expired {
            entries.remove(&key);
            return Ok(None);
        }
        Ok(entries.get(&key).map(|(jti, _)| jti.clone()))
    }

    async fn delete(&self, user_id: &str) -> AuthResult<()> {
        self.entries.lock().await.remove(&session_key(user_id));
        Ok(())
    }
}

/// Redis-backed session store. `SET ... EX` starts a session,
/// `SET ... KEEPTTL` rotates the `jti` without touching the expiry.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisSessionStore {
    pub async fn connect(url: &str) -> AuthResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    #[instrument(skip(self, jti))]
    async fn put(&self, user_id: &str, jti: &str, ttl: Option<Duration>) -> AuthResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(session_key(user_id)).arg(jti);
        match ttl {
            Some(ttl) => {
                cmd.arg("EX").arg(ttl.as_secs().max(1));
            }
            None => {
                cmd.arg("KEEPTTL");
            }
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, user_id: &str) -> AuthResult<Option<String>> {
        let mut conn = self.conn.clone();
        let jti: Option<String> = redis::cmd("GET")
            .arg(session_key(user_id))
            .query_async(&mut conn)
            .await?;
        Ok(jti)
    }

    #[instrument(skip(self))]
    async fn delete(&self, user_id: &str) -> AuthResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(session_key(user_id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
