//! SQLite-backed durable stream broker
//!
//! Topics are rows in a shared message log keyed by
//! `(topic, partition, offset)`; consumer-group progress lives in a
//! separate offsets table. WAL mode keeps concurrent readers cheap
//! while writers append.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, trace};

use super::broker::{Message, StreamReader, StreamWriter};
use super::error::{StreamError, StreamResult};
use super::partition_for;

/// How long an idle reader sleeps before polling the log again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to the broker database. Cheap to clone; writers and readers
/// are derived from it.
#[derive(Clone)]
pub struct SqliteBroker {
    pool: Pool<Sqlite>,
}

impl SqliteBroker {
    /// Open (creating if missing) the broker database and run
    /// migrations.
    #[instrument(skip_all)]
    pub async fn connect(path: impl AsRef<Path>) -> StreamResult<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        info!("opening stream broker at: {}", path_str);

        let options = SqliteConnectOptions::new()
            .filename(&path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StreamError::ConnectionFailed(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StreamError::MigrationFailed(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Reuse an existing pool (single-file deployments share one pool
    /// between the broker and the stores).
    pub fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn writer(&self, topic: &str, partitions: u32) -> SqliteStreamWriter {
        SqliteStreamWriter {
            pool: self.pool.clone(),
            topic: topic.to_string(),
            partitions,
        }
    }

    pub fn reader(&self, topic: &str, partition: u32, group: &str) -> SqliteStreamReader {
        SqliteStreamReader {
            pool: self.pool.clone(),
            topic: topic.to_string(),
            partition,
            group: group.to_string(),
            position: None,
        }
    }
}

#[derive(Clone)]
pub struct SqliteStreamWriter {
    pool: Pool<Sqlite>,
    topic: String,
    partitions: u32,
}

impl SqliteStreamWriter {
    async fn append_tx(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        topic: &str,
        partition: u32,
        key: &str,
        payload: &str,
    ) -> StreamResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(msg_offset) + 1, 0) AS next
             FROM stream_messages WHERE topic = ? AND partition_id = ?",
        )
        .bind(topic)
        .bind(partition)
        .fetch_one(&mut **tx)
        .await?;
        let next: i64 = row.get("next");

        sqlx::query(
            "INSERT INTO stream_messages (topic, partition_id, msg_offset, key, payload, appended_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(topic)
        .bind(partition)
        .bind(next)
        .bind(key)
        .bind(payload)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&mut **tx)
        .await?;

        Ok(next)
    }
}

#[async_trait]
impl StreamWriter for SqliteStreamWriter {
    #[instrument(skip(self, payload), fields(topic = %self.topic, key))]
    async fn append(&self, key: &str, payload: String) -> StreamResult<()> {
        let partition = partition_for(key, self.partitions);
        let mut tx = self.pool.begin().await?;
        let offset = Self::append_tx(&mut tx, &self.topic, partition, key, &payload).await?;
        tx.commit().await?;
        trace!("appended {}/{}@{}", self.topic, partition, offset);
        Ok(())
    }

    #[instrument(skip(self, messages), fields(topic = %self.topic, count = messages.len()))]
    async fn append_all(&self, messages: Vec<(String, String)>) -> StreamResult<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for (key, payload) in &messages {
            let partition = partition_for(key, self.partitions);
            Self::append_tx(&mut tx, &self.topic, partition, key, payload).await?;
        }
        tx.commit().await?;
        debug!("appended batch of {}", messages.len());
        Ok(())
    }
}

pub struct SqliteStreamReader {
    pool: Pool<Sqlite>,
    topic: String,
    partition: u32,
    group: String,
    /// Offset of the last fetched message; `None` until the committed
    /// offset has been loaded.
    position: Option<i64>,
}

impl SqliteStreamReader {
    async fn committed(&self) -> StreamResult<i64> {
        let row = sqlx::query(
            "SELECT committed FROM stream_offsets
             WHERE topic = ? AND partition_id = ? AND group_id = ?",
        )
        .bind(&self.topic)
        .bind(self.partition)
        .bind(&self.group)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("committed")).unwrap_or(-1))
    }
}

#[async_trait]
impl StreamReader for SqliteStreamReader {
    #[instrument(skip(self), fields(topic = %self.topic, partition = self.partition))]
    async fn fetch(&mut self) -> StreamResult<Message> {
        let after = match self.position {
            Some(position) => position,
            None => {
                let committed = self.committed().await?;
                self.position = Some(committed);
                committed
            }
        };

        loop {
            let row = sqlx::query(
                "SELECT msg_offset, key, payload, appended_at FROM stream_messages
                 WHERE topic = ? AND partition_id = ? AND msg_offset > ?
                 ORDER BY msg_offset ASC LIMIT 1",
            )
            .bind(&self.topic)
            .bind(self.partition)
            .bind(after)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                let offset: i64 = row.get("msg_offset");
                let appended_millis: i64 = row.get("appended_at");
                self.position = Some(offset);

                return Ok(Message {
                    topic: self.topic.clone(),
                    partition: self.partition,
                    offset,
                    key: row.get("key"),
                    payload: row.get("payload"),
                    appended_at: DateTime::from_timestamp_millis(appended_millis)
                        .unwrap_or_else(chrono::Utc::now),
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    #[instrument(skip(self), fields(topic = %self.topic, partition = self.partition, offset))]
    async fn commit(&mut self, offset: i64) -> StreamResult<()> {
        sqlx::query(
            "INSERT INTO stream_offsets (topic, partition_id, group_id, committed)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (topic, partition_id, group_id)
             DO UPDATE SET committed = excluded.committed",
        )
        .bind(&self.topic)
        .bind(self.partition)
        .bind(&self.group)
        .bind(offset)
        .execute(&self.pool)
        .await?;

        trace!("committed {}/{}@{}", self.topic, self.partition, offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn test_broker() -> (tempfile::TempDir, SqliteBroker) {
        let dir = tempfile::tempdir().unwrap();
        let broker = SqliteBroker::connect(dir.path().join("streams.db"))
            .await
            .unwrap();
        (dir, broker)
    }

    #[tokio::test]
    async fn append_then_fetch_round_trip() {
        let (_dir, broker) = test_broker().await;
        let writer = broker.writer("probe-requests", 1);
        let mut reader = broker.reader("probe-requests", 0, "g1");

        writer.append("srv-1", "hello".to_string()).await.unwrap();

        let msg = reader.fetch().await.unwrap();
        assert_eq!(msg.key, "srv-1");
        assert_eq!(msg.payload, "hello");
        assert_eq!(msg.offset, 0);
    }

    #[tokio::test]
    async fn uncommitted_messages_are_redelivered() {
        let (_dir, broker) = test_broker().await;
        let writer = broker.writer("t", 1);
        writer.append("k", "one".to_string()).await.unwrap();
        writer.append("k", "two".to_string()).await.unwrap();

        let mut reader = broker.reader("t", 0, "g1");
        let first = reader.fetch().await.unwrap();
        assert_eq!(first.payload, "one");
        reader.commit(first.offset).await.unwrap();
        // Fetch "two" but never commit it.
        assert_eq!(reader.fetch().await.unwrap().payload, "two");
        drop(reader);

        // A fresh reader resumes from the committed offset.
        let mut reader = broker.reader("t", 0, "g1");
        assert_eq!(reader.fetch().await.unwrap().payload, "two");
    }

    #[tokio::test]
    async fn groups_track_progress_independently() {
        let (_dir, broker) = test_broker().await;
        let writer = broker.writer("t", 1);
        writer.append("k", "m".to_string()).await.unwrap();

        let mut a = broker.reader("t", 0, "group-a");
        let msg = a.fetch().await.unwrap();
        a.commit(msg.offset).await.unwrap();

        let mut b = broker.reader("t", 0, "group-b");
        assert_eq!(b.fetch().await.unwrap().payload, "m");
    }

    #[tokio::test]
    async fn same_key_stays_on_one_partition_in_order() {
        let (_dir, broker) = test_broker().await;
        let writer = broker.writer("t", 4);
        for i in 0..5 {
            writer.append("srv-9", format!("m{i}")).await.unwrap();
        }

        let partition = partition_for("srv-9", 4);
        let mut reader = broker.reader("t", partition, "g");
        for i in 0..5 {
            assert_eq!(reader.fetch().await.unwrap().payload, format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn fetch_blocks_until_a_message_arrives() {
        let (_dir, broker) = test_broker().await;
        let mut reader = broker.reader("t", 0, "g");

        let pending = tokio::time::timeout(Duration::from_millis(50), reader.fetch()).await;
        assert!(pending.is_err());

        let writer = broker.writer("t", 1);
        writer.append("k", "late".to_string()).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(2), reader.fetch())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload, "late");
    }

    #[tokio::test]
    async fn batch_append_preserves_key_order() {
        let (_dir, broker) = test_broker().await;
        let writer = broker.writer("t", 4);
        writer
            .append_all(vec![
                ("a".to_string(), "a0".to_string()),
                ("b".to_string(), "b0".to_string()),
                ("a".to_string(), "a1".to_string()),
            ])
            .await
            .unwrap();

        // "b" may share the partition; only the relative order of the
        // "a" messages is guaranteed.
        let mut reader = broker.reader("t", partition_for("a", 4), "g");
        let mut seen = Vec::new();
        while seen.len() < 2 {
            let msg = reader.fetch().await.unwrap();
            if msg.key == "a" {
                seen.push(msg.payload);
            }
        }
        assert_eq!(seen, vec!["a0", "a1"]);
    }
}
