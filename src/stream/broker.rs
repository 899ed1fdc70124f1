//! Stream writer/reader trait definitions

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StreamResult;

/// A single message fetched from a stream partition
#[derive(Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub partition: u32,
    /// Monotonic per (topic, partition); pass back to `commit`.
    pub offset: i64,
    pub key: String,
    pub payload: String,
    pub appended_at: DateTime<Utc>,
}

/// Appends messages to a topic. Keys select the partition, so all
/// messages for one key land on one partition in append order.
///
/// Writers are `Clone + Send + Sync` handles; one process-wide writer
/// per topic is the expected shape.
#[async_trait]
pub trait StreamWriter: Send + Sync {
    async fn append(&self, key: &str, payload: String) -> StreamResult<()>;

    /// Append a batch atomically. Either every message is durable or
    /// none is — the scheduler relies on this to keep its
    /// "emit then advance" step all-or-nothing.
    async fn append_all(&self, messages: Vec<(String, String)>) -> StreamResult<()>;
}

/// Consumes one partition of one topic on behalf of a consumer group.
///
/// `fetch` returns the next message after the reader's position and
/// advances the position in memory only; `commit` durably records
/// progress for the group. A reader that fetches without committing
/// re-reads the same messages after restart (at-least-once).
#[async_trait]
pub trait StreamReader: Send + Sync {
    /// Wait for and return the next message on this partition.
    async fn fetch(&mut self) -> StreamResult<Message>;

    /// Durably mark every offset up to and including `offset` as
    /// processed for this group.
    async fn commit(&mut self, offset: i64) -> StreamResult<()>;
}
