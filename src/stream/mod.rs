//! Durable message streams connecting the pipeline components
//!
//! Two streams carry all cross-component traffic: probe requests
//! (scheduler → workers) and probe results (workers → ingestion), plus
//! the catalog change stream feeding the scheduler. Messages are JSON,
//! keyed by server id; the key fixes the partition so per-server
//! ordering holds within a partition.
//!
//! ## Delivery semantics
//!
//! - **At-least-once**: a reader's position resets to the last
//!   committed offset on restart, so fetched-but-uncommitted messages
//!   are redelivered. Consumers must tolerate duplicates.
//! - **Per-partition order**: offsets are monotonic per
//!   (topic, partition); a single reader drains one partition
//!   sequentially.
//! - **Readers are not shared**: each consumer task owns its reader.
//!   Writers are cheap handles and may be cloned freely.

pub mod broker;
pub mod error;
pub mod sqlite;

pub use broker::{Message, StreamReader, StreamWriter};
pub use error::{StreamError, StreamResult};
pub use sqlite::SqliteBroker;

/// Stable key hash used for partition assignment. The std hasher is
/// seeded per process, which would scatter a key across partitions
/// between restarts, so partitioning uses FNV-1a instead.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    (hash % u64::from(partitions.max(1))) as u32
}
