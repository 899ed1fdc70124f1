//! Error types for stream operations

use std::fmt;

/// Result type alias for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors that can occur while appending to or consuming a stream
#[derive(Debug)]
pub enum StreamError {
    /// Broker connection failed
    ConnectionFailed(String),

    /// Append or fetch query failed
    QueryFailed(String),

    /// Migration failed
    MigrationFailed(String),

    /// The reader was closed while waiting for messages
    Closed,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::ConnectionFailed(msg) => {
                write!(f, "failed to connect to stream broker: {}", msg)
            }
            StreamError::QueryFailed(msg) => write!(f, "stream query failed: {}", msg),
            StreamError::MigrationFailed(msg) => write!(f, "stream migration failed: {}", msg),
            StreamError::Closed => write!(f, "stream reader closed"),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<sqlx::Error> for StreamError {
    fn from(err: sqlx::Error) -> Self {
        StreamError::QueryFailed(err.to_string())
    }
}
