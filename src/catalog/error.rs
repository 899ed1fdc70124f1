//! Error kinds for catalog operations

use std::fmt;

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug)]
pub enum CatalogError {
    /// No server with the given id
    ServerNotFound,

    /// Unique-server-name collision on create or update
    NameExists,

    /// Request-level validation failure (first offending field)
    InvalidInput(String),

    /// Catalog store failure
    Store(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::ServerNotFound => write!(f, "server not found"),
            CatalogError::NameExists => write!(f, "server name already exists"),
            CatalogError::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            CatalogError::Store(msg) => write!(f, "store error: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => CatalogError::ServerNotFound,
            other => CatalogError::Store(other.to_string()),
        }
    }
}
