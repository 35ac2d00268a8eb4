use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

#[derive(Debug, Error)]
pub enum OathError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// A single value was requested but the query produced no rows.
    #[error("Requested one value but the query returned no rows")]
    EmptyResult,

    /// The configured promise library cannot deliver what the operation needs.
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// The producing side of a deferred went away without settling it.
    #[error("Deferred dropped without being resolved or rejected")]
    Abandoned,
}

impl OathError {
    /// True for errors reported by the underlying database driver.
    #[must_use]
    pub fn is_driver_error(&self) -> bool {
        match self {
            #[cfg(feature = "postgres")]
            OathError::PostgresError(_) => true,
            #[cfg(feature = "sqlite")]
            OathError::SqliteError(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for OathError {
    fn from(err: serde_json::Error) -> Self {
        OathError::ConfigError(format!("invalid configuration: {err}"))
    }
}

impl From<tokio::task::JoinError> for OathError {
    fn from(err: tokio::task::JoinError) -> Self {
        OathError::ExecutionError(format!("spawn_blocking join error: {err}"))
    }
}
