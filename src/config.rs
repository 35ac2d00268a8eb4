use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::DbClient;
use crate::error::OathError;

#[cfg(feature = "postgres")]
use crate::postgres::{PostgresClient, PostgresOptions};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteClient, SqliteOptions};

/// Which backend to connect to, and how.
///
/// ```rust
/// use sql_oath::prelude::*;
///
/// let cfg = ConnectionConfig::from_json(
///     r#"{"backend": "sqlite", "db_path": "app.db", "max_connections": 2}"#,
/// )?;
/// assert!(matches!(cfg, ConnectionConfig::Sqlite(ref o) if o.max_connections == 2));
/// # Ok::<(), OathError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ConnectionConfig {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteOptions),
    #[cfg(feature = "postgres")]
    Postgres(PostgresOptions),
}

impl ConnectionConfig {
    /// # Errors
    /// Returns [`OathError::ConfigError`] when the JSON does not describe a known backend.
    pub fn from_json(json: &str) -> Result<Self, OathError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Create the pool and the client for this configuration.
    ///
    /// # Errors
    /// Returns `OathError` if the pool cannot be created.
    pub async fn connect(self) -> Result<Arc<dyn DbClient>, OathError> {
        match self {
            #[cfg(feature = "sqlite")]
            ConnectionConfig::Sqlite(opts) => Ok(Arc::new(SqliteClient::connect(opts).await?)),
            #[cfg(feature = "postgres")]
            ConnectionConfig::Postgres(opts) => {
                Ok(Arc::new(PostgresClient::connect(opts).await?))
            }
            #[allow(unreachable_patterns)]
            _ => Err(OathError::ConfigError(
                "This database type is not enabled in the current build".to_string(),
            )),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<SqliteOptions> for ConnectionConfig {
    fn from(opts: SqliteOptions) -> Self {
        ConnectionConfig::Sqlite(opts)
    }
}

#[cfg(feature = "postgres")]
impl From<PostgresOptions> for ConnectionConfig {
    fn from(opts: PostgresOptions) -> Self {
        ConnectionConfig::Postgres(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "sqlite")]
    #[test]
    fn sqlite_defaults_fill_in() {
        let cfg = ConnectionConfig::from_json(r#"{"backend": "sqlite", "db_path": "x.db"}"#)
            .unwrap();
        assert_eq!(cfg, ConnectionConfig::Sqlite(SqliteOptions::new("x.db")));
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn postgres_options_parse() {
        let cfg = ConnectionConfig::from_json(
            r#"{"backend": "postgres", "host": "db", "user": "app", "password": "pw", "database": "main"}"#,
        )
        .unwrap();
        let expected = PostgresOptions::new("db", "app", "main").with_password("pw");
        assert_eq!(cfg, ConnectionConfig::Postgres(expected));
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        assert!(matches!(
            ConnectionConfig::from_json(r#"{"backend": "oracle"}"#),
            Err(OathError::ConfigError(_))
        ));
    }
}
