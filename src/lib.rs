//! Deferred SQL execution over pooled `SQLite` and `PostgreSQL` connections.
//!
//! [`Oath`] hands back a [`Promise`] for every statement, streams rows through progress
//! notifications, and offers `add` / `set` / `get` / `delete` shorthands that build parameterized
//! statements from column maps.

pub mod client;
pub mod config;
pub mod deferred;
pub mod error;
pub mod facade;
pub mod logging;
pub mod prelude;
pub mod results;
pub mod shorthand;
pub mod translation;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use client::{DbClient, EventStream, StreamEvent};
pub use config::ConnectionConfig;
pub use deferred::{
    BasicPromises, Capabilities, Deferred, ProgressPermit, ProgressPromises, Promise,
    PromiseLibrary, defer,
};
pub use error::OathError;
pub use facade::{Oath, OathBuilder};
pub use logging::{LOG_PREFIX, Logger, LoggerHandle};
pub use results::{FieldDescriptor, QueryResult, Row};
pub use shorthand::{Columns, QueryAndParams};
pub use types::{DatabaseType, RowValues};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresClient, PostgresOptions};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteClient, SqliteOptions};
