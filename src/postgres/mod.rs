// Postgres backend
//
// - config: pool options and the bb8 connection manager
// - params: `ToSql` for `RowValues`
// - query: result extraction and building
// - client: the `DbClient` implementation

pub mod client;
pub mod config;
pub mod params;
pub mod query;

pub use client::PostgresClient;
pub use config::{PgManager, PostgresOptions};
