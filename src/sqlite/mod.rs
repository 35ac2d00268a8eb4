// SQLite backend
//
// - config: pool options and the bb8 connection manager
// - params: `RowValues` to rusqlite values
// - query: statement execution, result building and row streaming
// - client: the `DbClient` implementation

pub mod client;
pub mod config;
pub mod params;
pub mod query;

pub use client::SqliteClient;
pub use config::{SqliteManager, SqliteOptions};
