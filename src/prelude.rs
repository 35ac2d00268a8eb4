//! Convenient imports for common functionality.
//!
//! ```rust
//! use sql_oath::prelude::*;
//!
//! let data = Columns::new().with("c", "bobo").with("n", 3_i64);
//! assert_eq!(data.get("n"), Some(&RowValues::Int(3)));
//! ```

pub use crate::client::{DbClient, EventStream, StreamEvent};
pub use crate::config::ConnectionConfig;
pub use crate::deferred::{
    BasicPromises, Capabilities, Deferred, ProgressPromises, Promise, PromiseLibrary, defer,
};
pub use crate::error::OathError;
pub use crate::facade::{Oath, OathBuilder};
pub use crate::logging::LoggerHandle;
pub use crate::results::{FieldDescriptor, QueryResult, Row};
pub use crate::shorthand::{Columns, QueryAndParams};
pub use crate::types::{DatabaseType, RowValues};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PostgresClient, PostgresOptions};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteClient, SqliteOptions};
