use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::OathError;
use crate::results::{FieldDescriptor, QueryResult, Row};
use crate::types::{DatabaseType, RowValues};

/// One event of a streaming query.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Column metadata; sent once, before any row
    Fields(Vec<FieldDescriptor>),
    /// One result row, in server order
    Row(Row),
}

/// Stream of events for one query. An `Err` item is the error event; the end of the stream is
/// the end event.
pub type EventStream = BoxStream<'static, Result<StreamEvent, OathError>>;

/// The database client behind a facade.
///
/// Implementations own their pool. `?` placeholders in `sql` correspond in order to `params`.
#[async_trait]
pub trait DbClient: Send + Sync + fmt::Debug {
    fn database_type(&self) -> DatabaseType;

    /// Run one statement and collect its full result.
    async fn query(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, OathError>;

    /// Run one statement, yielding rows as they arrive.
    async fn query_stream(&self, sql: &str, params: &[RowValues])
    -> Result<EventStream, OathError>;

    /// Close the pool. Later calls fail with [`OathError::ConnectionError`].
    ///
    /// Connections already checked out, such as one held by an open stream, are not interrupted;
    /// they close when released.
    async fn end(&self) -> Result<(), OathError>;
}
