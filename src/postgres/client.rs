use std::fmt;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use bb8::Pool;
use futures_util::StreamExt;
use futures_util::stream;

use crate::client::{DbClient, EventStream, StreamEvent};
use crate::error::OathError;
use crate::results::QueryResult;
use crate::translation::question_to_dollar;
use crate::types::{DatabaseType, RowValues};

use super::config::{PgManager, PostgresOptions};
use super::params::as_refs;
use super::query::{build_result_from_statement, extract_row, fields_of};

/// [`DbClient`] over a bb8 pool of `tokio-postgres` clients.
///
/// `?` placeholders are rewritten to `$n` before each statement is prepared.
pub struct PostgresClient {
    pool: RwLock<Option<Pool<PgManager>>>,
}

impl PostgresClient {
    /// # Errors
    /// Returns `OathError` if the pool cannot be created.
    pub async fn connect(opts: PostgresOptions) -> Result<Self, OathError> {
        Self::from_config(opts.to_pg_config(), opts.max_connections).await
    }

    /// Build a client from a driver configuration, e.g. one parsed from a connection URL.
    ///
    /// # Errors
    /// Returns `OathError` if the pool cannot be created.
    pub async fn from_config(
        config: tokio_postgres::Config,
        max_connections: u32,
    ) -> Result<Self, OathError> {
        let pool = PgManager::new(config).build_pool(max_connections).await?;
        tracing::debug!(target: "sql_oath", "postgres pool ready");
        Ok(Self {
            pool: RwLock::new(Some(pool)),
        })
    }

    fn pool(&self) -> Result<Pool<PgManager>, OathError> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| OathError::ConnectionError("postgres pool has been closed".into()))
    }
}

impl fmt::Debug for PostgresClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresClient").finish_non_exhaustive()
    }
}

#[async_trait]
impl DbClient for PostgresClient {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    async fn query(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, OathError> {
        let pool = self.pool()?;
        let client = pool
            .get()
            .await
            .map_err(|e| OathError::ConnectionError(format!("postgres checkout error: {e}")))?;
        let sql = question_to_dollar(sql);
        let stmt = client.prepare(&sql).await?;
        let refs = as_refs(params);

        if stmt.columns().is_empty() {
            let affected = client.execute(&stmt, &refs).await?;
            return Ok(QueryResult::from_affected(affected, None));
        }
        let rows = client.query(&stmt, &refs).await?;
        build_result_from_statement(&stmt, &rows)
    }

    async fn query_stream(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<EventStream, OathError> {
        let client = self
            .pool()?
            .get_owned()
            .await
            .map_err(|e| OathError::ConnectionError(format!("postgres checkout error: {e}")))?;
        let sql = question_to_dollar(sql);
        let stmt = client.prepare(&sql).await?;
        let fields = fields_of(&stmt);
        let template = QueryResult::with_fields(fields.clone(), 0);
        let rows = client.query_raw(&stmt, params.iter()).await?;
        // rows are decoded only as the stream is polled

        let head = stream::once(async move { Ok(StreamEvent::Fields(fields)) });
        // the pooled client stays checked out until the stream is dropped
        let body = stream::unfold(
            (Box::pin(rows), client, template),
            |(mut rows, client, template)| async move {
                let item = match rows.next().await? {
                    Ok(row) => {
                        extract_row(&row).map(|values| StreamEvent::Row(template.make_row(values)))
                    }
                    Err(e) => Err(OathError::from(e)),
                };
                Some((item, (rows, client, template)))
            },
        );
        Ok(head.chain(body).boxed())
    }

    /// An open stream keeps its client until the stream is dropped.
    async fn end(&self) -> Result<(), OathError> {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pool {
            Some(_) => Ok(()),
            None => Err(OathError::ConnectionError(
                "postgres pool already closed".into(),
            )),
        }
    }
}
