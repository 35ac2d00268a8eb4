use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bb8::Pool;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::mpsc;

use crate::client::{DbClient, EventStream, StreamEvent};
use crate::error::OathError;
use crate::results::QueryResult;
use crate::types::{DatabaseType, RowValues};

use super::config::{SharedSqliteConnection, SqliteManager, SqliteOptions, SqlitePooledConnection};
use super::params::Params;
use super::query;

/// [`DbClient`] over a bb8 pool of rusqlite connections.
pub struct SqliteClient {
    db_path: String,
    pool: RwLock<Option<Pool<SqliteManager>>>,
}

impl SqliteClient {
    /// Build the pool and switch the database to WAL mode.
    ///
    /// # Errors
    /// Returns `OathError` if the pool cannot be created or the first connection fails.
    pub async fn connect(opts: SqliteOptions) -> Result<Self, OathError> {
        let pool = SqliteManager::new(&opts)
            .build_pool(opts.max_connections)
            .await?;
        {
            let conn = pool.get_owned().await.map_err(|e| {
                OathError::ConnectionError(format!("sqlite checkout error: {e}"))
            })?;
            run_blocking(Arc::clone(&*conn), |guard| {
                guard.execute_batch("PRAGMA journal_mode = WAL;")?;
                Ok(())
            })
            .await?;
        }
        tracing::debug!(target: "sql_oath", db_path = %opts.db_path, "sqlite pool ready");
        Ok(Self {
            db_path: opts.db_path,
            pool: RwLock::new(Some(pool)),
        })
    }

    fn pool(&self) -> Result<Pool<SqliteManager>, OathError> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| OathError::ConnectionError("sqlite pool has been closed".into()))
    }

    async fn checkout(&self) -> Result<SqlitePooledConnection, OathError> {
        self.pool()?
            .get_owned()
            .await
            .map_err(|e| OathError::ConnectionError(format!("sqlite checkout error: {e}")))
    }
}

impl fmt::Debug for SqliteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteClient")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DbClient for SqliteClient {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    async fn query(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, OathError> {
        let conn = self.checkout().await?;
        let sql_owned = sql.to_owned();
        let Params(values) = Params::convert(params);
        run_blocking(Arc::clone(&*conn), move |guard| {
            query::run_query(guard, &sql_owned, &values)
        })
        .await
    }

    async fn query_stream(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<EventStream, OathError> {
        let conn = self.checkout().await?;
        let sql_owned = sql.to_owned();
        let Params(values) = Params::convert(params);
        let (demand_tx, mut demand_rx) = mpsc::channel(1);
        let (tx, rx) = mpsc::channel(1);

        tokio::task::spawn_blocking(move || {
            let handle = Arc::clone(&*conn);
            let mut guard = handle.blocking_lock();
            if let Err(err) =
                query::stream_rows(&mut guard, &sql_owned, &values, &mut demand_rx, &tx)
            {
                let _ = tx.blocking_send(Err(err));
            }
            drop(guard);
            drop(conn);
        });

        Ok(demand_stream(demand_tx, rx))
    }

    /// Checked-out connections, including those held by open streams, stay usable until they
    /// are released.
    async fn end(&self) -> Result<(), OathError> {
        let pool = self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match pool {
            Some(pool) => {
                tracing::debug!(
                    target: "sql_oath",
                    connections = pool.state().connections,
                    "closing sqlite pool"
                );
                Ok(())
            }
            None => Err(OathError::ConnectionError(
                "sqlite pool already closed".into(),
            )),
        }
    }
}

/// Ask the producer for one event per poll, so nothing is read before it is wanted.
fn demand_stream(
    demand: mpsc::Sender<()>,
    rx: mpsc::Receiver<Result<StreamEvent, OathError>>,
) -> EventStream {
    stream::unfold((demand, rx), |(demand, mut rx)| async move {
        // a finished producer has dropped its demand receiver; `recv` then drains what is left
        let _ = demand.send(()).await;
        rx.recv().await.map(|item| (item, (demand, rx)))
    })
    .boxed()
}

/// Run synchronous work against a pooled connection on the blocking thread pool.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, OathError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, OathError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await?
}
