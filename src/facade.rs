use std::future::Future;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::runtime::Handle;

use crate::client::{DbClient, StreamEvent};
use crate::config::ConnectionConfig;
use crate::deferred::{Deferred, Promise, ProgressPromises, PromiseLibrary, defer};
use crate::error::OathError;
use crate::logging::{LoggerHandle, LoggerRegistry};
use crate::results::{FieldDescriptor, QueryResult, Row};
use crate::shorthand::{Columns, build_delete, build_insert, build_select_one, build_upsert};
use crate::types::{DatabaseType, RowValues};

/// Deferred query execution and CRUD shorthands over a pooled database client.
///
/// Every operation returns a [`Promise`] and never fails synchronously. Work is dispatched onto
/// the current Tokio runtime when the method is called; outside a runtime the promise is rejected
/// with [`OathError::ConnectionError`]. Dropping a promise does not cancel the statement.
///
/// Cloning is cheap; clones share the pool, the loggers and the promise library.
///
/// ```rust,no_run
/// use sql_oath::prelude::*;
///
/// # async fn demo() -> Result<(), OathError> {
/// let db = Oath::init(SqliteOptions::new("app.db")).await?;
/// db.add_logger(|line| println!("{line}"));
///
/// db.exec("CREATE TABLE IF NOT EXISTS t (id INTEGER PRIMARY KEY, c TEXT UNIQUE)", &[])
///     .await?;
/// db.add("t", &Columns::new().with("c", "bobo")).await?;
/// let row = db.get("t", &Columns::new().with("c", "bobo")).await?;
/// assert!(row.is_some());
/// db.end().await?;
/// # Ok(()) }
/// ```
#[derive(Clone)]
pub struct Oath {
    client: Arc<dyn DbClient>,
    loggers: Arc<LoggerRegistry>,
    promises: Arc<dyn PromiseLibrary>,
}

/// Builder selecting the promise library before connecting.
pub struct OathBuilder {
    config: ConnectionConfig,
    promises: Arc<dyn PromiseLibrary>,
}

impl OathBuilder {
    #[must_use]
    pub fn promises<P: PromiseLibrary + 'static>(mut self, library: P) -> Self {
        self.promises = Arc::new(library);
        self
    }

    /// # Errors
    /// Returns `OathError` if the pool cannot be created.
    pub async fn build(self) -> Result<Oath, OathError> {
        let client = self.config.connect().await?;
        Ok(Oath::with_client(client, self.promises))
    }
}

impl Oath {
    /// Connect with the default [`ProgressPromises`] library.
    ///
    /// # Errors
    /// Returns `OathError` if the pool cannot be created.
    pub async fn init(config: impl Into<ConnectionConfig>) -> Result<Self, OathError> {
        Self::builder(config).build().await
    }

    #[must_use]
    pub fn builder(config: impl Into<ConnectionConfig>) -> OathBuilder {
        OathBuilder {
            config: config.into(),
            promises: Arc::new(ProgressPromises),
        }
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(client: Arc<dyn DbClient>, promises: Arc<dyn PromiseLibrary>) -> Self {
        Self {
            client,
            loggers: Arc::new(LoggerRegistry::new()),
            promises,
        }
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.client.database_type()
    }

    #[must_use]
    pub fn promise_library(&self) -> &Arc<dyn PromiseLibrary> {
        &self.promises
    }

    pub fn add_logger<F>(&self, logger: F) -> LoggerHandle
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.loggers.register(logger)
    }

    /// Returns `false` when the handle is not registered.
    pub fn remove_logger(&self, handle: LoggerHandle) -> bool {
        self.loggers.unregister(handle)
    }

    /// Run one statement with positional `?` parameters.
    pub fn exec(&self, sql: &str, params: &[RowValues]) -> Promise<QueryResult> {
        let job = self.start_exec(sql, params);
        self.dispatch(job)
    }

    /// Stream the rows of a query as progress notifications; resolves with the fields.
    ///
    /// Rejects at once with [`OathError::UnsupportedCapability`] when the promise library has
    /// no progress support; no statement is sent in that case.
    ///
    /// At most one row is outstanding: the next row is read only after the consumer took the
    /// previous one. Awaiting the promise without reading progress discards the remaining rows
    /// and resolves once the query is done.
    ///
    /// ```rust,no_run
    /// # use sql_oath::prelude::*;
    /// # async fn demo(db: Oath) -> Result<(), OathError> {
    /// let mut promise = db.get_stream("SELECT id FROM t ORDER BY id", &[]);
    /// while let Some(row) = promise.progress().await {
    ///     println!("{:?}", row.get("id"));
    /// }
    /// let fields = promise.await?;
    /// # let _ = fields;
    /// # Ok(()) }
    /// ```
    pub fn get_stream(&self, sql: &str, params: &[RowValues]) -> Promise<Vec<FieldDescriptor>, Row> {
        if !self.promises.capabilities().progress {
            return self.fail(OathError::UnsupportedCapability(format!(
                "get_stream needs progress notification, which the '{}' promise library lacks",
                self.promises.name()
            )));
        }
        let runtime = match current_runtime() {
            Ok(handle) => handle,
            Err(err) => return self.fail(err),
        };
        self.loggers.log(&format!("get_stream: {sql}"));

        let (deferred, promise) = defer(&self.promises);
        let client = Arc::clone(&self.client);
        let loggers = Arc::clone(&self.loggers);
        let sql = sql.to_owned();
        let params = params.to_vec();
        runtime.spawn(async move {
            let outcome = pump_stream(client, &loggers, &sql, &params, &deferred).await;
            if let Err(err) = &outcome {
                loggers.log(&format!("Error: {err}"));
            }
            deferred.settle(outcome);
        });
        promise
    }

    /// First row of the result, or `None` when there are no rows.
    pub fn get_one_row(&self, sql: &str, params: &[RowValues]) -> Promise<Option<Row>> {
        let job = self.start_exec(sql, params);
        self.dispatch(async move { Ok(job.await?.into_first_row()) })
    }

    /// First column of the first row; rejects with [`OathError::EmptyResult`] when there are no
    /// rows.
    pub fn get_one_value(&self, sql: &str, params: &[RowValues]) -> Promise<RowValues> {
        let job = self.start_exec(sql, params);
        self.dispatch(async move { job.await?.into_first_value() })
    }

    /// Insert one row built from `data`.
    pub fn add(&self, table: &str, data: &Columns) -> Promise<QueryResult> {
        let q = build_insert(table, data);
        self.exec(&q.query, &q.params)
    }

    /// Insert the row keyed by `identity`, or update its `data` columns if the key exists.
    ///
    /// `table` needs a primary key or unique constraint over exactly the `identity` columns; see
    /// [`build_upsert`] for the exact statement.
    pub fn set(&self, table: &str, identity: &Columns, data: &Columns) -> Promise<QueryResult> {
        match build_upsert(table, identity, data) {
            Ok(q) => self.exec(&q.query, &q.params),
            Err(err) => self.fail(err),
        }
    }

    /// First row matching every `identity` column.
    pub fn get(&self, table: &str, identity: &Columns) -> Promise<Option<Row>> {
        match build_select_one(table, identity) {
            Ok(q) => self.get_one_row(&q.query, &q.params),
            Err(err) => self.fail(err),
        }
    }

    /// Delete the rows matching every `identity` column, resolving with the first deleted row
    /// as it was before deletion.
    pub fn delete(&self, table: &str, identity: &Columns) -> Promise<Option<Row>> {
        match build_delete(table, identity) {
            Ok(q) => self.get_one_row(&q.query, &q.params),
            Err(err) => self.fail(err),
        }
    }

    /// Close the pool.
    ///
    /// Work that already holds a connection, such as a stream being consumed, finishes on that
    /// connection; it is closed when the work releases it.
    pub fn end(&self) -> Promise<()> {
        self.loggers.log("End");
        let client = Arc::clone(&self.client);
        let loggers = Arc::clone(&self.loggers);
        self.dispatch(async move {
            let outcome = client.end().await;
            if let Err(err) = &outcome {
                loggers.log(&format!("Error: {err}"));
            }
            outcome
        })
    }

    fn start_exec(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> BoxFuture<'static, Result<QueryResult, OathError>> {
        self.loggers.log(&format!("Exec: {sql}"));
        run_exec(
            Arc::clone(&self.client),
            Arc::clone(&self.loggers),
            sql.to_owned(),
            params.to_vec(),
        )
        .boxed()
    }

    fn dispatch<T, F>(&self, work: F) -> Promise<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, OathError>> + Send + 'static,
    {
        let runtime = match current_runtime() {
            Ok(handle) => handle,
            Err(err) => return self.fail(err),
        };
        let (deferred, promise) = defer(&self.promises);
        runtime.spawn(async move {
            deferred.settle(work.await);
        });
        promise
    }

    fn fail<T, N>(&self, err: OathError) -> Promise<T, N> {
        self.loggers.log(&format!("Error: {err}"));
        Promise::rejected(&self.promises, err)
    }
}

impl std::fmt::Debug for Oath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oath")
            .field("client", &self.client)
            .field("loggers", &self.loggers)
            .field("promises", &self.promises.name())
            .finish()
    }
}

fn current_runtime() -> Result<Handle, OathError> {
    Handle::try_current()
        .map_err(|e| OathError::ConnectionError(format!("no Tokio runtime to run on: {e}")))
}

async fn run_exec(
    client: Arc<dyn DbClient>,
    loggers: Arc<LoggerRegistry>,
    sql: String,
    params: Vec<RowValues>,
) -> Result<QueryResult, OathError> {
    match client.query(&sql, &params).await {
        Ok(result) => {
            loggers.log("Success");
            Ok(result)
        }
        Err(err) => {
            loggers.log(&format!("Error: {err}"));
            Err(err)
        }
    }
}

async fn pump_stream(
    client: Arc<dyn DbClient>,
    loggers: &LoggerRegistry,
    sql: &str,
    params: &[RowValues],
    deferred: &Deferred<Vec<FieldDescriptor>, Row>,
) -> Result<Vec<FieldDescriptor>, OathError> {
    let mut events = client.query_stream(sql, params).await?;
    let mut fields = Vec::new();
    loop {
        // the next row is pulled only once the consumer took the previous one
        let slot = deferred.reserve().await?;
        let Some(event) = events.next().await else {
            break;
        };
        match event? {
            StreamEvent::Fields(f) => {
                loggers.log("get_stream fields");
                fields = f;
            }
            StreamEvent::Row(row) => {
                loggers.log("get_stream row");
                if let Some(slot) = slot {
                    slot.send(row);
                }
            }
        }
    }
    loggers.log("get_stream end");
    Ok(fields)
}
