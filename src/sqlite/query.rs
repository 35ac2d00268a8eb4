use rusqlite::types::Value;
use rusqlite::{Connection, Statement, params_from_iter};
use tokio::sync::mpsc;

use crate::client::StreamEvent;
use crate::error::OathError;
use crate::results::{FieldDescriptor, QueryResult};
use crate::types::RowValues;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
/// Returns `OathError` if the value cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<RowValues, OathError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

fn extract_row(row: &rusqlite::Row, col_count: usize) -> Result<Vec<RowValues>, OathError> {
    let mut values = Vec::with_capacity(col_count);
    for i in 0..col_count {
        values.push(sqlite_extract_value_sync(row, i)?);
    }
    Ok(values)
}

#[must_use]
pub fn fields_of(stmt: &Statement<'_>) -> Vec<FieldDescriptor> {
    stmt.columns()
        .iter()
        .map(|col| FieldDescriptor::new(col.name(), col.decl_type().map(str::to_owned)))
        .collect()
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start();
    ["INSERT", "REPLACE"].iter().any(|kw| {
        head.get(..kw.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(kw))
    })
}

/// Run one statement and materialize its result.
///
/// Statements with result columns (including `RETURNING`) are read to completion; the others
/// report the changed row count and, for inserts, the last rowid.
///
/// # Errors
/// Returns `OathError::SqliteError` if preparing or executing the statement fails.
pub fn run_query(conn: &mut Connection, sql: &str, params: &[Value]) -> Result<QueryResult, OathError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let fields = fields_of(&stmt);

    if fields.is_empty() {
        let affected = stmt.execute(params_from_iter(params.iter()))?;
        let affected = u64::try_from(affected).map_err(|e| {
            OathError::ExecutionError(format!("sqlite affected rows conversion error: {e}"))
        })?;
        let last_insert_id = is_insert(sql).then(|| conn.last_insert_rowid());
        return Ok(QueryResult::from_affected(affected, last_insert_id));
    }

    let col_count = fields.len();
    let mut result = QueryResult::with_fields(fields, 16);
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        result.add_row_values(extract_row(row, col_count)?);
    }
    Ok(result)
}

/// Run one statement, sending the fields and then each row through `tx`.
///
/// Each event waits for one request on `demand`, so a row is stepped only when the consumer asks
/// for it. Stops early when either side is gone.
///
/// # Errors
/// Returns `OathError::SqliteError` if preparing or stepping the statement fails.
pub fn stream_rows(
    conn: &mut Connection,
    sql: &str,
    params: &[Value],
    demand: &mut mpsc::Receiver<()>,
    tx: &mpsc::Sender<Result<StreamEvent, OathError>>,
) -> Result<(), OathError> {
    let mut stmt = conn.prepare(sql)?;
    let fields = fields_of(&stmt);
    let col_count = fields.len();
    let template = QueryResult::with_fields(fields.clone(), 0);

    if demand.blocking_recv().is_none()
        || tx.blocking_send(Ok(StreamEvent::Fields(fields))).is_err()
    {
        return Ok(());
    }

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while demand.blocking_recv().is_some() {
        let Some(row) = rows.next()? else {
            break;
        };
        let row = template.make_row(extract_row(row, col_count)?);
        if tx.blocking_send(Ok(StreamEvent::Row(row))).is_err() {
            break;
        }
    }
    Ok(())
}
