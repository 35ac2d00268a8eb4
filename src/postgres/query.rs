use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tokio_postgres::Statement;

use crate::error::OathError;
use crate::results::{FieldDescriptor, QueryResult};
use crate::types::RowValues;

#[must_use]
pub fn fields_of(stmt: &Statement) -> Vec<FieldDescriptor> {
    stmt.columns()
        .iter()
        .map(|col| FieldDescriptor::new(col.name(), Some(col.type_().name().to_string())))
        .collect()
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `OathError` if the column cannot be decoded.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, OathError> {
    let type_name = row.columns()[idx].type_().name();

    Ok(match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(RowValues::Null, RowValues::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(RowValues::Null, RowValues::Float),
        "bool" => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(RowValues::Null, RowValues::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(RowValues::Null, RowValues::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())),
        "json" | "jsonb" => row
            .try_get::<_, Option<Value>>(idx)?
            .map_or(RowValues::Null, RowValues::JSON),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(RowValues::Null, RowValues::Blob),
        // text-like and anything else the driver can decode as a string
        _ => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(RowValues::Null, RowValues::Text),
    })
}

/// Decode every column of a row.
///
/// # Errors
/// Returns `OathError` if any column cannot be decoded.
pub fn extract_row(row: &tokio_postgres::Row) -> Result<Vec<RowValues>, OathError> {
    let mut values = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        values.push(postgres_extract_value(row, idx)?);
    }
    Ok(values)
}

/// Build a result using statement metadata for the fields.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_from_statement(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<QueryResult, OathError> {
    let mut result = QueryResult::with_fields(fields_of(stmt), rows.len());
    for row in rows {
        result.add_row_values(extract_row(row)?);
    }
    Ok(result)
}
