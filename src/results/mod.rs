use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::OathError;
use crate::types::RowValues;

mod row;

pub use row::Row;
pub(crate) use row::index_columns;

/// Per-column metadata returned alongside rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Column name as reported by the driver
    pub name: String,
    /// Declared type, when the driver knows it
    pub type_name: Option<String>,
}

impl FieldDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            type_name,
        }
    }
}

/// The result of a query
///
/// `rows` and `fields` are what a SELECT produces. For statements that return no columns,
/// `rows` is empty and `rows_affected`/`last_insert_id` carry what the driver reported.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// The rows returned by the query
    pub rows: Vec<Row>,
    /// Column metadata, in select order
    pub fields: Vec<FieldDescriptor>,
    /// Rows returned (for queries) or changed (for DML)
    pub rows_affected: u64,
    /// Insert id reported by the driver, if any
    pub last_insert_id: Option<i64>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl QueryResult {
    /// Create an empty result for the given columns with preallocated row capacity.
    #[must_use]
    pub fn with_fields(fields: Vec<FieldDescriptor>, capacity: usize) -> Self {
        let column_names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            rows: Vec::with_capacity(capacity),
            fields,
            rows_affected: 0,
            last_insert_id: None,
            column_names: Arc::new(column_names),
            column_index,
        }
    }

    /// Result of a statement that produced no result columns.
    #[must_use]
    pub fn from_affected(rows_affected: u64, last_insert_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            last_insert_id,
            ..Self::default()
        }
    }

    /// Add a row built from values in column order.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.rows.push(self.make_row(values));
        self.rows_affected += 1;
    }

    /// Build a row sharing this result's column names, without storing it.
    #[must_use]
    pub fn make_row(&self, values: Vec<RowValues>) -> Row {
        Row::with_index(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index),
            values,
        )
    }

    /// Column names shared by all rows.
    #[must_use]
    pub fn column_names(&self) -> &Arc<Vec<String>> {
        &self.column_names
    }

    /// Consume the result, keeping only the first row.
    #[must_use]
    pub fn into_first_row(self) -> Option<Row> {
        self.rows.into_iter().next()
    }

    /// Value of the first field's column in the first row.
    ///
    /// # Errors
    /// Returns [`OathError::EmptyResult`] when there are no rows, and
    /// [`OathError::ExecutionError`] when the result has no columns.
    pub fn into_first_value(self) -> Result<RowValues, OathError> {
        let first_field = self.fields.first().map(|f| f.name.clone());
        let row = self.into_first_row().ok_or(OathError::EmptyResult)?;
        let value = match first_field {
            Some(name) => row.get(&name).cloned(),
            None => row.get_by_index(0).cloned(),
        };
        value.ok_or_else(|| OathError::ExecutionError("query returned no columns".into()))
    }
}
