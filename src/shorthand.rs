//! SQL for the CRUD shorthands.
//!
//! Values are always bound as `?` parameters. Table and column names are quoted with
//! [`quote_identifier`] and are never parameterized, so they must come from trusted code.

use crate::error::OathError;
use crate::types::RowValues;

/// A SQL string with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }
}

/// Column/value pairs in insertion order.
///
/// ```rust
/// use sql_oath::prelude::*;
///
/// let data = Columns::new().with("name", "bobo").with("age", 7);
/// let same: Columns = [("name", RowValues::from("bobo")), ("age", RowValues::Int(7))].into();
/// assert_eq!(data, same);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns(Vec<(String, RowValues)>);

impl Columns {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.insert(column, value);
        self
    }

    /// Set a column. An existing column keeps its position and takes the new value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<RowValues>) {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<RowValues>> FromIterator<(K, V)> for Columns {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut columns = Columns::new();
        for (k, v) in iter {
            columns.insert(k, v);
        }
        columns
    }
}

impl<K: Into<String>, V: Into<RowValues>, const N: usize> From<[(K, V); N]> for Columns {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Quote an identifier with double quotes, doubling any embedded quote.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `INSERT INTO t (cols) VALUES (?, ...)`, or `DEFAULT VALUES` when `data` is empty.
#[must_use]
pub fn build_insert(table: &str, data: &Columns) -> QueryAndParams {
    let table = quote_identifier(table);
    if data.is_empty() {
        return QueryAndParams::new(format!("INSERT INTO {table} DEFAULT VALUES"), Vec::new());
    }
    let columns: Vec<String> = data.iter().map(|(c, _)| quote_identifier(c)).collect();
    let placeholders = vec!["?"; data.len()];
    QueryAndParams::new(
        format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        ),
        data.iter().map(|(_, v)| v.clone()).collect(),
    )
}

/// Insert keyed by `identity`, updating the `data` columns when that key already exists.
///
/// The identity columns are the conflict target, so the table needs a primary key or unique
/// constraint over exactly those columns; the database rejects the statement otherwise. Columns
/// not named in `identity` or `data` must be nullable or have defaults, since the insert is
/// checked before the conflict is detected.
///
/// A column present in both maps takes its identity value on insert and its data value on
/// update, which is how a row gets re-keyed.
///
/// # Errors
/// Returns [`OathError::ParameterError`] when `identity` is empty.
pub fn build_upsert(
    table: &str,
    identity: &Columns,
    data: &Columns,
) -> Result<QueryAndParams, OathError> {
    ensure_identity(identity, "set")?;

    let mut columns = Vec::with_capacity(identity.len() + data.len());
    let mut params = Vec::with_capacity(identity.len() + 2 * data.len());
    for (column, value) in identity.iter() {
        columns.push(quote_identifier(column));
        params.push(value.clone());
    }
    for (column, value) in data.iter().filter(|(c, _)| !identity.contains(c)) {
        columns.push(quote_identifier(column));
        params.push(value.clone());
    }
    let placeholders = vec!["?"; columns.len()];
    let target: Vec<String> = identity.iter().map(|(c, _)| quote_identifier(c)).collect();

    let action = if data.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let sets: Vec<String> = data
            .iter()
            .map(|(c, _)| format!("{} = ?", quote_identifier(c)))
            .collect();
        params.extend(data.iter().map(|(_, v)| v.clone()));
        format!("DO UPDATE SET {}", sets.join(", "))
    };

    Ok(QueryAndParams::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {action}",
            quote_identifier(table),
            columns.join(", "),
            placeholders.join(", "),
            target.join(", ")
        ),
        params,
    ))
}

/// `SELECT * ... WHERE (c = ?) AND (...) LIMIT 1`.
///
/// # Errors
/// Returns [`OathError::ParameterError`] when `identity` is empty.
pub fn build_select_one(table: &str, identity: &Columns) -> Result<QueryAndParams, OathError> {
    ensure_identity(identity, "get")?;
    let (clause, params) = where_clause(identity);
    Ok(QueryAndParams::new(
        format!(
            "SELECT * FROM {} WHERE {clause} LIMIT 1",
            quote_identifier(table)
        ),
        params,
    ))
}

/// `DELETE ... WHERE (c = ?) AND (...) RETURNING *`.
///
/// # Errors
/// Returns [`OathError::ParameterError`] when `identity` is empty.
pub fn build_delete(table: &str, identity: &Columns) -> Result<QueryAndParams, OathError> {
    ensure_identity(identity, "delete")?;
    let (clause, params) = where_clause(identity);
    Ok(QueryAndParams::new(
        format!(
            "DELETE FROM {} WHERE {clause} RETURNING *",
            quote_identifier(table)
        ),
        params,
    ))
}

fn where_clause(identity: &Columns) -> (String, Vec<RowValues>) {
    let terms: Vec<String> = identity
        .iter()
        .map(|(c, _)| format!("{} = ?", quote_identifier(c)))
        .collect();
    let params = identity.iter().map(|(_, v)| v.clone()).collect();
    (format!("({})", terms.join(") AND (")), params)
}

fn ensure_identity(identity: &Columns, op: &str) -> Result<(), OathError> {
    if identity.is_empty() {
        Err(OathError::ParameterError(format!(
            "{op} requires at least one identity column"
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn columns_keep_insertion_order_and_replace_in_place() {
        let mut cols = Columns::new().with("b", 1).with("a", 2);
        cols.insert("b", 3);
        let names: Vec<&str> = cols.iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(cols.get("b"), Some(&RowValues::Int(3)));
    }

    #[test]
    fn insert_binds_every_value() {
        let q = build_insert("t", &Columns::new().with("c", "bobo").with("n", 3));
        assert_eq!(q.query, r#"INSERT INTO "t" ("c", "n") VALUES (?, ?)"#);
        assert_eq!(q.params, vec![RowValues::from("bobo"), RowValues::Int(3)]);
    }

    #[test]
    fn insert_without_columns_uses_defaults() {
        let q = build_insert("t", &Columns::new());
        assert_eq!(q.query, r#"INSERT INTO "t" DEFAULT VALUES"#);
        assert!(q.params.is_empty());
    }

    #[test]
    fn upsert_targets_identity_columns() {
        let q = build_upsert(
            "t",
            &Columns::new().with("id", 1),
            &Columns::new().with("c", "x").with("d", "y"),
        )
        .unwrap();
        assert_eq!(
            q.query,
            r#"INSERT INTO "t" ("id", "c", "d") VALUES (?, ?, ?) ON CONFLICT ("id") DO UPDATE SET "c" = ?, "d" = ?"#
        );
        assert_eq!(
            q.params,
            vec![
                RowValues::Int(1),
                RowValues::from("x"),
                RowValues::from("y"),
                RowValues::from("x"),
                RowValues::from("y"),
            ]
        );
    }

    #[test]
    fn upsert_rekey_inserts_identity_and_updates_data() {
        let q = build_upsert(
            "t",
            &Columns::new().with("c", "baz"),
            &Columns::new().with("c", "bazinga"),
        )
        .unwrap();
        assert_eq!(
            q.query,
            r#"INSERT INTO "t" ("c") VALUES (?) ON CONFLICT ("c") DO UPDATE SET "c" = ?"#
        );
        assert_eq!(
            q.params,
            vec![RowValues::from("baz"), RowValues::from("bazinga")]
        );
    }

    #[test]
    fn upsert_without_data_does_nothing_on_conflict() {
        let q = build_upsert("t", &Columns::new().with("id", 1), &Columns::new()).unwrap();
        assert_eq!(
            q.query,
            r#"INSERT INTO "t" ("id") VALUES (?) ON CONFLICT ("id") DO NOTHING"#
        );
    }

    #[test]
    fn select_and_delete_share_where_clause() {
        let identity = Columns::new().with("a", 1).with("b", "two");
        let select = build_select_one("t", &identity).unwrap();
        let delete = build_delete("t", &identity).unwrap();
        assert_eq!(
            select.query,
            r#"SELECT * FROM "t" WHERE ("a" = ?) AND ("b" = ?) LIMIT 1"#
        );
        assert_eq!(
            delete.query,
            r#"DELETE FROM "t" WHERE ("a" = ?) AND ("b" = ?) RETURNING *"#
        );
        assert_eq!(select.params, delete.params);
    }

    #[test]
    fn empty_identity_is_rejected() {
        assert!(matches!(
            build_delete("t", &Columns::new()),
            Err(OathError::ParameterError(_))
        ));
        assert!(build_select_one("t", &Columns::new()).is_err());
        assert!(build_upsert("t", &Columns::new(), &Columns::new().with("c", 1)).is_err());
    }
}
