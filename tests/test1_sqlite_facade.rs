#![cfg(feature = "sqlite")]

use std::sync::{Arc, Mutex};

use sql_oath::prelude::*;
use tempfile::TempDir;

async fn open() -> Result<(TempDir, Oath), OathError> {
    let dir = tempfile::tempdir().map_err(|e| OathError::ConfigError(e.to_string()))?;
    let path = dir.path().join("oath.db");
    let db = Oath::init(SqliteOptions::new(path.to_string_lossy())).await?;
    db.exec(
        "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, c TEXT UNIQUE, n INTEGER)",
        &[],
    )
    .await?;
    Ok((dir, db))
}

async fn count(db: &Oath) -> Result<i64, OathError> {
    let value = db.get_one_value("SELECT COUNT(*) AS n FROM t", &[]).await?;
    Ok(*value.as_int().unwrap())
}

#[tokio::test(flavor = "multi_thread")]
async fn exec_returns_rows_and_fields() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    assert_eq!(db.database_type(), DatabaseType::Sqlite);

    let inserted = db
        .exec("INSERT INTO t (c, n) VALUES (?, ?)", &["a".into(), 1_i64.into()])
        .await?;
    assert_eq!(inserted.rows_affected, 1);
    assert_eq!(inserted.last_insert_id, Some(1));
    db.exec("INSERT INTO t (c, n) VALUES (?, ?)", &["b".into(), 2_i64.into()])
        .await?;

    let rs = db.exec("SELECT c, n FROM t ORDER BY n", &[]).await?;
    let names: Vec<&str> = rs.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["c", "n"]);
    assert_eq!(rs.fields[0].type_name.as_deref(), Some("TEXT"));
    assert_eq!(rs.rows.len(), 2);
    assert_eq!(rs.rows[1].get("c").and_then(RowValues::as_text), Some("b"));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn one_row_and_one_value() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    assert!(db.get_one_row("SELECT * FROM t", &[]).await?.is_none());
    assert!(matches!(
        db.get_one_value("SELECT c FROM t", &[]).await,
        Err(OathError::EmptyResult)
    ));

    db.add("t", &Columns::new().with("c", "x").with("n", 7_i64)).await?;
    let row = db
        .get_one_row("SELECT n, c FROM t WHERE c = ?", &["x".into()])
        .await?
        .expect("row exists");
    assert_eq!(row.get("n"), Some(&RowValues::Int(7)));
    assert_eq!(
        db.get_one_value("SELECT n, c FROM t", &[]).await?,
        RowValues::Int(7)
    );
    assert_eq!(count(&db).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn add_then_get() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    let added = db.add("t", &Columns::new().with("c", "bobo")).await?;
    assert_eq!(added.rows_affected, 1);

    let row = db
        .get("t", &Columns::new().with("c", "bobo"))
        .await?
        .expect("added row is found");
    assert_eq!(row.get("id"), Some(&RowValues::Int(1)));
    assert!(row.get("n").is_some_and(RowValues::is_null));

    assert!(db.get("t", &Columns::new().with("c", "nope")).await?.is_none());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn set_rekeys_existing_row() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    db.add("t", &Columns::new().with("c", "baz")).await?;
    let before = db.get("t", &Columns::new().with("c", "baz")).await?.unwrap();

    db.set(
        "t",
        &Columns::new().with("c", "baz"),
        &Columns::new().with("c", "bazinga"),
    )
    .await?;

    assert!(db.get("t", &Columns::new().with("c", "baz")).await?.is_none());
    let after = db
        .get("t", &Columns::new().with("c", "bazinga"))
        .await?
        .expect("row was re-keyed");
    assert_eq!(after.get("id"), before.get("id"));
    assert_eq!(count(&db).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn set_inserts_missing_row_and_updates_existing() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    let key = Columns::new().with("c", "k");

    db.set("t", &key, &Columns::new().with("n", 1_i64)).await?;
    assert_eq!(count(&db).await?, 1);
    let row = db.get("t", &key).await?.unwrap();
    assert_eq!(row.get("n"), Some(&RowValues::Int(1)));

    db.set("t", &key, &Columns::new().with("n", 2_i64)).await?;
    assert_eq!(count(&db).await?, 1);
    let row = db.get("t", &key).await?.unwrap();
    assert_eq!(row.get("n"), Some(&RowValues::Int(2)));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_returns_snapshot() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    db.add("t", &Columns::new().with("c", "gone").with("n", 5_i64)).await?;
    db.add("t", &Columns::new().with("c", "kept")).await?;
    assert_eq!(count(&db).await?, 2);

    let snapshot = db
        .delete("t", &Columns::new().with("c", "gone"))
        .await?
        .expect("deleted row is returned");
    assert_eq!(snapshot.get("n"), Some(&RowValues::Int(5)));
    assert_eq!(count(&db).await?, 1);

    assert!(db.delete("t", &Columns::new().with("c", "gone")).await?.is_none());
    assert_eq!(count(&db).await?, 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_sql_rejects_and_logs() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    db.add_logger(move |line| sink.lock().unwrap().push(line.to_owned()));

    let err = db.exec("SELEC nonsense", &[]).await.unwrap_err();
    assert!(err.is_driver_error());

    let lines = lines.lock().unwrap();
    assert_eq!(lines[0], "SqlOath: Exec: SELEC nonsense");
    assert!(lines[1].starts_with("SqlOath: Error: "));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_identity_rejects() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    assert!(matches!(
        db.set("t", &Columns::new(), &Columns::new().with("c", "x")).await,
        Err(OathError::ParameterError(_))
    ));
    assert!(matches!(
        db.get("t", &Columns::new()).await,
        Err(OathError::ParameterError(_))
    ));
    assert_eq!(count(&db).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn end_closes_the_pool() -> Result<(), OathError> {
    let (_dir, db) = open().await?;
    db.end().await?;
    assert!(matches!(
        db.exec("SELECT 1", &[]).await,
        Err(OathError::ConnectionError(_))
    ));
    assert!(matches!(db.end().await, Err(OathError::ConnectionError(_))));
    Ok(())
}
