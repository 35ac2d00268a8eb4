#![cfg(feature = "sqlite")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sql_oath::prelude::*;
use tempfile::TempDir;

async fn seeded(promises: impl PromiseLibrary + 'static) -> Result<(TempDir, Oath), OathError> {
    let dir = tempfile::tempdir().map_err(|e| OathError::ConfigError(e.to_string()))?;
    let path = dir.path().join("stream.db");
    let db = Oath::builder(SqliteOptions::new(path.to_string_lossy()).with_max_connections(2))
        .promises(promises)
        .build()
        .await?;
    db.exec("CREATE TABLE s (id INTEGER PRIMARY KEY, label TEXT)", &[])
        .await?;
    for id in 1..=5_i64 {
        db.add(
            "s",
            &Columns::new().with("id", id).with("label", format!("row{id}")),
        )
        .await?;
    }
    Ok((dir, db))
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_yields_rows_in_order_then_fields() -> Result<(), OathError> {
    let (_dir, db) = seeded(ProgressPromises).await?;

    let mut promise = db.get_stream("SELECT id, label FROM s WHERE id > ? ORDER BY id", &[1_i64.into()]);
    assert!(promise.supports_progress());
    let mut ids = Vec::new();
    while let Some(row) = promise.progress().await {
        ids.push(*row.get("id").and_then(RowValues::as_int).unwrap());
    }
    let fields = promise.await?;

    assert_eq!(ids, [2, 3, 4, 5]);
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["id", "label"]);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn awaiting_a_stream_directly_resolves_with_fields() -> Result<(), OathError> {
    let (_dir, db) = seeded(ProgressPromises).await?;
    for _ in 0..3 {
        let fields = tokio::time::timeout(
            Duration::from_secs(10),
            db.get_stream("SELECT id FROM s ORDER BY id", &[]),
        )
        .await
        .map_err(|e| OathError::ExecutionError(e.to_string()))??;
        assert_eq!(fields[0].name, "id");
    }
    // the pool has two connections, so each stream must have given its own back
    assert_eq!(
        db.get_one_value("SELECT COUNT(*) FROM s", &[]).await?,
        RowValues::Int(5)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_consumer_holds_back_the_reader() -> Result<(), OathError> {
    let (_dir, db) = seeded(ProgressPromises).await?;
    let lines = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&lines);
    db.add_logger(move |line| sink.lock().unwrap().push(line.to_owned()));

    let mut promise = db.get_stream("SELECT id FROM s ORDER BY id", &[]);
    let first = promise.progress().await.expect("first row");
    assert_eq!(first.get("id"), Some(&RowValues::Int(1)));
    tokio::time::sleep(Duration::from_millis(300)).await;

    fn rows_read(lines: &Mutex<Vec<String>>) -> usize {
        let lines = lines.lock().unwrap();
        lines.iter().filter(|l| l.ends_with("get_stream row")).count()
    }
    // the row in hand plus one waiting for the consumer
    assert_eq!(rows_read(&lines), 2);

    let mut rest = 0;
    while promise.progress().await.is_some() {
        rest += 1;
    }
    promise.await?;
    assert_eq!(rest, 4);
    assert_eq!(rows_read(&lines), 5);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn open_stream_finishes_after_end() -> Result<(), OathError> {
    let (_dir, db) = seeded(ProgressPromises).await?;
    let mut promise = db.get_stream("SELECT id FROM s ORDER BY id", &[]);
    assert!(promise.progress().await.is_some());

    db.end().await?;

    let mut rest = 0;
    while promise.progress().await.is_some() {
        rest += 1;
    }
    assert_eq!(rest, 4);
    assert_eq!(promise.await?.len(), 1);
    assert!(matches!(
        db.exec("SELECT 1", &[]).await,
        Err(OathError::ConnectionError(_))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_stream_still_reports_fields() -> Result<(), OathError> {
    let (_dir, db) = seeded(ProgressPromises).await?;
    let mut promise = db.get_stream("SELECT label FROM s WHERE id < 0", &[]);
    assert!(promise.progress().await.is_none());
    let fields = promise.await?;
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].name, "label");
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_without_progress_support_is_rejected() -> Result<(), OathError> {
    let (_dir, db) = seeded(BasicPromises).await?;
    let mut promise = db.get_stream("SELECT * FROM s", &[]);
    assert!(!promise.supports_progress());
    assert!(promise.progress().await.is_none());
    assert!(matches!(
        promise.await,
        Err(OathError::UnsupportedCapability(_))
    ));

    // everything else still works with a basic library
    assert_eq!(
        db.get_one_value("SELECT COUNT(*) FROM s", &[]).await?,
        RowValues::Int(5)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_of_bad_sql_rejects() -> Result<(), OathError> {
    let (_dir, db) = seeded(ProgressPromises).await?;
    let mut promise = db.get_stream("SELECT * FROM missing_table", &[]);
    assert!(promise.progress().await.is_none());
    let err = promise.await.unwrap_err();
    assert!(err.is_driver_error());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_promise_releases_the_connection() -> Result<(), OathError> {
    let (_dir, db) = seeded(ProgressPromises).await?;
    for _ in 0..4 {
        let mut promise = db.get_stream("SELECT id FROM s ORDER BY id", &[]);
        assert!(promise.progress().await.is_some());
        drop(promise);
    }
    // with two pooled connections this would stall if abandoned streams kept theirs
    let value = tokio::time::timeout(
        Duration::from_secs(10),
        db.get_one_value("SELECT MAX(id) FROM s", &[]),
    )
    .await
    .map_err(|e| OathError::ExecutionError(e.to_string()))??;
    assert_eq!(value, RowValues::Int(5));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unhandled_rejection_reaches_the_library() -> Result<(), OathError> {
    #[derive(Debug, Default)]
    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl PromiseLibrary for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities { progress: true }
        }

        fn on_unhandled(&self, err: OathError) {
            self.seen.lock().unwrap().push(err.to_string());
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let library = Recording {
        seen: Arc::clone(&seen),
    };
    let (_dir, db) = seeded(library).await?;
    db.exec("SELEC broken", &[]).done().await.unwrap();
    db.exec("SELECT 1", &[]).done().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("syntax error"));
    Ok(())
}
