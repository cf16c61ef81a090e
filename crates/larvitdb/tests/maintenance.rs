//! Dropping tables, closing the pool and streaming rows.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures_util::StreamExt;
use larvitdb::{Db, Error, SqlValue, codes};
use larvitdb_testing::{LogCapture, MockDriver};
use tracing::Level;

fn db(driver: &MockDriver) -> Db<MockDriver> {
    Db::builder(driver.clone()).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_remove_all_tables_ignores_foreign_keys() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    driver.create_table("a_parent", &[]);
    driver.create_table("b_child", &["a_parent"]);
    driver.create_table("c_other", &[]);
    let db = db(&driver);

    // a_parent comes first and is still referenced
    let err = db.query("DROP TABLE a_parent", ()).await.unwrap_err();
    assert_eq!(err.code(), Some(codes::ER_ROW_IS_REFERENCED_2));

    db.remove_all_tables().await.unwrap();

    assert!(driver.tables().is_empty());
    assert!(driver.foreign_key_checks());
    assert_eq!(driver.releases(), 1);
    assert!(logs.contains(Level::INFO, "removed all tables"));
}

#[tokio::test(start_paused = true)]
async fn test_remove_all_tables_on_empty_database() {
    let driver = MockDriver::new();
    let db = db(&driver);

    db.remove_all_tables().await.unwrap();

    assert_eq!(driver.count("DROP TABLE"), 0);
    assert_eq!(driver.count("SET FOREIGN_KEY_CHECKS"), 2);
    assert_eq!(driver.releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_all_tables_quotes_names() {
    let driver = MockDriver::new();
    driver.create_table("order", &[]);
    let db = db(&driver);

    db.remove_all_tables().await.unwrap();

    assert_eq!(driver.count("DROP TABLE `order`;"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_all_tables_releases_on_failure() {
    let driver = MockDriver::new();
    driver.create_table("locked", &[]);
    driver.fail_next("DROP TABLE", codes::ER_ACCESS_DENIED_ERROR, 1);
    let db = db(&driver);

    let err = db.remove_all_tables().await.unwrap_err();

    assert_eq!(err.code(), Some(codes::ER_ACCESS_DENIED_ERROR));
    assert_eq!(driver.tables(), vec!["locked".to_string()]);
    assert_eq!(driver.releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_then_query_fails_without_pool() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    let db = db(&driver);
    db.ready().await;

    db.close().await.unwrap();
    assert_eq!(driver.pools_closed(), 1);

    let err = db.query("SELECT 1", ()).await.unwrap_err();
    assert!(matches!(err, Error::NoPool));
    assert!(err.code().is_none());
    assert!(logs.contains(Level::ERROR, "no pool configured"));

    assert!(matches!(db.get_connection().await.unwrap_err(), Error::NoPool));

    // closing twice is harmless
    db.close().await.unwrap();
    assert_eq!(driver.pools_closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stream_yields_rows() {
    let driver = MockDriver::new();
    driver.create_table("items", &[]);
    let db = db(&driver);
    for i in 0..5_i64 {
        db.query("INSERT INTO items VALUES (?)", i).await.unwrap();
    }

    let rows = db
        .stream_query("SELECT * FROM items", ())
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();

    let values: Vec<_> = rows.iter().map(|r| r.get(0).cloned()).collect();
    assert_eq!(values, (0..5).map(|i| Some(SqlValue::Int(i))).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn test_stream_can_be_abandoned() {
    let driver = MockDriver::new();
    driver.create_table("items", &[]);
    let db = db(&driver);
    for i in 0..10_i64 {
        db.query("INSERT INTO items VALUES (?)", i).await.unwrap();
    }

    let mut stream = db.stream_query("SELECT * FROM items", ()).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.get(0), Some(&SqlValue::Int(0)));
    drop(stream);

    // the pool keeps working after the producer stops
    db.query("SELECT 1", ()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_stream_start_failure() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    let db = db(&driver);

    let err = db.stream_query("SELECT * FROM missing", ()).await.unwrap_err();

    assert!(matches!(err, Error::Stream(_)));
    assert_eq!(err.code(), Some(codes::ER_NO_SUCH_TABLE));
    assert!(logs.contains(Level::ERROR, "could not start stream"));
    // streams are not retried
    assert_eq!(driver.count("SELECT * FROM missing"), 1);
}
