//! Pool establishment and readiness.
//!
//! Runs against the scripted mock driver with a paused clock, so reconnect
//! backoffs complete instantly.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use larvitdb::{Db, Error, ReadinessState, codes};
use larvitdb_testing::{LogCapture, MockDriver};
use tokio::time::Instant;
use tracing::Level;

fn db(driver: &MockDriver) -> Db<MockDriver> {
    Db::builder(driver.clone()).build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_nothing_happens_before_first_use() {
    let driver = MockDriver::new();
    let db = db(&driver);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(db.state(), ReadinessState::NotStarted);
    assert_eq!(driver.probes(), 0);
    assert_eq!(driver.pools_created(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_callers_share_one_establishment() {
    let driver = MockDriver::new();
    let db = db(&driver);

    let (a, b, ()) = tokio::join!(
        db.query("SELECT 1", ()),
        db.query("SELECT 1", ()),
        db.ready(),
    );
    a.unwrap();
    b.unwrap();

    assert!(db.is_ready());
    assert_eq!(db.state(), ReadinessState::Ready);
    assert_eq!(driver.probes(), 1);
    assert_eq!(driver.pools_created(), 1);
    assert_eq!(driver.count("SET time_zone"), 1);
    // one liveness check plus the two queries
    assert_eq!(driver.count("SELECT 1"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_setup_statements_run_before_any_query() {
    let driver = MockDriver::new();
    let db = db(&driver);

    db.query("SELECT 1", ()).await.unwrap();

    let statements = driver.statements();
    assert_eq!(statements[0].sql, "SET time_zone = '+00:00';");
    assert_eq!(statements[1].sql, "SELECT 1");
    assert_eq!(statements.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_server_retried_until_up() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    driver.fail_probes(3);
    let db = Db::builder(driver.clone())
        .reconnect_backoff(Duration::from_secs(1))
        .build()
        .unwrap();

    let started = Instant::now();
    db.query("SELECT 1", ()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(driver.probes(), 4);
    assert_eq!(driver.pools_created(), 1);
    assert_eq!(logs.count(Level::WARN, "could not connect to database"), 3);
    assert_eq!(logs.count(Level::INFO, "database ready"), 1);

    let event = logs.find(Level::WARN, "could not connect").unwrap();
    assert_eq!(event.field("code"), Some(codes::ECONNREFUSED));

    let metrics = db.metrics();
    assert_eq!(metrics.probe_attempts, 4);
    assert_eq!(metrics.pools_created, 1);
}

#[tokio::test(start_paused = true)]
async fn test_driver_panic_while_connecting_is_retried() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    driver.panic_on_connect(1);
    let db = db(&driver);

    tokio::time::timeout(Duration::from_secs(60), db.ready())
        .await
        .expect("readiness recovers after the panic");

    assert_eq!(db.state(), ReadinessState::Ready);
    assert_eq!(driver.probes(), 2);
    assert_eq!(driver.pools_created(), 1);

    let event = logs.find(Level::WARN, "could not connect to database").unwrap();
    assert_eq!(event.field("code"), Some(codes::DRIVER_PANIC));
    assert!(event.message.contains("panicked while connecting"));
}

#[tokio::test(start_paused = true)]
async fn test_driver_panic_while_creating_pool_is_retried() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    driver.panic_on_pool_creation(1);
    let db = db(&driver);

    tokio::time::timeout(Duration::from_secs(60), db.query("SELECT 1", ()))
        .await
        .expect("readiness recovers after the panic")
        .unwrap();

    assert!(db.is_ready());
    assert_eq!(driver.probes(), 2);
    assert_eq!(driver.pools_created(), 1);
    assert!(logs.contains(Level::WARN, "could not create pool"));
}

#[tokio::test(start_paused = true)]
async fn test_callers_wait_while_connecting() {
    let driver = MockDriver::new();
    driver.fail_probes(2);
    let db = db(&driver);

    let waiting = tokio::spawn({
        let db = db.clone();
        async move { db.query("SELECT 1", ()).await }
    });
    tokio::task::yield_now().await;

    assert_eq!(db.state(), ReadinessState::Connecting);
    assert!(!waiting.is_finished());
    assert_eq!(driver.count("SELECT"), 0);

    waiting.await.unwrap().unwrap();
    assert_eq!(db.state(), ReadinessState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_empty_liveness_check_still_becomes_ready() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    driver.empty_liveness();
    let db = db(&driver);

    db.ready().await;

    assert!(db.is_ready());
    assert_eq!(driver.pools_created(), 1);
    assert!(logs.contains(Level::ERROR, "database connection test failed"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_setup_statement_recreates_pool() {
    let (logs, _guard) = LogCapture::install();
    let driver = MockDriver::new();
    driver.fail_next("SET time_zone", codes::ER_ACCESS_DENIED_ERROR, 1);
    let db = db(&driver);

    db.ready().await;

    assert!(db.is_ready());
    assert_eq!(driver.pools_created(), 2);
    assert_eq!(driver.pools_closed(), 1);
    assert_eq!(driver.count("SET time_zone"), 2);
    assert!(logs.contains(Level::ERROR, "database setup failed"));

    db.query("SELECT 1", ()).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_pool_closed_before_ready_is_discarded() {
    let driver = MockDriver::new();
    let db = db(&driver);

    db.close().await.unwrap();
    let err = db.query("SELECT 1", ()).await.unwrap_err();

    assert!(matches!(err, Error::NoPool));
    assert_eq!(driver.pools_created(), 1);
    assert_eq!(driver.pools_closed(), 1);
}
