//! Pool establishment.
//!
//! Runs once per [`Db`](crate::Db), in a background task started by the first
//! caller that needs the database. It never gives up: the only way out of the
//! loop is a pool that answered the setup statements. A driver that panics
//! while connecting is treated like one that failed.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use larvitdb_driver::{Driver, DriverPool, PoolQueryable};
use larvitdb_types::{DriverError, Params};

use crate::db::{SESSION_TIME_ZONE, Shared};
use crate::error::Result;
use crate::executor::{QueryOptions, panic_message};

/// Liveness check run on a freshly created pool.
pub(crate) const LIVENESS_QUERY: &str = "SELECT 1";

/// Probe, create a pool and run the setup statements until all succeed.
pub(crate) async fn establish<D: Driver>(shared: &Shared<D>) -> D::Pool {
    let backoff = shared.policy.reconnect_backoff;

    loop {
        shared.metrics.record_probe();
        let reachable = AssertUnwindSafe(shared.driver.probe(&shared.config))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(DriverError::panicked(panic_message(payload.as_ref()))));
        if let Err(e) = reachable {
            tracing::warn!(
                code = e.code(),
                host = %shared.config.host,
                port = shared.config.port,
                "could not connect to database, retrying in {backoff:?}: {}",
                e.message
            );
            tokio::time::sleep(backoff).await;
            continue;
        }

        let created = AssertUnwindSafe(shared.driver.create_pool(&shared.config))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(DriverError::panicked(panic_message(payload.as_ref()))));
        let pool = match created {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(
                    code = e.code(),
                    "could not create pool, retrying in {backoff:?}: {}",
                    e.message
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
        };
        shared.metrics.record_pool_created();

        match verify(shared, &pool).await {
            Ok(()) => return pool,
            Err(e) => {
                tracing::error!(
                    code = e.code(),
                    "database setup failed, retrying in {backoff:?}: {e}"
                );
                if let Err(e) = pool.close().await {
                    tracing::debug!(code = e.code(), "error closing failed pool: {e}");
                }
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Put the session in UTC and check the pool answers.
///
/// A liveness check without rows is logged but does not fail setup.
async fn verify<D: Driver>(shared: &Shared<D>, pool: &D::Pool) -> Result<()> {
    let executor = shared.executor();
    let mut target = PoolQueryable(pool);

    executor
        .execute(
            &mut target,
            &format!("SET time_zone = '{SESSION_TIME_ZONE}';"),
            Params::new(),
            QueryOptions::default(),
            None,
        )
        .await?;

    let result = executor
        .execute(
            &mut target,
            LIVENESS_QUERY,
            Params::new(),
            QueryOptions::default(),
            None,
        )
        .await?;

    if result.is_empty() {
        tracing::error!(
            sql = LIVENESS_QUERY,
            "database connection test failed: no rows returned"
        );
    } else {
        tracing::debug!("database connection test succeeded");
    }
    Ok(())
}
