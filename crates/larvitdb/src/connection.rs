//! Leased connections.

use std::sync::Arc;

use larvitdb_driver::{Driver, DriverConnection, DriverPool};
use larvitdb_types::{DriverError, Params, QueryResult, codes};

use crate::db::Shared;
use crate::error::{Error, Result};
use crate::executor::QueryOptions;

type Leased<D> = <<D as Driver>::Pool as DriverPool>::Connection;

/// A connection leased from the pool.
///
/// Statements run with the same retry and logging behavior as
/// [`Db::query`](crate::Db::query). The connection is owned exclusively by
/// whoever leased it and is returned to the pool exactly once: explicitly
/// through [`release`](Self::release), or on drop.
///
/// # Example
///
/// ```rust,ignore
/// let mut conn = db.get_connection().await?;
/// conn.begin_transaction().await?;
/// conn.query("INSERT INTO orders (id) VALUES (?)", 7).await?;
/// conn.commit().await?;
/// conn.release().await?;
/// ```
pub struct Connection<D: Driver> {
    conn: Option<Leased<D>>,
    shared: Arc<Shared<D>>,
    id: u64,
    in_transaction: bool,
}

impl<D: Driver> std::fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Connection<D> {
    pub(crate) fn new(conn: Leased<D>, shared: Arc<Shared<D>>) -> Self {
        let id = conn.id();
        tracing::trace!(connection_id = id, "connection leased");
        Self {
            conn: Some(conn),
            shared,
            id,
            in_transaction: false,
        }
    }

    /// The driver's id for this connection, as used in log lines.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether a transaction was begun and not yet committed or rolled back.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Run a statement on this connection.
    pub async fn query(&mut self, sql: &str, params: impl Into<Params>) -> Result<QueryResult> {
        self.query_with(sql, params, QueryOptions::default()).await
    }

    /// Run a statement on this connection with per-call options.
    pub async fn query_with(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let params = params.into();
        let conn = self.conn.as_mut().ok_or_else(released)?;

        self.shared
            .executor()
            .execute(conn, sql, params, options, Some(self.id))
            .await
    }

    /// Start a transaction.
    pub async fn begin_transaction(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or_else(released)?;
        conn.begin_transaction()
            .await
            .map_err(|e| transaction_error("begin_transaction", self.id, e))?;

        self.in_transaction = true;
        tracing::debug!(connection_id = self.id, "transaction started");
        Ok(())
    }

    /// Commit the current transaction.
    pub async fn commit(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or_else(released)?;
        conn.commit()
            .await
            .map_err(|e| transaction_error("commit", self.id, e))?;

        self.in_transaction = false;
        tracing::debug!(connection_id = self.id, "transaction committed");
        Ok(())
    }

    /// Roll back the current transaction.
    pub async fn rollback(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or_else(released)?;
        let outcome = conn.rollback().await;
        // A failed rollback still leaves no usable transaction behind.
        self.in_transaction = false;
        outcome.map_err(|e| transaction_error("rollback", self.id, e))?;

        tracing::debug!(connection_id = self.id, "transaction rolled back");
        Ok(())
    }

    /// Return the connection to the pool.
    pub async fn release(mut self) -> Result<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if self.in_transaction {
            tracing::warn!(
                connection_id = self.id,
                "releasing connection with an open transaction"
            );
        }

        conn.release().await.map_err(|e| {
            tracing::error!(
                connection_id = self.id,
                code = e.code(),
                "could not release connection: {}",
                e.message
            );
            Error::Lease(e)
        })?;
        tracing::trace!(connection_id = self.id, "connection released");
        Ok(())
    }
}

impl<D: Driver> Drop for Connection<D> {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let id = self.id;
        let in_transaction = self.in_transaction;

        if in_transaction {
            tracing::warn!(
                connection_id = id,
                "connection dropped with an open transaction, rolling back"
            );
        } else {
            tracing::debug!(connection_id = id, "returning unreleased connection to pool");
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if in_transaction {
                        if let Err(e) = conn.rollback().await {
                            tracing::debug!(
                                connection_id = id,
                                code = e.code(),
                                "rollback on drop failed"
                            );
                        }
                    }
                    if let Err(e) = conn.release().await {
                        tracing::debug!(
                            connection_id = id,
                            code = e.code(),
                            "release on drop failed"
                        );
                    }
                });
            }
            Err(_) => drop(conn),
        }
    }
}

fn released() -> Error {
    Error::Lease(DriverError::new(
        codes::POOL_CLOSED,
        "connection already released",
    ))
}

fn transaction_error(operation: &'static str, id: u64, source: DriverError) -> Error {
    tracing::error!(
        connection_id = id,
        code = source.code(),
        "{operation} failed: {}",
        source.message
    );
    Error::Transaction { operation, source }
}
