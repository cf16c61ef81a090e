//! The capability set a database backend provides.
//!
//! A backend is split into three layers that mirror its resource lifetimes:
//!
//! - [`Driver`]: stateless entry point that can probe a server and create pools
//! - [`DriverPool`]: a pool of connections, able to run one-shot statements
//! - [`DriverConnection`]: a single leased connection with transaction control
//!
//! Statement execution on either a pool or a leased connection goes through
//! [`Queryable`], so retry and logging logic can be written once for both.

use async_trait::async_trait;
use larvitdb_types::{DriverError, QueryResult, SqlValue};

use crate::config::PoolConfig;
use crate::stream::RowStream;

/// Entry point of a database backend.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// The pool type this driver creates.
    type Pool: DriverPool;

    /// Open one standalone connection and close it again.
    ///
    /// Used to find out whether the server accepts connections before a pool
    /// is created.
    async fn probe(&self, config: &PoolConfig) -> Result<(), DriverError>;

    /// Create a connection pool.
    ///
    /// Creating a pool does not have to open any connection.
    async fn create_pool(&self, config: &PoolConfig) -> Result<Self::Pool, DriverError>;
}

/// A pool of connections.
#[async_trait]
pub trait DriverPool: Send + Sync + 'static {
    /// The connection type leased from this pool.
    type Connection: DriverConnection;

    /// Run one statement on any available connection.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, DriverError>;

    /// Lease a connection for exclusive use.
    async fn lease(&self) -> Result<Self::Connection, DriverError>;

    /// Run one statement and deliver its rows incrementally.
    async fn stream(&self, sql: &str, params: &[SqlValue]) -> Result<RowStream, DriverError>;

    /// Close the pool. Connections currently leased are closed when released.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Anything statements can be executed on.
#[async_trait]
pub trait Queryable: Send {
    /// Run one statement.
    async fn execute(&mut self, sql: &str, params: &[SqlValue])
    -> Result<QueryResult, DriverError>;
}

/// A connection leased from a [`DriverPool`].
#[async_trait]
pub trait DriverConnection: Queryable + 'static {
    /// Connection id, as reported by the server where available.
    fn id(&self) -> u64;

    /// Start a transaction.
    async fn begin_transaction(&mut self) -> Result<(), DriverError>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Return the connection to its pool.
    async fn release(self) -> Result<(), DriverError>;
}

/// Adapter that runs statements on a shared pool through [`Queryable`].
#[derive(Debug)]
pub struct PoolQueryable<'a, P>(pub &'a P);

#[async_trait]
impl<P: DriverPool> Queryable for PoolQueryable<'_, P> {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<QueryResult, DriverError> {
        DriverPool::execute(self.0, sql, params).await
    }
}
