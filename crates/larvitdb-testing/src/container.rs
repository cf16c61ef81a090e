//! MySQL server in a container, for tests against a real database.
//!
//! Requires a Docker daemon. Tests using it are `#[ignore]`d and run with
//! `cargo xtask integration`.

use std::time::Duration;

use larvitdb_driver::PoolConfig;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use crate::TestingError;

const MYSQL_PORT: u16 = 3306;

/// A running MySQL 8 container with an empty `test` database.
///
/// The container stops when this value is dropped.
pub struct MySqlContainer {
    _container: ContainerAsync<GenericImage>,
    host: String,
    port: u16,
}

impl MySqlContainer {
    /// Root password set on the server.
    pub const ROOT_PASSWORD: &'static str = "larvitdb";
    /// Database created at startup.
    pub const DATABASE: &'static str = "test";

    /// Start the container and wait for the server to accept connections.
    pub async fn start() -> Result<Self, TestingError> {
        tracing::info!("starting mysql container");

        let container = GenericImage::new("mysql", "8.0")
            .with_exposed_port(MYSQL_PORT.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_ROOT_PASSWORD", Self::ROOT_PASSWORD)
            .with_env_var("MYSQL_DATABASE", Self::DATABASE)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(MYSQL_PORT).await?;
        tracing::info!(%host, port, "mysql container started");

        Ok(Self {
            _container: container,
            host,
            port,
        })
    }

    /// Host the server is reachable on.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Mapped port of the server.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Connection URL for the `test` database.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "mysql://root:{}@{}:{}/{}",
            Self::ROOT_PASSWORD,
            self.host,
            self.port,
            Self::DATABASE
        )
    }

    /// Pool configuration for the `test` database.
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new()
            .host(self.host.clone())
            .port(self.port)
            .credentials("root", Self::ROOT_PASSWORD)
            .database(Self::DATABASE)
            .connect_timeout(Duration::from_secs(5))
            .connection_limit(5)
    }
}
