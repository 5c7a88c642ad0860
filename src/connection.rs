//! Redis connection management.

use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::error::{Error, Result};

/// Connection parameters for the Redis server backing the stream.
///
/// Immutable after construction; the builder methods are consumed before the
/// config is handed to [`crate::StreamConsumer`].
///
/// # Examples
/// ```
/// use redis_streams_trigger::ConnectionConfig;
///
/// let config = ConnectionConfig::new("localhost", 6379)
///     .with_database(2)
///     .with_password("secret");
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    database: i64,
    password: Option<String>,
}

impl ConnectionConfig {
    /// Create a new connection config for the given host and port.
    ///
    /// Defaults to logical database 0 with no password.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: 0,
            password: None,
        }
    }

    /// Select the logical database index.
    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    /// Set the password used to authenticate.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// The configured host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The configured logical database index.
    pub fn database(&self) -> i64 {
        self.database
    }

    /// Build the typed connection info handed to the client.
    pub(crate) fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.database,
                password: self.password.clone(),
                ..Default::default()
            },
        }
    }
}

/// Redis connection wrapper that manages connection lifecycle.
///
/// Construction allocates the client but performs no I/O; the transport is
/// only opened by [`RedisConnection::get_async_connection`].
pub struct RedisConnection {
    client: Client,
}

impl RedisConnection {
    /// Create a new Redis connection from a config.
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let client = Client::open(config.connection_info())?;
        Ok(Self { client })
    }

    /// Open an async multiplexed connection.
    ///
    /// The returned connection is cheap to clone; clones share one underlying
    /// transport.
    pub async fn get_async_connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(Error::Connection)
    }
}
