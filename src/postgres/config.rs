use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use bb8::{ManageConnection, Pool, PooledConnection};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::SqlFacadeError;

use super::PostgresDriver;

pub type PgPooledConnection = PooledConnection<'static, PgManager>;

const DEFAULT_POOL_SIZE: u32 = 8;

/// Options for Postgres pools.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    pub connection_string: String,
    pub pool_size: u32,
}

impl PostgresOptions {
    #[must_use]
    pub fn new(connection_string: String) -> Self {
        Self {
            connection_string,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Fluent builder for Postgres options.
#[derive(Debug, Clone)]
pub struct PostgresOptionsBuilder {
    opts: PostgresOptions,
}

impl PostgresOptionsBuilder {
    #[must_use]
    pub fn new(connection_string: String) -> Self {
        Self {
            opts: PostgresOptions::new(connection_string),
        }
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.opts = self.opts.with_pool_size(pool_size);
        self
    }

    #[must_use]
    pub fn finish(self) -> PostgresOptions {
        self.opts
    }

    /// Build a [`Database`] named `name`. The connection string is parsed on first connect.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when the connection string is empty.
    pub fn build(self, name: impl Into<String>) -> Result<Database, SqlFacadeError> {
        let opts = self.finish();
        let connection_string = opts.connection_string.clone();
        Database::new(
            name,
            connection_string,
            Arc::new(PostgresDriver::with_options(opts)),
        )
    }
}

/// Parse a libpq-style `key=value` string or a `postgres://` URL.
///
/// # Errors
/// Returns `ConfigError` when the string does not parse.
pub fn parse_connection_string(
    connection_string: &str,
) -> Result<tokio_postgres::Config, SqlFacadeError> {
    tokio_postgres::Config::from_str(connection_string)
        .map_err(|e| SqlFacadeError::ConfigError(format!("invalid postgres connection string: {e}")))
}

/// bb8 manager for Postgres clients.
pub struct PgManager {
    config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }

    /// Build a pool from this manager.
    ///
    /// # Errors
    /// Returns `ConnectionError` if pool creation fails.
    pub async fn build_pool(self, max_size: u32) -> Result<Pool<PgManager>, SqlFacadeError> {
        Pool::builder()
            .max_size(max_size)
            .retry_connection(false)
            .build(self)
            .await
            .map_err(|e| SqlFacadeError::ConnectionError(format!("postgres pool error: {e}")))
    }
}

impl ManageConnection for PgManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move {
            debug!(
                hosts = ?cfg.get_hosts(),
                dbname = ?cfg.get_dbname(),
                user = ?cfg.get_user(),
                "postgres connect start"
            );
            let (client, connection) = cfg.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "postgres connection task ended with error");
                }
            });
            Ok(client)
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}
