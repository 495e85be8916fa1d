//! Postgres adapter over `tokio-postgres`.
//!
//! Connection strings are libpq `key=value` lists or `postgres://` URLs. Commands use `@name`
//! markers, rewritten to `$N` before preparing.

mod config;
mod connection;
mod discovery;
mod params;
mod query;

use std::collections::HashMap;

use async_trait::async_trait;
use bb8::Pool;
use tokio::sync::Mutex;
use tracing::debug;

pub use config::{
    PgManager, PgPooledConnection, PostgresOptions, PostgresOptionsBuilder,
    parse_connection_string,
};
pub use connection::PostgresConnection;
pub use params::as_refs;
pub use query::postgres_extract_value;

use crate::driver::{Driver, DriverCapabilities, DriverConnection};
use crate::error::SqlFacadeError;

/// Driver for Postgres databases.
pub struct PostgresDriver {
    options: PostgresOptions,
    pools: Mutex<HashMap<String, Pool<PgManager>>>,
}

impl PostgresDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(PostgresOptions::default())
    }

    /// A driver whose pools use `options`; each connection string still gets its own pool.
    #[must_use]
    pub fn with_options(options: PostgresOptions) -> Self {
        Self {
            options,
            pools: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn builder(connection_string: String) -> PostgresOptionsBuilder {
        PostgresOptionsBuilder::new(connection_string)
    }

    async fn pool(&self, connection_string: &str) -> Result<Pool<PgManager>, SqlFacadeError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(connection_string) {
            return Ok(pool.clone());
        }
        let config = parse_connection_string(connection_string)?;
        debug!(dbname = ?config.get_dbname(), "creating postgres pool");
        let pool = PgManager::new(config)
            .build_pool(self.options.pool_size)
            .await?;
        pools.insert(connection_string.to_string(), pool.clone());
        Ok(pool)
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &str {
        "postgres"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            parameter_discovery: true,
            batching: true,
            row_outcomes: true,
            cancellation: true,
            stored_procedures: true,
        }
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DriverConnection>, SqlFacadeError> {
        let pool = self.pool(connection_string).await?;
        let conn = pool.get_owned().await.map_err(|e| {
            SqlFacadeError::ConnectionError(format!("postgres checkout error: {e}"))
        })?;
        Ok(Box::new(PostgresConnection::new(conn)))
    }
}
