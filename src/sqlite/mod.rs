//! `SQLite` adapter over `rusqlite`.
//!
//! The connection string is a file path, `:memory:`, or a `file:` URI. Each distinct connection
//! string gets a lazily built bb8 pool; statements run on tokio's blocking pool.

mod config;
mod connection;
mod params;
mod query;

use std::collections::HashMap;

use async_trait::async_trait;
use bb8::Pool;
use tokio::sync::Mutex;
use tracing::debug;

pub use config::{
    SharedSqliteConnection, SqliteManager, SqliteOptions, SqliteOptionsBuilder,
    SqlitePooledConnection,
};
pub use connection::SqliteConnection;
pub use params::row_value_to_sqlite_value;
pub use query::sqlite_extract_value_sync;

use crate::driver::{Driver, DriverCapabilities, DriverConnection};
use crate::error::SqlFacadeError;

/// Driver for `SQLite` databases.
pub struct SqliteDriver {
    options: SqliteOptions,
    pools: Mutex<HashMap<String, Pool<SqliteManager>>>,
}

impl SqliteDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(SqliteOptions::default())
    }

    /// A driver whose pools use `options`; `options.db_path` is ignored here since every
    /// connection string names its own file.
    #[must_use]
    pub fn with_options(options: SqliteOptions) -> Self {
        Self {
            options,
            pools: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn builder(db_path: String) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    async fn pool(&self, connection_string: &str) -> Result<Pool<SqliteManager>, SqlFacadeError> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(connection_string) {
            return Ok(pool.clone());
        }
        debug!(path = connection_string, "creating sqlite pool");
        let pool = SqliteManager::new(connection_string.to_string(), &self.options)
            .build_pool(self.options.pool_size)
            .await?;
        pools.insert(connection_string.to_string(), pool.clone());
        Ok(pool)
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            parameter_discovery: false,
            batching: true,
            row_outcomes: true,
            cancellation: true,
            stored_procedures: false,
        }
    }

    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DriverConnection>, SqlFacadeError> {
        let pool = self.pool(connection_string).await?;
        let conn = pool.get_owned().await.map_err(|e| {
            SqlFacadeError::ConnectionError(format!("sqlite checkout error: {e}"))
        })?;
        Ok(Box::new(SqliteConnection::new(conn)))
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::command::Command;
    use crate::driver::BatchOutcome;
    use crate::types::{DbType, RowValues};

    #[tokio::test]
    async fn memory_database_survives_across_checkouts() -> Result<(), SqlFacadeError> {
        let driver = SqliteDriver::new();
        let token = CancellationToken::new();
        {
            let mut conn = driver.connect(":memory:").await?;
            let mut create = Command::text("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")?;
            conn.execute_non_query(&mut create, &token).await?;
            conn.close().await?;
        }
        let mut conn = driver.connect(":memory:").await?;
        let mut count = Command::text("SELECT count(*) FROM t")?;
        let n = conn.execute_scalar(&mut count, &token).await?;
        assert_eq!(n, Some(RowValues::Int(0)));
        Ok(())
    }

    #[tokio::test]
    async fn batch_stops_at_first_failure_unless_continuing() -> Result<(), SqlFacadeError> {
        let driver = SqliteDriver::new();
        let token = CancellationToken::new();
        let mut conn = driver.connect(":memory:").await?;
        let mut create = Command::text("CREATE TABLE t (id INTEGER PRIMARY KEY)")?;
        conn.execute_non_query(&mut create, &token).await?;

        let insert = |id: i64| -> Result<Command, SqlFacadeError> {
            let mut cmd = Command::text("INSERT INTO t (id) VALUES (@id)")?;
            cmd.bind_in("@id", DbType::Int64, id)?;
            Ok(cmd)
        };
        let mut batch = vec![insert(1)?, insert(1)?, insert(2)?];
        let BatchOutcome::PerStatement(stopped) =
            conn.execute_batch(&mut batch, false, &token).await?
        else {
            panic!("sqlite reports per-statement outcomes");
        };
        assert_eq!(stopped.len(), 2);
        assert!(matches!(stopped[0], Ok(1)));
        assert!(stopped[1].is_err());

        let mut batch = vec![insert(3)?, insert(3)?, insert(4)?];
        let BatchOutcome::PerStatement(all) =
            conn.execute_batch(&mut batch, true, &token).await?
        else {
            panic!("sqlite reports per-statement outcomes");
        };
        assert_eq!(all.len(), 3);
        assert!(matches!(all[2], Ok(1)));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_token_fails_before_running() -> Result<(), SqlFacadeError> {
        let driver = SqliteDriver::new();
        let token = CancellationToken::new();
        token.cancel();
        let mut conn = driver.connect(":memory:").await?;
        let mut cmd = Command::text("SELECT 1")?;
        let err = conn.execute_non_query(&mut cmd, &token).await;
        assert!(matches!(err, Err(SqlFacadeError::Cancelled)));
        Ok(())
    }

    #[tokio::test]
    async fn stored_procedures_are_unimplemented() -> Result<(), SqlFacadeError> {
        let driver = SqliteDriver::new();
        let mut conn = driver.connect(":memory:").await?;
        let mut cmd = Command::stored_procedure("do_things")?;
        let err = conn
            .execute_non_query(&mut cmd, &CancellationToken::new())
            .await;
        assert!(matches!(err, Err(SqlFacadeError::Unimplemented(_))));
        Ok(())
    }
}
