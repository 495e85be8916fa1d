use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bb8::{ManageConnection, Pool, PooledConnection};
use tokio::task::spawn_blocking;

use crate::database::Database;
use crate::error::SqlFacadeError;

use super::SqliteDriver;

pub type SharedSqliteConnection = Arc<tokio::sync::Mutex<rusqlite::Connection>>;
pub type SqlitePooledConnection = PooledConnection<'static, SqliteManager>;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POOL_SIZE: u32 = 4;

/// Options for `SQLite` pools.
///
/// Every connection string a [`SqliteDriver`] sees gets its own pool built from these options.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub busy_timeout: Duration,
    pub wal: bool,
    pub pool_size: u32,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            wal: true,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    #[must_use]
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self::new(String::new())
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.opts = self.opts.with_pool_size(pool_size);
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a [`Database`] named `name` over `db_path`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when the path is empty.
    pub fn build(self, name: impl Into<String>) -> Result<Database, SqlFacadeError> {
        let opts = self.finish();
        let path = opts.db_path.clone();
        Database::new(name, path, Arc::new(SqliteDriver::with_options(opts)))
    }
}

/// In-memory databases live and die with their connection, so their pools hold exactly one.
pub(crate) fn is_memory_database(path: &str) -> bool {
    path == ":memory:" || path.contains("mode=memory")
}

/// bb8 manager for `SQLite` connections.
pub struct SqliteManager {
    path: String,
    busy_timeout: Duration,
    wal: bool,
}

impl SqliteManager {
    #[must_use]
    pub fn new(path: String, opts: &SqliteOptions) -> Self {
        Self {
            path,
            busy_timeout: opts.busy_timeout,
            wal: opts.wal,
        }
    }

    /// Build a pool from this manager.
    ///
    /// # Errors
    /// Returns `ConnectionError` if pool creation fails.
    pub async fn build_pool(self, max_size: u32) -> Result<Pool<SqliteManager>, SqlFacadeError> {
        let max_size = if is_memory_database(&self.path) {
            1
        } else {
            max_size
        };
        Pool::builder()
            .max_size(max_size)
            .max_lifetime(None)
            .idle_timeout(None)
            .retry_connection(false)
            .build(self)
            .await
            .map_err(|e| SqlFacadeError::ConnectionError(format!("sqlite pool error: {e}")))
    }
}

fn open(path: &str, busy_timeout: Duration, wal: bool) -> Result<rusqlite::Connection, SqlFacadeError> {
    let conn = rusqlite::Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    if wal && !is_memory_database(path) {
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    }
    Ok(conn)
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = SqlFacadeError;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let wal = self.wal;
        async move {
            let conn = spawn_blocking(move || open(&path, busy_timeout, wal))
                .await
                .map_err(|e| {
                    SqlFacadeError::ConnectionError(format!("sqlite open join error: {e}"))
                })??;
            Ok(Arc::new(tokio::sync::Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move {
            let guard = conn.lock().await;
            guard.execute_batch("SELECT 1")?;
            Ok(())
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
