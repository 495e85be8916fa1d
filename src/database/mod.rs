//! The database handle: one logical database bound to a driver and a connection string.

mod cursor;
mod discovery;
mod execute;
mod lifecycle;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

pub use cursor::RowCursor;
pub(crate) use execute::CallLimits;
pub use lifecycle::{DbConnection, DbTransaction};

use crate::command::{Command, Parameter};
use crate::driver::{Driver, DriverCapabilities, DriverConnection};
use crate::error::SqlFacadeError;
use crate::types::CommandKind;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// A resolved logical database.
///
/// Handles are immutable apart from the stored-procedure parameter cache and are shared as
/// `Arc<Database>`; every operation opens (or borrows) its own connection.
pub struct Database {
    /// Process-unique; ties connections and transactions to the handle that opened them.
    id: u64,
    pub(crate) name: String,
    connection_string: String,
    pub(crate) driver: Arc<dyn Driver>,
    pub(crate) capabilities: DriverCapabilities,
    parameter_cache: Mutex<HashMap<String, Vec<Parameter>>>,
}

impl Database {
    /// Build a handle. Driver capabilities are captured here and never re-read.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when `connection_string` is empty.
    pub fn new(
        name: impl Into<String>,
        connection_string: impl Into<String>,
        driver: Arc<dyn Driver>,
    ) -> Result<Self, SqlFacadeError> {
        let connection_string = connection_string.into();
        if connection_string.trim().is_empty() {
            return Err(SqlFacadeError::InvalidArgument(
                "connection string must not be empty".into(),
            ));
        }
        let capabilities = driver.capabilities();
        Ok(Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            connection_string,
            driver,
            capabilities,
            parameter_cache: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    #[must_use]
    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    #[must_use]
    pub fn capabilities(&self) -> DriverCapabilities {
        self.capabilities
    }

    /// Build an ad-hoc SQL command.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for empty text.
    pub fn sql_string_command(&self, sql: &str) -> Result<Command, SqlFacadeError> {
        Command::text(sql)
    }

    /// Build a stored-procedure command with no parameters.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an empty name.
    pub fn stored_proc_command(&self, name: &str) -> Result<Command, SqlFacadeError> {
        Command::stored_procedure(name)
    }

    /// # Errors
    /// Returns `InvalidArgument` for empty text.
    pub fn command(&self, kind: CommandKind, text: &str) -> Result<Command, SqlFacadeError> {
        Command::new(kind, text)
    }

    /// Apply the driver's parameter-name prefix, e.g. `id` → `@id`.
    #[must_use]
    pub fn build_parameter_name(&self, name: &str) -> String {
        self.driver.build_parameter_name(name)
    }

    /// Empty the stored-procedure parameter cache.
    pub fn clear_parameter_cache(&self) {
        self.cache().clear();
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Parameter>>> {
        self.parameter_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) async fn connect(&self) -> Result<Box<dyn DriverConnection>, SqlFacadeError> {
        debug!(database = %self.name, driver = self.driver.name(), "opening connection");
        self.driver
            .connect(&self.connection_string)
            .await
            .map_err(|e| e.with_context(&self.name, "<connect>"))
    }

    /// Close a self-managed connection; failures are logged, never surfaced.
    pub(crate) async fn release(&self, mut conn: Box<dyn DriverConnection>) {
        if let Err(e) = conn.close().await {
            tracing::warn!(database = %self.name, error = %e, "failed to close connection");
        }
        debug!(database = %self.name, "connection released");
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("driver", &self.driver.name())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}
