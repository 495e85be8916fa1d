use std::time::Duration;

use thiserror::Error;

#[cfg(feature = "postgres")]
use tokio_postgres;

#[cfg(feature = "sqlite")]
use rusqlite;

use crate::types::ChangeKind;

#[derive(Debug, Error)]
pub enum SqlFacadeError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Unknown database: '{name}'")]
    UnknownDatabase { name: String },

    #[error("Database '{name}' is already registered")]
    DuplicateRegistration { name: String },

    #[error("A database registry is already configured")]
    AlreadyConfigured,

    #[error("Unknown provider: '{provider}'")]
    UnknownProvider { provider: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Command '{command}' expects {expected} parameter values, got {actual}")]
    ArityMismatch {
        command: String,
        expected: usize,
        actual: usize,
    },

    #[error("Table '{table}' not found in data set")]
    MissingTableName { table: String },

    #[error("Table '{table}' has pending {kind} rows but no {kind} command was supplied")]
    MissingCommand { kind: ChangeKind, table: String },

    #[error("Unknown column: '{column}'")]
    UnknownColumn { column: String },

    #[error("Row version {version} is not available for column '{column}'")]
    RowVersionUnavailable { column: String, version: String },

    #[error("Parameter error: {0}")]
    ParameterError(String),

    #[error("Driver '{driver}' does not support parameter discovery")]
    UnsupportedDiscovery { driver: String },

    #[error("Driver '{driver}' does not support batched updates")]
    UnsupportedBatching { driver: String },

    #[error("Driver '{driver}' does not report per-row outcomes; continue mode is unavailable")]
    ContinueModeUnsupported { driver: String },

    #[error("Synchronization failed on database '{database}' at row {row} ({command}): {reason}")]
    SynchronizationFailed {
        database: String,
        command: String,
        row: usize,
        reason: String,
        /// The driver error behind the failure; `None` for concurrency violations.
        #[source]
        source: Option<Box<SqlFacadeError>>,
    },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Command '{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("database '{database}', command '{command}': {source}")]
    Context {
        database: String,
        command: String,
        #[source]
        source: Box<SqlFacadeError>,
    },
}

impl SqlFacadeError {
    /// Attach the database name and command text to an error raised underneath the façade.
    ///
    /// Errors that already carry context are returned unchanged.
    #[must_use]
    pub fn with_context(self, database: &str, command: &str) -> Self {
        match self {
            err @ (SqlFacadeError::Context { .. }
            | SqlFacadeError::SynchronizationFailed { .. }
            | SqlFacadeError::Timeout { .. }) => err,
            other => SqlFacadeError::Context {
                database: database.to_string(),
                command: command.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, with every `Context` layer removed.
    ///
    /// A `SynchronizationFailed` caused by a driver error resolves to that error; one caused by
    /// a concurrency violation is its own root.
    #[must_use]
    pub fn root(&self) -> &SqlFacadeError {
        match self {
            SqlFacadeError::Context { source, .. }
            | SqlFacadeError::SynchronizationFailed {
                source: Some(source),
                ..
            } => source.root(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), SqlFacadeError::Cancelled)
    }
}
