//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::blocking::{BlockingDatabase, BlockingRowCursor, BlockingTransaction};
pub use crate::command::{Command, Parameter};
pub use crate::database::{Database, DbConnection, DbTransaction, RowCursor};
pub use crate::error::SqlFacadeError;
pub use crate::registry::{
    DatabaseRegistry, create_database, create_named_database, set_database_registry,
};
pub use crate::results::DataRecord;
pub use crate::table::{DataRow, DataSet, DataTable, RowState};
pub use crate::translation::{PlaceholderStyle, rewrite_named_placeholders};
pub use crate::types::{
    ChangeKind, CommandKind, DatabaseType, DbType, ParameterDirection, RowValues, RowVersion,
    UpdatedRowSource,
};
pub use crate::update::{UpdateBehavior, UpdateCommands};

#[cfg(feature = "postgres")]
pub use crate::postgres::{PostgresDriver, PostgresOptionsBuilder};
#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDriver, SqliteOptionsBuilder};
