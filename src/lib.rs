//! Provider-agnostic database access.
//!
//! Logical databases are registered by name in a [`DatabaseRegistry`] and resolved to shared
//! [`Database`] handles. Each handle builds [`Command`]s, executes them as readers, scalars,
//! non-queries or full-table fetches, and synchronizes the pending changes of a [`DataTable`]
//! back to the database with [`Database::update_data_set`].
//!
//! ```rust
//! # #[cfg(feature = "sqlite")]
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), sql_facade::SqlFacadeError> {
//! use sql_facade::prelude::*;
//!
//! let registry = DatabaseRegistry::builder()
//!     .register_default_provider(":memory:", "sqlite")
//!     .build()?;
//! let db = registry.resolve_default()?;
//!
//! let mut create = db.sql_string_command("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")?;
//! db.execute_non_query(&mut create).await?;
//!
//! let mut insert = db.sql_string_command("INSERT INTO t (name) VALUES (@name)")?;
//! insert.bind_in("@name", DbType::String, "alice")?;
//! assert_eq!(db.execute_non_query(&mut insert).await?, 1);
//!
//! let data = db.execute_data_set(&mut db.sql_string_command("SELECT * FROM t")?).await?;
//! assert_eq!(data.tables()[0].name(), "Table");
//! assert_eq!(data.tables()[0].len(), 1);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "sqlite"))]
//! # fn main() {}
//! ```

pub mod blocking;
pub mod command;
pub mod database;
pub mod driver;
pub mod error;
pub mod prelude;
pub mod registry;
pub mod results;
pub mod table;
pub mod translation;
pub mod tx_outcome;
pub mod types;
pub mod update;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use blocking::{BlockingConnection, BlockingDatabase, BlockingRowCursor, BlockingTransaction};
pub use command::{Command, Parameter};
pub use database::{Database, DbConnection, DbTransaction, RowCursor};
pub use driver::{
    BatchOutcome, Driver, DriverCapabilities, DriverConnection, DriverReader, ResultData,
};
pub use error::SqlFacadeError;
pub use registry::{
    DatabaseRegistry, DatabaseRegistryBuilder, DriverCatalog, RegistryConfig,
    clear_database_registry, create_database, create_named_database, database_registry,
    set_database_registry,
};
pub use results::DataRecord;
pub use table::{DataRow, DataSet, DataTable, RowState};
pub use tx_outcome::TxOutcome;
pub use types::{
    ChangeKind, CommandKind, DatabaseType, DbType, ParameterDirection, RowValues, RowVersion,
    UpdatedRowSource,
};
pub use update::{UpdateBehavior, UpdateCommands};
