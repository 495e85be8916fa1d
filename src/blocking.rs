//! Synchronous wrappers over the async surface.
//!
//! A [`BlockingDatabase`] owns a current-thread tokio runtime and drives every async operation to
//! completion on it. Calls made from inside another async runtime fail with `ExecutionError`
//! instead of deadlocking.
//!
//! ```rust
//! # #[cfg(feature = "sqlite")] {
//! use sql_facade::prelude::*;
//! use sql_facade::sqlite::SqliteOptionsBuilder;
//! use std::sync::Arc;
//!
//! let db = Arc::new(SqliteOptionsBuilder::new(":memory:".into()).build("main")?);
//! let blocking = BlockingDatabase::new(db)?;
//! let mut cmd = Command::text("SELECT 40 + 2")?;
//! assert_eq!(blocking.execute_scalar(&mut cmd)?, Some(RowValues::Int(42)));
//! # }
//! # Ok::<(), sql_facade::SqlFacadeError>(())
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::warn;

use crate::command::Command;
use crate::database::{Database, DbConnection, DbTransaction, RowCursor};
use crate::error::SqlFacadeError;
use crate::results::DataRecord;
use crate::table::DataSet;
use crate::tx_outcome::TxOutcome;
use crate::types::RowValues;
use crate::update::{UpdateBehavior, UpdateCommands};

fn drive<F: Future>(runtime: &Runtime, work: F) -> Result<F::Output, SqlFacadeError> {
    if Handle::try_current().is_ok() {
        return Err(SqlFacadeError::ExecutionError(
            "blocking call made from inside an async runtime".into(),
        ));
    }
    Ok(runtime.block_on(work))
}

/// A [`Database`] handle with synchronous entry points.
#[derive(Clone)]
pub struct BlockingDatabase {
    db: Arc<Database>,
    runtime: Arc<Runtime>,
}

impl BlockingDatabase {
    /// Wrap `db` with a dedicated runtime.
    ///
    /// # Errors
    /// Returns `ExecutionError` when the runtime cannot be started.
    pub fn new(db: Arc<Database>) -> Result<Self, SqlFacadeError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SqlFacadeError::ExecutionError(format!("failed to start runtime: {e}")))?;
        Ok(Self {
            db,
            runtime: Arc::new(runtime),
        })
    }

    #[must_use]
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// # Errors
    /// As [`Database::execute_non_query`].
    pub fn execute_non_query(&self, command: &mut Command) -> Result<i64, SqlFacadeError> {
        drive(&self.runtime, self.db.execute_non_query(command))?
    }

    /// # Errors
    /// As [`Database::execute_non_query_in_transaction`].
    pub fn execute_non_query_in_transaction(
        &self,
        command: &mut Command,
        tx: &mut BlockingTransaction,
    ) -> Result<i64, SqlFacadeError> {
        let tx = tx.inner_mut()?;
        drive(
            &self.runtime,
            self.db.execute_non_query_in_transaction(command, tx),
        )?
    }

    /// # Errors
    /// As [`Database::execute_scalar`].
    pub fn execute_scalar(&self, command: &mut Command) -> Result<Option<RowValues>, SqlFacadeError> {
        drive(&self.runtime, self.db.execute_scalar(command))?
    }

    /// # Errors
    /// As [`Database::execute_scalar_in_transaction`].
    pub fn execute_scalar_in_transaction(
        &self,
        command: &mut Command,
        tx: &mut BlockingTransaction,
    ) -> Result<Option<RowValues>, SqlFacadeError> {
        let tx = tx.inner_mut()?;
        drive(&self.runtime, self.db.execute_scalar_in_transaction(command, tx))?
    }

    /// # Errors
    /// As [`Database::execute_reader`].
    pub fn execute_reader(
        &self,
        command: &mut Command,
    ) -> Result<BlockingRowCursor<'static>, SqlFacadeError> {
        let cursor = drive(&self.runtime, self.db.execute_reader(command))??;
        Ok(BlockingRowCursor::new(cursor, &self.runtime))
    }

    /// # Errors
    /// As [`Database::execute_reader_in_transaction`].
    pub fn execute_reader_in_transaction<'t>(
        &self,
        command: &mut Command,
        tx: &'t mut BlockingTransaction,
    ) -> Result<BlockingRowCursor<'t>, SqlFacadeError> {
        let tx = tx.inner_mut()?;
        let cursor = drive(
            &self.runtime,
            self.db.execute_reader_in_transaction(command, tx),
        )??;
        Ok(BlockingRowCursor::new(cursor, &self.runtime))
    }

    /// # Errors
    /// As [`Database::execute_data_set`].
    pub fn execute_data_set(&self, command: &mut Command) -> Result<DataSet, SqlFacadeError> {
        drive(&self.runtime, self.db.execute_data_set(command))?
    }

    /// # Errors
    /// As [`Database::execute_data_set_in_transaction`].
    pub fn execute_data_set_in_transaction(
        &self,
        command: &mut Command,
        tx: &mut BlockingTransaction,
    ) -> Result<DataSet, SqlFacadeError> {
        let tx = tx.inner_mut()?;
        drive(
            &self.runtime,
            self.db.execute_data_set_in_transaction(command, tx),
        )?
    }

    /// # Errors
    /// As [`Database::load_data_set`].
    pub fn load_data_set(
        &self,
        command: &mut Command,
        data_set: &mut DataSet,
        table_names: &[&str],
    ) -> Result<(), SqlFacadeError> {
        drive(
            &self.runtime,
            self.db.load_data_set(command, data_set, table_names),
        )?
    }

    /// # Errors
    /// As [`Database::load_data_set_in_transaction`].
    pub fn load_data_set_in_transaction(
        &self,
        command: &mut Command,
        data_set: &mut DataSet,
        table_names: &[&str],
        tx: &mut BlockingTransaction,
    ) -> Result<(), SqlFacadeError> {
        let tx = tx.inner_mut()?;
        drive(
            &self.runtime,
            self.db
                .load_data_set_in_transaction(command, data_set, table_names, tx),
        )?
    }

    /// # Errors
    /// As [`Database::update_data_set`].
    pub fn update_data_set(
        &self,
        data_set: &mut DataSet,
        table_name: &str,
        commands: &UpdateCommands,
        behavior: UpdateBehavior,
        batch_size: Option<usize>,
    ) -> Result<usize, SqlFacadeError> {
        drive(
            &self.runtime,
            self.db
                .update_data_set(data_set, table_name, commands, behavior, batch_size),
        )?
    }

    /// # Errors
    /// As [`Database::update_data_set_in_transaction`].
    pub fn update_data_set_in_transaction(
        &self,
        data_set: &mut DataSet,
        table_name: &str,
        commands: &UpdateCommands,
        tx: &mut BlockingTransaction,
        batch_size: Option<usize>,
    ) -> Result<usize, SqlFacadeError> {
        let tx = tx.inner_mut()?;
        drive(
            &self.runtime,
            self.db
                .update_data_set_in_transaction(data_set, table_name, commands, tx, batch_size),
        )?
    }

    /// # Errors
    /// As [`Database::discover_parameters`].
    pub fn discover_parameters(&self, command: &mut Command) -> Result<(), SqlFacadeError> {
        drive(&self.runtime, self.db.discover_parameters(command))?
    }

    /// # Errors
    /// As [`Database::stored_proc_command_with_values`].
    pub fn stored_proc_command_with_values(
        &self,
        name: &str,
        values: &[RowValues],
    ) -> Result<Command, SqlFacadeError> {
        drive(
            &self.runtime,
            self.db.stored_proc_command_with_values(name, values),
        )?
    }

    /// # Errors
    /// As [`Database::stored_proc_command_with_source_columns`].
    pub fn stored_proc_command_with_source_columns(
        &self,
        name: &str,
        columns: &[&str],
    ) -> Result<Command, SqlFacadeError> {
        drive(
            &self.runtime,
            self.db.stored_proc_command_with_source_columns(name, columns),
        )?
    }

    /// # Errors
    /// As [`Database::open_connection`].
    pub fn open_connection(&self) -> Result<BlockingConnection, SqlFacadeError> {
        let conn = drive(&self.runtime, self.db.open_connection())??;
        Ok(BlockingConnection {
            conn: Some(conn),
            runtime: Arc::clone(&self.runtime),
        })
    }

    /// # Errors
    /// As [`Database::begin_transaction`].
    pub fn begin_transaction(&self) -> Result<BlockingTransaction, SqlFacadeError> {
        let tx = drive(&self.runtime, self.db.begin_transaction())??;
        Ok(BlockingTransaction {
            tx: Some(tx),
            runtime: Arc::clone(&self.runtime),
        })
    }
}

impl fmt::Debug for BlockingDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingDatabase")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

/// A caller-managed connection; dropped inside the owning runtime.
pub struct BlockingConnection {
    conn: Option<DbConnection>,
    runtime: Arc<Runtime>,
}

impl BlockingConnection {
    /// # Errors
    /// As [`DbConnection::begin_transaction`].
    pub fn begin_transaction(mut self) -> Result<BlockingTransaction, SqlFacadeError> {
        let conn = self.take()?;
        let tx = drive(&self.runtime, conn.begin_transaction())??;
        Ok(BlockingTransaction {
            tx: Some(tx),
            runtime: Arc::clone(&self.runtime),
        })
    }

    /// # Errors
    /// As [`DbConnection::close`].
    pub fn close(mut self) -> Result<(), SqlFacadeError> {
        let conn = self.take()?;
        drive(&self.runtime, conn.close())?
    }

    fn take(&mut self) -> Result<DbConnection, SqlFacadeError> {
        self.conn
            .take()
            .ok_or_else(|| SqlFacadeError::ExecutionError("connection already released".into()))
    }
}

impl Drop for BlockingConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _entered = self.runtime.enter();
            drop(conn);
        }
    }
}

impl fmt::Debug for BlockingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

/// A transaction driven synchronously. Dropped while active, it is rolled back before the
/// connection is released.
pub struct BlockingTransaction {
    tx: Option<DbTransaction>,
    runtime: Arc<Runtime>,
}

impl BlockingTransaction {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.tx.as_ref().is_some_and(DbTransaction::is_active)
    }

    /// # Errors
    /// As [`DbTransaction::commit`].
    pub fn commit(mut self) -> Result<BlockingConnection, SqlFacadeError> {
        let tx = self.take()?;
        let outcome = drive(&self.runtime, tx.commit())??;
        Ok(self.restore(outcome))
    }

    /// # Errors
    /// As [`DbTransaction::rollback`].
    pub fn rollback(mut self) -> Result<BlockingConnection, SqlFacadeError> {
        let tx = self.take()?;
        let outcome = drive(&self.runtime, tx.rollback())??;
        Ok(self.restore(outcome))
    }

    fn restore(&self, outcome: TxOutcome) -> BlockingConnection {
        BlockingConnection {
            conn: outcome.into_restored_connection(),
            runtime: Arc::clone(&self.runtime),
        }
    }

    fn take(&mut self) -> Result<DbTransaction, SqlFacadeError> {
        self.tx
            .take()
            .ok_or_else(|| SqlFacadeError::ExecutionError("transaction is no longer active".into()))
    }

    fn inner_mut(&mut self) -> Result<&mut DbTransaction, SqlFacadeError> {
        self.tx
            .as_mut()
            .ok_or_else(|| SqlFacadeError::ExecutionError("transaction is no longer active".into()))
    }
}

impl Drop for BlockingTransaction {
    fn drop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        if !tx.is_active() || Handle::try_current().is_ok() {
            return;
        }
        let database = tx.database().to_string();
        self.runtime.block_on(async move {
            match tx.rollback().await {
                Ok(outcome) => {
                    if let Some(conn) = outcome.into_restored_connection()
                        && let Err(e) = conn.close().await
                    {
                        warn!(database = %database, error = %e, "failed to close connection after rollback");
                    }
                }
                Err(e) => {
                    warn!(database = %database, error = %e, "rollback of dropped transaction failed");
                }
            }
        });
    }
}

impl fmt::Debug for BlockingTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTransaction")
            .field("tx", &self.tx)
            .finish_non_exhaustive()
    }
}

/// Synchronous iteration over a [`RowCursor`].
pub struct BlockingRowCursor<'t> {
    cursor: Option<RowCursor<'t>>,
    runtime: Arc<Runtime>,
}

impl<'t> BlockingRowCursor<'t> {
    fn new(cursor: RowCursor<'t>, runtime: &Arc<Runtime>) -> Self {
        Self {
            cursor: Some(cursor),
            runtime: Arc::clone(runtime),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        match &self.cursor {
            Some(cursor) => cursor.columns(),
            None => &[],
        }
    }

    #[must_use]
    pub fn holds_connection(&self) -> bool {
        self.cursor.as_ref().is_some_and(RowCursor::holds_connection)
    }

    /// # Errors
    /// As [`RowCursor::next`].
    pub fn next_record(&mut self) -> Result<Option<DataRecord>, SqlFacadeError> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(None);
        };
        drive(&self.runtime, cursor.next())?
    }

    /// # Errors
    /// As [`RowCursor::next_result`].
    pub fn next_result(&mut self) -> Result<bool, SqlFacadeError> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };
        drive(&self.runtime, cursor.next_result())?
    }

    /// Stop reading and release the connection.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(cursor) = self.cursor.take() else {
            return;
        };
        if Handle::try_current().is_ok() {
            drop(cursor);
        } else {
            self.runtime.block_on(cursor.close());
        }
    }
}

impl Iterator for BlockingRowCursor<'_> {
    type Item = Result<DataRecord, SqlFacadeError>;

    /// Records of the current result set only.
    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl Drop for BlockingRowCursor<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for BlockingRowCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingRowCursor")
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}
