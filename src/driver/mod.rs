//! Driver capability interface.
//!
//! The façade never talks to a database directly; every round trip goes through these traits.
//! Optional operations are gated by [`DriverCapabilities`] and are never attempted when the
//! corresponding flag is off.

mod reader;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use reader::{MaterializedReader, ResultData};

use crate::command::{Command, Parameter, bare_name};
use crate::error::SqlFacadeError;
use crate::types::RowValues;

/// Capability flags a driver advertises; snapshotted when a [`Database`](crate::Database) is
/// built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverCapabilities {
    /// Can derive stored-procedure parameters.
    pub parameter_discovery: bool,
    /// Implements [`DriverConnection::execute_batch`].
    pub batching: bool,
    /// Reports per-statement affected-row counts, so single-row failures are attributable.
    pub row_outcomes: bool,
    /// Interrupts an in-flight statement when its token is cancelled.
    pub cancellation: bool,
    /// Executes [`CommandKind::StoredProcedure`](crate::types::CommandKind::StoredProcedure)
    /// commands.
    pub stored_procedures: bool,
}

/// Result of one batched round trip.
#[derive(Debug)]
pub enum BatchOutcome {
    /// One entry per submitted statement, in order. Statements after a stop are absent.
    PerStatement(Vec<Result<i64, SqlFacadeError>>),
    /// Only the total affected-row count is known.
    ///
    /// A total below the batch length fails every row of the batch, since the short rows cannot
    /// be told apart. In continue mode those rows stay pending with an error annotation even
    /// when some of them were written, and a later synchronization submits them again. Drivers
    /// that advertise `row_outcomes` should answer with [`BatchOutcome::PerStatement`].
    Total(i64),
}

/// Factory for connections of one provider.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Provider invariant name, e.g. `sqlite`.
    fn name(&self) -> &str;

    fn capabilities(&self) -> DriverCapabilities;

    /// Prefix a bare parameter name the way this driver's SQL expects.
    fn build_parameter_name(&self, name: &str) -> String {
        format!("@{}", bare_name(name))
    }

    /// Open a connection.
    ///
    /// # Errors
    /// Returns `ConnectionError` (or a driver-native error) when the connection cannot be opened.
    /// Nothing half-open survives a failed call.
    async fn connect(
        &self,
        connection_string: &str,
    ) -> Result<Box<dyn DriverConnection>, SqlFacadeError>;
}

/// One open connection. Dropping it releases the underlying resource.
#[async_trait]
pub trait DriverConnection: Send {
    fn driver_name(&self) -> &str;

    async fn execute_reader(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<Box<dyn DriverReader>, SqlFacadeError>;

    /// First column of the first row, `None` when no row is produced.
    async fn execute_scalar(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<Option<RowValues>, SqlFacadeError> {
        let mut reader = self.execute_reader(command, token).await?;
        Ok(reader
            .next_row()
            .await?
            .and_then(|row| row.into_iter().next()))
    }

    /// Affected-row count, `-1` when the driver cannot tell.
    async fn execute_non_query(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<i64, SqlFacadeError>;

    async fn begin(&mut self) -> Result<(), SqlFacadeError>;

    async fn commit(&mut self) -> Result<(), SqlFacadeError>;

    async fn rollback(&mut self) -> Result<(), SqlFacadeError>;

    /// Execute several non-query commands in one round trip.
    ///
    /// With `continue_on_error` every statement is attempted; otherwise the driver stops at the
    /// first failing statement.
    async fn execute_batch(
        &mut self,
        _commands: &mut [Command],
        _continue_on_error: bool,
        _token: &CancellationToken,
    ) -> Result<BatchOutcome, SqlFacadeError> {
        Err(SqlFacadeError::UnsupportedBatching {
            driver: self.driver_name().to_string(),
        })
    }

    /// Derive the parameter list of the stored procedure named by `command`.
    async fn derive_parameters(
        &mut self,
        _command: &Command,
    ) -> Result<Vec<Parameter>, SqlFacadeError> {
        Err(SqlFacadeError::UnsupportedDiscovery {
            driver: self.driver_name().to_string(),
        })
    }

    /// Close the connection; further calls are undefined.
    async fn close(&mut self) -> Result<(), SqlFacadeError>;
}

/// Forward-only access to one or more result sets.
#[async_trait]
pub trait DriverReader: Send {
    /// Column names of the current result set.
    fn columns(&self) -> &[String];

    async fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlFacadeError>;

    /// Advance to the next result set; `false` when there is none.
    async fn next_result(&mut self) -> Result<bool, SqlFacadeError>;

    fn has_next_result(&self) -> bool;
}
