use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{Database, DbTransaction, RowCursor};
use crate::command::Command;
use crate::driver::{DriverConnection, DriverReader, ResultData};
use crate::error::SqlFacadeError;
use crate::table::{DataSet, default_table_name};
use crate::types::{CommandKind, RowValues};

/// Per-call execution limits derived from a command.
pub(crate) struct CallLimits {
    pub(crate) text: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) token: CancellationToken,
}

impl CallLimits {
    pub(crate) fn of(command: &Command) -> Self {
        let token = command
            .cancellation()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        Self {
            text: command.command_text().to_string(),
            timeout: command.timeout(),
            token,
        }
    }

    /// Drive `work` until it finishes, the token is cancelled, or the timeout elapses. On timeout
    /// the token is cancelled so the driver can interrupt the statement.
    pub(crate) async fn run<T, F>(&self, work: F) -> Result<T, SqlFacadeError>
    where
        F: Future<Output = Result<T, SqlFacadeError>>,
    {
        let guarded = async {
            tokio::select! {
                biased;
                () = self.token.cancelled() => Err(SqlFacadeError::Cancelled),
                res = work => res,
            }
        };
        match self.timeout {
            Some(after) => match tokio::time::timeout(after, guarded).await {
                Ok(res) => res,
                Err(_) => {
                    self.token.cancel();
                    Err(SqlFacadeError::Timeout {
                        command: self.text.clone(),
                        after,
                    })
                }
            },
            None => guarded.await,
        }
    }
}

impl Database {
    /// Checks shared by every execution entry point, run before a connection is touched.
    pub(crate) fn preflight(&self, command: &Command) -> Result<(), SqlFacadeError> {
        if command.cancellation().is_some_and(CancellationToken::is_cancelled) {
            return Err(SqlFacadeError::Cancelled);
        }
        if command.kind() == CommandKind::StoredProcedure && !self.capabilities.stored_procedures {
            return Err(SqlFacadeError::Unimplemented(format!(
                "driver '{}' does not execute stored procedures",
                self.driver.name()
            )));
        }
        if let Some(missing) = command
            .parameters()
            .iter()
            .find(|p| p.direction.sends_value() && p.value.is_none())
        {
            return Err(SqlFacadeError::ParameterError(format!(
                "parameter '{}' of '{}' has no value",
                missing.name,
                command.command_text()
            )));
        }
        Ok(())
    }

    pub(crate) async fn non_query_on(
        &self,
        conn: &mut dyn DriverConnection,
        command: &mut Command,
    ) -> Result<i64, SqlFacadeError> {
        let limits = CallLimits::of(command);
        debug!(database = %self.name, sql = %limits.text, "execute non-query");
        limits
            .run(conn.execute_non_query(command, &limits.token))
            .await
            .map_err(|e| e.with_context(&self.name, &limits.text))
    }

    async fn scalar_on(
        &self,
        conn: &mut dyn DriverConnection,
        command: &mut Command,
    ) -> Result<Option<RowValues>, SqlFacadeError> {
        let limits = CallLimits::of(command);
        debug!(database = %self.name, sql = %limits.text, "execute scalar");
        limits
            .run(conn.execute_scalar(command, &limits.token))
            .await
            .map_err(|e| e.with_context(&self.name, &limits.text))
    }

    async fn reader_on(
        &self,
        conn: &mut dyn DriverConnection,
        command: &mut Command,
    ) -> Result<Box<dyn DriverReader>, SqlFacadeError> {
        let limits = CallLimits::of(command);
        debug!(database = %self.name, sql = %limits.text, "execute reader");
        limits
            .run(conn.execute_reader(command, &limits.token))
            .await
            .map_err(|e| e.with_context(&self.name, &limits.text))
    }

    async fn results_on(
        &self,
        conn: &mut dyn DriverConnection,
        command: &mut Command,
    ) -> Result<Vec<ResultData>, SqlFacadeError> {
        let mut reader = self.reader_on(conn, command).await?;
        drain(reader.as_mut())
            .await
            .map_err(|e| e.with_context(&self.name, command.command_text()))
    }

    /// Execute a statement and return its affected-row count (`-1` when the driver cannot tell).
    ///
    /// # Errors
    /// Returns `Cancelled`, `Timeout`, `ParameterError`, or the driver error wrapped in
    /// `Context`.
    pub async fn execute_non_query(&self, command: &mut Command) -> Result<i64, SqlFacadeError> {
        self.preflight(command)?;
        let mut conn = self.connect().await?;
        let res = self.non_query_on(conn.as_mut(), command).await;
        self.release(conn).await;
        res
    }

    /// [`execute_non_query`](Self::execute_non_query) on the transaction's connection.
    ///
    /// # Errors
    /// As `execute_non_query`, plus `InvalidArgument` for a transaction of another database.
    pub async fn execute_non_query_in_transaction(
        &self,
        command: &mut Command,
        tx: &mut DbTransaction,
    ) -> Result<i64, SqlFacadeError> {
        self.preflight(command)?;
        self.non_query_on(tx.connection_mut(self)?, command).await
    }

    /// First column of the first row, `None` when the command produces no rows.
    ///
    /// # Errors
    /// As [`execute_non_query`](Self::execute_non_query).
    pub async fn execute_scalar(
        &self,
        command: &mut Command,
    ) -> Result<Option<RowValues>, SqlFacadeError> {
        self.preflight(command)?;
        let mut conn = self.connect().await?;
        let res = self.scalar_on(conn.as_mut(), command).await;
        self.release(conn).await;
        res
    }

    /// # Errors
    /// As [`execute_scalar`](Self::execute_scalar).
    pub async fn execute_scalar_in_transaction(
        &self,
        command: &mut Command,
        tx: &mut DbTransaction,
    ) -> Result<Option<RowValues>, SqlFacadeError> {
        self.preflight(command)?;
        self.scalar_on(tx.connection_mut(self)?, command).await
    }

    /// Open a cursor that owns its connection.
    ///
    /// # Errors
    /// As [`execute_non_query`](Self::execute_non_query); the connection is released on error.
    pub async fn execute_reader(
        &self,
        command: &mut Command,
    ) -> Result<RowCursor<'static>, SqlFacadeError> {
        self.preflight(command)?;
        let mut conn = self.connect().await?;
        match self.reader_on(conn.as_mut(), command).await {
            Ok(reader) => Ok(RowCursor::new(&self.name, reader, Some(conn))),
            Err(e) => {
                self.release(conn).await;
                Err(e)
            }
        }
    }

    /// Open a cursor on the transaction's connection.
    ///
    /// # Errors
    /// As [`execute_reader`](Self::execute_reader).
    pub async fn execute_reader_in_transaction<'t>(
        &self,
        command: &mut Command,
        tx: &'t mut DbTransaction,
    ) -> Result<RowCursor<'t>, SqlFacadeError> {
        self.preflight(command)?;
        let reader = self.reader_on(tx.connection_mut(self)?, command).await?;
        Ok(RowCursor::new(&self.name, reader, None))
    }

    /// Materialize every result set into tables named `Table`, `Table1`, ...
    ///
    /// # Errors
    /// As [`execute_non_query`](Self::execute_non_query).
    pub async fn execute_data_set(&self, command: &mut Command) -> Result<DataSet, SqlFacadeError> {
        let mut data_set = DataSet::new();
        self.load_data_set(command, &mut data_set, &[]).await?;
        Ok(data_set)
    }

    /// # Errors
    /// As [`execute_data_set`](Self::execute_data_set).
    pub async fn execute_data_set_in_transaction(
        &self,
        command: &mut Command,
        tx: &mut DbTransaction,
    ) -> Result<DataSet, SqlFacadeError> {
        let mut data_set = DataSet::new();
        self.load_data_set_in_transaction(command, &mut data_set, &[], tx)
            .await?;
        Ok(data_set)
    }

    /// Fill caller-named tables: result set `i` goes to `table_names[i]`, extra result sets keep
    /// their default names. Existing tables with matching columns are appended to.
    ///
    /// # Errors
    /// As [`execute_non_query`](Self::execute_non_query), plus `InvalidArgument` when an existing
    /// table's columns differ from the result set.
    pub async fn load_data_set(
        &self,
        command: &mut Command,
        data_set: &mut DataSet,
        table_names: &[&str],
    ) -> Result<(), SqlFacadeError> {
        self.preflight(command)?;
        let mut conn = self.connect().await?;
        let res = self.results_on(conn.as_mut(), command).await;
        self.release(conn).await;
        fill_tables(data_set, res?, table_names)
    }

    /// # Errors
    /// As [`load_data_set`](Self::load_data_set).
    pub async fn load_data_set_in_transaction(
        &self,
        command: &mut Command,
        data_set: &mut DataSet,
        table_names: &[&str],
        tx: &mut DbTransaction,
    ) -> Result<(), SqlFacadeError> {
        self.preflight(command)?;
        let results = self.results_on(tx.connection_mut(self)?, command).await?;
        fill_tables(data_set, results, table_names)
    }
}

async fn drain(reader: &mut dyn DriverReader) -> Result<Vec<ResultData>, SqlFacadeError> {
    let mut results = Vec::new();
    loop {
        let columns = reader.columns().to_vec();
        let mut rows = Vec::new();
        while let Some(row) = reader.next_row().await? {
            rows.push(row);
        }
        results.push(ResultData::new(columns, rows));
        if !reader.next_result().await? {
            break;
        }
    }
    Ok(results)
}

fn fill_tables(
    data_set: &mut DataSet,
    results: Vec<ResultData>,
    table_names: &[&str],
) -> Result<(), SqlFacadeError> {
    for (position, result) in results
        .into_iter()
        .filter(|r| !r.columns.is_empty())
        .enumerate()
    {
        let name = table_names
            .get(position)
            .map_or_else(|| default_table_name(position), |n| (*n).to_string());
        data_set.fill(&name, result.columns, result.rows)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_cancels_the_token() {
        let mut cmd = Command::text("SELECT slow()").unwrap();
        cmd.set_timeout(Some(Duration::from_millis(10)));
        let limits = CallLimits::of(&cmd);
        let res: Result<(), _> = limits
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(SqlFacadeError::Timeout { .. })));
        assert!(limits.token.is_cancelled());
    }

    #[tokio::test]
    async fn caller_cancellation_reaches_child_token() {
        let parent = CancellationToken::new();
        let mut cmd = Command::text("SELECT 1").unwrap();
        cmd.set_cancellation(Some(parent.clone()));
        let limits = CallLimits::of(&cmd);
        parent.cancel();
        let res: Result<(), _> = limits.run(std::future::pending()).await;
        assert!(matches!(res, Err(SqlFacadeError::Cancelled)));
    }

    #[test]
    fn extra_result_sets_keep_default_names() -> Result<(), SqlFacadeError> {
        let mut ds = DataSet::new();
        let results = vec![
            ResultData::new(vec!["a".into()], vec![vec![RowValues::Int(1)]]),
            ResultData::new(vec!["b".into()], vec![]),
        ];
        fill_tables(&mut ds, results, &["Orders"])?;
        assert!(ds.table("Orders").is_some());
        assert!(ds.table("Table1").is_some());
        Ok(())
    }
}
