use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::Command;
use crate::driver::{BatchOutcome, DriverConnection, DriverReader, MaterializedReader};
use crate::error::SqlFacadeError;
use crate::types::CommandKind;

use super::config::{SharedSqliteConnection, SqlitePooledConnection};
use super::params::Params;
use super::query::{ExecOutcome, execute_script, query_script};

/// Connection wrapper backed by a bb8 pooled `SQLite` connection.
///
/// Dropping it inside an open transaction rolls the transaction back before the connection
/// returns to the pool.
pub struct SqliteConnection {
    conn: Option<SqlitePooledConnection>,
    in_transaction: bool,
}

impl SqliteConnection {
    pub(crate) fn new(conn: SqlitePooledConnection) -> Self {
        Self {
            conn: Some(conn),
            in_transaction: false,
        }
    }

    fn conn_handle(&self) -> Result<SharedSqliteConnection, SqlFacadeError> {
        self.conn
            .as_ref()
            .map(|c| Arc::clone(&**c))
            .ok_or_else(|| SqlFacadeError::ConnectionError("sqlite connection is closed".into()))
    }

    async fn run_control(&mut self, sql: &'static str) -> Result<(), SqlFacadeError> {
        debug!(sql, "sqlite transaction control");
        run_blocking(self.conn_handle()?, move |guard| {
            guard.execute_batch(sql)?;
            Ok(())
        })
        .await
    }
}

/// Run `func` on a blocking thread, interrupting the statement when `token` fires.
async fn run_interruptible<F, R>(
    handle: SharedSqliteConnection,
    token: &CancellationToken,
    func: F,
) -> Result<R, SqlFacadeError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlFacadeError> + Send + 'static,
    R: Send + 'static,
{
    if token.is_cancelled() {
        return Err(SqlFacadeError::Cancelled);
    }
    let interrupt = handle.lock().await.get_interrupt_handle();
    let watched = token.clone();
    let watcher = tokio::spawn(async move {
        watched.cancelled().await;
        interrupt.interrupt();
    });
    let result = run_blocking(handle, func).await;
    watcher.abort();
    match result {
        Err(_) if token.is_cancelled() => Err(SqlFacadeError::Cancelled),
        other => other,
    }
}

fn reject_stored_procedure(command: &Command) -> Result<(), SqlFacadeError> {
    if command.kind() == CommandKind::StoredProcedure {
        return Err(SqlFacadeError::Unimplemented(
            "sqlite has no stored procedures".into(),
        ));
    }
    Ok(())
}

/// Copy `RETURNING` columns into output parameters of the same name.
fn apply_returned(command: &mut Command, outcome: ExecOutcome) -> i64 {
    for (column, value) in outcome.returned {
        if let Some(parameter) = command
            .parameters_mut()
            .iter_mut()
            .find(|p| p.direction.receives_value() && p.matches(&column))
        {
            parameter.value = Some(value);
        }
    }
    outcome.affected
}

#[async_trait]
impl DriverConnection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    async fn execute_reader(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<Box<dyn DriverReader>, SqlFacadeError> {
        reject_stored_procedure(command)?;
        let sql = command.command_text().to_string();
        let params = Params::from_command(command);
        let results = run_interruptible(self.conn_handle()?, token, move |guard| {
            query_script(guard, &sql, &params)
        })
        .await?;
        Ok(Box::new(MaterializedReader::new(results)))
    }

    async fn execute_non_query(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<i64, SqlFacadeError> {
        reject_stored_procedure(command)?;
        let sql = command.command_text().to_string();
        let params = Params::from_command(command);
        let outcome = run_interruptible(self.conn_handle()?, token, move |guard| {
            execute_script(guard, &sql, &params)
        })
        .await?;
        Ok(apply_returned(command, outcome))
    }

    async fn begin(&mut self) -> Result<(), SqlFacadeError> {
        self.run_control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlFacadeError> {
        self.run_control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlFacadeError> {
        let res = self.run_control("ROLLBACK").await;
        self.in_transaction = false;
        res
    }

    async fn execute_batch(
        &mut self,
        commands: &mut [Command],
        continue_on_error: bool,
        token: &CancellationToken,
    ) -> Result<BatchOutcome, SqlFacadeError> {
        for command in commands.iter() {
            reject_stored_procedure(command)?;
        }
        let work: Vec<(String, Params)> = commands
            .iter()
            .map(|c| (c.command_text().to_string(), Params::from_command(c)))
            .collect();
        debug!(statements = work.len(), "sqlite batch");
        let outcomes = run_interruptible(self.conn_handle()?, token, move |guard| {
            let mut outcomes = Vec::with_capacity(work.len());
            for (sql, params) in &work {
                let outcome = execute_script(guard, sql, params).map(|o| o.affected);
                let failed = outcome.is_err();
                outcomes.push(outcome);
                if failed && !continue_on_error {
                    break;
                }
            }
            Ok(outcomes)
        })
        .await?;
        if token.is_cancelled() {
            return Err(SqlFacadeError::Cancelled);
        }
        Ok(BatchOutcome::PerStatement(outcomes))
    }

    async fn close(&mut self) -> Result<(), SqlFacadeError> {
        let res = if self.in_transaction {
            self.rollback().await
        } else {
            Ok(())
        };
        self.conn = None;
        res
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        let Some(conn) = self.conn.take() else {
            return;
        };
        // Synchronous so the connection is clean before the next checkout.
        match conn.try_lock() {
            Ok(guard) => {
                if let Err(e) = guard.execute_batch("ROLLBACK") {
                    warn!(error = %e, "sqlite rollback on drop failed");
                }
            }
            Err(_) => warn!("sqlite connection busy on drop; transaction left to the pool"),
        }
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("in_transaction", &self.in_transaction)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlFacadeError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlFacadeError> + Send + 'static,
    R: Send + 'static,
{
    spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| SqlFacadeError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}
