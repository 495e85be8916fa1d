use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::runtime::Handle;
use tokio_postgres::{Client, NoTls};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{Command, Parameter};
use crate::driver::{BatchOutcome, DriverConnection, DriverReader, MaterializedReader};
use crate::error::SqlFacadeError;

use super::config::PgPooledConnection;
use super::discovery::routine_parameters;
use super::query::{PgStatement, Purpose, execute, execute_count, plan, query};

/// Connection wrapper backed by a bb8 pooled Postgres client.
///
/// Dropping it inside an open transaction spawns a rollback before the client returns to the
/// pool.
pub struct PostgresConnection {
    conn: Option<PgPooledConnection>,
    in_transaction: bool,
}

impl PostgresConnection {
    pub(crate) fn new(conn: PgPooledConnection) -> Self {
        Self {
            conn: Some(conn),
            in_transaction: false,
        }
    }

    fn client(&self) -> Result<&Client, SqlFacadeError> {
        self.conn
            .as_deref()
            .ok_or_else(|| SqlFacadeError::ConnectionError("postgres connection is closed".into()))
    }

    async fn run_control(&mut self, sql: &'static str) -> Result<(), SqlFacadeError> {
        debug!(sql, "postgres transaction control");
        self.client()?.batch_execute(sql).await?;
        Ok(())
    }
}

/// Drive `work`, sending a server-side cancel request if `token` fires first.
async fn cancellable<T, F>(
    client: &Client,
    token: &CancellationToken,
    work: F,
) -> Result<T, SqlFacadeError>
where
    F: Future<Output = Result<T, SqlFacadeError>>,
{
    if token.is_cancelled() {
        return Err(SqlFacadeError::Cancelled);
    }
    let cancel = client.cancel_token();
    let watched = token.clone();
    let watcher = tokio::spawn(async move {
        watched.cancelled().await;
        if let Err(e) = cancel.cancel_query(NoTls).await {
            warn!(error = %e, "postgres cancel request failed");
        }
    });
    let result = work.await;
    watcher.abort();
    match result {
        Err(_) if token.is_cancelled() => Err(SqlFacadeError::Cancelled),
        other => other,
    }
}

#[async_trait]
impl DriverConnection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    async fn execute_reader(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<Box<dyn DriverReader>, SqlFacadeError> {
        let statement = plan(command, Purpose::Rows)?;
        let client = self.client()?;
        let result = cancellable(client, token, query(client, &statement)).await?;
        Ok(Box::new(MaterializedReader::new(vec![result])))
    }

    async fn execute_non_query(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<i64, SqlFacadeError> {
        let statement = plan(command, Purpose::Effect)?;
        let client = self.client()?;
        cancellable(client, token, execute(client, &statement, command)).await
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

    /// Stopping on error runs statements one after another; continuing pipelines them all on
    /// the client at once.
    async fn execute_batch(
        &mut self,
        commands: &mut [Command],
        continue_on_error: bool,
        token: &CancellationToken,
    ) -> Result<BatchOutcome, SqlFacadeError> {
        let statements: Vec<PgStatement> = commands
            .iter()
            .map(|c| plan(c, Purpose::Effect))
            .collect::<Result<_, _>>()?;
        debug!(statements = statements.len(), pipelined = continue_on_error, "postgres batch");
        let client = self.client()?;
        let outcomes = cancellable(client, token, async {
            if continue_on_error {
                return Ok(join_all(statements.iter().map(|s| execute_count(client, s))).await);
            }
            let mut outcomes = Vec::with_capacity(statements.len());
            for statement in &statements {
                let outcome = execute_count(client, statement).await;
                let failed = outcome.is_err();
                outcomes.push(outcome);
                if failed {
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

    async fn derive_parameters(
        &mut self,
        command: &Command,
    ) -> Result<Vec<Parameter>, SqlFacadeError> {
        routine_parameters(self.client()?, command.command_text()).await
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

impl Drop for PostgresConnection {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        let Some(conn) = self.conn.take() else {
            return;
        };
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = conn.batch_execute("ROLLBACK").await {
                        warn!(error = %e, "postgres rollback on drop failed");
                    }
                });
            }
            Err(_) => warn!("no tokio runtime on drop; postgres transaction left open"),
        }
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConnection")
            .field("in_transaction", &self.in_transaction)
            .field("open", &self.conn.is_some())
            .finish()
    }
}
