use tracing::{debug, info, warn};

use super::binding::{bind_row, change_kind, output_values};
use super::{UpdateBehavior, UpdateCommands};
use crate::command::Command;
use crate::database::{CallLimits, Database, DbTransaction};
use crate::driver::{BatchOutcome, DriverConnection};
use crate::error::SqlFacadeError;
use crate::table::{Columns, DataSet, DataTable};
use crate::types::{ChangeKind, RowValues, UpdatedRowSource};

/// One pending row with its bound command.
struct Planned {
    row: usize,
    kind: ChangeKind,
    command: Command,
}

/// How the apply loop treats a failing row.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    Abort,
    Annotate,
}

#[derive(Default)]
struct Progress {
    /// Applied rows with the values to write back before accepting them.
    applied: Vec<(usize, Vec<(usize, RowValues)>)>,
    /// Rows that failed under continue mode.
    failed: Vec<(usize, String)>,
    abort: Option<SqlFacadeError>,
}

impl Database {
    /// Apply the pending rows of `table_name` using `commands`.
    ///
    /// Returns the number of rows applied. Applied rows have their changes accepted; under
    /// [`UpdateBehavior::Transactional`] that happens only after the commit.
    ///
    /// # Errors
    /// - `MissingTableName` for an empty or unknown table name.
    /// - `MissingCommand` when a pending row kind has no command (checked before any driver call).
    /// - `InvalidArgument` for `batch_size == Some(0)`.
    /// - `ContinueModeUnsupported` / `UnsupportedBatching` when the driver lacks the capability.
    /// - `SynchronizationFailed` for the first failing row outside continue mode.
    /// - Connection, begin and commit errors as raised by the driver.
    pub async fn update_data_set(
        &self,
        data_set: &mut DataSet,
        table_name: &str,
        commands: &UpdateCommands,
        behavior: UpdateBehavior,
        batch_size: Option<usize>,
    ) -> Result<usize, SqlFacadeError> {
        let table = lookup_table(data_set, table_name)?;
        let batch = self.check_batching(batch_size)?;
        if behavior == UpdateBehavior::Continue && !self.capabilities.row_outcomes {
            return Err(SqlFacadeError::ContinueModeUnsupported {
                driver: self.driver.name().to_string(),
            });
        }
        let plan = self.plan(table, commands, batch)?;
        if plan.is_empty() {
            debug!(database = %self.name, table = table_name, "no pending rows");
            return Ok(0);
        }

        let on_failure = if behavior == UpdateBehavior::Continue {
            OnFailure::Annotate
        } else {
            OnFailure::Abort
        };
        let columns = table.columns().clone();
        let mut conn = self.connect().await?;

        let result = if behavior == UpdateBehavior::Transactional {
            self.apply_transactional(conn.as_mut(), &columns, table, plan, batch)
                .await
        } else {
            let progress = self
                .apply(conn.as_mut(), &columns, plan, batch, on_failure)
                .await;
            self.finish(table, progress)
        };
        self.release(conn).await;
        let applied = result?;
        info!(database = %self.name, table = table_name, applied, ?behavior, "synchronized table");
        Ok(applied)
    }

    /// Apply the pending rows of `table_name` inside the caller's transaction.
    ///
    /// The first failure aborts the call; no commit or rollback is attempted. Rows applied before
    /// the failure are accepted.
    ///
    /// # Errors
    /// As [`update_data_set`](Self::update_data_set), except `ContinueModeUnsupported`.
    pub async fn update_data_set_in_transaction(
        &self,
        data_set: &mut DataSet,
        table_name: &str,
        commands: &UpdateCommands,
        tx: &mut DbTransaction,
        batch_size: Option<usize>,
    ) -> Result<usize, SqlFacadeError> {
        let table = lookup_table(data_set, table_name)?;
        let batch = self.check_batching(batch_size)?;
        let plan = self.plan(table, commands, batch)?;
        if plan.is_empty() {
            return Ok(0);
        }
        let columns = table.columns().clone();
        let conn = tx.connection_mut(self)?;
        let progress = self
            .apply(conn, &columns, plan, batch, OnFailure::Abort)
            .await;
        let applied = self.finish(table, progress)?;
        info!(database = %self.name, table = table_name, applied, "synchronized table in caller transaction");
        Ok(applied)
    }

    fn check_batching(&self, batch_size: Option<usize>) -> Result<usize, SqlFacadeError> {
        match batch_size {
            None | Some(1) => Ok(1),
            Some(0) => Err(SqlFacadeError::InvalidArgument(
                "batch size must be at least 1".into(),
            )),
            Some(size) if self.capabilities.batching => Ok(size),
            Some(_) => Err(SqlFacadeError::UnsupportedBatching {
                driver: self.driver.name().to_string(),
            }),
        }
    }

    /// Bind every pending row before any driver call, so argument errors never leave a
    /// half-applied table behind.
    fn plan(
        &self,
        table: &mut DataTable,
        commands: &UpdateCommands,
        batch: usize,
    ) -> Result<Vec<Planned>, SqlFacadeError> {
        let pending: Vec<(usize, ChangeKind)> = table
            .rows()
            .iter()
            .enumerate()
            .filter_map(|(idx, row)| change_kind(row.state()).map(|kind| (idx, kind)))
            .collect();

        for kind in [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete] {
            if commands.get(kind).is_none() && pending.iter().any(|(_, k)| *k == kind) {
                return Err(SqlFacadeError::MissingCommand {
                    kind,
                    table: table.name().to_string(),
                });
            }
        }

        let mut plan = Vec::with_capacity(pending.len());
        for (row, kind) in pending {
            let Some(template) = commands.get(kind) else {
                continue;
            };
            let Some(data_row) = table.row(row) else {
                continue;
            };
            let mut command = bind_row(template, data_row, kind)?;
            if batch > 1 {
                command.set_updated_row_source(UpdatedRowSource::None);
            }
            self.preflight(&command)?;
            plan.push(Planned { row, kind, command });
        }
        for planned in &plan {
            if let Some(row) = table.row_mut(planned.row) {
                row.clear_error();
            }
        }
        Ok(plan)
    }

    async fn apply_transactional(
        &self,
        conn: &mut dyn DriverConnection,
        columns: &Columns,
        table: &mut DataTable,
        plan: Vec<Planned>,
        batch: usize,
    ) -> Result<usize, SqlFacadeError> {
        conn.begin()
            .await
            .map_err(|e| e.with_context(&self.name, "BEGIN"))?;
        let mut progress = self
            .apply(conn, columns, plan, batch, OnFailure::Abort)
            .await;
        if let Some(err) = progress.abort.take() {
            self.rollback_quietly(conn).await;
            return Err(err);
        }
        if let Err(e) = conn.commit().await {
            self.rollback_quietly(conn).await;
            return Err(e.with_context(&self.name, "COMMIT"));
        }
        self.finish(table, progress)
    }

    async fn rollback_quietly(&self, conn: &mut dyn DriverConnection) {
        if let Err(e) = conn.rollback().await {
            warn!(database = %self.name, error = %e, "rollback after failed synchronization failed");
        }
    }

    async fn apply(
        &self,
        conn: &mut dyn DriverConnection,
        columns: &Columns,
        plan: Vec<Planned>,
        batch: usize,
        on_failure: OnFailure,
    ) -> Progress {
        let mut progress = Progress::default();
        if batch > 1 {
            let mut rows = plan.into_iter().peekable();
            while rows.peek().is_some() {
                let chunk: Vec<Planned> = rows.by_ref().take(batch).collect();
                if let Err(e) = self.apply_batch(conn, chunk, on_failure, &mut progress).await {
                    progress.abort = Some(e);
                    break;
                }
            }
        } else {
            for planned in plan {
                if let Err(e) = self
                    .apply_row(conn, columns, planned, on_failure, &mut progress)
                    .await
                {
                    progress.abort = Some(e);
                    break;
                }
            }
        }
        progress
    }

    async fn apply_row(
        &self,
        conn: &mut dyn DriverConnection,
        columns: &Columns,
        mut planned: Planned,
        on_failure: OnFailure,
        progress: &mut Progress,
    ) -> Result<(), SqlFacadeError> {
        let reason = match self.non_query_on(conn, &mut planned.command).await {
            Ok(0) => RowFailure::conflict(planned.kind),
            Ok(_) => {
                let outputs = output_values(&planned.command, columns)?;
                progress.applied.push((planned.row, outputs));
                return Ok(());
            }
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => RowFailure::from(e),
        };
        self.row_failed(&planned, reason, on_failure, progress)
    }

    async fn apply_batch(
        &self,
        conn: &mut dyn DriverConnection,
        chunk: Vec<Planned>,
        on_failure: OnFailure,
        progress: &mut Progress,
    ) -> Result<(), SqlFacadeError> {
        let mut commands: Vec<Command> = chunk.iter().map(|p| p.command.clone()).collect();
        let limits = CallLimits::of(&commands[0]);
        debug!(database = %self.name, statements = commands.len(), "execute batch");
        let outcome = limits
            .run(conn.execute_batch(
                &mut commands,
                on_failure == OnFailure::Annotate,
                &limits.token,
            ))
            .await
            .map_err(|e| e.with_context(&self.name, &limits.text))?;

        let mut first_error: Option<SqlFacadeError> = None;
        match outcome {
            BatchOutcome::PerStatement(results) => {
                let mut results = results.into_iter();
                for planned in &chunk {
                    let reason = match results.next() {
                        Some(Ok(0)) => RowFailure::conflict(planned.kind),
                        Some(Ok(_)) => {
                            progress.applied.push((planned.row, Vec::new()));
                            continue;
                        }
                        Some(Err(e)) if is_fatal(&e) => return Err(e),
                        Some(Err(e)) => RowFailure::from(e),
                        None if on_failure == OnFailure::Abort => break,
                        None => RowFailure::reason("statement was not executed"),
                    };
                    if let Err(e) = self.row_failed(planned, reason, on_failure, progress) {
                        first_error.get_or_insert(e);
                    }
                }
            }
            BatchOutcome::Total(total) => {
                let expected = i64::try_from(chunk.len()).unwrap_or(i64::MAX);
                if total < 0 || total >= expected {
                    for planned in &chunk {
                        progress.applied.push((planned.row, Vec::new()));
                    }
                } else {
                    // Partially applied batches cannot be attributed; see `BatchOutcome::Total`.
                    let reason =
                        format!("batch affected {total} rows, expected at least {expected}");
                    for planned in &chunk {
                        let failure = RowFailure::reason(&reason);
                        if let Err(e) = self.row_failed(planned, failure, on_failure, progress) {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn row_failed(
        &self,
        planned: &Planned,
        failure: RowFailure,
        on_failure: OnFailure,
        progress: &mut Progress,
    ) -> Result<(), SqlFacadeError> {
        let RowFailure { reason, source } = failure;
        match on_failure {
            OnFailure::Annotate => {
                warn!(database = %self.name, row = planned.row, kind = %planned.kind, %reason, "row failed, continuing");
                progress.failed.push((planned.row, reason));
                Ok(())
            }
            OnFailure::Abort => Err(SqlFacadeError::SynchronizationFailed {
                database: self.name.clone(),
                command: planned.command.command_text().to_string(),
                row: planned.row,
                reason,
                source: source.map(Box::new),
            }),
        }
    }

    /// Write back outputs, annotate failures, then accept applied rows.
    fn finish(&self, table: &mut DataTable, progress: Progress) -> Result<usize, SqlFacadeError> {
        let Progress {
            applied,
            failed,
            abort,
        } = progress;
        for (row, reason) in failed {
            if let Some(data_row) = table.row_mut(row) {
                data_row.set_error(reason);
            }
        }
        let mut accepted = Vec::with_capacity(applied.len());
        for (row, outputs) in applied {
            if let Some(data_row) = table.row_mut(row) {
                for (column, value) in outputs {
                    data_row.write_current(column, value);
                }
            }
            accepted.push(row);
        }
        let count = accepted.len();
        table.accept_rows(&accepted);
        match abort {
            Some(err) => Err(err),
            None => Ok(count),
        }
    }
}

fn lookup_table<'a>(
    data_set: &'a mut DataSet,
    table_name: &str,
) -> Result<&'a mut DataTable, SqlFacadeError> {
    if table_name.trim().is_empty() {
        return Err(SqlFacadeError::MissingTableName {
            table: table_name.to_string(),
        });
    }
    data_set
        .table_mut(table_name)
        .ok_or_else(|| SqlFacadeError::MissingTableName {
            table: table_name.to_string(),
        })
}

/// Why a single row failed; driver errors keep their typed source.
struct RowFailure {
    reason: String,
    source: Option<SqlFacadeError>,
}

impl RowFailure {
    fn conflict(kind: ChangeKind) -> Self {
        Self::reason(&format!("concurrency violation: the {kind} command affected 0 rows"))
    }

    fn reason(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
            source: None,
        }
    }
}

impl From<SqlFacadeError> for RowFailure {
    fn from(err: SqlFacadeError) -> Self {
        Self {
            reason: err.to_string(),
            source: Some(err),
        }
    }
}

/// Errors that end the whole call instead of failing a single row.
fn is_fatal(err: &SqlFacadeError) -> bool {
    matches!(
        err.root(),
        SqlFacadeError::Cancelled | SqlFacadeError::Timeout { .. }
    )
}
