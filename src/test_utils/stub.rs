use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, Parameter};
use crate::driver::{
    BatchOutcome, Driver, DriverCapabilities, DriverConnection, DriverReader, MaterializedReader,
    ResultData,
};
use crate::error::SqlFacadeError;

/// One observed driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StubCall {
    Connect,
    /// A reader, scalar or non-query round trip, with the command text.
    Execute(String),
    /// A batched round trip carrying this many statements.
    Batch(usize),
    Begin,
    Commit,
    Rollback,
    Derive(String),
    /// An in-flight statement saw its token cancelled.
    Interrupted,
    Close,
    /// A connection was dropped without `close`.
    Dropped,
}

type NonQueryFn = dyn Fn(&mut Command) -> Result<i64, SqlFacadeError> + Send + Sync;

struct StubState {
    calls: Mutex<Vec<StubCall>>,
    open: AtomicUsize,
    non_query: Mutex<Arc<NonQueryFn>>,
    results: Mutex<Vec<ResultData>>,
    batch_totals: Mutex<bool>,
    procedures: Mutex<HashMap<String, Vec<Parameter>>>,
    connect_error: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StubState {
    fn record(&self, call: StubCall) {
        lock(&self.calls).push(call);
    }

    fn non_query(&self) -> Arc<NonQueryFn> {
        Arc::clone(&lock(&self.non_query))
    }

    async fn pause(&self, token: &CancellationToken) -> Result<(), SqlFacadeError> {
        let delay = *lock(&self.delay);
        let Some(delay) = delay else {
            return Ok(());
        };
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = token.cancelled() => {
                self.record(StubCall::Interrupted);
                Err(SqlFacadeError::Cancelled)
            }
        }
    }
}

/// A scriptable in-process driver that records every call.
///
/// Non-queries report one affected row unless [`StubDriver::on_non_query`] says otherwise;
/// readers replay the canned [`StubDriver::with_results`] result sets.
pub struct StubDriver {
    name: String,
    capabilities: DriverCapabilities,
    state: Arc<StubState>,
}

impl StubDriver {
    /// A driver advertising every capability.
    #[must_use]
    pub fn new() -> Self {
        let affects_one: Arc<NonQueryFn> =
            Arc::new(|_: &mut Command| -> Result<i64, SqlFacadeError> { Ok(1) });
        Self {
            name: "stub".into(),
            capabilities: DriverCapabilities {
                parameter_discovery: true,
                batching: true,
                row_outcomes: true,
                cancellation: true,
                stored_procedures: true,
            },
            state: Arc::new(StubState {
                calls: Mutex::new(Vec::new()),
                open: AtomicUsize::new(0),
                non_query: Mutex::new(affects_one),
                results: Mutex::new(Vec::new()),
                batch_totals: Mutex::new(false),
                procedures: Mutex::new(HashMap::new()),
                connect_error: Mutex::new(None),
                delay: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Script non-query (and batched statement) outcomes.
    pub fn on_non_query<F>(&self, f: F)
    where
        F: Fn(&mut Command) -> Result<i64, SqlFacadeError> + Send + Sync + 'static,
    {
        *lock(&self.state.non_query) = Arc::new(f);
    }

    /// Result sets every reader returns.
    pub fn with_results(&self, results: Vec<ResultData>) {
        *lock(&self.state.results) = results;
    }

    /// Report only batch totals instead of per-statement outcomes.
    pub fn report_batch_totals(&self, totals: bool) {
        *lock(&self.state.batch_totals) = totals;
    }

    pub fn with_procedure(&self, name: &str, parameters: Vec<Parameter>) {
        lock(&self.state.procedures).insert(name.to_ascii_lowercase(), parameters);
    }

    pub fn fail_connect(&self, message: &str) {
        *lock(&self.state.connect_error) = Some(message.to_string());
    }

    /// Make every execute wait this long (or until its token fires).
    pub fn with_delay(&self, delay: Option<Duration>) {
        *lock(&self.state.delay) = delay;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<StubCall> {
        lock(&self.state.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&StubCall) -> bool) -> usize {
        lock(&self.state.calls).iter().filter(|c| pred(c)).count()
    }

    /// Reader, scalar, non-query and batch round trips.
    #[must_use]
    pub fn round_trips(&self) -> usize {
        self.count(|c| matches!(c, StubCall::Execute(_) | StubCall::Batch(_)))
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.count(|c| *c == StubCall::Connect)
    }

    /// Connections opened and not yet closed or dropped.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }
}

impl Default for StubDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StubDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StubDriver")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Driver for StubDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.capabilities
    }

    async fn connect(
        &self,
        _connection_string: &str,
    ) -> Result<Box<dyn DriverConnection>, SqlFacadeError> {
        self.state.record(StubCall::Connect);
        if let Some(message) = lock(&self.state.connect_error).clone() {
            return Err(SqlFacadeError::ConnectionError(message));
        }
        self.state.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct StubConnection {
    name: String,
    state: Arc<StubState>,
    closed: bool,
}

#[async_trait]
impl DriverConnection for StubConnection {
    fn driver_name(&self) -> &str {
        &self.name
    }

    async fn execute_reader(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<Box<dyn DriverReader>, SqlFacadeError> {
        self.state
            .record(StubCall::Execute(command.command_text().to_string()));
        self.state.pause(token).await?;
        let results = lock(&self.state.results).clone();
        Ok(Box::new(MaterializedReader::new(results)))
    }

    async fn execute_non_query(
        &mut self,
        command: &mut Command,
        token: &CancellationToken,
    ) -> Result<i64, SqlFacadeError> {
        self.state
            .record(StubCall::Execute(command.command_text().to_string()));
        self.state.pause(token).await?;
        (self.state.non_query())(command)
    }

    async fn begin(&mut self) -> Result<(), SqlFacadeError> {
        self.state.record(StubCall::Begin);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), SqlFacadeError> {
        self.state.record(StubCall::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SqlFacadeError> {
        self.state.record(StubCall::Rollback);
        Ok(())
    }

    async fn execute_batch(
        &mut self,
        commands: &mut [Command],
        continue_on_error: bool,
        token: &CancellationToken,
    ) -> Result<BatchOutcome, SqlFacadeError> {
        self.state.record(StubCall::Batch(commands.len()));
        self.state.pause(token).await?;
        let run = self.state.non_query();
        let mut outcomes = Vec::with_capacity(commands.len());
        for command in commands.iter_mut() {
            let outcome = run(command);
            let failed = outcome.is_err();
            outcomes.push(outcome);
            if failed && !continue_on_error {
                break;
            }
        }
        if *lock(&self.state.batch_totals) {
            let total = outcomes.iter().filter_map(|o| o.as_ref().ok()).sum();
            return Ok(BatchOutcome::Total(total));
        }
        Ok(BatchOutcome::PerStatement(outcomes))
    }

    async fn derive_parameters(
        &mut self,
        command: &Command,
    ) -> Result<Vec<Parameter>, SqlFacadeError> {
        let name = command.command_text().to_string();
        self.state.record(StubCall::Derive(name.clone()));
        lock(&self.state.procedures)
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                SqlFacadeError::InvalidArgument(format!("stored procedure '{name}' not found"))
            })
    }

    async fn close(&mut self) -> Result<(), SqlFacadeError> {
        if !self.closed {
            self.closed = true;
            self.state.open.fetch_sub(1, Ordering::SeqCst);
            self.state.record(StubCall::Close);
        }
        Ok(())
    }
}

impl Drop for StubConnection {
    fn drop(&mut self) {
        if !self.closed {
            self.state.open.fetch_sub(1, Ordering::SeqCst);
            self.state.record(StubCall::Dropped);
        }
    }
}
