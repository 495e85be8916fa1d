//! Writing pending table changes back to the store.
//!
//! [`Database::update_data_set`](crate::Database::update_data_set) walks a table in row order and
//! dispatches every added, modified or deleted row to the matching command of an
//! [`UpdateCommands`] set.

mod binding;
mod engine;

use std::collections::BTreeMap;

use crate::command::Command;
use crate::types::ChangeKind;

/// The insert, update and delete commands used to synchronize one table.
///
/// Any of the three may be absent as long as the table has no pending rows of that kind.
#[derive(Debug, Clone, Default)]
pub struct UpdateCommands {
    commands: BTreeMap<ChangeKind, Command>,
}

impl UpdateCommands {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_insert(self, command: Command) -> Self {
        self.with(ChangeKind::Insert, command)
    }

    #[must_use]
    pub fn with_update(self, command: Command) -> Self {
        self.with(ChangeKind::Update, command)
    }

    #[must_use]
    pub fn with_delete(self, command: Command) -> Self {
        self.with(ChangeKind::Delete, command)
    }

    #[must_use]
    pub fn with(mut self, kind: ChangeKind, command: Command) -> Self {
        self.commands.insert(kind, command);
        self
    }

    /// Set or replace the command for `kind`, returning the previous one.
    pub fn set(&mut self, kind: ChangeKind, command: Command) -> Option<Command> {
        self.commands.insert(kind, command)
    }

    #[must_use]
    pub fn get(&self, kind: ChangeKind) -> Option<&Command> {
        self.commands.get(&kind)
    }

    pub fn get_mut(&mut self, kind: ChangeKind) -> Option<&mut Command> {
        self.commands.get_mut(&kind)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// How a synchronization call reacts to row failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateBehavior {
    /// No transaction; the first failing row aborts the call. Rows applied before it stay applied.
    #[default]
    Standard,
    /// No transaction; failing rows are annotated with an error and stay pending.
    Continue,
    /// All rows in one transaction; any failure rolls everything back.
    Transactional,
}
