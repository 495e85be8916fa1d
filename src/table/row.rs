use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SqlFacadeError;
use crate::types::{RowValues, RowVersion};

/// Column names shared by every row of a table, with a name → index lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_ascii_lowercase(), i))
            .collect();
        Self { names, index }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Case-insensitive column lookup.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(&name.to_ascii_lowercase()).copied()
    }

    pub(crate) fn require(&self, name: &str) -> Result<usize, SqlFacadeError> {
        self.position(name).ok_or_else(|| SqlFacadeError::UnknownColumn {
            column: name.to_string(),
        })
    }
}

/// Pending-change state of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// One row of a [`DataTable`](super::DataTable) with its current, original and proposed values.
#[derive(Debug, Clone)]
pub struct DataRow {
    columns: Arc<Columns>,
    state: RowState,
    current: Vec<RowValues>,
    original: Option<Vec<RowValues>>,
    proposed: Option<Vec<RowValues>>,
    error: Option<String>,
}

impl DataRow {
    pub(crate) fn unchanged(columns: Arc<Columns>, values: Vec<RowValues>) -> Self {
        Self {
            columns,
            state: RowState::Unchanged,
            original: Some(values.clone()),
            current: values,
            proposed: None,
            error: None,
        }
    }

    pub(crate) fn added(columns: Arc<Columns>, values: Vec<RowValues>) -> Self {
        Self {
            columns,
            state: RowState::Added,
            current: values,
            original: None,
            proposed: None,
            error: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> RowState {
        self.state
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.proposed.is_some()
    }

    /// Read a column at the default version.
    ///
    /// # Errors
    /// Returns `UnknownColumn` for a missing column.
    pub fn get(&self, column: &str) -> Result<&RowValues, SqlFacadeError> {
        self.get_version(column, RowVersion::Default)
    }

    /// Read a column at a specific row version.
    ///
    /// # Errors
    /// Returns `UnknownColumn` for a missing column and `RowVersionUnavailable` when the row
    /// has no such snapshot (original values of an added row, current values of a deleted row,
    /// proposed values outside an edit).
    pub fn get_version(
        &self,
        column: &str,
        version: RowVersion,
    ) -> Result<&RowValues, SqlFacadeError> {
        let idx = self.columns.require(column)?;
        let values = self.snapshot(version).ok_or_else(|| {
            SqlFacadeError::RowVersionUnavailable {
                column: column.to_string(),
                version: version.to_string(),
            }
        })?;
        Ok(&values[idx])
    }

    fn snapshot(&self, version: RowVersion) -> Option<&Vec<RowValues>> {
        match version {
            RowVersion::Current => (self.state != RowState::Deleted).then_some(&self.current),
            RowVersion::Original => self.original.as_ref(),
            RowVersion::Proposed => self.proposed.as_ref(),
            RowVersion::Default => {
                if let Some(proposed) = &self.proposed {
                    Some(proposed)
                } else if self.state == RowState::Deleted {
                    self.original.as_ref()
                } else {
                    Some(&self.current)
                }
            }
        }
    }

    /// Assign a column value. Inside an edit the proposed values change; otherwise the current
    /// values change and an unchanged row becomes modified.
    ///
    /// # Errors
    /// Returns `UnknownColumn` for a missing column and `InvalidArgument` on a deleted row.
    pub fn set(&mut self, column: &str, value: impl Into<RowValues>) -> Result<(), SqlFacadeError> {
        let idx = self.columns.require(column)?;
        if self.state == RowState::Deleted {
            return Err(SqlFacadeError::InvalidArgument(format!(
                "cannot set '{column}' on a deleted row"
            )));
        }
        let value = value.into();
        if let Some(proposed) = self.proposed.as_mut() {
            proposed[idx] = value;
            return Ok(());
        }
        self.current[idx] = value;
        if self.state == RowState::Unchanged {
            self.state = RowState::Modified;
        }
        Ok(())
    }

    /// Open an edit; changes go to the proposed version until [`end_edit`](Self::end_edit).
    pub fn begin_edit(&mut self) {
        if self.proposed.is_none() && self.state != RowState::Deleted {
            self.proposed = Some(self.current.clone());
        }
    }

    /// Commit the proposed values into the current version.
    pub fn end_edit(&mut self) {
        if let Some(proposed) = self.proposed.take()
            && proposed != self.current
        {
            self.current = proposed;
            if self.state == RowState::Unchanged {
                self.state = RowState::Modified;
            }
        }
    }

    /// Discard the proposed values.
    pub fn cancel_edit(&mut self) {
        self.proposed = None;
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Values in column order at the current version.
    #[must_use]
    pub fn current_values(&self) -> &[RowValues] {
        &self.current
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.proposed = None;
        self.state = RowState::Deleted;
    }

    pub(crate) fn write_current(&mut self, idx: usize, value: RowValues) {
        self.current[idx] = value;
    }

    /// Returns `false` when the row should be removed from its table.
    pub(crate) fn accept(&mut self) -> bool {
        self.error = None;
        self.proposed = None;
        match self.state {
            RowState::Deleted => false,
            _ => {
                self.original = Some(self.current.clone());
                self.state = RowState::Unchanged;
                true
            }
        }
    }

    /// Returns `false` when the row should be removed from its table.
    pub(crate) fn reject(&mut self) -> bool {
        self.error = None;
        self.proposed = None;
        match (self.state, self.original.as_ref()) {
            (RowState::Added, _) | (_, None) => false,
            (_, Some(original)) => {
                self.current = original.clone();
                self.state = RowState::Unchanged;
                true
            }
        }
    }
}
