//! In-memory tables with per-row change tracking.
//!
//! A [`DataSet`] holds named [`DataTable`]s. Tables loaded through the execution surface start
//! with every row [`RowState::Unchanged`]; callers then add, edit and delete rows and hand the
//! set to [`Database::update_data_set`](crate::Database::update_data_set).

mod row;

use std::sync::Arc;

pub use row::{Columns, DataRow, RowState};

use crate::error::SqlFacadeError;
use crate::types::RowValues;

#[derive(Debug, Clone)]
pub struct DataTable {
    name: String,
    columns: Arc<Columns>,
    rows: Vec<DataRow>,
}

impl DataTable {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns: Arc::new(Columns::new(columns)),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<&DataRow> {
        self.rows.get(index)
    }

    pub fn row_mut(&mut self, index: usize) -> Option<&mut DataRow> {
        self.rows.get_mut(index)
    }

    /// Index of the first row whose default-version value in `column` equals `value`.
    #[must_use]
    pub fn find(&self, column: &str, value: &RowValues) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(column).is_ok_and(|v| v == value))
    }

    /// Append a row in the added state.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when the value count differs from the column count.
    pub fn add_row(&mut self, values: Vec<RowValues>) -> Result<&mut DataRow, SqlFacadeError> {
        self.check_width(&values)?;
        self.rows.push(DataRow::added(Arc::clone(&self.columns), values));
        let last = self.rows.len() - 1;
        Ok(&mut self.rows[last])
    }

    /// Append a row in the unchanged state, as a fetch does.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when the value count differs from the column count.
    pub fn load_row(&mut self, values: Vec<RowValues>) -> Result<(), SqlFacadeError> {
        self.check_width(&values)?;
        self.rows
            .push(DataRow::unchanged(Arc::clone(&self.columns), values));
        Ok(())
    }

    /// Delete a row: added rows are removed outright, other rows are marked deleted.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for an out-of-range index.
    pub fn delete_row(&mut self, index: usize) -> Result<(), SqlFacadeError> {
        let row = self.rows.get_mut(index).ok_or_else(|| {
            SqlFacadeError::InvalidArgument(format!("row {index} out of range"))
        })?;
        if row.state() == RowState::Added {
            self.rows.remove(index);
        } else {
            row.mark_deleted();
        }
        Ok(())
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(|r| r.state() != RowState::Unchanged)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.rows.iter().any(DataRow::has_error)
    }

    /// Indexes of rows carrying an error annotation.
    #[must_use]
    pub fn rows_with_errors(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.has_error().then_some(i))
            .collect()
    }

    pub fn accept_changes(&mut self) {
        self.rows.retain_mut(DataRow::accept);
    }

    pub fn reject_changes(&mut self) {
        self.rows.retain_mut(DataRow::reject);
    }

    /// Accept the changes of the given rows only; indexes refer to the current row order.
    pub(crate) fn accept_rows(&mut self, indexes: &[usize]) {
        let mut keep = vec![true; self.rows.len()];
        for &idx in indexes {
            if let Some(row) = self.rows.get_mut(idx) {
                keep[idx] = row.accept();
            }
        }
        let mut flags = keep.into_iter();
        self.rows.retain(|_| flags.next().unwrap_or(true));
    }

    fn check_width(&self, values: &[RowValues]) -> Result<(), SqlFacadeError> {
        if values.len() == self.columns.len() {
            Ok(())
        } else {
            Err(SqlFacadeError::InvalidArgument(format!(
                "table '{}' has {} columns, got {} values",
                self.name,
                self.columns.len(),
                values.len()
            )))
        }
    }
}

/// A collection of named tables.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    tables: Vec<DataTable>,
}

impl DataSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tables(&self) -> &[DataTable] {
        &self.tables
    }

    /// Case-insensitive table lookup.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&DataTable> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut DataTable> {
        self.tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Add a table.
    ///
    /// # Errors
    /// Returns `InvalidArgument` when a table with the same name exists.
    pub fn add_table(&mut self, table: DataTable) -> Result<&mut DataTable, SqlFacadeError> {
        if self.table(&table.name).is_some() {
            return Err(SqlFacadeError::InvalidArgument(format!(
                "table '{}' already exists in data set",
                table.name
            )));
        }
        self.tables.push(table);
        let last = self.tables.len() - 1;
        Ok(&mut self.tables[last])
    }

    pub fn remove_table(&mut self, name: &str) -> Option<DataTable> {
        let idx = self
            .tables
            .iter()
            .position(|t| t.name.eq_ignore_ascii_case(name))?;
        Some(self.tables.remove(idx))
    }

    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.tables.iter().any(DataTable::has_changes)
    }

    pub fn accept_changes(&mut self) {
        for table in &mut self.tables {
            table.accept_changes();
        }
    }

    /// Fill `name` with loaded rows, appending to an existing table with the same columns or
    /// creating a new one.
    pub(crate) fn fill(
        &mut self,
        name: &str,
        columns: Vec<String>,
        rows: Vec<Vec<RowValues>>,
    ) -> Result<(), SqlFacadeError> {
        if self.table(name).is_none() {
            self.add_table(DataTable::new(name, columns.clone()))?;
        }
        let table = self
            .table_mut(name)
            .ok_or_else(|| SqlFacadeError::MissingTableName {
                table: name.to_string(),
            })?;
        if table.columns.names() != columns.as_slice() {
            return Err(SqlFacadeError::InvalidArgument(format!(
                "result columns {columns:?} do not match table '{name}'"
            )));
        }
        for values in rows {
            table.load_row(values)?;
        }
        Ok(())
    }
}

/// Default name of the result set at `position`: `Table`, `Table1`, `Table2`, ...
#[must_use]
pub fn default_table_name(position: usize) -> String {
    if position == 0 {
        "Table".to_string()
    } else {
        format!("Table{position}")
    }
}
