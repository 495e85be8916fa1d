use std::collections::HashMap;
use std::sync::Arc;

use crate::types::RowValues;

/// Column names of one result set with a name → index cache, shared by every record in it.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl RecordSchema {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        let index = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { names, index }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Exact match first, then a case-insensitive scan.
    #[must_use]
    pub fn position(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.index.get(column_name) {
            return Some(idx);
        }
        self.names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }
}

/// A row produced by a [`RowCursor`](crate::database::RowCursor).
#[derive(Debug, Clone)]
pub struct DataRecord {
    schema: Arc<RecordSchema>,
    values: Vec<RowValues>,
}

impl DataRecord {
    #[must_use]
    pub fn new(schema: Arc<RecordSchema>, values: Vec<RowValues>) -> Self {
        Self { schema, values }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        self.schema.names()
    }

    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.schema.position(column_name)
    }

    /// Value of a column by name, `None` if there is no such column.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }
}
