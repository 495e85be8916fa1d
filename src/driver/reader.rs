use std::collections::VecDeque;

use async_trait::async_trait;

use super::DriverReader;
use crate::error::SqlFacadeError;
use crate::types::RowValues;

/// One fully fetched result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RowValues>>,
}

impl ResultData {
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RowValues>>) -> Self {
        Self { columns, rows }
    }
}

/// A reader over result sets that were fetched eagerly by the driver.
#[derive(Debug, Default)]
pub struct MaterializedReader {
    columns: Vec<String>,
    rows: VecDeque<Vec<RowValues>>,
    pending: VecDeque<ResultData>,
}

impl MaterializedReader {
    /// Build a reader positioned on the first of `results`.
    #[must_use]
    pub fn new(results: Vec<ResultData>) -> Self {
        let mut pending: VecDeque<ResultData> = results.into();
        let first = pending.pop_front().unwrap_or_default();
        Self {
            columns: first.columns,
            rows: first.rows.into(),
            pending,
        }
    }

    #[must_use]
    pub fn single(columns: Vec<String>, rows: Vec<Vec<RowValues>>) -> Self {
        Self::new(vec![ResultData::new(columns, rows)])
    }
}

#[async_trait]
impl DriverReader for MaterializedReader {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    async fn next_row(&mut self) -> Result<Option<Vec<RowValues>>, SqlFacadeError> {
        Ok(self.rows.pop_front())
    }

    async fn next_result(&mut self) -> Result<bool, SqlFacadeError> {
        match self.pending.pop_front() {
            Some(next) => {
                self.columns = next.columns;
                self.rows = next.rows.into();
                Ok(true)
            }
            None => {
                self.rows.clear();
                Ok(false)
            }
        }
    }

    fn has_next_result(&self) -> bool {
        !self.pending.is_empty()
    }
}
