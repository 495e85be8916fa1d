use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use super::DbTransaction;
use crate::driver::{DriverConnection, DriverReader};
use crate::error::SqlFacadeError;
use crate::results::{DataRecord, RecordSchema};

/// Forward-only, read-once cursor over the result sets of one command.
///
/// A cursor opened by [`Database::execute_reader`](super::Database::execute_reader) owns its
/// connection and releases it once the last result set is exhausted, on
/// [`close`](Self::close), or when dropped. A cursor opened inside a transaction borrows the
/// transaction for its lifetime.
pub struct RowCursor<'t> {
    database: String,
    reader: Box<dyn DriverReader>,
    schema: Arc<RecordSchema>,
    conn: Option<Box<dyn DriverConnection>>,
    exhausted: bool,
    _tx: PhantomData<&'t mut DbTransaction>,
}

impl<'t> RowCursor<'t> {
    pub(crate) fn new(
        database: &str,
        reader: Box<dyn DriverReader>,
        conn: Option<Box<dyn DriverConnection>>,
    ) -> Self {
        let schema = Arc::new(RecordSchema::new(reader.columns().to_vec()));
        Self {
            database: database.to_string(),
            reader,
            schema,
            conn,
            exhausted: false,
            _tx: PhantomData,
        }
    }

    /// Column names of the current result set.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.schema.names()
    }

    /// Whether the cursor still holds its own connection.
    #[must_use]
    pub fn holds_connection(&self) -> bool {
        self.conn.is_some()
    }

    /// Next record of the current result set, `None` once it is exhausted.
    ///
    /// # Errors
    /// Returns the driver error from fetching.
    pub async fn next(&mut self) -> Result<Option<DataRecord>, SqlFacadeError> {
        if self.exhausted {
            return Ok(None);
        }
        match self.reader.next_row().await? {
            Some(values) => Ok(Some(DataRecord::new(Arc::clone(&self.schema), values))),
            None => {
                if !self.reader.has_next_result() {
                    self.exhausted = true;
                    self.release().await;
                }
                Ok(None)
            }
        }
    }

    /// Advance to the following result set; `false` when there is none.
    ///
    /// # Errors
    /// Returns the driver error from advancing.
    pub async fn next_result(&mut self) -> Result<bool, SqlFacadeError> {
        if self.exhausted {
            return Ok(false);
        }
        if self.reader.next_result().await? {
            self.schema = Arc::new(RecordSchema::new(self.reader.columns().to_vec()));
            Ok(true)
        } else {
            self.exhausted = true;
            self.release().await;
            Ok(false)
        }
    }

    /// Stop reading and release the connection.
    pub async fn close(mut self) {
        self.exhausted = true;
        self.release().await;
    }

    async fn release(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(database = %self.database, error = %e, "failed to close cursor connection");
            }
            debug!(database = %self.database, "cursor released its connection");
        }
    }
}

impl fmt::Debug for RowCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowCursor")
            .field("database", &self.database)
            .field("columns", &self.schema.names())
            .field("holds_connection", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}
