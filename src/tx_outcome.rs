use crate::database::DbConnection;

/// Outcome returned by committing or rolling back a [`DbTransaction`](crate::DbTransaction).
///
/// The transaction owns its connection while it is open; finishing it hands the connection back
/// so the caller can keep issuing commands or start another transaction.
#[derive(Debug)]
pub struct TxOutcome {
    restored_connection: Option<DbConnection>,
}

impl TxOutcome {
    #[must_use]
    pub(crate) fn with_restored_connection(conn: DbConnection) -> Self {
        Self {
            restored_connection: Some(conn),
        }
    }

    /// Borrow the restored connection, if present.
    #[must_use]
    pub fn restored_connection(&self) -> Option<&DbConnection> {
        self.restored_connection.as_ref()
    }

    /// Consume the outcome and take ownership of the restored connection, if present.
    #[must_use]
    pub fn into_restored_connection(self) -> Option<DbConnection> {
        self.restored_connection
    }
}
