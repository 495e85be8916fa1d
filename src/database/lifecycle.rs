use std::fmt;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::Database;
use crate::driver::DriverConnection;
use crate::error::SqlFacadeError;
use crate::tx_outcome::TxOutcome;

/// A caller-managed connection. Dropping it releases the connection.
pub struct DbConnection {
    database: String,
    owner: u64,
    conn: Box<dyn DriverConnection>,
}

impl DbConnection {
    fn new(database: String, owner: u64, conn: Box<dyn DriverConnection>) -> Self {
        Self {
            database,
            owner,
            conn,
        }
    }

    /// Name of the database this connection belongs to.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Start a transaction on this connection.
    ///
    /// # Errors
    /// Returns the driver error when `BEGIN` fails; the connection is released in that case.
    pub async fn begin_transaction(self) -> Result<DbTransaction, SqlFacadeError> {
        let Self {
            database,
            owner,
            mut conn,
        } = self;
        conn.begin()
            .await
            .map_err(|e| e.with_context(&database, "BEGIN"))?;
        debug!(database = %database, "transaction started");
        Ok(DbTransaction {
            database,
            owner,
            conn: Some(conn),
        })
    }

    /// Close the connection explicitly.
    ///
    /// # Errors
    /// Returns the driver error from closing.
    pub async fn close(mut self) -> Result<(), SqlFacadeError> {
        self.conn.close().await
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("database", &self.database)
            .field("driver", &self.conn.driver_name())
            .finish()
    }
}

/// A connection with an open transaction, owned by the caller.
///
/// Commit or roll back explicitly; a transaction dropped while still active is rolled back on a
/// best-effort basis.
pub struct DbTransaction {
    database: String,
    owner: u64,
    conn: Option<Box<dyn DriverConnection>>,
}

impl DbTransaction {
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Whether the transaction is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.conn.is_some()
    }

    pub(crate) fn connection_mut(
        &mut self,
        database: &Database,
    ) -> Result<&mut (dyn DriverConnection + 'static), SqlFacadeError> {
        if self.owner != database.id() {
            return Err(SqlFacadeError::InvalidArgument(format!(
                "transaction belongs to another handle of database '{}', not to '{}'",
                self.database,
                database.name()
            )));
        }
        self.conn
            .as_deref_mut()
            .ok_or_else(|| SqlFacadeError::ExecutionError("transaction is no longer active".into()))
    }

    /// Commit and hand the connection back.
    ///
    /// # Errors
    /// Returns the driver error when `COMMIT` fails; the transaction is then rolled back on drop.
    pub async fn commit(mut self) -> Result<TxOutcome, SqlFacadeError> {
        let Some(mut conn) = self.conn.take() else {
            return Err(SqlFacadeError::ExecutionError("transaction is no longer active".into()));
        };
        if let Err(e) = conn.commit().await {
            self.conn = Some(conn);
            return Err(e.with_context(&self.database, "COMMIT"));
        }
        debug!(database = %self.database, "transaction committed");
        Ok(TxOutcome::with_restored_connection(DbConnection::new(
            self.database.clone(),
            self.owner,
            conn,
        )))
    }

    /// Roll back and hand the connection back.
    ///
    /// # Errors
    /// Returns the driver error when `ROLLBACK` fails; the connection is dropped.
    pub async fn rollback(mut self) -> Result<TxOutcome, SqlFacadeError> {
        let Some(mut conn) = self.conn.take() else {
            return Err(SqlFacadeError::ExecutionError("transaction is no longer active".into()));
        };
        conn.rollback()
            .await
            .map_err(|e| e.with_context(&self.database, "ROLLBACK"))?;
        debug!(database = %self.database, "transaction rolled back");
        Ok(TxOutcome::with_restored_connection(DbConnection::new(
            self.database.clone(),
            self.owner,
            conn,
        )))
    }
}

impl Drop for DbTransaction {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let database = std::mem::take(&mut self.database);
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = conn.rollback().await {
                    warn!(database = %database, error = %e, "rollback of dropped transaction failed");
                }
            });
        } else {
            warn!(database = %database, "transaction dropped outside a runtime; releasing without rollback");
        }
    }
}

impl fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbTransaction")
            .field("database", &self.database)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Database {
    /// Open a caller-managed connection.
    ///
    /// # Errors
    /// Returns the driver's connection error; no connection is left behind.
    pub async fn open_connection(&self) -> Result<DbConnection, SqlFacadeError> {
        let conn = self.connect().await?;
        Ok(DbConnection::new(self.name.clone(), self.id(), conn))
    }

    /// Open a connection and start a transaction on it.
    ///
    /// # Errors
    /// Returns the driver error from connecting or from `BEGIN`.
    pub async fn begin_transaction(&self) -> Result<DbTransaction, SqlFacadeError> {
        self.open_connection().await?.begin_transaction().await
    }
}
