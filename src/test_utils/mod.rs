//! Test doubles for exercising the façade without a database.

mod stub;

use std::sync::Arc;

pub use stub::{StubCall, StubDriver};

use crate::database::Database;
use crate::error::SqlFacadeError;
use crate::table::DataTable;
use crate::types::RowValues;

/// A [`Database`] named `name` over `driver`.
///
/// # Errors
/// Never in practice; the connection string is fixed and non-empty.
pub fn stub_database(name: &str, driver: &Arc<StubDriver>) -> Result<Database, SqlFacadeError> {
    let driver: Arc<StubDriver> = Arc::clone(driver);
    Database::new(name, format!("stub://{name}"), driver)
}

/// A table with `columns` whose `rows` are loaded unchanged.
///
/// # Errors
/// Returns `InvalidArgument` when a row's width differs from the column count.
pub fn loaded_table(
    name: &str,
    columns: &[&str],
    rows: Vec<Vec<RowValues>>,
) -> Result<DataTable, SqlFacadeError> {
    let mut table = DataTable::new(name, columns.iter().map(ToString::to_string).collect());
    for row in rows {
        table.load_row(row)?;
    }
    Ok(table)
}
