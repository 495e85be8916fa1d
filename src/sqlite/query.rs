use rusqlite::types::Value;

use crate::driver::ResultData;
use crate::error::SqlFacadeError;
use crate::translation::split_statements;
use crate::types::RowValues;

use super::params::Params;

/// Extract a `RowValues` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqlFacadeError` if the value cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<RowValues, SqlFacadeError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Result of running a script for its side effects.
#[derive(Debug, Default)]
pub(crate) struct ExecOutcome {
    pub(crate) affected: i64,
    /// First row produced by a `RETURNING` clause, keyed by column name.
    pub(crate) returned: Vec<(String, RowValues)>,
}

/// Run every statement of `sql` and materialize each row-producing one as a result set.
///
/// # Errors
/// Returns the first prepare, bind or step failure.
pub(crate) fn query_script(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<Vec<ResultData>, SqlFacadeError> {
    let mut results = Vec::new();
    for statement in split_statements(sql) {
        let mut stmt = conn.prepare(statement)?;
        params.bind(&mut stmt)?;
        if stmt.column_count() == 0 {
            stmt.raw_execute()?;
            continue;
        }
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect();
        let width = columns.len();
        let mut rows_out = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(sqlite_extract_value_sync(row, idx)?);
            }
            rows_out.push(values);
        }
        results.push(ResultData::new(columns, rows_out));
    }
    Ok(results)
}

/// Run every statement of `sql` and sum the rows they changed.
///
/// Row-producing statements that write (`INSERT ... RETURNING`) count one change per returned
/// row; read-only ones count nothing.
///
/// # Errors
/// Returns the first prepare, bind or step failure.
pub(crate) fn execute_script(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<ExecOutcome, SqlFacadeError> {
    let mut outcome = ExecOutcome::default();
    for statement in split_statements(sql) {
        let mut stmt = conn.prepare(statement)?;
        params.bind(&mut stmt)?;
        if stmt.column_count() == 0 {
            let changed = stmt.raw_execute()?;
            outcome.affected += to_i64(changed)?;
            continue;
        }
        let writes = !stmt.readonly();
        let columns: Vec<String> = stmt
            .column_names()
            .iter()
            .map(std::string::ToString::to_string)
            .collect();
        let mut returned = 0_i64;
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next()? {
            if returned == 0 && writes {
                for (idx, name) in columns.iter().enumerate() {
                    outcome
                        .returned
                        .push((name.clone(), sqlite_extract_value_sync(row, idx)?));
                }
            }
            returned += 1;
        }
        if writes {
            outcome.affected += returned;
        }
    }
    Ok(outcome)
}

fn to_i64(changed: usize) -> Result<i64, SqlFacadeError> {
    i64::try_from(changed).map_err(|e| {
        SqlFacadeError::ExecutionError(format!("sqlite affected rows conversion error: {e}"))
    })
}
