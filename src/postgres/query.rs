use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use tokio_postgres::{Client, Row};

use crate::command::Command;
use crate::driver::ResultData;
use crate::error::SqlFacadeError;
use crate::translation::{PlaceholderStyle, rewrite_named_placeholders};
use crate::types::{CommandKind, ParameterDirection, RowValues};

use super::params::as_refs;

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `SqlFacadeError` if the column cannot be retrieved.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, SqlFacadeError> {
    let type_name = row.columns()[idx].type_().name();
    let value = match type_name {
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| RowValues::Int(i64::from(v))),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(f64::from(v))),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        "date" => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| RowValues::Timestamp(v.and_time(NaiveTime::MIN))),
        "json" | "jsonb" => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        _ => row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text),
    };
    Ok(value.unwrap_or(RowValues::Null))
}

/// Materialize rows under the given column names.
///
/// # Errors
/// Returns the first value that cannot be extracted.
pub(crate) fn rows_to_result(
    columns: Vec<String>,
    rows: &[Row],
) -> Result<ResultData, SqlFacadeError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for idx in 0..columns.len() {
            values.push(postgres_extract_value(row, idx)?);
        }
        out.push(values);
    }
    Ok(ResultData::new(columns, out))
}

/// What the caller wants back from a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Purpose {
    Rows,
    Effect,
}

/// How a planned statement reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    Text,
    Call,
    FunctionSelect,
}

/// A command lowered to positional SQL plus its ordered values.
#[derive(Debug, Clone)]
pub(crate) struct PgStatement {
    pub(crate) sql: String,
    pub(crate) values: Vec<RowValues>,
    pub(crate) shape: Shape,
}

fn value_of(direction: ParameterDirection, value: Option<&RowValues>) -> RowValues {
    match value {
        Some(v) if direction.sends_value() => v.clone(),
        _ => RowValues::Null,
    }
}

/// Lower `command` for `purpose`.
///
/// Text commands have their named markers rewritten to `$N`. Procedures become `CALL name(...)`
/// for side effects, except when a return-value parameter marks them as functions; functions and
/// row-producing calls become `SELECT * FROM name(...)` with only the input arguments.
///
/// # Errors
/// Returns `ParameterError` when the text references a marker the command does not bind.
pub(crate) fn plan(command: &Command, purpose: Purpose) -> Result<PgStatement, SqlFacadeError> {
    match command.kind() {
        CommandKind::Text => {
            let rewritten =
                rewrite_named_placeholders(command.command_text(), PlaceholderStyle::Postgres);
            let mut values = Vec::with_capacity(rewritten.names.len());
            for name in &rewritten.names {
                let parameter = command.parameter(name).ok_or_else(|| {
                    SqlFacadeError::ParameterError(format!(
                        "no value supplied for placeholder '@{name}'"
                    ))
                })?;
                values.push(value_of(parameter.direction, parameter.value.as_ref()));
            }
            Ok(PgStatement {
                sql: rewritten.sql.into_owned(),
                values,
                shape: Shape::Text,
            })
        }
        CommandKind::StoredProcedure => {
            let is_function = command
                .parameters()
                .iter()
                .any(|p| p.direction == ParameterDirection::ReturnValue);
            let shape = if purpose == Purpose::Effect && !is_function {
                Shape::Call
            } else {
                Shape::FunctionSelect
            };
            let values: Vec<RowValues> = command
                .parameters()
                .iter()
                .filter(|p| match shape {
                    Shape::Call => p.direction != ParameterDirection::ReturnValue,
                    _ => p.direction.sends_value(),
                })
                .map(|p| value_of(p.direction, p.value.as_ref()))
                .collect();
            let args = (1..=values.len())
                .map(|n| format!("${n}"))
                .collect::<Vec<_>>()
                .join(", ");
            let name = command.command_text();
            let sql = match shape {
                Shape::Call => format!("CALL {name}({args})"),
                _ => format!("SELECT * FROM {name}({args})"),
            };
            Ok(PgStatement { sql, values, shape })
        }
    }
}

/// Copy the first returned row into receiving parameters: the return value takes the first
/// column, output and in-out parameters take the column of the same name.
pub(crate) fn apply_outputs(command: &mut Command, columns: &[String], first: &[RowValues]) {
    for parameter in command.parameters_mut() {
        if !parameter.direction.receives_value() {
            continue;
        }
        let value = if parameter.direction == ParameterDirection::ReturnValue {
            first.first()
        } else {
            columns
                .iter()
                .position(|c| parameter.matches(c))
                .and_then(|idx| first.get(idx))
        };
        if let Some(value) = value {
            parameter.value = Some(value.clone());
        }
    }
}

/// Run a planned statement for its rows.
pub(crate) async fn query(
    client: &Client,
    statement: &PgStatement,
) -> Result<ResultData, SqlFacadeError> {
    let prepared = client.prepare(&statement.sql).await?;
    let columns: Vec<String> = prepared
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let rows = client.query(&prepared, &as_refs(&statement.values)).await?;
    rows_to_result(columns, &rows)
}

/// Run a planned statement for its effect, writing returned values back into `command`.
///
/// Text statements report their affected-row count (returned rows for `RETURNING`); calls
/// report `-1`.
pub(crate) async fn execute(
    client: &Client,
    statement: &PgStatement,
    command: &mut Command,
) -> Result<i64, SqlFacadeError> {
    let prepared = client.prepare(&statement.sql).await?;
    if statement.shape == Shape::Text && prepared.columns().is_empty() {
        let affected = client.execute(&prepared, &as_refs(&statement.values)).await?;
        return to_i64(affected);
    }
    let columns: Vec<String> = prepared
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let rows = client.query(&prepared, &as_refs(&statement.values)).await?;
    if let Some(row) = rows.first() {
        let first: Vec<RowValues> = (0..columns.len())
            .map(|idx| postgres_extract_value(row, idx))
            .collect::<Result<_, _>>()?;
        apply_outputs(command, &columns, &first);
    }
    match statement.shape {
        Shape::Text => to_i64(rows.len() as u64),
        Shape::Call | Shape::FunctionSelect => Ok(-1),
    }
}

/// Affected-row count only; used inside batches where nothing is written back.
pub(crate) async fn execute_count(
    client: &Client,
    statement: &PgStatement,
) -> Result<i64, SqlFacadeError> {
    let affected = client
        .execute(statement.sql.as_str(), &as_refs(&statement.values))
        .await?;
    match statement.shape {
        Shape::Text => to_i64(affected),
        Shape::Call | Shape::FunctionSelect => Ok(-1),
    }
}

fn to_i64(affected: u64) -> Result<i64, SqlFacadeError> {
    i64::try_from(affected).map_err(|e| {
        SqlFacadeError::ExecutionError(format!("postgres affected rows conversion error: {e}"))
    })
}
