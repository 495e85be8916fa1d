use rusqlite::Statement;
use rusqlite::types::Value;

use crate::command::{Command, bare_name};
use crate::error::SqlFacadeError;
use crate::types::RowValues;

/// Convert a single `RowValues` to a rusqlite `Value`.
#[must_use]
pub fn row_value_to_sqlite_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Integer(*i),
        RowValues::Float(f) => Value::Real(*f),
        RowValues::Text(s) => Value::Text(s.clone()),
        RowValues::Bool(b) => Value::Integer(i64::from(*b)),
        RowValues::Timestamp(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        RowValues::Null => Value::Null,
        RowValues::JSON(jval) => Value::Text(jval.to_string()),
        RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Owned parameter values of one command, ready to move onto a blocking thread.
///
/// Output and return-value parameters bind as `NULL`; `SQLite` never writes them back.
#[derive(Debug, Clone, Default)]
pub(crate) struct Params {
    slots: Vec<(String, Value)>,
}

impl Params {
    pub(crate) fn from_command(command: &Command) -> Self {
        let slots = command
            .parameters()
            .iter()
            .map(|p| {
                let value = match (&p.value, p.direction.sends_value()) {
                    (Some(v), true) => row_value_to_sqlite_value(v),
                    _ => Value::Null,
                };
                (p.bare_name().to_string(), value)
            })
            .collect();
        Self { slots }
    }

    fn named(&self, name: &str) -> Option<&Value> {
        let bare = bare_name(name);
        self.slots
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(bare))
            .map(|(_, v)| v)
    }

    fn positional(&self, one_based: usize) -> Option<&Value> {
        self.slots.get(one_based.checked_sub(1)?).map(|(_, v)| v)
    }

    /// Bind every parameter `stmt` declares.
    ///
    /// `@name`, `:name` and `$name` resolve by name; `?NNN` and bare `?` resolve by position in
    /// the command's parameter list.
    ///
    /// # Errors
    /// Returns `ParameterError` for a placeholder the command has no value for.
    pub(crate) fn bind(&self, stmt: &mut Statement<'_>) -> Result<(), SqlFacadeError> {
        for idx in 1..=stmt.parameter_count() {
            let value = match stmt.parameter_name(idx) {
                Some(name) if name.starts_with('?') => {
                    let position = name[1..].parse::<usize>().unwrap_or(idx);
                    self.positional(position)
                }
                Some(name) => self.named(name),
                None => self.positional(idx),
            };
            let Some(value) = value else {
                let label = stmt
                    .parameter_name(idx)
                    .map_or_else(|| format!("?{idx}"), str::to_string);
                return Err(SqlFacadeError::ParameterError(format!(
                    "no value supplied for placeholder '{label}'"
                )));
            };
            stmt.raw_bind_parameter(idx, value)?;
        }
        Ok(())
    }
}
