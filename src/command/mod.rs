//! Command descriptors and parameter binding.
//!
//! A [`Command`] is a portable description of one SQL statement or stored-procedure call plus
//! its ordered parameter bindings. Drivers receive it by `&mut` so they can write output values
//! back.

mod parameter;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use parameter::Parameter;
pub(crate) use parameter::bare_name;

use crate::error::SqlFacadeError;
use crate::types::{CommandKind, DbType, ParameterDirection, RowValues, RowVersion, UpdatedRowSource};

#[derive(Debug, Clone)]
pub struct Command {
    kind: CommandKind,
    text: String,
    parameters: Vec<Parameter>,
    timeout: Option<Duration>,
    updated_row_source: UpdatedRowSource,
    cancellation: Option<CancellationToken>,
}

impl Command {
    /// Build an ad-hoc SQL text command.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when `sql` is empty or whitespace.
    pub fn text(sql: impl Into<String>) -> Result<Self, SqlFacadeError> {
        Self::new(CommandKind::Text, sql)
    }

    /// Build a stored-procedure command.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when `name` is empty or whitespace.
    pub fn stored_procedure(name: impl Into<String>) -> Result<Self, SqlFacadeError> {
        Self::new(CommandKind::StoredProcedure, name)
    }

    /// Build a command of the given kind.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when `text` is empty or whitespace.
    pub fn new(kind: CommandKind, text: impl Into<String>) -> Result<Self, SqlFacadeError> {
        let text = text.into();
        if text.trim().is_empty() {
            let what = match kind {
                CommandKind::Text => "command text",
                CommandKind::StoredProcedure => "stored procedure name",
            };
            return Err(SqlFacadeError::InvalidArgument(format!("{what} must not be empty")));
        }
        Ok(Self {
            kind,
            text,
            parameters: Vec::new(),
            timeout: None,
            updated_row_source: UpdatedRowSource::default(),
            cancellation: None,
        })
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    #[must_use]
    pub fn command_text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.parameters
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    #[must_use]
    pub fn updated_row_source(&self) -> UpdatedRowSource {
        self.updated_row_source
    }

    pub fn set_updated_row_source(&mut self, source: UpdatedRowSource) {
        self.updated_row_source = source;
    }

    #[must_use]
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Attach a token whose cancellation is propagated into the in-flight driver call.
    pub fn set_cancellation(&mut self, token: Option<CancellationToken>) {
        self.cancellation = token;
    }

    /// Append a fully described parameter.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when the name is empty or already bound.
    pub fn add_parameter(&mut self, parameter: Parameter) -> Result<&mut Self, SqlFacadeError> {
        if parameter.bare_name().is_empty() {
            return Err(SqlFacadeError::InvalidArgument(
                "parameter name must not be empty".into(),
            ));
        }
        if self.parameters.iter().any(|p| p.matches(&parameter.name)) {
            return Err(SqlFacadeError::InvalidArgument(format!(
                "parameter '{}' is already bound on '{}'",
                parameter.name, self.text
            )));
        }
        self.parameters.push(parameter);
        Ok(self)
    }

    /// Bind an input parameter to a literal value.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when the name is empty or already bound.
    pub fn bind_in(
        &mut self,
        name: &str,
        db_type: DbType,
        value: impl Into<RowValues>,
    ) -> Result<&mut Self, SqlFacadeError> {
        self.add_parameter(Parameter::new(name, db_type).value(value))
    }

    /// Declare an input parameter whose value is assigned later.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when the name is empty or already bound.
    pub fn bind_in_without_value(
        &mut self,
        name: &str,
        db_type: DbType,
    ) -> Result<&mut Self, SqlFacadeError> {
        self.add_parameter(Parameter::new(name, db_type))
    }

    /// Declare an output parameter.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when the name is empty or already bound.
    pub fn bind_out(
        &mut self,
        name: &str,
        db_type: DbType,
        size: u32,
    ) -> Result<&mut Self, SqlFacadeError> {
        self.add_parameter(
            Parameter::new(name, db_type)
                .direction(ParameterDirection::Output)
                .size(size),
        )
    }

    /// Bind an input parameter to a table column read at `version` when applied to a row.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::InvalidArgument` when either name is empty or the parameter is
    /// already bound.
    pub fn bind_from_column(
        &mut self,
        name: &str,
        db_type: DbType,
        source_column: &str,
        version: RowVersion,
    ) -> Result<&mut Self, SqlFacadeError> {
        if source_column.is_empty() {
            return Err(SqlFacadeError::InvalidArgument(
                "source column must not be empty".into(),
            ));
        }
        self.add_parameter(Parameter::new(name, db_type).source(source_column, version))
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.matches(name))
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.matches(name))
    }

    /// Read a parameter's current value (after execution this includes output values).
    ///
    /// # Errors
    /// Returns `SqlFacadeError::ParameterError` when no parameter has that name.
    pub fn parameter_value(&self, name: &str) -> Result<Option<&RowValues>, SqlFacadeError> {
        self.parameter(name)
            .map(|p| p.value.as_ref())
            .ok_or_else(|| self.unknown_parameter(name))
    }

    /// Assign a value to an existing parameter.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::ParameterError` when no parameter has that name.
    pub fn set_parameter_value(
        &mut self,
        name: &str,
        value: impl Into<RowValues>,
    ) -> Result<(), SqlFacadeError> {
        let err = self.unknown_parameter(name);
        let parameter = self.parameter_mut(name).ok_or(err)?;
        parameter.value = Some(value.into());
        Ok(())
    }

    /// Map a flat list of values onto the declared parameters in order.
    ///
    /// A leading `ReturnValue` parameter is skipped.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::ArityMismatch` when the value count differs from the number of
    /// assignable parameters; no value is assigned in that case.
    pub fn assign_positional_values(&mut self, values: &[RowValues]) -> Result<(), SqlFacadeError> {
        let targets = self.positional_slots();
        if targets.len() != values.len() {
            return Err(SqlFacadeError::ArityMismatch {
                command: self.text.clone(),
                expected: targets.len(),
                actual: values.len(),
            });
        }
        for (idx, value) in targets.into_iter().zip(values) {
            self.parameters[idx].value = Some(value.clone());
        }
        Ok(())
    }

    /// Bind the assignable parameters, in order, to the given source columns.
    ///
    /// # Errors
    /// Returns `SqlFacadeError::ArityMismatch` on a count mismatch.
    pub fn assign_source_columns(&mut self, columns: &[&str]) -> Result<(), SqlFacadeError> {
        let targets = self.positional_slots();
        if targets.len() != columns.len() {
            return Err(SqlFacadeError::ArityMismatch {
                command: self.text.clone(),
                expected: targets.len(),
                actual: columns.len(),
            });
        }
        for (idx, column) in targets.into_iter().zip(columns) {
            let parameter = &mut self.parameters[idx];
            parameter.source_column = Some((*column).to_string());
            parameter.source_version = RowVersion::Current;
        }
        Ok(())
    }

    pub(crate) fn replace_parameters(&mut self, parameters: Vec<Parameter>) {
        self.parameters = parameters;
    }

    fn positional_slots(&self) -> Vec<usize> {
        let skip = usize::from(
            self.parameters
                .first()
                .is_some_and(|p| p.direction == ParameterDirection::ReturnValue),
        );
        (skip..self.parameters.len()).collect()
    }

    fn unknown_parameter(&self, name: &str) -> SqlFacadeError {
        SqlFacadeError::ParameterError(format!(
            "no parameter named '{name}' on '{}'",
            self.text
        ))
    }
}
