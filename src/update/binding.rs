use crate::command::Command;
use crate::error::SqlFacadeError;
use crate::table::{Columns, DataRow, RowState};
use crate::types::{ChangeKind, RowValues, RowVersion, UpdatedRowSource};

/// The command that applies `state`, if the row is pending at all.
pub(super) fn change_kind(state: RowState) -> Option<ChangeKind> {
    match state {
        RowState::Unchanged => None,
        RowState::Added => Some(ChangeKind::Insert),
        RowState::Modified => Some(ChangeKind::Update),
        RowState::Deleted => Some(ChangeKind::Delete),
    }
}

/// The row version a parameter reads under `kind`. Inserts only have current values and
/// deletes only original ones; updates honor the parameter's own version.
fn effective_version(kind: ChangeKind, declared: RowVersion) -> RowVersion {
    match kind {
        ChangeKind::Insert => RowVersion::Current,
        ChangeKind::Update => declared,
        ChangeKind::Delete => RowVersion::Original,
    }
}

/// Clone `template` and fill every source-column parameter that sends a value from `row`.
///
/// # Errors
/// Returns `UnknownColumn` for a source column the table lacks (including output-only
/// parameters) and `RowVersionUnavailable` when the row has no such version.
pub(super) fn bind_row(
    template: &Command,
    row: &DataRow,
    kind: ChangeKind,
) -> Result<Command, SqlFacadeError> {
    let mut command = template.clone();
    for parameter in command.parameters_mut() {
        let Some(column) = parameter.source_column.as_deref() else {
            continue;
        };
        if parameter.direction.sends_value() {
            let version = effective_version(kind, parameter.source_version);
            parameter.value = Some(row.get_version(column, version)?.clone());
        } else {
            row.columns().require(column)?;
        }
    }
    Ok(command)
}

/// Output and in-out values bound to source columns, as `(column index, value)` pairs, when the
/// command asks for them.
pub(super) fn output_values(
    command: &Command,
    columns: &Columns,
) -> Result<Vec<(usize, RowValues)>, SqlFacadeError> {
    if command.updated_row_source() != UpdatedRowSource::OutputParameters {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for parameter in command.parameters() {
        if !parameter.direction.receives_value() {
            continue;
        }
        if let (Some(column), Some(value)) = (&parameter.source_column, &parameter.value) {
            out.push((columns.require(column)?, value.clone()));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::command::Parameter;
    use crate::table::DataTable;
    use crate::types::{DbType, ParameterDirection, RowVersion};

    fn table() -> Result<DataTable, SqlFacadeError> {
        let mut table = DataTable::new("t", vec!["Id".into(), "Value".into()]);
        table.load_row(vec![RowValues::Int(1), "A".into()])?;
        Ok(table)
    }

    #[test]
    fn binds_current_and_original_versions() -> Result<(), SqlFacadeError> {
        let mut table = table()?;
        if let Some(row) = table.row_mut(0) {
            row.set("Value", "B")?;
        }
        let mut template = Command::text("UPDATE t SET Value = @v WHERE Value = @old")?;
        template.bind_from_column("@v", DbType::String, "Value", RowVersion::Current)?;
        template.bind_from_column("@old", DbType::String, "Value", RowVersion::Original)?;
        let row = table.row(0).expect("row 0");
        let bound = bind_row(&template, row, ChangeKind::Update)?;
        assert_eq!(bound.parameter_value("@v")?, Some(&RowValues::from("B")));
        assert_eq!(bound.parameter_value("@old")?, Some(&RowValues::from("A")));
        assert!(template.parameter_value("@v")?.is_none());
        Ok(())
    }

    #[test]
    fn change_kind_decides_the_version_for_inserts_and_deletes() -> Result<(), SqlFacadeError> {
        let mut table = table()?;
        table.add_row(vec![RowValues::Int(2), "new".into()])?;
        table.delete_row(0)?;

        let mut template = Command::text("DELETE FROM t WHERE Id = @id")?;
        template.bind_from_column("@id", DbType::Int64, "Id", RowVersion::Current)?;
        let deleted = table.row(0).expect("row 0");
        let bound = bind_row(&template, deleted, ChangeKind::Delete)?;
        assert_eq!(bound.parameter_value("@id")?, Some(&RowValues::Int(1)));

        let mut template = Command::text("INSERT INTO t VALUES (@id, @v)")?;
        template.bind_from_column("@id", DbType::Int64, "Id", RowVersion::Original)?;
        template.bind_from_column("@v", DbType::String, "Value", RowVersion::Original)?;
        let added = table.row(1).expect("row 1");
        let bound = bind_row(&template, added, ChangeKind::Insert)?;
        assert_eq!(bound.parameter_value("@id")?, Some(&RowValues::Int(2)));
        assert_eq!(bound.parameter_value("@v")?, Some(&RowValues::from("new")));
        Ok(())
    }

    #[test]
    fn output_only_parameter_needs_known_column() -> Result<(), SqlFacadeError> {
        let table = table()?;
        let mut template = Command::text("INSERT INTO t DEFAULT VALUES")?;
        template.add_parameter(
            Parameter::new("@id", DbType::Int64)
                .direction(ParameterDirection::Output)
                .source("Missing", RowVersion::Current),
        )?;
        let row = table.row(0).expect("row 0");
        assert!(matches!(
            bind_row(&template, row, ChangeKind::Insert),
            Err(SqlFacadeError::UnknownColumn { .. })
        ));
        Ok(())
    }

    #[test]
    fn output_values_respect_row_source_policy() -> Result<(), SqlFacadeError> {
        let columns = Arc::new(Columns::new(vec!["Id".into()]));
        let mut cmd = Command::text("INSERT INTO t DEFAULT VALUES")?;
        cmd.add_parameter(
            Parameter::new("@id", DbType::Int64)
                .direction(ParameterDirection::Output)
                .source("Id", RowVersion::Current)
                .value(42_i64),
        )?;
        assert_eq!(output_values(&cmd, &columns)?, vec![(0, RowValues::Int(42))]);
        cmd.set_updated_row_source(UpdatedRowSource::None);
        assert!(output_values(&cmd, &columns)?.is_empty());
        Ok(())
    }
}
