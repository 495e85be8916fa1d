use std::sync::Arc;

use sql_facade::prelude::*;
use sql_facade::test_utils::{StubDriver, stub_database};

#[test]
fn empty_text_or_name_is_invalid() -> Result<(), SqlFacadeError> {
    let db = stub_database("main", &Arc::new(StubDriver::new()))?;
    assert!(matches!(
        db.sql_string_command(""),
        Err(SqlFacadeError::InvalidArgument(_))
    ));
    assert!(matches!(
        db.stored_proc_command("   "),
        Err(SqlFacadeError::InvalidArgument(_))
    ));
    let cmd = db.command(CommandKind::StoredProcedure, "usp_Orders")?;
    assert_eq!(cmd.kind(), CommandKind::StoredProcedure);
    assert!(cmd.parameters().is_empty());
    Ok(())
}

#[test]
fn bound_values_read_back() -> Result<(), SqlFacadeError> {
    let db = stub_database("main", &Arc::new(StubDriver::new()))?;
    let mut cmd = db.sql_string_command("UPDATE t SET a = @a, b = @b WHERE id = @id")?;
    let missing: Option<&str> = None;
    cmd.bind_in("@a", DbType::String, "first")?
        .bind_in("@b", DbType::String, missing)?
        .bind_in_without_value("@id", DbType::Int64)?;

    assert_eq!(cmd.parameter_value("@a")?, Some(&RowValues::from("first")));
    assert_eq!(cmd.parameter_value("b")?, Some(&RowValues::Null));
    assert_eq!(cmd.parameter_value("@id")?, None);
    assert!(matches!(
        cmd.parameter_value("@nope"),
        Err(SqlFacadeError::ParameterError(_))
    ));
    Ok(())
}

#[test]
fn parameter_names_get_the_driver_prefix() -> Result<(), SqlFacadeError> {
    let db = stub_database("main", &Arc::new(StubDriver::new()))?;
    assert_eq!(db.build_parameter_name("CustomerId"), "@CustomerId");
    assert_eq!(db.build_parameter_name("@CustomerId"), "@CustomerId");
    Ok(())
}

#[test]
fn positional_values_skip_the_return_value() -> Result<(), SqlFacadeError> {
    let mut cmd = Command::stored_procedure("usp_Totals")?;
    cmd.add_parameter(
        Parameter::new("@RETURN_VALUE", DbType::Int32).direction(ParameterDirection::ReturnValue),
    )?;
    cmd.add_parameter(Parameter::new("@From", DbType::DateTime))?;
    cmd.add_parameter(Parameter::new("@Region", DbType::String))?;

    cmd.assign_positional_values(&[RowValues::Null, RowValues::from("north")])?;
    assert_eq!(cmd.parameter_value("@Region")?, Some(&RowValues::from("north")));
    assert_eq!(cmd.parameter_value("@RETURN_VALUE")?, None);

    let res = cmd.assign_positional_values(&[
        RowValues::Null,
        RowValues::from("north"),
        RowValues::Int(1),
    ]);
    assert!(matches!(
        res,
        Err(SqlFacadeError::ArityMismatch { expected: 2, actual: 3, .. })
    ));
    Ok(())
}

#[test]
fn column_bindings_remember_their_version() -> Result<(), SqlFacadeError> {
    let mut cmd = Command::text("DELETE FROM t WHERE id = @id")?;
    cmd.bind_from_column("@id", DbType::Int64, "Id", RowVersion::Original)?;
    let p = cmd.parameter("id").ok_or_else(|| {
        SqlFacadeError::ParameterError("parameter @id should exist".into())
    })?;
    assert_eq!(p.source_column.as_deref(), Some("Id"));
    assert_eq!(p.source_version, RowVersion::Original);
    assert!(matches!(
        cmd.bind_from_column("@other", DbType::Int64, "", RowVersion::Current),
        Err(SqlFacadeError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn named_placeholders_rewrite_outside_literals() {
    let rewritten = rewrite_named_placeholders(
        "SELECT '@skip', @b -- @comment\n, @a, @b",
        PlaceholderStyle::Postgres,
    );
    assert_eq!(rewritten.sql, "SELECT '@skip', $1 -- @comment\n, $2, $1");
    assert_eq!(rewritten.position("b"), Some(0));
    assert_eq!(rewritten.position("@a"), Some(1));
}
