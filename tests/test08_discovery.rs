use std::sync::Arc;

use sql_facade::DriverCapabilities;
use sql_facade::prelude::*;
use sql_facade::test_utils::{StubCall, StubDriver, stub_database};

fn order_procedure() -> Vec<Parameter> {
    vec![
        Parameter::new("@RETURN_VALUE", DbType::Int32).direction(ParameterDirection::ReturnValue),
        Parameter::new("@OrderId", DbType::Int32).value(RowValues::Int(0)),
        Parameter::new("@Status", DbType::String).size(20),
    ]
}

fn derives(stub: &StubDriver) -> usize {
    stub.count(|c| matches!(c, StubCall::Derive(_)))
}

#[tokio::test]
async fn discovered_parameters_replace_the_declared_ones() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_procedure("usp_UpdateOrder", order_procedure());
    let db = stub_database("main", &stub)?;

    let mut cmd = db.stored_proc_command("usp_UpdateOrder")?;
    cmd.bind_in("@Stale", DbType::Int64, 1_i64)?;
    db.discover_parameters(&mut cmd).await?;

    let names: Vec<&str> = cmd.parameters().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["@RETURN_VALUE", "@OrderId", "@Status"]);
    assert!(cmd.parameters().iter().all(|p| p.value.is_none()));
    assert_eq!(cmd.parameter("@Status").and_then(|p| p.size), Some(20));
    assert_eq!(stub.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn procedure_commands_are_cached_per_name() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_procedure("usp_UpdateOrder", order_procedure());
    let db = stub_database("main", &stub)?;

    let mut first = db
        .stored_proc_command_with_values("usp_UpdateOrder", &[RowValues::Int(7), "shipped".into()])
        .await?;
    assert_eq!(first.parameter_value("@OrderId")?, Some(&RowValues::Int(7)));
    first.set_parameter_value("@Status", "changed")?;

    let second = db
        .stored_proc_command_with_values("USP_UPDATEORDER", &[RowValues::Int(8), "open".into()])
        .await?;
    assert_eq!(second.parameter_value("@Status")?, Some(&RowValues::from("open")));
    assert_eq!(derives(&stub), 1);

    let res = db
        .stored_proc_command_with_values(
            "usp_UpdateOrder",
            &[RowValues::Int(1), "a".into(), "extra".into()],
        )
        .await;
    assert!(matches!(
        res,
        Err(SqlFacadeError::ArityMismatch { expected: 2, actual: 3, .. })
    ));

    db.clear_parameter_cache();
    let bound = db
        .stored_proc_command_with_source_columns("usp_UpdateOrder", &["Id", "Status"])
        .await?;
    assert_eq!(derives(&stub), 2);
    let sources: Vec<Option<&str>> = bound
        .parameters()
        .iter()
        .map(|p| p.source_column.as_deref())
        .collect();
    assert_eq!(sources, vec![None, Some("Id"), Some("Status")]);
    Ok(())
}

#[tokio::test]
async fn discovery_requires_capability_and_procedure() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new().with_capabilities(DriverCapabilities {
        parameter_discovery: false,
        stored_procedures: true,
        ..DriverCapabilities::default()
    }));
    let db = stub_database("main", &stub)?;
    let mut cmd = db.stored_proc_command("usp_Anything")?;
    assert!(matches!(
        db.discover_parameters(&mut cmd).await,
        Err(SqlFacadeError::UnsupportedDiscovery { .. })
    ));
    assert_eq!(stub.connects(), 0);

    let capable = Arc::new(StubDriver::new());
    let db = stub_database("main", &capable)?;
    let mut text = db.sql_string_command("SELECT 1")?;
    assert!(matches!(
        db.discover_parameters(&mut text).await,
        Err(SqlFacadeError::InvalidArgument(_))
    ));

    let mut unknown = db.stored_proc_command("usp_Missing")?;
    let err = db.discover_parameters(&mut unknown).await;
    assert!(matches!(
        err.as_ref().map_err(SqlFacadeError::root),
        Err(SqlFacadeError::InvalidArgument(_))
    ));
    assert_eq!(capable.open_connections(), 0);
    Ok(())
}
