use std::sync::Arc;
use std::time::Duration;

use sql_facade::{DriverCapabilities, ResultData};
use sql_facade::prelude::*;
use sql_facade::test_utils::{StubCall, StubDriver, stub_database};
use tokio_util::sync::CancellationToken;

fn two_result_sets() -> Vec<ResultData> {
    vec![
        ResultData::new(
            vec!["Id".into(), "Name".into()],
            vec![
                vec![RowValues::Int(1), "a".into()],
                vec![RowValues::Int(2), "b".into()],
            ],
        ),
        ResultData::new(vec!["Total".into()], vec![vec![RowValues::Int(2)]]),
    ]
}

#[tokio::test]
async fn cursor_releases_connection_once_exhausted() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_results(two_result_sets());
    let db = stub_database("main", &stub)?;

    let mut cmd = db.sql_string_command("SELECT * FROM t; SELECT count(*) FROM t")?;
    let mut cursor = db.execute_reader(&mut cmd).await?;
    assert!(cursor.holds_connection());
    assert_eq!(cursor.columns(), ["Id", "Name"]);
    assert_eq!(stub.open_connections(), 1);

    let mut names = Vec::new();
    while let Some(record) = cursor.next().await? {
        names.push(record.get("Name").cloned());
    }
    assert_eq!(names, vec![Some(RowValues::from("a")), Some(RowValues::from("b"))]);
    assert!(cursor.holds_connection());

    assert!(cursor.next_result().await?);
    assert_eq!(cursor.columns(), ["Total"]);
    let total = cursor.next().await?.and_then(|r| r.get_by_index(0).cloned());
    assert_eq!(total, Some(RowValues::Int(2)));
    assert!(cursor.next().await?.is_none());

    assert!(!cursor.holds_connection());
    assert_eq!(stub.open_connections(), 0);
    assert!(stub.calls().contains(&StubCall::Close));
    Ok(())
}

#[tokio::test]
async fn dropped_cursor_releases_connection() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_results(two_result_sets());
    let db = stub_database("main", &stub)?;

    let mut cmd = db.sql_string_command("SELECT * FROM t")?;
    let mut cursor = db.execute_reader(&mut cmd).await?;
    assert!(cursor.next().await?.is_some());
    assert_eq!(stub.open_connections(), 1);
    drop(cursor);
    assert_eq!(stub.open_connections(), 0);
    assert_eq!(stub.calls().last(), Some(&StubCall::Dropped));
    Ok(())
}

#[tokio::test]
async fn scalar_is_none_without_rows() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_results(vec![ResultData::new(vec!["x".into()], Vec::new())]);
    let db = stub_database("main", &stub)?;
    let mut cmd = db.sql_string_command("SELECT x FROM empty")?;
    assert_eq!(db.execute_scalar(&mut cmd).await?, None);

    stub.with_results(two_result_sets());
    assert_eq!(db.execute_scalar(&mut cmd).await?, Some(RowValues::Int(1)));
    assert_eq!(stub.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn data_set_tables_get_default_names() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_results(two_result_sets());
    let db = stub_database("main", &stub)?;

    let mut cmd = db.sql_string_command("SELECT * FROM t; SELECT count(*) FROM t")?;
    let data = db.execute_data_set(&mut cmd).await?;
    let names: Vec<&str> = data.tables().iter().map(DataTable::name).collect();
    assert_eq!(names, vec!["Table", "Table1"]);
    let first = data.table("Table").map(DataTable::len);
    assert_eq!(first, Some(2));
    assert!(data
        .tables()
        .iter()
        .flat_map(DataTable::rows)
        .all(|r| r.state() == RowState::Unchanged));
    Ok(())
}

#[tokio::test]
async fn load_data_set_uses_caller_names_and_appends() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_results(two_result_sets());
    let db = stub_database("main", &stub)?;
    let mut cmd = db.sql_string_command("SELECT * FROM t; SELECT count(*) FROM t")?;

    let mut data = DataSet::new();
    db.load_data_set(&mut cmd, &mut data, &["Orders"]).await?;
    let names: Vec<&str> = data.tables().iter().map(DataTable::name).collect();
    assert_eq!(names, vec!["Orders", "Table1"]);

    db.load_data_set(&mut cmd, &mut data, &["Orders"]).await?;
    assert_eq!(data.table("orders").map(DataTable::len), Some(4));
    Ok(())
}

#[tokio::test]
async fn cancelled_token_fails_before_connecting() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    let db = stub_database("main", &stub)?;
    let token = CancellationToken::new();
    token.cancel();

    let mut cmd = db.sql_string_command("DELETE FROM t")?;
    cmd.set_cancellation(Some(token));
    let err = db.execute_non_query(&mut cmd).await;
    assert!(matches!(err, Err(SqlFacadeError::Cancelled)));
    assert_eq!(stub.connects(), 0);
    Ok(())
}

#[tokio::test]
async fn cancelling_mid_statement_interrupts_the_driver() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_delay(Some(Duration::from_secs(30)));
    let db = stub_database("main", &stub)?;

    let token = CancellationToken::new();
    let mut cmd = db.sql_string_command("UPDATE t SET a = 1")?;
    cmd.set_cancellation(Some(token.clone()));
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = db.execute_non_query(&mut cmd).await;
    assert!(err.as_ref().is_err_and(SqlFacadeError::is_cancelled));
    canceller
        .await
        .map_err(|e| SqlFacadeError::ExecutionError(e.to_string()))?;
    assert_eq!(stub.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn timeout_surfaces_with_command_text() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.with_delay(Some(Duration::from_secs(30)));
    let db = stub_database("main", &stub)?;

    let mut cmd = db.sql_string_command("SELECT pg_sleep(30)")?;
    cmd.set_timeout(Some(Duration::from_millis(50)));
    match db.execute_scalar(&mut cmd).await {
        Err(SqlFacadeError::Timeout { command, after }) => {
            assert_eq!(command, "SELECT pg_sleep(30)");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn stored_procedures_need_the_capability() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new().with_capabilities(DriverCapabilities {
        stored_procedures: false,
        ..DriverCapabilities::default()
    }));
    let db = stub_database("main", &stub)?;
    let mut cmd = db.stored_proc_command("usp_Purge")?;
    assert!(matches!(
        db.execute_non_query(&mut cmd).await,
        Err(SqlFacadeError::Unimplemented(_))
    ));
    assert_eq!(stub.connects(), 0);
    Ok(())
}

#[tokio::test]
async fn unset_input_parameter_is_rejected_up_front() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    let db = stub_database("main", &stub)?;
    let mut cmd = db.sql_string_command("DELETE FROM t WHERE id = @id")?;
    cmd.bind_in_without_value("@id", DbType::Int64)?;
    assert!(matches!(
        db.execute_non_query(&mut cmd).await,
        Err(SqlFacadeError::ParameterError(_))
    ));
    assert!(stub.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn driver_errors_name_database_and_command() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.on_non_query(|_: &mut Command| -> Result<i64, SqlFacadeError> {
        Err(SqlFacadeError::ExecutionError("constraint failed".into()))
    });
    let db = stub_database("billing", &stub)?;
    let mut cmd = db.sql_string_command("INSERT INTO invoices DEFAULT VALUES")?;
    let err = match db.execute_non_query(&mut cmd).await {
        Err(e) => e,
        Ok(n) => panic!("expected failure, got {n}"),
    };
    let msg = err.to_string();
    assert!(msg.contains("billing"));
    assert!(msg.contains("INSERT INTO invoices"));
    assert!(matches!(err.root(), SqlFacadeError::ExecutionError(_)));
    Ok(())
}

#[tokio::test]
async fn transaction_runs_on_one_connection() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    let db = stub_database("main", &stub)?;

    let mut tx = db.begin_transaction().await?;
    let mut cmd = db.sql_string_command("UPDATE t SET a = 1")?;
    assert_eq!(db.execute_non_query_in_transaction(&mut cmd, &mut tx).await?, 1);
    assert_eq!(db.execute_non_query_in_transaction(&mut cmd, &mut tx).await?, 1);
    let outcome = tx.commit().await?;
    assert_eq!(stub.connects(), 1);
    assert_eq!(
        stub.calls(),
        vec![
            StubCall::Connect,
            StubCall::Begin,
            StubCall::Execute("UPDATE t SET a = 1".into()),
            StubCall::Execute("UPDATE t SET a = 1".into()),
            StubCall::Commit,
        ]
    );

    let conn = outcome
        .into_restored_connection()
        .ok_or_else(|| SqlFacadeError::ExecutionError("connection not restored".into()))?;
    conn.close().await?;
    assert_eq!(stub.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn transaction_of_another_database_is_rejected() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    let main = stub_database("main", &stub)?;
    let other = stub_database("other", &stub)?;

    let mut tx = main.begin_transaction().await?;
    let mut cmd = other.sql_string_command("SELECT 1")?;
    assert!(matches!(
        other.execute_scalar_in_transaction(&mut cmd, &mut tx).await,
        Err(SqlFacadeError::InvalidArgument(_))
    ));
    tx.rollback().await?;
    Ok(())
}

#[tokio::test]
async fn transaction_of_a_same_named_handle_is_rejected() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    let first = stub_database("main", &stub)?;
    let second = stub_database("main", &stub)?;

    let mut tx = first.begin_transaction().await?;
    let mut cmd = second.sql_string_command("UPDATE t SET a = 1")?;
    assert!(matches!(
        second.execute_non_query_in_transaction(&mut cmd, &mut tx).await,
        Err(SqlFacadeError::InvalidArgument(_))
    ));
    assert_eq!(first.execute_non_query_in_transaction(&mut cmd, &mut tx).await?, 1);
    tx.commit().await?;
    assert_eq!(stub.count(|c| matches!(c, StubCall::Execute(_))), 1);
    Ok(())
}

#[tokio::test]
async fn dropped_transaction_rolls_back() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    let db = stub_database("main", &stub)?;
    {
        let mut tx = db.begin_transaction().await?;
        let mut cmd = db.sql_string_command("DELETE FROM t")?;
        db.execute_non_query_in_transaction(&mut cmd, &mut tx).await?;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(stub.count(|c| *c == StubCall::Rollback), 1);
    assert_eq!(stub.open_connections(), 0);
    Ok(())
}

#[tokio::test]
async fn connect_failure_is_reported_with_context() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    stub.fail_connect("server unreachable");
    let db = stub_database("main", &stub)?;
    let mut cmd = db.sql_string_command("SELECT 1")?;
    let res = db.execute_scalar(&mut cmd).await;
    assert!(matches!(
        res.as_ref().map_err(SqlFacadeError::root),
        Err(SqlFacadeError::ConnectionError(m)) if m == "server unreachable"
    ));
    assert_eq!(stub.open_connections(), 0);
    Ok(())
}
