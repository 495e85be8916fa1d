#![cfg(feature = "sqlite")]

use std::sync::Arc;

use sql_facade::prelude::*;

async fn seeded(path: &str) -> Result<Arc<Database>, SqlFacadeError> {
    let registry = DatabaseRegistry::builder()
        .register_default_provider(path, "sqlite")
        .build()?;
    let db = registry.resolve_default()?;
    let mut ddl = db.sql_string_command(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);
         INSERT INTO items (id, name) VALUES (1, 'first'), (2, 'second');",
    )?;
    db.execute_non_query(&mut ddl).await?;
    Ok(db)
}

fn item_commands() -> Result<UpdateCommands, SqlFacadeError> {
    let mut insert =
        Command::text("INSERT INTO items (name) VALUES (@name) RETURNING id")?;
    insert.bind_from_column("@name", DbType::String, "name", RowVersion::Current)?;
    insert.add_parameter(
        Parameter::new("@id", DbType::Int64)
            .direction(ParameterDirection::Output)
            .source("id", RowVersion::Current),
    )?;

    let mut update = Command::text("UPDATE items SET name = @name WHERE id = @id")?;
    update
        .bind_from_column("@name", DbType::String, "name", RowVersion::Current)?
        .bind_from_column("@id", DbType::Int64, "id", RowVersion::Original)?;

    let mut delete = Command::text("DELETE FROM items WHERE id = @id")?;
    delete.bind_from_column("@id", DbType::Int64, "id", RowVersion::Original)?;

    Ok(UpdateCommands::new()
        .with_insert(insert)
        .with_update(update)
        .with_delete(delete))
}

async fn fetch(db: &Database) -> Result<DataSet, SqlFacadeError> {
    let mut select = db.sql_string_command("SELECT id, name FROM items ORDER BY id")?;
    db.execute_data_set(&mut select).await
}

fn items(data_set: &mut DataSet) -> Result<&mut DataTable, SqlFacadeError> {
    data_set
        .table_mut("Table")
        .ok_or_else(|| SqlFacadeError::MissingTableName {
            table: "Table".into(),
        })
}

fn names(data_set: &DataSet) -> Vec<Option<String>> {
    data_set
        .tables()
        .iter()
        .flat_map(DataTable::rows)
        .map(|r| r.get("name").ok().and_then(RowValues::as_text).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn update_and_delete_reach_the_database() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("items.db");
    let db = seeded(&path.to_string_lossy()).await?;

    let mut data_set = fetch(&db).await?;
    let table = items(&mut data_set)?;
    assert_eq!(table.len(), 2);
    if let Some(row) = table.row_mut(0) {
        row.set("name", "renamed")?;
    }
    table.delete_row(1)?;

    let applied = db
        .update_data_set(&mut data_set, "Table", &item_commands()?, UpdateBehavior::Standard, None)
        .await?;
    assert_eq!(applied, 2);
    assert_eq!(items(&mut data_set)?.len(), 1);
    assert!(!data_set.has_changes());

    let refetched = fetch(&db).await?;
    assert_eq!(names(&refetched), vec![Some("renamed".to_string())]);
    Ok(())
}

#[tokio::test]
async fn inserted_rows_receive_generated_keys() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded(":memory:").await?;
    let mut data_set = fetch(&db).await?;
    items(&mut data_set)?.add_row(vec![RowValues::Null, "third".into()])?;

    db.update_data_set(&mut data_set, "Table", &item_commands()?, UpdateBehavior::Standard, None)
        .await?;
    let table = items(&mut data_set)?;
    let id = table.row(2).and_then(|r| r.get("id").ok().cloned());
    assert_eq!(id, Some(RowValues::Int(3)));
    assert_eq!(table.row(2).map(DataRow::state), Some(RowState::Unchanged));
    Ok(())
}

#[tokio::test]
async fn transactional_failure_rolls_back_earlier_rows() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tx.db");
    let db = seeded(&path.to_string_lossy()).await?;

    let mut data_set = fetch(&db).await?;
    let table = items(&mut data_set)?;
    table.add_row(vec![RowValues::Null, "third".into()])?;
    table.add_row(vec![RowValues::Null, "first".into()])?;

    let res = db
        .update_data_set(
            &mut data_set,
            "Table",
            &item_commands()?,
            UpdateBehavior::Transactional,
            None,
        )
        .await;
    assert!(matches!(res, Err(SqlFacadeError::SynchronizationFailed { row: 3, .. })));
    assert_eq!(names(&fetch(&db).await?).len(), 2);
    assert_eq!(
        items(&mut data_set)?.row(2).map(DataRow::state),
        Some(RowState::Added)
    );
    Ok(())
}

#[tokio::test]
async fn batched_continue_annotates_missing_rows() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded(":memory:").await?;
    let mut data_set = fetch(&db).await?;
    let table = items(&mut data_set)?;
    table.delete_row(0)?;
    table.delete_row(1)?;

    let mut gone = db.sql_string_command("DELETE FROM items WHERE id = 2")?;
    db.execute_non_query(&mut gone).await?;

    let applied = db
        .update_data_set(&mut data_set, "Table", &item_commands()?, UpdateBehavior::Continue, Some(10))
        .await?;
    assert_eq!(applied, 1);
    let table = items(&mut data_set)?;
    assert_eq!(table.len(), 1);
    assert!(table.row(0).is_some_and(DataRow::has_error));
    Ok(())
}

#[tokio::test]
async fn scalar_reader_and_transactions() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded(":memory:").await?;

    let mut count = db.sql_string_command("SELECT count(*) FROM items")?;
    assert_eq!(db.execute_scalar(&mut count).await?, Some(RowValues::Int(2)));

    let mut tx = db.begin_transaction().await?;
    let mut insert = db.sql_string_command("INSERT INTO items (name) VALUES (:name)")?;
    insert.bind_in("name", DbType::String, "tx row")?;
    assert_eq!(db.execute_non_query_in_transaction(&mut insert, &mut tx).await?, 1);
    assert_eq!(
        db.execute_scalar_in_transaction(&mut count, &mut tx).await?,
        Some(RowValues::Int(3))
    );
    let conn = tx.rollback().await?.into_restored_connection();
    drop(conn);

    let mut select = db.sql_string_command("SELECT name FROM items ORDER BY id")?;
    let mut cursor = db.execute_reader(&mut select).await?;
    let mut seen = Vec::new();
    while let Some(record) = cursor.next().await? {
        seen.push(record.get("name").cloned());
    }
    assert_eq!(seen, vec![Some(RowValues::from("first")), Some(RowValues::from("second"))]);
    assert!(!cursor.holds_connection());
    Ok(())
}

#[tokio::test]
async fn trigger_scripts_run_as_one_statement() -> Result<(), Box<dyn std::error::Error>> {
    let db = seeded(":memory:").await?;
    let mut ddl = db.sql_string_command(
        "ALTER TABLE items ADD COLUMN tag TEXT;
         CREATE TRIGGER items_tag AFTER INSERT ON items BEGIN
           UPDATE items SET tag = 'x' WHERE id = new.id;
         END;",
    )?;
    db.execute_non_query(&mut ddl).await?;

    let mut insert = db.sql_string_command("INSERT INTO items (name) VALUES (@name)")?;
    insert.bind_in("@name", DbType::String, "tagged")?;
    db.execute_non_query(&mut insert).await?;

    let mut tag = db.sql_string_command("SELECT tag FROM items WHERE name = 'tagged'")?;
    assert_eq!(db.execute_scalar(&mut tag).await?, Some(RowValues::from("x")));
    Ok(())
}
