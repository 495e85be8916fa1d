use std::io::Write;
use std::sync::Arc;

use sql_facade::registry::{DatabaseRegistry, DriverCatalog, RegistryConfig};
use sql_facade::test_utils::{StubDriver, stub_database};
use sql_facade::SqlFacadeError;

#[test]
fn resolving_twice_returns_the_same_handle() -> Result<(), SqlFacadeError> {
    let registry = DatabaseRegistry::builder()
        .register_default("stub://main", Arc::new(StubDriver::new()))
        .register("reports", "stub://reports", Arc::new(StubDriver::new()))
        .build()?;

    let a = registry.resolve_default()?;
    let b = registry.resolve("")?;
    assert!(Arc::ptr_eq(&a, &b));

    let reports = registry.resolve("reports")?;
    assert!(!Arc::ptr_eq(&a, &reports));
    assert_eq!(reports.connection_string(), "stub://reports");
    Ok(())
}

#[test]
fn duplicate_registration_is_rejected() {
    let res = DatabaseRegistry::builder()
        .register("main", "stub://a", Arc::new(StubDriver::new()))
        .register("main", "stub://b", Arc::new(StubDriver::new()))
        .build();
    assert!(matches!(res, Err(SqlFacadeError::DuplicateRegistration { name }) if name == "main"));
}

#[test]
fn unknown_name_is_rejected() -> Result<(), SqlFacadeError> {
    let registry = DatabaseRegistry::builder()
        .register("main", "stub://a", Arc::new(StubDriver::new()))
        .build()?;
    assert!(matches!(
        registry.resolve("other"),
        Err(SqlFacadeError::UnknownDatabase { name }) if name == "other"
    ));
    assert!(matches!(
        registry.resolve_default(),
        Err(SqlFacadeError::UnknownDatabase { .. })
    ));
    Ok(())
}

#[test]
fn empty_connection_string_and_provider_are_invalid() {
    let res = DatabaseRegistry::builder()
        .register("main", "  ", Arc::new(StubDriver::new()))
        .build();
    assert!(matches!(res, Err(SqlFacadeError::InvalidArgument(_))));

    let res = DatabaseRegistry::builder()
        .register_provider("main", "stub://a", "")
        .build();
    assert!(matches!(res, Err(SqlFacadeError::InvalidArgument(_))));
}

#[test]
fn instances_are_returned_as_registered() -> Result<(), SqlFacadeError> {
    let stub = Arc::new(StubDriver::new());
    let db = Arc::new(stub_database("warehouse", &stub)?);
    let registry = DatabaseRegistry::builder()
        .register_default_instance(Arc::clone(&db))
        .build()?;
    assert!(Arc::ptr_eq(&db, &registry.resolve_default()?));
    assert_eq!(stub.connects(), 0);
    Ok(())
}

#[test]
fn providers_resolve_through_a_custom_catalog() -> Result<(), SqlFacadeError> {
    let catalog = DriverCatalog::new().with("Stub", Arc::new(StubDriver::new().with_name("stub")));
    assert_eq!(catalog.providers(), vec!["stub"]);

    let registry = DatabaseRegistry::builder()
        .catalog(catalog)
        .register_provider("main", "stub://main", "STUB")
        .default_database("main")
        .build()?;
    let db = registry.resolve_default()?;
    assert_eq!(db.name(), "main");
    assert_eq!(db.driver_name(), "stub");
    Ok(())
}

#[test]
fn config_file_builds_a_registry() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{
            "default": "orders",
            "databases": [
                {{ "name": "orders", "connection_string": "stub://orders", "provider": "stub" }},
                {{ "name": "audit", "connection_string": "stub://audit", "provider": "stub" }}
            ]
        }}"#
    )?;

    let cfg = RegistryConfig::from_json_file(file.path())?;
    assert_eq!(cfg.databases.len(), 2);

    let catalog = DriverCatalog::new().with("stub", Arc::new(StubDriver::new()));
    let registry = cfg.into_builder(&catalog).build()?;
    assert_eq!(registry.names(), vec!["", "audit", "orders"]);
    assert!(Arc::ptr_eq(
        &registry.resolve_default()?,
        &registry.resolve("orders")?
    ));
    Ok(())
}

#[test]
fn missing_config_file_is_a_config_error() {
    let res = RegistryConfig::from_json_file("/definitely/not/here.json");
    assert!(matches!(res, Err(SqlFacadeError::ConfigError(_))));
}
