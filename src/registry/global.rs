//! The process-wide active registry.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use super::{DEFAULT_DATABASE, DatabaseRegistry};
use crate::database::Database;
use crate::error::SqlFacadeError;

static ACTIVE: RwLock<Option<Arc<DatabaseRegistry>>> = RwLock::new(None);

/// Install `registry` as the active registry.
///
/// # Errors
/// Returns `AlreadyConfigured` when one is installed and `override_existing` is false.
pub fn set_database_registry(
    registry: DatabaseRegistry,
    override_existing: bool,
) -> Result<Arc<DatabaseRegistry>, SqlFacadeError> {
    let mut active = ACTIVE.write().unwrap_or_else(PoisonError::into_inner);
    if active.is_some() && !override_existing {
        return Err(SqlFacadeError::AlreadyConfigured);
    }
    let registry = Arc::new(registry);
    info!(names = ?registry.names(), "database registry installed");
    *active = Some(Arc::clone(&registry));
    Ok(registry)
}

/// Uninstall the active registry, returning it.
pub fn clear_database_registry() -> Option<Arc<DatabaseRegistry>> {
    ACTIVE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

#[must_use]
pub fn database_registry() -> Option<Arc<DatabaseRegistry>> {
    ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Resolve the default database through the active registry.
///
/// # Errors
/// Returns `UnknownDatabase` when nothing is installed or no default is registered.
pub fn create_database() -> Result<Arc<Database>, SqlFacadeError> {
    create_named_database(DEFAULT_DATABASE)
}

/// # Errors
/// Returns `UnknownDatabase` when nothing is installed or `name` is not registered.
pub fn create_named_database(name: &str) -> Result<Arc<Database>, SqlFacadeError> {
    let registry = database_registry().ok_or_else(|| SqlFacadeError::UnknownDatabase {
        name: name.to_string(),
    })?;
    registry.resolve(name)
}
