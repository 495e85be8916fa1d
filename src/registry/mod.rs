//! Named database registrations and the process-wide active registry.
//!
//! A [`DatabaseRegistry`] maps logical names to lazily built [`Database`] handles. Resolving the
//! same name twice returns the same `Arc`.

mod catalog;
pub mod config;
pub mod global;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

pub use catalog::DriverCatalog;
pub use config::{DatabaseConfig, RegistryConfig};
pub use global::{
    clear_database_registry, create_database, create_named_database, database_registry,
    set_database_registry,
};

use crate::database::Database;
use crate::driver::Driver;
use crate::error::SqlFacadeError;

/// Name under which the default database is registered.
pub const DEFAULT_DATABASE: &str = "";

enum Source {
    Driver {
        connection_string: String,
        driver: Arc<dyn Driver>,
    },
    Provider {
        connection_string: String,
        provider: String,
    },
    Instance(Arc<Database>),
    Alias(String),
}

struct Registration {
    source: Source,
    resolved: Mutex<Option<Arc<Database>>>,
}

impl Registration {
    fn new(source: Source) -> Self {
        let resolved = match &source {
            Source::Instance(db) => Some(Arc::clone(db)),
            _ => None,
        };
        Self {
            source,
            resolved: Mutex::new(resolved),
        }
    }
}

/// Resolves logical database names to shared handles.
pub struct DatabaseRegistry {
    registrations: BTreeMap<String, Registration>,
    catalog: DriverCatalog,
}

impl DatabaseRegistry {
    #[must_use]
    pub fn builder() -> DatabaseRegistryBuilder {
        DatabaseRegistryBuilder::new()
    }

    /// Resolve `name`, building the handle on first access.
    ///
    /// # Errors
    /// Returns `UnknownDatabase` for an unregistered name, `UnknownProvider` when a provider
    /// registration names no catalog entry, and `InvalidArgument` from [`Database::new`].
    pub fn resolve(&self, name: &str) -> Result<Arc<Database>, SqlFacadeError> {
        self.resolve_at(name, 0)
    }

    /// # Errors
    /// Same as [`DatabaseRegistry::resolve`] for the default name.
    pub fn resolve_default(&self) -> Result<Arc<Database>, SqlFacadeError> {
        self.resolve(DEFAULT_DATABASE)
    }

    /// Registered names in sorted order; the default is the empty string.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.registrations.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    fn resolve_at(&self, name: &str, depth: usize) -> Result<Arc<Database>, SqlFacadeError> {
        let unknown = || SqlFacadeError::UnknownDatabase {
            name: name.to_string(),
        };
        let registration = self.registrations.get(name).ok_or_else(unknown)?;
        if let Source::Alias(target) = &registration.source {
            if depth > self.registrations.len() {
                return Err(SqlFacadeError::ConfigError(format!(
                    "database alias '{name}' is circular"
                )));
            }
            return self.resolve_at(target, depth + 1);
        }

        let mut resolved = registration
            .resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(db) = resolved.as_ref() {
            return Ok(Arc::clone(db));
        }
        let db = match &registration.source {
            Source::Driver {
                connection_string,
                driver,
            } => Database::new(name, connection_string.as_str(), Arc::clone(driver))?,
            Source::Provider {
                connection_string,
                provider,
            } => Database::new(name, connection_string.as_str(), self.catalog.get(provider)?)?,
            Source::Instance(db) => return Ok(Arc::clone(db)),
            Source::Alias(_) => return Err(unknown()),
        };
        debug!(database = name, driver = db.driver_name(), "database resolved");
        let db = Arc::new(db);
        *resolved = Some(Arc::clone(&db));
        Ok(db)
    }
}

impl fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("names", &self.names())
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// Collects registrations; problems surface from [`DatabaseRegistryBuilder::build`].
pub struct DatabaseRegistryBuilder {
    registrations: BTreeMap<String, Registration>,
    catalog: DriverCatalog,
    error: Option<SqlFacadeError>,
}

impl Default for DatabaseRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseRegistryBuilder {
    /// A builder resolving providers against [`DriverCatalog::with_builtin`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            registrations: BTreeMap::new(),
            catalog: DriverCatalog::with_builtin(),
            error: None,
        }
    }

    /// Replace the provider catalog.
    #[must_use]
    pub fn catalog(mut self, catalog: DriverCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn register(
        self,
        name: &str,
        connection_string: &str,
        driver: Arc<dyn Driver>,
    ) -> Self {
        if connection_string.trim().is_empty() {
            return self.fail(empty("connection string", name));
        }
        self.add(
            name,
            Source::Driver {
                connection_string: connection_string.to_string(),
                driver,
            },
        )
    }

    /// Register by provider name, looked up in the catalog when first resolved.
    #[must_use]
    pub fn register_provider(self, name: &str, connection_string: &str, provider: &str) -> Self {
        if connection_string.trim().is_empty() {
            return self.fail(empty("connection string", name));
        }
        if provider.trim().is_empty() {
            return self.fail(empty("provider name", name));
        }
        self.add(
            name,
            Source::Provider {
                connection_string: connection_string.to_string(),
                provider: provider.to_string(),
            },
        )
    }

    #[must_use]
    pub fn register_instance(self, name: &str, database: Arc<Database>) -> Self {
        self.add(name, Source::Instance(database))
    }

    #[must_use]
    pub fn register_default(self, connection_string: &str, driver: Arc<dyn Driver>) -> Self {
        self.register(DEFAULT_DATABASE, connection_string, driver)
    }

    #[must_use]
    pub fn register_default_provider(self, connection_string: &str, provider: &str) -> Self {
        self.register_provider(DEFAULT_DATABASE, connection_string, provider)
    }

    #[must_use]
    pub fn register_default_instance(self, database: Arc<Database>) -> Self {
        self.register_instance(DEFAULT_DATABASE, database)
    }

    /// Make the default name resolve to the registration called `name`.
    #[must_use]
    pub fn default_database(self, name: &str) -> Self {
        if name.is_empty() {
            return self.fail(SqlFacadeError::InvalidArgument(
                "default database alias must name a registration".into(),
            ));
        }
        self.add(DEFAULT_DATABASE, Source::Alias(name.to_string()))
    }

    /// # Errors
    /// Returns the first registration error: `InvalidArgument`, `DuplicateRegistration`, or
    /// `UnknownDatabase` for a default alias naming nothing.
    pub fn build(self) -> Result<DatabaseRegistry, SqlFacadeError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        for registration in self.registrations.values() {
            if let Source::Alias(target) = &registration.source
                && !self.registrations.contains_key(target)
            {
                return Err(SqlFacadeError::UnknownDatabase {
                    name: target.clone(),
                });
            }
        }
        Ok(DatabaseRegistry {
            registrations: self.registrations,
            catalog: self.catalog,
        })
    }

    fn add(mut self, name: &str, source: Source) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.registrations.contains_key(name) {
            return self.fail(SqlFacadeError::DuplicateRegistration {
                name: name.to_string(),
            });
        }
        self.registrations
            .insert(name.to_string(), Registration::new(source));
        self
    }

    fn fail(mut self, err: SqlFacadeError) -> Self {
        self.error.get_or_insert(err);
        self
    }
}

fn empty(what: &str, name: &str) -> SqlFacadeError {
    SqlFacadeError::InvalidArgument(format!("{what} for database '{name}' must not be empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::StubDriver;

    #[test]
    fn resolves_lazily_and_caches() -> Result<(), SqlFacadeError> {
        let stub = Arc::new(StubDriver::new());
        let registry = DatabaseRegistry::builder()
            .register("orders", "stub://orders", stub.clone())
            .build()?;
        let first = registry.resolve("orders")?;
        let second = registry.resolve("orders")?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), "orders");
        Ok(())
    }

    #[test]
    fn default_alias_points_at_named_registration() -> Result<(), SqlFacadeError> {
        let registry = DatabaseRegistry::builder()
            .register("main", "stub://main", Arc::new(StubDriver::new()))
            .default_database("main")
            .build()?;
        let main = registry.resolve("main")?;
        assert!(Arc::ptr_eq(&main, &registry.resolve_default()?));
        assert_eq!(registry.names(), vec!["", "main"]);
        Ok(())
    }

    #[test]
    fn alias_to_missing_name_fails_build() {
        let res = DatabaseRegistry::builder().default_database("ghost").build();
        assert!(matches!(res, Err(SqlFacadeError::UnknownDatabase { name }) if name == "ghost"));
    }

    #[test]
    fn unknown_provider_surfaces_on_resolve() -> Result<(), SqlFacadeError> {
        let registry = DatabaseRegistry::builder()
            .catalog(DriverCatalog::new())
            .register_provider("x", "whatever", "nosuch")
            .build()?;
        assert!(matches!(
            registry.resolve("x"),
            Err(SqlFacadeError::UnknownProvider { provider }) if provider == "nosuch"
        ));
        Ok(())
    }
}
