use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::driver::Driver;
use crate::error::SqlFacadeError;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use crate::types::DatabaseType;

/// Provider invariant names mapped to drivers.
#[derive(Clone, Default)]
pub struct DriverCatalog {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl DriverCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every adapter compiled into this build.
    #[must_use]
    pub fn with_builtin() -> Self {
        #[allow(unused_mut)]
        let mut catalog = Self::new();
        #[cfg(feature = "sqlite")]
        catalog.insert(
            DatabaseType::Sqlite.provider_name(),
            Arc::new(crate::sqlite::SqliteDriver::new()),
        );
        #[cfg(feature = "postgres")]
        catalog.insert(
            DatabaseType::Postgres.provider_name(),
            Arc::new(crate::postgres::PostgresDriver::new()),
        );
        catalog
    }

    /// Add or replace a provider. Names compare case-insensitively.
    pub fn insert(&mut self, provider: &str, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        self.drivers.insert(provider.to_ascii_lowercase(), driver)
    }

    #[must_use]
    pub fn with(mut self, provider: &str, driver: Arc<dyn Driver>) -> Self {
        self.insert(provider, driver);
        self
    }

    /// # Errors
    /// Returns `UnknownProvider` when nothing is registered under `provider`.
    pub fn get(&self, provider: &str) -> Result<Arc<dyn Driver>, SqlFacadeError> {
        self.drivers
            .get(&provider.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SqlFacadeError::UnknownProvider {
                provider: provider.to_string(),
            })
    }

    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("providers", &self.providers())
            .finish()
    }
}
