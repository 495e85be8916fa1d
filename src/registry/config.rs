//! Registry configuration loaded from JSON.
//!
//! ```rust
//! use sql_facade::registry::{DriverCatalog, RegistryConfig};
//!
//! let cfg = RegistryConfig::from_json_str(
//!     r#"{ "default": "main",
//!          "databases": [ { "name": "main", "connection_string": ":memory:", "provider": "sqlite" } ] }"#,
//! )?;
//! let registry = cfg.into_builder(&DriverCatalog::with_builtin()).build()?;
//! assert_eq!(registry.names(), vec!["", "main"]);
//! # Ok::<(), sql_facade::SqlFacadeError>(())
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{DatabaseRegistryBuilder, DriverCatalog};
use crate::error::SqlFacadeError;

/// One named database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub connection_string: String,
    /// Provider invariant name, e.g. `sqlite`.
    pub provider: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registration the empty name resolves to.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
}

impl RegistryConfig {
    /// # Errors
    /// Returns `ConfigError` when `json` is not a valid registry document.
    pub fn from_json_str(json: &str) -> Result<Self, SqlFacadeError> {
        serde_json::from_str(json)
            .map_err(|e| SqlFacadeError::ConfigError(format!("invalid registry config: {e}")))
    }

    /// # Errors
    /// Returns `ConfigError` when the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlFacadeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            SqlFacadeError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Turn the entries into registrations resolved against `catalog`.
    #[must_use]
    pub fn into_builder(self, catalog: &DriverCatalog) -> DatabaseRegistryBuilder {
        let mut builder = DatabaseRegistryBuilder::new().catalog(catalog.clone());
        for db in &self.databases {
            builder = builder.register_provider(&db.name, &db.connection_string, &db.provider);
        }
        match self.default {
            Some(default) if !default.is_empty() => builder.default_database(&default),
            _ => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_config_errors() {
        let err = RegistryConfig::from_json_str(r#"{ "databases": [ { "name": "a" } ] }"#);
        assert!(matches!(err, Err(SqlFacadeError::ConfigError(_))));
    }

    #[test]
    fn empty_document_is_an_empty_registry() -> Result<(), SqlFacadeError> {
        let cfg = RegistryConfig::from_json_str("{}")?;
        assert_eq!(cfg, RegistryConfig::default());
        let registry = cfg.into_builder(&DriverCatalog::new()).build()?;
        assert!(registry.names().is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_names_fail_build() -> Result<(), SqlFacadeError> {
        let cfg = RegistryConfig::from_json_str(
            r#"{ "databases": [
                { "name": "a", "connection_string": "x", "provider": "p" },
                { "name": "a", "connection_string": "y", "provider": "p" } ] }"#,
        )?;
        let res = cfg.into_builder(&DriverCatalog::new()).build();
        assert!(matches!(res, Err(SqlFacadeError::DuplicateRegistration { name }) if name == "a"));
        Ok(())
    }
}
