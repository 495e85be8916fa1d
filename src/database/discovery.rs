use tracing::debug;

use super::Database;
use crate::command::{Command, Parameter};
use crate::error::SqlFacadeError;
use crate::types::{CommandKind, RowValues};

impl Database {
    /// Replace the parameters of a stored-procedure command with the ones the driver derives.
    ///
    /// # Errors
    /// Returns `UnsupportedDiscovery` when the driver cannot derive parameters, `InvalidArgument`
    /// for a text command, or the driver error.
    pub async fn discover_parameters(&self, command: &mut Command) -> Result<(), SqlFacadeError> {
        let parameters = self.derive(command.kind(), command.command_text()).await?;
        command.replace_parameters(parameters);
        Ok(())
    }

    /// A stored-procedure command whose parameters are discovered (cached per procedure) and then
    /// assigned from `values` in order.
    ///
    /// # Errors
    /// Returns `ArityMismatch` when the value count differs from the discovered parameters, plus
    /// anything [`discover_parameters`](Self::discover_parameters) returns.
    pub async fn stored_proc_command_with_values(
        &self,
        name: &str,
        values: &[RowValues],
    ) -> Result<Command, SqlFacadeError> {
        let mut command = self.cached_procedure(name).await?;
        command.assign_positional_values(values)?;
        Ok(command)
    }

    /// A stored-procedure command whose discovered parameters are bound, in order, to the
    /// given source columns at the current row version.
    ///
    /// # Errors
    /// As [`stored_proc_command_with_values`](Self::stored_proc_command_with_values).
    pub async fn stored_proc_command_with_source_columns(
        &self,
        name: &str,
        columns: &[&str],
    ) -> Result<Command, SqlFacadeError> {
        let mut command = self.cached_procedure(name).await?;
        command.assign_source_columns(columns)?;
        Ok(command)
    }

    async fn cached_procedure(&self, name: &str) -> Result<Command, SqlFacadeError> {
        let mut command = Command::stored_procedure(name)?;
        let key = name.to_ascii_lowercase();
        let cached = self.cache().get(&key).cloned();
        let parameters = match cached {
            Some(parameters) => parameters,
            None => {
                let derived = self.derive(CommandKind::StoredProcedure, name).await?;
                self.cache().insert(key, derived.clone());
                derived
            }
        };
        command.replace_parameters(parameters);
        Ok(command)
    }

    async fn derive(
        &self,
        kind: CommandKind,
        name: &str,
    ) -> Result<Vec<Parameter>, SqlFacadeError> {
        if !self.capabilities.parameter_discovery {
            return Err(SqlFacadeError::UnsupportedDiscovery {
                driver: self.driver.name().to_string(),
            });
        }
        if kind != CommandKind::StoredProcedure {
            return Err(SqlFacadeError::InvalidArgument(
                "parameter discovery requires a stored-procedure command".into(),
            ));
        }
        let probe = Command::stored_procedure(name)?;
        let mut conn = self.connect().await?;
        let res = conn
            .derive_parameters(&probe)
            .await
            .map_err(|e| e.with_context(&self.name, name));
        self.release(conn).await;
        let parameters = res?;
        debug!(database = %self.name, procedure = name, count = parameters.len(), "derived parameters");
        Ok(parameters
            .into_iter()
            .map(|mut p| {
                p.value = None;
                p
            })
            .collect())
    }
}
