//! Migration engine that runs an external command against the active store.

use std::process::{Command, Stdio};
use std::sync::Arc;

use tenancy_common::{TenancyError, TenancyResult};
use tenancy_coord::{EngineExit, MigrationEngine};

use crate::store::StoreContext;

pub const TENANT_KEY_ENV: &str = "TENANCY_TENANT_KEY";
pub const DATA_STORE_ENV: &str = "TENANCY_DATA_STORE";

/// Runs the configured command once per tenant with the active tenant's key
/// and data store path in its environment.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    context: Arc<StoreContext>,
}

impl CommandEngine {
    pub fn new(command: &[String], context: Arc<StoreContext>) -> TenancyResult<Self> {
        let (program, args) = command.split_first().ok_or_else(|| {
            TenancyError::Config("migration.command must name a program to run".into())
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            context,
        })
    }
}

impl MigrationEngine for CommandEngine {
    fn apply_pending(&self) -> TenancyResult<EngineExit> {
        let active = self
            .context
            .active()
            .ok_or_else(|| TenancyError::Unclassified("no active tenant data store".into()))?;

        let status = Command::new(&self.program)
            .args(&self.args)
            .env(TENANT_KEY_ENV, active.key.as_str())
            .env(DATA_STORE_ENV, &active.path)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| {
                TenancyError::Unclassified(format!("cannot run '{}': {e}", self.program))
            })?;

        match status.code() {
            Some(code) => Ok(EngineExit(code)),
            None => Err(TenancyError::Unclassified(format!(
                "'{}' terminated by signal",
                self.program
            ))),
        }
    }
}
