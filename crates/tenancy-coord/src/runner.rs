//! Sequential per-tenant migration with an explicit failure policy.

use std::sync::Arc;

use tenancy_common::{TenancyError, TenancyResult, TenantKey};
use thiserror::Error;
use tracing::{error, info};

use crate::context::TenantContext;
use crate::engine::{EngineExit, MigrationEngine};
use crate::events::{MigrationObserver, TracingObserver};
use crate::tenant::Tenant;

/// Whether one tenant's failure stops the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop at the first failed tenant.
    #[default]
    Abort,
    /// Record isolable failures and continue with the next tenant.
    Isolate,
}

impl FailurePolicy {
    pub fn from_skip_failing(skip_failing: bool) -> Self {
        if skip_failing { Self::Isolate } else { Self::Abort }
    }
}

/// Result of migrating one tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MigrationOutcome {
    Succeeded,
    Failed(String),
    /// Not attempted because the run aborted earlier.
    Skipped,
}

/// Outcomes of a run, in processing order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunResult {
    pub outcomes: Vec<(TenantKey, MigrationOutcome)>,
}

impl RunResult {
    fn record(&mut self, key: &TenantKey, outcome: MigrationOutcome) {
        self.outcomes.push((key.clone(), outcome));
    }

    pub fn outcome(&self, key: &TenantKey) -> Option<&MigrationOutcome> {
        self.outcomes.iter().find(|(k, _)| k == key).map(|(_, o)| o)
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Succeeded))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MigrationOutcome::Skipped))
    }

    /// True iff no tenant failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    fn count(&self, pred: impl Fn(&MigrationOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tenant(s) processed: {} succeeded, {} failed, {} skipped",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.skipped()
        )
    }
}

/// A run stopped early. `result` holds everything recorded up to and
/// including the failing tenant; the rest are `Skipped`.
#[derive(Debug, Error)]
#[error("migration aborted at tenant {tenant}: {source}")]
pub struct RunAborted {
    pub tenant: TenantKey,
    pub result: RunResult,
    #[source]
    pub source: TenancyError,
}

/// Migrates tenants one at a time, each inside its own active context.
pub struct MigrationRunner {
    context: Arc<dyn TenantContext>,
    engine: Arc<dyn MigrationEngine>,
    observer: Arc<dyn MigrationObserver>,
}

impl MigrationRunner {
    pub fn new(context: Arc<dyn TenantContext>, engine: Arc<dyn MigrationEngine>) -> Self {
        Self {
            context,
            engine,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Migrate `tenants` in the given order.
    ///
    /// A non-zero engine exit or an isolable fault marks the tenant `Failed`;
    /// under [`FailurePolicy::Abort`] the run then stops. Non-isolable faults
    /// always stop the run.
    pub fn run(&self, tenants: &[Tenant], policy: FailurePolicy) -> Result<RunResult, RunAborted> {
        let mut result = RunResult::default();

        for (i, tenant) in tenants.iter().enumerate() {
            info!("Migrating tenant {}", tenant.key);

            let (failure, fatal) = match self.migrate_one(tenant) {
                Ok(exit) if exit.is_success() => {
                    result.record(&tenant.key, MigrationOutcome::Succeeded);
                    continue;
                }
                Ok(exit) => (TenancyError::MigrationExit { code: exit.0 }, false),
                Err(e) => {
                    let fatal = !e.is_isolable();
                    (e, fatal)
                }
            };

            error!("Migration failed for tenant {}: {failure}", tenant.key);
            result.record(&tenant.key, MigrationOutcome::Failed(failure.to_string()));

            if fatal || policy == FailurePolicy::Abort {
                for rest in &tenants[i + 1..] {
                    result.record(&rest.key, MigrationOutcome::Skipped);
                }
                info!("{result}");
                return Err(RunAborted {
                    tenant: tenant.key.clone(),
                    result,
                    source: failure,
                });
            }
        }

        info!("{result}");
        Ok(result)
    }

    fn migrate_one(&self, tenant: &Tenant) -> TenancyResult<EngineExit> {
        let mut exit = None;
        self.context.with_active(tenant, &mut || {
            self.observer.migrating(tenant);
            let code = self.engine.apply_pending()?;
            self.observer.migrated(tenant);
            exit = Some(code);
            Ok(())
        })?;
        exit.ok_or_else(|| {
            TenancyError::Unclassified(format!(
                "context for tenant {} returned without running the migration",
                tenant.key
            ))
        })
    }
}
