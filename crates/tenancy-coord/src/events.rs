//! Per-tenant migration notifications.

use tracing::debug;

use crate::tenant::Tenant;

/// Observer of per-tenant migration events. Notifications are local to the
/// process running the tenant.
pub trait MigrationObserver: Send + Sync {
    /// The tenant's context is active and the engine is about to run.
    fn migrating(&self, _tenant: &Tenant) {}

    /// The engine returned without a fault, whatever its exit code.
    fn migrated(&self, _tenant: &Tenant) {}
}

/// Logs events at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl MigrationObserver for TracingObserver {
    fn migrating(&self, tenant: &Tenant) {
        debug!(tenant = %tenant.key, "migrating database");
    }

    fn migrated(&self, tenant: &Tenant) {
        debug!(tenant = %tenant.key, "database migrated");
    }
}
