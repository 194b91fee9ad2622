//! Migration engine port.

use tenancy_common::TenancyResult;

/// Exit code reported by a migration engine. Zero means success.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EngineExit(pub i32);

impl EngineExit {
    pub const SUCCESS: Self = Self(0);
    pub const FAILURE: Self = Self(1);

    pub const fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for EngineExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit {}", self.0)
    }
}

/// Applies outstanding migration steps to the currently active data store.
///
/// May fail with `DataStoreMissing` or `Query` for per-tenant data problems;
/// any other error is treated as fatal by the runner.
pub trait MigrationEngine: Send + Sync {
    fn apply_pending(&self) -> TenancyResult<EngineExit>;
}

impl<F> MigrationEngine for F
where
    F: Fn() -> TenancyResult<EngineExit> + Send + Sync,
{
    fn apply_pending(&self) -> TenancyResult<EngineExit> {
        self()
    }
}
