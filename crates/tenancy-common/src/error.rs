use thiserror::Error;

use crate::id::TenantKey;

/// Top-level error type for tenancy orchestration.
///
/// Only `DataStoreMissing` and `Query` are per-tenant data problems; every
/// other variant signals a provisioning, programming or environment failure.
#[derive(Error, Debug)]
pub enum TenancyError {
    #[error("provisioning failure: {0}")]
    Provisioning(String),

    #[error("data store for tenant {tenant} does not exist")]
    DataStoreMissing { tenant: TenantKey },

    #[error("query error: {0}")]
    Query(String),

    #[error("migration exited with code {code}")]
    MigrationExit { code: i32 },

    #[error("unclassified error: {0}")]
    Unclassified(String),

    #[error("worker error: {0}")]
    Worker(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl TenancyError {
    /// Whether a migration run may skip past this error when failure
    /// isolation is enabled.
    pub fn is_isolable(&self) -> bool {
        matches!(self, Self::DataStoreMissing { .. } | Self::Query(_))
    }
}

pub type TenancyResult<T> = Result<T, TenancyError>;
