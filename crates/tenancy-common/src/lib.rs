//! tenancy-common: shared identifiers, error taxonomy, configuration.

pub mod config;
pub mod error;
pub mod id;

pub use config::{MigrationConfig, PendingConfig, TenancyConfig};
pub use error::{TenancyError, TenancyResult};
pub use id::TenantKey;
