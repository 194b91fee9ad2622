use std::path::Path;

use serde::Deserialize;

use crate::error::{TenancyError, TenancyResult};

/// Configuration for tenancy orchestration, usually read from `tenancy.toml`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenancyConfig {
    pub pending: PendingConfig,
    pub migration: MigrationConfig,
}

/// Pending pool settings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PendingConfig {
    /// Number of tenants to keep in the pending pool. Default: 0.
    pub count: u64,
    /// Include pending tenants in tenant selection by default. Default: false.
    pub include_in_queries: bool,
}

/// Defaults for the migrate command. Explicit flags take precedence.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrationConfig {
    /// Number of workers. 1 runs sequentially. Default: 1.
    pub processes: usize,
    /// Continue past isolable per-tenant failures. Default: false.
    pub skip_failing: bool,
    /// Refuse to migrate without an explicit `--force`. Default: false.
    pub production: bool,
    /// Program and arguments executed once per tenant.
    pub command: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            processes: 1,
            skip_failing: false,
            production: false,
            command: Vec::new(),
        }
    }
}

impl TenancyConfig {
    pub fn from_toml(content: &str) -> TenancyResult<Self> {
        toml::from_str(content).map_err(|e| TenancyError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> TenancyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TenancyError::Config(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = TenancyConfig::default();
        assert_eq!(config.pending.count, 0);
        assert!(!config.pending.include_in_queries);
        assert_eq!(config.migration.processes, 1);
        assert!(!config.migration.skip_failing);
        assert!(!config.migration.production);
        assert!(config.migration.command.is_empty());
    }

    #[test]
    fn parse_partial_toml() {
        let config = TenancyConfig::from_toml(
            r#"
            [pending]
            count = 5

            [migration]
            skip_failing = true
            command = ["sh", "-c", "true"]
            "#,
        )
        .unwrap();
        assert_eq!(config.pending.count, 5);
        assert!(config.migration.skip_failing);
        assert_eq!(config.migration.processes, 1);
        assert_eq!(config.migration.command, vec!["sh", "-c", "true"]);
    }

    #[test]
    fn unknown_key_rejected() {
        let err = TenancyConfig::from_toml("[pending]\ncuont = 3\n").unwrap_err();
        assert!(matches!(err, TenancyError::Config(_)));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = TenancyConfig::from_file(Path::new("/nonexistent/tenancy.toml")).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
