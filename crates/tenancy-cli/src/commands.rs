//! `pending` and `migrate` command handlers.

use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tenancy_common::{TenancyConfig, TenantKey};
use tenancy_coord::{
    FailurePolicy, MigrationRunner, ParallelDispatcher, PoolReplenisher, TenantDirectory,
    TenantFilter,
};
use tracing::{error, warn};

use crate::engine::CommandEngine;
use crate::process::ProcessChunkRunner;
use crate::store::{FileDirectory, StoreContext};

/// Resolved global options shared by every command.
pub struct Workspace {
    pub root: PathBuf,
    pub config: TenancyConfig,
    /// Global flags forwarded to worker processes.
    pub child_args: Vec<OsString>,
}

#[derive(Args, Debug)]
pub struct PendingArgs {
    /// The number of tenants to keep in a pending state
    #[arg(long, allow_negative_numbers = true)]
    pub count: Option<i64>,
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Tenant keys to migrate (default: all)
    #[arg(long, value_delimiter = ',')]
    pub tenants: Vec<String>,

    /// One exact tenant key, never split; used to hand a chunk to a worker
    #[arg(long = "tenant", hide = true)]
    pub tenant: Vec<String>,

    /// Include pending tenants
    #[arg(long)]
    pub with_pending: bool,

    /// Number of worker processes (1 runs sequentially)
    #[arg(short, long)]
    pub processes: Option<usize>,

    /// Continue execution if migration fails for a tenant
    #[arg(long)]
    pub skip_failing: bool,

    /// Run even when the workspace is marked as production
    #[arg(long)]
    pub force: bool,
}

impl MigrateArgs {
    /// Explicitly selected keys, or `None` to select every tenant.
    pub fn selected_keys(&self) -> Option<Vec<TenantKey>> {
        let keys: Vec<TenantKey> = self
            .tenants
            .iter()
            .chain(&self.tenant)
            .map(TenantKey::new)
            .collect();
        (!keys.is_empty()).then_some(keys)
    }
}

/// Deploy tenants until the pending count is achieved.
pub fn pending(ws: &Workspace, args: &PendingArgs) -> Result<bool> {
    let target = args
        .count
        .unwrap_or_else(|| i64::try_from(ws.config.pending.count).unwrap_or(i64::MAX));
    let directory = FileDirectory::open(&ws.root)
        .with_context(|| format!("cannot open workspace '{}'", ws.root.display()))?;
    PoolReplenisher::new(&directory)
        .replenish(target)
        .context("pending pool replenishment failed")?;
    Ok(true)
}

/// Run migrations for the selected tenants.
pub fn migrate(ws: &Workspace, args: &MigrateArgs) -> Result<bool> {
    let migration = &ws.config.migration;
    if migration.production && !args.force {
        warn!("workspace is marked as production; pass --force to migrate");
        return Ok(false);
    }

    let processes = args.processes.unwrap_or(migration.processes).max(1);
    let policy = FailurePolicy::from_skip_failing(args.skip_failing || migration.skip_failing);

    let directory = FileDirectory::open(&ws.root)
        .with_context(|| format!("cannot open workspace '{}'", ws.root.display()))?;
    let context = Arc::new(StoreContext::new(directory.stores_dir()));
    let engine = CommandEngine::new(&migration.command, Arc::clone(&context))?;

    let filter = TenantFilter {
        keys: args.selected_keys(),
        with_pending: args.with_pending || ws.config.pending.include_in_queries,
    };
    let tenants = directory
        .tenants(&filter)
        .context("cannot list tenants")?;

    if processes > 1 {
        let runner = ProcessChunkRunner::current(
            ws.child_args.clone(),
            policy == FailurePolicy::Isolate,
        )?;
        let report = ParallelDispatcher::new(runner).run_parallel(&tenants, processes);
        return Ok(report.is_success());
    }

    let runner = MigrationRunner::new(context, Arc::new(engine));
    match runner.run(&tenants, policy) {
        Ok(result) => Ok(result.is_success()),
        Err(aborted) => {
            error!("{aborted}");
            Ok(false)
        }
    }
}
