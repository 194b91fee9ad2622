//! tenancy: pending pool replenishment and per-tenant migrations.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tenancy_common::TenancyConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod engine;
mod process;
mod store;

use commands::{MigrateArgs, PendingArgs, Workspace};

const DEFAULT_CONFIG: &str = "tenancy.toml";

/// tenancy - multi-tenant pool and migration orchestration
#[derive(Parser, Debug)]
#[command(name = "tenancy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Workspace directory holding tenants.json and stores/
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Path to configuration file [default: <root>/tenancy.toml if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy tenants until the pending count is achieved
    Pending(PendingArgs),

    /// Run migrations for tenant(s)
    Migrate(MigrateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let ws = workspace(cli)?;
    match &cli.command {
        Commands::Pending(args) => commands::pending(&ws, args),
        Commands::Migrate(args) => commands::migrate(&ws, args),
    }
}

fn workspace(cli: &Cli) -> Result<Workspace> {
    let config_path = cli.config.clone().or_else(|| {
        let default = cli.root.join(DEFAULT_CONFIG);
        default.is_file().then_some(default)
    });
    let config = match &config_path {
        Some(path) => TenancyConfig::from_file(path)
            .with_context(|| format!("cannot load configuration '{}'", path.display()))?,
        None => TenancyConfig::default(),
    };

    let mut child_args: Vec<OsString> = vec![
        "--root".into(),
        cli.root.clone().into(),
        "--log-level".into(),
        cli.log_level.clone().into(),
    ];
    if let Some(path) = config_path {
        child_args.push("--config".into());
        child_args.push(path.into());
    }

    Ok(Workspace {
        root: cli.root.clone(),
        config,
        child_args,
    })
}
