//! Cutwright - facet upgrade orchestrator
//!
//! Usage:
//!   cutwright --help

use clap::{Parser, Subcommand};
use cutwright::cli::{self, CliError};
use cutwright::cutwright_core::CutError;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cutwright")]
#[command(version)]
#[command(about = "Facet upgrade orchestrator for selector-routed proxies", long_about = None)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and apply an upgrade on a network
    Deploy {
        /// Network configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Network name inside the configuration file
        #[arg(short, long)]
        network: String,

        /// Simulate against an in-process chain; send nothing
        #[arg(long)]
        dry_run: bool,

        /// Reuse registry-recorded module deployments
        #[arg(long)]
        resume: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the selectors each module artifact exposes
    Selectors {
        /// Build artifact directory
        #[arg(short, long)]
        artifacts: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the address registry
    Registry {
        /// Registry database file
        #[arg(short, long)]
        path: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // Logs go to stderr so JSON output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn report_failure(err: &CliError) {
    error!(error = %err, "cutwright failed");

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        error!(cause = %cause);
        source = cause.source();
    }

    if let CliError::Cut(CutError::PostWiring { failed, proxy, .. }) = err {
        for outcome in failed {
            error!(
                %proxy,
                token = %outcome.approval.token_name,
                spender = %outcome.approval.spender_name,
                reason = outcome.error.as_deref().unwrap_or("unknown"),
                "approval not granted"
            );
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Deploy {
            config,
            network,
            dry_run,
            resume,
            json,
        } => cli::cmd_deploy(&config, &network, dry_run, resume, json).map(|_| ()),
        Commands::Selectors { artifacts, json } => cli::cmd_selectors(&artifacts, json).map(|_| ()),
        Commands::Registry { path, json } => cli::cmd_registry(&path, json).map(|_| ()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_failure(&err);
            ExitCode::from(err.exit_code())
        }
    }
}
