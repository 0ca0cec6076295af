//! Bartender operations CLI.
//!
//! Provisions the bartender serverless backend on Yandex Cloud, wires the
//! services to each other and audits the running stack.

// Allow product names without backticks in doc comments
#![allow(clippy::doc_markdown)]

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use barops::commands::audit::AuditCommand;
use barops::commands::deploy::DeployCommand;
use barops::commands::monitor::MonitorCommand;
use barops::commands::stop::StopCommand;
use barops::{exit_code_for, ui};

/// barops - bartender serverless backend operations.
#[derive(Parser)]
#[command(
    name = "barops",
    version,
    about = "Deploy, wire and audit the bartender serverless backend",
    long_about = "Deploy, wire and audit the bartender serverless backend.\n\n\
                  Builds every service image, deploys it as a serverless container,\n\
                  injects peer URLs into each service and checks the result.\n\n\
                  All operations are idempotent - re-running a failed deploy\n\
                  converges without creating duplicates."
)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision or update the full stack.
    ///
    /// Builds and pushes images, deploys revisions in dependency order and
    /// redeploys services whose peers were not yet known.
    Deploy(DeployCommand),

    /// Run liveness and functional checks.
    Audit(AuditCommand),

    /// Show liveness and resource usage, optionally follow logs.
    Monitor(MonitorCommand),

    /// Stop locally running service containers.
    Stop(StopCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("info,barops=debug,barops_cloud=debug")
        } else {
            EnvFilter::new("warn,barops=info,barops_cloud=info")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Deploy(cmd) => cmd.run().await,
        Commands::Audit(cmd) => cmd.run().await,
        Commands::Monitor(cmd) => cmd.run().await,
        Commands::Stop(cmd) => cmd.run().await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::print_error(&format!("{e:#}"));
            ExitCode::from(exit_code_for(&e))
        }
    }
}
