use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

mod cli;
mod core;
mod daemon;
mod providers;
mod ui;

use crate::core::activity;
use crate::core::settings::Settings;

#[derive(Parser)]
#[command(name = "balance-monitor")]
#[command(author, version, about = "Watch account balances and node audit status")]
struct Cli {
    /// Path to the config file (default: <config dir>/balance-monitor/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the tracked addresses until interrupted
    Daemon,

    /// Fetch every tracked address once and print the result
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the addresses loaded from the address file
    Addresses {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Stderr output follows `RUST_LOG`. Activity lines also go to
/// `activity_file` regardless of the level filter.
fn init_logging(debug: bool, activity_file: Option<&Path>) -> Result<()> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let activity_layer = activity_file
        .map(activity::file_layer::<Registry>)
        .transpose()?;

    tracing_subscriber::registry()
        .with(activity_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter),
        )
        .init();

    if let Some(path) = activity_file {
        tracing::info!(?path, "Writing activity log");
    }
    Ok(())
}

fn load_settings(path: Option<&Path>, with_activity_file: bool) -> Result<Settings> {
    let settings = Settings::load(path)?;
    let activity_file = settings.log.file_path().filter(|_| with_activity_file);
    init_logging(settings.debug, activity_file)?;
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon => {
            let settings = load_settings(cli.config.as_deref(), true)?;
            daemon::run(settings).await
        }
        Commands::Status { json } => {
            let settings = load_settings(cli.config.as_deref(), false)?;
            cli::status::run(&settings, json).await
        }
        Commands::Addresses { json } => {
            let settings = load_settings(cli.config.as_deref(), false)?;
            cli::addresses::run(&settings, json).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
