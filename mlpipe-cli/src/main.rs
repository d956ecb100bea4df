//! mlpipe CLI: run the training pipeline, or one stage of it.

mod commands;

use clap::Parser;
use mlpipe_core::ConfigPaths;
use mlpipe_ml::StageKind;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "running_logs.log";

/// Ingest, validate, split, train, and evaluate a regression model.
#[derive(Parser, Debug)]
#[command(name = "mlpipe", version, about, long_about = None)]
struct Cli {
    /// Pipeline configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Hyperparameter file
    #[arg(long, global = true)]
    params: Option<PathBuf>,

    /// Dataset schema file
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Subcommand (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn config_paths(&self) -> ConfigPaths {
        let defaults = ConfigPaths::default();
        ConfigPaths {
            config: self.config.clone().unwrap_or(defaults.config),
            params: self.params.clone().unwrap_or(defaults.params),
            schema: self.schema.clone().unwrap_or(defaults.schema),
        }
    }

    fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run every stage in order
    Run,
    /// Run a single stage against the artifacts earlier stages left on disk
    Stage {
        /// ingest, validate, transform, train, or evaluate
        name: StageKind,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the resolved configuration as YAML
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Human-readable layer for stderr
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(cli.log_filter()));

    // JSON file layer for the run log
    let _ = std::fs::create_dir_all(LOG_DIR);
    let file_appender = tracing_appender::rolling::never(LOG_DIR, LOG_FILE);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let paths = cli.config_paths();
    let command = cli.command.unwrap_or(Commands::Run);
    let result = commands::handle_command(command, &paths).await;
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "mlpipe failed");
    }
    result
}
