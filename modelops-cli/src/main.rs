//! modelops CLI: one subcommand per step of the regression workflow.
//!
//! Exit codes: 0 success, 1 gate below threshold, 2 bad input, failed data
//! contract or any fatal error.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Train, gate, register, promote and load small regression models
#[derive(Parser, Debug)]
#[command(name = "modelops", version, about, long_about = None)]
struct Cli {
    /// Workspace directory; relative paths resolve against it
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Tracking server URI (overrides config and MLFLOW_TRACKING_URI)
    #[arg(long, global = true)]
    tracking_uri: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train the model described by params.yaml and write metrics
    Train {
        /// Training parameters file
        #[arg(long)]
        params: Option<PathBuf>,
        /// Dataset CSV
        #[arg(long)]
        data: Option<PathBuf>,
        /// Output model artifact
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Train Linear, Ridge and Lasso, log each run and register each version
    TrainRegister {
        /// Dataset CSV
        #[arg(long)]
        data: Option<PathBuf>,
        /// Directory for the local <Name>.json model copies
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Fail the pipeline when R2 in metrics.txt is below the threshold
    Gate {
        /// Metrics text file
        #[arg(long)]
        metrics: Option<PathBuf>,
        /// File holding the minimum R2
        #[arg(long)]
        threshold: Option<PathBuf>,
    },
    /// Check the dataset has numeric feature/target columns and enough rows
    CheckData {
        /// Dataset CSV
        #[arg(long)]
        data: Option<PathBuf>,
        /// Minimum number of rows
        #[arg(long)]
        min_rows: Option<usize>,
    },
    /// Promote the best run's registered version via alias (or stage)
    Promote {
        /// Run metric to rank by
        #[arg(long)]
        metric: Option<String>,
        /// Alias to point at the best version
        #[arg(long)]
        alias: Option<String>,
        /// Fall back to a legacy stage transition when aliases are unsupported
        #[arg(long)]
        allow_stage_fallback: bool,
    },
    /// Load the model by alias (falling back to stage) and predict
    Predict {
        /// Feature values to predict for
        #[arg(long = "input", num_args = 1.., default_values_t = [5.0, 10.0])]
        inputs: Vec<f64>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default .modelops/config.toml into the workspace
    Init,
}

fn init_tracing(verbose: u8, quiet: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    // JSON file layer for structured logging; skipped if the log dir is unusable
    let log_dir = modelops_core::config::project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from(".modelops").join("logs"));
    let appender = std::fs::create_dir_all(&log_dir).ok().and_then(|_| {
        tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("modelops")
            .filename_suffix("log")
            .build(&log_dir)
            .ok()
    });

    match appender {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(json_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry().with(stderr_layer).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());
    let context = commands::Context {
        workspace,
        config_file: cli.config,
        tracking_uri: cli.tracking_uri,
    };

    match commands::handle_command(cli.command, &context).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("[FATAL] {e:#}");
            ExitCode::from(2)
        }
    }
}
