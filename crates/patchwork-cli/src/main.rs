//! `patchwork` command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use patchwork_cli::{apply_batch, bootstrap_flow, load_config, pattern_lines, read_json, render_json};
use patchwork_core::Operation;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "patchwork", version, about = "Path-addressed edits for resource documents")]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON on one line
    #[arg(long, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply an operation batch to a resource and print the outcome
    Apply {
        /// Resource document (JSON)
        #[arg(long)]
        resource: PathBuf,
        /// Operation list (JSON array)
        #[arg(long)]
        ops: PathBuf,
    },
    /// List registered path patterns
    Patterns,
    /// Give a flow document a start node and print the cached flow
    Bootstrap {
        /// Flow document (JSON)
        #[arg(long)]
        flow: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Apply { resource, ops } => {
            let resource = read_json(&resource)?;
            let operations: Vec<Operation> = serde_json::from_value(read_json(&ops)?)
                .with_context(|| format!("{} is not an operation list", ops.display()))?;

            let outcome = apply_batch(config, &resource, &operations).await?;
            println!("{}", render_json(&serde_json::to_value(&outcome)?, cli.compact)?);
            Ok(if outcome.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Patterns => {
            for line in pattern_lines(config)? {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Bootstrap { flow } => {
            let cached = bootstrap_flow(&config, read_json(&flow)?)
                .await
                .with_context(|| format!("bootstrapping {}", flow.display()))?;
            println!("{}", render_json(&cached, cli.compact)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}
