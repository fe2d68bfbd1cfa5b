//! Ratchet updater CLI
//!
//! Thin glue around the update engine: argument parsing, logging setup,
//! ctrl-c cancellation, and result formatting. All protocol logic lives
//! in the `common` crate.

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::op::{Op, OpContext};

mod op;
mod ops;

/// Ratchet - authenticated updates for git repository trees
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print a machine-readable JSON result on stdout
    #[arg(long)]
    format_output: bool,

    #[command(subcommand)]
    command: ops::Command,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();

    // Set up ctrl-c cancellation; sessions stop at their next safe
    // checkpoint and leave local state untouched
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received ctrl-c, cancelling session");
            let _ = cancel_tx.send(true);
        }
    });

    let ctx = OpContext { cancel: cancel_rx };
    match args.command.execute(&ctx).await {
        Ok(output) => {
            if args.format_output {
                println!(
                    "{}",
                    serde_json::json!({ "updateSuccessful": true })
                );
            } else {
                println!("{}", output);
            }
        }
        Err(e) => {
            if args.format_output {
                println!(
                    "{}",
                    serde_json::json!({
                        "updateSuccessful": false,
                        "error": e.to_string(),
                    })
                );
            } else {
                tracing::error!("{}", e);
                eprintln!("Error: {}", e);
            }
            std::process::exit(1);
        }
    }
}
