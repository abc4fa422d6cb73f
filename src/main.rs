//! CLI entry point for the litgate gateway.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use litgate_core::{Gateway, GatewayConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

mod app;
mod cli;
mod commands;

use app::terminal::{self, TerminalPolicy};
use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let policy = TerminalPolicy::detect(args.no_color, args.quiet);
    terminal::init_tracing(terminal::default_level(args.quiet, args.verbose), policy);
    debug!(?args, "CLI arguments parsed");

    let config = effective_config(&args)?;
    let gateway = Gateway::from_config(config).context("failed to initialize gateway")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; cancelling");
            on_signal.cancel();
        }
    });

    let success = commands::run_command(&gateway, &args, policy, &cancel).await?;
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Environment first, then explicit flags on top.
fn effective_config(args: &Args) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::from_env().context("invalid environment configuration")?;
    if let Some(dir) = &args.cache_dir {
        config.cache_dir.clone_from(dir);
    }
    if let Some(dir) = &args.download_dir {
        config.download_dir = Some(dir.clone());
    }
    if let Some(mode) = args.abstract_mode {
        config.abstract_mode = mode;
    }
    if let Some(mode) = args.fulltext_mode {
        config.fulltext_mode = mode;
    }
    if args.export {
        config.export_enabled = true;
    }
    Ok(config)
}
