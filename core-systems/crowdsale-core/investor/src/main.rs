//! crowdsale-investor
//!
//! - `validate`: check a tier plan and print the deployment report
//! - `status`: where the configured sale stands
//! - `invest`: buy tokens from the open tier; Ctrl-C cancels the attempt

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crowdsale_investor::{
    cmd::{self, Session},
    config,
    telemetry::{self, LoggingConfig},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "crowdsale-investor", author, version, about = "Tiered crowdsale operator")]
struct Cli {
    /// Config file (TOML/YAML/JSON); auto-discovered when omitted
    #[arg(short, long, value_name = "FILE", env = "CROWDSALE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter override (example: info,crowdsale_launchpad=debug)
    #[arg(long)]
    log_filter: Option<String>,

    /// JSON logs
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a tier plan and print the deployment report
    Validate {
        /// Tier plan; defaults to `sale.tiers_file`
        #[arg(long, value_name = "FILE")]
        tiers: Option<PathBuf>,
    },
    /// Show the active tier, finalization and next tier boundary
    Status,
    /// Buy tokens from the currently open tier
    Invest {
        /// Token amount, decimal
        #[arg(long, value_name = "AMOUNT")]
        tokens: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load(cli.config.as_deref()).context("load config")?;
    if cli.log_filter.is_some() {
        cfg.telemetry.log_filter = cli.log_filter.clone();
    }
    cfg.telemetry.json |= cli.json_logs;
    let _logging = telemetry::init(LoggingConfig::from(&cfg.telemetry))?;
    info!(?cfg, "config loaded");

    let tiers_file = cfg.sale.tiers_file.clone();
    let session = Session::connect(cfg).await?;

    match cli.command {
        Command::Validate { tiers } => {
            let path = tiers.or(tiers_file).ok_or_else(|| anyhow!("no tier plan: pass --tiers or set sale.tiers_file"))?;
            let report = cmd::validate(&session, &path).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_deployable() {
                bail!("deployment blocked");
            }
        }
        Command::Status => {
            let status = cmd::status(&session).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Invest { tokens } => {
            let cancel = CancellationToken::new();
            let watcher = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, cancelling investment");
                        cancel.cancel();
                    }
                })
            };
            let outcome = cmd::invest(&session, &tokens, &cancel).await;
            watcher.abort();

            let receipt = outcome?;
            println!(
                "purchased {} tokens from tier {} in {:#x} (block {})",
                receipt.tokens(),
                receipt.intent.tier.tier_index + 1,
                receipt.tx_hash,
                receipt.block_number.map(|b| b.to_string()).unwrap_or_else(|| "pending".into()),
            );
        }
    }
    Ok(())
}
