//! printlink - command-line front end for one networked 3D printer.
//!
//! Reads the printer config (YAML, environment, keyring), connects over MQTT
//! and either prints status, watches it, or runs a named command.

mod commands;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use printlink_core::{Printer, Reading, StatusReader};
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::CommandRegistry;

#[derive(Parser)]
#[command(name = "printlink")]
#[command(about = "LAN control of a networked 3D printer", version)]
struct Cli {
    /// Printer config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to wait for the first status report
    #[arg(long, default_value_t = 15)]
    ready_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every status field as JSON
    Status,
    /// Print a one-line summary periodically
    Watch {
        /// Seconds between summaries
        #[arg(short, long, default_value_t = 5)]
        interval: u64,
    },
    /// Run a named printer command
    Run {
        name: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List the named printer commands
    Commands,
    /// Keep the access code for a printer in the OS keyring
    StoreAccessCode { serial: String, access_code: String },
    /// Remove a stored access code
    ForgetAccessCode { serial: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("printlink=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = CommandRegistry::with_defaults();

    match cli.command {
        Command::Commands => {
            for entry in registry.list() {
                println!("{:<20} {:<36} {}", entry.name, entry.usage, entry.description);
            }
            Ok(())
        }
        Command::StoreAccessCode { serial, access_code } => {
            config::store_access_code(&serial, &access_code)
        }
        Command::ForgetAccessCode { serial } => config::delete_access_code(&serial),
        Command::Status => {
            let printer = connect(&cli.config, cli.ready_timeout).await?;
            let result = print_status(printer.status()).await;
            printer.disconnect().await?;
            result
        }
        Command::Watch { interval } => {
            let printer = connect(&cli.config, cli.ready_timeout).await?;
            let result = watch(&printer, Duration::from_secs(interval.max(1))).await;
            printer.disconnect().await?;
            result
        }
        Command::Run { name, args } => {
            if registry.get(&name).is_none() {
                bail!("unknown command '{name}', see `printlink commands`");
            }
            let printer = connect(&cli.config, cli.ready_timeout).await?;
            let outcome = registry.run(&printer, &name, &args).await;
            printer.disconnect().await?;

            let outcome = outcome?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                bail!("{name} failed");
            }
            Ok(())
        }
    }
}

async fn connect(path: &Option<PathBuf>, ready_timeout: u64) -> Result<Printer> {
    let config = config::load(path.as_deref()).await?;
    let printer = Printer::new(config).context("failed to create printer client")?;
    printer.connect().context("failed to start the MQTT link")?;

    if !printer
        .wait_until_ready(Duration::from_secs(ready_timeout))
        .await
    {
        let link = printer.link();
        printer.disconnect().await.ok();
        bail!(
            "printer not ready after {ready_timeout}s (link {:?}, {} reconnects)",
            link.status,
            link.reconnects
        );
    }
    info!("printer ready");
    Ok(printer)
}

async fn print_status(status: &StatusReader) -> Result<()> {
    let export = status.export().await.context("failed to read status")?;
    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}

fn percent(reading: Reading<i64>) -> String {
    match reading {
        Reading::Value(v) => format!("{v}%"),
        Reading::Unknown => "?%".into(),
        Reading::Absent => "-".into(),
    }
}

async fn summary(status: &StatusReader) -> Result<String> {
    Ok(format!(
        "{:<8} {:<28} {:>5} layer {}/{} bed {:.1}/{:.0} nozzle {:.1}/{:.0} light {}",
        status.gcode_state().await?.name(),
        status.print_stage().await?.label(),
        percent(status.print_percentage().await?),
        status.current_layer().await?,
        status.total_layers().await?,
        status.bed_temperature().await?,
        status.bed_target_temperature().await?,
        status.nozzle_temperature().await?,
        status.nozzle_target_temperature().await?,
        status.light_state().await?,
    ))
}

async fn watch(printer: &Printer, every: Duration) -> Result<()> {
    let mut tick = interval(every);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if !printer.is_connected() {
                    warn!("link down, waiting for reconnect");
                    continue;
                }
                match summary(printer.status()).await {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("status read failed: {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopping watch");
                return Ok(());
            }
        }
    }
}
