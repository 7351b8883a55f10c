use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use btmon::{ListenCommand, MonitorOptions, Peripheral};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "btmon",
    about = "Report Bluetooth LE button notifications as channel numbers"
)]
struct Args {
    /// Peripheral address. Repeat for more peripherals; channels count from 1.
    #[arg(long = "device", value_name = "ADDRESS", required = true)]
    devices: Vec<String>,

    /// Listener program (gatttool compatible).
    #[arg(long, default_value = "gatttool")]
    program: PathBuf,

    /// Delay before a stopped listener is started again.
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    restart_delay: Duration,

    /// Logging level (error|warn|info|debug|trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let options = MonitorOptions {
        command: ListenCommand::gatttool(args.program.clone()),
        restart_delay: args.restart_delay,
        ..MonitorOptions::default()
    };

    let mut handles = Vec::with_capacity(args.devices.len());
    for (index, address) in args.devices.iter().enumerate() {
        let peripheral = Peripheral {
            address: address.clone(),
            channel: index as u32 + 1,
        };
        let handle = btmon::spawn(peripheral, options.clone(), |channel| {
            println!("{channel}");
        })
        .with_context(|| format!("failed to start monitor for {address}"))?;
        handles.push(handle);
    }
    info!(count = handles.len(), "monitoring peripherals");

    for handle in handles {
        let channel = handle.channel();
        if handle.join().is_err() {
            error!(channel, "monitor thread panicked");
        }
    }
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::builder()
        .parse(level)
        .with_context(|| format!("invalid log level '{level}'"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
