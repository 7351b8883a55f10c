//! Binary entrypoint for the photobooth.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use photobooth::clock::SystemClock;
use photobooth::display::{Display, KioskDisplay};
use photobooth::events::Event;
use photobooth::{Configuration, Photobooth, camera, gpio, printer, remote};
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "photobooth", about = "Raspberry Pi photobooth")]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Run in a window instead of fullscreen
    #[arg(long)]
    windowed: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("photobooth={level}").parse()?)
        .add_directive(format!("btmon={level}").parse()?)
        .add_directive("winit=warn".parse()?);
    fmt().with_env_filter(filter).with_target(true).init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if cli.windowed {
        cfg.display.fullscreen = false;
    }
    let cfg = cfg.validated().context("validating configuration")?;

    let display = KioskDisplay::new(&cfg.display)?;
    let sender = display.event_sender();
    {
        let sender = sender.clone();
        ctrlc::set_handler(move || sender.trigger(Event::Shutdown))
            .context("failed to install signal handler")?;
    }
    let remotes = remote::spawn_remotes(&cfg.bluetooth, &sender)?;

    let camera = camera::from_config(&cfg);
    let gpio = gpio::from_config(&cfg.gpio);
    let printer = printer::from_config(&cfg.printer);
    let mut booth = Photobooth::new(
        cfg,
        Box::new(display),
        camera,
        gpio,
        printer,
        Box::new(SystemClock),
    )?;
    info!("photobooth ready");

    let result = booth.run();
    if let Err(err) = &result {
        error!(error = %format!("{err:#}"), "photobooth stopped on error");
        booth.show_failure(err);
    }
    for monitor in &remotes {
        monitor.stop();
    }
    booth.teardown();
    result
}
