mod cli;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs::File;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing_subscriber::EnvFilter;

use cli::*;
use vacuumlink_core::datalog::{format_event, PressureLog};
use vacuumlink_core::demo::GaugeSimulator;
use vacuumlink_core::engine::{Engine, EngineHandle, EngineState, GaugeEvent, RunSummary};
use vacuumlink_core::protocol::list_ports;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::List => list_serial(),
        Commands::Run(conf) => run_serial(conf).await,
        Commands::Demo(conf) => run_demo(conf).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn list_serial() -> Result<()> {
    let ports = list_ports();
    if ports.is_empty() {
        println!("No connected serial ports found.");
        return Ok(());
    }
    println!("Connected serial ports:");
    for port in ports {
        match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => println!(
                "{}  [{:04x}:{:04x}] {}",
                port.name,
                vid,
                pid,
                port.product.unwrap_or_default()
            ),
            _ => println!("{}", port.name),
        }
    }
    Ok(())
}

async fn run_serial(conf: RunCommand) -> Result<()> {
    // Bad settings are reported before the port is touched
    let config = conf.polling.engine_config()?;
    let engine = Engine::new(config)?;
    let events = engine.subscribe();
    let log = open_log(&conf.output)?;

    tracing::info!(port = %conf.port, mode = %engine.config().mode, "starting acquisition");
    let handle = engine
        .spawn_serial(&conf.port)
        .context("could not start polling thread")?;
    let summary = acquire(handle, events, log).await?;
    report(&summary);
    Ok(())
}

async fn run_demo(conf: DemoCommand) -> Result<()> {
    let config = conf.polling.engine_config()?;
    let engine = Engine::new(config)?;
    let events = engine.subscribe();
    let log = open_log(&conf.output)?;

    tracing::info!(mode = %engine.config().mode, "starting simulated acquisition");
    let simulator = GaugeSimulator::new()
        .with_glitch_rate(conf.glitch_rate)
        .with_read_timeout(engine.config().read_timeout());
    let handle = engine
        .spawn(simulator)
        .context("could not start polling thread")?;
    let summary = acquire(handle, events, log).await?;
    report(&summary);
    Ok(())
}

fn open_log(conf: &LogConf) -> Result<PressureLog<File>> {
    PressureLog::append(&conf.log)
        .with_context(|| format!("could not open log file {}", conf.log.display()))
}

/// Print and log events until the engine stops, stopping it on Ctrl-C
async fn acquire(
    handle: EngineHandle,
    mut events: broadcast::Receiver<GaugeEvent>,
    mut log: PressureLog<File>,
) -> Result<RunSummary> {
    let mut state = handle.watch_state();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                tracing::info!("interrupted, stopping");
                interrupted = true;
                handle.stop();
            }
            event = events.recv() => match event {
                Ok(event) => consume(&event, &mut log)?,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "console fell behind, events dropped")
                }
                Err(RecvError::Closed) => break,
            },
            _ = state.wait_for(|s| *s == EngineState::Stopped) => break,
        }
    }

    // Whatever was published before the engine stopped
    loop {
        match events.try_recv() {
            Ok(event) => consume(&event, &mut log)?,
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }

    let summary = tokio::task::spawn_blocking(move || handle.join())
        .await
        .context("polling thread lost")??;
    Ok(summary)
}

fn consume(event: &GaugeEvent, log: &mut PressureLog<File>) -> Result<()> {
    print!("{}", format_event(event, &Local::now()));
    log.record(event).context("could not write pressure log")?;
    Ok(())
}

fn report(summary: &RunSummary) {
    tracing::info!(
        samples = summary.samples,
        malformed = summary.malformed,
        timeouts = summary.timeouts,
        "acquisition finished"
    );
}
