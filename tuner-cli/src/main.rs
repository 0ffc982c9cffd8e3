//! # Tuner - terminal front-end
//!
//! Drives a [`TunerEngine`] from the terminal and prints a live meter.
//!
//! ## Architecture
//! - **Main Thread**: 20 ms tick loop polling results and events
//! - **Capture Thread**: owned by the engine
//! - **Input Thread**: reads command lines from stdin
//! - **Communication**: Crossbeam channels between all of them

mod meter;
mod settings;

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, select};
use tuner_core::audio;
use tuner_core::display::TunerDisplay;
use tuner_core::synthetic::SignalSource;
use tuner_core::tuning::Notation;
use tuner_core::{EngineEvent, TunerEngine};

use settings::Cli;

/// How often the display polls the engine.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Keyboard commands, one per input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    ToggleCapture,
    ToggleNotation,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "" | "s" => Some(Command::ToggleCapture),
            "n" => Some(Command::ToggleNotation),
            "q" | "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_devices {
        let devices = audio::list_input_devices().context("failed to list input devices")?;
        if devices.is_empty() {
            println!("No input devices found");
        }
        for name in devices {
            println!("{name}");
        }
        return Ok(());
    }

    let config = cli.tuner_config()?;
    let mut engine = match cli.simulate {
        Some(frequency) => {
            log::info!("Simulating a {frequency} Hz sine");
            TunerEngine::with_source(config.clone(), SignalSource::sine(frequency))?
        }
        None => TunerEngine::new(config.clone())?,
    };
    let notation = if cli.latin { Notation::Latin } else { Notation::Anglo };
    let mut display = TunerDisplay::new(&config).with_notation(notation);

    let commands = spawn_input_reader()?;
    let no_input = crossbeam_channel::never();
    let mut input_open = true;
    engine.start().context("failed to start audio capture")?;
    println!("Enter: start/stop   n: note names   q: quit");

    let deadline = cli.duration.map(|secs| Instant::now() + Duration::from_secs_f64(secs));
    let ticker = crossbeam_channel::tick(POLL_INTERVAL);

    loop {
        let input = if input_open { &commands } else { &no_input };
        select! {
            recv(input) -> command => match command {
                Ok(Command::ToggleCapture) => {
                    if engine.is_running() {
                        engine.stop();
                        display.clear();
                    } else if let Err(e) = engine.start() {
                        log::error!("Could not start capture: {e}");
                    }
                }
                Ok(Command::ToggleNotation) => display.toggle_notation(),
                Ok(Command::Quit) => break,
                // stdin closed; keep running until the deadline or Ctrl-C
                Err(_) => input_open = false,
            },
            recv(ticker) -> _ => {
                while let Some(event) = engine.poll_event() {
                    report(&event, &mut display);
                }

                let mut updated = false;
                while let Some(result) = engine.poll() {
                    display.update(&result);
                    updated = true;
                }
                if updated {
                    print!("\r{}", meter::render(&display));
                    io::stdout().flush().context("failed to write to stdout")?;
                }

                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
            }
        }
    }

    engine.stop();
    println!();
    let stats = engine.stats();
    log::info!(
        "Analysed {} block(s), dropped {} result(s), {} overrun(s)",
        stats.blocks_analyzed,
        stats.results_dropped,
        stats.overruns
    );
    Ok(())
}

fn report(event: &EngineEvent, display: &mut TunerDisplay) {
    match event {
        EngineEvent::Started { device, .. } => log::debug!("listening on {device}"),
        EngineEvent::Fault { message } => {
            display.clear();
            println!();
            log::error!("Capture stopped: {message}. Press Enter to retry.");
        }
        EngineEvent::Stopped { blocks_analyzed } => {
            log::debug!("capture stopped after {blocks_analyzed} block(s)")
        }
    }
}

fn spawn_input_reader() -> Result<Receiver<Command>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("tuner-input".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match Command::parse(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None => log::warn!("Unknown command {:?}", line.trim()),
                }
            }
        })
        .context("failed to spawn input thread")?;
    Ok(rx)
}
