//! Audio console
//!
//! Reads protocol lines (`preloadFX`, `preloadAudio`, `play`, `loop`, `stop`,
//! `unload`) from standard input and prints one status line per request.

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use lowlatency_audio::foundation::logging;
use lowlatency_audio::prelude::*;
use std::io::{self, BufRead, Write};

fn main() -> Result<()> {
    let matches = Command::new("audio_console")
        .about("Drives the low-latency audio engine with text commands read from stdin")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Audio configuration file (.toml or .ron)"),
        )
        .arg(
            Arg::new("simulated")
                .long("simulated")
                .help("Use the simulated device instead of the real output")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    logging::init();

    let config = match matches.get_one::<String>("config") {
        Some(path) => AudioConfig::load_from_file(path)
            .with_context(|| format!("Failed to load audio config from {path}"))?,
        None => AudioConfig::default(),
    };

    if matches.get_flag("simulated") {
        log::info!("Using simulated audio device");
        run(SimulatedBackend::new(), config)
    } else {
        run(RodioBackend::new(), config)
    }
}

fn run<B: AudioBackend + 'static>(backend: B, config: AudioConfig) -> Result<()> {
    let mut engine = AudioEngine::new(backend, config).context("Failed to start audio engine")?;

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read command")?;
        if line.trim().is_empty() {
            continue;
        }
        writeln!(stdout, "{}", engine.execute(&line))?;
        stdout.flush()?;
    }

    engine.shutdown();
    Ok(())
}
