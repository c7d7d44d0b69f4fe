//! Kiln host
//!
//! Loads the game module, runs it at a fixed update rate, and swaps in a
//! fresh build whenever the module file changes or `r` is typed.
//!
//! Run with: cargo run -p kiln_runtime -- [kiln.toml]
//!       or: cargo run --bin kiln

mod config;
mod engine_api;
mod error;
mod host;
mod input;

use crate::config::KilnConfig;
use crate::error::Result;
use crate::host::Host;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    let config = match KilnConfig::load(std::env::args().nth(1).map(PathBuf::from)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("kiln: {}", e);
            std::process::exit(2);
        }
    };

    init_logging(config.host.debug);

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("PANIC: {}", panic_info);
    }));

    config.print_summary();

    if let Err(e) = run(&config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn run(config: &KilnConfig) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    // The reader thread is left blocked on stdin at exit
    let (commands, _reader) = input::spawn_stdin_reader()?;
    log::info!("{}", input::HELP);

    let mut host = Host::new(config, commands, running)?;
    host.run();

    let stats = host.stats();
    log::info!(
        "Stopped after {} updates, {} frames, {} reloads",
        stats.updates,
        stats.frames,
        host.coordinator().reload_count()
    );
    Ok(())
}
