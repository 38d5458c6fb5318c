//! roverd - network control daemon for the uc0 rover kernel driver
//!
//! Bridges the rover device to a single TCP client: wheel commands in,
//! state/distance responses out, plus a periodic UDP availability
//! broadcast. Unrecoverable internal errors terminate the whole process
//! (a supervisor restarts it); only external network faults are tolerated.

use roverd::config::Config;
use roverd::error::Result;
use roverd::server::Server;
use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Command-line options.
///
/// Supports:
/// - `roverd --config <path>` / `roverd -c <path>`
/// - `roverd --daemon` / `roverd -d`
/// - `roverd --help` / `roverd -h`
struct CliOptions {
    config_path: String,
    daemonize: bool,
}

const DEFAULT_CONFIG_PATH: &str = "/etc/roverd.toml";

fn print_usage() {
    println!(
        "Usage: roverd [options]\n\
         \x20  -c, --config <path>  Configuration file (default {DEFAULT_CONFIG_PATH})\n\
         \x20  -d, --daemon         Detach and run in the background\n\
         \x20  -h, --help           Print this message"
    );
}

fn parse_cli() -> CliOptions {
    let args: Vec<String> = env::args().collect();
    let mut options = CliOptions {
        config_path: DEFAULT_CONFIG_PATH.to_string(),
        daemonize: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" if i + 1 < args.len() => {
                options.config_path = args[i + 1].clone();
                i += 1;
            }
            "--daemon" | "-d" => options.daemonize = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown option: {other}");
                print_usage();
                std::process::exit(2);
            }
        }
        i += 1;
    }

    options
}

/// Detach from the controlling terminal.
fn daemonize() -> Result<()> {
    daemonize::Daemonize::new()
        .working_directory("/")
        .start()
        .map_err(|e| roverd::Error::Other(format!("failed to daemonize: {e}")))
}

fn main() -> Result<()> {
    let options = parse_cli();

    // Load configuration before detaching so errors still reach the terminal.
    let config = match Config::load(&options.config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "roverd: cannot load config {}: {e}, using defaults",
                options.config_path
            );
            Config::rover_defaults()
        }
    };

    if options.daemonize {
        daemonize()?;
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.clone()),
    )
    .init();

    // Worker threads classify their own errors; a panic is by definition
    // unclassified and therefore fatal for the whole process.
    std::panic::set_hook(Box::new(|info| {
        log::error!("unexpected panic: {info}");
        if signal_hook::low_level::raise(SIGTERM).is_err() {
            std::process::exit(1);
        }
    }));

    log::info!("roverd v{} starting", env!("CARGO_PKG_VERSION"));
    log::info!(
        "device: {} ({}), tcp: {}, broadcast: {}",
        config.device.kind,
        config.device.dev_path,
        config.network.bind_address,
        config.network.broadcast_address
    );

    // Shutdown flag, flipped by signals - including the SIGTERM a worker
    // thread raises on itself for a fatal internal error.
    let running = Arc::new(AtomicBool::new(true));
    let signal_running = Arc::clone(&running);
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP, SIGQUIT])?;
    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                log::info!("caught terminating signal {sig}, shutting down");
                signal_running.store(false, Ordering::Relaxed);
            }
        })?;

    let mut server = match Server::start(&config) {
        Ok(server) => server,
        Err(e) => {
            log::error!("startup failed: {e}");
            return Err(e);
        }
    };

    log::info!("roverd running");
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    server.stop();
    log::info!("roverd stopped");
    Ok(())
}
