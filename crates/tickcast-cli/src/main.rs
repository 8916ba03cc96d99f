mod display;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tickcast_core::{
    AddressTranslator, Config, GameRecorder, GameStateSampler, LayoutSchema, MemorySession,
    ProcessHandle, QmpChannel, Tracker,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::shutdown::ShutdownSignal;

#[derive(Parser)]
#[command(name = "tickcast")]
#[command(about = "Tick-level observer for emulated game state")]
struct Args {
    #[arg(short, long, default_value = "tickcast.json")]
    config: PathBuf,

    /// Memory layout overrides; built-in anchors are used when absent.
    #[arg(short, long, default_value = "layout.json")]
    layout: PathBuf,

    /// Override the monitor host from the config.
    #[arg(long)]
    host: Option<String>,

    /// Override the monitor port from the config.
    #[arg(long)]
    port: Option<u16>,

    /// Directory for per-game event logs; overrides the config.
    #[arg(long)]
    sessions: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tickcast=info".parse()?))
        .init();

    let args = Args::parse();
    info!("Tickcast {}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_or_default(&args.config);
    if let Some(host) = args.host {
        config.monitor.host = host;
    }
    if let Some(port) = args.port {
        config.monitor.port = port;
    }
    if let Some(dir) = args.sessions {
        config.sessions_dir = dir.display().to_string();
    }

    let schema = LayoutSchema::load_or_default(&args.layout)?;

    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    // Attach loop: wait for the emulator, track until it goes away, repeat.
    println!("Waiting for emulator... (Ctrl+C to quit)");
    while !shutdown.is_shutdown() {
        match ProcessHandle::find_and_open() {
            Ok(process) => {
                info!(
                    "Attached to {} (pid {})",
                    process.info.name, process.info.pid
                );
                if let Err(e) = run_tracker(process, &config, schema.clone(), &shutdown) {
                    error!("Tracker error: {}", e);
                }
                debug!("Detached, waiting for emulator...");
            }
            Err(_) => {
                // Not running yet, retry below.
            }
        }

        if shutdown.wait(Duration::from_secs(5)) {
            break;
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn run_tracker(
    process: ProcessHandle,
    config: &Config,
    schema: LayoutSchema,
    shutdown: &ShutdownSignal,
) -> Result<()> {
    let channel = QmpChannel::connect(&config.monitor)?;
    let translator = AddressTranslator::new(channel, &config.monitor);
    let session = MemorySession::new(process, translator, config.contiguous_ram);
    let mut tracker = Tracker::new(session, GameStateSampler::new(schema), config);

    let console_rx = tracker.subscribe("console");
    let console = thread::spawn(move || {
        for output in console_rx {
            display::print_tick(&output);
        }
    });

    let recorder = if config.sessions_dir.is_empty() {
        None
    } else {
        let rx = tracker.subscribe("recorder");
        let dir = PathBuf::from(&config.sessions_dir);
        Some(thread::spawn(move || {
            let mut recorder = match GameRecorder::new(&dir) {
                Ok(r) => r,
                Err(e) => {
                    error!("Cannot open sessions directory {}: {}", dir.display(), e);
                    return;
                }
            };
            for output in rx {
                if let Err(e) = recorder.record(&output) {
                    warn!("Failed to write game log: {}", e);
                }
            }
            if let Err(e) = recorder.close() {
                warn!("Failed to close game log: {}", e);
            }
        }))
    };

    let result = tracker.run(shutdown.as_atomic());

    // Dropping the tracker hangs up the hub; consumers drain and exit.
    drop(tracker);
    let _ = console.join();
    if let Some(handle) = recorder {
        let _ = handle.join();
    }

    result.map_err(Into::into)
}
