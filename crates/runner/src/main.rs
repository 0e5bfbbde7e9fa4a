mod render;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use common::FeedConfig;
use connector_binance::{BinanceSnapshotProvider, BinanceTransport};
use connector_core::ConnectorConfig;
use feed_session::{FeedSession, SessionHandle};
use market_store::MarketStore;
use metrics::create_metrics;
use std::io::BufRead;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Minimum time between two renders.
const RENDER_INTERVAL: Duration = Duration::from_millis(250);

enum Command {
    Toggle,
    Connect,
    Disconnect,
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "t" | "toggle" => Some(Command::Toggle),
        "c" | "connect" => Some(Command::Connect),
        "d" | "disconnect" => Some(Command::Disconnect),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Stdin lines, read on a dedicated OS thread.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });
    rx
}

fn apply_command(handle: &SessionHandle, command: Command) -> bool {
    let control = match command {
        Command::Toggle => handle.toggle(),
        Command::Connect => handle.connect(),
        Command::Disconnect => handle.disconnect(),
        Command::Quit => return false,
    };
    info!(enabled = control.enabled, epoch = control.epoch, "Session control updated");
    true
}

#[tokio::main]
async fn main() -> ExitCode {
    common::init_logging();

    let config = match FeedConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let config = match std::env::args().nth(1) {
        Some(symbol) => config.with_symbol(&symbol),
        None => config,
    };

    info!(
        symbol = %config.symbol,
        environment = %config.environment,
        depth = config.depth,
        policy = ?config.sequence_policy,
        "Starting depth feed"
    );

    let snapshots = match BinanceSnapshotProvider::new(config.environment) {
        Ok(provider) => provider,
        Err(e) => {
            error!(error = %e, "Failed to build snapshot client");
            return ExitCode::FAILURE;
        }
    };
    let transport = BinanceTransport::new(config.environment, &config.symbol);
    let store = MarketStore::shared(config.symbol.clone(), config.sequence_policy);
    let metrics = create_metrics();

    let handle = FeedSession::new(
        ConnectorConfig::from(&config),
        Arc::clone(&store),
        Arc::new(transport),
        Arc::new(snapshots),
        Arc::clone(&metrics),
    )
    .start();
    handle.connect();

    // Create shutdown signal channel
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Spawn ctrl_c handler
    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown");
            let _ = ctrl_c_tx.send(true);
        }
    });

    let mut changes = store.subscribe();
    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut health = tokio::time::interval(HEALTH_LOG_INTERVAL);
    let mut render_tick = tokio::time::interval(RENDER_INTERVAL);
    let mut dirty = true;

    println!("Commands: t/toggle, c/connect, d/disconnect, q/quit");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }

            line = commands.recv(), if stdin_open => match line {
                Some(line) => match parse_command(&line) {
                    Some(command) => {
                        if !apply_command(&handle, command) {
                            break;
                        }
                        dirty = true;
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!(input = %line.trim(), "Unknown command"),
                },
                None => stdin_open = false,
            },

            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                dirty = true;
            }

            _ = render_tick.tick() => {
                if dirty {
                    dirty = false;
                    println!("\n{}", render::render(&store.view(config.depth)));
                }
            }

            _ = health.tick() => {
                let snapshot = metrics.snapshot();
                let status = snapshot.health_status();
                info!(
                    status = %status,
                    frames = snapshot.frames_received,
                    depth_updates = snapshot.depth_updates,
                    trades = snapshot.trades_received,
                    errors = snapshot.transport_errors + snapshot.parse_errors,
                    dropped_levels = snapshot.dropped_levels,
                    reconnects = snapshot.reconnect_attempts,
                    "Health check"
                );
            }
        }
    }

    handle.shutdown().await;

    // Print final metrics
    println!("\n{}", metrics.snapshot());

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
