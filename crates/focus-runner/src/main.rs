//! Focus runner: streams EEG and logs a concentration score every tick
//!
//! Configuration comes from the JSON file named by `FOCUS_CONFIG` (optional)
//! with `FOCUS_SIMULATION` and `FOCUS_SERIAL_PORT` overrides. Stops on Ctrl-C.

use anyhow::Context;
use focus_runner::{logging, FocusMonitor, RunnerConfig};
use tokio::time::{interval, MissedTickBehavior};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RunnerConfig::load().context("loading configuration")?;
    logging::init(config.log_file.as_deref())?;

    tracing::info!(
        simulation = config.session.simulation,
        board = %config.session.effective_board(),
        window_seconds = config.window_seconds,
        tick_hz = config.tick_hz,
        "Starting focus runner"
    );

    let mut monitor = FocusMonitor::start_or_disabled(&config);
    let mut ticker = interval(config.tick_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = monitor.tick() {
                    tracing::warn!(error = %e, "Tick failed");
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Ctrl-C handler failed");
                }
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    if let Some(last) = monitor.last_score() {
        tracing::info!(score = last.score, at = %last.at, "Last concentration score");
    }
    monitor.shutdown();
    Ok(())
}
