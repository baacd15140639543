//! Focus-Runner: host loop wiring acquisition and inference together

pub mod config;
pub mod logging;
pub mod monitor;

pub use config::RunnerConfig;
pub use monitor::{FocusMonitor, ScoreRecord, TickOutcome};
