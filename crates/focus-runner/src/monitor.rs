//! Focus monitor: one session and one pipeline, driven by host ticks

use crate::config::RunnerConfig;
use chrono::{DateTime, Utc};
use focus_acquisition::{Board, SessionManager};
use focus_core::{config_error, FocusError, FocusResult, WindowPoll};
use focus_processing::{FocusPipeline, PipelineStats, ProcessingConfig};

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Monitor never started or was shut down
    Disabled,
    /// Window not full yet
    Waiting { available: usize, required: usize },
    /// A full window was scored
    Scored { score: f64 },
}

/// Most recent concentration score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub score: f64,
    pub at: DateTime<Utc>,
}

pub struct FocusMonitor {
    session: SessionManager,
    pipeline: Option<FocusPipeline>,
    window_size: usize,
    last_score: Option<ScoreRecord>,
}

impl FocusMonitor {
    /// Open the configured session and prepare the configured model
    pub fn start(config: &RunnerConfig) -> FocusResult<Self> {
        config.validate()?;

        let mut session = SessionManager::new();
        session.open(&config.session)?;
        Self::attach_pipeline(session, &config.processing, config.window_seconds)
    }

    /// Start on an already constructed board
    pub fn start_with_board(
        board: Box<dyn Board>,
        buffer_size: usize,
        processing: &ProcessingConfig,
        window_seconds: f64,
    ) -> FocusResult<Self> {
        let mut session = SessionManager::new();
        session.open_with_board(board, buffer_size, None)?;
        Self::attach_pipeline(session, processing, window_seconds)
    }

    /// Like [`FocusMonitor::start`], but a failure leaves a disabled monitor
    pub fn start_or_disabled(config: &RunnerConfig) -> Self {
        match Self::start(config) {
            Ok(monitor) => monitor,
            Err(e) => {
                tracing::error!(error = %e, "Focus monitor disabled");
                Self::disabled()
            }
        }
    }

    /// Monitor that only ever reports [`TickOutcome::Disabled`]
    pub fn disabled() -> Self {
        Self {
            session: SessionManager::new(),
            pipeline: None,
            window_size: 0,
            last_score: None,
        }
    }

    fn attach_pipeline(
        mut session: SessionManager,
        processing: &ProcessingConfig,
        window_seconds: f64,
    ) -> FocusResult<Self> {
        let prepared = session.required_window(window_seconds).and_then(|window_size| {
            let buffer_size = session.buffer_size().ok_or(FocusError::SessionNotOpen)?;
            if window_size > buffer_size {
                return Err(config_error!(
                    "window of {} samples does not fit the {} sample buffer",
                    window_size,
                    buffer_size
                ));
            }
            let mut pipeline = FocusPipeline::new(processing.clone())?;
            pipeline.prepare_configured_model()?;
            Ok((window_size, pipeline))
        });

        match prepared {
            Ok((window_size, pipeline)) => {
                tracing::info!(
                    window_size,
                    metric = %processing.model.metric,
                    wavelet = %processing.wavelet,
                    "Focus monitor started"
                );
                Ok(Self {
                    session,
                    pipeline: Some(pipeline),
                    window_size,
                    last_score: None,
                })
            }
            Err(e) => {
                if let Err(close_err) = session.close() {
                    tracing::warn!(error = %close_err, "Closing session after failed start also failed");
                }
                Err(e)
            }
        }
    }

    /// Poll the session and score the window once it is full
    pub fn tick(&mut self) -> FocusResult<TickOutcome> {
        let Some(pipeline) = self.pipeline.as_mut() else {
            return Ok(TickOutcome::Disabled);
        };

        let window = match self.session.poll(self.window_size)? {
            WindowPoll::Ready(window) => window,
            WindowPoll::Pending { available, required } => {
                tracing::debug!(available, required, "Waiting for a full window");
                return Ok(TickOutcome::Waiting { available, required });
            }
        };

        let channels = self.session.eeg_channels().ok_or(FocusError::SessionNotOpen)?;
        let sampling_rate = self.session.sampling_rate().ok_or(FocusError::SessionNotOpen)?;
        let output = pipeline.run(&window, channels, sampling_rate)?;

        tracing::info!("Concentration: {:.4}", output.score);
        self.last_score = Some(ScoreRecord {
            score: output.score,
            at: Utc::now(),
        });
        Ok(TickOutcome::Scored { score: output.score })
    }

    /// Release the model, then the session; errors are logged
    pub fn shutdown(&mut self) {
        if let Some(mut pipeline) = self.pipeline.take() {
            let stats = pipeline.stats().clone();
            if let Err(e) = pipeline.release_model() {
                tracing::error!(error = %e, "Failed to release model");
            }
            tracing::info!(
                runs = stats.runs,
                failures = stats.failures,
                avg_latency_us = stats.avg_latency_us(),
                "Focus monitor stopped"
            );
        }
        if let Err(e) = self.session.close() {
            tracing::error!(error = %e, "Failed to release session");
        }
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some() && self.session.is_open()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn last_score(&self) -> Option<&ScoreRecord> {
        self.last_score.as_ref()
    }

    pub fn pipeline_stats(&self) -> Option<&PipelineStats> {
        self.pipeline.as_ref().map(FocusPipeline::stats)
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }
}

impl Drop for FocusMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focus_acquisition::{MemoryBoard, MemoryFeeder};
    use focus_core::BoardId;
    use focus_processing::{Metric, ModelParams, Classifier};
    use std::f64::consts::PI;

    /// Synthetic-layout samples with a 20 Hz rhythm on every EEG row
    fn beta_samples(start: usize, count: usize) -> impl Iterator<Item = Vec<f64>> {
        let descriptor = BoardId::Synthetic.descriptor();
        (start..start + count).map(move |i| {
            let t = i as f64 / descriptor.sampling_rate as f64;
            let mut sample = vec![0.0; descriptor.num_rows];
            sample[descriptor.package_num_channel] = (i % 256) as f64;
            for &row in &descriptor.eeg_channels {
                sample[row] = 12.0 * (2.0 * PI * 20.0 * t + row as f64).sin();
            }
            sample
        })
    }

    fn memory_monitor() -> (FocusMonitor, MemoryFeeder) {
        let board = MemoryBoard::new(BoardId::Synthetic);
        let feeder = board.feeder();
        let monitor =
            FocusMonitor::start_with_board(Box::new(board), 450_000, &ProcessingConfig::default(), 4.0)
                .unwrap();
        (monitor, feeder)
    }

    #[test]
    fn test_waits_for_full_window() {
        let (mut monitor, feeder) = memory_monitor();
        assert_eq!(monitor.window_size(), 1000);

        assert_eq!(
            monitor.tick().unwrap(),
            TickOutcome::Waiting { available: 0, required: 1000 }
        );

        feeder.push_samples(beta_samples(0, 999)).unwrap();
        assert_eq!(
            monitor.tick().unwrap(),
            TickOutcome::Waiting { available: 999, required: 1000 }
        );
        assert_eq!(monitor.pipeline_stats().unwrap().runs, 0);
        assert!(monitor.last_score().is_none());
    }

    #[test]
    fn test_scores_full_window_once_per_tick() {
        let (mut monitor, feeder) = memory_monitor();
        feeder.push_samples(beta_samples(0, 1000)).unwrap();

        let score = match monitor.tick().unwrap() {
            TickOutcome::Scored { score } => score,
            other => panic!("expected a score, got {:?}", other),
        };
        assert!((0.0..=1.0).contains(&score));
        assert!(score > 0.9, "beta rhythm scored {}", score);
        assert_eq!(monitor.pipeline_stats().unwrap().runs, 1);
        assert_eq!(monitor.last_score().unwrap().score, score);

        monitor.tick().unwrap();
        assert_eq!(monitor.pipeline_stats().unwrap().runs, 2);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (mut monitor, _feeder) = memory_monitor();
        assert!(monitor.is_running());

        monitor.shutdown();
        monitor.shutdown();
        assert!(!monitor.is_running());
        assert!(!monitor.session().is_open());
        assert_eq!(monitor.tick().unwrap(), TickOutcome::Disabled);
    }

    #[test]
    fn test_disabled_monitor() {
        let mut monitor = FocusMonitor::disabled();
        assert_eq!(monitor.tick().unwrap(), TickOutcome::Disabled);
        assert!(monitor.pipeline_stats().is_none());
        monitor.shutdown();
    }

    #[test]
    fn test_model_failure_fails_start() {
        let processing = ProcessingConfig {
            model: ModelParams::new(Metric::UserDefined, Classifier::Regression),
            ..ProcessingConfig::default()
        };
        let result = FocusMonitor::start_with_board(
            Box::new(MemoryBoard::new(BoardId::Synthetic)),
            450_000,
            &processing,
            4.0,
        );
        assert!(matches!(result, Err(FocusError::UnsupportedModel { .. })));
    }

    #[test]
    fn test_window_larger_than_buffer_fails_start() {
        let board = MemoryBoard::new(BoardId::Synthetic);
        let result = FocusMonitor::start_with_board(Box::new(board), 500, &ProcessingConfig::default(), 4.0);
        assert!(matches!(result, Err(FocusError::ConfigurationError { .. })));
    }

    #[test]
    fn test_unreachable_board_disables_monitor() {
        let mut config = RunnerConfig::default();
        config.session.simulation = false;
        config.session.serial_port = "/dev/focus-missing-port".to_string();
        config.session.streamer = None;

        let mut monitor = FocusMonitor::start_or_disabled(&config);
        assert!(!monitor.is_running());
        assert_eq!(monitor.tick().unwrap(), TickOutcome::Disabled);
    }

    #[tokio::test]
    async fn test_start_synthetic() {
        let mut config = RunnerConfig::default();
        config.session.streamer = None;
        config.session.seed = Some(1);

        let mut monitor = FocusMonitor::start(&config).unwrap();
        assert!(monitor.is_running());
        assert!(matches!(monitor.tick().unwrap(), TickOutcome::Waiting { required: 1000, .. }));
        monitor.shutdown();
    }
}
