//! Session manager: open a board, poll fixed-size windows, close it again

use crate::board::{create_board, Board};
use crate::streamer::StreamerSpec;
use focus_core::{
    config_error, invalid_arguments, BoardDescriptor, BoardId, FocusError, FocusResult, InputParams, WindowPoll,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a session connects to its data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Use the synthetic board instead of hardware
    pub simulation: bool,
    /// Hardware board used when not simulating
    pub board: BoardId,
    pub serial_port: String,
    /// Ring buffer capacity in samples
    pub buffer_size: usize,
    /// Capture file as `file://<path>:<mode>`, `None` to disable
    pub streamer: Option<String>,
    /// Seed for the synthetic generator
    pub seed: Option<u64>,
    /// Serial read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            simulation: true,
            board: BoardId::CytonDaisy,
            serial_port: "COM3".to_string(),
            buffer_size: 450_000,
            streamer: Some("file://brainflow_data.csv:w".to_string()),
            seed: None,
            timeout_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Board that `open` will create
    pub fn effective_board(&self) -> BoardId {
        if self.simulation {
            BoardId::Synthetic
        } else {
            self.board
        }
    }

    pub fn validate(&self) -> FocusResult<()> {
        if self.buffer_size == 0 {
            return Err(config_error!("buffer_size must be positive"));
        }
        if !self.simulation && self.board.requires_serial_port() && self.serial_port.trim().is_empty() {
            return Err(config_error!("{} requires a serial port", self.board.name()));
        }
        if let Some(streamer) = &self.streamer {
            StreamerSpec::parse(streamer)
                .map_err(|e| config_error!("invalid streamer: {}", e))?;
        }
        Ok(())
    }

    fn streamer_spec(&self) -> FocusResult<Option<StreamerSpec>> {
        self.streamer.as_deref().map(StreamerSpec::parse).transpose()
    }

    fn input_params(&self) -> InputParams {
        InputParams {
            serial_port: (!self.simulation).then(|| self.serial_port.clone()),
            timeout_ms: self.timeout_ms,
        }
    }
}

struct ActiveSession {
    id: Uuid,
    board: Box<dyn Board>,
    descriptor: BoardDescriptor,
    buffer_size: usize,
}

/// Owns at most one open board session
///
/// ```text
/// closed --open--> open --close--> closed
///                   |
///                  poll -> Ready(window) | Pending { available, required }
/// ```
#[derive(Default)]
pub struct SessionManager {
    active: Option<ActiveSession>,
    board_id: Option<BoardId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the configured board, prepare it and start streaming
    ///
    /// On failure the board is released and the manager stays closed.
    pub fn open(&mut self, config: &SessionConfig) -> FocusResult<()> {
        if self.active.is_some() {
            return Err(FocusError::SessionAlreadyOpen);
        }
        config.validate()?;

        let board_id = config.effective_board();
        let board = create_board(board_id, config.input_params(), config.seed)?;
        self.open_with_board(board, config.buffer_size, config.streamer_spec()?)
    }

    /// Open a session on an already constructed board
    pub fn open_with_board(
        &mut self,
        mut board: Box<dyn Board>,
        buffer_size: usize,
        streamer: Option<StreamerSpec>,
    ) -> FocusResult<()> {
        if self.active.is_some() {
            return Err(FocusError::SessionAlreadyOpen);
        }

        let started = board
            .prepare_session()
            .and_then(|_| board.start_stream(buffer_size, streamer));

        if let Err(e) = started {
            tracing::error!(board = %board.board_id(), error = %e, "Failed to open session");
            if let Err(release_err) = board.release_session() {
                tracing::warn!(error = %release_err, "Releasing board after failed open also failed");
            }
            return Err(e);
        }

        let descriptor = board.descriptor().clone();
        let id = Uuid::new_v4();
        tracing::info!(
            session = %id,
            board = %descriptor.board_id,
            sampling_rate = descriptor.sampling_rate,
            eeg_channels = descriptor.eeg_channels.len(),
            buffer_size,
            "Session opened"
        );

        self.board_id = Some(descriptor.board_id);
        self.active = Some(ActiveSession {
            id,
            board,
            descriptor,
            buffer_size,
        });
        Ok(())
    }

    /// Newest `window_size` samples if that many are buffered
    pub fn poll(&self, window_size: usize) -> FocusResult<WindowPoll> {
        let session = self.active.as_ref().ok_or(FocusError::SessionNotOpen)?;

        if window_size == 0 {
            return Err(invalid_arguments!("window size must be positive"));
        }
        if window_size > session.buffer_size {
            return Err(invalid_arguments!(
                "window of {} samples exceeds buffer of {}",
                window_size,
                session.buffer_size
            ));
        }

        let window = session.board.current_board_data(window_size)?;
        let available = window.num_samples();
        if available < window_size {
            return Ok(WindowPoll::Pending {
                available,
                required: window_size,
            });
        }

        tracing::debug!(session = %session.id, samples = available, "Window ready");
        Ok(WindowPoll::Ready(window))
    }

    /// Release the open session; closing a closed manager is a no-op
    pub fn close(&mut self) -> FocusResult<()> {
        let Some(mut session) = self.active.take() else {
            return Ok(());
        };

        let result = session.board.release_session();
        match &result {
            Ok(()) => tracing::info!(session = %session.id, "Session closed"),
            Err(e) => tracing::warn!(session = %session.id, error = %e, "Session closed with error"),
        }
        result
    }

    /// Board of the current or most recent session
    pub fn board_id(&self) -> Option<BoardId> {
        self.board_id
    }

    pub fn sampling_rate(&self) -> Option<usize> {
        self.active.as_ref().map(|s| s.descriptor.sampling_rate)
    }

    pub fn eeg_channels(&self) -> Option<&[usize]> {
        self.active.as_ref().map(|s| s.descriptor.eeg_channels.as_slice())
    }

    pub fn accel_channels(&self) -> Option<&[usize]> {
        self.active.as_ref().map(|s| s.descriptor.accel_channels.as_slice())
    }

    /// Ring buffer capacity of the open session
    pub fn buffer_size(&self) -> Option<usize> {
        self.active.as_ref().map(|s| s.buffer_size)
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|s| s.id)
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Samples needed for a window of `seconds`
    pub fn required_window(&self, seconds: f64) -> FocusResult<usize> {
        let session = self.active.as_ref().ok_or(FocusError::SessionNotOpen)?;
        session.descriptor.samples_for(seconds)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Closing session on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBoard;

    fn open_memory(manager: &mut SessionManager, board_id: BoardId) -> crate::memory::MemoryFeeder {
        let board = MemoryBoard::new(board_id);
        let feeder = board.feeder();
        manager.open_with_board(Box::new(board), 450_000, None).unwrap();
        feeder
    }

    fn feed(feeder: &crate::memory::MemoryFeeder, rows: usize, count: usize) {
        feeder.push_samples((0..count).map(|i| vec![i as f64; rows])).unwrap();
    }

    #[test]
    fn test_poll_pending_then_ready() {
        let mut manager = SessionManager::new();
        let feeder = open_memory(&mut manager, BoardId::Synthetic);

        let required = manager.required_window(4.0).unwrap();
        assert_eq!(required, 1000);

        feed(&feeder, 32, 999);
        match manager.poll(required).unwrap() {
            WindowPoll::Pending { available, required } => {
                assert_eq!(available, 999);
                assert_eq!(required, 1000);
            }
            WindowPoll::Ready(_) => panic!("window should not be ready"),
        }

        feed(&feeder, 32, 1);
        let window = manager.poll(required).unwrap().into_window().unwrap();
        assert_eq!(window.num_rows(), 32);
        assert_eq!(window.num_samples(), 1000);
    }

    #[test]
    fn test_poll_returns_newest_samples() {
        let mut manager = SessionManager::new();
        let feeder = open_memory(&mut manager, BoardId::Cyton);
        feed(&feeder, 24, 1500);

        let window = manager.poll(1000).unwrap().into_window().unwrap();
        let package = window.row(0).unwrap();
        assert_eq!(package[0], 500.0);
        assert_eq!(package[999], 1499.0);
    }

    #[test]
    fn test_poll_requires_open_session() {
        let manager = SessionManager::new();
        assert!(matches!(manager.poll(10), Err(FocusError::SessionNotOpen)));
        assert!(!manager.is_open());
        assert_eq!(manager.sampling_rate(), None);
    }

    #[test]
    fn test_poll_rejects_bad_window() {
        let mut manager = SessionManager::new();
        open_memory(&mut manager, BoardId::Synthetic);
        assert!(manager.poll(0).is_err());
        assert!(manager.poll(450_001).is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut manager = SessionManager::new();
        manager.close().unwrap();

        open_memory(&mut manager, BoardId::CytonDaisy);
        assert!(manager.is_open());
        assert_eq!(manager.sampling_rate(), Some(125));
        assert_eq!(manager.eeg_channels().map(|c| c.len()), Some(16));
        assert!(manager.session_id().is_some());
        assert_eq!(manager.buffer_size(), Some(450_000));

        manager.close().unwrap();
        manager.close().unwrap();
        assert!(!manager.is_open());
        assert_eq!(manager.board_id(), Some(BoardId::CytonDaisy));
    }

    #[test]
    fn test_open_twice() {
        let mut manager = SessionManager::new();
        open_memory(&mut manager, BoardId::Synthetic);
        let again = manager.open_with_board(Box::new(MemoryBoard::new(BoardId::Synthetic)), 10, None);
        assert_eq!(again, Err(FocusError::SessionAlreadyOpen));
    }

    #[test]
    fn test_failed_open_leaves_manager_closed() {
        let mut manager = SessionManager::new();
        let result = manager.open_with_board(Box::new(MemoryBoard::new(BoardId::Synthetic)), 0, None);
        assert!(matches!(result, Err(FocusError::InvalidArguments { .. })));
        assert!(!manager.is_open());

        let config = SessionConfig {
            simulation: false,
            serial_port: "/dev/focus-missing-port".to_string(),
            streamer: None,
            ..SessionConfig::default()
        };
        let result = manager.open(&config);
        assert!(matches!(result, Err(FocusError::UnableToOpenPort { .. })));
        assert!(!manager.is_open());
    }

    #[test]
    fn test_config_defaults_and_validation() {
        let config = SessionConfig::default();
        assert!(config.simulation);
        assert_eq!(config.board, BoardId::CytonDaisy);
        assert_eq!(config.serial_port, "COM3");
        assert_eq!(config.buffer_size, 450_000);
        assert_eq!(config.effective_board(), BoardId::Synthetic);
        assert!(config.validate().is_ok());

        let bad = SessionConfig { buffer_size: 0, ..SessionConfig::default() };
        assert!(matches!(bad.validate(), Err(FocusError::ConfigurationError { .. })));

        let bad = SessionConfig { streamer: Some("udp://x".to_string()), ..SessionConfig::default() };
        assert!(bad.validate().is_err());

        let bad = SessionConfig {
            simulation: false,
            serial_port: " ".to_string(),
            ..SessionConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_open_synthetic_session() {
        let config = SessionConfig {
            streamer: None,
            seed: Some(11),
            ..SessionConfig::default()
        };

        let mut manager = SessionManager::new();
        manager.open(&config).unwrap();
        assert_eq!(manager.board_id(), Some(BoardId::Synthetic));
        assert_eq!(manager.accel_channels(), Some(&[17, 18, 19][..]));

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let poll = manager.poll(1000).unwrap();
        assert!(!poll.is_ready());

        manager.close().unwrap();
    }
}
