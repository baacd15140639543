//! Board identifiers, channel layouts and connection parameters

use crate::error::{FocusError, FocusResult};
use serde::{Deserialize, Serialize};

/// Supported acquisition boards (BrainFlow-compatible numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum BoardId {
    /// Software signal generator
    Synthetic = -1,
    /// OpenBCI Cyton, 8 channels
    Cyton = 0,
    /// OpenBCI Cyton with Daisy module, 16 channels
    CytonDaisy = 2,
}

/// Row layout and timing of the samples a board produces
///
/// Every sample is a column of `num_rows` values; rows are addressed by the
/// channel indices below.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardDescriptor {
    pub board_id: BoardId,
    pub name: &'static str,
    /// Samples per second
    pub sampling_rate: usize,
    /// Total rows in every sample
    pub num_rows: usize,
    pub package_num_channel: usize,
    pub eeg_channels: Vec<usize>,
    pub accel_channels: Vec<usize>,
    pub timestamp_channel: usize,
    pub marker_channel: usize,
}

impl BoardId {
    /// Look up a board by its raw identifier
    pub fn from_i32(board_id: i32) -> FocusResult<Self> {
        match board_id {
            -1 => Ok(BoardId::Synthetic),
            0 => Ok(BoardId::Cyton),
            2 => Ok(BoardId::CytonDaisy),
            _ => Err(FocusError::UnsupportedBoard { board_id }),
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoardId::Synthetic => "Synthetic Board",
            BoardId::Cyton => "OpenBCI Cyton",
            BoardId::CytonDaisy => "OpenBCI Cyton+Daisy",
        }
    }

    /// Full channel layout for this board
    pub fn descriptor(&self) -> BoardDescriptor {
        match self {
            BoardId::Synthetic => BoardDescriptor {
                board_id: *self,
                name: self.name(),
                sampling_rate: 250,
                num_rows: 32,
                package_num_channel: 0,
                eeg_channels: (1..=16).collect(),
                accel_channels: vec![17, 18, 19],
                timestamp_channel: 30,
                marker_channel: 31,
            },
            BoardId::Cyton => BoardDescriptor {
                board_id: *self,
                name: self.name(),
                sampling_rate: 250,
                num_rows: 24,
                package_num_channel: 0,
                eeg_channels: (1..=8).collect(),
                accel_channels: vec![9, 10, 11],
                timestamp_channel: 22,
                marker_channel: 23,
            },
            // Two packets per sample, so half the Cyton rate
            BoardId::CytonDaisy => BoardDescriptor {
                board_id: *self,
                name: self.name(),
                sampling_rate: 125,
                num_rows: 32,
                package_num_channel: 0,
                eeg_channels: (1..=16).collect(),
                accel_channels: vec![17, 18, 19],
                timestamp_channel: 30,
                marker_channel: 31,
            },
        }
    }

    pub fn sampling_rate(&self) -> usize {
        self.descriptor().sampling_rate
    }

    pub fn eeg_channels(&self) -> Vec<usize> {
        self.descriptor().eeg_channels
    }

    pub fn accel_channels(&self) -> Vec<usize> {
        self.descriptor().accel_channels
    }

    /// Real hardware needs a serial port to connect to
    pub fn requires_serial_port(&self) -> bool {
        !matches!(self, BoardId::Synthetic)
    }
}

impl BoardDescriptor {
    /// Number of samples covering `seconds` of signal
    pub fn samples_for(&self, seconds: f64) -> FocusResult<usize> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(FocusError::InvalidArguments {
                reason: format!("window duration must be positive, got {}s", seconds),
            });
        }
        Ok((self.sampling_rate as f64 * seconds).round() as usize)
    }
}

impl std::fmt::Display for BoardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

/// Connection parameters handed to a board on creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputParams {
    /// Serial port identifier, e.g. "COM3" or "/dev/ttyUSB0"
    pub serial_port: Option<String>,
    /// Read timeout for the serial connection in milliseconds
    pub timeout_ms: u64,
}

impl Default for InputParams {
    fn default() -> Self {
        Self {
            serial_port: None,
            timeout_ms: 100,
        }
    }
}

impl InputParams {
    pub fn serial(port: &str) -> Self {
        Self {
            serial_port: Some(port.to_string()),
            ..Default::default()
        }
    }
}
