//! Error handling for the Focus framework
//!
//! Every fallible acquisition, processing and model operation reports one of
//! these variants. Callers decide whether to retry, abort or degrade.

use std::fmt;

/// Result type alias for Focus framework operations
pub type FocusResult<T> = Result<T, FocusError>;

/// Error type for all Focus framework operations
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FocusError {
    /// Caller supplied an argument the operation cannot work with
    InvalidArguments {
        /// Description of the offending argument
        reason: String,
    },

    /// Board identifier is not known to the framework
    UnsupportedBoard {
        /// Raw board identifier
        board_id: i32,
    },

    /// Serial (or virtual) connection could not be opened
    UnableToOpenPort {
        /// Port identifier, e.g. "COM3" or "/dev/ttyUSB0"
        port: String,
        /// Underlying failure
        reason: String,
    },

    /// Writing a command to the board failed
    BoardWriteError {
        /// Underlying failure
        reason: String,
    },

    /// Operation requires a prepared board session
    SessionNotPrepared,

    /// A session is already open on this manager
    SessionAlreadyOpen,

    /// Operation requires an open session
    SessionNotOpen,

    /// Streaming was already started
    StreamAlreadyRunning,

    /// Streaming is not running
    StreamNotRunning,

    /// No async runtime available to drive background acquisition
    RuntimeUnavailable {
        /// Underlying failure
        reason: String,
    },

    /// Capture file could not be opened or written
    StreamerError {
        /// Underlying failure
        reason: String,
    },

    /// Model has not been prepared or was already released
    ModelNotPrepared,

    /// Requested metric/classifier combination cannot be loaded
    UnsupportedModel {
        /// Requested metric
        metric: String,
        /// Requested classifier
        classifier: String,
    },

    /// Model coefficient file could not be read or parsed
    ModelFileError {
        /// Underlying failure
        reason: String,
    },

    /// Invalid configuration values
    ConfigurationError {
        /// Description of the configuration problem
        message: String,
    },
}

impl fmt::Display for FocusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusError::InvalidArguments { reason } => {
                write!(f, "Invalid arguments: {}", reason)
            }
            FocusError::UnsupportedBoard { board_id } => {
                write!(f, "Unsupported board id: {}", board_id)
            }
            FocusError::UnableToOpenPort { port, reason } => {
                write!(f, "Unable to open port {}: {}", port, reason)
            }
            FocusError::BoardWriteError { reason } => {
                write!(f, "Board write error: {}", reason)
            }
            FocusError::SessionNotPrepared => {
                write!(f, "Board session is not prepared")
            }
            FocusError::SessionAlreadyOpen => {
                write!(f, "A session is already open")
            }
            FocusError::SessionNotOpen => {
                write!(f, "No session is open")
            }
            FocusError::StreamAlreadyRunning => {
                write!(f, "Stream is already running")
            }
            FocusError::StreamNotRunning => {
                write!(f, "Stream is not running")
            }
            FocusError::RuntimeUnavailable { reason } => {
                write!(f, "Async runtime unavailable: {}", reason)
            }
            FocusError::StreamerError { reason } => {
                write!(f, "Streamer error: {}", reason)
            }
            FocusError::ModelNotPrepared => {
                write!(f, "Model is not prepared")
            }
            FocusError::UnsupportedModel { metric, classifier } => {
                write!(f, "Unsupported model: metric {}, classifier {}",
                       metric, classifier)
            }
            FocusError::ModelFileError { reason } => {
                write!(f, "Model file error: {}", reason)
            }
            FocusError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for FocusError {}

/// Convenience macro for creating invalid-argument errors
#[macro_export]
macro_rules! invalid_arguments {
    ($($arg:tt)+) => {
        $crate::error::FocusError::InvalidArguments {
            reason: format!($($arg)+),
        }
    };
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)+) => {
        $crate::error::FocusError::ConfigurationError {
            message: format!($($arg)+),
        }
    };
}
