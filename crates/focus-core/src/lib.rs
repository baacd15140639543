//! Focus-Core: Foundation types for EEG acquisition and inference
//!
//! Board identifiers and channel layouts, sample windows and the error type
//! shared by every crate in the workspace.

pub mod board;
pub mod window;
pub mod error;

pub use board::*;
pub use window::*;
pub use error::{FocusError, FocusResult};
