//! Focus-Acquisition: EEG board sessions and sample buffering
//!
//! Boards stream samples in the background into a ring buffer; the session
//! manager hands out fixed-size windows of the newest samples on demand.

pub mod buffer;
pub mod streamer;
pub mod board;
pub mod synthetic;
pub mod cyton;
pub mod memory;
pub mod session;

pub use buffer::DataBuffer;
pub use streamer::{CsvStreamer, StreamerMode, StreamerSpec};
pub use board::{create_board, Board, SampleSink};
pub use synthetic::{SyntheticBoard, SyntheticGenerator};
pub use cyton::{CytonBoard, CytonPacket, PacketReader};
pub use memory::{MemoryBoard, MemoryFeeder};
pub use session::{SessionConfig, SessionManager};
