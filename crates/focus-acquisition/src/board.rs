//! Board trait and shared streaming plumbing

use crate::buffer::DataBuffer;
use crate::cyton::CytonBoard;
use crate::streamer::{CsvStreamer, StreamerSpec};
use crate::synthetic::SyntheticBoard;
use focus_core::{invalid_arguments, BoardDescriptor, BoardId, DataWindow, FocusError, FocusResult, InputParams};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Data acquisition source with a prepare/stream/release lifecycle
///
/// Samples are produced in the background after `start_stream`; readers take
/// non-blocking snapshots through `current_board_data`.
pub trait Board: Send {
    /// Channel layout of produced samples
    fn descriptor(&self) -> &BoardDescriptor;

    /// Connect to the source
    fn prepare_session(&mut self) -> FocusResult<()>;

    /// Begin streaming into a ring buffer of `buffer_size` samples,
    /// optionally mirrored to a capture file
    fn start_stream(&mut self, buffer_size: usize, streamer: Option<StreamerSpec>) -> FocusResult<()>;

    fn stop_stream(&mut self) -> FocusResult<()>;

    /// Stop streaming if needed and disconnect; no-op when not prepared
    fn release_session(&mut self) -> FocusResult<()>;

    /// Newest `num_samples` samples, or fewer if not yet buffered
    fn current_board_data(&self, num_samples: usize) -> FocusResult<DataWindow>;

    /// Number of samples currently buffered
    fn board_data_count(&self) -> FocusResult<usize>;

    fn is_prepared(&self) -> bool;

    fn is_streaming(&self) -> bool;

    fn board_id(&self) -> BoardId {
        self.descriptor().board_id
    }
}

/// Create a board for the given identifier
pub fn create_board(board_id: BoardId, params: InputParams, seed: Option<u64>) -> FocusResult<Box<dyn Board>> {
    match board_id {
        BoardId::Synthetic => Ok(Box::new(SyntheticBoard::new(seed))),
        BoardId::Cyton | BoardId::CytonDaisy => {
            if params.serial_port.as_deref().map_or(true, str::is_empty) {
                return Err(invalid_arguments!("{} requires a serial port", board_id.name()));
            }
            Ok(Box::new(CytonBoard::new(board_id, params)?))
        }
    }
}

pub(crate) fn lock_buffer(buffer: &Mutex<DataBuffer>) -> MutexGuard<'_, DataBuffer> {
    // A panicking producer leaves the samples themselves intact
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Destination for produced samples: the ring buffer plus optional capture file
pub struct SampleSink {
    buffer: Arc<Mutex<DataBuffer>>,
    streamer: Option<CsvStreamer>,
}

impl SampleSink {
    /// Allocate the ring buffer and open the capture file for a new stream
    pub fn open(
        descriptor: &BoardDescriptor,
        buffer_size: usize,
        streamer: Option<StreamerSpec>,
    ) -> FocusResult<Self> {
        let buffer = DataBuffer::new(descriptor.num_rows, buffer_size)?;
        let streamer = streamer.map(|spec| spec.open()).transpose()?;

        Ok(SampleSink {
            buffer: Arc::new(Mutex::new(buffer)),
            streamer,
        })
    }

    /// Shared handle to the ring buffer for readers
    pub fn buffer(&self) -> Arc<Mutex<DataBuffer>> {
        Arc::clone(&self.buffer)
    }

    /// Store one sample; a failing capture file is dropped, buffering continues
    pub fn push(&mut self, sample: &[f64]) -> FocusResult<()> {
        lock_buffer(&self.buffer).push_sample(sample)?;

        if let Some(streamer) = self.streamer.as_mut() {
            if let Err(e) = streamer.write_sample(sample) {
                tracing::warn!(error = %e, "Capture file disabled after write failure");
                self.streamer = None;
            }
        }
        Ok(())
    }

    /// Flush the capture file
    pub fn finish(mut self) {
        if let Some(streamer) = self.streamer.as_mut() {
            match streamer.flush() {
                Ok(()) => tracing::debug!(
                    path = %streamer.path().display(),
                    records = streamer.records_written(),
                    "Capture file flushed"
                ),
                Err(e) => tracing::warn!(error = %e, "Capture file flush failed"),
            }
        }
    }
}

/// Snapshot helper shared by board implementations
pub(crate) fn read_current(
    buffer: Option<&Arc<Mutex<DataBuffer>>>,
    descriptor: &BoardDescriptor,
    prepared: bool,
    num_samples: usize,
) -> FocusResult<DataWindow> {
    if !prepared {
        return Err(FocusError::SessionNotPrepared);
    }
    Ok(match buffer {
        Some(buffer) => lock_buffer(buffer).current(num_samples),
        None => DataWindow::empty(descriptor.num_rows),
    })
}

pub(crate) fn count_current(buffer: Option<&Arc<Mutex<DataBuffer>>>, prepared: bool) -> FocusResult<usize> {
    if !prepared {
        return Err(FocusError::SessionNotPrepared);
    }
    Ok(buffer.map(|b| lock_buffer(b).len()).unwrap_or(0))
}

/// Validate the common start_stream preconditions
pub(crate) fn check_can_start(prepared: bool, streaming: bool, buffer_size: usize) -> FocusResult<()> {
    if !prepared {
        return Err(FocusError::SessionNotPrepared);
    }
    if streaming {
        return Err(FocusError::StreamAlreadyRunning);
    }
    if buffer_size == 0 {
        return Err(invalid_arguments!("buffer size must be positive"));
    }
    Ok(())
}

/// Seconds since the Unix epoch, as stored in the timestamp row
pub(crate) fn timestamp_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_board() {
        let synthetic = create_board(BoardId::Synthetic, InputParams::default(), Some(7)).unwrap();
        assert_eq!(synthetic.board_id(), BoardId::Synthetic);
        assert!(!synthetic.is_prepared());

        let missing_port = create_board(BoardId::CytonDaisy, InputParams::default(), None);
        assert!(matches!(missing_port, Err(FocusError::InvalidArguments { .. })));

        let cyton = create_board(BoardId::Cyton, InputParams::serial("COM3"), None).unwrap();
        assert_eq!(cyton.descriptor().eeg_channels.len(), 8);
    }

    #[test]
    fn test_sink_pushes_to_buffer() {
        let descriptor = BoardId::Cyton.descriptor();
        let mut sink = SampleSink::open(&descriptor, 4, None).unwrap();
        let buffer = sink.buffer();

        let sample = vec![1.0; descriptor.num_rows];
        for _ in 0..6 {
            sink.push(&sample).unwrap();
        }
        assert_eq!(lock_buffer(&buffer).len(), 4);
        assert!(sink.push(&[1.0]).is_err());
        sink.finish();
    }

    #[test]
    fn test_start_preconditions() {
        assert_eq!(check_can_start(false, false, 10), Err(FocusError::SessionNotPrepared));
        assert_eq!(check_can_start(true, true, 10), Err(FocusError::StreamAlreadyRunning));
        assert!(check_can_start(true, false, 0).is_err());
        assert!(check_can_start(true, false, 10).is_ok());
    }

    #[test]
    fn test_read_requires_prepared() {
        let descriptor = BoardId::Synthetic.descriptor();
        assert_eq!(
            read_current(None, &descriptor, false, 10),
            Err(FocusError::SessionNotPrepared)
        );
        let window = read_current(None, &descriptor, true, 10).unwrap();
        assert_eq!(window.num_rows(), 32);
        assert!(window.is_empty());
        assert_eq!(count_current(None, true).unwrap(), 0);
    }
}
