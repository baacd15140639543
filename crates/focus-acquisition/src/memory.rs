//! Board fed directly by the host process
//!
//! Useful when samples arrive through some other channel (a recorded file,
//! an external driver) or when a test needs exact control over the buffer.

use crate::board::{check_can_start, count_current, read_current, Board, SampleSink};
use crate::buffer::DataBuffer;
use crate::streamer::StreamerSpec;
use focus_core::{invalid_arguments, BoardDescriptor, BoardId, DataWindow, FocusError, FocusResult};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MemoryState {
    sink: Option<SampleSink>,
    queued: Vec<Vec<f64>>,
}

fn lock_state(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Board whose samples are pushed through a [`MemoryFeeder`]
pub struct MemoryBoard {
    descriptor: BoardDescriptor,
    prepared: bool,
    state: Arc<Mutex<MemoryState>>,
    buffer: Option<Arc<Mutex<DataBuffer>>>,
}

/// Cloneable producer handle for a [`MemoryBoard`]
#[derive(Clone)]
pub struct MemoryFeeder {
    num_rows: usize,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBoard {
    /// Memory board using the row layout of `board_id`
    pub fn new(board_id: BoardId) -> Self {
        MemoryBoard {
            descriptor: board_id.descriptor(),
            prepared: false,
            state: Arc::new(Mutex::new(MemoryState::default())),
            buffer: None,
        }
    }

    pub fn feeder(&self) -> MemoryFeeder {
        MemoryFeeder {
            num_rows: self.descriptor.num_rows,
            state: Arc::clone(&self.state),
        }
    }
}

impl MemoryFeeder {
    /// Deliver one sample; held back until the board is streaming
    pub fn push_sample(&self, sample: Vec<f64>) -> FocusResult<()> {
        if sample.len() != self.num_rows {
            return Err(invalid_arguments!("sample has {} rows, board expects {}", sample.len(), self.num_rows));
        }

        let mut state = lock_state(&self.state);
        match state.sink.as_mut() {
            Some(sink) => sink.push(&sample),
            None => {
                state.queued.push(sample);
                Ok(())
            }
        }
    }

    pub fn push_samples<I>(&self, samples: I) -> FocusResult<()>
    where
        I: IntoIterator<Item = Vec<f64>>,
    {
        samples.into_iter().try_for_each(|sample| self.push_sample(sample))
    }
}

impl Board for MemoryBoard {
    fn descriptor(&self) -> &BoardDescriptor {
        &self.descriptor
    }

    fn prepare_session(&mut self) -> FocusResult<()> {
        self.prepared = true;
        Ok(())
    }

    fn start_stream(&mut self, buffer_size: usize, streamer: Option<StreamerSpec>) -> FocusResult<()> {
        check_can_start(self.prepared, self.is_streaming(), buffer_size)?;

        let mut sink = SampleSink::open(&self.descriptor, buffer_size, streamer)?;
        let mut state = lock_state(&self.state);
        for sample in state.queued.drain(..) {
            sink.push(&sample)?;
        }

        self.buffer = Some(sink.buffer());
        state.sink = Some(sink);
        tracing::debug!(board = %self.descriptor.board_id, buffer_size, "Memory stream started");
        Ok(())
    }

    fn stop_stream(&mut self) -> FocusResult<()> {
        let sink = lock_state(&self.state).sink.take().ok_or(FocusError::StreamNotRunning)?;
        sink.finish();
        Ok(())
    }

    fn release_session(&mut self) -> FocusResult<()> {
        if !self.prepared {
            return Ok(());
        }
        if self.is_streaming() {
            self.stop_stream()?;
        }
        lock_state(&self.state).queued.clear();
        self.prepared = false;
        self.buffer = None;
        Ok(())
    }

    fn current_board_data(&self, num_samples: usize) -> FocusResult<DataWindow> {
        read_current(self.buffer.as_ref(), &self.descriptor, self.prepared, num_samples)
    }

    fn board_data_count(&self) -> FocusResult<usize> {
        count_current(self.buffer.as_ref(), self.prepared)
    }

    fn is_prepared(&self) -> bool {
        self.prepared
    }

    fn is_streaming(&self) -> bool {
        lock_state(&self.state).sink.is_some()
    }
}
