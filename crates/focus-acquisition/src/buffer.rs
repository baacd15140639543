//! Ring buffer holding the most recent board samples

use focus_core::{invalid_arguments, DataWindow, FocusResult};
use std::collections::VecDeque;

// Upfront allocation cap; large buffers grow on demand.
const INITIAL_ALLOCATION: usize = 4096;

/// Bounded per-row sample history
///
/// Once `capacity` samples are stored, every new sample evicts the oldest one.
#[derive(Debug)]
pub struct DataBuffer {
    per_row: Vec<VecDeque<f64>>,
    capacity: usize,
    total_pushed: u64,
}

impl DataBuffer {
    /// Create buffer for samples of `num_rows` values
    pub fn new(num_rows: usize, capacity: usize) -> FocusResult<Self> {
        if num_rows == 0 {
            return Err(invalid_arguments!("buffer needs at least one row"));
        }
        if capacity == 0 {
            return Err(invalid_arguments!("buffer capacity must be positive"));
        }

        let initial = capacity.min(INITIAL_ALLOCATION);
        Ok(DataBuffer {
            per_row: (0..num_rows).map(|_| VecDeque::with_capacity(initial)).collect(),
            capacity,
            total_pushed: 0,
        })
    }

    /// Append one sample (a full column of row values)
    pub fn push_sample(&mut self, sample: &[f64]) -> FocusResult<()> {
        if sample.len() != self.per_row.len() {
            return Err(invalid_arguments!(
                "sample has {} rows, buffer expects {}",
                sample.len(),
                self.per_row.len()
            ));
        }

        for (row, &value) in self.per_row.iter_mut().zip(sample) {
            if row.len() == self.capacity {
                row.pop_front();
            }
            row.push_back(value);
        }
        self.total_pushed += 1;
        Ok(())
    }

    /// Newest `min(num_samples, len)` samples in chronological order, left in place
    pub fn current(&self, num_samples: usize) -> DataWindow {
        let take = num_samples.min(self.len());
        let start = self.len() - take;
        let rows = self.per_row.iter()
            .map(|row| row.range(start..).copied().collect())
            .collect();
        DataWindow::new(rows).unwrap_or_else(|_| DataWindow::empty(self.per_row.len()))
    }

    /// Remove and return everything buffered so far
    pub fn drain_all(&mut self) -> DataWindow {
        let rows = self.per_row.iter_mut()
            .map(|row| row.drain(..).collect())
            .collect();
        DataWindow::new(rows).unwrap_or_else(|_| DataWindow::empty(self.per_row.len()))
    }

    /// Number of samples currently stored
    pub fn len(&self) -> usize {
        self.per_row.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_rows(&self) -> usize {
        self.per_row.len()
    }

    /// Samples pushed over the buffer's lifetime, including evicted ones
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64) -> Vec<f64> {
        vec![value, value * 10.0]
    }

    #[test]
    fn test_buffer_basic() {
        let mut buffer = DataBuffer::new(2, 10).unwrap();
        for i in 0..4 {
            buffer.push_sample(&sample(i as f64)).unwrap();
        }

        assert_eq!(buffer.len(), 4);
        let window = buffer.current(2);
        assert_eq!(window.num_samples(), 2);
        assert_eq!(window.row(0).unwrap(), &[2.0, 3.0]);
        assert_eq!(window.row(1).unwrap(), &[20.0, 30.0]);

        // Reading leaves samples in place
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_current_shorter_than_request() {
        let mut buffer = DataBuffer::new(2, 10).unwrap();
        buffer.push_sample(&sample(1.0)).unwrap();

        let window = buffer.current(1000);
        assert_eq!(window.num_samples(), 1);
        assert_eq!(window.num_rows(), 2);
    }

    #[test]
    fn test_eviction() {
        let mut buffer = DataBuffer::new(2, 3).unwrap();
        for i in 0..5 {
            buffer.push_sample(&sample(i as f64)).unwrap();
        }

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.total_pushed(), 5);
        assert_eq!(buffer.current(3).row(0).unwrap(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_drain() {
        let mut buffer = DataBuffer::new(2, 5).unwrap();
        buffer.push_sample(&sample(1.0)).unwrap();
        buffer.push_sample(&sample(2.0)).unwrap();

        let drained = buffer.drain_all();
        assert_eq!(drained.num_samples(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(DataBuffer::new(0, 10).is_err());
        assert!(DataBuffer::new(2, 0).is_err());

        let mut buffer = DataBuffer::new(2, 10).unwrap();
        assert!(buffer.push_sample(&[1.0, 2.0, 3.0]).is_err());
        assert!(buffer.is_empty());
    }
}
