//! DataWindow: multi-channel slice of the most recent board samples

use crate::error::{FocusError, FocusResult};

/// Board samples laid out as `[num_rows × num_samples]`
///
/// Row indices follow the producing board's [`crate::BoardDescriptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataWindow {
    rows: Vec<Vec<f64>>,
}

/// Outcome of a non-blocking window poll
#[derive(Debug, Clone, PartialEq)]
pub enum WindowPoll {
    /// Enough samples were buffered; the window holds exactly the requested count
    Ready(DataWindow),
    /// Not enough samples yet, retry on a later tick
    Pending {
        available: usize,
        required: usize,
    },
}

impl DataWindow {
    /// Create window from row-major data, every row must be equally long
    pub fn new(rows: Vec<Vec<f64>>) -> FocusResult<Self> {
        if let Some(first) = rows.first() {
            let expected = first.len();
            if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
                return Err(FocusError::InvalidArguments {
                    reason: format!(
                        "row {} has {} samples, expected {}",
                        idx,
                        row.len(),
                        expected
                    ),
                });
            }
        }

        Ok(DataWindow { rows })
    }

    /// Window with `num_rows` rows and no samples
    pub fn empty(num_rows: usize) -> Self {
        DataWindow {
            rows: vec![Vec::new(); num_rows],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of samples (columns)
    pub fn num_samples(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples() == 0
    }

    /// Samples of a single row
    pub fn row(&self, index: usize) -> FocusResult<&[f64]> {
        self.rows.get(index).map(|r| r.as_slice()).ok_or_else(|| {
            FocusError::InvalidArguments {
                reason: format!(
                    "row index {} out of bounds for window with {} rows",
                    index,
                    self.rows.len()
                ),
            }
        })
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Copy the given rows, in the order requested
    pub fn select_rows(&self, indices: &[usize]) -> FocusResult<Vec<Vec<f64>>> {
        indices.iter()
            .map(|&idx| self.row(idx).map(|r| r.to_vec()))
            .collect()
    }

    /// Replace one row, keeping the sample count unchanged
    pub fn replace_row(&mut self, index: usize, data: Vec<f64>) -> FocusResult<()> {
        let expected = self.num_samples();
        if data.len() != expected {
            return Err(FocusError::InvalidArguments {
                reason: format!("replacement row has {} samples, expected {}", data.len(), expected),
            });
        }
        let num_rows = self.rows.len();
        let row = self.rows.get_mut(index).ok_or_else(|| FocusError::InvalidArguments {
            reason: format!("row index {} out of bounds for window with {} rows", index, num_rows),
        })?;
        *row = data;
        Ok(())
    }

    pub fn into_rows(self) -> Vec<Vec<f64>> {
        self.rows
    }
}

impl WindowPoll {
    pub fn is_ready(&self) -> bool {
        matches!(self, WindowPoll::Ready(_))
    }

    pub fn into_window(self) -> Option<DataWindow> {
        match self {
            WindowPoll::Ready(window) => Some(window),
            WindowPoll::Pending { .. } => None,
        }
    }
}
