//! CSV capture of streamed samples
//!
//! A streamer is described as `file://<path>:<mode>` where mode is `w`
//! (truncate) or `a` (append). Each sample becomes one CSV record holding
//! every board row.

use focus_core::{invalid_arguments, FocusError, FocusResult};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const FILE_PREFIX: &str = "file://";

/// How the capture file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamerMode {
    /// Truncate existing file
    Write,
    /// Append to existing file
    Append,
}

/// Parsed streamer destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamerSpec {
    pub path: PathBuf,
    pub mode: StreamerMode,
}

impl StreamerSpec {
    /// Parse a `file://<path>:<mode>` description
    pub fn parse(description: &str) -> FocusResult<Self> {
        let rest = description.strip_prefix(FILE_PREFIX).ok_or_else(|| {
            invalid_arguments!("unsupported streamer '{}', expected {}<path>:<mode>", description, FILE_PREFIX)
        })?;

        let (path, mode) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid_arguments!("streamer '{}' is missing a mode", description))?;

        let mode = match mode {
            "w" => StreamerMode::Write,
            "a" => StreamerMode::Append,
            other => {
                return Err(invalid_arguments!("unknown streamer mode '{}', expected 'w' or 'a'", other))
            }
        };

        if path.is_empty() {
            return Err(invalid_arguments!("streamer '{}' has an empty path", description));
        }

        Ok(StreamerSpec {
            path: PathBuf::from(path),
            mode,
        })
    }

    /// Open the capture file
    pub fn open(&self) -> FocusResult<CsvStreamer> {
        CsvStreamer::create(&self.path, self.mode)
    }
}

impl FromStr for StreamerSpec {
    type Err = FocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamerSpec::parse(s)
    }
}

/// Writes samples to a CSV capture file
pub struct CsvStreamer {
    writer: csv::Writer<File>,
    path: PathBuf,
    records: u64,
}

impl CsvStreamer {
    pub fn create(path: &Path, mode: StreamerMode) -> FocusResult<Self> {
        let mut options = OpenOptions::new();
        match mode {
            StreamerMode::Write => options.write(true).create(true).truncate(true),
            StreamerMode::Append => options.append(true).create(true),
        };

        let file = options.open(path).map_err(|e| FocusError::StreamerError {
            reason: format!("cannot open {}: {}", path.display(), e),
        })?;

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(false)
            .from_writer(file);

        Ok(CsvStreamer {
            writer,
            path: path.to_path_buf(),
            records: 0,
        })
    }

    /// Append one sample as a CSV record
    pub fn write_sample(&mut self, sample: &[f64]) -> FocusResult<()> {
        self.writer
            .write_record(sample.iter().map(|v| v.to_string()))
            .map_err(|e| FocusError::StreamerError {
                reason: format!("cannot write to {}: {}", self.path.display(), e),
            })?;
        self.records += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> FocusResult<()> {
        self.writer.flush().map_err(|e| FocusError::StreamerError {
            reason: format!("cannot flush {}: {}", self.path.display(), e),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records_written(&self) -> u64 {
        self.records
    }
}
