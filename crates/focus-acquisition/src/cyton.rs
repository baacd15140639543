//! OpenBCI Cyton and Cyton+Daisy boards over a serial connection
//!
//! The board streams fixed 33-byte packets:
//!
//! | bytes  | content                                   |
//! |--------|-------------------------------------------|
//! | 0      | header `0xA0`                             |
//! | 1      | sample number                             |
//! | 2..26  | 8 × 24-bit big-endian signed EEG counts   |
//! | 26..32 | 3 × 16-bit big-endian signed aux counts   |
//! | 32     | footer `0xC0..=0xCF` (`0xC0`: aux = accel) |
//!
//! With a Daisy module attached, odd sample numbers carry channels 1-8 and
//! even sample numbers carry channels 9-16; one board sample is emitted per
//! odd/even pair.

use crate::board::{check_can_start, count_current, read_current, timestamp_now, Board, SampleSink};
use crate::buffer::DataBuffer;
use crate::streamer::StreamerSpec;
use focus_core::{invalid_arguments, BoardDescriptor, BoardId, DataWindow, FocusError, FocusResult, InputParams};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const CYTON_BAUD_RATE: u32 = 115_200;
pub const PACKET_SIZE: usize = 33;
pub const START_BYTE: u8 = 0xA0;
const ACCEL_FOOTER: u8 = 0xC0;

/// Microvolts per count at gain 24 and 4.5 V reference
pub const EEG_SCALE_UV: f64 = 4.5 / 24.0 / 8_388_607.0 * 1_000_000.0;
/// g per accelerometer count
pub const ACCEL_SCALE_G: f64 = 0.002 / 16.0;

const CMD_SOFT_RESET: &[u8] = b"v";
const CMD_START_STREAM: &[u8] = b"b";
const CMD_STOP_STREAM: &[u8] = b"s";

/// One decoded board packet
#[derive(Debug, Clone, PartialEq)]
pub struct CytonPacket {
    pub sample_number: u8,
    /// EEG values in microvolts
    pub eeg: [f64; 8],
    /// Accelerometer in g, only present on `0xC0` footers with non-zero aux data
    pub accel: Option<[f64; 3]>,
}

fn decode_i24(bytes: &[u8]) -> i32 {
    let raw = ((bytes[0] as i32) << 16) | ((bytes[1] as i32) << 8) | bytes[2] as i32;
    // sign-extend from bit 23
    (raw << 8) >> 8
}

fn decode_i16(bytes: &[u8]) -> i16 {
    i16::from_be_bytes([bytes[0], bytes[1]])
}

impl CytonPacket {
    /// Decode a single 33-byte packet
    pub fn parse(bytes: &[u8]) -> FocusResult<Self> {
        if bytes.len() != PACKET_SIZE {
            return Err(invalid_arguments!("packet has {} bytes, expected {}", bytes.len(), PACKET_SIZE));
        }
        if bytes[0] != START_BYTE {
            return Err(invalid_arguments!("bad packet header 0x{:02X}", bytes[0]));
        }
        let footer = bytes[PACKET_SIZE - 1];
        if !(0xC0..=0xCF).contains(&footer) {
            return Err(invalid_arguments!("bad packet footer 0x{:02X}", footer));
        }

        let mut eeg = [0.0; 8];
        for (channel, value) in eeg.iter_mut().enumerate() {
            let offset = 2 + channel * 3;
            *value = decode_i24(&bytes[offset..offset + 3]) as f64 * EEG_SCALE_UV;
        }

        let aux: Vec<i16> = (0..3).map(|axis| decode_i16(&bytes[26 + axis * 2..28 + axis * 2])).collect();
        // The firmware sends zeros between accelerometer updates
        let accel = if footer == ACCEL_FOOTER && aux.iter().any(|&v| v != 0) {
            Some([
                aux[0] as f64 * ACCEL_SCALE_G,
                aux[1] as f64 * ACCEL_SCALE_G,
                aux[2] as f64 * ACCEL_SCALE_G,
            ])
        } else {
            None
        };

        Ok(CytonPacket {
            sample_number: bytes[1],
            eeg,
            accel,
        })
    }
}

/// Reassembles packets from an arbitrary byte stream, resyncing on corruption
#[derive(Debug, Default)]
pub struct PacketReader {
    pending: Vec<u8>,
    discarded: u64,
}

impl PacketReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add received bytes and return every complete packet
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<CytonPacket> {
        self.pending.extend_from_slice(bytes);
        let mut packets = Vec::new();

        loop {
            match self.pending.iter().position(|&b| b == START_BYTE) {
                Some(0) => {}
                Some(start) => {
                    self.discarded += start as u64;
                    self.pending.drain(..start);
                }
                None => {
                    self.discarded += self.pending.len() as u64;
                    self.pending.clear();
                    break;
                }
            }

            if self.pending.len() < PACKET_SIZE {
                break;
            }

            match CytonPacket::parse(&self.pending[..PACKET_SIZE]) {
                Ok(packet) => {
                    packets.push(packet);
                    self.pending.drain(..PACKET_SIZE);
                }
                Err(_) => {
                    // Header byte inside payload data, skip it and resync
                    self.discarded += 1;
                    self.pending.drain(..1);
                }
            }
        }

        packets
    }

    /// Bytes dropped while resyncing
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }
}

/// Turns packets into full board samples in the descriptor's row layout
pub struct SampleDecoder {
    descriptor: BoardDescriptor,
    reader: PacketReader,
    daisy_pending: Option<CytonPacket>,
    last_accel: [f64; 3],
}

impl SampleDecoder {
    pub fn new(descriptor: BoardDescriptor) -> Self {
        SampleDecoder {
            descriptor,
            reader: PacketReader::new(),
            daisy_pending: None,
            last_accel: [0.0; 3],
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Vec<f64>> {
        let packets = self.reader.feed(bytes);
        let mut samples = Vec::with_capacity(packets.len());

        for packet in packets {
            if let Some(accel) = packet.accel {
                self.last_accel = accel;
            }

            match self.descriptor.board_id {
                BoardId::CytonDaisy => {
                    if packet.sample_number % 2 == 1 {
                        self.daisy_pending = Some(packet);
                    } else if let Some(board_packet) = self.daisy_pending.take() {
                        samples.push(self.build_sample(&board_packet, Some(&packet)));
                    }
                    // Daisy packet without its board half is dropped
                }
                _ => samples.push(self.build_sample(&packet, None)),
            }
        }

        samples
    }

    fn build_sample(&self, board: &CytonPacket, daisy: Option<&CytonPacket>) -> Vec<f64> {
        let mut sample = vec![0.0; self.descriptor.num_rows];
        sample[self.descriptor.package_num_channel] = board.sample_number as f64;

        let eeg_values = board.eeg.iter().chain(daisy.map(|d| d.eeg.iter()).into_iter().flatten());
        for (&row, &value) in self.descriptor.eeg_channels.iter().zip(eeg_values) {
            sample[row] = value;
        }
        for (&row, &value) in self.descriptor.accel_channels.iter().zip(self.last_accel.iter()) {
            sample[row] = value;
        }

        sample[self.descriptor.timestamp_channel] = timestamp_now();
        sample
    }
}

/// Serial reader running on its own thread
struct ReaderTask {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ReaderTask {
    fn spawn<R>(reader: R, decoder: SampleDecoder, sink: SampleSink) -> FocusResult<Self>
    where
        R: Read + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let task_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("cyton-reader".to_string())
            .spawn(move || read_loop(reader, decoder, sink, &task_stop))
            .map_err(|e| FocusError::RuntimeUnavailable {
                reason: format!("cannot spawn serial reader: {}", e),
            })?;
        Ok(ReaderTask { stop, handle })
    }

    /// Raise the stop flag and wait for the reader to flush and close its port handle.
    /// Returns within one read timeout.
    fn join(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            tracing::error!("Serial reader panicked");
        }
    }
}

/// Cyton or Cyton+Daisy attached to a serial port
pub struct CytonBoard {
    descriptor: BoardDescriptor,
    params: InputParams,
    port: Option<Box<dyn SerialPort>>,
    buffer: Option<Arc<Mutex<DataBuffer>>>,
    stream: Option<ReaderTask>,
}

impl CytonBoard {
    pub fn new(board_id: BoardId, params: InputParams) -> FocusResult<Self> {
        if !matches!(board_id, BoardId::Cyton | BoardId::CytonDaisy) {
            return Err(FocusError::UnsupportedBoard {
                board_id: board_id.as_i32(),
            });
        }

        Ok(CytonBoard {
            descriptor: board_id.descriptor(),
            params,
            port: None,
            buffer: None,
            stream: None,
        })
    }

    fn port_name(&self) -> FocusResult<&str> {
        self.params
            .serial_port
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| invalid_arguments!("{} requires a serial port", self.descriptor.name))
    }

    fn write_command(&mut self, command: &[u8]) -> FocusResult<()> {
        let port = self.port.as_mut().ok_or(FocusError::SessionNotPrepared)?;
        port.write_all(command)
            .and_then(|_| port.flush())
            .map_err(|e| FocusError::BoardWriteError {
                reason: e.to_string(),
            })
    }
}

impl Board for CytonBoard {
    fn descriptor(&self) -> &BoardDescriptor {
        &self.descriptor
    }

    fn prepare_session(&mut self) -> FocusResult<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let name = self.port_name()?.to_string();
        let port = serialport::new(&name, CYTON_BAUD_RATE)
            .timeout(Duration::from_millis(self.params.timeout_ms))
            .open()
            .map_err(|e| FocusError::UnableToOpenPort {
                port: name.clone(),
                reason: e.to_string(),
            })?;
        self.port = Some(port);

        if let Err(e) = self.write_command(CMD_SOFT_RESET) {
            self.port = None;
            return Err(e);
        }
        if let Some(port) = self.port.as_mut() {
            if let Err(e) = port.clear(ClearBuffer::Input) {
                tracing::debug!(error = %e, "Could not clear serial input after reset");
            }
        }

        tracing::info!(board = %self.descriptor.board_id, port = %name, "Session prepared");
        Ok(())
    }

    fn start_stream(&mut self, buffer_size: usize, streamer: Option<StreamerSpec>) -> FocusResult<()> {
        check_can_start(self.port.is_some(), self.stream.is_some(), buffer_size)?;

        let reader = self.port
            .as_ref()
            .ok_or(FocusError::SessionNotPrepared)?
            .try_clone()
            .map_err(|e| FocusError::UnableToOpenPort {
                port: self.params.serial_port.clone().unwrap_or_default(),
                reason: e.to_string(),
            })?;

        let sink = SampleSink::open(&self.descriptor, buffer_size, streamer)?;
        let buffer = sink.buffer();
        let task = ReaderTask::spawn(reader, SampleDecoder::new(self.descriptor.clone()), sink)?;

        if let Err(e) = self.write_command(CMD_START_STREAM) {
            task.join();
            return Err(e);
        }
        self.buffer = Some(buffer);
        self.stream = Some(task);

        tracing::info!(board = %self.descriptor.board_id, buffer_size, "Serial stream started");
        Ok(())
    }

    fn stop_stream(&mut self) -> FocusResult<()> {
        let task = self.stream.take().ok_or(FocusError::StreamNotRunning)?;
        task.join();

        self.write_command(CMD_STOP_STREAM)?;
        tracing::info!(board = %self.descriptor.board_id, "Serial stream stopped");
        Ok(())
    }

    fn release_session(&mut self) -> FocusResult<()> {
        if self.port.is_none() {
            return Ok(());
        }

        let stopped = if self.stream.is_some() {
            self.stop_stream()
        } else {
            Ok(())
        };

        self.port = None;
        self.buffer = None;
        tracing::info!(board = %self.descriptor.board_id, "Session released");
        stopped
    }

    fn current_board_data(&self, num_samples: usize) -> FocusResult<DataWindow> {
        read_current(self.buffer.as_ref(), &self.descriptor, self.port.is_some(), num_samples)
    }

    fn board_data_count(&self) -> FocusResult<usize> {
        count_current(self.buffer.as_ref(), self.port.is_some())
    }

    fn is_prepared(&self) -> bool {
        self.port.is_some()
    }

    fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CytonBoard {
    fn drop(&mut self) {
        if let Err(e) = self.release_session() {
            tracing::warn!(error = %e, "Releasing serial board on drop failed");
        }
    }
}

/// Blocking serial reader, runs until the stop flag is raised or the port fails
fn read_loop<R: Read>(mut port: R, mut decoder: SampleDecoder, mut sink: SampleSink, stop: &AtomicBool) {
    let mut chunk = [0u8; 512];

    'stream: while !stop.load(Ordering::Acquire) {
        match port.read(&mut chunk) {
            Ok(0) => continue,
            Ok(n) => {
                for sample in decoder.feed(&chunk[..n]) {
                    if let Err(e) = sink.push(&sample) {
                        tracing::error!(error = %e, "Serial producer failed");
                        break 'stream;
                    }
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                continue
            }
            Err(e) => {
                tracing::error!(error = %e, "Serial read failed, stream halted");
                break;
            }
        }
    }

    tracing::debug!(discarded = decoder.reader.discarded_bytes(), "Serial reader exiting");
    sink.finish();
}
