//! Synthetic EEG board with alternating relaxed/engaged rhythms

use crate::board::{check_can_start, count_current, read_current, timestamp_now, Board, SampleSink};
use crate::buffer::DataBuffer;
use crate::streamer::StreamerSpec;
use focus_core::{invalid_arguments, BoardDescriptor, BoardId, DataWindow, FocusError, FocusResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

/// Amplitudes in microvolts
const ALPHA_AMPLITUDE_UV: f64 = 20.0;
const BETA_AMPLITUDE_UV: f64 = 12.0;
const THETA_AMPLITUDE_UV: f64 = 6.0;
const DRIFT_AMPLITUDE_UV: f64 = 3.0;
const NOISE_STD_UV: f64 = 2.0;
const ACCEL_NOISE_STD_G: f64 = 0.01;

/// Period of the slow relaxed -> engaged -> relaxed cycle
const ENGAGEMENT_CYCLE_HZ: f64 = 1.0 / 60.0;

const TICK_PERIOD: Duration = Duration::from_millis(20);

/// Deterministic (when seeded) sample generator in the synthetic board layout
pub struct SyntheticGenerator {
    descriptor: BoardDescriptor,
    rng: StdRng,
    noise: Normal<f64>,
    accel_noise: Normal<f64>,
    sample_index: u64,
}

impl SyntheticGenerator {
    pub fn new(descriptor: BoardDescriptor, seed: Option<u64>) -> FocusResult<Self> {
        let seed = seed.unwrap_or_else(rand::random);
        let noise = Normal::new(0.0, NOISE_STD_UV)
            .map_err(|e| invalid_arguments!("invalid noise distribution: {}", e))?;
        let accel_noise = Normal::new(0.0, ACCEL_NOISE_STD_G)
            .map_err(|e| invalid_arguments!("invalid accelerometer noise distribution: {}", e))?;

        Ok(SyntheticGenerator {
            descriptor,
            rng: StdRng::seed_from_u64(seed),
            noise,
            accel_noise,
            sample_index: 0,
        })
    }

    pub fn sampling_rate(&self) -> usize {
        self.descriptor.sampling_rate
    }

    /// Engagement level in [0, 1] at time `t` seconds
    pub fn engagement_at(t: f64) -> f64 {
        0.5 - 0.5 * (2.0 * PI * ENGAGEMENT_CYCLE_HZ * t).cos()
    }

    /// Produce the next sample column
    pub fn next_sample(&mut self) -> Vec<f64> {
        let t = self.sample_index as f64 / self.descriptor.sampling_rate as f64;
        let engagement = Self::engagement_at(t);
        let mut sample = vec![0.0; self.descriptor.num_rows];

        sample[self.descriptor.package_num_channel] = (self.sample_index % 256) as f64;

        for (idx, &row) in self.descriptor.eeg_channels.iter().enumerate() {
            // Slight per-channel phase and gain differences
            let phase = idx as f64 * 0.3;
            let gain = 1.0 + 0.05 * idx as f64;

            let alpha = ALPHA_AMPLITUDE_UV * (1.0 - engagement) * (2.0 * PI * 10.0 * t + phase).sin();
            let beta = BETA_AMPLITUDE_UV * engagement * (2.0 * PI * 20.0 * t + phase).sin();
            let theta = THETA_AMPLITUDE_UV * (2.0 * PI * 6.0 * t + 2.0 * phase).sin();
            let drift = DRIFT_AMPLITUDE_UV * (2.0 * PI * 0.1 * t).sin();

            sample[row] = gain * (alpha + beta + theta) + drift + self.noise.sample(&mut self.rng);
        }

        // Board lying flat: 1 g on the z axis
        for (axis, &row) in self.descriptor.accel_channels.iter().enumerate() {
            let gravity = if axis == 2 { 1.0 } else { 0.0 };
            sample[row] = gravity + self.accel_noise.sample(&mut self.rng);
        }

        sample[self.descriptor.timestamp_channel] = timestamp_now();
        self.sample_index += 1;
        sample
    }

    /// Produce `count` consecutive samples
    pub fn generate(&mut self, count: usize) -> Vec<Vec<f64>> {
        (0..count).map(|_| self.next_sample()).collect()
    }

    /// Restart the signal timeline at zero
    pub fn reset_time(&mut self) {
        self.sample_index = 0;
    }
}

/// Sink shared with the producer; `None` once the stream is over
type SharedSink = Arc<Mutex<Option<SampleSink>>>;

struct StreamTask {
    sink: SharedSink,
    handle: JoinHandle<()>,
}

impl StreamTask {
    /// End the producer and flush the capture file; nothing is written afterwards
    fn shutdown(self) {
        let sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner).take();
        self.handle.abort();
        if let Some(sink) = sink {
            sink.finish();
        }
    }
}

/// Board producing synthetic EEG in the background at its nominal rate
pub struct SyntheticBoard {
    descriptor: BoardDescriptor,
    seed: Option<u64>,
    prepared: bool,
    buffer: Option<Arc<Mutex<DataBuffer>>>,
    stream: Option<StreamTask>,
}

impl SyntheticBoard {
    pub fn new(seed: Option<u64>) -> Self {
        SyntheticBoard {
            descriptor: BoardId::Synthetic.descriptor(),
            seed,
            prepared: false,
            buffer: None,
            stream: None,
        }
    }
}

impl Board for SyntheticBoard {
    fn descriptor(&self) -> &BoardDescriptor {
        &self.descriptor
    }

    fn prepare_session(&mut self) -> FocusResult<()> {
        if !self.prepared {
            self.prepared = true;
            tracing::info!(board = %self.descriptor.board_id, "Session prepared");
        }
        Ok(())
    }

    fn start_stream(&mut self, buffer_size: usize, streamer: Option<StreamerSpec>) -> FocusResult<()> {
        check_can_start(self.prepared, self.stream.is_some(), buffer_size)?;

        let runtime = Handle::try_current().map_err(|e| FocusError::RuntimeUnavailable {
            reason: e.to_string(),
        })?;

        let generator = SyntheticGenerator::new(self.descriptor.clone(), self.seed)?;
        let sink = SampleSink::open(&self.descriptor, buffer_size, streamer)?;
        self.buffer = Some(sink.buffer());

        let sink: SharedSink = Arc::new(Mutex::new(Some(sink)));
        let handle = runtime.spawn(run_generator(generator, Arc::clone(&sink)));
        self.stream = Some(StreamTask { sink, handle });

        tracing::info!(
            board = %self.descriptor.board_id,
            buffer_size,
            sampling_rate = self.descriptor.sampling_rate,
            "Synthetic stream started"
        );
        Ok(())
    }

    fn stop_stream(&mut self) -> FocusResult<()> {
        let task = self.stream.take().ok_or(FocusError::StreamNotRunning)?;
        if task.handle.is_finished() {
            tracing::debug!("Synthetic producer had already exited");
        }
        task.shutdown();
        tracing::info!(board = %self.descriptor.board_id, "Synthetic stream stopped");
        Ok(())
    }

    fn release_session(&mut self) -> FocusResult<()> {
        if !self.prepared {
            return Ok(());
        }
        if self.stream.is_some() {
            self.stop_stream()?;
        }
        self.prepared = false;
        self.buffer = None;
        tracing::info!(board = %self.descriptor.board_id, "Session released");
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
        self.stream.is_some()
    }
}

impl Drop for SyntheticBoard {
    fn drop(&mut self) {
        if let Some(task) = self.stream.take() {
            task.shutdown();
        }
    }
}

/// Emit samples paced by wall clock until the sink is taken away
async fn run_generator(mut generator: SyntheticGenerator, sink: SharedSink) {
    let rate = generator.sampling_rate() as f64;
    let mut ticker = interval(TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let started = Instant::now();
    let mut produced: u64 = 0;

    loop {
        ticker.tick().await;
        let due = (started.elapsed().as_secs_f64() * rate) as u64;
        if !produce_due(&mut generator, &sink, &mut produced, due) {
            break;
        }
    }

    tracing::debug!(produced, "Synthetic producer exiting");
}

/// Push samples until `produced == due`; false once the stream is over
fn produce_due(generator: &mut SyntheticGenerator, sink: &SharedSink, produced: &mut u64, due: u64) -> bool {
    let mut slot = sink.lock().unwrap_or_else(PoisonError::into_inner);
    let Some(active) = slot.as_mut() else {
        return false;
    };

    while *produced < due {
        let sample = generator.next_sample();
        if let Err(e) = active.push(&sample) {
            tracing::error!(error = %e, "Synthetic producer failed");
            if let Some(failed) = slot.take() {
                failed.finish();
            }
            return false;
        }
        *produced += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn eeg_rows(sample: &[f64], descriptor: &BoardDescriptor) -> Vec<f64> {
        descriptor.eeg_channels.iter().map(|&row| sample[row]).collect()
    }

    #[test]
    fn test_generator_layout() {
        let descriptor = BoardId::Synthetic.descriptor();
        let mut generator = SyntheticGenerator::new(descriptor.clone(), Some(42)).unwrap();

        let samples = generator.generate(300);
        assert_eq!(samples.len(), 300);

        for (idx, sample) in samples.iter().enumerate() {
            assert_eq!(sample.len(), descriptor.num_rows);
            assert_eq!(sample[descriptor.package_num_channel], (idx % 256) as f64);
            assert!(sample[descriptor.timestamp_channel] > 0.0);
            assert!((sample[descriptor.accel_channels[2]] - 1.0).abs() < 0.1);
            for value in eeg_rows(sample, &descriptor) {
                assert!(value.is_finite());
                assert!(value.abs() < 100.0);
            }
        }
    }

    #[test]
    fn test_seeded_generators_match() {
        let descriptor = BoardId::Synthetic.descriptor();
        let mut first = SyntheticGenerator::new(descriptor.clone(), Some(7)).unwrap();
        let mut second = SyntheticGenerator::new(descriptor.clone(), Some(7)).unwrap();

        for _ in 0..50 {
            let a = first.next_sample();
            let b = second.next_sample();
            assert_eq!(eeg_rows(&a, &descriptor), eeg_rows(&b, &descriptor));
        }

        first.reset_time();
        assert_eq!(first.next_sample()[descriptor.package_num_channel], 0.0);
    }

    #[test]
    fn test_engagement_cycle() {
        assert!(SyntheticGenerator::engagement_at(0.0).abs() < 1e-12);
        assert!((SyntheticGenerator::engagement_at(30.0) - 1.0).abs() < 1e-12);
        for t in [1.0, 12.5, 44.0, 59.0] {
            let level = SyntheticGenerator::engagement_at(t);
            assert!((0.0..=1.0).contains(&level));
        }
    }

    #[test]
    fn test_start_requires_prepare() {
        let mut board = SyntheticBoard::new(Some(1));
        assert_eq!(board.start_stream(1000, None), Err(FocusError::SessionNotPrepared));
        assert_eq!(board.current_board_data(10), Err(FocusError::SessionNotPrepared));
    }

    #[test]
    fn test_start_without_runtime() {
        let mut board = SyntheticBoard::new(Some(1));
        board.prepare_session().unwrap();
        let result = board.start_stream(1000, None);
        assert!(matches!(result, Err(FocusError::RuntimeUnavailable { .. })));
        assert!(!board.is_streaming());
    }

    #[tokio::test]
    async fn test_stream_lifecycle() {
        let mut board = SyntheticBoard::new(Some(3));
        board.prepare_session().unwrap();
        board.start_stream(10_000, None).unwrap();
        assert_eq!(board.start_stream(10_000, None), Err(FocusError::StreamAlreadyRunning));

        sleep(Duration::from_millis(300)).await;

        let count = board.board_data_count().unwrap();
        assert!(count > 0, "synthetic board produced no samples");

        let window = board.current_board_data(10).unwrap();
        assert_eq!(window.num_rows(), 32);
        assert_eq!(window.num_samples(), count.min(10));

        board.stop_stream().unwrap();
        assert_eq!(board.stop_stream(), Err(FocusError::StreamNotRunning));

        board.release_session().unwrap();
        assert!(!board.is_prepared());
        board.release_session().unwrap();
    }

    fn capture_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_flushes_capture_file() {
        let path = std::env::temp_dir().join(format!("focus-synthetic-{}.csv", uuid::Uuid::new_v4()));
        let streamer = StreamerSpec::parse(&format!("file://{}:w", path.display())).unwrap();

        let mut board = SyntheticBoard::new(Some(5));
        board.prepare_session().unwrap();
        board.start_stream(10_000, Some(streamer)).unwrap();
        sleep(Duration::from_millis(400)).await;

        let buffered = board.board_data_count().unwrap();
        assert!(buffered > 0);
        board.release_session().unwrap();

        // Complete as soon as release returns
        let lines = capture_lines(&path);
        assert!(lines.len() >= buffered, "{} lines for {} buffered samples", lines.len(), buffered);
        assert_eq!(lines[0].split(',').count(), 32);

        // and nothing is appended afterwards
        sleep(Duration::from_millis(100)).await;
        assert_eq!(capture_lines(&path).len(), lines.len());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_restart_truncates_capture_file() {
        let path = std::env::temp_dir().join(format!("focus-synthetic-{}.csv", uuid::Uuid::new_v4()));
        let streamer = StreamerSpec::parse(&format!("file://{}:w", path.display())).unwrap();

        let mut board = SyntheticBoard::new(Some(6));
        board.prepare_session().unwrap();
        board.start_stream(10_000, Some(streamer.clone())).unwrap();
        sleep(Duration::from_millis(200)).await;
        board.stop_stream().unwrap();

        board.start_stream(10_000, Some(streamer)).unwrap();
        board.stop_stream().unwrap();
        sleep(Duration::from_millis(100)).await;

        // The second stream stopped before its first tick wrote anything
        assert!(capture_lines(&path).len() <= 1);

        board.release_session().unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
