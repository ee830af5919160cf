//! Push-to-talk capture loop state.
//!
//! Tracks elapsed recording time against the configured hard cap and
//! accumulates normalized frames. The loop itself is device-free so tests can
//! drive it with synthetic PCM; the live path in [`super::Recorder`] feeds it
//! from a cpal stream.

/// Tunable parameters for one capture run.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Rate the captured audio is normalized to (Whisper wants 16 kHz).
    pub sample_rate: u32,
    /// Frame duration pulled from the dispatcher per loop iteration.
    pub frame_ms: u64,
    /// Hard cap on recording length; hitting it behaves like a key release.
    pub max_capture_ms: u64,
    /// Capacity of the callback-to-loop frame channel.
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: super::TARGET_RATE,
            frame_ms: 64,
            max_capture_ms: 120_000,
            channel_capacity: 64,
        }
    }
}

impl CaptureConfig {
    pub fn frame_samples(&self) -> usize {
        ((u64::from(self.sample_rate) * self.frame_ms) / 1000).max(1) as usize
    }
}

/// Why a capture run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The push-to-talk key was released.
    KeyReleased,
    /// The configured duration cap fired while the key was still held.
    MaxDuration,
    Error(String),
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::KeyReleased => "key_released",
            StopReason::MaxDuration => "max_duration",
            StopReason::Error(_) => "error",
        }
    }
}

/// Counters for one capture run, logged after every turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureMetrics {
    pub capture_ms: u64,
    pub frames_processed: usize,
    pub frames_dropped: usize,
    pub stop_reason: StopReason,
}

impl Default for CaptureMetrics {
    fn default() -> Self {
        Self {
            capture_ms: 0,
            frames_processed: 0,
            frames_dropped: 0,
            stop_reason: StopReason::KeyReleased,
        }
    }
}

/// Mono 16 kHz PCM plus metrics for the finished capture.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub audio: Vec<f32>,
    pub metrics: CaptureMetrics,
}

/// Tracks elapsed time and enforces the duration cap.
pub(super) struct CaptureClock {
    frame_ms: u64,
    max_capture_ms: u64,
    total_ms: u64,
}

impl CaptureClock {
    pub(super) fn new(cfg: &CaptureConfig) -> Self {
        Self {
            frame_ms: cfg.frame_ms.max(1),
            max_capture_ms: cfg.max_capture_ms.max(1),
            total_ms: 0,
        }
    }

    /// Advance by one frame interval; `Some` when the cap fires.
    pub(super) fn on_frame(&mut self) -> Option<StopReason> {
        self.total_ms = self.total_ms.saturating_add(self.frame_ms);
        if self.total_ms >= self.max_capture_ms {
            Some(StopReason::MaxDuration)
        } else {
            None
        }
    }

    pub(super) fn total_ms(&self) -> u64 {
        self.total_ms
    }
}

/// Run the capture loop against synthetic PCM instead of a live device.
///
/// `held_ms` stands in for how long the key stays down: frames arriving after
/// that point are treated as following the release. Used by tests to check the
/// duration/sample-count relationship without microphones.
pub fn capture_from_pcm(samples: &[f32], cfg: &CaptureConfig, held_ms: u64) -> CaptureResult {
    let frame_samples = cfg.frame_samples();
    let mut clock = CaptureClock::new(cfg);
    let mut metrics = CaptureMetrics::default();
    let mut audio = Vec::new();

    for chunk in samples.chunks(frame_samples) {
        if clock.total_ms() >= held_ms {
            metrics.stop_reason = StopReason::KeyReleased;
            break;
        }
        let mut frame = chunk.to_vec();
        frame.resize(frame_samples, 0.0);
        audio.extend_from_slice(&frame);
        metrics.frames_processed += 1;
        if let Some(reason) = clock.on_frame() {
            metrics.stop_reason = reason;
            break;
        }
    }

    metrics.capture_ms = clock.total_ms();
    CaptureResult { audio, metrics }
}
