//! Microphone capture and speaker playback.
//!
//! Capture runs while the push-to-talk key is held, normalizes everything to
//! 16 kHz mono f32 (Whisper's expected format), and reports live RMS energy.
//! Playback streams decoded speech back out in fixed chunks, reporting energy
//! the same way so the UI can animate amplitude bars.

/// Sample rate the capture path normalizes to for Whisper.
pub const TARGET_RATE: u32 = 16_000;

mod capture;
mod dispatch;
mod meter;
mod playback;
mod recorder;
mod resample;

pub use capture::{capture_from_pcm, CaptureConfig, CaptureMetrics, CaptureResult, StopReason};
pub use meter::{rms_energy, LiveMeter};
pub use playback::{chunk_energies, load_wav, play, PcmAudio, PLAYBACK_CHUNK};
pub use recorder::Recorder;
pub use resample::resample;
