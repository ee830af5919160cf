use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared audio level readable from the UI thread without locking.
///
/// Stores the most recent RMS energy of one frame as f32 bits in an atomic.
/// Written by whichever audio loop is active (capture or playback) and read
/// by the renderer on every tick.
#[derive(Clone, Debug)]
pub struct LiveMeter {
    energy_bits: Arc<AtomicU32>,
}

impl LiveMeter {
    pub fn new() -> Self {
        Self {
            energy_bits: Arc::new(AtomicU32::new(0.0f32.to_bits())),
        }
    }

    pub fn set_energy(&self, energy: f32) {
        self.energy_bits
            .store(energy.max(0.0).to_bits(), Ordering::Relaxed);
    }

    pub fn energy(&self) -> f32 {
        f32::from_bits(self.energy_bits.load(Ordering::Relaxed))
    }

    /// Reset to silence, e.g. when a stream ends or is cancelled.
    pub fn clear(&self) {
        self.set_energy(0.0);
    }
}

impl Default for LiveMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Root-mean-square energy of one frame of normalized f32 samples.
///
/// Always non-negative; an empty frame reads as silence.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    mean_square.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_defaults_to_silence() {
        let meter = LiveMeter::new();
        assert_eq!(meter.energy(), 0.0);
    }

    #[test]
    fn meter_round_trips_energy() {
        let meter = LiveMeter::new();
        meter.set_energy(0.42);
        assert_eq!(meter.energy(), 0.42);
        meter.clear();
        assert_eq!(meter.energy(), 0.0);
    }

    #[test]
    fn meter_clamps_negative_input() {
        let meter = LiveMeter::new();
        meter.set_energy(-1.0);
        assert_eq!(meter.energy(), 0.0);
    }

    #[test]
    fn rms_of_empty_frame_is_zero() {
        assert_eq!(rms_energy(&[]), 0.0);
    }

    #[test]
    fn rms_of_constant_frame_is_its_magnitude() {
        let frame = vec![0.5f32; 256];
        let energy = rms_energy(&frame);
        assert!((energy - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rms_is_never_negative() {
        let frame = vec![-0.25f32; 64];
        assert!(rms_energy(&frame) >= 0.0);
    }
}
