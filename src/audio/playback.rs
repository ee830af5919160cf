//! Chunked PCM playback with live energy reporting.
//!
//! Synthesized speech is decoded to mono f32, resampled to the output device
//! rate, and fed to a cpal output stream in fixed chunks. Each chunk's RMS
//! energy is published to the shared meter so the UI can draw amplitude bars
//! while the assistant talks.

use super::meter::{rms_energy, LiveMeter};
use super::resample::resample;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::bounded;
use hound::SampleFormat as WavFormat;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Samples per playback chunk; one energy value is emitted per chunk.
pub const PLAYBACK_CHUNK: usize = 1_024;

/// Decoded audio ready for the output device.
#[derive(Debug, Clone)]
pub struct PcmAudio {
    /// Mono samples normalized to [-1, 1].
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode a WAV file to normalized mono f32.
///
/// Handles 16-bit integer and 32-bit float payloads; multi-channel files are
/// downmixed by averaging.
pub fn load_wav(path: &Path) -> Result<PcmAudio> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (WavFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("malformed float WAV payload")?,
        (WavFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32_768.0))
            .collect::<std::result::Result<_, _>>()
            .context("malformed 16-bit WAV payload")?,
        (format, bits) => {
            return Err(anyhow!(
                "unsupported WAV encoding: {format:?} at {bits} bits per sample"
            ))
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    if samples.is_empty() {
        return Err(anyhow!("WAV file {} contains no samples", path.display()));
    }

    Ok(PcmAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Per-chunk RMS energies for a sample buffer; pure helper shared by the
/// playback loop and its tests.
pub fn chunk_energies(samples: &[f32], chunk: usize) -> Vec<f32> {
    samples
        .chunks(chunk.max(1))
        .map(rms_energy)
        .collect()
}

/// Play `audio` on the default output device, publishing per-chunk energy to
/// `meter`. Returns once the buffer is drained or `cancel` is raised.
pub fn play(audio: &PcmAudio, meter: &LiveMeter, cancel: &AtomicBool) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no default output device available")?;
    let default_config = device.default_output_config()?;
    let format = default_config.sample_format();
    let device_config: StreamConfig = default_config.into();
    let device_rate = device_config.sample_rate.0;
    let channels = usize::from(device_config.channels.max(1));

    let samples = if audio.sample_rate == device_rate {
        audio.samples.clone()
    } else {
        resample(&audio.samples, audio.sample_rate, device_rate)
    };
    let total = samples.len();

    let (sender, receiver) = bounded::<Vec<f32>>(4);
    let consumed = Arc::new(AtomicUsize::new(0));

    // The callback pulls mono chunks and duplicates each sample across the
    // device's channels; silence once the producer is done.
    let mut pending: VecDeque<f32> = VecDeque::new();
    let consumed_cb = consumed.clone();
    let mut next_sample = move || -> f32 {
        if pending.is_empty() {
            if let Ok(chunk) = receiver.try_recv() {
                pending.extend(chunk);
            }
        }
        match pending.pop_front() {
            Some(sample) => {
                consumed_cb.fetch_add(1, Ordering::Relaxed);
                sample
            }
            None => 0.0,
        }
    };

    let err_fn = |err| tracing::warn!("audio stream error: {err}");
    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &device_config,
            move |data: &mut [f32], _| {
                for frame in data.chunks_mut(channels) {
                    let sample = next_sample();
                    frame.fill(sample);
                }
            },
            err_fn,
            None,
        )?,
        SampleFormat::I16 => device.build_output_stream(
            &device_config,
            move |data: &mut [i16], _| {
                for frame in data.chunks_mut(channels) {
                    let sample = (next_sample().clamp(-1.0, 1.0) * 32_767.0) as i16;
                    frame.fill(sample);
                }
            },
            err_fn,
            None,
        )?,
        other => return Err(anyhow!("unsupported output sample format: {other:?}")),
    };

    stream.play()?;

    let energies = chunk_energies(&samples, PLAYBACK_CHUNK);
    for (chunk, energy) in samples.chunks(PLAYBACK_CHUNK).zip(energies) {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        meter.set_energy(energy);
        // Bounded send paces the producer roughly at playback speed.
        if sender.send(chunk.to_vec()).is_err() {
            break;
        }
    }
    drop(sender);

    // Wait for the callback to drain what was queued.
    let poll = Duration::from_millis(20);
    while !cancel.load(Ordering::Relaxed) && consumed.load(Ordering::Relaxed) < total {
        std::thread::sleep(poll);
    }

    if let Err(err) = stream.pause() {
        tracing::warn!("failed to pause playback stream: {err}");
    }
    drop(stream);
    meter.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn chunk_energies_are_non_negative_and_cover_all_samples() {
        let samples: Vec<f32> = (0..4_000)
            .map(|i| (i as f32 * 0.01).sin() * 0.8)
            .collect();
        let energies = chunk_energies(&samples, PLAYBACK_CHUNK);
        assert_eq!(energies.len(), samples.len().div_ceil(PLAYBACK_CHUNK));
        assert!(!energies.is_empty());
        assert!(energies.iter().all(|e| *e >= 0.0));
    }

    #[test]
    fn chunk_energies_of_silence_are_zero() {
        let energies = chunk_energies(&[0.0f32; 2_048], PLAYBACK_CHUNK);
        assert!(energies.iter().all(|e| *e == 0.0));
    }

    #[test]
    fn load_wav_decodes_i16_mono() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: WavFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create WAV");
        for i in 0..2_205 {
            let sample = ((i as f32 * 0.05).sin() * 16_384.0) as i16;
            writer.write_sample(sample).expect("write sample");
        }
        writer.finalize().expect("finalize WAV");

        let audio = load_wav(&path).expect("decode WAV");
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.samples.len(), 2_205);
        assert!(audio.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn load_wav_downmixes_stereo() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: WavFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).expect("create WAV");
        for _ in 0..100 {
            writer.write_sample(16_384i16).expect("left");
            writer.write_sample(0i16).expect("right");
        }
        writer.finalize().expect("finalize WAV");

        let audio = load_wav(&path).expect("decode WAV");
        assert_eq!(audio.samples.len(), 100);
        assert!((audio.samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn load_wav_rejects_garbage() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("not_audio.wav");
        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(b"definitely not RIFF"))
            .expect("write garbage");
        assert!(load_wav(&path).is_err());
    }
}
