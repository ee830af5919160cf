//! System microphone recording via CPAL.
//!
//! Handles device enumeration, format conversion, and sample rate
//! normalization. Capture runs while a caller-supplied hold gate reports the
//! push-to-talk key as held; everything is converted to 16 kHz mono f32 PCM
//! for Whisper.

use super::capture::{CaptureClock, CaptureConfig, CaptureMetrics, CaptureResult, StopReason};
use super::dispatch::FrameDispatcher;
use super::meter::{rms_energy, LiveMeter};
use super::resample::convert_frame_to_target;
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Audio input device wrapper.
pub struct Recorder {
    device: cpal::Device,
}

impl Recorder {
    /// List microphone names so the CLI can expose a selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Create a recorder, optionally forcing a specific device so users can
    /// pick the right microphone when several inputs exist.
    pub fn new(preferred_device: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        Ok(Self { device })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "unknown input device".to_string())
    }

    /// Open and immediately close an input stream config query to confirm the
    /// device is usable before the UI starts.
    pub fn probe(&self) -> Result<()> {
        self.device
            .default_input_config()
            .map(|_| ())
            .with_context(|| {
                format!(
                    "input device '{}' rejected its default configuration. {}",
                    self.device_name(),
                    mic_permission_hint()
                )
            })
    }

    /// Record while `hold` returns true, capped at `cfg.max_capture_ms`.
    ///
    /// `hold` is polled once per frame interval; it is where the caller pumps
    /// input events and redraws the recording screen. Frames are normalized to
    /// `cfg.sample_rate` mono f32 and their RMS energy is published to `meter`.
    pub fn record_while<F>(
        &self,
        cfg: &CaptureConfig,
        mut hold: F,
        meter: Option<&LiveMeter>,
    ) -> Result<CaptureResult>
    where
        F: FnMut() -> bool,
    {
        let default_config = self.device.default_input_config()?;
        let format = default_config.sample_format();
        let device_config: StreamConfig = default_config.into();
        let device_sample_rate = device_config.sample_rate.0;
        let channels = usize::from(device_config.channels.max(1));
        let frame_ms = cfg.frame_ms.clamp(5, 120);
        let device_frame_samples =
            ((u64::from(device_sample_rate) * frame_ms) / 1000).max(1) as usize;
        let target_frame_samples = ((u64::from(cfg.sample_rate) * frame_ms) / 1000).max(1) as usize;

        tracing::debug!(
            ?format,
            device_sample_rate,
            channels,
            frame_ms,
            "opening capture stream"
        );

        let (sender, receiver) = bounded::<Vec<f32>>(cfg.channel_capacity.max(1));
        let dropped = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(Mutex::new(FrameDispatcher::new(
            device_frame_samples,
            sender,
            dropped.clone(),
        )));

        let err_fn = |err| tracing::warn!("audio stream error: {err}");
        let stream = match format {
            SampleFormat::F32 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::I16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample as f32 / 32_768.0);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let dispatcher = dispatcher.clone();
                let dropped = dropped.clone();
                self.device.build_input_stream(
                    &device_config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| {
                                (sample as f32 - 32_768.0) / 32_768.0
                            });
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };

        stream.play()?;

        let mut clock = CaptureClock::new(cfg);
        let mut metrics = CaptureMetrics::default();
        let mut audio = Vec::new();
        let mut stop_reason = StopReason::KeyReleased;
        let wait_time = Duration::from_millis(frame_ms);

        loop {
            if !hold() {
                stop_reason = StopReason::KeyReleased;
                break;
            }
            match receiver.recv_timeout(wait_time) {
                Ok(frame) => {
                    let target_frame = convert_frame_to_target(
                        frame,
                        device_sample_rate,
                        cfg.sample_rate,
                        target_frame_samples,
                    );
                    if target_frame.is_empty() {
                        continue;
                    }
                    if let Some(meter) = meter {
                        meter.set_energy(rms_energy(&target_frame));
                    }
                    audio.extend_from_slice(&target_frame);
                    metrics.frames_processed += 1;
                    if let Some(reason) = clock.on_frame() {
                        stop_reason = reason;
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if let Some(reason) = clock.on_frame() {
                        stop_reason = reason;
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    stop_reason = StopReason::Error("audio stream disconnected".to_string());
                    break;
                }
            }
        }

        if let Err(err) = stream.pause() {
            tracing::warn!("failed to pause capture stream: {err}");
        }
        drop(stream);
        if let Some(meter) = meter {
            meter.clear();
        }

        metrics.capture_ms = clock.total_ms();
        metrics.frames_dropped = dropped.load(Ordering::Relaxed);
        metrics.stop_reason = stop_reason;

        tracing::debug!(
            capture_ms = metrics.capture_ms,
            frames_processed = metrics.frames_processed,
            frames_dropped = metrics.frames_dropped,
            stop = metrics.stop_reason.label(),
            "capture finished"
        );

        if audio.is_empty() && matches!(metrics.stop_reason, StopReason::Error(_)) {
            return Err(anyhow!(
                "no samples captured from '{}'; check microphone permissions and availability. {}",
                self.device_name(),
                mic_permission_hint()
            ));
        }

        Ok(CaptureResult { audio, metrics })
    }
}

fn mic_permission_hint() -> &'static str {
    #[cfg(target_os = "macos")]
    {
        "macOS: System Settings > Privacy & Security > Microphone (enable your terminal)."
    }
    #[cfg(target_os = "linux")]
    {
        "Linux: check PipeWire/PulseAudio permissions and ensure the device is not muted."
    }
    #[cfg(target_os = "windows")]
    {
        "Windows: Settings > Privacy & Security > Microphone (allow access for your terminal)."
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        "Check OS microphone permissions."
    }
}
