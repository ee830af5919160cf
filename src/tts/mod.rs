//! Speech synthesis with an explicit fallback path.
//!
//! Two interchangeable backends implement [`SynthEngine`]: an HTTP synthesis
//! service and an offline subprocess engine. The configured primary is tried
//! first; on failure the driver invokes the fallback with the identical text,
//! accepting the different voice as a degradation rather than aborting the
//! turn. Synthesis targets a temp WAV file that is removed on every path.
//!
//! Playback runs on a background thread so the main loop returns to idle
//! immediately; the returned [`PlaybackTask`] is the only handle to that
//! thread and supports polling and cancellation, so the session can enforce
//! its cancel-previous policy when a new turn begins.

mod command;
mod http;

pub use command::CommandSynth;
pub use http::HttpSynth;

use crate::audio::{load_wav, play, LiveMeter};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// A text-to-WAV backend.
pub trait SynthEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synthesize `text` into a WAV file at `out`. An empty or unreadable
    /// output is an error, not a silent success.
    fn synthesize(&self, text: &str, out: &Path) -> Result<()>;
}

/// Try the primary engine, then the fallback with the same text.
///
/// Returns the name of the engine that produced the audio.
fn synthesize_with_fallback(
    primary: &dyn SynthEngine,
    fallback: Option<&dyn SynthEngine>,
    text: &str,
    out: &Path,
) -> Result<&'static str> {
    match primary.synthesize(text, out) {
        Ok(()) => Ok(primary.name()),
        Err(primary_err) => {
            let Some(fallback) = fallback else {
                return Err(primary_err.context("speech synthesis failed"));
            };
            tracing::warn!(
                engine = primary.name(),
                "synthesis failed ({primary_err:#}); falling back to {}",
                fallback.name()
            );
            fallback
                .synthesize(text, out)
                .with_context(|| format!("fallback engine '{}' also failed", fallback.name()))?;
            Ok(fallback.name())
        }
    }
}

/// Handle for an in-flight background utterance.
pub struct PlaybackTask {
    handle: Option<JoinHandle<()>>,
    cancel: Arc<AtomicBool>,
    failure: Arc<Mutex<Option<String>>>,
}

impl PlaybackTask {
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| handle.is_finished())
            .unwrap_or(true)
    }

    /// Stop playback and wait for the worker to exit.
    pub fn cancel(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Error message from a finished task, if the utterance failed outright.
    pub fn take_failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

impl Drop for PlaybackTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Owns the engine pair and the shared meter; spawns one worker per utterance.
pub struct Speaker {
    primary: Arc<dyn SynthEngine>,
    fallback: Option<Arc<dyn SynthEngine>>,
    meter: LiveMeter,
}

impl Speaker {
    pub fn new(
        primary: Arc<dyn SynthEngine>,
        fallback: Option<Arc<dyn SynthEngine>>,
        meter: LiveMeter,
    ) -> Self {
        Self {
            primary,
            fallback,
            meter,
        }
    }

    pub fn meter(&self) -> &LiveMeter {
        &self.meter
    }

    /// Synthesize and play `text` on a background thread.
    ///
    /// Failures inside the worker never propagate as panics; they are logged
    /// and left on the task for the session to surface as a status message.
    pub fn speak(&self, text: &str) -> PlaybackTask {
        let primary = self.primary.clone();
        let fallback = self.fallback.clone();
        let meter = self.meter.clone();
        let text = text.to_string();
        let cancel = Arc::new(AtomicBool::new(false));
        let failure = Arc::new(Mutex::new(None));

        let cancel_worker = cancel.clone();
        let failure_worker = failure.clone();
        let handle = std::thread::spawn(move || {
            if let Err(err) = speak_blocking(
                primary.as_ref(),
                fallback.as_deref(),
                &text,
                &meter,
                &cancel_worker,
            ) {
                tracing::warn!("speech playback failed: {err:#}");
                *failure_worker
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(format!("{err:#}"));
            }
            meter.clear();
        });

        PlaybackTask {
            handle: Some(handle),
            cancel,
            failure,
        }
    }
}

/// Worker body: synthesize to a temp WAV, decode, play with energy reporting.
///
/// The `NamedTempFile` guard deletes the artifact on every exit path.
fn speak_blocking(
    primary: &dyn SynthEngine,
    fallback: Option<&dyn SynthEngine>,
    text: &str,
    meter: &LiveMeter,
    cancel: &AtomicBool,
) -> Result<()> {
    let wav = tempfile::Builder::new()
        .prefix("voxchat-tts-")
        .suffix(".wav")
        .tempfile()
        .context("failed to create temp WAV file")?;

    let engine = synthesize_with_fallback(primary, fallback, text, wav.path())?;
    tracing::debug!(engine, chars = text.len(), "synthesized utterance");

    if cancel.load(Ordering::Relaxed) {
        return Ok(());
    }
    let audio = load_wav(wav.path())?;
    play(&audio, meter, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct RecordingEngine {
        name: &'static str,
        fail: bool,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl SynthEngine for RecordingEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        fn synthesize(&self, text: &str, _out: &Path) -> Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(text.to_string());
            if self.fail {
                anyhow::bail!("synthetic failure")
            }
            Ok(())
        }
    }

    fn engine(name: &'static str, fail: bool) -> (RecordingEngine, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            RecordingEngine {
                name,
                fail,
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[test]
    fn fallback_receives_identical_text_when_primary_fails() {
        let (primary, primary_calls) = engine("http", true);
        let (fallback, fallback_calls) = engine("command", false);
        let out = std::env::temp_dir().join("voxchat-fallback-test.wav");

        let used = synthesize_with_fallback(&primary, Some(&fallback), "hello world", &out)
            .expect("fallback should succeed");

        assert_eq!(used, "command");
        assert_eq!(primary_calls.lock().expect("lock").as_slice(), ["hello world"]);
        assert_eq!(fallback_calls.lock().expect("lock").as_slice(), ["hello world"]);
    }

    #[test]
    fn fallback_not_invoked_when_primary_succeeds() {
        let (primary, _) = engine("http", false);
        let (fallback, fallback_calls) = engine("command", false);
        let out = std::env::temp_dir().join("voxchat-no-fallback-test.wav");

        let used = synthesize_with_fallback(&primary, Some(&fallback), "hi", &out)
            .expect("primary should succeed");

        assert_eq!(used, "http");
        assert!(fallback_calls.lock().expect("lock").is_empty());
    }

    #[test]
    fn both_engines_failing_is_an_error() {
        let (primary, _) = engine("http", true);
        let (fallback, _) = engine("command", true);
        let out = std::env::temp_dir().join("voxchat-both-fail-test.wav");
        assert!(synthesize_with_fallback(&primary, Some(&fallback), "hi", &out).is_err());
    }

    #[test]
    fn primary_failure_without_fallback_is_an_error() {
        let (primary, _) = engine("solo", true);
        let out = std::env::temp_dir().join("voxchat-solo-fail-test.wav");
        assert!(synthesize_with_fallback(&primary, None, "hi", &out).is_err());
    }

    struct BlockingEngine {
        started: Arc<AtomicUsize>,
    }

    impl SynthEngine for BlockingEngine {
        fn name(&self) -> &'static str {
            "blocking"
        }

        fn synthesize(&self, _text: &str, _out: &Path) -> Result<()> {
            self.started.fetch_add(1, Ordering::Relaxed);
            // Leave an invalid (empty) WAV behind so playback fails fast and
            // the worker exits without touching an audio device.
            anyhow::bail!("no audio in tests")
        }
    }

    struct TempPathEngine {
        seen: Arc<Mutex<Option<std::path::PathBuf>>>,
        write_garbage: bool,
    }

    impl SynthEngine for TempPathEngine {
        fn name(&self) -> &'static str {
            "temp-path"
        }

        fn synthesize(&self, _text: &str, out: &Path) -> Result<()> {
            *self.seen.lock().expect("seen lock") = Some(out.to_path_buf());
            if self.write_garbage {
                std::fs::write(out, b"not a wav")?;
                Ok(())
            } else {
                anyhow::bail!("synthetic failure")
            }
        }
    }

    fn wait_for(task: &PlaybackTask) {
        while !task.is_finished() {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
    }

    #[test]
    fn temp_audio_is_absent_after_a_failed_synthesis() {
        let seen = Arc::new(Mutex::new(None));
        let speaker = Speaker::new(
            Arc::new(TempPathEngine {
                seen: seen.clone(),
                write_garbage: false,
            }),
            None,
            LiveMeter::new(),
        );

        let task = speaker.speak("hello");
        wait_for(&task);
        let path = seen
            .lock()
            .expect("seen lock")
            .clone()
            .expect("engine saw a target path");
        assert!(!path.exists(), "temp WAV must be gone once the task is done");
    }

    #[test]
    fn temp_audio_is_absent_after_a_failed_decode() {
        let seen = Arc::new(Mutex::new(None));
        let speaker = Speaker::new(
            Arc::new(TempPathEngine {
                seen: seen.clone(),
                write_garbage: true,
            }),
            None,
            LiveMeter::new(),
        );

        let task = speaker.speak("hello");
        wait_for(&task);
        assert!(task.take_failure().is_some(), "garbage audio cannot decode");
        let path = seen
            .lock()
            .expect("seen lock")
            .clone()
            .expect("engine saw a target path");
        assert!(!path.exists(), "temp WAV must be gone once the task is done");
    }

    #[test]
    fn failed_utterance_surfaces_on_the_task() {
        let started = Arc::new(AtomicUsize::new(0));
        let speaker = Speaker::new(
            Arc::new(BlockingEngine {
                started: started.clone(),
            }),
            None,
            LiveMeter::new(),
        );

        let mut task = speaker.speak("hello");
        task.cancel(); // joins the worker
        assert!(task.is_finished());
        assert_eq!(started.load(Ordering::Relaxed), 1);
        assert!(task.take_failure().is_some());
    }
}
