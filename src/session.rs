//! The push-to-talk session: one owner for the whole turn pipeline.
//!
//! A turn is strictly sequential: record while the key is held, transcribe,
//! ask the model, hand the answer to the background speaker. The conversation
//! context lives here and nowhere else; it is only replaced after a fully
//! completed turn, so any failure leaves the previous dialogue intact and the
//! next press simply retries.
//!
//! Starting a new turn cancels any utterance still playing. The user pressed
//! the key because they want to say something new; finishing the stale answer
//! first would just delay them.

use crate::audio::{CaptureConfig, Recorder, StopReason};
use crate::config::{key_from_name, Settings};
use crate::llm::{ContextToken, LlmClient, TurnReply};
use crate::stt::{sanitize_transcript, Transcriber};
use crate::tts::{PlaybackTask, Speaker};
use crate::ui;
use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::Stdout;
use std::time::{Duration, Instant};

/// Idle loop cadence.
const TICK: Duration = Duration::from_millis(50);

/// Without release events, a key counts as held while press/repeat events
/// keep arriving within this window.
const KEY_REPEAT_GRACE: Duration = Duration::from_millis(600);

type Term = Terminal<CrosstermBackend<Stdout>>;

/// Where the session currently is; used for logging and loop control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Recording,
    Transcribing,
    AwaitingResponse,
    ShuttingDown,
}

/// What the session does with a completed model reply.
#[derive(Debug, PartialEq)]
pub(crate) enum TurnAction {
    /// Speak the text and show it as the status line.
    Speak(String),
    /// Show a status line only.
    Status(String),
}

/// Fold a model reply into the owned context and decide the follow-up.
///
/// The context is replaced only by a completed answer that carries one;
/// server errors and empty replies leave it untouched. A server-reported
/// error is spoken back like an answer, so the user hears what went wrong
/// without looking at the screen.
pub(crate) fn absorb_reply(
    context: &mut Option<ContextToken>,
    reply: TurnReply,
) -> TurnAction {
    match reply {
        TurnReply::Answer {
            text,
            context: updated,
        } => {
            if let Some(updated) = updated {
                *context = Some(updated);
            }
            TurnAction::Speak(text)
        }
        TurnReply::Empty => TurnAction::Status("Received empty response".to_string()),
        TurnReply::ServerError(message) => TurnAction::Speak(format!("Error: {message}")),
    }
}

/// Status line for a transport-level request failure.
pub(crate) fn transport_status(err: &anyhow::Error) -> &'static str {
    let timed_out = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(reqwest::Error::is_timeout);
    if timed_out {
        "Request timed out. Please try again."
    } else {
        "Connection error. Please try again."
    }
}

/// Tracks whether the push-to-talk key is still held.
///
/// With release events the terminal tells us directly. Without them the key
/// is considered held while press or repeat events keep arriving; the hold
/// ends once [`KEY_REPEAT_GRACE`] passes in silence.
pub(crate) struct KeyHold {
    release_events: bool,
    last_seen: Instant,
    released: bool,
}

impl KeyHold {
    pub(crate) fn new(release_events: bool, now: Instant) -> Self {
        Self {
            release_events,
            last_seen: now,
            released: false,
        }
    }

    pub(crate) fn on_key(&mut self, kind: KeyEventKind, now: Instant) {
        match kind {
            KeyEventKind::Press | KeyEventKind::Repeat => self.last_seen = now,
            KeyEventKind::Release => self.released = true,
        }
    }

    pub(crate) fn is_held(&self, now: Instant) -> bool {
        if self.release_events {
            !self.released
        } else {
            now.duration_since(self.last_seen) < KEY_REPEAT_GRACE
        }
    }
}

pub struct Session {
    settings: Settings,
    recorder: Recorder,
    transcriber: Transcriber,
    llm: LlmClient,
    speaker: Speaker,
    context: Option<ContextToken>,
    playback: Option<PlaybackTask>,
    status: String,
    talk_key: KeyCode,
    quit_key: KeyCode,
    release_events: bool,
    phase: Phase,
}

impl Session {
    pub fn new(
        settings: Settings,
        recorder: Recorder,
        transcriber: Transcriber,
        llm: LlmClient,
        speaker: Speaker,
        release_events: bool,
    ) -> Result<Self> {
        // Settings were validated at load time; resolve the bindings once.
        let talk_key = key_from_name(&settings.keys.push_to_talk)
            .context("push-to-talk key binding is invalid")?;
        let quit_key =
            key_from_name(&settings.keys.quit).context("quit key binding is invalid")?;
        let status = settings.messages.press_key.clone();
        Ok(Self {
            settings,
            recorder,
            transcriber,
            llm,
            speaker,
            context: None,
            playback: None,
            status,
            talk_key,
            quit_key,
            release_events,
            phase: Phase::Idle,
        })
    }

    /// Speak the configured greeting before the first turn.
    pub fn greet(&mut self) {
        let greeting = self.settings.conversation.greeting.clone();
        self.playback = Some(self.speaker.speak(&greeting));
    }

    fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            frame_ms: self.settings.audio.frame_ms,
            max_capture_ms: self.settings.audio.max_capture_ms,
            channel_capacity: self.settings.audio.channel_capacity,
            ..CaptureConfig::default()
        }
    }

    /// Drop the handle of a finished utterance and surface worker failures.
    fn poll_playback(&mut self) {
        let Some(task) = &self.playback else { return };
        if !task.is_finished() {
            return;
        }
        if let Some(message) = task.take_failure() {
            tracing::warn!("utterance failed: {message}");
            self.status = "Speech playback failed".to_string();
        }
        self.playback = None;
    }

    fn playback_active(&self) -> bool {
        self.playback
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Run until the quit key is pressed.
    pub fn run(&mut self, terminal: &mut Term) -> Result<()> {
        self.draw_idle(terminal)?;
        loop {
            if self.phase == Phase::ShuttingDown {
                break;
            }
            self.poll_playback();
            self.draw_idle(terminal)?;

            if !event::poll(TICK)? {
                continue;
            }
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind == KeyEventKind::Release {
                continue;
            }
            if key.code == self.quit_key {
                tracing::info!("quit requested");
                self.phase = Phase::ShuttingDown;
            } else if key.code == self.talk_key {
                self.run_turn(terminal)?;
            }
        }
        // Dropping the task cancels any in-flight utterance.
        self.playback = None;
        Ok(())
    }

    /// Idle screen: energy bars while speaking, the status line otherwise.
    fn draw_idle(&mut self, terminal: &mut Term) -> Result<()> {
        if self.playback_active() {
            let energy = self.speaker.meter().energy();
            terminal.draw(|frame| ui::draw_energy(frame, energy))?;
        } else {
            let status = self.status.clone();
            terminal.draw(|frame| ui::draw_status(frame, &status))?;
        }
        Ok(())
    }

    /// One full push-to-talk turn, entered on a talk-key press.
    fn run_turn(&mut self, terminal: &mut Term) -> Result<()> {
        if let Some(mut task) = self.playback.take() {
            task.cancel();
        }

        self.phase = Phase::Recording;
        terminal.draw(ui::draw_recording)?;

        let talk_key = self.talk_key;
        let mut hold = KeyHold::new(self.release_events, Instant::now());
        let cfg = self.capture_config();
        let capture = self.recorder.record_while(
            &cfg,
            || {
                pump_key_events(talk_key, &mut hold);
                hold.is_held(Instant::now())
            },
            Some(self.speaker.meter()),
        )?;

        if let StopReason::Error(message) = &capture.metrics.stop_reason {
            tracing::warn!("capture stopped early: {message}");
        }
        tracing::info!(
            samples = capture.audio.len(),
            stop = capture.metrics.stop_reason.label(),
            "turn capture complete"
        );

        if capture.audio.is_empty() {
            // Tap too short to contain a frame.
            self.status = self.settings.messages.press_key.clone();
            self.phase = Phase::Idle;
            return Ok(());
        }

        self.phase = Phase::Transcribing;
        let transcript = match self
            .transcriber
            .transcribe(&capture.audio, &self.settings.recognition.lang)
        {
            Ok(raw) => sanitize_transcript(&raw),
            Err(err) => {
                // A failed transcription ends the turn like silence would.
                tracing::warn!("transcription failed: {err:#}");
                String::new()
            }
        };
        if transcript.is_empty() {
            self.status = self.settings.messages.press_key.clone();
            self.phase = Phase::Idle;
            return Ok(());
        }
        tracing::info!(chars = transcript.len(), "transcript ready");
        terminal.draw(|frame| ui::draw_status(frame, &transcript))?;

        self.phase = Phase::AwaitingResponse;
        match self.llm.ask(&transcript, self.context.as_ref()) {
            Ok(reply) => match absorb_reply(&mut self.context, reply) {
                TurnAction::Speak(text) => {
                    self.playback = Some(self.speaker.speak(&text));
                    self.status = text;
                }
                TurnAction::Status(message) => self.status = message,
            },
            Err(err) => {
                tracing::warn!("model request failed: {err:#}");
                self.status = transport_status(&err).to_string();
            }
        }

        self.phase = Phase::Idle;
        Ok(())
    }
}

/// Drain pending terminal events, feeding talk-key state into `hold`.
///
/// Runs inside the capture loop, so it must never block.
fn pump_key_events(talk_key: KeyCode, hold: &mut KeyHold) {
    loop {
        match event::poll(Duration::ZERO) {
            Ok(true) => {}
            _ => return,
        }
        let Ok(read) = event::read() else { return };
        if let Event::Key(KeyEvent { code, kind, .. }) = read {
            if code == talk_key {
                hold.on_key(kind, Instant::now());
            }
        }
    }
}
