//! Command-line parsing and the YAML settings document.
//!
//! The CLI stays deliberately small (config path, device selection, logging
//! toggles); everything that describes the assistant itself lives in the YAML
//! file. Required fields missing from the document are a startup-fatal error
//! surfaced before the terminal is touched.

mod validation;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::KeyCode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI options for the voxchat assistant.
#[derive(Debug, Parser, Clone)]
#[command(about = "voxchat push-to-talk voice assistant", author, version)]
pub struct Cli {
    /// Path to the YAML settings document
    #[arg(long, env = "VOXCHAT_CONFIG", default_value = "voxchat.yaml")]
    pub config: PathBuf,

    /// Preferred audio input device name
    #[arg(long)]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "VOXCHAT_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "VOXCHAT_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,
}

/// Immutable assistant settings, loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub messages: Messages,
    pub conversation: Conversation,
    pub model: ModelSettings,
    pub recognition: RecognitionSettings,
    pub tts: TtsSettings,
    #[serde(default)]
    pub audio: AudioSettings,
    #[serde(default)]
    pub keys: KeySettings,
}

/// Status strings shown by the UI.
#[derive(Debug, Clone, Deserialize)]
pub struct Messages {
    pub loading_model: String,
    pub press_key: String,
    pub no_audio_input: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Conversation {
    /// Spoken once at startup before the first turn.
    pub greeting: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Streaming generate endpoint, e.g. `http://127.0.0.1:11434/api/generate`.
    pub url: String,
    pub name: String,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionSettings {
    /// Path to the GGML Whisper model file.
    pub model_path: String,
    /// Language code, or `auto` for detection.
    pub lang: String,
}

/// Which synthesis backend is primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngineKind {
    /// Network synthesis service; falls back to the command engine.
    Http,
    /// Offline subprocess engine only.
    Command,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TtsSettings {
    pub engine: TtsEngineKind,
    pub voice: String,
    #[serde(default = "default_tts_url")]
    pub url: String,
    #[serde(default = "default_tts_command")]
    pub command: String,
    #[serde(default = "default_tts_args")]
    pub args: Vec<String>,
    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Hard cap on one push-to-talk recording.
    pub max_capture_ms: u64,
    /// Capture frame duration.
    pub frame_ms: u64,
    /// Capacity of the capture frame channel.
    pub channel_capacity: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            max_capture_ms: 120_000,
            frame_ms: 64,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    pub push_to_talk: String,
    pub quit: String,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            push_to_talk: "space".to_string(),
            quit: "esc".to_string(),
        }
    }
}

fn default_model_timeout_secs() -> u64 {
    30
}

fn default_tts_url() -> String {
    "http://127.0.0.1:5002/api/tts".to_string()
}

fn default_tts_command() -> String {
    "espeak-ng".to_string()
}

fn default_tts_args() -> Vec<String> {
    ["-v", "{voice}", "-w", "{out}", "{text}"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_tts_timeout_secs() -> u64 {
    30
}

/// Read, parse, and validate the settings document.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    let settings: Settings = serde_yaml::from_str(&raw)
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid settings in {}", path.display()))?;
    Ok(settings)
}

/// Map a configured key name to a crossterm key code.
pub fn key_from_name(name: &str) -> Option<KeyCode> {
    let lowered = name.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "space" => Some(KeyCode::Char(' ')),
        "esc" | "escape" => Some(KeyCode::Esc),
        "enter" => Some(KeyCode::Enter),
        "tab" => Some(KeyCode::Tab),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_graphic() => Some(KeyCode::Char(c)),
                _ => None,
            }
        }
    }
}
