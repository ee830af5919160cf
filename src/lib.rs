//! voxchat: a push-to-talk terminal voice assistant.
//!
//! Hold a key to record, release to send: audio is transcribed locally with
//! Whisper, the transcript goes to a local Ollama-style model server, and the
//! streamed answer is spoken back while energy bars animate in the terminal.

pub mod audio;
pub mod config;
pub mod llm;
pub mod session;
pub mod stt;
pub mod telemetry;
pub mod tts;
pub mod ui;

pub use config::{load_settings, Cli, Settings};
pub use llm::{ContextToken, LlmClient, TurnReply};
pub use session::Session;
pub use stt::{sanitize_transcript, Transcriber};
pub use tts::{CommandSynth, HttpSynth, PlaybackTask, Speaker, SynthEngine};
