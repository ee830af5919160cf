//! Semantic checks applied after deserialization.
//!
//! serde already guarantees the document's shape; this layer rejects values
//! that parse but cannot work at runtime, so misconfiguration fails at startup
//! with a message naming the offending field.

use super::{key_from_name, Settings, TtsEngineKind};
use anyhow::{bail, Result};

impl Settings {
    pub fn validate(&self) -> Result<()> {
        require_nonempty("messages.loading_model", &self.messages.loading_model)?;
        require_nonempty("messages.press_key", &self.messages.press_key)?;
        require_nonempty("messages.no_audio_input", &self.messages.no_audio_input)?;
        require_nonempty("conversation.greeting", &self.conversation.greeting)?;
        require_nonempty("model.name", &self.model.name)?;
        require_nonempty("recognition.model_path", &self.recognition.model_path)?;
        require_nonempty("recognition.lang", &self.recognition.lang)?;
        require_nonempty("tts.voice", &self.tts.voice)?;

        require_http_url("model.url", &self.model.url)?;
        if self.tts.engine == TtsEngineKind::Http {
            require_http_url("tts.url", &self.tts.url)?;
        }
        require_nonempty("tts.command", &self.tts.command)?;

        if self.model.timeout_secs == 0 {
            bail!("model.timeout_secs must be greater than zero");
        }
        if self.tts.timeout_secs == 0 {
            bail!("tts.timeout_secs must be greater than zero");
        }

        if !(5..=500).contains(&self.audio.frame_ms) {
            bail!(
                "audio.frame_ms must be between 5 and 500, got {}",
                self.audio.frame_ms
            );
        }
        if self.audio.max_capture_ms < 1_000 {
            bail!(
                "audio.max_capture_ms must be at least 1000, got {}",
                self.audio.max_capture_ms
            );
        }
        if self.audio.channel_capacity == 0 {
            bail!("audio.channel_capacity must be greater than zero");
        }

        let talk = require_key("keys.push_to_talk", &self.keys.push_to_talk)?;
        let quit = require_key("keys.quit", &self.keys.quit)?;
        if talk == quit {
            bail!("keys.push_to_talk and keys.quit must differ");
        }
        Ok(())
    }
}

fn require_nonempty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} must not be empty");
    }
    Ok(())
}

fn require_http_url(field: &str, value: &str) -> Result<()> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        bail!("{field} must be an http(s) URL, got '{value}'");
    }
    Ok(())
}

fn require_key(field: &str, value: &str) -> Result<crossterm::event::KeyCode> {
    match key_from_name(value) {
        Some(code) => Ok(code),
        None => bail!("{field} names an unknown key '{value}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::Settings;

    fn base() -> Settings {
        serde_yaml::from_str(
            r#"
messages:
  loading_model: "Loading..."
  press_key: "Hold SPACE"
  no_audio_input: "No mic"
conversation:
  greeting: "Hi"
model:
  url: "http://127.0.0.1:11434/api/generate"
  name: "llama3.2"
recognition:
  model_path: "/models/ggml-base.bin"
  lang: "auto"
tts:
  engine: command
  voice: "en"
"#,
        )
        .expect("base settings")
    }

    #[test]
    fn base_settings_validate() {
        base().validate().expect("valid");
    }

    #[test]
    fn blank_greeting_is_rejected() {
        let mut settings = base();
        settings.conversation.greeting = "   ".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn non_http_model_url_is_rejected() {
        let mut settings = base();
        settings.model.url = "ftp://example".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("model.url"));
    }

    #[test]
    fn tts_url_only_required_for_http_engine() {
        let mut settings = base();
        settings.tts.url = "nonsense".to_string();
        settings.validate().expect("command engine ignores tts.url");

        settings.tts.engine = super::super::TtsEngineKind::Http;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut settings = base();
        settings.model.timeout_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn tiny_capture_cap_is_rejected() {
        let mut settings = base();
        settings.audio.max_capture_ms = 100;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn colliding_key_bindings_are_rejected() {
        let mut settings = base();
        settings.keys.quit = "space".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn unknown_key_name_is_rejected() {
        let mut settings = base();
        settings.keys.push_to_talk = "hyperkey".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("push_to_talk"));
    }
}
