//! Network synthesis backend.
//!
//! Submits text plus a voice identifier to a local synthesis service and
//! writes the returned WAV bytes to the target path. The wire format beyond
//! "WAV bytes back" is deliberately not modelled; anything that is not a
//! non-empty RIFF payload counts as a failure and lets the driver fall back
//! to the offline engine.

use super::SynthEngine;
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

const RIFF_MAGIC: &[u8; 4] = b"RIFF";

pub struct HttpSynth {
    http: reqwest::blocking::Client,
    url: String,
    voice: String,
}

impl HttpSynth {
    pub fn new(url: &str, voice: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build synthesis HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
            voice: voice.to_string(),
        })
    }
}

impl SynthEngine for HttpSynth {
    fn name(&self) -> &'static str {
        "http"
    }

    fn synthesize(&self, text: &str, out: &Path) -> Result<()> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "text": text, "voice": self.voice }))
            .send()
            .with_context(|| format!("synthesis request to {} failed", self.url))?
            .error_for_status()
            .context("synthesis service returned an error status")?;

        let bytes = response.bytes().context("failed to read synthesis body")?;
        if bytes.is_empty() {
            return Err(anyhow!("synthesis service returned an empty body"));
        }
        if bytes.len() < RIFF_MAGIC.len() || &bytes[..RIFF_MAGIC.len()] != RIFF_MAGIC {
            return Err(anyhow!("synthesis service did not return WAV audio"));
        }

        std::fs::write(out, &bytes)
            .with_context(|| format!("failed to write synthesized audio to {}", out.display()))?;
        Ok(())
    }
}
