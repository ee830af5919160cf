//! Streaming conversation client for an Ollama-style inference server.
//!
//! Each turn is a single POST whose response arrives as newline-delimited
//! JSON objects. Tokens are concatenated in arrival order; the final object
//! carries `done: true` plus an opaque `context` blob that the server uses to
//! retain dialogue state between turns. The context is owned by the session
//! and only replaced after a fully completed turn, so a failed request leaves
//! the previous conversation intact and the user can simply retry.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader};
use std::time::Duration;

/// Opaque dialogue-state token as reported by the server. Never inspected.
pub type ContextToken = Value;

/// Outcome of one completed request, as seen by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnReply {
    /// The server produced text; `context` is present when the final chunk
    /// carried an updated dialogue token.
    Answer {
        text: String,
        context: Option<ContextToken>,
    },
    /// The stream completed but no tokens were produced.
    Empty,
    /// The server reported an in-band error; the stored context must not be
    /// replaced.
    ServerError(String),
}

/// One NDJSON object from the response stream. All fields optional; unknown
/// fields ignored.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct LlmClient {
    http: reqwest::blocking::Client,
    url: String,
    model: String,
}

impl LlmClient {
    /// `timeout` bounds the connect phase and each gap between stream reads,
    /// not the request as a whole. A long generation survives as long as
    /// tokens keep arriving within the window.
    pub fn new(url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
            model: model.to_string(),
        })
    }

    /// Send `prompt` with the caller's current context and decode the stream.
    ///
    /// Transport-level failures (refused connection, timeout) surface as
    /// `Err`; the caller keeps its context and the turn is retryable. In-band
    /// problems come back as [`TurnReply::ServerError`] or
    /// [`TurnReply::Empty`].
    pub fn ask(&self, prompt: &str, context: Option<&ContextToken>) -> Result<TurnReply> {
        let body = json!({
            "model": self.model,
            "stream": true,
            "context": context,
            "prompt": prompt,
        });

        tracing::debug!(model = %self.model, "sending prompt");
        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .with_context(|| format!("request to {} failed", self.url))?
            .error_for_status()
            .context("inference server returned an error status")?;

        decode_stream(BufReader::new(response))
    }
}

/// Decode a newline-delimited JSON token stream into a [`TurnReply`].
///
/// Malformed lines are skipped; reading stops at the first object with
/// `done: true` or an `error` field. Split out from [`LlmClient::ask`] so the
/// protocol handling is testable without a server.
pub fn decode_stream(reader: impl BufRead) -> Result<TurnReply> {
    let mut text = String::new();
    let mut context = None;

    for line in reader.lines() {
        let line = line.context("stream read failed mid-response")?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: StreamChunk = match serde_json::from_str(&line) {
            Ok(chunk) => chunk,
            Err(err) => {
                tracing::warn!("skipping malformed stream line: {err}");
                continue;
            }
        };

        if let Some(error) = chunk.error {
            tracing::warn!("inference server error: {error}");
            return Ok(TurnReply::ServerError(error));
        }
        if let Some(token) = chunk.response {
            text.push_str(&token);
        }
        if chunk.done.unwrap_or(false) {
            context = chunk.context;
            break;
        }
    }

    let text = text.trim().to_string();
    if text.is_empty() {
        return Ok(TurnReply::Empty);
    }
    Ok(TurnReply::Answer { text, context })
}
