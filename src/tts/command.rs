//! Offline synthesis backend.
//!
//! Runs a local TTS command (espeak-ng by default) that writes a WAV file.
//! The argument list is a template: `{out}`, `{text}` and `{voice}` are
//! substituted per call, so other engines with a compatible "synthesize to
//! file" CLI can be dropped in from configuration.

use super::SynthEngine;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::Command;

pub struct CommandSynth {
    program: String,
    args: Vec<String>,
    voice: String,
}

impl CommandSynth {
    pub fn new(program: &str, args: &[String], voice: &str) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            voice: voice.to_string(),
        }
    }

    fn resolved_args(&self, text: &str, out: &Path) -> Vec<String> {
        substitute_args(&self.args, text, &self.voice, &out.to_string_lossy())
    }
}

/// Expand the `{out}` / `{text}` / `{voice}` placeholders in an arg template.
fn substitute_args(template: &[String], text: &str, voice: &str, out: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            arg.replace("{out}", out)
                .replace("{text}", text)
                .replace("{voice}", voice)
        })
        .collect()
}

impl SynthEngine for CommandSynth {
    fn name(&self) -> &'static str {
        "command"
    }

    fn synthesize(&self, text: &str, out: &Path) -> Result<()> {
        let args = self.resolved_args(text, out);
        tracing::debug!(program = %self.program, "running offline synthesis");

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .with_context(|| format!("failed to run synthesis command '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "synthesis command '{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }

        let size = std::fs::metadata(out).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(anyhow!(
                "synthesis command '{}' produced no audio at {}",
                self.program,
                out.display()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn placeholders_are_substituted() {
        let args = substitute_args(
            &template(&["-v", "{voice}", "-w", "{out}", "{text}"]),
            "hello there",
            "en-us",
            "/tmp/out.wav",
        );
        assert_eq!(args, ["-v", "en-us", "-w", "/tmp/out.wav", "hello there"]);
    }

    #[test]
    fn literal_args_pass_through_unchanged() {
        let args = substitute_args(&template(&["--quiet", "-s", "150"]), "x", "v", "/o");
        assert_eq!(args, ["--quiet", "-s", "150"]);
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let out = dir.path().join("never.wav");
        let synth = CommandSynth::new("false", &[], "en");
        assert!(synth.synthesize("hello", &out).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn empty_output_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let out = dir.path().join("empty.wav");
        // `true` succeeds but writes nothing.
        let synth = CommandSynth::new("true", &template(&["{out}"]), "en");
        assert!(synth.synthesize("hello", &out).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_that_writes_audio_succeeds() {
        let dir = tempfile::tempdir().expect("temp dir");
        let out = dir.path().join("fake.wav");
        let synth = CommandSynth::new(
            "sh",
            &template(&["-c", "printf RIFFDATA > {out}"]),
            "en",
        );
        synth.synthesize("hello", &out).expect("synthesize");
        assert!(std::fs::metadata(&out).expect("stat").len() > 0);
    }

    #[cfg(unix)]
    #[test]
    fn missing_program_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let out = dir.path().join("missing.wav");
        let synth = CommandSynth::new("/no/such/binary", &[], "en");
        assert!(synth.synthesize("hello", &out).is_err());
    }
}
