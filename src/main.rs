//! Binary entrypoint: wire settings, devices, models, and the terminal
//! together, then hand control to the session loop.

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use voxchat::audio::{LiveMeter, Recorder};
use voxchat::config::{self, Cli, Settings, TtsEngineKind};
use voxchat::llm::LlmClient;
use voxchat::stt::Transcriber;
use voxchat::tts::{CommandSynth, HttpSynth, Speaker, SynthEngine};
use voxchat::ui::{self, TerminalRestoreGuard};
use voxchat::{session::Session, telemetry};

fn main() {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli);

    if cli.list_input_devices {
        match Recorder::list_devices() {
            Ok(names) if names.is_empty() => println!("no input devices detected"),
            Ok(names) => {
                for name in names {
                    println!("{name}");
                }
            }
            Err(err) => {
                eprintln!("failed to list input devices: {err:#}");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Err(err) = run(&cli) {
        // The guard has already restored the terminal by the time we print.
        eprintln!("voxchat: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = config::load_settings(&cli.config)?;
    tracing::info!(config = %cli.config.display(), "settings loaded");

    let guard = TerminalRestoreGuard::new();
    guard.enable_raw_mode()?;
    let mut stdout = io::stdout();
    guard.enter_alt_screen(&mut stdout)?;
    let release_events = guard.enable_release_events(&mut stdout)?;
    if !release_events {
        tracing::info!("terminal lacks key release events; using repeat-based hold detection");
    }

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_session(cli, settings, release_events, &mut terminal);

    drop(terminal);
    guard.restore();
    result
}

fn start_session(
    cli: &Cli,
    settings: Settings,
    release_events: bool,
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
) -> Result<()> {
    let quit_key = config::key_from_name(&settings.keys.quit);
    let recorder = match Recorder::new(cli.input_device.as_deref()) {
        Ok(recorder) => match recorder.probe() {
            Ok(()) => recorder,
            Err(err) => {
                tracing::error!("input device probe failed: {err:#}");
                return wait_exit(terminal, &settings.messages.no_audio_input, quit_key);
            }
        },
        Err(err) => {
            tracing::error!("no usable input device: {err:#}");
            return wait_exit(terminal, &settings.messages.no_audio_input, quit_key);
        }
    };
    tracing::info!(device = %recorder.device_name(), "microphone ready");

    terminal.draw(|frame| ui::draw_status(frame, &settings.messages.loading_model))?;
    let transcriber = Transcriber::new(&settings.recognition.model_path)
        .with_context(|| format!("failed to load model {}", settings.recognition.model_path))?;

    let llm = LlmClient::new(
        &settings.model.url,
        &settings.model.name,
        Duration::from_secs(settings.model.timeout_secs),
    )?;
    let speaker = build_speaker(&settings)?;

    let mut session = Session::new(settings, recorder, transcriber, llm, speaker, release_events)?;
    session.greet();
    session.run(terminal)
}

/// Assemble the synthesis backends from settings.
///
/// The HTTP engine always carries the offline command engine as fallback;
/// configuring the command engine directly runs it alone.
fn build_speaker(settings: &Settings) -> Result<Speaker> {
    let command: Arc<dyn SynthEngine> = Arc::new(CommandSynth::new(
        &settings.tts.command,
        &settings.tts.args,
        &settings.tts.voice,
    ));
    let (primary, fallback) = match settings.tts.engine {
        TtsEngineKind::Http => {
            let http: Arc<dyn SynthEngine> = Arc::new(HttpSynth::new(
                &settings.tts.url,
                &settings.tts.voice,
                Duration::from_secs(settings.tts.timeout_secs),
            )?);
            (http, Some(command))
        }
        TtsEngineKind::Command => (command, None),
    };
    Ok(Speaker::new(primary, fallback, LiveMeter::new()))
}

/// No microphone: keep showing the configured message until the quit key.
fn wait_exit(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    message: &str,
    quit_key: Option<crossterm::event::KeyCode>,
) -> Result<()> {
    loop {
        terminal.draw(|frame| ui::draw_status(frame, message))?;
        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                // Without a resolvable binding any key exits.
                if quit_key.map(|code| key.code == code).unwrap_or(true) {
                    return Ok(());
                }
            }
        }
    }
}
