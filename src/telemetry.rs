use crate::config::Cli;
use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub fn tracing_log_path() -> PathBuf {
    env::var("VOXCHAT_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("voxchat_trace.jsonl"))
}

/// Route tracing events to a JSON-lines file when logging is enabled.
///
/// The UI owns the terminal, so nothing may write to stdout or stderr while
/// the session runs; a file is the only safe sink.
pub fn init_tracing(cli: &Cli) {
    let enabled = cli.logs && !cli.no_logs;
    if !enabled {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_log_path_is_in_temp_dir() {
        env::remove_var("VOXCHAT_TRACE_LOG");
        let path = tracing_log_path();
        assert!(path.starts_with(env::temp_dir()));
        assert!(path.ends_with("voxchat_trace.jsonl"));
    }
}
