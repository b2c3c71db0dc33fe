use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing_subscriber::EnvFilter;

use clipkeep::clipboard::SystemClipboard;
use clipkeep::config::{Cli, Config};
use clipkeep::engine::{ClipboardMonitor, HistoryEngine};
use clipkeep::error::AppError;
use clipkeep::policy::SelectionPolicy;
use clipkeep::store::SqliteStore;

fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());
    // Only write a default config if no custom path was specified
    if cli.config.is_none() {
        Config::write_default_if_missing(&Config::config_path());
    }

    init_logging();

    let db_path = config.db_path();
    let store = Arc::new(Mutex::new(SqliteStore::open(&db_path)?));
    tracing::info!("database opened at {}", db_path.display());

    let port = SystemClipboard::new()?;
    let mut engine = HistoryEngine::new(port, Arc::clone(&store), config.poll_interval());

    let policy = Arc::new(SelectionPolicy::new(
        Arc::clone(&store),
        config.history.recent_limit,
    ));
    let policy_for_notifier = Arc::clone(&policy);
    engine.set_notifier(Arc::new(move || {
        match policy_for_notifier.recent() {
            Ok(recent) => {
                if let Some(top) = recent.first() {
                    tracing::info!(
                        entries = recent.len(),
                        top = %preview(&top.content),
                        "history updated"
                    );
                }
            }
            Err(e) => tracing::warn!("failed to refresh history view: {e}"),
        }
    }));

    let engine = Arc::new(Mutex::new(engine));
    let mut monitor = ClipboardMonitor::new(engine);
    monitor.start();

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    if let Some(signal) = signals.forever().next() {
        tracing::info!(signal, "shutting down");
    }
    monitor.stop();
    tracing::info!("clipkeep shutdown complete");
    Ok(())
}

/// File-based logging under the platform data dir; the terminal stays quiet.
fn init_logging() {
    let log_dir = directories::ProjectDirs::from("", "", "clipkeep")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    if let Ok(file) = std::fs::File::create(log_dir.join("clipkeep.log")) {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    }
}

/// Short, single-line excerpt of clipboard content for log lines.
fn preview(content: &str) -> String {
    const MAX: usize = 24;
    let flat: String = content
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(MAX + 1)
        .collect();
    if flat.chars().count() > MAX {
        let truncated: String = flat.chars().take(MAX - 3).collect();
        format!("{truncated}...")
    } else {
        flat
    }
}
