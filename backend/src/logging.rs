// Node logging on tracing-subscriber.
//
// Library crates log through the `log` facade; `tracing_log::LogTracer`
// forwards those records to the installed subscriber.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use skyfeed_configs::LoggingSettings;
use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer};

/// File name under `[logging].logs_path`
pub const LOG_FILE_NAME: &str = "skyfeed.log";

/// Crates whose debug output drowns the realtime engine's own
const QUIET_TARGETS: &[&str] = &["tokio", "tokio_util", "runtime", "tracing"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// `timestamp LEVEL target: message`
    Compact,
    /// One JSON object per line, with the span list
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" | "jsonl" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

pub fn log_file_path(settings: &LoggingSettings) -> PathBuf {
    Path::new(&settings.logs_path).join(LOG_FILE_NAME)
}

fn env_filter(level: &str, targets: &HashMap<String, String>) -> anyhow::Result<EnvFilter> {
    let directives: Vec<String> = std::iter::once(level.to_string())
        .chain(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)))
        .chain(targets.iter().map(|(target, lvl)| format!("{}={}", target, lvl)))
        .collect();
    let directives = directives.join(",");

    EnvFilter::try_new(&directives)
        .map_err(|e| anyhow::anyhow!("Invalid log filter '{}': {}", directives, e))
}

fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Build the node's subscriber from `[logging]` without installing it.
///
/// Always writes to [`log_file_path`]; mirrors to stdout when
/// `log_to_console` is set.
pub fn node_subscriber(
    settings: &LoggingSettings,
) -> anyhow::Result<Box<dyn Subscriber + Send + Sync>> {
    let log_file = open_log_file(&log_file_path(settings))?;
    let filter = || env_filter(&settings.level, &settings.targets);

    let file_layer = match LogFormat::parse(&settings.format) {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(log_file)
            .with_target(true)
            .with_span_list(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter()?)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(log_file)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(filter()?)
            .boxed(),
    };

    let console_layer = if settings.log_to_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_filter(filter()?),
        )
    } else {
        None
    };

    Ok(Box::new(
        tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer),
    ))
}

/// Install [`node_subscriber`] as the process-wide subscriber and bridge
/// the `log` facade into it. Fails if a subscriber is already installed.
pub fn init_from_settings(settings: &LoggingSettings) -> anyhow::Result<()> {
    let subscriber = node_subscriber(settings)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Logging already initialized: {}", e))?;
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge not installed: {}", e);
    }

    tracing::info!(
        "Logging to {} (level={}, format={})",
        log_file_path(settings).display(),
        settings.level,
        settings.format
    );
    Ok(())
}
