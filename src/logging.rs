//! Logging setup.
//!
//! Log lines go to stderr and to `logs/deckscan.log` next to the executable.
//! Stdout is left to the event stream.

use anyhow::{Result, anyhow};
use chrono::Local;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::paths;

/// Environment variable holding the filter directive, e.g. `deckscan=debug`.
pub const LOG_ENV: &str = "DECKSCAN_LOG";

const LOG_FILE: &str = "deckscan.log";

/// `[HH:MM:SS.mmm]` local timestamps.
struct LocalClock;

impl FormatTime for LocalClock {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", Local::now().format("%H:%M:%S%.3f"))
    }
}

/// Installs the global subscriber. The file sink is skipped with a warning
/// when the log file cannot be opened.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalClock)
        .with_target(false);

    let log_path = paths::get_logs_dir().join(LOG_FILE);
    let (file_layer, file_error) =
        match OpenOptions::new().create(true).append(true).open(&log_path) {
            Ok(file) => {
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_timer(LocalClock)
                    .with_ansi(false);
                (Some(layer), None)
            }
            Err(e) => (None, Some(e)),
        };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    if let Some(e) = file_error {
        tracing::warn!("Log file {} unavailable: {}", log_path.display(), e);
    }

    Ok(())
}
