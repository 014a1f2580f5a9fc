//! Log sink initialisation.
//!
//! All updater output that matters after the fact goes to a log file in the
//! layout's log directory. The terminal only sees the banner, progress and
//! the final outcome. Every line carries the `[YMU-SU]` tag.

use crate::constants::LOG_TAG;
use anyhow::{Context, Result};
use std::fmt;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{Format, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Event format that prefixes each line with [`LOG_TAG`].
#[derive(Debug, Clone)]
pub struct TaggedFormat {
    inner: Format,
}

impl Default for TaggedFormat {
    fn default() -> Self {
        Self {
            inner: Format::default().with_target(false).with_level(true),
        }
    }
}

impl<S, N> FormatEvent<S, N> for TaggedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "[{LOG_TAG}] ")?;
        self.inner.format_event(ctx, writer, event)
    }
}

/// Install the global tracing subscriber, appending to `log_file`.
///
/// `RUST_LOG` takes precedence over `default_level`. The log directory is
/// created when missing.
///
/// # Errors
///
/// Fails if the directory or file cannot be created, or a subscriber is
/// already installed.
pub fn init_logging(log_file: &Path, default_level: &str) -> Result<()> {
    if let Some(dir) = log_file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .event_format(TaggedFormat::default())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialise logging: {e}"))?;

    tracing::info!("--- YMU Self-Updater Initialized ---");
    Ok(())
}

/// Write the session end marker.
pub fn log_shutdown() {
    tracing::info!("--- YMU Self-Updater Shutting Down ---");
}
