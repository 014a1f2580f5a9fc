//! Configuration for the self-updater.
//!
//! Every setting has a default, so the updater runs without any file on
//! disk. An `updater.toml` placed in the log directory (or passed with
//! `--config`) overrides individual keys, and command-line flags override
//! the file.
//!
//! ```toml
//! feed_url = "https://api.github.com/repos/tommylam120/YMU/releases/latest"
//! lock_wait_timeout_secs = 15
//! relaunch = true
//! ```

use crate::constants::{
    API_REQUEST_TIMEOUT, AUTO_CONTINUE_SECS, DEFAULT_FEED_URL, DOWNLOAD_CONNECT_TIMEOUT,
    LOCK_POLL_INTERVAL, PROGRESS_REPORT_INTERVAL, TARGET_EXE_NAME, TERMINATION_GRACE_PERIOD,
    default_lock_wait_timeout,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Configuration settings for an update run.
///
/// Durations are stored as plain integers so the TOML stays readable; use the
/// accessor methods to get [`Duration`] values.
///
/// # Examples
///
/// ```rust,no_run
/// use ymu_self_updater::config::UpdaterConfig;
///
/// let config = UpdaterConfig::default();
/// assert_eq!(config.lock_wait_timeout_secs, 15);
/// assert!(config.relaunch);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Release feed returning the latest release as JSON.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// File name of the executable to update.
    ///
    /// The release asset with the same name (compared case-insensitively)
    /// is the one that gets downloaded.
    #[serde(default = "default_target_name")]
    pub target_name: String,

    /// Wall-clock deadline for the target to be released by other processes.
    #[serde(default = "default_lock_wait_timeout_secs")]
    pub lock_wait_timeout_secs: u64,

    /// Sleep between two lock probes, in milliseconds.
    #[serde(default = "default_lock_poll_interval_ms")]
    pub lock_poll_interval_ms: u64,

    /// Time a running instance gets to exit before it is killed.
    #[serde(default = "default_termination_grace_secs")]
    pub termination_grace_secs: u64,

    /// Connection timeout for the artifact download.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Total timeout for the release feed request.
    #[serde(default = "default_api_timeout_secs")]
    pub api_timeout_secs: u64,

    /// Minimum spacing between progress updates, in milliseconds.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Seconds before the relaunch pause continues on its own when no
    /// terminal is attached.
    #[serde(default = "default_auto_continue_secs")]
    pub auto_continue_secs: u64,

    /// Whether to start the new executable after a successful update.
    #[serde(default = "default_true")]
    pub relaunch: bool,

    /// Whether to wait for the operator before relaunching.
    #[serde(default = "default_true")]
    pub pause_before_relaunch: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            target_name: default_target_name(),
            lock_wait_timeout_secs: default_lock_wait_timeout_secs(),
            lock_poll_interval_ms: default_lock_poll_interval_ms(),
            termination_grace_secs: default_termination_grace_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            api_timeout_secs: default_api_timeout_secs(),
            progress_interval_ms: default_progress_interval_ms(),
            auto_continue_secs: default_auto_continue_secs(),
            relaunch: default_true(),
            pause_before_relaunch: default_true(),
        }
    }
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_target_name() -> String {
    TARGET_EXE_NAME.to_string()
}

fn default_lock_wait_timeout_secs() -> u64 {
    default_lock_wait_timeout().as_secs()
}

fn default_lock_poll_interval_ms() -> u64 {
    LOCK_POLL_INTERVAL.as_millis() as u64
}

fn default_termination_grace_secs() -> u64 {
    TERMINATION_GRACE_PERIOD.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    DOWNLOAD_CONNECT_TIMEOUT.as_secs()
}

fn default_api_timeout_secs() -> u64 {
    API_REQUEST_TIMEOUT.as_secs()
}

fn default_progress_interval_ms() -> u64 {
    PROGRESS_REPORT_INTERVAL.as_millis() as u64
}

fn default_auto_continue_secs() -> u64 {
    AUTO_CONTINUE_SECS
}

fn default_true() -> bool {
    true
}

impl UpdaterConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `path`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or is not valid TOML.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read updater config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse updater config from {}", path.display()))
    }

    /// Load from an explicit path, or from `fallback` when it exists, or
    /// fall back to defaults.
    ///
    /// An explicit path that does not exist is an error; a missing fallback
    /// file is not.
    pub async fn load_with_optional(explicit: Option<&Path>, fallback: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path).await;
        }

        if fallback.is_file() {
            debug!("Loading updater config from {}", fallback.display());
            Self::load_from(fallback).await
        } else {
            Ok(Self::default())
        }
    }

    /// Deadline for the target executable to be released.
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_wait_timeout_secs)
    }

    /// Interval between lock probes.
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    /// Grace period for a running instance to exit.
    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }

    /// Connection timeout for artifact downloads.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Total timeout for the release feed request.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Minimum spacing between progress reports.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// How long the relaunch pause waits without a terminal.
    pub fn auto_continue(&self) -> Duration {
        Duration::from_secs(self.auto_continue_secs)
    }
}
