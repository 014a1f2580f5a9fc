//! Global constants used throughout the updater.
//!
//! Timeouts, file names and other fixed values shared by several modules.
//! Most of the durations here are only defaults; the values actually used at
//! runtime come from [`UpdaterConfig`](crate::config::UpdaterConfig).

use std::time::Duration;

/// Release feed queried when no override is configured.
pub const DEFAULT_FEED_URL: &str = "https://api.github.com/repos/tommylam120/YMU/releases/latest";

/// File name of the executable being updated.
///
/// Also used to pick the matching asset from the release feed.
pub const TARGET_EXE_NAME: &str = "ymu.exe";

/// Directory under `%APPDATA%` that holds the log file in the AppData layout.
pub const APPDATA_DIR_NAME: &str = "YMU";

/// Log directory relative to the working directory in the legacy layout.
pub const LEGACY_LOG_DIR_NAME: &str = "ymu";

/// Name of the log file inside the log directory.
pub const LOG_FILE_NAME: &str = "ymu.log";

/// Directory that holds the single backup slot.
pub const BACKUP_DIR_NAME: &str = "_backup";

/// Optional configuration file looked up in the log directory.
pub const CONFIG_FILE_NAME: &str = "updater.toml";

/// Tag written on every log line so updater output stands apart from YMU's own.
pub const LOG_TAG: &str = "YMU-SU";

/// Default deadline for the target executable to be released (15 seconds).
///
/// Expiry fails the transaction before any backup is taken.
pub fn default_lock_wait_timeout() -> Duration {
    Duration::from_secs(15)
}

/// Sleep between two lock probes while waiting for release.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long a terminated process gets to exit before it is killed.
pub const TERMINATION_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Poll interval while waiting for a terminated process to disappear.
pub const TERMINATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on connection establishment for artifact downloads.
///
/// There is deliberately no cap on the total transfer time.
pub const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Total timeout for the release feed request.
pub const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffer size used when streaming a download to disk (8 KiB).
pub const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;

/// Minimum spacing between two progress callbacks during a download.
pub const PROGRESS_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Number of attempts made when copying a backup back over the target.
pub const RESTORE_MAX_ATTEMPTS: u32 = 3;

/// Delay between restore attempts.
pub const RESTORE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Seconds to wait before relaunching when no terminal is attached.
pub const AUTO_CONTINUE_SECS: u64 = 5;
