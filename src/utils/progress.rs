//! Download progress display.
//!
//! A thin wrapper over `indicatif` with the updater's styling. The bar is
//! hidden when progress is disabled on the command line or through the
//! environment, so piped output and logs stay clean.
//!
//! # Environment Variables
//!
//! - `YMU_NO_PROGRESS`: set to any value to hide the bar

use crate::upgrade::DownloadProgress;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};

/// Environment variable that hides progress output.
pub const NO_PROGRESS_ENV: &str = "YMU_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// Byte progress bar for the artifact download.
///
/// Starts as a spinner and switches to a bar once the total size is known.
/// Nothing is drawn before the first update.
/// Cloning shares the same bar.
#[derive(Debug, Clone)]
pub struct DownloadBar {
    inner: IndicatifBar,
}

impl DownloadBar {
    /// Create a bar labelled `prefix`, hidden unless `enabled`.
    pub fn new(prefix: &str, enabled: bool) -> Self {
        let bar = if !enabled || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(ProgressStyle::bytes_spinner());
            bar
        };
        bar.set_prefix(prefix.to_string());
        Self { inner: bar }
    }

    /// Whether output is suppressed.
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    /// Show `progress`.
    pub fn update(&self, progress: DownloadProgress) {
        if progress.total_bytes > 0 && self.inner.length() != Some(progress.total_bytes) {
            self.inner.set_length(progress.total_bytes);
            self.inner.set_style(ProgressStyle::download());
        }
        self.inner.set_position(progress.bytes_received);
    }

    /// Callback suitable for [`UpdateTransaction::with_progress`](crate::upgrade::UpdateTransaction::with_progress).
    pub fn callback(&self) -> impl FnMut(DownloadProgress) + Send + 'static {
        let bar = self.clone();
        move |progress| bar.update(progress)
    }

    /// Finish and leave the bar on screen.
    pub fn finish(&self) {
        self.inner.finish();
    }

    /// Remove the bar, e.g. before printing an error.
    pub fn clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Progress styles used by the updater.
pub struct ProgressStyle;

impl ProgressStyle {
    /// Bar with byte counts and ETA.
    ///
    /// ```text
    /// ymu.exe [━━━━━━━━━━━━━━━━━━━━╸━━━━━━━━━━━━━━━━━━━] 2.1 MiB/4.2 MiB (00:05)
    /// ```
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| IndicatifStyle::default_bar())
            .progress_chars("━╸━")
    }

    /// Spinner with a byte count, for downloads of unknown size.
    pub fn bytes_spinner() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.cyan} {bytes}")
            .unwrap_or_else(|_| IndicatifStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bar_is_hidden() {
        let bar = DownloadBar::new("ymu.exe", false);
        assert!(bar.is_hidden());

        // Updates on a hidden bar are accepted silently.
        bar.update(DownloadProgress {
            bytes_received: 10,
            total_bytes: 100,
        });
        bar.finish();
    }

    #[test]
    fn test_update_switches_to_known_length() {
        let bar = DownloadBar::new("ymu.exe", false);
        let mut callback = bar.callback();
        callback(DownloadProgress {
            bytes_received: 40,
            total_bytes: 100,
        });

        assert_eq!(bar.inner.length(), Some(100));
        assert_eq!(bar.inner.position(), 40);
    }
}
