//! Locating and terminating running instances of the target executable.
//!
//! Process enumeration is a platform capability that may be missing. The
//! [`ProcessLocator`] trait hides which implementation is active:
//!
//! - [`SysinfoLocator`] - enumerates processes through `sysinfo`
//! - [`NoopLocator`] - always reports "not running"
//!
//! A "not running" answer from the no-op locator is not a guarantee. Callers
//! keep probing the file itself with a
//! [`LockProbe`](crate::lock_probe::LockProbe).

use crate::constants::TERMINATION_POLL_INTERVAL;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, Signal, System};
use tracing::{debug, info, warn};

/// Finds and stops processes running the target executable.
pub trait ProcessLocator: Send + Sync {
    /// Whether any process other than the caller is running the target.
    fn is_target_running(&self) -> bool;

    /// Ask matching processes to exit, wait up to `grace_period`, then kill
    /// the survivors.
    ///
    /// Returns `true` when at least one process matched and none are left.
    fn terminate_target(&self, grace_period: Duration) -> bool;

    /// `true` when this locator cannot actually see processes.
    fn is_degraded(&self) -> bool {
        false
    }
}

/// Select the best locator available on this platform.
pub fn detect(target: &Path) -> Arc<dyn ProcessLocator> {
    if sysinfo::IS_SUPPORTED_SYSTEM {
        Arc::new(SysinfoLocator::new(target))
    } else {
        warn!("Process enumeration unavailable; relying on file lock probing only");
        Arc::new(NoopLocator)
    }
}

/// Whether a process with `name` and `exe` is an instance of the target.
///
/// Both comparisons ignore case, matching Windows filesystem semantics.
pub fn matches_target(name: &str, exe: Option<&Path>, target_name: &str, target: &Path) -> bool {
    if name.eq_ignore_ascii_case(target_name) {
        return true;
    }

    exe.is_some_and(|exe| {
        exe.to_string_lossy().to_lowercase() == target.to_string_lossy().to_lowercase()
    })
}

/// [`ProcessLocator`] backed by the `sysinfo` process table.
pub struct SysinfoLocator {
    target: PathBuf,
    target_name: String,
    own_pid: Option<Pid>,
}

impl SysinfoLocator {
    /// Create a locator for `target`.
    pub fn new(target: &Path) -> Self {
        let target = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
        let target_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            target,
            target_name,
            own_pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn snapshot() -> System {
        let mut system = System::new();
        system.refresh_processes();
        system
    }

    fn matching_pids(&self, system: &System) -> Vec<Pid> {
        system
            .processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != self.own_pid)
            .filter(|(_, process)| {
                matches_target(process.name(), process.exe(), &self.target_name, &self.target)
            })
            .map(|(pid, _)| *pid)
            .collect()
    }
}

impl ProcessLocator for SysinfoLocator {
    fn is_target_running(&self) -> bool {
        !self.matching_pids(&Self::snapshot()).is_empty()
    }

    fn terminate_target(&self, grace_period: Duration) -> bool {
        let mut system = Self::snapshot();
        let mut remaining = self.matching_pids(&system);
        if remaining.is_empty() {
            return false;
        }

        for pid in &remaining {
            let Some(process) = system.process(*pid) else {
                continue;
            };
            match process.kill_with(Signal::Term) {
                Some(true) => debug!(pid = %pid, "Sent termination request"),
                // No graceful signal on this platform, or it was refused.
                _ => {
                    debug!(pid = %pid, "Graceful termination unavailable; killing");
                    process.kill();
                }
            }
        }

        let deadline = Instant::now() + grace_period;
        loop {
            remaining.retain(|pid| system.refresh_process(*pid));
            if remaining.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(TERMINATION_POLL_INTERVAL);
        }

        for pid in &remaining {
            if let Some(process) = system.process(*pid) {
                warn!(pid = %pid, "Process ignored termination request; killing");
                process.kill();
            }
        }

        if !remaining.is_empty() {
            std::thread::sleep(TERMINATION_POLL_INTERVAL);
            remaining.retain(|pid| system.refresh_process(*pid));
        }

        if remaining.is_empty() {
            info!(target = %self.target.display(), "Terminated running instances");
            true
        } else {
            warn!(count = remaining.len(), "Some instances are still running");
            false
        }
    }
}

/// [`ProcessLocator`] used when processes cannot be enumerated.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLocator;

impl ProcessLocator for NoopLocator {
    fn is_target_running(&self) -> bool {
        false
    }

    fn terminate_target(&self, _grace_period: Duration) -> bool {
        false
    }

    fn is_degraded(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_by_name_ignoring_case() {
        let target = Path::new(r"C:\Games\YMU\ymu.exe");
        assert!(matches_target("YMU.EXE", None, "ymu.exe", target));
        assert!(!matches_target("ymu-updater.exe", None, "ymu.exe", target));
    }

    #[test]
    fn test_matches_by_executable_path() {
        let target = Path::new("/opt/ymu/ymu.exe");
        assert!(matches_target(
            "wine-preloader",
            Some(Path::new("/OPT/YMU/YMU.EXE")),
            "ymu.exe",
            target
        ));
        assert!(!matches_target(
            "wine-preloader",
            Some(Path::new("/opt/other/ymu2.exe")),
            "ymu.exe",
            target
        ));
    }

    #[test]
    fn test_own_process_is_excluded() {
        let own_exe = std::env::current_exe().unwrap();
        let locator = SysinfoLocator::new(&own_exe);
        assert!(!locator.is_target_running());
    }

    #[test]
    fn test_terminate_without_matches_reports_nothing_done() {
        let locator = SysinfoLocator::new(Path::new("/nonexistent/definitely-not-running.exe"));
        assert!(!locator.is_target_running());
        assert!(!locator.terminate_target(Duration::from_millis(10)));
    }

    #[test]
    fn test_noop_locator_is_degraded() {
        let locator = NoopLocator;
        assert!(locator.is_degraded());
        assert!(!locator.is_target_running());
        assert!(!locator.terminate_target(Duration::from_secs(1)));
    }
}
