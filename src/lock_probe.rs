//! Probing whether a file is held open by another process.
//!
//! Two strategies are available behind [`LockProbe`]:
//!
//! - [`ProcfsProbe`] asks the OS which processes hold the file, by walking
//!   `/proc/<pid>/fd` and `/proc/<pid>/exe`. Only available where procfs is
//!   mounted.
//! - [`OpenProbe`] opens the file for append and tries a non-blocking
//!   exclusive lock. Any failure other than "not found" counts as locked.
//!
//! The open-based probe can report a file as free while another process
//! still holds a handle in a mode that blocks later writes. That false
//! negative is a known limitation; the download step will then fail and roll
//! back.

use fs4::fs_std::FileExt;
use std::fmt;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Which strategy a probe uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStrategy {
    /// Enumerates handle holders through the OS.
    Precise,
    /// Infers a lock from a failed open or lock attempt.
    OpenAttempt,
}

impl fmt::Display for ProbeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precise => f.write_str("precise"),
            Self::OpenAttempt => f.write_str("open-attempt"),
        }
    }
}

/// Reports whether a file is currently held by some process.
pub trait LockProbe: Send + Sync {
    /// `true` when `path` is open or locked elsewhere. A missing file is never locked.
    fn is_locked(&self, path: &Path) -> bool;

    /// Strategy in use, for logging.
    fn strategy(&self) -> ProbeStrategy;
}

/// Select the most precise probe this platform supports.
pub fn detect() -> Arc<dyn LockProbe> {
    if ProcfsProbe::is_available() {
        Arc::new(ProcfsProbe::default())
    } else {
        Arc::new(OpenProbe)
    }
}

/// [`LockProbe`] that attempts to open and exclusively lock the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenProbe;

impl LockProbe for OpenProbe {
    fn is_locked(&self, path: &Path) -> bool {
        let file = match OpenOptions::new().append(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return false,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Open attempt failed; treating as locked");
                return true;
            }
        };

        match file.try_lock_exclusive() {
            Ok(true) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Ok(false) => true,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Lock attempt failed; treating as locked");
                true
            }
        }
    }

    fn strategy(&self) -> ProbeStrategy {
        ProbeStrategy::OpenAttempt
    }
}

/// [`LockProbe`] that lists handle holders from `/proc`.
///
/// Processes whose entries cannot be read (other users, permissions) are
/// skipped, so the result covers what the current user can see.
#[derive(Debug, Clone)]
pub struct ProcfsProbe {
    own_pid: u32,
}

impl Default for ProcfsProbe {
    fn default() -> Self {
        Self {
            own_pid: std::process::id(),
        }
    }
}

impl ProcfsProbe {
    /// Whether `/proc` exposes per-process file descriptors.
    pub fn is_available() -> bool {
        Path::new("/proc/self/fd").is_dir()
    }

    /// Process ids holding `path` open or executing it, excluding ourselves.
    pub fn holders(&self, path: &Path) -> Vec<u32> {
        let Ok(target) = path.canonicalize() else {
            return Vec::new();
        };
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Vec::new();
        };

        entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .filter(|pid| *pid != self.own_pid)
            .filter(|pid| Self::process_holds(*pid, &target))
            .collect()
    }

    fn process_holds(pid: u32, target: &Path) -> bool {
        let proc_dir = Path::new("/proc").join(pid.to_string());

        if std::fs::read_link(proc_dir.join("exe")).is_ok_and(|exe| exe == target) {
            return true;
        }

        let Ok(fds) = std::fs::read_dir(proc_dir.join("fd")) else {
            return false;
        };
        fds.filter_map(Result::ok)
            .any(|fd| std::fs::read_link(fd.path()).is_ok_and(|link| link == target))
    }
}

impl LockProbe for ProcfsProbe {
    fn is_locked(&self, path: &Path) -> bool {
        let holders = self.holders(path);
        if !holders.is_empty() {
            debug!(path = %path.display(), ?holders, "File is held open");
        }
        !holders.is_empty()
    }

    fn strategy(&self) -> ProbeStrategy {
        ProbeStrategy::Precise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_locked() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.exe");

        assert!(!OpenProbe.is_locked(&missing));
        assert!(!ProcfsProbe::default().is_locked(&missing));
    }

    #[test]
    fn test_open_probe_free_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ymu.exe");
        std::fs::write(&path, b"binary").unwrap();

        assert!(!OpenProbe.is_locked(&path));
        // Probing must not modify the file.
        assert_eq!(std::fs::read(&path).unwrap(), b"binary");
    }

    #[test]
    fn test_open_probe_detects_exclusive_lock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ymu.exe");
        std::fs::write(&path, b"binary").unwrap();

        let holder = std::fs::File::open(&path).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        assert!(OpenProbe.is_locked(&path));

        FileExt::unlock(&holder).unwrap();
        drop(holder);
        assert!(!OpenProbe.is_locked(&path));
    }

    #[test]
    fn test_procfs_probe_ignores_own_handles() {
        if !ProcfsProbe::is_available() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ymu.exe");
        std::fs::write(&path, b"binary").unwrap();

        let _handle = std::fs::File::open(&path).unwrap();
        assert!(!ProcfsProbe::default().is_locked(&path));
    }

    #[cfg(unix)]
    #[test]
    fn test_procfs_probe_detects_other_process() {
        if !ProcfsProbe::is_available() {
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ymu.exe");
        std::fs::write(&path, b"binary").unwrap();

        let mut child = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("exec 3<'{}'; sleep 5", path.display()))
            .spawn()
            .unwrap();
        let probe = ProcfsProbe::default();

        // The shell opens the descriptor shortly after it starts.
        let mut holders = Vec::new();
        for _ in 0..100 {
            holders = probe.holders(&path);
            if holders.contains(&child.id()) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        let locked = probe.is_locked(&path);

        child.kill().unwrap();
        child.wait().unwrap();

        assert!(holders.contains(&child.id()), "holders: {holders:?}");
        assert!(locked);
        assert!(!probe.is_locked(&path));
    }

    #[test]
    fn test_strategies() {
        assert_eq!(OpenProbe.strategy(), ProbeStrategy::OpenAttempt);
        assert_eq!(ProcfsProbe::default().strategy(), ProbeStrategy::Precise);
        assert_eq!(ProbeStrategy::Precise.to_string(), "precise");
    }
}
