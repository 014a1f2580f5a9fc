//! Fake implementations of the transaction's capability traits.

use crate::core::{LaunchError, ResolveError, TransferError};
use crate::lock_probe::{LockProbe, ProbeStrategy};
use crate::process::ProcessLocator;
use crate::prompt::OperatorPrompt;
use crate::release::{ReleaseInfo, ReleaseSource};
use crate::upgrade::{ArtifactFetcher, DownloadProgress, Launcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// [`LockProbe`] reporting "locked" for a fixed number of checks.
#[derive(Debug)]
pub struct FakeLockProbe {
    locked_checks: Option<usize>,
    checks: AtomicUsize,
}

impl FakeLockProbe {
    /// Never locked.
    pub fn unlocked() -> Self {
        Self::locked_for(0)
    }

    /// Locked for the first `checks` probes, free afterwards.
    pub fn locked_for(checks: usize) -> Self {
        Self {
            locked_checks: Some(checks),
            checks: AtomicUsize::new(0),
        }
    }

    /// Locked forever.
    pub fn always_locked() -> Self {
        Self {
            locked_checks: None,
            checks: AtomicUsize::new(0),
        }
    }

    /// Number of probes made so far.
    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl LockProbe for FakeLockProbe {
    fn is_locked(&self, _path: &Path) -> bool {
        let index = self.checks.fetch_add(1, Ordering::SeqCst);
        self.locked_checks.is_none_or(|limit| index < limit)
    }

    fn strategy(&self) -> ProbeStrategy {
        ProbeStrategy::Precise
    }
}

/// [`ProcessLocator`] with a scripted running instance.
#[derive(Debug, Default)]
pub struct FakeLocator {
    running: AtomicBool,
    degraded: bool,
    terminations: AtomicUsize,
}

impl FakeLocator {
    /// No instance is running.
    pub fn idle() -> Self {
        Self::default()
    }

    /// One instance is running and exits when terminated.
    pub fn running() -> Self {
        Self {
            running: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// A locator that cannot see processes.
    pub fn degraded() -> Self {
        Self {
            degraded: true,
            ..Self::default()
        }
    }

    /// Number of termination requests received.
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }
}

impl ProcessLocator for FakeLocator {
    fn is_target_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn terminate_target(&self, _grace_period: Duration) -> bool {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.running.swap(false, Ordering::SeqCst)
    }

    fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// [`Launcher`] that records launches instead of starting processes.
///
/// Clones share the record, so a test can keep one clone after handing the
/// other to a transaction.
#[derive(Debug, Clone, Default)]
pub struct RecordingLauncher {
    launches: Arc<Mutex<Vec<PathBuf>>>,
    fail: bool,
}

impl RecordingLauncher {
    /// A launcher that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// A launcher that always fails with "permission denied".
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Paths launched so far, including failed attempts.
    pub fn launches(&self) -> Vec<PathBuf> {
        self.launches.lock().map(|launches| launches.clone()).unwrap_or_default()
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, path: &Path) -> Result<u32, LaunchError> {
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(path.to_path_buf());
        }
        if self.fail {
            return Err(LaunchError {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied"),
            });
        }
        Ok(4242)
    }
}

#[derive(Debug, Clone)]
enum ReleaseScript {
    Available(ReleaseInfo),
    Malformed(String),
    Pending,
}

/// [`ReleaseSource`] with a scripted answer.
#[derive(Debug, Clone)]
pub struct FakeRelease {
    script: ReleaseScript,
    calls: Arc<AtomicUsize>,
}

impl FakeRelease {
    /// Resolve to `version` downloadable from `url`.
    pub fn available(version: &str, url: &str) -> Self {
        Self::scripted(ReleaseScript::Available(ReleaseInfo {
            version: version.to_string(),
            download_url: url.to_string(),
        }))
    }

    /// Fail with [`ResolveError::MalformedResponse`].
    pub fn malformed(reason: &str) -> Self {
        Self::scripted(ReleaseScript::Malformed(reason.to_string()))
    }

    /// Never answer.
    pub fn pending() -> Self {
        Self::scripted(ReleaseScript::Pending)
    }

    fn scripted(script: ReleaseScript) -> Self {
        Self {
            script,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of lookups made.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for FakeRelease {
    async fn fetch_latest(&self, _feed_url: &str) -> Result<ReleaseInfo, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            ReleaseScript::Available(release) => Ok(release.clone()),
            ReleaseScript::Malformed(reason) => Err(ResolveError::MalformedResponse {
                reason: reason.clone(),
            }),
            ReleaseScript::Pending => std::future::pending().await,
        }
    }
}

/// [`OperatorPrompt`] that signals when the pause starts, then blocks.
#[derive(Debug, Clone)]
pub struct HoldingPrompt {
    started: Arc<Notify>,
    hold: Duration,
}

impl HoldingPrompt {
    /// Block each pause for `hold`.
    pub fn new(hold: Duration) -> Self {
        Self {
            started: Arc::new(Notify::new()),
            hold,
        }
    }

    /// Notified when a pause begins.
    pub fn started(&self) -> Arc<Notify> {
        Arc::clone(&self.started)
    }
}

impl OperatorPrompt for HoldingPrompt {
    fn pause(&self, _message: &str) {
        self.started.notify_one();
        std::thread::sleep(self.hold);
    }
}

#[derive(Debug, Clone)]
enum FetchScript {
    Write(Vec<u8>),
    FailAfter { partial: Vec<u8>, expected: u64 },
    DeleteBackupThenFail,
    Hang(Vec<u8>),
}

/// [`ArtifactFetcher`] with a scripted result.
///
/// Every call records whether the backup file existed when the download
/// started, and signals [`started`](Self::started).
#[derive(Debug, Clone)]
pub struct ScriptedFetcher {
    script: FetchScript,
    backup_path: PathBuf,
    backup_seen: Arc<Mutex<Vec<bool>>>,
    started: Arc<Notify>,
}

impl ScriptedFetcher {
    fn scripted(script: FetchScript, backup_path: &Path) -> Self {
        Self {
            script,
            backup_path: backup_path.to_path_buf(),
            backup_seen: Arc::default(),
            started: Arc::new(Notify::new()),
        }
    }

    /// Write `body` and succeed.
    pub fn writing(body: &[u8], backup_path: &Path) -> Self {
        Self::scripted(FetchScript::Write(body.to_vec()), backup_path)
    }

    /// Write `partial`, then fail as an incomplete transfer of `expected` bytes.
    pub fn failing_after(partial: &[u8], expected: u64, backup_path: &Path) -> Self {
        Self::scripted(
            FetchScript::FailAfter {
                partial: partial.to_vec(),
                expected,
            },
            backup_path,
        )
    }

    /// Delete the backup directory, corrupt the target and fail.
    pub fn deleting_backup(backup_path: &Path) -> Self {
        Self::scripted(FetchScript::DeleteBackupThenFail, backup_path)
    }

    /// Write `partial` and never finish.
    pub fn hanging_after(partial: &[u8], backup_path: &Path) -> Self {
        Self::scripted(FetchScript::Hang(partial.to_vec()), backup_path)
    }

    /// For each call, whether the backup existed when it started.
    pub fn backup_seen(&self) -> Vec<bool> {
        self.backup_seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }

    /// Notified when a download starts.
    pub fn started(&self) -> Arc<Notify> {
        Arc::clone(&self.started)
    }
}

impl ArtifactFetcher for ScriptedFetcher {
    async fn fetch(
        &self,
        _url: &str,
        dest: &Path,
        on_progress: &mut (dyn FnMut(DownloadProgress) + Send),
    ) -> Result<u64, TransferError> {
        if let Ok(mut seen) = self.backup_seen.lock() {
            seen.push(self.backup_path.is_file());
        }
        self.started.notify_one();

        let write = |bytes: Vec<u8>| async move {
            tokio::fs::write(dest, &bytes).await.map_err(|source| TransferError::Write {
                path: dest.to_path_buf(),
                source,
            })?;
            Ok::<u64, TransferError>(bytes.len() as u64)
        };

        match self.script.clone() {
            FetchScript::Write(body) => {
                let written = write(body).await?;
                on_progress(DownloadProgress {
                    bytes_received: written,
                    total_bytes: written,
                });
                Ok(written)
            }
            FetchScript::FailAfter { partial, expected } => {
                let received = write(partial).await?;
                Err(TransferError::Incomplete { received, expected })
            }
            FetchScript::DeleteBackupThenFail => {
                if let Some(dir) = self.backup_path.parent() {
                    let _ = tokio::fs::remove_dir_all(dir).await;
                }
                let received = write(b"corrupt".to_vec()).await?;
                Err(TransferError::Incomplete {
                    received,
                    expected: 1024,
                })
            }
            FetchScript::Hang(partial) => {
                write(partial).await?;
                std::future::pending().await
            }
        }
    }
}
