//! The update transaction.
//!
//! [`UpdateTransaction`] drives one update from release lookup to relaunch:
//!
//! ```text
//! Idle → Resolving → AwaitingRelease → BackingUp → Downloading → Cleanup → Relaunching → Done
//!                                                       │
//!                                                       └──▶ RollingBack → Failed | Aborted
//! ```
//!
//! The target executable is only written while `Downloading`, and a backup
//! slot always exists at that point. Every failure or cancellation after the
//! target was opened restores the backup before the transaction ends. If the
//! restore itself fails the slot is left on disk and the outcome names it.
//!
//! Cancellation is a future passed to [`UpdateTransaction::run`]. It is
//! raced against every step that can block: the release lookup, the wait for
//! the target to be released, the download and the pause before relaunch.

use crate::config::UpdaterConfig;
use crate::core::{LaunchError, UpdateError};
use crate::layout::InstallationLayout;
use crate::lock_probe::{self, LockProbe};
use crate::process::{self, ProcessLocator};
use crate::prompt::{AutoContinue, OperatorPrompt};
use crate::release::{ReleaseInfo, ReleaseSource};
use crate::upgrade::backup::{BackupManager, BackupSlot};
use crate::upgrade::download::{ArtifactFetcher, DownloadProgress};
use crate::upgrade::launch::{DetachedLauncher, Launcher};
use crate::upgrade::release_wait::{ReleaseWaitPolicy, wait_for_release};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Steps of the update transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Nothing has happened yet.
    Idle,
    /// Looking up the latest release.
    Resolving,
    /// Waiting for running instances to let go of the target.
    AwaitingRelease,
    /// Copying the target into the backup slot.
    BackingUp,
    /// Writing the new executable over the target.
    Downloading,
    /// Copying the backup back over the target.
    RollingBack,
    /// Removing the backup after a successful download.
    Cleanup,
    /// Starting the new executable.
    Relaunching,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
    /// Stopped by the operator.
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::AwaitingRelease => "awaiting-release",
            Self::BackingUp => "backing-up",
            Self::Downloading => "downloading",
            Self::RollingBack => "rolling-back",
            Self::Cleanup => "cleanup",
            Self::Relaunching => "relaunching",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Why a transaction was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The operator interrupted the run.
    UserCancelled {
        /// State the transaction was in when the interrupt arrived.
        during: TransactionState,
        /// Whether the backup had to be restored.
        rolled_back: bool,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserCancelled {
                during,
                rolled_back: true,
            } => write!(f, "cancelled by user while {during}; previous version restored"),
            Self::UserCancelled {
                during,
                rolled_back: false,
            } => write!(f, "cancelled by user while {during}; nothing was changed"),
        }
    }
}

/// What happened to the relaunch after a successful update.
#[derive(Debug)]
pub enum LaunchStatus {
    /// The new executable is running.
    Launched {
        /// Process id of the child
        pid: u32,
    },
    /// Relaunch was disabled or skipped by the operator.
    Skipped,
    /// Starting the executable failed. The update itself stands.
    Failed(LaunchError),
}

/// Final result of a transaction.
#[derive(Debug)]
pub enum TransactionOutcome {
    /// The new version is installed.
    Succeeded {
        /// Installed release tag
        version: String,
        /// Relaunch result
        launch: LaunchStatus,
    },
    /// The operator stopped the run and the installation is unchanged.
    Aborted {
        /// Details of the cancellation
        reason: AbortReason,
    },
    /// The run failed. See [`UpdateError`] for what state the target is in.
    Failed {
        /// The failure
        error: UpdateError,
    },
}

impl TransactionOutcome {
    /// Process exit code: `0` for success and clean cancellation, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Succeeded { .. } | Self::Aborted { .. } => 0,
            Self::Failed { .. } => 1,
        }
    }

    /// Whether a new version was installed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Outcome plus the path the transaction took.
#[derive(Debug)]
pub struct TransactionReport {
    /// Final result.
    pub outcome: TransactionOutcome,
    /// Every state entered, in order, starting with [`TransactionState::Idle`].
    pub visited: Vec<TransactionState>,
    /// Release that was resolved, if resolution got that far.
    pub release: Option<ReleaseInfo>,
}

impl TransactionReport {
    /// Whether the transaction passed through `state`.
    pub fn passed_through(&self, state: TransactionState) -> bool {
        self.visited.contains(&state)
    }
}

/// Tunables for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSettings {
    /// Release feed to query.
    pub feed_url: String,
    /// How long and how often to wait for the target to be released.
    pub wait: ReleaseWaitPolicy,
    /// Start the new executable when done.
    pub relaunch: bool,
    /// Ask the operator before relaunching.
    pub pause_before_relaunch: bool,
}

impl Default for TransactionSettings {
    fn default() -> Self {
        Self::from_config(&UpdaterConfig::default())
    }
}

impl TransactionSettings {
    /// Take the settings from configuration.
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self {
            feed_url: config.feed_url.clone(),
            wait: ReleaseWaitPolicy::from_config(config),
            relaunch: config.relaunch,
            pause_before_relaunch: config.pause_before_relaunch,
        }
    }
}

type ProgressCallback = Box<dyn FnMut(DownloadProgress) + Send>;

/// One update of the target executable.
///
/// Platform capabilities default to the best available implementation and
/// can be replaced with the `with_*` builders.
///
/// # Examples
///
/// ```rust,no_run
/// use ymu_self_updater::layout::InstallationLayout;
/// use ymu_self_updater::release::GitHubReleaseResolver;
/// use ymu_self_updater::upgrade::{Downloader, TransactionSettings, UpdateTransaction};
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let layout = InstallationLayout::detect("ymu.exe")?;
/// let resolver = GitHubReleaseResolver::new("ymu.exe", Duration::from_secs(10))?;
/// let downloader = Downloader::new(Duration::from_secs(15), Duration::from_secs(1))?;
///
/// let mut transaction =
///     UpdateTransaction::new(layout, TransactionSettings::default(), resolver, downloader);
/// let report = transaction.run(std::future::pending()).await;
/// std::process::exit(report.outcome.exit_code());
/// # }
/// ```
pub struct UpdateTransaction<R, F> {
    layout: InstallationLayout,
    settings: TransactionSettings,
    resolver: R,
    fetcher: F,
    backups: BackupManager,
    probe: Arc<dyn LockProbe>,
    locator: Arc<dyn ProcessLocator>,
    launcher: Box<dyn Launcher>,
    prompt: Arc<dyn OperatorPrompt>,
    on_progress: ProgressCallback,
}

impl<R, F> UpdateTransaction<R, F>
where
    R: ReleaseSource,
    F: ArtifactFetcher,
{
    /// Prepare a transaction for `layout`.
    pub fn new(layout: InstallationLayout, settings: TransactionSettings, resolver: R, fetcher: F) -> Self {
        let backups = BackupManager::from_layout(&layout);
        let locator = process::detect(&layout.target_exe);

        Self {
            layout,
            settings,
            resolver,
            fetcher,
            backups,
            probe: lock_probe::detect(),
            locator,
            launcher: Box::new(DetachedLauncher),
            prompt: Arc::new(AutoContinue),
            on_progress: Box::new(|_: DownloadProgress| {}),
        }
    }

    /// Replace the lock probe.
    pub fn with_lock_probe(mut self, probe: Arc<dyn LockProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the process locator.
    pub fn with_process_locator(mut self, locator: Arc<dyn ProcessLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Replace the launcher.
    pub fn with_launcher(mut self, launcher: Box<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replace the operator prompt.
    pub fn with_prompt(mut self, prompt: Arc<dyn OperatorPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    /// Receive download progress.
    pub fn with_progress(mut self, on_progress: impl FnMut(DownloadProgress) + Send + 'static) -> Self {
        self.on_progress = Box::new(on_progress);
        self
    }

    /// Layout this transaction operates on.
    pub fn layout(&self) -> &InstallationLayout {
        &self.layout
    }

    /// Run the transaction to completion.
    ///
    /// `cancel` resolves when the operator asks to stop. Pass
    /// [`std::future::pending`] for an uncancellable run.
    pub async fn run<C>(&mut self, cancel: C) -> TransactionReport
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let mut journal = Journal::new();
        let outcome = self.drive(&mut journal, cancel.as_mut()).await;

        match &outcome {
            TransactionOutcome::Succeeded { version, .. } => {
                journal.enter(TransactionState::Done);
                info!(version = %version, "Update completed successfully");
            }
            TransactionOutcome::Aborted { reason } => {
                journal.enter(TransactionState::Aborted);
                warn!("Update aborted: {}", reason);
            }
            TransactionOutcome::Failed { error } => {
                journal.enter(TransactionState::Failed);
                if error.is_critical() {
                    error!(severity = "critical", "Update failed: {}", error);
                } else {
                    error!("Update failed: {}", error);
                }
            }
        }

        TransactionReport {
            outcome,
            visited: journal.visited,
            release: journal.release,
        }
    }

    async fn drive<C>(&mut self, journal: &mut Journal, mut cancel: Pin<&mut C>) -> TransactionOutcome
    where
        C: Future<Output = ()>,
    {
        journal.enter(TransactionState::Resolving);
        let resolved = tokio::select! {
            biased;
            () = cancel.as_mut() => return cancelled(TransactionState::Resolving, false),
            resolved = self.resolver.fetch_latest(&self.settings.feed_url) => resolved,
        };
        let release = match resolved {
            Ok(release) => release,
            Err(e) => return failed(e.into()),
        };
        info!(version = %release.version, url = %release.download_url, "Resolved latest release");
        journal.release = Some(release.clone());

        journal.enter(TransactionState::AwaitingRelease);
        let target = self.layout.target_exe.clone();
        if !target.is_file() {
            return failed(UpdateError::TargetMissing { path: target });
        }
        let waited = tokio::select! {
            biased;
            () = cancel.as_mut() => return cancelled(TransactionState::AwaitingRelease, false),
            waited = wait_for_release(
                &target,
                Arc::clone(&self.probe),
                Arc::clone(&self.locator),
                self.settings.wait,
            ) => waited,
        };
        match waited {
            Ok(waited) => debug!(?waited, "Target released"),
            Err(e) => return failed(e),
        }

        journal.enter(TransactionState::BackingUp);
        let slot = match self.backups.create(&target).await {
            Ok(slot) => slot,
            Err(e) => {
                error!(backup = %self.backups.backup_path().display(), "Backup failed: {}", e);
                return failed(e.into());
            }
        };
        if is_cancelled(cancel.as_mut()).await {
            self.discard(slot).await;
            return cancelled(TransactionState::BackingUp, false);
        }

        journal.enter(TransactionState::Downloading);
        let interruption = {
            let on_progress = &mut *self.on_progress;
            tokio::select! {
                biased;
                () = cancel.as_mut() => Some(Interruption::Cancelled),
                fetched = self.fetcher.fetch(&release.download_url, &target, on_progress) => match fetched {
                    Ok(bytes) => {
                        info!(bytes, "Downloaded {}", release.version);
                        None
                    }
                    Err(e) => Some(Interruption::Failed(e.into())),
                },
            }
        };

        if let Some(interruption) = interruption {
            journal.enter(TransactionState::RollingBack);
            return self.roll_back(slot, interruption).await;
        }

        journal.enter(TransactionState::Cleanup);
        self.discard(slot).await;

        journal.enter(TransactionState::Relaunching);
        let launch = self.relaunch(&release, cancel).await;
        TransactionOutcome::Succeeded {
            version: release.version,
            launch,
        }
    }

    async fn roll_back(&self, slot: BackupSlot, interruption: Interruption) -> TransactionOutcome {
        match &interruption {
            Interruption::Cancelled => warn!("Download cancelled by user; rolling back"),
            Interruption::Failed(e) => warn!("Download failed: {}; rolling back", e),
        }

        match self.backups.restore(&slot).await {
            Ok(()) => {
                self.discard(slot).await;
                match interruption {
                    Interruption::Cancelled => cancelled(TransactionState::Downloading, true),
                    Interruption::Failed(error) => failed(error),
                }
            }
            Err(restore_error) => {
                let cause = match &interruption {
                    Interruption::Cancelled => "cancellation".to_string(),
                    Interruption::Failed(e) => e.to_string(),
                };
                error!(
                    severity = "critical",
                    backup = %slot.backup_path.display(),
                    "Failed to restore backup: {}",
                    restore_error
                );
                failed(UpdateError::RestoreFailed {
                    backup_path: slot.backup_path,
                    cause,
                    source: restore_error,
                })
            }
        }
    }

    async fn relaunch<C>(&self, release: &ReleaseInfo, mut cancel: Pin<&mut C>) -> LaunchStatus
    where
        C: Future<Output = ()>,
    {
        if !self.settings.relaunch {
            info!("Relaunch disabled");
            return LaunchStatus::Skipped;
        }

        if self.settings.pause_before_relaunch {
            let prompt = Arc::clone(&self.prompt);
            let message = format!(
                "Updated to {}. Press Enter to start {}...",
                release.version,
                self.layout.target_name()
            );
            tokio::select! {
                biased;
                () = cancel.as_mut() => {
                    info!("Relaunch skipped by user");
                    return LaunchStatus::Skipped;
                }
                _ = tokio::task::spawn_blocking(move || prompt.pause(&message)) => {}
            }
        }

        match self.launcher.launch(&self.layout.target_exe) {
            Ok(pid) => LaunchStatus::Launched { pid },
            Err(e) => {
                warn!("{}", e);
                LaunchStatus::Failed(e)
            }
        }
    }

    async fn discard(&self, slot: BackupSlot) {
        let dir = slot.backup_dir.clone();
        if let Err(e) = self.backups.discard(slot).await {
            warn!("Failed to remove backup directory {}: {}", dir.display(), e);
        }
    }
}

enum Interruption {
    Cancelled,
    Failed(UpdateError),
}

struct Journal {
    state: TransactionState,
    visited: Vec<TransactionState>,
    release: Option<ReleaseInfo>,
}

impl Journal {
    fn new() -> Self {
        Self {
            state: TransactionState::Idle,
            visited: vec![TransactionState::Idle],
            release: None,
        }
    }

    fn enter(&mut self, next: TransactionState) {
        info!(from = %self.state, to = %next, "State transition");
        self.state = next;
        self.visited.push(next);
    }
}

fn failed(error: UpdateError) -> TransactionOutcome {
    TransactionOutcome::Failed { error }
}

fn cancelled(during: TransactionState, rolled_back: bool) -> TransactionOutcome {
    TransactionOutcome::Aborted {
        reason: AbortReason::UserCancelled { during, rolled_back },
    }
}

async fn is_cancelled<C>(cancel: Pin<&mut C>) -> bool
where
    C: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = cancel => true,
        () = std::future::ready(()) => false,
    }
}
