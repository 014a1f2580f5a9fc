//! The update transaction and its components.
//!
//! Replaces the installed YMU executable with the latest release, keeping a
//! backup until the new file is complete and restoring it on any failure.
//!
//! # Architecture Overview
//!
//! - **[`UpdateTransaction`]**: the coordinator; runs the steps below in
//!   order and maps every failure to exactly one [`TransactionOutcome`]
//! - **[`backup::BackupManager`]**: single-slot backup of the target
//! - **[`Downloader`]**: streams the release artifact over the target
//! - **[`release_wait`]**: waits for running instances to let go of the file
//! - **[`launch::DetachedLauncher`]**: starts the new version independently
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Resolve
//!    └── Query the release feed for the latest tag and asset URL
//!
//! 2. Await release
//!    ├── Probe the target for open handles
//!    ├── Terminate running instances
//!    └── Give up after the deadline (nothing changed yet)
//!
//! 3. Back up
//!    └── Copy the target into _backup/
//!
//! 4. Download
//!    ├── Stream the artifact over the target
//!    └── On failure or Ctrl+C: restore from _backup/
//!
//! 5. Clean up and relaunch
//!    ├── Remove _backup/
//!    ├── Optional pause for the operator
//!    └── Start the new executable detached
//! ```
//!
//! # Usage Patterns
//!
//! ```bash
//! ymu-updater                 # Update and relaunch
//! ymu-updater --check         # Show the latest version only
//! ymu-updater --rollback      # Restore a backup left by an interrupted run
//! ymu-updater --no-relaunch   # Update without starting YMU
//! ```
//!
//! # Exit Codes
//!
//! | Outcome | Code |
//! |---------|------|
//! | Succeeded (even if the relaunch failed) | 0 |
//! | Aborted by the operator | 0 |
//! | Failed | 1 |

/// Single-slot backup of the target executable.
pub mod backup;
/// Streaming artifact download with throttled progress.
pub mod download;
/// Detached process launch.
pub mod launch;
/// Waiting for the target to be released by other processes.
pub mod release_wait;
/// The update transaction coordinator.
pub mod transaction;

pub use backup::{BackupManager, BackupSlot};
pub use download::{ArtifactFetcher, DownloadProgress, Downloader, ProgressThrottle};
pub use launch::{DetachedLauncher, Launcher};
pub use release_wait::{ReleaseWaitPolicy, wait_for_release};
pub use transaction::{
    AbortReason, LaunchStatus, TransactionOutcome, TransactionReport, TransactionSettings,
    TransactionState, UpdateTransaction,
};
