//! Single-slot backup of the target executable.
//!
//! The backup lives at a fixed path derived from the installation layout
//! (`_backup/<exe>`). Its lifecycle during one transaction:
//!
//! ```text
//! absent ──create──▶ present ──discard──────────────▶ absent   (success)
//!                        └────restore──▶ present ──discard──▶ absent   (rollback)
//! ```
//!
//! A second [`BackupManager::create`] before cleanup overwrites the slot. A
//! slot left behind by an interrupted run can be adopted with
//! [`BackupManager::existing_slot`] and restored manually.

use crate::constants::{RESTORE_MAX_ATTEMPTS, RESTORE_RETRY_DELAY};
use crate::core::{BackupError, RestoreError};
use crate::layout::InstallationLayout;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// A backup that exists on disk for a specific target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSlot {
    /// Executable the backup was taken from.
    pub target: PathBuf,
    /// Directory holding the slot.
    pub backup_dir: PathBuf,
    /// Backup copy of the executable.
    pub backup_path: PathBuf,
    /// When the copy was made.
    pub created_at: DateTime<Utc>,
}

/// Creates, restores and removes the backup slot.
///
/// All operations are async and use `tokio::fs`. Restores retry a few times
/// because on Windows a handle released a moment ago can still block writes.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    backup_path: PathBuf,
}

impl BackupManager {
    /// Manage a slot at `backup_path` inside `backup_dir`.
    pub fn new(backup_dir: PathBuf, backup_path: PathBuf) -> Self {
        Self {
            backup_dir,
            backup_path,
        }
    }

    /// Manage the slot defined by `layout`.
    pub fn from_layout(layout: &InstallationLayout) -> Self {
        Self::new(layout.backup_dir.clone(), layout.backup_exe.clone())
    }

    /// Copy `target` into the slot, replacing any previous backup.
    ///
    /// # Errors
    ///
    /// Fails when `target` is missing, the slot cannot be written, or the
    /// copy is shorter than the original. The target itself is never touched.
    pub async fn create(&self, target: &Path) -> Result<BackupSlot, BackupError> {
        let source_meta = match fs::metadata(target).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                return Err(BackupError::SourceMissing {
                    path: target.to_path_buf(),
                });
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::SourceMissing {
                    path: target.to_path_buf(),
                });
            }
            Err(source) => return Err(io_error("read metadata", target, source)),
        };

        fs::create_dir_all(&self.backup_dir)
            .await
            .map_err(|e| io_error("create backup directory", &self.backup_dir, e))?;

        if fs::try_exists(&self.backup_path).await.unwrap_or(false) {
            debug!("Removing old backup at {}", self.backup_path.display());
            fs::remove_file(&self.backup_path)
                .await
                .map_err(|e| io_error("remove old backup", &self.backup_path, e))?;
        }

        info!("Creating backup at {}", self.backup_path.display());
        let copied = fs::copy(target, &self.backup_path)
            .await
            .map_err(|e| io_error("copy executable", &self.backup_path, e))?;

        #[cfg(unix)]
        fs::set_permissions(&self.backup_path, source_meta.permissions())
            .await
            .map_err(|e| io_error("set backup permissions", &self.backup_path, e))?;

        if copied != source_meta.len() {
            return Err(BackupError::Incomplete {
                path: self.backup_path.clone(),
                copied,
                expected: source_meta.len(),
            });
        }

        info!(bytes = copied, "Backup created successfully");
        Ok(BackupSlot {
            target: target.to_path_buf(),
            backup_dir: self.backup_dir.clone(),
            backup_path: self.backup_path.clone(),
            created_at: Utc::now(),
        })
    }

    /// Copy the backup in `slot` back over its target.
    ///
    /// The slot is left in place; call [`discard`](Self::discard) afterwards.
    ///
    /// # Errors
    ///
    /// Fails when the backup file is gone or every attempt to copy it fails.
    pub async fn restore(&self, slot: &BackupSlot) -> Result<(), RestoreError> {
        if !fs::try_exists(&slot.backup_path).await.unwrap_or(false) {
            return Err(RestoreError::BackupMissing {
                path: slot.backup_path.clone(),
            });
        }

        warn!("Restoring {} from backup {}", slot.target.display(), slot.backup_path.display());

        let mut attempt = 1;
        loop {
            match Self::attempt_restore(slot).await {
                Ok(()) => {
                    info!("Successfully restored from backup");
                    return Ok(());
                }
                Err(e) if attempt < RESTORE_MAX_ATTEMPTS => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempt, e);
                    tokio::time::sleep(RESTORE_RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(RestoreError::CopyFailed {
                        backup: slot.backup_path.clone(),
                        target: slot.target.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }

    async fn attempt_restore(slot: &BackupSlot) -> io::Result<()> {
        // Overwrite in place; the target is never removed.
        let copied = fs::copy(&slot.backup_path, &slot.target).await?;

        let expected = fs::metadata(&slot.backup_path).await?;
        if copied != expected.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("restored {copied} of {} bytes", expected.len()),
            ));
        }

        #[cfg(unix)]
        fs::set_permissions(&slot.target, expected.permissions()).await?;

        Ok(())
    }

    /// Remove the slot and its directory.
    ///
    /// # Errors
    ///
    /// Returns the filesystem error; callers treat it as a warning.
    pub async fn discard(&self, slot: BackupSlot) -> io::Result<()> {
        match fs::remove_dir_all(&slot.backup_dir).await {
            Ok(()) => {
                debug!("Removed backup directory {}", slot.backup_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Adopt a backup left on disk by an earlier run.
    ///
    /// `target` is the executable the backup belongs to.
    pub async fn existing_slot(&self, target: &Path) -> Option<BackupSlot> {
        let meta = fs::metadata(&self.backup_path).await.ok()?;
        if !meta.is_file() {
            return None;
        }

        let created_at = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
        Some(BackupSlot {
            target: target.to_path_buf(),
            backup_dir: self.backup_dir.clone(),
            backup_path: self.backup_path.clone(),
            created_at,
        })
    }

    /// Whether a backup file is present.
    pub fn backup_exists(&self) -> bool {
        self.backup_path.is_file()
    }

    /// Location of the backup file.
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }
}

fn io_error(operation: &'static str, path: &Path, source: io::Error) -> BackupError {
    BackupError::Io {
        operation,
        path: path.to_path_buf(),
        source,
    }
}
