//! Error handling for the self-updater.
//!
//! Each component has its own error type so the coordinator can tell them
//! apart when choosing between "nothing happened", "roll back" and "the
//! installation is broken":
//!
//! - [`ResolveError`] - the release feed could not be read or understood
//! - [`BackupError`] - the backup slot could not be created
//! - [`TransferError`] - the download failed after the target was opened
//! - [`RestoreError`] - the backup could not be copied back
//! - [`LaunchError`] - the new executable could not be started
//!
//! [`UpdateError`] is the transaction-level taxonomy built from these, and
//! [`ErrorContext`] wraps any error with operator-facing details and a
//! suggestion for display in the terminal.

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure to turn the release feed into a [`ReleaseInfo`](crate::release::ReleaseInfo).
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The feed was unreachable, timed out, or answered with a non-2xx status.
    #[error("Failed to reach release feed {url}: {source}")]
    Network {
        /// Feed URL that was requested
        url: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// The feed answered but the document is unusable.
    #[error("Malformed release feed response: {reason}")]
    MalformedResponse {
        /// What was missing or invalid
        reason: String,
    },
}

/// Failure to create the backup slot.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The target to back up does not exist.
    #[error("Nothing to back up: {path} does not exist")]
    SourceMissing {
        /// Target path
        path: PathBuf,
    },

    /// A filesystem operation failed while writing the slot.
    #[error("Failed to {operation} at {path}: {source}")]
    Io {
        /// What was being done
        operation: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The copy finished but the sizes disagree.
    #[error("Backup at {path} is incomplete ({copied} of {expected} bytes)")]
    Incomplete {
        /// Backup path
        path: PathBuf,
        /// Bytes written
        copied: u64,
        /// Size of the original
        expected: u64,
    },
}

/// Failure to copy a backup back over the target.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// The slot has disappeared from disk.
    #[error("Backup file missing at {path}")]
    BackupMissing {
        /// Backup path that was expected
        path: PathBuf,
    },

    /// Every restore attempt failed.
    #[error("Failed to restore {target} from {backup} after {attempts} attempts: {source}")]
    CopyFailed {
        /// Backup path
        backup: PathBuf,
        /// Target path
        target: PathBuf,
        /// Number of attempts made
        attempts: u32,
        /// Error from the last attempt
        #[source]
        source: std::io::Error,
    },
}

/// Failure while streaming an artifact to disk.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The request could not be sent or the server answered with an error status.
    #[error("Request to {url} failed: {source}")]
    Request {
        /// Download URL
        url: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// The connection broke while the body was being received.
    #[error("Download interrupted after {received} bytes: {source}")]
    Interrupted {
        /// Bytes written before the interruption
        received: u64,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// The body ended before the declared `content-length`.
    #[error("Download incomplete: received {received} of {expected} bytes")]
    Incomplete {
        /// Bytes written
        received: u64,
        /// Declared length
        expected: u64,
    },

    /// Writing to the destination failed.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Destination path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Failure to start the new executable.
#[derive(Error, Debug)]
#[error("Failed to launch {path}: {source}")]
pub struct LaunchError {
    /// Executable that was started
    pub path: PathBuf,
    /// Underlying error
    #[source]
    pub source: std::io::Error,
}

/// Transaction-level failure taxonomy.
///
/// Every variant except [`UpdateError::Launch`] ends the transaction as
/// failed. Only [`UpdateError::Transfer`] and [`UpdateError::RestoreFailed`]
/// can occur after the target was modified.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// The latest release could not be resolved. Nothing was changed.
    #[error("Failed to get the latest version: {0}")]
    Resolution(#[from] ResolveError),

    /// The executable to update does not exist. Nothing was changed.
    #[error("Main executable '{}' not found", path.display())]
    TargetMissing {
        /// Expected target path
        path: PathBuf,
    },

    /// The target stayed locked past the deadline. Nothing was changed.
    #[error("Could not access '{}' after waiting {:?}; is it still running?", path.display(), waited)]
    LockTimeout {
        /// Target path
        path: PathBuf,
        /// How long the updater waited
        waited: Duration,
    },

    /// The backup could not be created. The target is untouched.
    #[error("Failed to create backup: {0}")]
    BackupCreate(#[from] BackupError),

    /// The download failed; the backup was restored.
    #[error("Download failed: {0}")]
    Transfer(#[from] TransferError),

    /// Rolling back failed. The installation may be broken.
    #[error("Failed to restore backup after {cause}: {source}")]
    RestoreFailed {
        /// Location of the backup for manual recovery
        backup_path: PathBuf,
        /// Why the rollback was attempted
        cause: String,
        /// The restore failure
        #[source]
        source: RestoreError,
    },

    /// The update succeeded but the new version could not be started.
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl UpdateError {
    /// Whether the installation may be left inconsistent.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::RestoreFailed { .. })
    }
}

/// An error paired with operator-facing details and a suggestion.
#[derive(Debug)]
pub struct ErrorContext {
    /// The error message
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a context with only the error message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Build the operator-facing context for a transaction failure.
#[must_use]
pub fn update_error_context(error: &UpdateError) -> ErrorContext {
    let context = ErrorContext::new(error.to_string());
    match error {
        UpdateError::Resolution(ResolveError::Network { .. }) => context
            .with_suggestion("Check your Internet connection and try again"),
        UpdateError::Resolution(ResolveError::MalformedResponse { .. }) => context
            .with_details("The latest release does not contain a usable executable")
            .with_suggestion("Try again later or download the release manually"),
        UpdateError::TargetMissing { .. } => context
            .with_suggestion("Run the updater from the directory that contains ymu.exe"),
        UpdateError::LockTimeout { .. } => context
            .with_details("Another process still has the executable open")
            .with_suggestion("Close YMU and run the updater again"),
        UpdateError::BackupCreate(_) => context
            .with_details("No changes were made to the installed executable")
            .with_suggestion("Check free disk space and write permissions"),
        UpdateError::Transfer(_) => context
            .with_details("The previous version was restored from backup"),
        UpdateError::RestoreFailed { backup_path, .. } => context
            .with_details("The executable may be incomplete or corrupted")
            .with_suggestion(format!(
                "Copy {} over the executable manually, or run with --rollback",
                backup_path.display()
            )),
        UpdateError::Launch(_) => context
            .with_details("The update itself completed successfully")
            .with_suggestion("Start YMU manually"),
    }
}

/// Convert any error into an [`ErrorContext`] for display.
///
/// Transaction errors get tailored suggestions; I/O errors get generic
/// filesystem hints; anything else is shown with its full cause chain.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return update_error_context(update_error);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(format!("{error:#}"))
                    .with_suggestion("Try running the updater as Administrator");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(format!("{error:#}"))
                    .with_suggestion("Check that the file or directory exists");
            }
            _ => {}
        }
    }

    ErrorContext::new(format!("{error:#}"))
}
