//! Core types shared by every part of the updater.
//!
//! ## `error` - Error taxonomy
//!
//! - Component errors ([`ResolveError`], [`BackupError`], [`TransferError`],
//!   [`RestoreError`], [`LaunchError`])
//! - [`UpdateError`] - transaction-level failures, each mapped to exactly one
//!   outcome by the coordinator
//! - [`ErrorContext`] and [`user_friendly_error`] - terminal presentation with
//!   details and suggestions

pub mod error;

pub use error::{
    BackupError, ErrorContext, LaunchError, ResolveError, RestoreError, TransferError,
    UpdateError, update_error_context, user_friendly_error,
};
