//! YMU Self-Updater
//!
//! Replaces the installed YMU executable with the latest GitHub release and
//! starts it again. The update is transactional: the executable is backed up
//! before it is touched, and any failure or Ctrl+C during the download puts
//! the backup back.
//!
//! # Architecture Overview
//!
//! ```text
//! cli ─▶ layout ─▶ config ─▶ upgrade::UpdateTransaction
//!                                 ├── release      (latest tag + asset URL)
//!                                 ├── lock_probe   (is the exe still open?)
//!                                 ├── process      (stop running instances)
//!                                 ├── upgrade::backup / download / launch
//!                                 └── prompt       (pause before relaunch)
//! ```
//!
//! # Core Modules
//!
//! ## Transaction
//! - [`upgrade`] - The update transaction and its components
//! - [`release`] - Release feed parsing and the GitHub resolver
//!
//! ## Platform Capabilities
//! - [`lock_probe`] - Whether a file is held open by another process
//! - [`process`] - Finding and terminating running instances
//! - [`prompt`] - Operator pause before relaunch
//!
//! ## Supporting Modules
//! - [`cli`] - Command-line interface
//! - [`config`] - `updater.toml` settings
//! - [`constants`] - Defaults and fixed names
//! - [`core`] - Error types and operator-facing error display
//! - [`layout`] - AppData and legacy installation layouts
//! - [`logging`] - Log file subscriber
//! - [`utils`] - Progress bar
//!
//! # Filesystem Layout
//!
//! ```text
//! %APPDATA%\YMU\ymu.log        (AppData layout)   or   .\ymu\ymu.log   (legacy)
//! .\ymu.exe                    target executable
//! .\_backup\ymu.exe            backup slot, present only during an update
//! ```

// Core functionality modules
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod layout;
pub mod logging;

// Transaction
pub mod release;
pub mod upgrade;

// Platform capabilities
pub mod lock_probe;
pub mod process;
pub mod prompt;

// Supporting modules
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
