//! Terminal helpers
//!
//! # Modules
//!
//! - [`progress`] - Download progress bar with the updater's styling

pub mod progress;

pub use progress::{DownloadBar, ProgressStyle};
