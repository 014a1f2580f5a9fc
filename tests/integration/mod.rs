//! Integration test suite for the YMU self-updater
//!
//! End-to-end tests that run the update transaction against a local HTTP
//! server and drive the `ymu-updater` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: Binary behavior, exit codes and modes
//! - **release**: Release feed resolution over HTTP
//! - **transaction**: Download, rollback and cancellation over HTTP

use tempfile::TempDir;
use ymu_self_updater::layout::InstallationLayout;

mod cli;
mod release;
mod transaction;

/// Executable content installed before each test.
pub const OLD_BUILD: &[u8] = b"MZ ymu 1.9 installed build";

/// Body of a release asset of `len` bytes that differs from [`OLD_BUILD`].
pub fn new_build(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Install [`OLD_BUILD`] as `ymu.exe` in a fresh directory.
pub fn install_old_build() -> (TempDir, InstallationLayout) {
    let temp = TempDir::new().unwrap();
    let layout = InstallationLayout::for_target(temp.path().join("ymu.exe"));
    std::fs::write(&layout.target_exe, OLD_BUILD).unwrap();
    (temp, layout)
}

/// A GitHub "latest release" document with one asset per `(name, url)`.
pub fn release_feed(tag: &str, assets: &[(&str, &str)]) -> serde_json::Value {
    let assets: Vec<_> = assets
        .iter()
        .map(|(name, url)| serde_json::json!({ "name": name, "browser_download_url": url }))
        .collect();
    serde_json::json!({ "tag_name": tag, "name": format!("YMU {tag}"), "assets": assets })
}
