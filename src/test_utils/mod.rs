//! Test utilities for the updater
//!
//! Fakes for every platform capability the transaction depends on, plus a
//! minimal HTTP server that can serve, truncate or stall a response.
//!
//! # Example
//!
//! ```rust,no_run
//! use ymu_self_updater::test_utils::{TestRoute, TestServer};
//!
//! # async fn example() {
//! let server = TestServer::start().await;
//! server.add_route("/ymu.exe", TestRoute::ok(vec![0u8; 1024]).cut_after(400));
//! let url = server.url("/ymu.exe");
//! # }
//! ```

pub mod fakes;
pub mod logs;
pub mod server;

pub use fakes::{
    FakeLocator, FakeLockProbe, FakeRelease, HoldingPrompt, RecordingLauncher, ScriptedFetcher,
};
pub use logs::LogCapture;
pub use server::{TestRoute, TestServer};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. `level` wins over `RUST_LOG`; with
/// neither set, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// HTTP client for talking to a [`TestServer`].
///
/// Ignores proxy settings from the environment so requests to `127.0.0.1`
/// stay local.
pub fn test_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().expect("Failed to build test HTTP client")
}
