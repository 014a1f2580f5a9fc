//! `ymu-updater` entry point
//!
//! Parses the command line, runs the selected mode and exits with its code:
//! `0` for a successful update or a clean cancellation, `1` for any failure.

use clap::Parser;
use tracing::error;
use ymu_self_updater::cli;
use ymu_self_updater::core::error::user_friendly_error;
use ymu_self_updater::logging;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let code = match cli.execute().await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            1
        }
    };

    logging::log_shutdown();

    // A relaunch prompt abandoned on Ctrl+C may still hold a blocking thread.
    std::process::exit(code);
}
