//! Command-line interface for the updater.
//!
//! The updater has no subcommands; flags pick one of three modes:
//!
//! - default: run the update transaction and relaunch YMU
//! - `--check`: resolve and print the latest release, change nothing
//! - `--rollback`: restore a backup left behind by an interrupted run
//!
//! # Configuration Precedence
//!
//! 1. Command-line flags
//! 2. Environment (`YMU_UPDATER_FEED_URL`, `YMU_NO_PROGRESS`, `RUST_LOG`)
//! 3. `updater.toml` (from `--config` or the log directory)
//! 4. Built-in defaults
//!
//! # Examples
//!
//! ```bash
//! ymu-updater
//! ymu-updater --check
//! ymu-updater --target "D:\Games\YMU\ymu.exe" --no-relaunch
//! ymu-updater --rollback
//! ```

mod upgrade;


use crate::config::UpdaterConfig;
use crate::constants::TARGET_EXE_NAME;
use crate::layout::InstallationLayout;
use crate::logging;
use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What the invocation should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run the update transaction.
    Update,
    /// Print the latest release only.
    Check,
    /// Restore the backup slot.
    Rollback,
}

/// Runtime settings derived from the command line.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log level when `RUST_LOG` is not set.
    pub log_level: String,
    /// Hide the progress bar.
    pub no_progress: bool,
    /// Explicit configuration file.
    pub config_path: Option<PathBuf>,
}

/// Command-line arguments for `ymu-updater`.
#[derive(Parser, Debug)]
#[command(
    name = "ymu-updater",
    about = "Update YMU to the latest release",
    version,
    author,
    long_about = "Downloads the latest YMU release from GitHub, replaces the installed \
                  executable with a backup and automatic rollback, then starts the new version."
)]
pub struct Cli {
    /// Executable to update (default: ymu.exe in the working directory)
    #[arg(long, value_name = "PATH")]
    target: Option<PathBuf>,

    /// Configuration file (default: updater.toml in the log directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Release feed URL
    #[arg(long, value_name = "URL", env = "YMU_UPDATER_FEED_URL")]
    feed_url: Option<String>,

    /// Show the latest available version and exit
    #[arg(long, conflicts_with = "rollback")]
    check: bool,

    /// Restore the executable from the backup left by an interrupted update
    #[arg(long)]
    rollback: bool,

    /// Do not start the executable after updating
    #[arg(long)]
    no_relaunch: bool,

    /// Relaunch without waiting for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Disable the download progress bar
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Mode selected by the flags.
    pub fn mode(&self) -> Mode {
        if self.rollback {
            Mode::Rollback
        } else if self.check {
            Mode::Check
        } else {
            Mode::Update
        }
    }

    /// Derive runtime settings from the flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        CliConfig {
            log_level: if self.verbose { "debug" } else { "info" }.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Apply flag overrides on top of the file configuration.
    pub fn apply_overrides(&self, config: &mut UpdaterConfig) {
        if let Some(feed_url) = &self.feed_url {
            config.feed_url.clone_from(feed_url);
        }
        if self.no_relaunch {
            config.relaunch = false;
        }
        if self.yes {
            config.pause_before_relaunch = false;
        }
    }

    fn resolve_layout_in(&self, cwd: &Path, appdata: Option<&Path>, target_name: &str) -> InstallationLayout {
        match &self.target {
            Some(target) => InstallationLayout::for_target(target.clone()),
            None => InstallationLayout::detect_in(cwd, appdata, target_name),
        }
    }

    /// Settle the installation layout and configuration for this run.
    ///
    /// `updater.toml` is read from the layout detected for the default
    /// executable name. A different `target_name` in it re-runs detection,
    /// so the returned layout (log file included) belongs to the configured
    /// executable. With `--target`, the asset name follows the target's file
    /// name instead.
    ///
    /// # Errors
    ///
    /// Fails if the configuration file cannot be read or parsed.
    pub async fn load_settings_in(
        &self,
        cwd: &Path,
        appdata: Option<&Path>,
    ) -> Result<(InstallationLayout, UpdaterConfig)> {
        let mut layout = self.resolve_layout_in(cwd, appdata, TARGET_EXE_NAME);

        let mut config =
            UpdaterConfig::load_with_optional(self.config.as_deref(), &layout.config_file()).await?;
        self.apply_overrides(&mut config);

        if self.target.is_some() {
            config.target_name = layout.target_name();
        } else if config.target_name != layout.target_name() {
            layout = self.resolve_layout_in(cwd, appdata, &config.target_name);
        }
        Ok((layout, config))
    }

    /// Run the selected mode and return the process exit code.
    ///
    /// # Errors
    ///
    /// Returns errors that are not part of the transaction outcome, such as
    /// an unreadable configuration file or a failed check.
    pub async fn execute(self) -> Result<i32> {
        let cli_config = self.build_config();

        let cwd = std::env::current_dir().context("Failed to determine working directory")?;
        let appdata = dirs::config_dir();
        let (layout, config) = self.load_settings_in(&cwd, appdata.as_deref()).await?;

        if let Err(e) = logging::init_logging(&layout.log_file, &cli_config.log_level) {
            eprintln!("{}: {:#}", "warning".yellow(), e);
        }
        print_banner(&layout);
        info!(
            convention = %layout.convention,
            target = %layout.target_exe.display(),
            log = %layout.log_file.display(),
            "Installation layout"
        );
        debug!(feed = %config.feed_url, asset = %config.target_name, "Settings loaded");

        match self.mode() {
            Mode::Rollback => upgrade::handle_rollback(&layout).await,
            Mode::Check => upgrade::check_for_updates(&config).await,
            Mode::Update => upgrade::perform_update(&layout, &config, &cli_config).await,
        }
    }
}

fn print_banner(layout: &InstallationLayout) {
    println!(
        "{} {}",
        "YMU Self-Updater".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("{} {}", "Target:".dimmed(), layout.target_exe.display());
}
