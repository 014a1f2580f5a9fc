//! Update, check and rollback modes.
//!
//! Each mode prints a short summary to the terminal and returns the process
//! exit code. Details go to the log file.

use super::CliConfig;
use crate::config::UpdaterConfig;
use crate::core::{UpdateError, update_error_context};
use crate::layout::InstallationLayout;
use crate::prompt::{AutoContinue, OperatorPrompt, TerminalPrompt};
use crate::release::{GitHubReleaseResolver, ReleaseSource};
use crate::upgrade::{
    BackupManager, Downloader, LaunchStatus, TransactionOutcome, TransactionSettings,
    UpdateTransaction,
};
use crate::utils::DownloadBar;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Resolves when the operator presses Ctrl+C.
///
/// Never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Failed to install Ctrl+C handler; cancellation disabled");
        std::future::pending::<()>().await;
    }
    info!("Interrupt received");
}

/// Restore the executable from a backup left by an earlier run.
pub(super) async fn handle_rollback(layout: &InstallationLayout) -> Result<i32> {
    println!("{}", "Rolling back to previous version...".yellow());

    let backups = BackupManager::from_layout(layout);
    let Some(slot) = backups.existing_slot(&layout.target_exe).await else {
        bail!("No backup found at {}. Cannot roll back.", backups.backup_path().display());
    };
    info!(backup = %slot.backup_path.display(), created = %slot.created_at, "Manual rollback");

    if let Err(source) = backups.restore(&slot).await {
        error!(
            severity = "critical",
            backup = %slot.backup_path.display(),
            "Manual rollback failed: {}",
            source
        );
        return Err(UpdateError::RestoreFailed {
            backup_path: slot.backup_path.clone(),
            cause: "manual rollback".to_string(),
            source,
        }
        .into());
    }

    if let Err(e) = backups.discard(slot).await {
        warn!("Failed to remove backup directory: {}", e);
    }

    println!("{}", "Successfully rolled back to previous version".green());
    Ok(0)
}

/// Print the latest release without changing anything.
pub(super) async fn check_for_updates(config: &UpdaterConfig) -> Result<i32> {
    println!("{}", "Checking for updates...".cyan());

    let resolver = GitHubReleaseResolver::new(config.target_name.clone(), config.api_timeout())
        .context("Failed to create HTTP client")?;
    let release = resolver
        .fetch_latest(&config.feed_url)
        .await
        .map_err(UpdateError::from)?;

    println!("{} {}", "Latest version:".green(), release.version.bold());
    println!("{} {}", "Download:".dimmed(), release.download_url);
    Ok(0)
}

/// Run the update transaction and report its outcome.
pub(super) async fn perform_update(
    layout: &InstallationLayout,
    config: &UpdaterConfig,
    cli_config: &CliConfig,
) -> Result<i32> {
    let resolver = GitHubReleaseResolver::new(config.target_name.clone(), config.api_timeout())
        .context("Failed to create HTTP client")?;
    let downloader = Downloader::new(config.connect_timeout(), config.progress_interval())
        .context("Failed to create HTTP client")?;

    let prompt: Arc<dyn OperatorPrompt> = if config.pause_before_relaunch {
        Arc::new(TerminalPrompt::new(config.auto_continue()))
    } else {
        Arc::new(AutoContinue)
    };
    let bar = DownloadBar::new(&layout.target_name(), !cli_config.no_progress);

    let mut transaction = UpdateTransaction::new(
        layout.clone(),
        TransactionSettings::from_config(config),
        resolver,
        downloader,
    )
    .with_prompt(prompt)
    .with_progress(bar.callback());

    println!("{}", "Updating to the latest version...".cyan());
    let report = transaction.run(interrupted()).await;

    if report.outcome.is_success() {
        bar.finish();
    } else {
        bar.clear();
    }

    Ok(print_outcome(report.outcome, layout))
}

fn print_outcome(outcome: TransactionOutcome, layout: &InstallationLayout) -> i32 {
    let code = outcome.exit_code();
    match outcome {
        TransactionOutcome::Succeeded { version, launch } => {
            println!("{}", format!("Updated to {version}").green().bold());
            match launch {
                LaunchStatus::Launched { .. } => {
                    println!("Started {}", layout.target_name());
                }
                LaunchStatus::Skipped => {}
                LaunchStatus::Failed(e) => update_error_context(&UpdateError::Launch(e)).display(),
            }
        }
        TransactionOutcome::Aborted { reason } => {
            println!("{}", format!("Update {reason}").yellow());
        }
        TransactionOutcome::Failed { error } => {
            update_error_context(&error).display();
            if error.is_critical() {
                eprintln!(
                    "{}",
                    format!("See {} for details.", layout.log_file.display()).red()
                );
            }
        }
    }
    code
}
