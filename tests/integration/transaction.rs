//! Update transaction over HTTP: full downloads, broken transfers and
//! cancellation.

use crate::{OLD_BUILD, install_old_build, new_build, release_feed};
use std::sync::Arc;
use std::time::Duration;
use ymu_self_updater::core::{TransferError, UpdateError};
use ymu_self_updater::layout::InstallationLayout;
use ymu_self_updater::release::GitHubReleaseResolver;
use ymu_self_updater::test_utils::{
    FakeLocator, FakeLockProbe, RecordingLauncher, TestRoute, TestServer, init_test_logging,
    test_client,
};
use ymu_self_updater::upgrade::{
    AbortReason, DownloadProgress, Downloader, LaunchStatus, ReleaseWaitPolicy,
    TransactionOutcome, TransactionReport, TransactionSettings, TransactionState,
    UpdateTransaction,
};

/// Serve a v2.0 feed whose `ymu.exe` asset is `route`.
fn publish(server: &TestServer, route: TestRoute) -> String {
    server.add_route("/ymu.exe", route);
    server.add_route(
        "/releases/latest",
        TestRoute::json(&release_feed("v2.0", &[("ymu.exe", &server.url("/ymu.exe"))])),
    );
    server.url("/releases/latest")
}

fn http_transaction(
    layout: &InstallationLayout,
    feed_url: String,
    launcher: &RecordingLauncher,
) -> UpdateTransaction<GitHubReleaseResolver, Downloader> {
    let settings = TransactionSettings {
        feed_url,
        wait: ReleaseWaitPolicy::default(),
        relaunch: true,
        pause_before_relaunch: false,
    };
    UpdateTransaction::new(
        layout.clone(),
        settings,
        GitHubReleaseResolver::from_client(test_client(), "ymu.exe"),
        Downloader::from_client(test_client(), Duration::from_millis(50)),
    )
    .with_lock_probe(Arc::new(FakeLockProbe::unlocked()))
    .with_process_locator(Arc::new(FakeLocator::idle()))
    .with_launcher(Box::new(launcher.clone()))
}

fn assert_untouched(layout: &InstallationLayout) {
    assert_eq!(std::fs::read(&layout.target_exe).unwrap(), OLD_BUILD);
    assert!(!layout.backup_dir.exists(), "backup directory should be cleaned up");
}

#[tokio::test]
async fn test_update_replaces_executable() {
    init_test_logging(None);
    let (_temp, layout) = install_old_build();
    let body = new_build(64 * 1024);
    let server = TestServer::start().await;
    let feed = publish(&server, TestRoute::ok(body.clone()));
    let launcher = RecordingLauncher::new();
    let (tx, rx) = std::sync::mpsc::channel();

    let report = http_transaction(&layout, feed, &launcher)
        .with_progress(move |p: DownloadProgress| {
            let _ = tx.send(p);
        })
        .run(std::future::pending())
        .await;

    assert!(
        matches!(
            report.outcome,
            TransactionOutcome::Succeeded {
                launch: LaunchStatus::Launched { .. },
                ..
            }
        ),
        "unexpected outcome: {:?}",
        report.outcome
    );
    assert_eq!(std::fs::read(&layout.target_exe).unwrap(), body);
    assert!(!layout.backup_dir.exists());
    assert_eq!(launcher.launches(), vec![layout.target_exe.clone()]);

    let last: Option<DownloadProgress> = rx.try_iter().last();
    assert_eq!(
        last,
        Some(DownloadProgress {
            bytes_received: body.len() as u64,
            total_bytes: body.len() as u64,
        })
    );
}

#[tokio::test]
async fn test_truncated_download_restores_previous_build() {
    init_test_logging(None);
    let (_temp, layout) = install_old_build();
    let body = new_build(10 * 1024);
    let server = TestServer::start().await;
    let feed = publish(&server, TestRoute::ok(body).cut_after(4 * 1024));
    let launcher = RecordingLauncher::new();

    let report: TransactionReport = http_transaction(&layout, feed, &launcher).run(std::future::pending()).await;

    assert!(
        matches!(
            report.outcome,
            TransactionOutcome::Failed {
                error: UpdateError::Transfer(
                    TransferError::Interrupted { .. } | TransferError::Incomplete { .. }
                )
            }
        ),
        "unexpected outcome: {:?}",
        report.outcome
    );
    assert_eq!(report.outcome.exit_code(), 1);
    assert!(report.passed_through(TransactionState::RollingBack));
    assert_untouched(&layout);
    assert!(launcher.launches().is_empty());
}

#[tokio::test]
async fn test_missing_asset_download_restores_previous_build() {
    let (_temp, layout) = install_old_build();
    let server = TestServer::start().await;
    let feed = publish(&server, TestRoute::status(404));

    let report =
        http_transaction(&layout, feed, &RecordingLauncher::new()).run(std::future::pending()).await;

    assert!(matches!(
        report.outcome,
        TransactionOutcome::Failed {
            error: UpdateError::Transfer(TransferError::Request { .. })
        }
    ));
    assert_untouched(&layout);
}

#[tokio::test]
async fn test_cancel_mid_download_restores_previous_build() {
    init_test_logging(None);
    let (_temp, layout) = install_old_build();
    let server = TestServer::start().await;
    let feed = publish(&server, TestRoute::ok(new_build(10 * 1024)).stall_after(2 * 1024));
    let stalled = server.stalled();
    let launcher = RecordingLauncher::new();

    let report = http_transaction(&layout, feed, &launcher)
        .run(async move { stalled.notified().await })
        .await;

    match &report.outcome {
        TransactionOutcome::Aborted { reason } => assert_eq!(
            *reason,
            AbortReason::UserCancelled {
                during: TransactionState::Downloading,
                rolled_back: true,
            }
        ),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.outcome.exit_code(), 0);
    assert_untouched(&layout);
    assert!(launcher.launches().is_empty());
}

#[tokio::test]
async fn test_unreachable_feed_changes_nothing() {
    let (_temp, layout) = install_old_build();
    let server = TestServer::start().await;
    server.add_route("/releases/latest", TestRoute::status(500));

    let report = http_transaction(&layout, server.url("/releases/latest"), &RecordingLauncher::new())
        .run(std::future::pending())
        .await;

    assert!(matches!(
        report.outcome,
        TransactionOutcome::Failed {
            error: UpdateError::Resolution(_)
        }
    ));
    assert!(!report.passed_through(TransactionState::BackingUp));
    assert_untouched(&layout);
    // Only the feed was requested.
    assert_eq!(server.requests(), 1);
}

#[tokio::test]
async fn test_second_update_is_idempotent() {
    let (_temp, layout) = install_old_build();
    let body = new_build(8 * 1024);
    let server = TestServer::start().await;
    let feed = publish(&server, TestRoute::ok(body.clone()));

    for _ in 0..2 {
        let report = http_transaction(&layout, feed.clone(), &RecordingLauncher::new())
            .run(std::future::pending())
            .await;
        assert!(report.outcome.is_success(), "unexpected outcome: {:?}", report.outcome);
        assert_eq!(std::fs::read(&layout.target_exe).unwrap(), body);
        assert!(!layout.backup_dir.exists());
    }
}
