//! Tests for the `ymu-updater` binary.

use crate::{OLD_BUILD, install_old_build, new_build, release_feed};
use assert_cmd::Command;
use predicates::prelude::*;
use ymu_self_updater::test_utils::{TestRoute, TestServer};

/// The updater binary with a clean network environment.
fn updater() -> Command {
    let mut cmd = Command::cargo_bin("ymu-updater").unwrap();
    cmd.env_remove("YMU_UPDATER_FEED_URL")
        .env_remove("HTTP_PROXY")
        .env_remove("http_proxy")
        .env_remove("ALL_PROXY")
        .env_remove("all_proxy")
        .env("NO_PROXY", "127.0.0.1")
        .env("YMU_NO_PROGRESS", "1");
    cmd
}

#[test]
fn test_help() {
    updater()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--rollback"))
        .stdout(predicate::str::contains("--check"))
        .stdout(predicate::str::contains("--target"));
}

#[test]
fn test_check_and_rollback_conflict() {
    updater().args(["--check", "--rollback"]).assert().failure();
}

#[test]
fn test_rollback_without_backup() {
    let (_temp, layout) = install_old_build();

    updater().arg("--target").arg(&layout.target_exe).arg("--rollback").assert().code(1);

    assert_eq!(std::fs::read(&layout.target_exe).unwrap(), OLD_BUILD);
}

#[test]
fn test_rollback_restores_backup() {
    let (_temp, layout) = install_old_build();
    std::fs::create_dir_all(&layout.backup_dir).unwrap();
    std::fs::write(&layout.backup_exe, OLD_BUILD).unwrap();
    std::fs::write(&layout.target_exe, b"half-written download").unwrap();

    updater()
        .arg("--target")
        .arg(&layout.target_exe)
        .arg("--rollback")
        .assert()
        .success()
        .stdout(predicate::str::contains("Successfully rolled back"));

    assert_eq!(std::fs::read(&layout.target_exe).unwrap(), OLD_BUILD);
    assert!(!layout.backup_dir.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_check_prints_latest_release() {
    let (_temp, layout) = install_old_build();
    let server = TestServer::start().await;
    server.add_route(
        "/releases/latest",
        TestRoute::json(&release_feed("v2.0", &[("ymu.exe", "https://example.invalid/v2.0/ymu.exe")])),
    );

    updater()
        .arg("--target")
        .arg(&layout.target_exe)
        .args(["--check", "--feed-url", &server.url("/releases/latest")])
        .assert()
        .success()
        .stdout(predicate::str::contains("v2.0"))
        .stdout(predicate::str::contains("https://example.invalid/v2.0/ymu.exe"));

    assert_eq!(std::fs::read(&layout.target_exe).unwrap(), OLD_BUILD);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_end_to_end() {
    let (_temp, layout) = install_old_build();
    let body = new_build(32 * 1024);
    let server = TestServer::start().await;
    server.add_route("/ymu.exe", TestRoute::ok(body.clone()));
    server.add_route(
        "/releases/latest",
        TestRoute::json(&release_feed("v2.0", &[("ymu.exe", &server.url("/ymu.exe"))])),
    );

    updater()
        .arg("--target")
        .arg(&layout.target_exe)
        .args(["--feed-url", &server.url("/releases/latest")])
        .args(["--no-relaunch", "-y", "--no-progress"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated to v2.0"));

    assert_eq!(std::fs::read(&layout.target_exe).unwrap(), body);
    assert!(!layout.backup_dir.exists());
    assert!(layout.log_file.is_file(), "log file should be written beside the target");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_with_broken_download_exits_with_failure() {
    let (_temp, layout) = install_old_build();
    let server = TestServer::start().await;
    server.add_route("/ymu.exe", TestRoute::ok(new_build(16 * 1024)).cut_after(6 * 1024));
    server.add_route(
        "/releases/latest",
        TestRoute::json(&release_feed("v2.0", &[("ymu.exe", &server.url("/ymu.exe"))])),
    );

    updater()
        .arg("--target")
        .arg(&layout.target_exe)
        .args(["--feed-url", &server.url("/releases/latest")])
        .args(["--no-relaunch", "-y", "--no-progress"])
        .assert()
        .code(1);

    assert_eq!(std::fs::read(&layout.target_exe).unwrap(), OLD_BUILD);
    assert!(!layout.backup_dir.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_with_missing_target() {
    let (temp, _layout) = install_old_build();
    let missing = temp.path().join("missing").join("ymu.exe");
    let server = TestServer::start().await;
    server.add_route(
        "/releases/latest",
        TestRoute::json(&release_feed("v2.0", &[("ymu.exe", &server.url("/ymu.exe"))])),
    );

    updater()
        .arg("--target")
        .arg(&missing)
        .args(["--feed-url", &server.url("/releases/latest")])
        .args(["--no-relaunch", "-y", "--no-progress"])
        .assert()
        .code(1);

    assert!(!missing.exists());
    assert!(!temp.path().join("missing").join("_backup").exists());
}
