//! Release feed resolution against a local server.

use crate::release_feed;
use ymu_self_updater::core::ResolveError;
use ymu_self_updater::release::{GitHubReleaseResolver, ReleaseSource};
use ymu_self_updater::test_utils::{TestRoute, TestServer, test_client};

#[tokio::test]
async fn test_resolves_matching_asset() {
    let server = TestServer::start().await;
    server.add_route(
        "/latest",
        TestRoute::json(&release_feed(
            "v2.0",
            &[
                ("ymu-linux.tar.gz", "https://example.invalid/ymu-linux.tar.gz"),
                ("YMU.EXE", "https://example.invalid/v2.0/YMU.EXE"),
            ],
        )),
    );

    let resolver = GitHubReleaseResolver::from_client(test_client(), "ymu.exe");
    let release = resolver.fetch_latest(&server.url("/latest")).await.unwrap();

    assert_eq!(release.version, "v2.0");
    assert_eq!(release.download_url, "https://example.invalid/v2.0/YMU.EXE");
    assert_eq!(server.requests(), 1);
}

#[tokio::test]
async fn test_release_without_asset() {
    let server = TestServer::start().await;
    server.add_route(
        "/latest",
        TestRoute::json(&release_feed("v2.0", &[("ymu-linux.tar.gz", "https://example.invalid/a")])),
    );

    let resolver = GitHubReleaseResolver::from_client(test_client(), "ymu.exe");
    let err = resolver.fetch_latest(&server.url("/latest")).await.unwrap_err();

    assert!(matches!(err, ResolveError::MalformedResponse { .. }));
}

#[tokio::test]
async fn test_feed_error_status() {
    let server = TestServer::start().await;
    server.add_route("/latest", TestRoute::status(503));

    let resolver = GitHubReleaseResolver::from_client(test_client(), "ymu.exe");
    let err = resolver.fetch_latest(&server.url("/latest")).await.unwrap_err();

    assert!(matches!(err, ResolveError::Network { .. }));
}

#[tokio::test]
async fn test_feed_unreachable() {
    let server = TestServer::start().await;
    let url = server.url("/latest");
    drop(server);
    tokio::task::yield_now().await;

    let resolver = GitHubReleaseResolver::from_client(test_client(), "ymu.exe");
    let err = resolver.fetch_latest(&url).await.unwrap_err();

    assert!(matches!(err, ResolveError::Network { .. }));
}
