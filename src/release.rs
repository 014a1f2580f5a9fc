//! Resolving the latest release from the GitHub releases API.
//!
//! The feed is a single JSON document describing the latest release:
//!
//! ```json
//! {
//!   "tag_name": "v2.0",
//!   "assets": [
//!     { "name": "ymu.exe", "browser_download_url": "https://..." }
//!   ]
//! }
//! ```
//!
//! The asset whose name equals the target file name (ignoring case) is the
//! one that gets installed. Other fields are ignored.

use crate::core::ResolveError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Version and download location of the release to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Release tag, e.g. `v2.0`.
    pub version: String,
    /// Direct download URL of the matching asset.
    pub download_url: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseDocument {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    #[serde(default)]
    browser_download_url: Option<String>,
}

/// Parse a release feed body and pick the asset named `asset_name`.
///
/// # Errors
///
/// Returns [`ResolveError::MalformedResponse`] when the body is not a release
/// document, the tag is missing or empty, or no asset with a non-empty URL
/// matches.
pub fn parse_release(body: &str, asset_name: &str) -> Result<ReleaseInfo, ResolveError> {
    let document: ReleaseDocument =
        serde_json::from_str(body).map_err(|e| ResolveError::MalformedResponse {
            reason: format!("invalid JSON: {e}"),
        })?;

    let version = document
        .tag_name
        .filter(|tag| !tag.trim().is_empty())
        .ok_or_else(|| ResolveError::MalformedResponse {
            reason: "release has no tag_name".to_string(),
        })?;

    let download_url = document
        .assets
        .into_iter()
        .find(|asset| asset.name.eq_ignore_ascii_case(asset_name))
        .and_then(|asset| asset.browser_download_url)
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ResolveError::MalformedResponse {
            reason: format!("release {version} has no downloadable asset named '{asset_name}'"),
        })?;

    Ok(ReleaseInfo {
        version,
        download_url,
    })
}

/// Source of the latest release.
///
/// Implementations perform a single attempt; callers treat any error as fatal
/// for the run.
pub trait ReleaseSource {
    /// Fetch the latest release from `feed_url`.
    fn fetch_latest(
        &self,
        feed_url: &str,
    ) -> impl Future<Output = Result<ReleaseInfo, ResolveError>> + Send;
}

/// [`ReleaseSource`] backed by an HTTP GET against the GitHub API.
#[derive(Debug, Clone)]
pub struct GitHubReleaseResolver {
    client: reqwest::Client,
    asset_name: String,
}

impl GitHubReleaseResolver {
    /// Create a resolver for `asset_name` with a total request timeout.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (TLS backend unavailable).
    pub fn new(asset_name: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self::from_client(client, asset_name))
    }

    /// Create a resolver that uses an existing client.
    pub fn from_client(client: reqwest::Client, asset_name: impl Into<String>) -> Self {
        Self {
            client,
            asset_name: asset_name.into(),
        }
    }
}

impl ReleaseSource for GitHubReleaseResolver {
    async fn fetch_latest(&self, feed_url: &str) -> Result<ReleaseInfo, ResolveError> {
        debug!("Querying release feed: {}", feed_url);

        let network = |source| ResolveError::Network {
            url: feed_url.to_string(),
            source,
        };

        let response = self
            .client
            .get(feed_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(network)?;

        let body = response.text().await.map_err(network)?;
        let release = parse_release(&body, &self.asset_name)?;

        info!(version = %release.version, "Latest version resolved");
        Ok(release)
    }
}
