//! Release listing and asset download from GitHub Releases.

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{HubError, Result};

/// Bound on release metadata requests.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest an asset download may sit idle: waiting for the response or
/// between two body chunks. A slow transfer that keeps making progress is
/// never cut off.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("invariant-hub/", env!("CARGO_PKG_VERSION"));

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// A published release as reported by the hosting API.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    #[serde(rename = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl ReleaseDescriptor {
    /// Tag with its version prefix removed.
    pub fn version(&self) -> &str {
        strip_version_prefix(&self.tag)
    }
}

/// Strip a single leading `v`/`V` from a release tag.
pub fn strip_version_prefix(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix(['v', 'V']).unwrap_or(tag)
}

/// Read-only source of releases for a repository.
pub trait ReleaseSource: Send + Sync {
    /// Releases of `repo`, newest first.
    ///
    /// An existing repository without releases yields an empty vec.
    fn list_releases(
        &self,
        repo: &str,
    ) -> impl Future<Output = Result<Vec<ReleaseDescriptor>>> + Send;

    /// Fetch the content of `asset` into the file at `dest`.
    fn download_asset(
        &self,
        asset: &ReleaseAsset,
        dest: &Path,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// [`ReleaseSource`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubReleaseSource {
    client: reqwest::Client,
    api_base_url: String,
    owner: String,
    token: Option<String>,
    show_progress: bool,
    download_idle_timeout: Duration,
}

impl GithubReleaseSource {
    /// Create a client for repositories owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(api_base_url: impl Into<String>, owner: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(METADATA_TIMEOUT)
            .build()
            .map_err(|e| HubError::Network {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_base_url: api_base_url.into(),
            owner: owner.into(),
            token: None,
            show_progress: false,
            download_idle_timeout: DOWNLOAD_TIMEOUT,
        })
    }

    /// Authenticate requests with a personal access token.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Draw a progress bar while downloading.
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Override the idle bound on downloads (default [`DOWNLOAD_TIMEOUT`]).
    #[must_use]
    pub fn with_download_timeout(mut self, idle: Duration) -> Self {
        self.download_idle_timeout = idle;
        self
    }

    fn releases_url(&self, repo: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases",
            self.api_base_url.trim_end_matches('/'),
            self.owner,
            repo
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn progress_bar(&self, total_size: u64) -> Option<ProgressBar> {
        if !self.show_progress || total_size == 0 {
            return None;
        }
        let bar = ProgressBar::new(total_size);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{bar:40.cyan/blue} {bytes}/{total_bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(bar)
    }
}

impl ReleaseSource for GithubReleaseSource {
    async fn list_releases(&self, repo: &str) -> Result<Vec<ReleaseDescriptor>> {
        let url = self.releases_url(repo);
        debug!("Listing releases from {url}");

        let request = self
            .client
            .get(&url)
            .timeout(METADATA_TIMEOUT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| HubError::Network {
                message: format!("request to {url} failed: {e}"),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(HubError::NotFound {
                what: format!("Repository '{}/{}'", self.owner, repo),
            });
        }
        if !status.is_success() {
            return Err(HubError::Network {
                message: format!("HTTP {status} from {url}"),
            });
        }

        let releases: Vec<ReleaseDescriptor> =
            response.json().await.map_err(|e| HubError::Network {
                message: format!("malformed release listing from {url}: {e}"),
            })?;
        debug!("{} release(s) for {repo}", releases.len());
        Ok(releases)
    }

    async fn download_asset(&self, asset: &ReleaseAsset, dest: &Path) -> Result<()> {
        let url = asset.download_url.as_str();
        let download_error = |message: String| HubError::Download {
            url: url.to_string(),
            message,
        };

        let idle = self.download_idle_timeout;
        let stalled = || download_error(format!("no data received for {}s", idle.as_secs_f32()));

        let request = self.authorize(self.client.get(url));
        let mut response = tokio::time::timeout(idle, request.send())
            .await
            .map_err(|_| stalled())?
            .map_err(|e| download_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }

        let bar = self.progress_bar(response.content_length().unwrap_or(0));
        let mut file = std::fs::File::create(dest).map_err(|e| download_error(e.to_string()))?;

        loop {
            let chunk = tokio::time::timeout(idle, response.chunk())
                .await
                .map_err(|_| stalled())?
                .map_err(|e| download_error(e.to_string()))?;
            let Some(chunk) = chunk else {
                break;
            };
            file.write_all(&chunk)
                .map_err(|e| download_error(e.to_string()))?;
            if let Some(ref bar) = bar {
                bar.inc(chunk.len() as u64);
            }
        }
        file.sync_all().map_err(|e| download_error(e.to_string()))?;

        if let Some(ref bar) = bar {
            bar.finish_with_message("Downloaded");
        }
        Ok(())
    }
}
