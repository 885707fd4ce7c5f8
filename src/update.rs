//! Self-install and self-update from the published GitLab releases.

use crate::archive::{extract_archive, find_file};
use crate::error::CcliError;
use crate::paths::{download_dir, ensure_parent, relink, remove_path, Paths, BINARY_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

pub const RELEASES_URL: &str = "https://gitlab.com/api/v4/projects/47137983/releases";
const USER_AGENT: &str = "container-cli";
/// Name of the executable inside release archives.
const RELEASE_BINARY_NAME: &str = "container-cli";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Release {
    #[serde(default)]
    pub name: String,
    pub tag_name: String,
    #[serde(default)]
    pub released_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: ReleaseAssets,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReleaseAssets {
    #[serde(default)]
    pub links: Vec<ReleaseLink>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReleaseLink {
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub direct_asset_url: Option<String>,
}

impl ReleaseLink {
    pub fn download_url(&self) -> &str {
        self.direct_asset_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.url)
    }

    /// File name for the downloaded asset, taken from the URL when it has one.
    fn file_name(&self) -> String {
        Url::parse(self.download_url())
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|segments| segments.last().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.name.clone())
    }
}

pub trait ReleaseFeed {
    fn releases(&self) -> Result<Vec<Release>, CcliError>;
    fn download(&self, url: &str, path: &Path) -> Result<(), CcliError>;
}

pub struct GitlabReleaseFeed {
    url: String,
    client: reqwest::blocking::Client,
}

impl GitlabReleaseFeed {
    pub fn from_env() -> Self {
        let url = env::var("CCLI_RELEASES_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| RELEASES_URL.to_string());
        Self {
            url,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl ReleaseFeed for GitlabReleaseFeed {
    fn releases(&self) -> Result<Vec<Release>, CcliError> {
        debug!(url = %self.url, "fetching releases");
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CcliError::Release(format!(
                "failed to list releases: HTTP {} {}",
                status, body
            )));
        }
        Ok(response.json()?)
    }

    fn download(&self, url: &str, path: &Path) -> Result<(), CcliError> {
        info!(%url, "downloading release");
        let response = self.client.get(url).header("User-Agent", USER_AGENT).send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CcliError::Release(format!(
                "download failed: {} (HTTP {} {})",
                url, status, body
            )));
        }
        let bytes = response.bytes()?;
        ensure_parent(path)?;
        fs::write(path, &bytes)?;
        Ok(())
    }
}

/// Most recently released entry; releases without a date sort last.
pub fn latest_release(mut releases: Vec<Release>) -> Result<Release, CcliError> {
    releases.sort_by(|a, b| b.released_at.cmp(&a.released_at));
    releases
        .into_iter()
        .next()
        .ok_or_else(|| CcliError::Release("no releases found".to_string()))
}

/// The `<Os>_<arch>` fragment release assets are named with.
pub fn asset_key_for(os: &str, arch: &str) -> Result<String, CcliError> {
    let os = match os {
        "linux" => "Linux",
        "macos" => "Darwin",
        other => {
            return Err(CcliError::Release(format!(
                "no release builds for operating system '{other}'"
            )))
        }
    };
    let arch = match arch {
        "x86_64" => "x86_64",
        "aarch64" => "arm64",
        other => {
            return Err(CcliError::Release(format!(
                "no release builds for architecture '{other}'"
            )))
        }
    };
    Ok(format!("{os}_{arch}"))
}

pub fn select_asset<'r>(release: &'r Release, key: &str) -> Result<&'r ReleaseLink, CcliError> {
    release
        .assets
        .links
        .iter()
        .find(|link| link.name.contains(key))
        .ok_or_else(|| {
            CcliError::Release(format!(
                "release {} has no asset for {key}",
                release.tag_name
            ))
        })
}

/// Unpacks a release archive into `<bin>/container-cli/<tag>` and points `<bin>/ccli` at it.
pub fn install_archive(archive: &Path, tag: &str, paths: &Paths) -> Result<PathBuf, CcliError> {
    let version_dir = paths.versions_dir().join(tag);
    remove_path(&version_dir)?;
    extract_archive(archive, &version_dir)?;
    let found = find_file(&version_dir, RELEASE_BINARY_NAME)?.ok_or_else(|| {
        CcliError::Release(format!(
            "archive did not contain expected binary: {RELEASE_BINARY_NAME}"
        ))
    })?;
    let binary = version_dir.join(BINARY_NAME);
    fs::rename(&found, &binary)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))?;
    }
    relink(&binary, &paths.binary_link())?;
    info!(binary = %binary.display(), link = %paths.binary_link().display(), "installed release");
    Ok(binary)
}

#[derive(Debug, Clone, Serialize)]
pub struct InstalledRelease {
    pub tag: String,
    pub binary: PathBuf,
    pub link: PathBuf,
}

impl InstalledRelease {
    pub fn global_link_hint(&self) -> String {
        format!(
            "to make {BINARY_NAME} available to all users run: sudo ln -s {} /usr/local/bin/{BINARY_NAME}",
            self.binary.display()
        )
    }
}

pub fn install_latest<F: ReleaseFeed>(
    feed: &F,
    paths: &Paths,
) -> Result<InstalledRelease, CcliError> {
    let release = latest_release(feed.releases()?)?;
    let key = asset_key_for(env::consts::OS, env::consts::ARCH)?;
    let link = select_asset(&release, &key)?;
    info!(tag = %release.tag_name, asset = %link.name, "selected release");

    let work_dir = download_dir()?;
    let archive_path = work_dir.join(link.file_name());
    let result = (|| -> Result<PathBuf, CcliError> {
        feed.download(link.download_url(), &archive_path)?;
        install_archive(&archive_path, &release.tag_name, paths)
    })();
    let _ = fs::remove_dir_all(&work_dir);
    let binary = result?;

    Ok(InstalledRelease {
        tag: release.tag_name,
        binary,
        link: paths.binary_link(),
    })
}
