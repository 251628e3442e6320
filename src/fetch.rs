use std::time::Duration;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use crate::error::SetupError;

const USER_AGENT: &str = concat!("kisuke-setup/", env!("CARGO_PKG_VERSION"));

/// Release metadata as served by the GitHub releases API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    /// Asset with exactly this file name.
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// Download URL for `name`, or a [`SetupError::ReleaseAsset`].
    pub fn asset_url(&self, name: &str) -> Result<String> {
        self.asset(name)
            .map(|asset| asset.browser_download_url.clone())
            .ok_or_else(|| {
                SetupError::ReleaseAsset {
                    name: name.to_string(),
                    tag: self.tag_name.clone(),
                }
                .into()
            })
    }

    /// Expected SHA-256 of `name`, when the release publishes `<name>.sha256`.
    pub fn checksum_url(&self, name: &str) -> Option<String> {
        self.asset(&format!("{name}.sha256"))
            .map(|asset| asset.browser_download_url.clone())
    }
}

/// Seam for everything that touches the network.
///
/// Only [`Fetcher::get_bytes`] has to be implemented; text and release
/// metadata are decoded on top of it.
pub trait Fetcher {
    /// Downloads `url` completely into memory.
    ///
    /// # Errors
    ///
    /// Implementations return [`SetupError::Download`] for connection
    /// failures and non-success HTTP statuses.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;

    fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.get_bytes(url)?;
        String::from_utf8(bytes).with_context(|| format!("{url} did not return UTF-8"))
    }

    /// Fetches and parses a GitHub-style release document.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kisuke_setup::fetch::{Fetcher, HttpFetcher};
    ///
    /// let fetcher = HttpFetcher::new().unwrap();
    /// let release = fetcher
    ///     .get_release("https://api.github.com/repos/kisuke-dev/kisuke-setup/releases/latest")
    ///     .unwrap();
    /// println!("latest is {}", release.tag_name);
    /// ```
    fn get_release(&self, url: &str) -> Result<Release> {
        let body = self.get_text(url)?;
        serde_json::from_str(&body).with_context(|| format!("Invalid release metadata from {url}"))
    }
}

/// Blocking HTTP client. No timeout on transfers, only on connecting.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("GET {url}");
        let download_error = |reason: String| SetupError::Download {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| download_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())).into());
        }
        let bytes = response.bytes().map_err(|e| download_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// First hex token of a `sha256sum`-style file.
///
/// Accepts both a bare digest and `<digest>  <file>` lines. Returns `None`
/// unless the token is exactly 64 hex characters.
pub fn parse_checksum(content: &str) -> Option<String> {
    content
        .split_whitespace()
        .next()
        .filter(|token| token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .map(|token| token.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v0.4.0",
        "name": "ignored",
        "assets": [
            {"name": "kisuke-scripts.tar.gz", "browser_download_url": "https://example.invalid/s.tar.gz", "size": 10},
            {"name": "kisuke-scripts.tar.gz.sha256", "browser_download_url": "https://example.invalid/s.sha256"}
        ]
    }"#;

    #[test]
    fn test_release_asset_lookup_is_exact() {
        let release: Release = serde_json::from_str(RELEASE_JSON).unwrap();
        assert_eq!(release.tag_name, "v0.4.0");
        assert_eq!(
            release.asset_url("kisuke-scripts.tar.gz").unwrap(),
            "https://example.invalid/s.tar.gz"
        );
        assert!(release.asset_url("kisuke-scripts").is_err());
        assert_eq!(
            release.checksum_url("kisuke-scripts.tar.gz").as_deref(),
            Some("https://example.invalid/s.sha256")
        );
        assert_eq!(release.checksum_url("other.tar.gz"), None);
    }

    #[test]
    fn test_release_without_assets() {
        let release: Release = serde_json::from_str(r#"{"tag_name": "v1"}"#).unwrap();
        assert!(release.assets.is_empty());
    }

    #[test]
    fn test_parse_checksum() {
        let hash = "a".repeat(64);
        assert_eq!(parse_checksum(&format!("{hash}  file.tar.gz\n")), Some(hash.clone()));
        assert_eq!(parse_checksum(&hash.to_uppercase()), Some(hash));
        assert_eq!(parse_checksum("nothex"), None);
    }
}
