use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Where a version probe looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Installed system-wide, found on the default `PATH`.
    System,
    /// Installed by us into the private bin directory.
    Local,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::System => "system",
            Scope::Local => "local",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds the cache key `<package>_<scope>`.
pub fn cache_key(package: &str, scope: Scope) -> String {
    format!("{package}_{scope}")
}

/// A cached version probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: String,
    /// Seconds since the Unix epoch when the entry was written.
    pub timestamp: u64,
}

/// Memoizes version probes, one file per key.
///
/// Entries never expire on their own; they are removed by the installer or
/// uninstaller. A missing or unreadable entry only costs one extra probe.
#[derive(Debug, Clone)]
pub struct VersionCache {
    dir: PathBuf,
}

impl VersionCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            bail!("Invalid cache key {key:?}");
        }
        Ok(self.dir.join(key))
    }

    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        let path = self.path(key).ok()?;
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if !entry.version.is_empty() => Some(entry),
            Ok(_) => None,
            Err(e) => {
                log::debug!("ignoring corrupt cache entry {}: {e}", path.display());
                None
            }
        }
    }

    /// Returns the cached version for `key`, if there is a usable entry.
    ///
    /// Missing, corrupt and empty entries all read as `None`; the caller is
    /// expected to fall back to a live probe.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kisuke_setup::cache::{cache_key, Scope, VersionCache};
    ///
    /// let cache = VersionCache::new("/home/me/.kisuke/cache");
    /// if let Some(version) = cache.get(&cache_key("jq", Scope::Local)) {
    ///     println!("jq {version}");
    /// }
    /// ```
    pub fn get(&self, key: &str) -> Option<String> {
        self.entry(key).map(|entry| entry.version)
    }

    /// Records `version` under `key`, stamped with the current time.
    ///
    /// The cache directory is created on first use.
    ///
    /// # Arguments
    ///
    /// * `key` - A key built by [`cache_key`]. Keys containing path separators
    ///   or starting with `.` are rejected.
    /// * `version` - The bare version string, e.g. `1.7.1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the entry cannot be written.
    pub fn set(&self, key: &str, version: &str) -> Result<()> {
        let path = self.path(key)?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Could not create cache dir {:?}", self.dir))?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let entry = CacheEntry {
            version: version.to_string(),
            timestamp,
        };
        std::fs::write(&path, serde_json::to_string(&entry)?)
            .with_context(|| format!("Could not write cache file {:?}", path))?;
        Ok(())
    }

    /// Deletes the entry for `key`. Removing an absent entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the file exists but cannot
    /// be removed.
    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.path(key)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Could not remove cache file {:?}", path))?;
        }
        Ok(())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    /// Removes both scopes of `package`.
    pub fn forget(&self, package: &str) -> Result<()> {
        self.remove(&cache_key(package, Scope::System))?;
        self.remove(&cache_key(package, Scope::Local))
    }
}
