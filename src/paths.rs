use std::path::{Path, PathBuf};
use anyhow::{anyhow, Result};
use directories::BaseDirs;

/// Directory name of the private root below the user's home.
pub const ROOT_DIR_NAME: &str = ".kisuke";

/// On-disk layout of everything the installer owns.
///
/// ```text
/// <root>/
///   bin/          executables, symlinks and one subdirectory per multi-file package
///   cache/        one small file per version cache key
///   installed/    one marker file per installed package
///   scripts/      deployed runtime scripts
///   VERSION       release tag of the deployed scripts
///   config.toml   optional settings
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
}

impl Layout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// `~/.kisuke`, resolved through the platform's notion of a home directory.
    pub fn default_root() -> Result<PathBuf> {
        let dirs = BaseDirs::new().ok_or_else(|| anyhow!("Could not determine home directory"))?;
        Ok(dirs.home_dir().join(ROOT_DIR_NAME))
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn marker_dir(&self) -> PathBuf {
        self.root.join("installed")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    pub fn version_file(&self) -> PathBuf {
        self.root.join("VERSION")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Directory holding a multi-file package, e.g. `bin/nodejs`.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.bin_dir().join(name)
    }

    /// Symlink (or single executable) exposed on the private PATH.
    pub fn link_path(&self, link: &str) -> PathBuf {
        self.bin_dir().join(link)
    }

    pub fn marker_path(&self, package: &str) -> PathBuf {
        self.marker_dir().join(package)
    }

    /// Creates the root and every subdirectory if missing.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.bin_dir(),
            self.cache_dir(),
            self.marker_dir(),
            self.scripts_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn is_marked(&self, package: &str) -> bool {
        self.marker_path(package).exists()
    }

    pub fn mark_installed(&self, package: &str, version: &str) -> Result<()> {
        std::fs::create_dir_all(self.marker_dir())?;
        std::fs::write(self.marker_path(package), format!("{version}\n"))?;
        Ok(())
    }

    /// Returns whether a marker was actually removed.
    pub fn clear_marker(&self, package: &str) -> Result<bool> {
        let path = self.marker_path(package);
        if path.exists() {
            std::fs::remove_file(path)?;
            return Ok(true);
        }
        Ok(false)
    }
}
