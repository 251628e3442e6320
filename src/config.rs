use std::path::{Path, PathBuf};
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use crate::paths::Layout;

pub const DEFAULT_RELEASE_URL: &str =
    "https://api.github.com/repos/kisuke-dev/kisuke-setup/releases/latest";
pub const DEFAULT_SCRIPTS_ASSET: &str = "kisuke-scripts.tar.gz";

pub const ENV_HOME: &str = "KISUKE_HOME";
pub const ENV_RELEASE_URL: &str = "KISUKE_RELEASE_URL";

/// When to prefix package-manager invocations with `sudo -n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SudoPolicy {
    /// Only when not running as root and `sudo` is available.
    #[default]
    Auto,
    Always,
    Never,
}

/// Resolved settings. Frozen into the [`crate::context::Context`] after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub root: PathBuf,
    pub release_url: String,
    pub scripts_asset: String,
    pub use_sudo: SudoPolicy,
}

/// Contents of `<root>/config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    pub release_url: Option<String>,
    pub scripts_asset: Option<String>,
    pub use_sudo: Option<SudoPolicy>,
}

impl ConfigFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Could not read {}", path.as_ref().display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.as_ref().display()))
    }
}

impl Settings {
    pub fn with_root<P: AsRef<Path>>(root: P) -> Self {
        Settings {
            root: root.as_ref().to_path_buf(),
            release_url: DEFAULT_RELEASE_URL.to_string(),
            scripts_asset: DEFAULT_SCRIPTS_ASSET.to_string(),
            use_sudo: SudoPolicy::Auto,
        }
    }

    /// Resolves settings from defaults, the environment, an optional root override
    /// and finally `config.toml` inside the chosen root.
    ///
    /// The root itself can only come from the command line or `KISUKE_HOME`,
    /// since the config file lives inside it.
    pub fn resolve(root_override: Option<PathBuf>) -> Result<Settings> {
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let root = match root_override.or_else(|| env(ENV_HOME).map(PathBuf::from)) {
            Some(root) => root,
            None => Layout::default_root()?,
        };
        let mut settings = Settings::with_root(root);

        let config_path = Layout::new(&settings.root).config_file();
        if config_path.exists() {
            let file = ConfigFile::load(&config_path)?;
            settings.apply(file);
        }
        if let Some(url) = env(ENV_RELEASE_URL) {
            settings.release_url = url;
        }
        log::debug!("settings: {settings:?}");
        Ok(settings)
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(url) = file.release_url {
            self.release_url = url;
        }
        if let Some(asset) = file.scripts_asset {
            self.scripts_asset = asset;
        }
        if let Some(policy) = file.use_sudo {
            self.use_sudo = policy;
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "release_url = \"http://localhost/release\"\nuse_sudo = \"never\"\n",
        )
        .unwrap();

        let settings = Settings::resolve(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(settings.root, dir.path());
        assert_eq!(settings.use_sudo, SudoPolicy::Never);
        assert_eq!(settings.scripts_asset, DEFAULT_SCRIPTS_ASSET);
        if std::env::var(ENV_RELEASE_URL).is_err() {
            assert_eq!(settings.release_url, "http://localhost/release");
        }
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "use_sudo = \"sometimes\"").unwrap();
        assert!(Settings::resolve(Some(dir.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::resolve(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(settings.use_sudo, SudoPolicy::Auto);
    }
}
