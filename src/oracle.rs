use std::path::PathBuf;
use std::sync::LazyLock;
use regex::Regex;
use crate::cache::{cache_key, Scope, VersionCache};
use crate::catalog::{self, Package, PackageKind, Probe};
use crate::host::{Host, Invocation};
use crate::paths::Layout;

/// Returned by [`Oracle::current_version`] when nothing answers.
pub const UNKNOWN_VERSION: &str = "unknown";

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)+(?:[-+][0-9A-Za-z.]+)?").expect("valid regex"));

/// Pinned version of a package or hosted part, or `""` when unmanaged.
pub fn expected_version(name: &str) -> String {
    if let Some(package) = catalog::find(name) {
        return match &package.kind {
            PackageKind::Binary(binary) => binary.version.to_string(),
            PackageKind::System(_) | PackageKind::Hosted(_) => String::new(),
        };
    }
    catalog::find_part(name)
        .map(|(_, part)| part.version.to_string())
        .unwrap_or_default()
}

/// Human status of an installed version against its pin.
pub fn format_status(current: &str, expected: &str) -> String {
    if current.is_empty() || current == UNKNOWN_VERSION {
        "not installed".to_string()
    } else if expected.is_empty() {
        format!("installed (v{current}) - unmanaged")
    } else if current == expected {
        format!("up-to-date (v{current})")
    } else {
        format!("outdated (v{current}, expected v{expected})")
    }
}

/// Whether an install can be skipped. Exact string equality, nothing semantic.
pub fn is_up_to_date(current: &str, expected: &str) -> bool {
    !expected.is_empty() && current == expected
}

/// Pulls a version number out of a `--version` line.
///
/// `jq-1.7.1` gives `1.7.1`, `v22.12.0` gives `22.12.0`, `tmux 3.4` gives `3.4`.
pub fn parse_version(line: &str) -> Option<String> {
    VERSION_RE.find(line).map(|m| m.as_str().to_string())
}

/// Answers "which version is installed", memoized through the [`VersionCache`].
pub struct Oracle<'a> {
    host: &'a dyn Host,
    layout: &'a Layout,
    cache: &'a VersionCache,
}

impl<'a> Oracle<'a> {
    pub fn new(host: &'a dyn Host, layout: &'a Layout, cache: &'a VersionCache) -> Self {
        Self { host, layout, cache }
    }

    pub fn probe_for(name: &str) -> Option<Probe> {
        if let Some(package) = catalog::find(name) {
            return match &package.kind {
                PackageKind::System(system) => Some(system.probe),
                PackageKind::Binary(binary) => Some(binary.probe),
                PackageKind::Hosted(_) => None,
            };
        }
        catalog::find_part(name).map(|(_, part)| part.probe)
    }

    /// Cached version if any, else a live probe written back to the cache.
    pub fn current_version(&self, name: &str, scope: Scope) -> String {
        let key = cache_key(name, scope);
        if let Some(version) = self.cache.get(&key) {
            log::debug!("cache hit {key} = {version}");
            return version;
        }
        self.refresh(name, scope)
    }

    /// Live probe, ignoring the cache. Keeps the cache in line with the result.
    pub fn refresh(&self, name: &str, scope: Scope) -> String {
        let key = cache_key(name, scope);
        match self.probe(name, scope) {
            Some(version) => {
                if let Err(e) = self.cache.set(&key, &version) {
                    log::warn!("could not cache {key}: {e:#}");
                }
                version
            }
            None => {
                if let Err(e) = self.cache.remove(&key) {
                    log::warn!("could not drop stale cache entry {key}: {e:#}");
                }
                UNKNOWN_VERSION.to_string()
            }
        }
    }

    /// One-line status of a package, as shown in summaries.
    pub fn describe(&self, package: &Package) -> String {
        match &package.kind {
            PackageKind::System(_) => {
                format_status(&self.current_version(package.name, Scope::System), "")
            }
            PackageKind::Binary(binary) => format_status(
                &self.current_version(package.name, Scope::Local),
                binary.version,
            ),
            PackageKind::Hosted(tool) => tool
                .parts
                .iter()
                .map(|part| {
                    let current = self.current_version(part.id, Scope::Local);
                    format!("{}: {}", part.label, format_status(&current, part.version))
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// Where the probed executable lives for `scope`, if it exists.
    pub fn locate(&self, binary: &str, scope: Scope) -> Option<PathBuf> {
        match scope {
            Scope::System => self.host.which(binary),
            Scope::Local => {
                let path = self.layout.link_path(binary);
                path.exists().then_some(path)
            }
        }
    }

    fn probe(&self, name: &str, scope: Scope) -> Option<String> {
        let probe = Self::probe_for(name)?;
        let program = self.locate(probe.binary, scope)?;
        let invocation = Invocation::new(&program)
            .args(probe.args.iter().copied())
            .path_prefix(self.layout.bin_dir());
        let output = match self.host.run(&invocation) {
            Ok(output) if output.success => output,
            Ok(output) => {
                log::debug!("`{}` exited with {}", invocation.display(), output.status);
                return None;
            }
            Err(e) => {
                log::debug!("probe of {name} failed: {e:#}");
                return None;
            }
        };
        output.first_line().and_then(parse_version)
    }
}
