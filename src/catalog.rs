//! The fixed set of packages this tool manages, with their pinned versions.
//!
//! Behaviour is selected by [`PackageKind`], never by package name: anything
//! specific to one package (download targets, link names, probe flags) is
//! data on its definition.

use crate::platform::{Arch, Libc, Os, Platform};

pub const DEFAULT_INSTALL_ORDER: &[&str] =
    &["git", "tmux", "jq", "ripgrep", "nodejs", "python", "claude"];

pub const DEFAULT_UNINSTALL_ORDER: &[&str] =
    &["claude", "python", "nodejs", "ripgrep", "jq", "tmux", "git"];

/// How to ask a binary for its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Executable name, on the `PATH` (system scope) or in the private bin dir (local scope).
    pub binary: &'static str,
    pub args: &'static [&'static str],
}

/// Where an exposed executable lives inside a package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locate {
    /// Fixed path relative to the package directory.
    Path(&'static str),
    /// Search the extracted tree for an executable with this name.
    Search(&'static str),
}

/// A symlink in the private bin directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub name: &'static str,
    pub target: Locate,
}

/// A platform-specific value for a download template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub os: Os,
    pub arch: Arch,
    /// `None` matches any C library.
    pub libc: Option<Libc>,
    pub value: &'static str,
}

impl Target {
    fn matches(&self, platform: &Platform) -> bool {
        self.os == platform.os
            && self.arch == platform.arch
            && self.libc.is_none_or(|libc| libc == platform.libc)
    }
}

/// First target matching the platform.
pub fn select_target(targets: &[Target], platform: &Platform) -> Option<&'static str> {
    targets
        .iter()
        .find(|target| target.matches(platform))
        .map(|target| target.value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinarySource {
    /// Upstream URL; `{version}` and `{target}` are substituted.
    Direct {
        url: &'static str,
        targets: &'static [Target],
    },
    /// Asset of this project's own release, matched by exact file name.
    /// `{name}`, `{version}`, `{os}`, `{libc}` and `{arch}` are substituted.
    ReleaseBundle { asset: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemPackage {
    /// Package name given to the package manager.
    pub package: &'static str,
    pub probe: Probe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinnedBinary {
    pub version: &'static str,
    pub source: BinarySource,
    /// Exposed executables. A raw (non-archive) download is placed at the
    /// first link's path directly.
    pub links: &'static [Link],
    pub probe: Probe,
}

/// How one part of a language-hosted tool gets installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartInstaller {
    /// `<python> -m pip install <package>==<version>` with the managed interpreter.
    Pip {
        package: &'static str,
        python: &'static str,
    },
    /// `<npm> install -g --prefix <bin>/<dir> <package>@<version>` with the managed runtime.
    Npm {
        package: &'static str,
        npm: &'static str,
        dir: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostedPart {
    /// Label used in events, e.g. `SDK`.
    pub label: &'static str,
    /// Name used for the cache key and the pin table, e.g. `claude-sdk`.
    pub id: &'static str,
    pub version: &'static str,
    /// Package whose runtime hosts this part.
    pub host: &'static str,
    pub installer: PartInstaller,
    pub probe: Probe,
    pub link: Option<Link>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostedTool {
    pub parts: &'static [HostedPart],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    System(SystemPackage),
    Binary(PinnedBinary),
    Hosted(HostedTool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    pub name: &'static str,
    /// Packages that must be present before this one is installed.
    pub dependencies: &'static [&'static str],
    pub kind: PackageKind,
}

impl Package {
    pub fn is_system(&self) -> bool {
        matches!(self.kind, PackageKind::System(_))
    }

    /// Every link this package exposes.
    pub fn links(&self) -> Vec<Link> {
        match &self.kind {
            PackageKind::System(_) => vec![],
            PackageKind::Binary(binary) => binary.links.to_vec(),
            PackageKind::Hosted(tool) => tool.parts.iter().filter_map(|part| part.link).collect(),
        }
    }
}

const VERSION: &[&str] = &["--version"];

const RIPGREP_TARGETS: &[Target] = &[
    Target { os: Os::Linux, arch: Arch::X86_64, libc: None, value: "x86_64-unknown-linux-musl" },
    Target { os: Os::Linux, arch: Arch::Arm64, libc: None, value: "aarch64-unknown-linux-gnu" },
    Target { os: Os::Linux, arch: Arch::Armv7l, libc: Some(Libc::Musl), value: "armv7-unknown-linux-musleabihf" },
    Target { os: Os::Linux, arch: Arch::Armv7l, libc: None, value: "armv7-unknown-linux-gnueabihf" },
    Target { os: Os::Mac, arch: Arch::X86_64, libc: None, value: "x86_64-apple-darwin" },
    Target { os: Os::Mac, arch: Arch::Arm64, libc: None, value: "aarch64-apple-darwin" },
];

const JQ_TARGETS: &[Target] = &[
    Target { os: Os::Linux, arch: Arch::X86_64, libc: None, value: "linux-amd64" },
    Target { os: Os::Linux, arch: Arch::Arm64, libc: None, value: "linux-arm64" },
    Target { os: Os::Linux, arch: Arch::Armv7l, libc: None, value: "linux-armhf" },
    Target { os: Os::Mac, arch: Arch::X86_64, libc: None, value: "macos-amd64" },
    Target { os: Os::Mac, arch: Arch::Arm64, libc: None, value: "macos-arm64" },
];

const BUNDLE_ASSET: &str = "{name}-{version}-{os}-{libc}-{arch}.tar.gz";

pub const PACKAGES: &[Package] = &[
    Package {
        name: "git",
        dependencies: &[],
        kind: PackageKind::System(SystemPackage {
            package: "git",
            probe: Probe { binary: "git", args: VERSION },
        }),
    },
    Package {
        name: "tmux",
        dependencies: &[],
        kind: PackageKind::System(SystemPackage {
            package: "tmux",
            probe: Probe { binary: "tmux", args: &["-V"] },
        }),
    },
    Package {
        name: "jq",
        dependencies: &[],
        kind: PackageKind::Binary(PinnedBinary {
            version: "1.7.1",
            source: BinarySource::Direct {
                url: "https://github.com/jqlang/jq/releases/download/jq-{version}/jq-{target}",
                targets: JQ_TARGETS,
            },
            links: &[Link { name: "jq", target: Locate::Search("jq") }],
            probe: Probe { binary: "jq", args: VERSION },
        }),
    },
    Package {
        name: "ripgrep",
        dependencies: &[],
        kind: PackageKind::Binary(PinnedBinary {
            version: "14.1.1",
            source: BinarySource::Direct {
                url: "https://github.com/BurntSushi/ripgrep/releases/download/{version}/ripgrep-{version}-{target}.tar.gz",
                targets: RIPGREP_TARGETS,
            },
            links: &[Link { name: "rg", target: Locate::Search("rg") }],
            probe: Probe { binary: "rg", args: VERSION },
        }),
    },
    Package {
        name: "nodejs",
        dependencies: &[],
        kind: PackageKind::Binary(PinnedBinary {
            version: "22.12.0",
            source: BinarySource::ReleaseBundle { asset: BUNDLE_ASSET },
            links: &[
                Link { name: "node", target: Locate::Path("bin/node") },
                Link { name: "npm", target: Locate::Path("bin/npm") },
                Link { name: "npx", target: Locate::Path("bin/npx") },
            ],
            probe: Probe { binary: "node", args: VERSION },
        }),
    },
    Package {
        name: "python",
        dependencies: &[],
        kind: PackageKind::Binary(PinnedBinary {
            version: "3.12.8",
            source: BinarySource::ReleaseBundle { asset: BUNDLE_ASSET },
            links: &[
                Link { name: "python3", target: Locate::Path("bin/python3") },
                Link { name: "pip3", target: Locate::Path("bin/pip3") },
            ],
            probe: Probe { binary: "python3", args: VERSION },
        }),
    },
    Package {
        name: "claude",
        dependencies: &["nodejs", "ripgrep", "python"],
        kind: PackageKind::Hosted(HostedTool {
            parts: &[
                HostedPart {
                    label: "SDK",
                    id: "claude-sdk",
                    version: "0.0.25",
                    host: "python",
                    installer: PartInstaller::Pip {
                        package: "claude-code-sdk",
                        python: "python3",
                    },
                    probe: Probe {
                        binary: "python3",
                        args: &[
                            "-c",
                            "import importlib.metadata as m; print(m.version('claude-code-sdk'))",
                        ],
                    },
                    link: None,
                },
                HostedPart {
                    label: "CLI",
                    id: "claude-cli",
                    version: "1.0.67",
                    host: "nodejs",
                    installer: PartInstaller::Npm {
                        package: "@anthropic-ai/claude-code",
                        npm: "npm",
                        dir: "claude-cli",
                    },
                    probe: Probe { binary: "claude", args: VERSION },
                    link: Some(Link { name: "claude", target: Locate::Path("bin/claude") }),
                },
            ],
        }),
    },
];

/// The names a batch works through: the request as given, or `default` when empty.
pub fn batch_names(requested: &[String], default: &[&str]) -> Vec<String> {
    if requested.is_empty() {
        default.iter().map(|name| name.to_string()).collect()
    } else {
        requested.to_vec()
    }
}

pub fn find(name: &str) -> Option<&'static Package> {
    PACKAGES.iter().find(|package| package.name == name)
}

/// The part with this id, together with its owning package.
pub fn find_part(id: &str) -> Option<(&'static Package, &'static HostedPart)> {
    PACKAGES.iter().find_map(|package| match &package.kind {
        PackageKind::Hosted(tool) => tool
            .parts
            .iter()
            .find(|part| part.id == id)
            .map(|part| (package, part)),
        _ => None,
    })
}

/// Parts hosted by `host`; their cached versions go stale when `host` changes.
pub fn parts_hosted_by(host: &str) -> Vec<&'static HostedPart> {
    PACKAGES
        .iter()
        .filter_map(|package| match &package.kind {
            PackageKind::Hosted(tool) => Some(tool.parts.iter()),
            _ => None,
        })
        .flatten()
        .filter(|part| part.host == host)
        .collect()
}

/// Substitutes `{key}` placeholders.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    values
        .iter()
        .fold(template.to_string(), |acc, (key, value)| {
            acc.replace(&format!("{{{key}}}"), value)
        })
}

/// OS spelling used in release bundle names.
pub fn bundle_os(os: Os) -> &'static str {
    match os {
        Os::Linux => "linux",
        Os::Mac => "darwin",
        Os::Unsupported => "unsupported",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(os: Os, arch: Arch, libc: Libc) -> Platform {
        Platform {
            os,
            arch,
            distro: String::new(),
            libc,
            kernel_name: String::new(),
            machine: String::new(),
        }
    }

    #[test]
    fn test_default_orders_cover_catalog() {
        for name in DEFAULT_INSTALL_ORDER {
            assert!(find(name).is_some(), "{name} missing");
            assert!(DEFAULT_UNINSTALL_ORDER.contains(name));
        }
        assert_eq!(DEFAULT_INSTALL_ORDER.len(), PACKAGES.len());
    }

    #[test]
    fn test_dependencies_come_earlier_in_default_order() {
        for (index, name) in DEFAULT_INSTALL_ORDER.iter().enumerate() {
            let package = find(name).unwrap();
            for dep in package.dependencies {
                let dep_index = DEFAULT_INSTALL_ORDER.iter().position(|n| n == dep).unwrap();
                assert!(dep_index < index, "{dep} must precede {name}");
            }
        }
    }

    #[test]
    fn test_batch_names_keep_caller_order() {
        let requested = vec!["claude".to_string(), "jq".to_string()];
        assert_eq!(batch_names(&requested, DEFAULT_INSTALL_ORDER), requested);
        assert_eq!(batch_names(&[], DEFAULT_UNINSTALL_ORDER)[0], "claude");
    }

    #[test]
    fn test_ripgrep_target_selection() {
        let linux_musl = platform(Os::Linux, Arch::Armv7l, Libc::Musl);
        let linux_gnu = platform(Os::Linux, Arch::Armv7l, Libc::Gnu);
        let mac = platform(Os::Mac, Arch::Arm64, Libc::Darwin);
        assert_eq!(
            select_target(RIPGREP_TARGETS, &linux_musl),
            Some("armv7-unknown-linux-musleabihf")
        );
        assert_eq!(
            select_target(RIPGREP_TARGETS, &linux_gnu),
            Some("armv7-unknown-linux-gnueabihf")
        );
        assert_eq!(select_target(RIPGREP_TARGETS, &mac), Some("aarch64-apple-darwin"));
        assert_eq!(
            select_target(RIPGREP_TARGETS, &platform(Os::Mac, Arch::Armv7l, Libc::Darwin)),
            None
        );
    }

    #[test]
    fn test_render_bundle_asset() {
        let name = render(
            BUNDLE_ASSET,
            &[
                ("name", "nodejs"),
                ("version", "22.12.0"),
                ("os", "linux"),
                ("libc", "musl"),
                ("arch", "x86_64"),
            ],
        );
        assert_eq!(name, "nodejs-22.12.0-linux-musl-x86_64.tar.gz");
    }

    #[test]
    fn test_parts_hosted_by_runtime() {
        let parts: Vec<_> = parts_hosted_by("nodejs").iter().map(|p| p.id).collect();
        assert_eq!(parts, vec!["claude-cli"]);
        assert!(parts_hosted_by("jq").is_empty());
        assert_eq!(find_part("claude-sdk").unwrap().0.name, "claude");
    }
}
