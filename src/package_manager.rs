use std::fmt;
use std::path::PathBuf;
use crate::config::SudoPolicy;
use crate::host::{Host, Invocation};
use crate::platform::{Os, Platform};

/// System package managers, in probe order. First one found wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageManager {
    Apt,
    Dnf,
    Yum,
    Pacman,
    Apk,
    Zypper,
    Brew,
}

pub const PROBE_ORDER: [PackageManager; 7] = [
    PackageManager::Apt,
    PackageManager::Dnf,
    PackageManager::Yum,
    PackageManager::Pacman,
    PackageManager::Apk,
    PackageManager::Zypper,
    PackageManager::Brew,
];

impl PackageManager {
    pub fn executable(&self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Pacman => "pacman",
            PackageManager::Apk => "apk",
            PackageManager::Zypper => "zypper",
            PackageManager::Brew => "brew",
        }
    }

    pub fn install_verb(&self) -> &'static [&'static str] {
        match self {
            PackageManager::Apt => &["install", "-y"],
            PackageManager::Dnf | PackageManager::Yum => &["install", "-y"],
            PackageManager::Pacman => &["-S", "--noconfirm", "--needed"],
            PackageManager::Apk => &["add", "--no-cache"],
            PackageManager::Zypper => &["--non-interactive", "install"],
            PackageManager::Brew => &["install"],
        }
    }

    /// Homebrew refuses to run as root, everything else needs it.
    pub fn needs_root(&self) -> bool {
        !matches!(self, PackageManager::Brew)
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.executable())
    }
}

/// Probes the host for a package manager. `None` means system installs are impossible.
pub fn resolve(host: &dyn Host) -> Option<PackageManager> {
    let found = PROBE_ORDER
        .into_iter()
        .find(|pm| host.which(pm.executable()).is_some());
    match found {
        Some(pm) => log::debug!("using package manager {pm}"),
        None => log::warn!("no supported package manager found"),
    }
    found
}

/// Builds the install command for `packages`, adding `sudo -n` when required.
pub fn install_invocation(
    host: &dyn Host,
    manager: PackageManager,
    policy: SudoPolicy,
    packages: &[&str],
) -> Invocation {
    let executable = host
        .which(manager.executable())
        .unwrap_or_else(|| PathBuf::from(manager.executable()));
    let base: Vec<String> = manager
        .install_verb()
        .iter()
        .map(|s| s.to_string())
        .chain(packages.iter().map(|p| p.to_string()))
        .collect();

    if use_sudo(host, manager, policy) {
        Invocation::new("sudo")
            .arg("-n")
            .arg(executable.to_string_lossy().to_string())
            .args(base)
    } else {
        Invocation::new(executable).args(base)
    }
}

fn use_sudo(host: &dyn Host, manager: PackageManager, policy: SudoPolicy) -> bool {
    if !manager.needs_root() {
        return false;
    }
    match policy {
        SudoPolicy::Always => true,
        SudoPolicy::Never => false,
        SudoPolicy::Auto => !is_root(host) && host.which("sudo").is_some(),
    }
}

fn is_root(host: &dyn Host) -> bool {
    host.run(&Invocation::new("id").arg("-u"))
        .ok()
        .and_then(|output| output.first_line().map(|line| line == "0"))
        .unwrap_or(false)
}

/// A system dependency whose package name differs between managers.
#[derive(Debug, Clone, Copy)]
pub struct SystemDependency {
    /// Name used in reports.
    pub name: &'static str,
    /// Executable used to check presence; `None` for meta packages.
    pub binary: Option<&'static str>,
    pub remap: &'static [(PackageManager, Option<&'static str>)],
}

impl SystemDependency {
    /// Package name for `manager`, or `None` if the manager needs nothing.
    pub fn package_for(&self, manager: PackageManager) -> Option<&'static str> {
        self.remap
            .iter()
            .find(|(pm, _)| *pm == manager)
            .map(|(_, name)| *name)
            .unwrap_or(Some(self.name))
    }
}

const fn dep(name: &'static str) -> SystemDependency {
    SystemDependency {
        name,
        binary: Some(name),
        remap: &[],
    }
}

const BUILD_TOOLS: SystemDependency = SystemDependency {
    name: "build-tools",
    binary: Some("make"),
    remap: &[
        (PackageManager::Apt, Some("build-essential")),
        (PackageManager::Dnf, Some("make")),
        (PackageManager::Yum, Some("make")),
        (PackageManager::Pacman, Some("base-devel")),
        (PackageManager::Apk, Some("build-base")),
        (PackageManager::Zypper, Some("make")),
        (PackageManager::Brew, None),
    ],
};

const LINUX_DEPENDENCIES: &[SystemDependency] = &[
    dep("curl"),
    dep("tar"),
    dep("gzip"),
    SystemDependency {
        name: "ca-certificates",
        binary: None,
        remap: &[],
    },
    BUILD_TOOLS,
];

const MAC_DEPENDENCIES: &[SystemDependency] = &[dep("curl"), dep("tar"), dep("gzip")];

/// Declarative description of what each OS needs and what this tool manages.
#[derive(Debug, Clone, Copy)]
pub struct Manifest {
    pub system_dependencies: &'static [SystemDependency],
    pub managed_packages: &'static [&'static str],
}

impl Manifest {
    pub fn for_platform(platform: &Platform) -> Manifest {
        let system_dependencies = match platform.os {
            Os::Linux => LINUX_DEPENDENCIES,
            Os::Mac => MAC_DEPENDENCIES,
            Os::Unsupported => &[],
        };
        Manifest {
            system_dependencies,
            managed_packages: crate::catalog::DEFAULT_INSTALL_ORDER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CommandOutput;
    use anyhow::Result;
    use std::collections::HashSet;

    struct PathHost {
        on_path: HashSet<&'static str>,
        uid: &'static str,
    }

    impl Host for PathHost {
        fn run(&self, _invocation: &Invocation) -> Result<CommandOutput> {
            Ok(CommandOutput {
                success: true,
                stdout: format!("{}\n", self.uid),
                ..Default::default()
            })
        }

        fn which(&self, name: &str) -> Option<PathBuf> {
            self.on_path
                .contains(name)
                .then(|| PathBuf::from(format!("/usr/bin/{name}")))
        }
    }

    #[test]
    fn test_first_manager_in_order_wins() {
        let host = PathHost {
            on_path: HashSet::from(["brew", "yum", "dnf"]),
            uid: "1000",
        };
        assert_eq!(resolve(&host), Some(PackageManager::Dnf));
    }

    #[test]
    fn test_no_manager_is_none() {
        let host = PathHost {
            on_path: HashSet::new(),
            uid: "1000",
        };
        assert_eq!(resolve(&host), None);
    }

    #[test]
    fn test_install_invocation_uses_sudo_for_non_root() {
        let host = PathHost {
            on_path: HashSet::from(["apt-get", "sudo"]),
            uid: "1000",
        };
        let inv = install_invocation(&host, PackageManager::Apt, SudoPolicy::Auto, &["tmux"]);
        assert_eq!(inv.display(), "sudo -n /usr/bin/apt-get install -y tmux");
    }

    #[test]
    fn test_install_invocation_as_root_skips_sudo() {
        let host = PathHost {
            on_path: HashSet::from(["apk", "sudo"]),
            uid: "0",
        };
        let inv = install_invocation(&host, PackageManager::Apk, SudoPolicy::Auto, &["git"]);
        assert_eq!(inv.display(), "/usr/bin/apk add --no-cache git");
    }

    #[test]
    fn test_brew_never_uses_sudo() {
        let host = PathHost {
            on_path: HashSet::from(["brew", "sudo"]),
            uid: "501",
        };
        let inv = install_invocation(&host, PackageManager::Brew, SudoPolicy::Always, &["tmux"]);
        assert_eq!(inv.display(), "/usr/bin/brew install tmux");
    }

    #[test]
    fn test_build_tools_remap() {
        assert_eq!(BUILD_TOOLS.package_for(PackageManager::Apt), Some("build-essential"));
        assert_eq!(BUILD_TOOLS.package_for(PackageManager::Apk), Some("build-base"));
        assert_eq!(BUILD_TOOLS.package_for(PackageManager::Brew), None);
        assert_eq!(dep("curl").package_for(PackageManager::Pacman), Some("curl"));
    }
}
