use std::fmt;
use std::path::Path;
use crate::error::SetupError;
use crate::host::{Host, Invocation};

/// Placeholder used whenever a detection command itself fails.
pub const UNKNOWN: &str = "Unknown";

pub const OS_RELEASE: &str = "/etc/os-release";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Mac,
    Unsupported,
}

impl Os {
    /// Classifies the output of `uname -s`.
    pub fn classify(kernel: &str) -> Os {
        match kernel.trim() {
            "Linux" => Os::Linux,
            "Darwin" => Os::Mac,
            _ => Os::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Mac => "mac",
            Os::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Arm64,
    Armv7l,
    Unsupported,
}

impl Arch {
    /// Classifies the output of `uname -m`.
    pub fn classify(machine: &str) -> Arch {
        match machine.trim() {
            "aarch64" | "arm64" => Arch::Arm64,
            "x86_64" | "amd64" => Arch::X86_64,
            m if m.starts_with("armv7") => Arch::Armv7l,
            _ => Arch::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
            Arch::Armv7l => "armv7l",
            Arch::Unsupported => "unsupported",
        }
    }
}

/// Which C library binaries must be linked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Libc {
    Gnu,
    Musl,
    /// macOS; there is only one choice.
    Darwin,
}

impl Libc {
    pub fn as_str(&self) -> &'static str {
        match self {
            Libc::Gnu => "gnu",
            Libc::Musl => "musl",
            Libc::Darwin => "darwin",
        }
    }
}

/// Everything known about the machine. Resolved once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
    /// `ID` from `/etc/os-release`; empty off Linux or when unreadable.
    pub distro: String,
    pub libc: Libc,
    /// Raw `uname -s`, or [`UNKNOWN`].
    pub kernel_name: String,
    /// Raw `uname -m`, or [`UNKNOWN`].
    pub machine: String,
}

impl Platform {
    pub fn is_supported(&self) -> bool {
        self.os != Os::Unsupported && self.arch != Arch::Unsupported
    }

    /// Fails with [`SetupError::UnsupportedPlatform`] unless both OS and arch are known.
    pub fn ensure_supported(&self) -> Result<(), SetupError> {
        if self.is_supported() {
            return Ok(());
        }
        Err(SetupError::UnsupportedPlatform {
            os: self.kernel_name.clone(),
            arch: self.machine.clone(),
        })
    }

    /// Detects the platform of the running machine.
    pub fn detect(host: &dyn Host) -> Platform {
        Self::detect_with(host, Path::new(OS_RELEASE))
    }

    /// Detection with an explicit os-release path.
    pub fn detect_with(host: &dyn Host, os_release: &Path) -> Platform {
        let mut platform = Self::classify(host);
        platform.identify_with(host, os_release);
        platform
    }

    /// First stage of detection: OS and arch from `uname` only.
    ///
    /// `distro` is left empty and `libc` holds the OS default until
    /// [`Platform::identify`] runs, so the compatibility verdict can be
    /// reported before anything else is looked at.
    pub fn classify(host: &dyn Host) -> Platform {
        let kernel_name = uname(host, "-s");
        let machine = uname(host, "-m");
        let os = Os::classify(&kernel_name);
        Platform {
            os,
            arch: Arch::classify(&machine),
            distro: String::new(),
            libc: if os == Os::Mac { Libc::Darwin } else { Libc::Gnu },
            kernel_name,
            machine,
        }
    }

    /// Second stage: distribution and C library.
    pub fn identify(&mut self, host: &dyn Host) {
        self.identify_with(host, Path::new(OS_RELEASE))
    }

    pub fn identify_with(&mut self, host: &dyn Host, os_release: &Path) {
        self.distro = match self.os {
            Os::Linux => std::fs::read_to_string(os_release)
                .map(|content| parse_os_release_id(&content))
                .unwrap_or_default(),
            _ => String::new(),
        };
        self.libc = detect_libc(host, self.os, &self.distro);
        log::debug!(
            "detected {}/{} distro={:?} libc={}",
            self.kernel_name,
            self.machine,
            self.distro,
            self.libc.as_str()
        );
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())?;
        if !self.distro.is_empty() {
            write!(f, " ({})", self.distro)?;
        }
        Ok(())
    }
}

fn uname(host: &dyn Host, flag: &str) -> String {
    match host.run(&Invocation::new("uname").arg(flag)) {
        Ok(output) if output.success => output
            .first_line()
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN.to_string()),
        Ok(output) => {
            log::warn!("uname {flag} exited with {}", output.status);
            UNKNOWN.to_string()
        }
        Err(e) => {
            log::warn!("uname {flag} failed: {e:#}");
            UNKNOWN.to_string()
        }
    }
}

/// Extracts `ID=` from os-release content, without quotes.
pub fn parse_os_release_id(content: &str) -> String {
    content
        .lines()
        .filter_map(|line| line.trim().strip_prefix("ID="))
        .map(|value| value.trim().trim_matches('"').trim_matches('\'').to_string())
        .next()
        .unwrap_or_default()
}

fn detect_libc(host: &dyn Host, os: Os, distro: &str) -> Libc {
    match os {
        Os::Mac => Libc::Darwin,
        Os::Linux if distro == "alpine" => Libc::Musl,
        Os::Linux => {
            // ldd --version exits 1 on musl but still names itself
            match host.run(&Invocation::new("ldd").arg("--version")) {
                Ok(output) if format!("{}{}", output.stdout, output.stderr).contains("musl") => {
                    Libc::Musl
                }
                _ => Libc::Gnu,
            }
        }
        Os::Unsupported => Libc::Gnu,
    }
}
