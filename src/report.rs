//! The line protocol spoken to the mobile app, and its human rendering.
//!
//! Machine lines look like `[KISUKE] LEVEL EVENT args...`. Consumers ignore
//! event names they do not know, so new events can be added freely; existing
//! ones must keep their shape.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

pub const TAG: &str = "[KISUKE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Human,
    Machine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Notify,
    Ok,
    Alert,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "ERROR",
            Level::Notify => "NOTIFY",
            Level::Ok => "OK",
            Level::Alert => "ALERT",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SystemInfo { os: String, arch: String },
    PlatformCompat(bool),
    DevEnvironment(String),
    Dependencies(Vec<String>),
    Packages(Vec<String>),
    Installed(Vec<String>),
    MissingDependencies(Vec<String>),
    SysPackage { name: String, version: Option<String> },
    LocalBin { name: String, status: Option<String> },
    LocalBinaries,
    ClaudeTools,
    ClaudeTool { part: String, version: Option<String> },
    Version(String),
    Progress { package: String, percent: u8 },
    ProgressFailed { package: String },
    /// Phase detail for a failed package; follows its `PROGRESS <PKG> FAILED%`.
    InstallError { package: String, phase: String },
    Skipped { package: String, version: String },
    Verifying { package: String },
    DependencyInstall { package: String, dependency: String },
    DependencyFailed { package: String, dependency: String },
    UnknownPackage(String),
    InstallComplete(Vec<String>),
    InstallFailed(Vec<String>),
    Removed(String),
    NotFound(String),
    Unmanaged(String),
    RemoveFailed { package: String, phase: String },
    UninstallComplete(Vec<String>),
    UninstallFailed(Vec<String>),
    Deployed(String),
    UpToDate(String),
    DeployFailed(String),
}

impl Event {
    /// Event name, the first token of the body.
    pub fn name(&self) -> &'static str {
        match self {
            Event::SystemInfo { .. } => "SYSTEM_INFO",
            Event::PlatformCompat(_) => "PLATFORM_COMPAT",
            Event::DevEnvironment(_) => "DEV_ENVIRONMENT",
            Event::Dependencies(_) => "DEPENDENCIES",
            Event::Packages(_) => "PACKAGES",
            Event::Installed(_) => "INSTALLED",
            Event::MissingDependencies(_) => "MISSING_DEPENDENCIES",
            Event::SysPackage { .. } => "SYS_PACKAGE",
            Event::LocalBin { .. } => "LOCAL_BIN",
            Event::LocalBinaries => "LOCAL_BINARIES",
            Event::ClaudeTools => "CLAUDE_TOOLS",
            Event::ClaudeTool { .. } => "CLAUDE_TOOL",
            Event::Version(_) => "VERSION",
            Event::Progress { .. } | Event::ProgressFailed { .. } => "PROGRESS",
            Event::InstallError { .. } => "INSTALL_ERROR",
            Event::Skipped { .. } => "SKIPPED",
            Event::Verifying { .. } => "VERIFYING",
            Event::DependencyInstall { .. } => "DEPENDENCY_INSTALL",
            Event::DependencyFailed { .. } => "DEPENDENCY_FAILED",
            Event::UnknownPackage(_) => "UNKNOWN_PACKAGE",
            Event::InstallComplete(_) => "INSTALL_COMPLETE",
            Event::InstallFailed(_) => "INSTALL_FAILED",
            Event::Removed(_) => "REMOVED",
            Event::NotFound(_) => "NOT_FOUND",
            Event::Unmanaged(_) => "UNMANAGED",
            Event::RemoveFailed { .. } => "REMOVE_FAILED",
            Event::UninstallComplete(_) => "UNINSTALL_COMPLETE",
            Event::UninstallFailed(_) => "UNINSTALL_FAILED",
            Event::Deployed(_) => "DEPLOYED",
            Event::UpToDate(_) => "UP_TO_DATE",
            Event::DeployFailed(_) => "DEPLOY_FAILED",
        }
    }

    /// Tokens following the event name.
    pub fn args(&self) -> Vec<String> {
        match self {
            Event::SystemInfo { os, arch } => vec![format!("OS={os}"), format!("ARCH={arch}")],
            Event::PlatformCompat(ok) => vec![ok.to_string()],
            Event::DevEnvironment(distro) => vec![distro.clone()],
            Event::Dependencies(names)
            | Event::Packages(names)
            | Event::Installed(names)
            | Event::MissingDependencies(names)
            | Event::InstallComplete(names)
            | Event::InstallFailed(names)
            | Event::UninstallComplete(names)
            | Event::UninstallFailed(names) => names.clone(),
            Event::SysPackage { name, version } => vec![
                name.clone(),
                version.clone().unwrap_or_else(|| "PACKAGE_NOT_INSTALLED".to_string()),
            ],
            Event::LocalBin { name, status } => vec![
                name.clone(),
                status.clone().unwrap_or_else(|| "NOT_FOUND".to_string()),
            ],
            Event::LocalBinaries | Event::ClaudeTools => vec![],
            Event::ClaudeTool { part, version } => vec![
                part.clone(),
                version.clone().unwrap_or_else(|| "not_installed".to_string()),
            ],
            Event::Version(version) => vec![version.clone()],
            Event::Progress { package, percent } => {
                vec![package.to_uppercase(), format!("{percent}%")]
            }
            Event::ProgressFailed { package } => {
                vec![package.to_uppercase(), "FAILED%".to_string()]
            }
            Event::Skipped { package, version } => vec![package.clone(), version.clone()],
            Event::Verifying { package } => vec![package.clone()],
            Event::DependencyInstall { package, dependency }
            | Event::DependencyFailed { package, dependency } => {
                vec![package.clone(), dependency.clone()]
            }
            Event::UnknownPackage(name)
            | Event::Removed(name)
            | Event::NotFound(name)
            | Event::Unmanaged(name) => vec![name.clone()],
            Event::RemoveFailed { package, phase } | Event::InstallError { package, phase } => {
                vec![package.clone(), phase.clone()]
            }
            Event::Deployed(tag) | Event::UpToDate(tag) => vec![tag.clone()],
            Event::DeployFailed(phase) => vec![phase.clone()],
        }
    }

    /// The machine line body: name followed by args.
    pub fn body(&self) -> String {
        std::iter::once(self.name().to_string())
            .chain(self.args())
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn human(&self) -> String {
        let list = |names: &[String]| {
            if names.is_empty() {
                "none".to_string()
            } else {
                names.join(", ")
            }
        };
        match self {
            Event::SystemInfo { os, arch } => format!("System: {os} ({arch})"),
            Event::PlatformCompat(true) => "Platform is supported".to_string(),
            Event::PlatformCompat(false) => "Platform is not supported".to_string(),
            Event::DevEnvironment(distro) if distro.is_empty() => {
                "Distribution: unknown".to_string()
            }
            Event::DevEnvironment(distro) => format!("Distribution: {distro}"),
            Event::Dependencies(names) => format!("System dependencies: {}", list(names)),
            Event::Packages(names) => format!("Managed packages: {}", list(names)),
            Event::Installed(names) => format!("Dependencies present: {}", list(names)),
            Event::MissingDependencies(names) => format!("Missing dependencies: {}", list(names)),
            Event::SysPackage { name, version: Some(v) } => format!("{name}: {v}"),
            Event::SysPackage { name, version: None } => format!("{name}: not installed"),
            Event::LocalBin { name, status: Some(s) } => format!("{name}: {s}"),
            Event::LocalBin { name, status: None } => format!("{name}: not found"),
            Event::LocalBinaries => "Local binaries checked".to_string(),
            Event::ClaudeTools => "Claude tools checked".to_string(),
            Event::ClaudeTool { part, version: Some(v) } => format!("Claude {part}: v{v}"),
            Event::ClaudeTool { part, version: None } => format!("Claude {part}: not installed"),
            Event::Version(version) => format!("Kisuke scripts version {version}"),
            Event::Progress { package, percent: 0 } => format!("Installing {package}..."),
            Event::Progress { package, percent: 100 } => format!("{package} installed"),
            Event::Progress { package, percent } => format!("{package}: {percent}%"),
            Event::ProgressFailed { package } => format!("{package} failed"),
            Event::InstallError { package, phase } if phase == "verify" => {
                format!("{package} installed but verification failed")
            }
            Event::InstallError { package, phase } => {
                format!("{package} failed during {phase}")
            }
            Event::Skipped { package, version } if version.is_empty() => {
                format!("{package} is already installed, skipping")
            }
            Event::Skipped { package, version } => {
                format!("{package} is up to date (v{version}), skipping")
            }
            Event::Verifying { package } => format!("Verifying {package}..."),
            Event::DependencyInstall { package, dependency } => {
                format!("{package} needs {dependency}, installing it first")
            }
            Event::DependencyFailed { package, dependency } => {
                format!("Skipping {package}: dependency {dependency} failed")
            }
            Event::UnknownPackage(name) => format!("Unknown package '{name}', ignoring"),
            Event::InstallComplete(names) => format!("Installation complete: {}", list(names)),
            Event::InstallFailed(names) => format!("Installation failed for: {}", list(names)),
            Event::Removed(name) => format!("{name} removed"),
            Event::NotFound(name) => format!("{name} not found, skipping"),
            Event::Unmanaged(name) => {
                format!("{name} is a system package and not managed by this tool, cache cleared")
            }
            Event::RemoveFailed { package, phase } => {
                format!("Could not remove {package} ({phase})")
            }
            Event::UninstallComplete(names) => format!("Uninstall complete: {}", list(names)),
            Event::UninstallFailed(names) => format!("Uninstall failed for: {}", list(names)),
            Event::Deployed(tag) => format!("Deployed Kisuke scripts {tag}"),
            Event::UpToDate(tag) => format!("Kisuke scripts already at {tag}"),
            Event::DeployFailed(phase) => format!("Deployment failed during {phase}"),
        }
    }
}

/// One row of the final summary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub package: String,
    pub outcome: String,
    pub status: String,
}

/// An in-memory sink, shared between the reporter and whoever reads it back.
#[derive(Debug, Clone, Default)]
pub struct MemorySink(Rc<RefCell<Vec<u8>>>);

impl MemorySink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).to_string()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Writes events in the mode chosen at startup. The mode cannot change afterwards.
pub struct Reporter {
    mode: Mode,
    out: RefCell<Box<dyn Write>>,
    err: RefCell<Box<dyn Write>>,
}

impl Reporter {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            out: RefCell::new(Box::new(std::io::stdout())),
            err: RefCell::new(Box::new(std::io::stderr())),
        }
    }

    /// A reporter writing both streams into one returned [`MemorySink`].
    pub fn capture(mode: Mode) -> (Self, MemorySink) {
        let sink = MemorySink::default();
        let reporter = Self {
            mode,
            out: RefCell::new(Box::new(sink.clone())),
            err: RefCell::new(Box::new(sink.clone())),
        };
        (reporter, sink)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn emit(&self, level: Level, event: Event) {
        let result = match self.mode {
            Mode::Machine => {
                writeln!(self.out.borrow_mut(), "{TAG} {level} {}", event.body())
            }
            Mode::Human => {
                let text = event.human();
                match level {
                    Level::Error => writeln!(self.err.borrow_mut(), "{} {}", "✗".red(), text.red()),
                    Level::Alert => writeln!(self.out.borrow_mut(), "{} {}", "!".yellow(), text.yellow()),
                    Level::Ok => writeln!(self.out.borrow_mut(), "{} {}", "✓".green(), text),
                    Level::Notify => writeln!(self.out.borrow_mut(), "{} {}", "•".blue(), text),
                }
            }
        };
        if let Err(e) = result {
            log::warn!("could not write event {}: {e}", event.name());
        }
    }

    pub fn ok(&self, event: Event) {
        self.emit(Level::Ok, event)
    }

    pub fn notify(&self, event: Event) {
        self.emit(Level::Notify, event)
    }

    pub fn alert(&self, event: Event) {
        self.emit(Level::Alert, event)
    }

    pub fn error(&self, event: Event) {
        self.emit(Level::Error, event)
    }

    /// Prints the status table. Human mode only; machine consumers build their own.
    pub fn summary(&self, title: &str, rows: &[SummaryRow]) {
        if self.mode != Mode::Human || rows.is_empty() {
            return;
        }
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_header(vec!["Package", "Result", "Status"]);
        for row in rows {
            table.add_row(vec![&row.package, &row.outcome, &row.status]);
        }
        let mut out = self.out.borrow_mut();
        if let Err(e) = writeln!(out, "\n{}\n{table}", title.bold()) {
            log::warn!("could not write summary: {e}");
        }
    }
}
