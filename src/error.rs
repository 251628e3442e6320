use std::fmt;
use thiserror::Error;

/// The step of a package operation that failed.
///
/// Rendered verbatim into machine events so a consumer can tell a broken
/// download from a binary that installed but does not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Download,
    Extract,
    Install,
    Link,
    Verify,
    Dependency,
    Remove,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Resolve => "resolve",
            Phase::Download => "download",
            Phase::Extract => "extract",
            Phase::Install => "install",
            Phase::Link => "link",
            Phase::Verify => "verify",
            Phase::Dependency => "dependency",
            Phase::Remove => "remove",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures the installer distinguishes between.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Unsupported platform: os={os} arch={arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("No supported package manager found, cannot install '{package}'")]
    MissingPackageManager { package: String },

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Could not extract '{name}': {reason}")]
    Extraction { name: String, reason: String },

    #[error("'{package}' installed but verification failed: {reason}")]
    Verification { package: String, reason: String },

    #[error("'{package}' requires '{dependency}', which failed")]
    UnmetDependency { package: String, dependency: String },

    #[error("Release asset '{name}' not found in release {tag}")]
    ReleaseAsset { name: String, tag: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
}

/// A failure scoped to one package, tagged with the step it happened in.
#[derive(Debug)]
pub struct PackageFailure {
    pub phase: Phase,
    pub error: anyhow::Error,
}

impl PackageFailure {
    pub fn new(phase: Phase, error: impl Into<anyhow::Error>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }
}

impl fmt::Display for PackageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {:#}", self.phase, self.error)
    }
}

/// Attach a [`Phase`] to any fallible step.
pub trait WithPhase<T> {
    fn phase(self, phase: Phase) -> Result<T, PackageFailure>;
}

impl<T, E: Into<anyhow::Error>> WithPhase<T> for Result<T, E> {
    fn phase(self, phase: Phase) -> Result<T, PackageFailure> {
        self.map_err(|e| PackageFailure::new(phase, e))
    }
}
