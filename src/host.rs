//! Everything the installer asks of the operating system: running commands
//! and looking executables up on the `PATH`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use anyhow::{Context, Result};
use crate::error::SetupError;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// The first non-empty line of stdout, falling back to stderr.
    ///
    /// Some tools (older `python`, `java`) print their version on stderr.
    pub fn first_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .chain(self.stderr.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

/// A command to run, with optional extra `PATH` entries and environment.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub path_prefix: Vec<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new<P: AsRef<Path>>(program: P) -> Self {
        Invocation {
            program: program.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Prepends a directory to `PATH` for this command only.
    pub fn path_prefix<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.path_prefix.push(dir.as_ref().to_path_buf());
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// The basename of the program, used for messages and fakes.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Seam between the engine and the machine it runs on.
pub trait Host {
    /// Runs a command to completion. `Err` means it could not be started at all.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Looks an executable up on the `PATH`.
    fn which(&self, name: &str) -> Option<PathBuf>;

    /// Runs a command and fails unless it exits successfully.
    fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.run(invocation)?;
        if !output.success {
            return Err(SetupError::Command {
                command: invocation.display(),
                status: output.status.clone(),
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }
        Ok(output)
    }
}

/// The real host, backed by `std::process::Command` and the `which` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl Host for SystemHost {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        log::debug!("running `{}`", invocation.display());
        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if !invocation.path_prefix.is_empty() {
            let current = std::env::var_os("PATH").unwrap_or_default();
            let mut dirs: Vec<PathBuf> = invocation.path_prefix.clone();
            dirs.extend(std::env::split_paths(&current));
            let joined: OsString = std::env::join_paths(dirs)?;
            command.env("PATH", joined);
        }
        for (key, value) in &invocation.env {
            command.env(key, value);
        }
        let output = command
            .output()
            .with_context(|| format!("Could not start `{}`", invocation.display()))?;
        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn which(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_skips_blank_and_falls_back_to_stderr() {
        let output = CommandOutput {
            success: true,
            status: "exit status: 0".to_string(),
            stdout: "\n".to_string(),
            stderr: "Python 2.7.18\n".to_string(),
        };
        assert_eq!(output.first_line(), Some("Python 2.7.18"));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_host_runs_commands() {
        let host = SystemHost;
        let output = host
            .run(&Invocation::new("sh").args(["-c", "echo hello"]))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.first_line(), Some("hello"));

        let failed = host.run_checked(&Invocation::new("sh").args(["-c", "exit 3"]));
        assert!(failed.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_host_applies_env_and_path_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = Invocation::new("sh")
            .args(["-c", "echo \"$KISUKE_TEST_VALUE:${PATH%%:*}\""])
            .env("KISUKE_TEST_VALUE", "42")
            .path_prefix(dir.path());
        let output = SystemHost.run(&invocation).unwrap();
        assert_eq!(
            output.first_line(),
            Some(format!("42:{}", dir.path().display()).as_str())
        );
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let host = SystemHost;
        assert!(host.run(&Invocation::new("definitely-not-a-real-binary-xyz")).is_err());
        assert!(host.which("definitely-not-a-real-binary-xyz").is_none());
    }
}
