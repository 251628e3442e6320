use std::path::PathBuf;
use clap::{ArgGroup, Parser};

/// Sets up and inspects the Kisuke developer toolchain.
///
/// Without an action flag the current state is reported.
#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
#[clap(group(ArgGroup::new("action").args(["install", "uninstall", "deploy"])))]
pub struct CLI {
    /// Install packages. Defaults to all, in dependency order
    #[clap(long)]
    pub install: bool,
    /// Remove managed packages. System packages only lose their cached version
    #[clap(long)]
    pub uninstall: bool,
    /// Deploy the runtime scripts of the latest release
    #[clap(long)]
    pub deploy: bool,
    /// Print `[KISUKE] LEVEL EVENT ...` lines for the mobile app instead of text
    #[clap(long)]
    pub machine: bool,
    /// Deploy even if the installed scripts are current
    #[clap(long)]
    pub force: bool,
    /// Root directory of the installation (default: ~/.kisuke)
    #[clap(long, value_name = "DIR")]
    pub root: Option<PathBuf>,
    /// Log debug output to stderr
    #[clap(short, long)]
    pub verbose: bool,
    /// Packages to install or uninstall
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Status,
    Install,
    Uninstall,
    Deploy,
}

impl CLI {
    pub fn action(&self) -> Action {
        if self.install {
            Action::Install
        } else if self.uninstall {
            Action::Uninstall
        } else if self.deploy {
            Action::Deploy
        } else {
            Action::Status
        }
    }
}
