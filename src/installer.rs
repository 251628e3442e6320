//! The install state machine.
//!
//! Each requested package walks
//! `Pending -> Skipped | Installing -> (Verifying -> Done | VerifyFailed) | InstallFailed`
//! and every externally visible transition emits exactly one event. Packages
//! are processed strictly in request order and a failure never stops the
//! batch, except that a package whose dependency already failed is failed
//! without being attempted.

use std::path::PathBuf;
use anyhow::{anyhow, Result};
use crate::archive::{extract, file_name_from_url, verify_sha256, write_executable, ArchiveFormat};
use crate::cache::{cache_key, Scope, VersionCache};
use crate::catalog::{
    self, batch_names, bundle_os, parts_hosted_by, render, select_target, BinarySource, HostedPart,
    HostedTool, Package, PackageKind, PartInstaller, PinnedBinary, SystemPackage,
    DEFAULT_INSTALL_ORDER,
};
use crate::context::Context;
use crate::error::{PackageFailure, Phase, SetupError, WithPhase};
use crate::fetch::{parse_checksum, Fetcher, Release};
use crate::host::{Host, Invocation};
use crate::ledger::{Ledger, Terminal};
use crate::oracle::{is_up_to_date, Oracle, UNKNOWN_VERSION};
use crate::package_manager::install_invocation;
use crate::report::{Event, Mode, Reporter, SummaryRow};
use crate::shims::{expose, remove_shim};

/// Terminal state of a package after an install batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Done,
    InstallFailed(Phase),
    VerifyFailed,
}

impl Terminal for Outcome {
    fn is_failure(&self) -> bool {
        matches!(self, Outcome::InstallFailed(_) | Outcome::VerifyFailed)
    }

    fn label(&self) -> String {
        match self {
            Outcome::Skipped => "skipped".to_string(),
            Outcome::Done => "installed".to_string(),
            Outcome::InstallFailed(Phase::Dependency) => "dependency failed".to_string(),
            Outcome::InstallFailed(phase) => format!("failed ({phase})"),
            Outcome::VerifyFailed => "verification failed".to_string(),
        }
    }
}

pub type InstallLedger = Ledger<Outcome>;

enum Action {
    /// Already at the wanted version.
    Skipped(String),
    Done(String),
}

/// A resolved artifact location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub name: String,
    pub url: String,
    pub checksum_url: Option<String>,
}

pub struct Installer<'a> {
    ctx: &'a Context,
    host: &'a dyn Host,
    fetcher: &'a dyn Fetcher,
    reporter: &'a Reporter,
    cache: VersionCache,
    release: Option<Release>,
}

impl<'a> Installer<'a> {
    pub fn new(
        ctx: &'a Context,
        host: &'a dyn Host,
        fetcher: &'a dyn Fetcher,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            ctx,
            host,
            fetcher,
            reporter,
            cache: VersionCache::new(ctx.layout.cache_dir()),
            release: None,
        }
    }

    fn oracle(&self) -> Oracle<'_> {
        Oracle::new(self.host, &self.ctx.layout, &self.cache)
    }

    /// Installs `requested` in order, or every package when empty.
    pub fn install(&mut self, requested: &[String]) -> Result<InstallLedger> {
        self.ctx.layout.ensure()?;
        let mut ledger = InstallLedger::default();

        for name in batch_names(requested, DEFAULT_INSTALL_ORDER) {
            let Some(package) = catalog::find(&name) else {
                self.reporter.alert(Event::UnknownPackage(name));
                continue;
            };
            if ledger.is_processed(package.name) {
                log::debug!("{} already handled in this batch", package.name);
                continue;
            }
            self.process(package, &mut ledger);
        }

        if ledger.critical_failure() {
            self.reporter.error(Event::InstallFailed(ledger.failed().to_vec()));
        } else {
            self.reporter
                .ok(Event::InstallComplete(ledger.processed().to_vec()));
        }
        if self.reporter.mode() == Mode::Human {
            self.reporter
                .summary("Installation summary", &self.summary_rows(&ledger));
        }
        Ok(ledger)
    }

    fn summary_rows(&self, ledger: &InstallLedger) -> Vec<SummaryRow> {
        let oracle = self.oracle();
        ledger
            .outcomes()
            .iter()
            .filter_map(|(name, outcome)| {
                let package = catalog::find(name)?;
                Some(SummaryRow {
                    package: name.clone(),
                    outcome: outcome.label(),
                    status: oracle.describe(package),
                })
            })
            .collect()
    }

    fn process(&mut self, package: &'static Package, ledger: &mut InstallLedger) -> Outcome {
        if let Err(dependency) = self.satisfy_dependencies(package, ledger) {
            self.reporter.error(Event::DependencyFailed {
                package: package.name.to_string(),
                dependency: dependency.to_string(),
            });
            let outcome = Outcome::InstallFailed(Phase::Dependency);
            ledger.record(package.name, outcome);
            return outcome;
        }

        let result = match &package.kind {
            PackageKind::System(system) => self.install_system(package, system),
            PackageKind::Binary(binary) => self.install_binary(package, binary),
            PackageKind::Hosted(tool) => self.install_hosted(package, tool),
        };

        let outcome = match result {
            Ok(Action::Skipped(version)) => {
                self.reporter.ok(Event::Skipped {
                    package: package.name.to_string(),
                    version,
                });
                Outcome::Skipped
            }
            Ok(Action::Done(version)) => {
                log::info!("{} {version} installed", package.name);
                self.reporter.ok(Event::Progress {
                    package: package.name.to_string(),
                    percent: 100,
                });
                Outcome::Done
            }
            Err(failure) => {
                log::warn!("{}: {failure}", package.name);
                self.reporter.error(Event::ProgressFailed {
                    package: package.name.to_string(),
                });
                self.reporter.error(Event::InstallError {
                    package: package.name.to_string(),
                    phase: failure.phase.to_string(),
                });
                match failure.phase {
                    Phase::Verify => Outcome::VerifyFailed,
                    phase => Outcome::InstallFailed(phase),
                }
            }
        };
        ledger.record(package.name, outcome);
        outcome
    }

    /// Makes sure every dependency is present. Returns the first one that failed.
    fn satisfy_dependencies(
        &mut self,
        package: &Package,
        ledger: &mut InstallLedger,
    ) -> Result<(), &'static str> {
        for &dependency in package.dependencies {
            if ledger.has_failed(dependency) {
                return Err(dependency);
            }
            if ledger.is_processed(dependency) {
                continue;
            }
            let Some(dep_package) = catalog::find(dependency) else {
                log::warn!("{} declares unknown dependency {dependency}", package.name);
                continue;
            };
            if self.is_satisfied(dep_package) {
                continue;
            }
            self.reporter.notify(Event::DependencyInstall {
                package: package.name.to_string(),
                dependency: dependency.to_string(),
            });
            if self.process(dep_package, ledger).is_failure() {
                return Err(dependency);
            }
        }
        Ok(())
    }

    fn is_satisfied(&self, package: &Package) -> bool {
        let oracle = self.oracle();
        match &package.kind {
            PackageKind::System(_) => {
                oracle.current_version(package.name, Scope::System) != UNKNOWN_VERSION
            }
            PackageKind::Binary(binary) => is_up_to_date(
                &oracle.current_version(package.name, Scope::Local),
                binary.version,
            ),
            PackageKind::Hosted(tool) => tool.parts.iter().all(|part| {
                is_up_to_date(&oracle.current_version(part.id, Scope::Local), part.version)
            }),
        }
    }

    fn progress(&self, package: &str, percent: u8) {
        self.reporter.notify(Event::Progress {
            package: package.to_string(),
            percent,
        });
    }

    fn verifying(&self, package: &str) {
        self.reporter.notify(Event::Verifying {
            package: package.to_string(),
        });
    }

    fn install_system(
        &self,
        package: &Package,
        system: &SystemPackage,
    ) -> Result<Action, PackageFailure> {
        let current = self.oracle().current_version(package.name, Scope::System);
        if current != UNKNOWN_VERSION {
            return Ok(Action::Skipped(current));
        }

        self.progress(package.name, 0);
        let manager = self
            .ctx
            .package_manager
            .ok_or_else(|| SetupError::MissingPackageManager {
                package: package.name.to_string(),
            })
            .phase(Phase::Resolve)?;
        let invocation = install_invocation(
            self.host,
            manager,
            self.ctx.settings.use_sudo,
            &[system.package],
        );
        self.host.run_checked(&invocation).phase(Phase::Install)?;
        self.progress(package.name, 80);

        self.verifying(package.name);
        let version = self.oracle().refresh(package.name, Scope::System);
        if version == UNKNOWN_VERSION {
            return Err(PackageFailure::new(
                Phase::Verify,
                SetupError::Verification {
                    package: package.name.to_string(),
                    reason: format!("`{}` not found after install", system.probe.binary),
                },
            ));
        }
        Ok(Action::Done(version))
    }

    fn install_binary(
        &mut self,
        package: &Package,
        binary: &PinnedBinary,
    ) -> Result<Action, PackageFailure> {
        let current = self.oracle().current_version(package.name, Scope::Local);
        if is_up_to_date(&current, binary.version) {
            return Ok(Action::Skipped(current));
        }
        log::info!(
            "{}: {} -> {}",
            package.name,
            current,
            binary.version
        );

        self.progress(package.name, 0);
        let download = self.resolve_download(package, binary).phase(Phase::Resolve)?;
        let bytes = self.download(&download).phase(Phase::Download)?;
        self.progress(package.name, 40);

        let package_dir = self.place(package, binary, &download, &bytes)?;
        self.progress(package.name, 70);

        let layout = &self.ctx.layout;
        layout
            .mark_installed(package.name, binary.version)
            .phase(Phase::Install)?;
        let key = cache_key(package.name, Scope::Local);
        self.cache.set(&key, binary.version).phase(Phase::Install)?;
        // parts hosted by this runtime must be probed again
        for part in parts_hosted_by(package.name) {
            if let Err(e) = self.cache.remove(&cache_key(part.id, Scope::Local)) {
                log::warn!("could not invalidate {}: {e:#}", part.id);
            }
        }
        if let Some(dir) = package_dir {
            expose(layout, &dir, binary.links).phase(Phase::Link)?;
        }
        self.progress(package.name, 90);

        self.verifying(package.name);
        if let Err(failure) = self.verify_binary(package, binary) {
            if let Err(e) = self.cache.remove(&key) {
                log::warn!("could not drop cache entry {key}: {e:#}");
            }
            return Err(failure);
        }
        Ok(Action::Done(binary.version.to_string()))
    }

    /// Release metadata, fetched at most once per batch.
    ///
    /// The JSON is parsed in-process, so no extraction tool needs bootstrapping.
    fn release(&mut self) -> Result<&Release> {
        if self.release.is_none() {
            let release = self.fetcher.get_release(&self.ctx.settings.release_url)?;
            log::debug!("release {} has {} assets", release.tag_name, release.assets.len());
            self.release = Some(release);
        }
        self.release
            .as_ref()
            .ok_or_else(|| anyhow!("Release metadata unavailable"))
    }

    pub fn resolve_download(
        &mut self,
        package: &Package,
        binary: &PinnedBinary,
    ) -> Result<Download> {
        let platform = self.ctx.platform.clone();
        match binary.source {
            BinarySource::Direct { url, targets } => {
                let target = select_target(targets, &platform)
                    .ok_or_else(|| anyhow!("No {} build for {platform}", package.name))?;
                let url = render(url, &[("version", binary.version), ("target", target)]);
                Ok(Download {
                    name: file_name_from_url(&url),
                    url,
                    checksum_url: None,
                })
            }
            BinarySource::ReleaseBundle { asset } => {
                let asset = render(
                    asset,
                    &[
                        ("name", package.name),
                        ("version", binary.version),
                        ("os", bundle_os(platform.os)),
                        ("libc", platform.libc.as_str()),
                        ("arch", platform.arch.as_str()),
                    ],
                );
                let release = self.release()?;
                Ok(Download {
                    url: release.asset_url(&asset)?,
                    checksum_url: release.checksum_url(&asset),
                    name: asset,
                })
            }
        }
    }

    fn download(&self, download: &Download) -> Result<Vec<u8>> {
        let bytes = self.fetcher.get_bytes(&download.url)?;
        if let Some(checksum_url) = &download.checksum_url {
            let text = self.fetcher.get_text(checksum_url)?;
            let expected = parse_checksum(&text)
                .ok_or_else(|| anyhow!("Malformed checksum file {checksum_url}"))?;
            verify_sha256(&bytes, &expected, &download.name)?;
        }
        Ok(bytes)
    }

    /// Puts the artifact in place through a scoped staging directory.
    ///
    /// Returns the package directory for archives, `None` for a bare executable
    /// that was placed directly at its link path.
    fn place(
        &self,
        package: &Package,
        binary: &PinnedBinary,
        download: &Download,
        bytes: &[u8],
    ) -> Result<Option<PathBuf>, PackageFailure> {
        let layout = &self.ctx.layout;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(layout.bin_dir())
            .phase(Phase::Extract)?;

        match ArchiveFormat::from_name(&download.name) {
            ArchiveFormat::Raw => {
                let link = binary
                    .links
                    .first()
                    .ok_or_else(|| anyhow!("{} exposes no executable", package.name))
                    .phase(Phase::Install)?;
                let staged = staging.path().join(link.name);
                write_executable(bytes, &staged).phase(Phase::Extract)?;
                let dest = layout.link_path(link.name);
                remove_shim(&dest).phase(Phase::Install)?;
                std::fs::rename(&staged, &dest).phase(Phase::Install)?;
                Ok(None)
            }
            ArchiveFormat::TarGz | ArchiveFormat::Zip => {
                let staged = staging.path().join(package.name);
                std::fs::create_dir_all(&staged).phase(Phase::Extract)?;
                extract(bytes, &download.name, &staged).phase(Phase::Extract)?;
                let dest = layout.package_dir(package.name);
                remove_shim(&dest).phase(Phase::Install)?;
                std::fs::rename(&staged, &dest).phase(Phase::Install)?;
                Ok(Some(dest))
            }
        }
    }

    fn verify_binary(&self, package: &Package, binary: &PinnedBinary) -> Result<(), PackageFailure> {
        let program = self.ctx.layout.link_path(binary.probe.binary);
        let invocation = Invocation::new(&program)
            .args(binary.probe.args.iter().copied())
            .path_prefix(self.ctx.layout.bin_dir());
        let verification = |reason: String| SetupError::Verification {
            package: package.name.to_string(),
            reason,
        };
        let result = match self.host.run(&invocation) {
            Ok(output) if output.success => Ok(()),
            Ok(output) => Err(verification(format!(
                "`{}` exited with {}",
                invocation.display(),
                output.status
            ))),
            Err(e) => Err(verification(format!("{e:#}"))),
        };
        result.phase(Phase::Verify)
    }

    fn install_hosted(&self, package: &Package, tool: &HostedTool) -> Result<Action, PackageFailure> {
        let summary = describe_parts(tool.parts);
        let oracle = self.oracle();
        let pending: Vec<&HostedPart> = tool
            .parts
            .iter()
            .filter(|part| {
                !is_up_to_date(&oracle.current_version(part.id, Scope::Local), part.version)
            })
            .collect();
        if pending.is_empty() {
            return Ok(Action::Skipped(summary));
        }

        self.progress(package.name, 0);
        let mut first_failure = None;
        for (index, part) in pending.iter().enumerate() {
            match self.install_part(part) {
                Ok(()) => {
                    let percent = (index + 1) * 80 / pending.len();
                    self.progress(package.name, percent as u8);
                }
                Err(failure) => {
                    log::warn!("{} {}: {failure}", package.name, part.label);
                    first_failure.get_or_insert(failure);
                }
            }
        }
        if let Some(failure) = first_failure {
            return Err(failure);
        }
        self.ctx
            .layout
            .mark_installed(package.name, &summary)
            .phase(Phase::Install)?;

        self.verifying(package.name);
        for part in &pending {
            let version = oracle.refresh(part.id, Scope::Local);
            if version != part.version {
                return Err(PackageFailure::new(
                    Phase::Verify,
                    SetupError::Verification {
                        package: part.id.to_string(),
                        reason: format!("{} reports {version}, expected {}", part.label, part.version),
                    },
                ));
            }
        }
        Ok(Action::Done(summary))
    }

    /// Installs one part with its host runtime's package manager.
    fn install_part(&self, part: &HostedPart) -> Result<(), PackageFailure> {
        let layout = &self.ctx.layout;
        match part.installer {
            PartInstaller::Pip { package, python } => {
                let python = self.host_binary(part, python)?;
                let invocation = Invocation::new(python)
                    .args(["-m", "pip", "install", "--upgrade", "--disable-pip-version-check"])
                    .arg(format!("{package}=={}", part.version))
                    .path_prefix(layout.bin_dir())
                    .env("PIP_NO_INPUT", "1");
                self.host.run_checked(&invocation).phase(Phase::Install)?;
            }
            PartInstaller::Npm { package, npm, dir } => {
                let npm = self.host_binary(part, npm)?;
                let prefix = layout.package_dir(dir);
                let invocation = Invocation::new(npm)
                    .args(["install", "-g", "--no-fund", "--no-audit", "--prefix"])
                    .arg(prefix.to_string_lossy())
                    .arg(format!("{package}@{}", part.version))
                    .path_prefix(layout.bin_dir())
                    .env("npm_config_update_notifier", "false");
                self.host.run_checked(&invocation).phase(Phase::Install)?;
                if let Some(link) = &part.link {
                    expose(layout, &prefix, std::slice::from_ref(link)).phase(Phase::Link)?;
                }
            }
        }
        self.cache
            .set(&cache_key(part.id, Scope::Local), part.version)
            .phase(Phase::Install)?;
        Ok(())
    }

    /// Managed executable of the part's host runtime.
    fn host_binary(&self, part: &HostedPart, binary: &str) -> Result<PathBuf, PackageFailure> {
        let path = self.ctx.layout.link_path(binary);
        if path.exists() {
            return Ok(path);
        }
        Err(PackageFailure::new(
            Phase::Dependency,
            SetupError::UnmetDependency {
                package: part.id.to_string(),
                dependency: part.host.to_string(),
            },
        ))
    }
}

/// `SDK=0.0.25,CLI=1.0.67`
fn describe_parts(parts: &[HostedPart]) -> String {
    parts
        .iter()
        .map(|part| format!("{}={}", part.label, part.version))
        .collect::<Vec<_>>()
        .join(",")
}
