//! Removal of managed packages, the mirror image of [`crate::installer`].
//!
//! System packages are never handed to the package manager for removal; only
//! their cached version is dropped.

use anyhow::Result;
use crate::cache::{cache_key, Scope, VersionCache};
use crate::catalog::{
    self, batch_names, parts_hosted_by, HostedTool, Package, PackageKind, PartInstaller,
    PinnedBinary, DEFAULT_UNINSTALL_ORDER,
};
use crate::context::Context;
use crate::error::{PackageFailure, Phase, WithPhase};
use crate::host::{Host, Invocation};
use crate::ledger::{Ledger, Terminal};
use crate::oracle::{Oracle, UNKNOWN_VERSION};
use crate::report::{Event, Mode, Reporter, SummaryRow};
use crate::shims::remove_shim;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// Nothing was installed; still a success.
    NotFound,
    /// A system package; only its cache entry was cleared.
    Unmanaged,
    Failed(Phase),
}

impl Terminal for Removal {
    fn is_failure(&self) -> bool {
        matches!(self, Removal::Failed(_))
    }

    fn label(&self) -> String {
        match self {
            Removal::Removed => "removed".to_string(),
            Removal::NotFound => "not found".to_string(),
            Removal::Unmanaged => "unmanaged".to_string(),
            Removal::Failed(phase) => format!("failed ({phase})"),
        }
    }
}

pub type UninstallLedger = Ledger<Removal>;

pub struct Uninstaller<'a> {
    ctx: &'a Context,
    host: &'a dyn Host,
    reporter: &'a Reporter,
    cache: VersionCache,
}

impl<'a> Uninstaller<'a> {
    pub fn new(ctx: &'a Context, host: &'a dyn Host, reporter: &'a Reporter) -> Self {
        Self {
            ctx,
            host,
            reporter,
            cache: VersionCache::new(ctx.layout.cache_dir()),
        }
    }

    /// Removes `requested` in order, or every package when empty.
    pub fn uninstall(&self, requested: &[String]) -> Result<UninstallLedger> {
        let mut ledger = UninstallLedger::default();

        for name in batch_names(requested, DEFAULT_UNINSTALL_ORDER) {
            let Some(package) = catalog::find(&name) else {
                self.reporter.alert(Event::UnknownPackage(name));
                continue;
            };
            if ledger.is_processed(package.name) {
                continue;
            }
            let removal = match self.remove(package) {
                Ok(removal) => removal,
                Err(failure) => {
                    log::warn!("{}: {failure}", package.name);
                    self.reporter.error(Event::RemoveFailed {
                        package: package.name.to_string(),
                        phase: failure.phase.to_string(),
                    });
                    Removal::Failed(failure.phase)
                }
            };
            ledger.record(package.name, removal);
        }

        if ledger.critical_failure() {
            self.reporter
                .error(Event::UninstallFailed(ledger.failed().to_vec()));
        } else {
            self.reporter
                .ok(Event::UninstallComplete(ledger.processed().to_vec()));
        }
        if self.reporter.mode() == Mode::Human {
            let oracle = Oracle::new(self.host, &self.ctx.layout, &self.cache);
            let rows: Vec<SummaryRow> = ledger
                .outcomes()
                .iter()
                .filter_map(|(name, removal)| {
                    let package = catalog::find(name)?;
                    Some(SummaryRow {
                        package: name.clone(),
                        outcome: removal.label(),
                        status: oracle.describe(package),
                    })
                })
                .collect();
            self.reporter.summary("Uninstall summary", &rows);
        }
        Ok(ledger)
    }

    fn remove(&self, package: &Package) -> Result<Removal, PackageFailure> {
        let removal = match &package.kind {
            PackageKind::System(_) => {
                self.cache.forget(package.name).phase(Phase::Remove)?;
                self.reporter.ok(Event::Unmanaged(package.name.to_string()));
                return Ok(Removal::Unmanaged);
            }
            PackageKind::Binary(binary) => self.remove_binary(package, binary)?,
            PackageKind::Hosted(tool) => self.remove_hosted(package, tool)?,
        };

        let layout = &self.ctx.layout;
        layout.clear_marker(package.name).phase(Phase::Remove)?;
        self.cache.forget(package.name).phase(Phase::Remove)?;

        let event = match removal {
            Removal::Removed => Event::Removed(package.name.to_string()),
            _ => Event::NotFound(package.name.to_string()),
        };
        self.reporter.ok(event);
        Ok(removal)
    }

    fn remove_binary(
        &self,
        package: &Package,
        binary: &PinnedBinary,
    ) -> Result<Removal, PackageFailure> {
        let layout = &self.ctx.layout;
        let mut removed = layout.is_marked(package.name);
        for link in binary.links {
            removed |= remove_shim(layout.link_path(link.name)).phase(Phase::Link)?;
        }
        // a raw download has no directory of its own
        if binary.links.iter().all(|link| link.name != package.name) {
            removed |= remove_shim(layout.package_dir(package.name)).phase(Phase::Remove)?;
        }
        for part in parts_hosted_by(package.name) {
            self.cache
                .remove(&cache_key(part.id, Scope::Local))
                .phase(Phase::Remove)?;
        }
        Ok(if removed {
            Removal::Removed
        } else {
            Removal::NotFound
        })
    }

    fn remove_hosted(&self, package: &Package, tool: &HostedTool) -> Result<Removal, PackageFailure> {
        let layout = &self.ctx.layout;
        let oracle = Oracle::new(self.host, layout, &self.cache);
        let mut removed = layout.is_marked(package.name);
        for part in tool.parts {
            match part.installer {
                PartInstaller::Pip { package: pip_package, python } => {
                    let python = layout.link_path(python);
                    // pip exits 0 for packages it does not have
                    let present = python.exists()
                        && oracle.refresh(part.id, Scope::Local) != UNKNOWN_VERSION;
                    if present {
                        let invocation = Invocation::new(&python)
                            .args(["-m", "pip", "uninstall", "-y", "--disable-pip-version-check"])
                            .arg(pip_package)
                            .path_prefix(layout.bin_dir());
                        match self.host.run(&invocation) {
                            Ok(output) if output.success => removed = true,
                            Ok(output) => log::debug!(
                                "`{}` exited with {}",
                                invocation.display(),
                                output.status
                            ),
                            Err(e) => log::warn!("could not run pip: {e:#}"),
                        }
                    }
                }
                PartInstaller::Npm { dir, .. } => {
                    removed |= remove_shim(layout.package_dir(dir)).phase(Phase::Remove)?;
                }
            }
            if let Some(link) = &part.link {
                removed |= remove_shim(layout.link_path(link.name)).phase(Phase::Link)?;
            }
            self.cache
                .forget(part.id)
                .phase(Phase::Remove)?;
        }
        Ok(if removed {
            Removal::Removed
        } else {
            Removal::NotFound
        })
    }
}
