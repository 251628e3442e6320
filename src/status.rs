//! The default action: report what is on the machine without changing it.

use std::path::Path;
use anyhow::Result;
use crate::cache::{Scope, VersionCache};
use crate::catalog::{PackageKind, PACKAGES};
use crate::context::Context;
use crate::host::Host;
use crate::oracle::{is_up_to_date, Oracle, UNKNOWN_VERSION};
use crate::package_manager::Manifest;
use crate::platform::{Platform, OS_RELEASE};
use crate::report::{Event, Level, Mode, Reporter, SummaryRow};

/// Detects the platform and emits the events every action starts with.
///
/// The compatibility verdict goes out as soon as OS and arch are known;
/// the distribution and C library are only looked up on a supported machine.
/// Returns `None` when the platform is unsupported and the caller must stop.
pub fn announce_platform(host: &dyn Host, reporter: &Reporter) -> Option<Platform> {
    announce_platform_with(host, Path::new(OS_RELEASE), reporter)
}

pub fn announce_platform_with(
    host: &dyn Host,
    os_release: &Path,
    reporter: &Reporter,
) -> Option<Platform> {
    let mut platform = Platform::classify(host);
    reporter.ok(Event::SystemInfo {
        os: platform.os.as_str().to_string(),
        arch: platform.arch.as_str().to_string(),
    });
    if let Err(e) = platform.ensure_supported() {
        log::error!("{e}");
        reporter.error(Event::PlatformCompat(false));
        return None;
    }
    reporter.ok(Event::PlatformCompat(true));
    platform.identify_with(host, os_release);
    reporter.ok(Event::DevEnvironment(platform.distro.clone()));
    Some(platform)
}

/// Answer for one probed version against its pin.
fn level_for(current: &str, expected: &str) -> Level {
    if current == UNKNOWN_VERSION {
        Level::Error
    } else if is_up_to_date(current, expected) {
        Level::Ok
    } else {
        Level::Alert
    }
}

fn known(version: String) -> Option<String> {
    (version != UNKNOWN_VERSION).then_some(version)
}

pub fn report_status(ctx: &Context, host: &dyn Host, reporter: &Reporter) -> Result<()> {
    let cache = VersionCache::new(ctx.layout.cache_dir());
    let oracle = Oracle::new(host, &ctx.layout, &cache);
    let manifest = Manifest::for_platform(&ctx.platform);

    let dependency_names: Vec<String> = manifest
        .system_dependencies
        .iter()
        .filter_map(|dep| match ctx.package_manager {
            Some(manager) => dep.package_for(manager),
            None => Some(dep.name),
        })
        .map(str::to_string)
        .collect();
    reporter.notify(Event::Dependencies(dependency_names));
    reporter.notify(Event::Packages(
        manifest.managed_packages.iter().map(|s| s.to_string()).collect(),
    ));

    let mut present = Vec::new();
    let mut missing = Vec::new();
    for dep in manifest.system_dependencies {
        let Some(binary) = dep.binary else {
            log::debug!("{} has no executable to look for", dep.name);
            continue;
        };
        if host.which(binary).is_some() {
            present.push(dep.name.to_string());
        } else {
            missing.push(dep.name.to_string());
        }
    }
    reporter.ok(Event::Installed(present));
    if !missing.is_empty() {
        reporter.alert(Event::MissingDependencies(missing));
    }

    let mut binaries_ok = true;
    let mut tools_ok = true;
    for package in PACKAGES {
        match &package.kind {
            PackageKind::System(_) => {
                let version = known(oracle.current_version(package.name, Scope::System));
                let level = if version.is_some() { Level::Ok } else { Level::Alert };
                reporter.emit(
                    level,
                    Event::SysPackage {
                        name: package.name.to_string(),
                        version,
                    },
                );
            }
            PackageKind::Binary(binary) => {
                let current = oracle.current_version(package.name, Scope::Local);
                let level = level_for(&current, binary.version);
                binaries_ok &= level == Level::Ok;
                reporter.emit(
                    level,
                    Event::LocalBin {
                        name: package.name.to_string(),
                        status: known(current),
                    },
                );
            }
            PackageKind::Hosted(tool) => {
                for part in tool.parts {
                    let current = oracle.current_version(part.id, Scope::Local);
                    let level = level_for(&current, part.version);
                    tools_ok &= level == Level::Ok;
                    reporter.emit(
                        level,
                        Event::ClaudeTool {
                            part: part.label.to_string(),
                            version: known(current),
                        },
                    );
                }
            }
        }
    }
    let aggregate = |ok: bool| if ok { Level::Ok } else { Level::Error };
    reporter.emit(aggregate(binaries_ok), Event::LocalBinaries);
    reporter.emit(aggregate(tools_ok), Event::ClaudeTools);

    match std::fs::read_to_string(ctx.layout.version_file()) {
        Ok(content) if !content.trim().is_empty() => {
            reporter.ok(Event::Version(content.trim().to_string()))
        }
        _ => reporter.alert(Event::Version(UNKNOWN_VERSION.to_string())),
    }

    if reporter.mode() == Mode::Human {
        let rows: Vec<SummaryRow> = PACKAGES
            .iter()
            .map(|package| SummaryRow {
                package: package.name.to_string(),
                outcome: if package.is_system() { "system" } else { "managed" }.to_string(),
                status: oracle.describe(package),
            })
            .collect();
        reporter.summary("Package status", &rows);
    }
    Ok(())
}
