//! Deploys the companion runtime scripts from the project's release and
//! records the deployed release tag.

use anyhow::{anyhow, Result};
use semver::Version;
use crate::archive::{extract, verify_sha256};
use crate::context::Context;
use crate::error::{PackageFailure, Phase, WithPhase};
use crate::fetch::{parse_checksum, Fetcher};
use crate::paths::Layout;
use crate::report::{Event, Reporter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deployment {
    Deployed(String),
    UpToDate(String),
}

/// Parses `v1.2.3` or `1.2.3`.
pub fn parse_tag(tag: &str) -> Option<Version> {
    Version::parse(tag.trim().trim_start_matches('v')).ok()
}

/// Whether `installed` is at least `release`. Unparsable tags only match themselves.
pub fn is_current(installed: &str, release: &str) -> bool {
    match (parse_tag(installed), parse_tag(release)) {
        (Some(installed), Some(release)) => installed >= release,
        _ => installed.trim() == release.trim(),
    }
}

/// The tag recorded by the last deployment, if any.
pub fn installed_tag(layout: &Layout) -> Option<String> {
    std::fs::read_to_string(layout.version_file())
        .ok()
        .map(|content| content.trim().to_string())
        .filter(|tag| !tag.is_empty())
}

/// Runs a deployment and reports it. Returns whether it succeeded.
pub fn deploy(ctx: &Context, fetcher: &dyn Fetcher, reporter: &Reporter, force: bool) -> bool {
    match try_deploy(ctx, fetcher, force) {
        Ok(Deployment::Deployed(tag)) => {
            log::info!("deployed scripts {tag}");
            reporter.ok(Event::Deployed(tag));
            true
        }
        Ok(Deployment::UpToDate(tag)) => {
            reporter.ok(Event::UpToDate(tag));
            true
        }
        Err(failure) => {
            log::error!("deploy: {failure}");
            reporter.error(Event::DeployFailed(failure.phase.to_string()));
            false
        }
    }
}

fn try_deploy(
    ctx: &Context,
    fetcher: &dyn Fetcher,
    force: bool,
) -> Result<Deployment, PackageFailure> {
    let layout = &ctx.layout;
    let settings = &ctx.settings;
    layout.ensure().phase(Phase::Install)?;

    let release = fetcher
        .get_release(&settings.release_url)
        .phase(Phase::Resolve)?;
    if let Some(installed) = installed_tag(layout) {
        if !force && is_current(&installed, &release.tag_name) {
            return Ok(Deployment::UpToDate(installed));
        }
        log::debug!("replacing scripts {installed} with {}", release.tag_name);
    }
    let url = release
        .asset_url(&settings.scripts_asset)
        .phase(Phase::Resolve)?;

    let bytes = fetcher.get_bytes(&url).phase(Phase::Download)?;
    if let Some(checksum_url) = release.checksum_url(&settings.scripts_asset) {
        let expected = fetcher
            .get_text(&checksum_url)
            .and_then(|text| {
                parse_checksum(&text).ok_or_else(|| anyhow!("Malformed checksum file {checksum_url}"))
            })
            .phase(Phase::Download)?;
        verify_sha256(&bytes, &expected, &settings.scripts_asset).phase(Phase::Download)?;
    }

    // staged next to the destination so the final rename stays on one filesystem
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&layout.root)
        .phase(Phase::Extract)?;
    let staged = staging.path().join("scripts");
    std::fs::create_dir_all(&staged).phase(Phase::Extract)?;
    extract(&bytes, &settings.scripts_asset, &staged).phase(Phase::Extract)?;

    replace_dir(&staged, &layout.scripts_dir()).phase(Phase::Install)?;
    std::fs::write(layout.version_file(), format!("{}\n", release.tag_name))
        .phase(Phase::Install)?;
    Ok(Deployment::Deployed(release.tag_name))
}

fn replace_dir(from: &std::path::Path, to: &std::path::Path) -> Result<()> {
    if to.exists() {
        std::fs::remove_dir_all(to)?;
    }
    std::fs::rename(from, to)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::sha256_hex;
    use crate::archive::tests::tar_gz;
    use crate::report::Mode;
    use crate::testing::*;
    use tempfile::tempdir;

    const ASSET: &str = "kisuke-scripts.tar.gz";

    fn scripts() -> Vec<u8> {
        tar_gz(&[
            ("scripts/kisuke-broker.py", "print('broker')\n", 0o644),
            ("scripts/broker/config.py", "PORT = 0\n", 0o644),
        ])
    }

    fn fetcher(tag: &str) -> MemoryFetcher {
        MemoryFetcher::new()
            .with(RELEASE_URL, release_json(tag, &[ASSET]))
            .with(&asset_url(ASSET), scripts())
    }

    fn run(ctx: &Context, fetcher: &MemoryFetcher, force: bool) -> (bool, Vec<String>) {
        let (reporter, sink) = Reporter::capture(Mode::Machine);
        let ok = deploy(ctx, fetcher, &reporter, force);
        (ok, sink.lines())
    }

    #[test]
    fn test_tag_comparison() {
        assert!(is_current("v0.4.0", "0.4.0"));
        assert!(is_current("v0.5.0", "v0.4.9"));
        assert!(!is_current("v0.4.0", "v0.4.1"));
        assert!(!is_current("v0.4.0-rc.1", "v0.4.0"));
        assert!(is_current("nightly", "nightly"));
        assert!(!is_current("nightly", "v1.0.0"));
    }

    #[test]
    fn test_deploy_then_up_to_date() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), None);
        let fetcher = fetcher("v0.4.0");

        let (ok, lines) = run(&ctx, &fetcher, false);
        assert!(ok);
        assert_eq!(lines, ["[KISUKE] OK DEPLOYED v0.4.0"]);
        assert!(ctx.layout.scripts_dir().join("kisuke-broker.py").exists());
        assert!(ctx.layout.scripts_dir().join("broker").join("config.py").exists());
        assert_eq!(installed_tag(&ctx.layout).as_deref(), Some("v0.4.0"));

        let (ok, lines) = run(&ctx, &fetcher, false);
        assert!(ok);
        assert_eq!(lines, ["[KISUKE] OK UP_TO_DATE v0.4.0"]);
        assert_eq!(fetcher.requests().iter().filter(|u| u.ends_with(ASSET)).count(), 1);

        let (ok, lines) = run(&ctx, &fetcher, true);
        assert!(ok);
        assert_eq!(lines, ["[KISUKE] OK DEPLOYED v0.4.0"]);
    }

    #[test]
    fn test_newer_release_replaces_old_scripts() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), None);
        ctx.layout.ensure().unwrap();
        std::fs::write(ctx.layout.scripts_dir().join("stale.py"), "").unwrap();
        std::fs::write(ctx.layout.version_file(), "v0.3.9\n").unwrap();

        let (ok, _) = run(&ctx, &fetcher("v0.4.0"), false);
        assert!(ok);
        assert!(!ctx.layout.scripts_dir().join("stale.py").exists());
        assert_eq!(installed_tag(&ctx.layout).as_deref(), Some("v0.4.0"));
    }

    #[test]
    fn test_missing_asset_fails_in_resolve() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), None);
        let fetcher = MemoryFetcher::new().with(RELEASE_URL, release_json("v0.4.0", &[]));

        let (ok, lines) = run(&ctx, &fetcher, false);
        assert!(!ok);
        assert_eq!(lines, ["[KISUKE] ERROR DEPLOY_FAILED resolve"]);
        assert!(installed_tag(&ctx.layout).is_none());
    }

    #[test]
    fn test_checksum_is_enforced_when_published() {
        let dir = tempdir().unwrap();
        let ctx = context(dir.path(), None);
        let sums = format!("{ASSET}.sha256");
        let good = fetcher("v0.4.0")
            .with(RELEASE_URL, release_json("v0.4.0", &[ASSET, sums.as_str()]))
            .with(&asset_url(&sums), format!("{}  {ASSET}\n", sha256_hex(&scripts())));
        // tar output is deterministic for identical input
        let (ok, _) = run(&ctx, &good, false);
        assert!(ok);

        let bad = good.with(&asset_url(&sums), format!("{}  {ASSET}\n", "f".repeat(64)));
        let (ok, lines) = run(&ctx, &bad, true);
        assert!(!ok);
        assert_eq!(lines, ["[KISUKE] ERROR DEPLOY_FAILED download"]);
        assert_eq!(installed_tag(&ctx.layout).as_deref(), Some("v0.4.0"));
    }
}
