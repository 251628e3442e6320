use std::process::ExitCode;
use anyhow::Result;
use kisuke_setup::config::Settings;
use kisuke_setup::context::Context;
use kisuke_setup::deploy::deploy;
use kisuke_setup::fetch::HttpFetcher;
use kisuke_setup::host::SystemHost;
use kisuke_setup::installer::Installer;
use kisuke_setup::package_manager;
use kisuke_setup::report::{Mode, Reporter};
use kisuke_setup::status::{announce_platform, report_status};
use kisuke_setup::uninstaller::Uninstaller;
use crate::cli::{Action, CLI};

pub fn execute(cli: CLI) -> Result<ExitCode> {
    let mode = if cli.machine { Mode::Machine } else { Mode::Human };
    let reporter = Reporter::new(mode);
    let host = SystemHost;

    let Some(platform) = announce_platform(&host, &reporter) else {
        return Ok(ExitCode::FAILURE);
    };
    let settings = Settings::resolve(cli.root.clone())?;
    let package_manager = package_manager::resolve(&host);
    match package_manager {
        Some(manager) => log::debug!("package manager: {manager}"),
        None => log::warn!("no supported package manager found, system packages cannot be installed"),
    }
    let ctx = Context::new(platform, package_manager, mode, settings);

    let action = cli.action();
    if !cli.packages.is_empty() && matches!(action, Action::Status | Action::Deploy) {
        log::warn!("package names are ignored without --install or --uninstall");
    }
    let success = match action {
        Action::Status => {
            report_status(&ctx, &host, &reporter)?;
            true
        }
        Action::Install => {
            let fetcher = HttpFetcher::new()?;
            Installer::new(&ctx, &host, &fetcher, &reporter)
                .install(&cli.packages)?
                .is_success()
        }
        Action::Uninstall => Uninstaller::new(&ctx, &host, &reporter)
            .uninstall(&cli.packages)?
            .is_success(),
        Action::Deploy => {
            let fetcher = HttpFetcher::new()?;
            deploy(&ctx, &fetcher, &reporter, cli.force)
        }
    };
    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
