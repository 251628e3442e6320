mod cli;
mod execute;

use std::process::ExitCode;
use clap::Parser;
use crate::cli::CLI;

fn main() -> ExitCode {
    let cli = CLI::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        log::error!("internal error at {location}: {panic_info}");
        eprintln!("kisuke-setup crashed at {location}");
    }));

    match execute::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
