//! # Kisuke Setup Library
//!
//! Installs and reports on the pinned developer toolchain the Kisuke mobile app
//! drives over SSH: a few system packages, standalone binaries, two language
//! runtimes and the Claude CLI/SDK, all kept below a private root (`~/.kisuke`).
//!
//! Every action talks to the outside world through two seams, [`host::Host`]
//! for processes and [`fetch::Fetcher`] for the network, and reports through
//! [`report::Reporter`], whose machine mode is a stable line protocol.
//!
//! ## Modules Overview
//! - [`platform`] – OS, architecture, distribution and C library detection
//! - [`package_manager`] – system package manager lookup and per-OS dependency manifest
//! - [`catalog`] – the managed packages, their kinds and pinned versions
//! - [`cache`] – on-disk memo of probed versions
//! - [`oracle`] – current versus expected versions
//! - [`installer`] – the per-package install state machine
//! - [`uninstaller`] – removal of managed packages
//! - [`status`] – inventory report
//! - [`deploy`] – runtime scripts deployment
//! - [`report`] – event vocabulary and its machine and human rendering

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod fetch;
pub mod host;
pub mod installer;
pub mod ledger;
pub mod oracle;
pub mod package_manager;
pub mod paths;
pub mod platform;
pub mod report;
pub mod shims;
pub mod status;
pub mod uninstaller;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Phase, SetupError};
