//! In-test fakes for the [`Host`] and [`Fetcher`] seams, plus a ready-made
//! Linux context whose release serves every managed package.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use anyhow::{bail, Result};
use crate::archive::tests::tar_gz;
use crate::config::Settings;
use crate::context::Context;
use crate::error::SetupError;
use crate::fetch::Fetcher;
use crate::host::{CommandOutput, Host, Invocation};
use crate::package_manager::PackageManager;
use crate::platform::{Arch, Libc, Os, Platform};
use crate::report::Mode;

pub(crate) const RELEASE_URL: &str = "https://release.test/latest";
pub(crate) const JQ_URL: &str = "https://github.com/jqlang/jq/releases/download/jq-1.7.1/jq-linux-amd64";
pub(crate) const RIPGREP_URL: &str = "https://github.com/BurntSushi/ripgrep/releases/download/14.1.1/ripgrep-14.1.1-x86_64-unknown-linux-musl.tar.gz";
pub(crate) const NODEJS_ASSET: &str = "nodejs-22.12.0-linux-gnu-x86_64.tar.gz";
pub(crate) const PYTHON_ASSET: &str = "python-3.12.8-linux-gnu-x86_64.tar.gz";

fn answer(line: &str) -> CommandOutput {
    CommandOutput {
        success: true,
        status: "exit status: 0".to_string(),
        stdout: format!("{line}\n"),
        stderr: String::new(),
    }
}

fn failure(stderr: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        status: "exit status: 1".to_string(),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// A host whose "executables" are plain files holding their version line.
///
/// Files starting with `fail` exit non-zero. System binaries live in an
/// in-memory `PATH`; the package manager adds to it when it is allowed to work.
pub(crate) struct ScriptedHost {
    system: RefCell<HashMap<String, String>>,
    package_manager_works: bool,
    machine: String,
    sdk: RefCell<Option<String>>,
    calls: RefCell<Vec<String>>,
    envs: RefCell<HashMap<String, Vec<(String, String)>>>,
}

impl ScriptedHost {
    pub(crate) fn new() -> Self {
        Self {
            system: RefCell::new(HashMap::new()),
            package_manager_works: true,
            machine: "x86_64".to_string(),
            sdk: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
            envs: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn with_system(self, binary: &str, version_line: &str) -> Self {
        self.system
            .borrow_mut()
            .insert(binary.to_string(), version_line.to_string());
        self
    }

    /// What `uname -m` answers; `uname -s` is always `Linux`.
    pub(crate) fn with_machine(mut self, machine: &str) -> Self {
        self.machine = machine.to_string();
        self
    }

    pub(crate) fn broken_package_manager(mut self) -> Self {
        self.package_manager_works = false;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Extra environment of the last run of `program`.
    pub(crate) fn env_of(&self, program: &str) -> Vec<(String, String)> {
        self.envs.borrow().get(program).cloned().unwrap_or_default()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub(crate) fn sdk_version(&self) -> Option<String> {
        self.sdk.borrow().clone()
    }

    fn system_path(name: &str) -> PathBuf {
        PathBuf::from("/usr/bin").join(name)
    }
}

impl Host for ScriptedHost {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(invocation.display());
        let name = invocation.program_name();
        if !invocation.env.is_empty() {
            self.envs.borrow_mut().insert(name.clone(), invocation.env.clone());
        }
        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();

        match (name.as_str(), args.as_slice()) {
            ("id", ["-u"]) => return Ok(answer("0")),
            ("uname", ["-s"]) => return Ok(answer("Linux")),
            ("uname", ["-m"]) => return Ok(answer(&self.machine)),
            ("ldd", ["--version"]) => return Ok(answer("ldd (Debian GLIBC 2.36-9) 2.36")),
            ("apt-get", ["install", "-y", packages @ ..]) => {
                if !self.package_manager_works {
                    return Ok(failure("E: Unable to locate package"));
                }
                for package in packages {
                    self.system
                        .borrow_mut()
                        .insert(package.to_string(), format!("{package} version 2.43.0"));
                }
                return Ok(answer(""));
            }
            ("python3", ["-m", "pip", "install", .., spec]) => {
                let Some((_, version)) = spec.split_once("==") else {
                    return Ok(failure("invalid requirement"));
                };
                *self.sdk.borrow_mut() = Some(version.to_string());
                return Ok(answer(""));
            }
            ("python3", ["-m", "pip", "uninstall", ..]) => {
                *self.sdk.borrow_mut() = None;
                return Ok(answer(""));
            }
            ("python3", ["-c", ..]) if invocation.program.exists() => {
                return Ok(match self.sdk_version() {
                    Some(version) => answer(&version),
                    None => failure("PackageNotFoundError"),
                });
            }
            ("npm", ["install", .., "--prefix", prefix, spec]) => {
                let Some((_, version)) = spec.rsplit_once('@') else {
                    return Ok(failure("invalid spec"));
                };
                let bin = Path::new(prefix).join("bin");
                std::fs::create_dir_all(&bin)?;
                std::fs::write(bin.join("claude"), format!("{version} (Claude Code)\n"))?;
                return Ok(answer(""));
            }
            _ => {}
        }

        // system binaries only exist in memory, whatever the real machine has
        if invocation.program == Self::system_path(&name) {
            return match self.system.borrow().get(&name) {
                Some(line) => Ok(answer(line)),
                None => bail!("No such file or directory: {}", invocation.program.display()),
            };
        }
        if invocation.program.starts_with(std::env::temp_dir()) && invocation.program.exists() {
            let content = std::fs::read_to_string(&invocation.program)?;
            return Ok(if content.starts_with("fail") {
                failure("segmentation fault")
            } else {
                answer(content.trim())
            });
        }
        bail!("No such file or directory: {}", invocation.program.display())
    }

    fn which(&self, name: &str) -> Option<PathBuf> {
        self.system
            .borrow()
            .contains_key(name)
            .then(|| Self::system_path(name))
    }
}

/// Serves fixed bodies by URL and remembers every request.
pub(crate) struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    requests: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub(crate) fn new() -> Self {
        Self {
            files: HashMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn with<B: Into<Vec<u8>>>(mut self, url: &str, body: B) -> Self {
        self.files.insert(url.to_string(), body.into());
        self
    }

    pub(crate) fn without(mut self, url: &str) -> Self {
        self.files.remove(url);
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    /// Everything a full install on x86_64 glibc Linux downloads.
    pub(crate) fn full_release() -> Self {
        let assets = [NODEJS_ASSET, PYTHON_ASSET];
        Self::new()
            .with(RELEASE_URL, release_json("v0.4.0", &assets))
            .with(JQ_URL, "jq-1.7.1\n")
            .with(
                RIPGREP_URL,
                tar_gz(&[(
                    "ripgrep-14.1.1-x86_64-unknown-linux-musl/rg",
                    "ripgrep 14.1.1 (rev 4649aa9700)\n",
                    0o755,
                )]),
            )
            .with(
                &asset_url(NODEJS_ASSET),
                tar_gz(&[
                    ("node-v22.12.0/bin/node", "v22.12.0\n", 0o755),
                    ("node-v22.12.0/bin/npm", "10.9.0\n", 0o755),
                    ("node-v22.12.0/bin/npx", "10.9.0\n", 0o755),
                ]),
            )
            .with(
                &asset_url(PYTHON_ASSET),
                tar_gz(&[
                    ("python/bin/python3", "Python 3.12.8\n", 0o755),
                    ("python/bin/pip3", "pip 24.3.1\n", 0o755),
                ]),
            )
    }
}

impl Fetcher for MemoryFetcher {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.borrow_mut().push(url.to_string());
        match self.files.get(url) {
            Some(body) => Ok(body.clone()),
            None => Err(SetupError::Download {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            }
            .into()),
        }
    }
}

pub(crate) fn asset_url(name: &str) -> String {
    format!("https://release.test/download/{name}")
}

pub(crate) fn release_json(tag: &str, assets: &[&str]) -> String {
    let assets: Vec<String> = assets
        .iter()
        .map(|name| {
            format!(
                r#"{{"name": "{name}", "browser_download_url": "{}"}}"#,
                asset_url(name)
            )
        })
        .collect();
    format!(r#"{{"tag_name": "{tag}", "assets": [{}]}}"#, assets.join(", "))
}

pub(crate) fn linux_platform() -> Platform {
    Platform {
        os: Os::Linux,
        arch: Arch::X86_64,
        distro: "debian".to_string(),
        libc: Libc::Gnu,
        kernel_name: "Linux".to_string(),
        machine: "x86_64".to_string(),
    }
}

pub(crate) fn context(root: &Path, package_manager: Option<PackageManager>) -> Context {
    let mut settings = Settings::with_root(root);
    settings.release_url = RELEASE_URL.to_string();
    Context::new(linux_platform(), package_manager, Mode::Machine, settings)
}
