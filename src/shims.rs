use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use crate::archive::find_executable;
use crate::catalog::{Link, Locate};
use crate::paths::Layout;

/// Points `shim_path` at `target`, replacing whatever was there.
///
/// On Unix this is a symbolic link. Elsewhere a `.bat` forwarder is written.
///
/// # Arguments
///
/// * `target` - The executable inside a package directory.
/// * `shim_path` - Where the link goes, normally in the private bin directory.
///
/// # Errors
///
/// Returns an error if the old shim cannot be removed or the link cannot be
/// created.
///
/// # Examples
///
/// ```no_run
/// use kisuke_setup::shims::create_shim;
///
/// create_shim("/home/me/.kisuke/bin/nodejs/bin/node", "/home/me/.kisuke/bin/node").unwrap();
/// ```
pub fn create_shim<P: AsRef<Path>, Q: AsRef<Path>>(target: P, shim_path: Q) -> Result<()> {
    let shim_path = shim_path.as_ref();
    remove_shim(shim_path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::symlink;
        symlink(target.as_ref(), shim_path).with_context(|| {
            format!(
                "Could not link {} -> {}",
                shim_path.display(),
                target.as_ref().display()
            )
        })?;
    }
    #[cfg(windows)]
    {
        let script = format!("@echo off\r\ncall \"{}\" %*\r\n", target.as_ref().display());
        std::fs::write(shim_path.with_extension("bat"), script)?;
    }
    Ok(())
}

/// Removes a shim. Returns whether anything was removed.
pub fn remove_shim<P: AsRef<Path>>(shim_path: P) -> Result<bool> {
    let shim_path = shim_path.as_ref();
    // symlink_metadata so dangling links are removed too
    if std::fs::symlink_metadata(shim_path).is_ok() {
        if shim_path.is_dir() && !shim_path.is_symlink() {
            std::fs::remove_dir_all(shim_path)?;
        } else {
            std::fs::remove_file(shim_path)?;
        }
        return Ok(true);
    }
    Ok(false)
}

/// Resolves where `link` should point inside `package_dir`.
pub fn link_target(link: &Link, package_dir: &Path) -> Result<PathBuf> {
    match link.target {
        Locate::Path(relative) => Ok(package_dir.join(relative)),
        Locate::Search(name) => find_executable(package_dir, name),
    }
}

/// Exposes every link of a package living in `package_dir`.
pub fn expose(layout: &Layout, package_dir: &Path, links: &[Link]) -> Result<Vec<PathBuf>> {
    let mut created = Vec::with_capacity(links.len());
    for link in links {
        let target = link_target(link, package_dir)?;
        let shim = layout.link_path(link.name);
        create_shim(&target, &shim)?;
        log::debug!("linked {} -> {}", shim.display(), target.display());
        created.push(shim);
    }
    Ok(created)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_shim_replaces_existing() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old");
        let new = dir.path().join("new");
        std::fs::write(&old, "old").unwrap();
        std::fs::write(&new, "new").unwrap();
        let shim = dir.path().join("tool");

        create_shim(&old, &shim).unwrap();
        create_shim(&new, &shim).unwrap();
        assert_eq!(std::fs::read_to_string(&shim).unwrap(), "new");
    }

    #[test]
    fn test_remove_dangling_shim() {
        let dir = tempdir().unwrap();
        let shim = dir.path().join("tool");
        create_shim(dir.path().join("missing"), &shim).unwrap();
        assert!(!shim.exists());
        assert!(remove_shim(&shim).unwrap());
        assert!(!remove_shim(&shim).unwrap());
    }

    #[test]
    fn test_expose_fixed_paths() {
        let dir = tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let package_dir = layout.package_dir("nodejs");
        std::fs::create_dir_all(package_dir.join("bin")).unwrap();
        std::fs::write(package_dir.join("bin").join("node"), "").unwrap();

        let links = [Link { name: "node", target: Locate::Path("bin/node") }];
        let created = expose(&layout, &package_dir, &links).unwrap();
        assert_eq!(created, vec![layout.link_path("node")]);
        assert_eq!(
            std::fs::read_link(layout.link_path("node")).unwrap(),
            package_dir.join("bin").join("node")
        );
    }
}
