use std::io::Cursor;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use crate::error::SetupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
    /// A bare executable.
    Raw,
}

impl ArchiveFormat {
    pub fn from_name(name: &str) -> ArchiveFormat {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            ArchiveFormat::TarGz
        } else if lower.ends_with(".zip") {
            ArchiveFormat::Zip
        } else {
            ArchiveFormat::Raw
        }
    }
}

/// Last path segment of a URL, without query string.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checks downloaded bytes against a published SHA-256.
///
/// # Arguments
///
/// * `bytes` - The downloaded content.
/// * `expected` - Hex digest, in either case.
/// * `name` - Artifact name, only used in the error message.
///
/// # Errors
///
/// Returns an error naming both digests if they differ.
pub fn verify_sha256(bytes: &[u8], expected: &str, name: &str) -> Result<()> {
    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        bail!("Checksum mismatch for {name}: expected {expected}, got {actual}");
    }
    Ok(())
}

/// Unpacks an archive into `dest`, which must exist.
///
/// If the archive has a single top-level directory, its contents are moved up
/// so that `dest` is the root of the package tree. Unix permissions stored in
/// tarballs are kept.
///
/// # Arguments
///
/// * `bytes` - The archive content.
/// * `name` - File name of the archive; its extension picks the format
///   (`.tar.gz`/`.tgz` or `.zip`).
/// * `dest` - Directory to unpack into, usually a staging directory.
///
/// # Errors
///
/// Returns [`SetupError::Extraction`] if the format is not an archive or the
/// content cannot be unpacked, and an I/O error if flattening fails.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use kisuke_setup::archive::extract;
///
/// let bytes = std::fs::read("ripgrep-14.1.1-x86_64-unknown-linux-musl.tar.gz").unwrap();
/// extract(&bytes, "ripgrep-14.1.1-x86_64-unknown-linux-musl.tar.gz", Path::new("staging")).unwrap();
/// assert!(Path::new("staging/rg").exists());
/// ```
pub fn extract(bytes: &[u8], name: &str, dest: &Path) -> Result<()> {
    let extraction_error = |e: &dyn std::fmt::Display| SetupError::Extraction {
        name: name.to_string(),
        reason: e.to_string(),
    };
    match ArchiveFormat::from_name(name) {
        ArchiveFormat::TarGz => {
            let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
            archive.set_preserve_permissions(true);
            archive.unpack(dest).map_err(|e| extraction_error(&e))?;
        }
        ArchiveFormat::Zip => {
            let mut archive =
                zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| extraction_error(&e))?;
            archive.extract(dest).map_err(|e| extraction_error(&e))?;
        }
        ArchiveFormat::Raw => bail!(extraction_error(&"not an archive")),
    }
    flatten_single_root(dest)
}

fn flatten_single_root(dest: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = std::fs::read_dir(dest)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    let [only] = entries.as_slice() else {
        return Ok(());
    };
    if !only.is_dir() || only.is_symlink() {
        return Ok(());
    }
    for entry in std::fs::read_dir(only)? {
        let entry = entry?;
        std::fs::rename(entry.path(), dest.join(entry.file_name()))?;
    }
    std::fs::remove_dir(only)?;
    Ok(())
}

/// Writes a bare executable to `dest` with mode 755.
pub fn write_executable(bytes: &[u8], dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, bytes).with_context(|| format!("Could not write {}", dest.display()))?;
    set_executable(dest)
}

#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Finds the executable called `name` somewhere below `dir`.
///
/// An exact file name wins; otherwise the first executable whose name starts
/// with `name` is taken. The walk is sorted, so the answer is stable.
///
/// # Errors
///
/// Returns an error if the directory cannot be walked or nothing matches.
pub fn find_executable(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file() && is_executable(path) {
            candidates.push(path.to_path_buf());
        }
    }

    let re = Regex::new(&format!(r"(?i)^{}", regex::escape(name)))?;
    let rank = |p: &PathBuf| {
        let fname = p.file_name().unwrap_or_default().to_string_lossy().to_string();
        if fname == name {
            0
        } else if re.is_match(&fname) {
            1
        } else {
            10
        }
    };
    candidates.sort_by_key(rank);
    match candidates.into_iter().next() {
        Some(best) if rank(&best) < 10 => Ok(best),
        _ => bail!("No executable named '{}' found in '{}'", name, dir.display()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    /// Builds a tar.gz in memory from `(path, content, mode)` entries.
    pub(crate) fn tar_gz(entries: &[(&str, &str, u32)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
        for (path, content, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(ArchiveFormat::from_name("rg.tar.gz"), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::from_name("x.TGZ"), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::from_name("x.zip"), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::from_name("jq-linux-amd64"), ArchiveFormat::Raw);
    }

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://h/x/ripgrep-14.1.1.tar.gz?raw=1"),
            "ripgrep-14.1.1.tar.gz"
        );
        assert_eq!(file_name_from_url("jq-linux-amd64"), "jq-linux-amd64");
    }

    #[test]
    fn test_extract_flattens_single_root_and_finds_binary() {
        let bytes = tar_gz(&[
            ("ripgrep-14.1.1/rg", "#!/bin/sh\n", 0o755),
            ("ripgrep-14.1.1/doc/rg.1", "man", 0o644),
        ]);
        let dir = tempdir().unwrap();
        extract(&bytes, "ripgrep.tar.gz", dir.path()).unwrap();
        assert!(dir.path().join("rg").exists());
        assert!(dir.path().join("doc").join("rg.1").exists());

        #[cfg(unix)]
        assert_eq!(find_executable(dir.path(), "rg").unwrap(), dir.path().join("rg"));
    }

    #[test]
    fn test_extract_garbage_is_extraction_error() {
        let dir = tempdir().unwrap();
        let err = extract(b"not a tarball", "x.tar.gz", dir.path()).unwrap_err();
        assert!(err.downcast_ref::<SetupError>().is_some());
    }

    #[test]
    fn test_checksum() {
        let digest = sha256_hex(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(verify_sha256(b"abc", &digest.to_uppercase(), "abc").is_ok());
        assert!(verify_sha256(b"abd", &digest, "abd").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_executable_sets_mode() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("bin").join("jq");
        write_executable(b"#!/bin/sh\n", &dest).unwrap();
        assert!(is_executable(&dest));
    }
}
