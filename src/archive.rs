//! Tarball creation and checksum sidecars
//!
//! Release artifacts are gzip-compressed tars of a module directory,
//! accompanied by an `.md5` file holding the hex digest of the tarball
//! bytes.

use flate2::write::GzEncoder;
use flate2::Compression;
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors for archive operations
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot derive checksum filename from '{}'", .0.display())]
    ChecksumName(PathBuf),

    #[error("'{}' has no directory name to archive under", .0.display())]
    NoBaseName(PathBuf),
}

/// MD5 over the concatenated contents of the given files, sorted by path.
/// Directories in the list are skipped.
pub fn md5_for_files(paths: &[PathBuf]) -> Result<String, ArchiveError> {
    let mut sorted: Vec<&PathBuf> = paths.iter().collect();
    sorted.sort();
    let mut hasher = Md5::new();
    let mut buf = [0u8; 4096];
    for path in sorted {
        if path.is_dir() {
            continue;
        }
        let mut file = File::open(path)?;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Derive the checksum sidecar path by stripping a `.tar.gz` or `.gz`
/// suffix and appending `.md5`.
fn checksum_path(tarball_path: &Path) -> Result<PathBuf, ArchiveError> {
    let name = tarball_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::ChecksumName(tarball_path.to_path_buf()))?;
    for suffix in [".tar.gz", ".gz"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            return Ok(tarball_path.with_file_name(format!("{stem}.md5")));
        }
    }
    Err(ArchiveError::ChecksumName(tarball_path.to_path_buf()))
}

/// Create a gzip tarball of `directory` (archived under its basename) at
/// `tarball_path`, plus the `.md5` checksum sidecar.
pub fn create_tarball(tarball_path: &Path, directory: &Path) -> Result<(), ArchiveError> {
    let base_name = directory
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::NoBaseName(directory.to_path_buf()))?;

    let md5_path = checksum_path(tarball_path)?;

    let tar_gz = File::create(tarball_path)?;
    let encoder = GzEncoder::new(tar_gz, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(base_name, directory)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?.flush()?;

    let digest = md5_for_files(&[tarball_path.to_path_buf()])?;
    fs::write(&md5_path, &digest)?;
    info!(tarball = %tarball_path.display(), md5 = %digest, "tarball created");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn make_module(root: &Path) -> PathBuf {
        let dir = root.join("DIRAC");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("__init__.py"), "majorVersion = 0\n").unwrap();
        fs::write(dir.join("sub/file.txt"), "payload").unwrap();
        dir
    }

    #[test]
    fn test_create_tarball_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let module = make_module(dir.path());
        let tarball = dir.path().join("DIRAC-v1r0.tar.gz");

        create_tarball(&tarball, &module).unwrap();

        assert!(tarball.is_file());
        let md5_file = dir.path().join("DIRAC-v1r0.md5");
        assert!(md5_file.is_file());

        let digest = fs::read_to_string(&md5_file).unwrap();
        assert_eq!(digest.len(), 32);
        assert_eq!(
            digest,
            md5_for_files(&[tarball.clone()]).unwrap()
        );
    }

    #[test]
    fn test_tarball_entries_under_basename() {
        let dir = TempDir::new().unwrap();
        let module = make_module(dir.path());
        let tarball = dir.path().join("DIRAC-v1r0.tar.gz");
        create_tarball(&tarball, &module).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&tarball).unwrap()));
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                e.unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert!(paths.iter().any(|p| p == "DIRAC/sub/file.txt"));
        assert!(paths.iter().all(|p| p.starts_with("DIRAC")));
    }

    #[test]
    fn test_checksum_name_requires_gz_suffix() {
        let dir = TempDir::new().unwrap();
        let module = make_module(dir.path());
        let err = create_tarball(&dir.path().join("DIRAC.tar"), &module).unwrap_err();
        assert!(matches!(err, ArchiveError::ChecksumName(_)));
    }

    #[test]
    fn test_md5_for_files_is_order_insensitive() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "aaa").unwrap();
        fs::write(&b, "bbb").unwrap();

        let forward = md5_for_files(&[a.clone(), b.clone()]).unwrap();
        let backward = md5_for_files(&[b, a]).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_md5_for_files_skips_directories() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, "aaa").unwrap();
        let with_dir = md5_for_files(&[a.clone(), dir.path().to_path_buf()]).unwrap();
        let alone = md5_for_files(&[a]).unwrap();
        assert_eq!(with_dir, alone);
    }
}
