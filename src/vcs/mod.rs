//! Source checkout dispatch
//!
//! Sources are retrieved by shelling out to the version-control clients
//! (`git`, `svn`, `hg`) or by copying a local tree. The kind is either
//! given explicitly or autodiscovered from the source URL.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Errors for checkout operations
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("unknown VCS '{0}'")]
    UnknownKind(String),

    #[error("could not autodiscover VCS from source URL '{0}'")]
    DiscoveryFailed(String),

    #[error("command '{command}' failed with {status}")]
    CommandFailed { command: String, status: String },

    #[error("path {} does not exist in the repository", .0.display())]
    MissingSubPath(PathBuf),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Supported version-control clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsKind {
    Git,
    Svn,
    Hg,
    File,
}

impl VcsKind {
    pub const ALL: [VcsKind; 4] = [VcsKind::Svn, VcsKind::Git, VcsKind::Hg, VcsKind::File];

    pub fn name(self) -> &'static str {
        match self {
            VcsKind::Git => "git",
            VcsKind::Svn => "svn",
            VcsKind::Hg => "hg",
            VcsKind::File => "file",
        }
    }

    /// Guess the kind from a source URL: local paths are `file`, a `.git`
    /// suffix is `git`, and a URL starting with a client's name (for
    /// example `svn+ssh://...`) maps to that client.
    pub fn discover(source_url: &str) -> Result<VcsKind, VcsError> {
        if source_url.starts_with('/') || source_url.starts_with('~') {
            return Ok(VcsKind::File);
        }
        if source_url.ends_with(".git") {
            return Ok(VcsKind::Git);
        }
        for kind in VcsKind::ALL {
            if source_url.starts_with(kind.name()) {
                return Ok(kind);
            }
        }
        Err(VcsError::DiscoveryFailed(source_url.to_string()))
    }
}

impl FromStr for VcsKind {
    type Err = VcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" => Ok(VcsKind::Git),
            "svn" | "subversion" => Ok(VcsKind::Svn),
            "hg" | "mercurial" => Ok(VcsKind::Hg),
            "file" => Ok(VcsKind::File),
            other => Err(VcsError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One checkout request: which module to fetch, from where, at which tag.
#[derive(Debug, Clone)]
pub struct CheckoutSpec {
    /// Module name; the checkout lands in `<destination>/<module>`.
    pub module: String,
    /// Repository URL or local path.
    pub source_url: String,
    /// Tag (or branch, for git) to export.
    pub version: String,
    /// Branch to clone, when the client distinguishes it from the tag.
    pub branch: Option<String>,
    /// Subdirectory of the repository to extract (hg only).
    pub sub_path: Option<String>,
}

/// Check out one module into `destination/<module>` using `kind`.
pub fn checkout(kind: VcsKind, destination: &Path, spec: &CheckoutSpec) -> Result<(), VcsError> {
    info!(kind = %kind, module = %spec.module, "checking out sources");
    match kind {
        VcsKind::File => checkout_from_file(destination, spec),
        VcsKind::Svn => checkout_from_svn(destination, spec),
        VcsKind::Hg => checkout_from_hg(destination, spec),
        VcsKind::Git => checkout_from_git(destination, spec),
    }
}

/// Run an external command, logging it and mapping a non-zero exit to an
/// error carrying the full command line.
fn run_command(mut command: Command) -> Result<(), VcsError> {
    let rendered = format!(
        "{} {}",
        command.get_program().to_string_lossy(),
        command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );
    debug!(command = %rendered, "executing");
    let status = command.status()?;
    if !status.success() {
        return Err(VcsError::CommandFailed {
            command: rendered,
            status: status.to_string(),
        });
    }
    Ok(())
}

/// Patterns excluded from local-tree checkouts: VCS metadata and Python
/// bytecode.
fn checkout_ignore_set() -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in [".svn", ".git", ".hg", "**/.svn", "**/.git", "**/.hg", "*.pyc", "*.pyo", "**/*.pyc", "**/*.pyo"] {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Copy a local source tree, preserving symlinks and skipping VCS metadata
/// and bytecode files.
fn checkout_from_file(destination: &Path, spec: &CheckoutSpec) -> Result<(), VcsError> {
    let source = spec.source_url.strip_prefix("file://").unwrap_or(&spec.source_url);
    let source = PathBuf::from(source).canonicalize()?;
    let target = destination.join(&spec.module);
    let ignore = checkout_ignore_set();

    let mut walker = WalkDir::new(&source).follow_links(false).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(&source)
            .unwrap_or(entry.path())
            .to_path_buf();
        if rel.as_os_str().is_empty() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if ignore.is_match(&rel) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }
        let dest_path = target.join(&rel);
        if entry.path_is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link_target, &dest_path)?;
            #[cfg(not(unix))]
            {
                let _ = link_target;
                fs::copy(entry.path(), &dest_path)?;
            }
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

fn checkout_from_svn(destination: &Path, spec: &CheckoutSpec) -> Result<(), VcsError> {
    let mut cmd = Command::new("svn");
    cmd.arg("export")
        .arg("--trust-server-cert")
        .arg("--non-interactive")
        .arg(format!("{}/{}", spec.source_url, spec.version))
        .arg(destination.join(&spec.module));
    run_command(cmd)
}

fn checkout_from_hg(destination: &Path, spec: &CheckoutSpec) -> Result<(), VcsError> {
    let target = destination.join(&spec.module);
    let clone_dir = destination.join(format!("{}.tmp1", spec.module));
    let archive_dir = destination.join(format!("{}.tmp2", spec.module));

    let mut clone = Command::new("hg");
    clone.arg("clone");
    if let Some(branch) = &spec.branch {
        clone.arg("-b").arg(branch);
    }
    clone.arg(&spec.source_url).arg(&clone_dir);
    run_command(clone)?;

    let mut archive = Command::new("hg");
    archive.arg("archive").arg("--cwd").arg(&clone_dir);
    if let Some(sub_path) = &spec.sub_path {
        archive.arg("--include").arg(format!("{sub_path}/*"));
    }
    archive.arg(&archive_dir);
    let archive_result = run_command(archive);
    let _ = fs::remove_dir_all(&clone_dir);
    archive_result?;

    let mut extracted = archive_dir.clone();
    if let Some(sub_path) = &spec.sub_path {
        extracted = extracted.join(sub_path);
    }
    if !extracted.is_dir() {
        let _ = fs::remove_dir_all(&archive_dir);
        return Err(VcsError::MissingSubPath(extracted));
    }
    fs::rename(&extracted, &target)?;
    let _ = fs::remove_dir_all(&archive_dir);
    Ok(())
}

fn checkout_from_git(destination: &Path, spec: &CheckoutSpec) -> Result<(), VcsError> {
    let target = destination.join(&spec.module);

    let mut clone = Command::new("git");
    clone.arg("clone");
    if let Some(branch) = &spec.branch {
        clone.arg("-b").arg(branch);
    }
    clone.arg(&spec.source_url).arg(&target);
    run_command(clone)?;

    // A tag checks out directly; anything else is assumed to be a remote
    // branch.
    let tag_listing = Command::new("git")
        .arg("tag")
        .arg("-l")
        .arg(&spec.version)
        .current_dir(&target)
        .output()?;
    let is_tag = tag_listing.status.success()
        && !String::from_utf8_lossy(&tag_listing.stdout).trim().is_empty();
    let branch_source = if is_tag {
        spec.version.clone()
    } else {
        format!("origin/{}", spec.version)
    };

    let working_branch = format!("DIRACDistribution-{}", std::process::id());
    let mut checkout = Command::new("git");
    checkout
        .arg("checkout")
        .arg("-b")
        .arg(&working_branch)
        .arg(&branch_source)
        .current_dir(&target);
    run_command(checkout)?;

    info!("replacing keywords (can take a while)...");
    replace_keywords_with_git(&target)?;

    let _ = fs::remove_dir_all(target.join(".git"));
    let _ = fs::remove_dir_all(target.join("docs"));
    let _ = fs::remove_dir_all(destination.join("docs"));
    Ok(())
}

const GIT_KEYWORDS: [(&str, &[&str]); 2] = [
    ("$Id$", &["--pretty=%h (%ad) %an <%aE>", "--date=iso"]),
    ("$SHA1$", &["--pretty=%H"]),
];

/// Substitute `$Id$` and `$SHA1$` keywords in `*.py` files with the output
/// of `git log -n 1` for that file. Non-ASCII bytes in the replacement are
/// dropped.
fn replace_keywords_with_git(root: &Path) -> Result<(), VcsError> {
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("py") {
            continue;
        }
        let Ok(mut contents) = fs::read_to_string(path) else {
            continue;
        };
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let Some(parent) = path.parent() else {
            continue;
        };

        let mut changed = false;
        for (keyword, pretty_args) in GIT_KEYWORDS {
            if !contents.contains(keyword) {
                continue;
            }
            let output = Command::new("git")
                .arg("log")
                .arg("-n")
                .arg("1")
                .args(pretty_args)
                .arg(file_name)
                .current_dir(parent)
                .output()?;
            if !output.status.success() {
                warn!(path = %path.display(), keyword, "git log failed, keyword left in place");
                continue;
            }
            let replacement: String = String::from_utf8_lossy(&output.stdout)
                .trim()
                .chars()
                .filter(char::is_ascii)
                .collect();
            contents = contents.replacen(keyword, &replacement, 1);
            changed = true;
        }
        if changed {
            fs::write(path, contents)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_from_str_and_aliases() {
        assert_eq!("git".parse::<VcsKind>().unwrap(), VcsKind::Git);
        assert_eq!("subversion".parse::<VcsKind>().unwrap(), VcsKind::Svn);
        assert_eq!("mercurial".parse::<VcsKind>().unwrap(), VcsKind::Hg);
        assert!("cvs".parse::<VcsKind>().is_err());
    }

    #[test]
    fn test_discover_from_url() {
        assert_eq!(VcsKind::discover("/srv/repo").unwrap(), VcsKind::File);
        assert_eq!(
            VcsKind::discover("ssh://git@example.org/DIRAC.git").unwrap(),
            VcsKind::Git
        );
        assert_eq!(
            VcsKind::discover("svn+ssh://example.org/repo").unwrap(),
            VcsKind::Svn
        );
        assert_eq!(
            VcsKind::discover("hg://example.org/repo").unwrap(),
            VcsKind::Hg
        );
        assert!(VcsKind::discover("https://example.org/repo").is_err());
    }

    #[test]
    fn test_file_checkout_copies_and_filters() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("module.py"), "print()").unwrap();
        fs::write(source.path().join("module.pyc"), "bytecode").unwrap();
        fs::create_dir(source.path().join(".git")).unwrap();
        fs::write(source.path().join(".git/config"), "x").unwrap();
        fs::create_dir(source.path().join("sub")).unwrap();
        fs::write(source.path().join("sub/data.txt"), "data").unwrap();

        let dest = TempDir::new().unwrap();
        let spec = CheckoutSpec {
            module: "DIRAC".to_string(),
            source_url: source.path().to_string_lossy().into_owned(),
            version: "v1r0".to_string(),
            branch: None,
            sub_path: None,
        };
        checkout(VcsKind::File, dest.path(), &spec).unwrap();

        let root = dest.path().join("DIRAC");
        assert!(root.join("module.py").is_file());
        assert!(root.join("sub/data.txt").is_file());
        assert!(!root.join("module.pyc").exists());
        assert!(!root.join(".git").exists());
    }

    #[test]
    fn test_file_checkout_strips_file_scheme() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("a.txt"), "a").unwrap();
        let dest = TempDir::new().unwrap();
        let spec = CheckoutSpec {
            module: "Mod".to_string(),
            source_url: format!("file://{}", source.path().display()),
            version: "v1r0".to_string(),
            branch: None,
            sub_path: None,
        };
        checkout(VcsKind::File, dest.path(), &spec).unwrap();
        assert!(dest.path().join("Mod/a.txt").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_checkout_preserves_symlinks() {
        let source = TempDir::new().unwrap();
        fs::write(source.path().join("target.txt"), "t").unwrap();
        std::os::unix::fs::symlink("target.txt", source.path().join("link.txt")).unwrap();

        let dest = TempDir::new().unwrap();
        let spec = CheckoutSpec {
            module: "Mod".to_string(),
            source_url: source.path().to_string_lossy().into_owned(),
            version: "v1r0".to_string(),
            branch: None,
            sub_path: None,
        };
        checkout(VcsKind::File, dest.path(), &spec).unwrap();

        let link = dest.path().join("Mod/link.txt");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
    }
}
