//! Release tarball assembly
//!
//! End-to-end pipeline for one module release: check out the tagged
//! sources, render the release notes, optionally compile the web portal,
//! stamp the version into the package metadata and pack everything into a
//! `<name>-<version>.tar.gz` with its checksum sidecar.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::archive::{self, ArchiveError};
use crate::notes::{self, NotesError};
use crate::vcs::{self, CheckoutSpec, VcsError, VcsKind};
use crate::version;
use crate::webapp::{WebAppCompiler, WebAppError};

/// Errors for the release pipeline
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("checkout failed: {0}")]
    Vcs(#[from] VcsError),

    #[error("release notes failed: {0}")]
    Notes(#[from] NotesError),

    #[error("web compilation failed: {0}")]
    WebApp(#[from] WebAppError),

    #[error("packing failed: {0}")]
    Archive(#[from] ArchiveError),
}

/// Versions that name a moving branch rather than a tagged release.
/// They get no release notes.
const BRANCH_VERSIONS: [&str; 2] = ["integration", "master"];

/// Builds one release tarball.
///
/// The mandatory ingredients are the module name, the version tag and the
/// repository URL; everything else has a sensible default.
pub struct ReleaseBuilder {
    name: String,
    version: String,
    source_url: String,
    destination: Option<PathBuf>,
    vcs: Option<VcsKind>,
    branch: Option<String>,
    sub_path: Option<String>,
    notes_path: Option<PathBuf>,
    copy_notes_outside: bool,
    extension_version: Option<String>,
    extension_source: Option<String>,
    extjs_path: Option<PathBuf>,
}

impl ReleaseBuilder {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        ReleaseBuilder {
            name: name.into(),
            version: version.into(),
            source_url: source_url.into(),
            destination: None,
            vcs: None,
            branch: None,
            sub_path: None,
            notes_path: None,
            copy_notes_outside: false,
            extension_version: None,
            extension_source: None,
            extjs_path: None,
        }
    }

    /// Where to assemble and leave the tarball. A fresh temporary
    /// directory is used when unset.
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Force a VCS instead of autodiscovering it from the source URL.
    pub fn with_vcs(mut self, vcs: VcsKind) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Subdirectory of the repository to extract.
    pub fn with_sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.sub_path = Some(sub_path.into());
        self
    }

    /// Explicit release notes file; defaults to the module's
    /// `release.notes`.
    pub fn with_notes_path(mut self, notes_path: impl Into<PathBuf>) -> Self {
        self.notes_path = Some(notes_path.into());
        self
    }

    /// Leave a copy of the rendered notes next to the tarball.
    pub fn with_notes_outside(mut self, copy: bool) -> Self {
        self.copy_notes_outside = copy;
        self
    }

    /// Version of the base web module to check out alongside a web
    /// extension.
    pub fn with_extension_version(mut self, version: impl Into<String>) -> Self {
        self.extension_version = Some(version.into());
        self
    }

    /// Repository of the base web module.
    pub fn with_extension_source(mut self, source: impl Into<String>) -> Self {
        self.extension_source = Some(source.into());
        self
    }

    /// Location of the ExtJS SDK for web compilation.
    pub fn with_extjs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.extjs_path = Some(path.into());
        self
    }

    /// Run the pipeline. Returns the path of the created tarball.
    pub fn run(&self) -> Result<PathBuf, ReleaseError> {
        let destination = match &self.destination {
            Some(path) => {
                fs::create_dir_all(path)?;
                path.clone()
            }
            None => tempfile::Builder::new()
                .suffix("DIRACTarball")
                .tempdir()?
                .keep(),
        };
        info!(destination = %destination.display(), "will generate tarball");

        let kind = self.resolve_vcs(&self.source_url)?;
        let spec = CheckoutSpec {
            module: self.name.clone(),
            source_url: self.source_url.clone(),
            version: self.version.clone(),
            branch: self.branch.clone(),
            sub_path: self.sub_path.clone(),
        };
        vcs::checkout(kind, &destination, &spec)?;
        let _ = fs::remove_dir_all(destination.join("docs"));

        if !BRANCH_VERSIONS.contains(&self.version.as_str()) {
            notes::generate_release_notes(
                &destination,
                &self.name,
                &self.version,
                self.notes_path.as_deref(),
                self.copy_notes_outside,
            )?;
        }

        if self.name.contains("Web") && self.name != "Web" {
            self.compile_web_portal(&destination)?;
        }

        self.pack(&destination)
    }

    fn resolve_vcs(&self, source_url: &str) -> Result<VcsKind, VcsError> {
        match self.vcs {
            Some(kind) => Ok(kind),
            None => {
                let kind = VcsKind::discover(source_url)?;
                info!(vcs = %kind, "autodiscovered VCS");
                Ok(kind)
            }
        }
    }

    /// Web extensions need the base module's sources to compile against.
    fn compile_web_portal(&self, destination: &Path) -> Result<(), ReleaseError> {
        if let (Some(ext_version), Some(ext_source)) =
            (&self.extension_version, &self.extension_source)
        {
            let kind = self.resolve_vcs(ext_source)?;
            let spec = CheckoutSpec {
                module: "WebAppDIRAC".to_string(),
                source_url: ext_source.clone(),
                version: ext_version.clone(),
                branch: self.branch.clone(),
                sub_path: None,
            };
            vcs::checkout(kind, destination, &spec)?;
        }
        let mut compiler = WebAppCompiler::new(&self.name, destination);
        if let Some(extjs_path) = &self.extjs_path {
            compiler = compiler.with_extjs_path(extjs_path);
        }
        compiler.run()?;
        Ok(())
    }

    /// Stamp the version, pack the module tree and remove the packed
    /// sources, leaving only the tarball and its checksum.
    fn pack(&self, destination: &Path) -> Result<PathBuf, ReleaseError> {
        let tar_name = format!("{}-{}.tar.gz", self.name, self.version);
        let tarball_path = destination.join(&tar_name);

        let mut dir_to_tar = destination.join(&self.name);
        // Some repositories nest the package under a same-named directory.
        if dir_to_tar.join(&self.name).is_dir() {
            dir_to_tar = dir_to_tar.join(&self.name);
        }

        version::write_version_to_init(&dir_to_tar, &self.version)?;
        archive::create_tarball(&tarball_path, &dir_to_tar)?;
        fs::remove_dir_all(&dir_to_tar)?;
        info!(tarball = %tar_name, "tar file created");
        Ok(tarball_path)
    }
}
