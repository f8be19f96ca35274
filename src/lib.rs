//! DIRAC Distribution - release tarball and web portal tooling
//!
//! This crate implements the distribution tooling for DIRAC modules:
//! checking out tagged sources from a VCS, rendering release notes,
//! compiling the ExtJS web portal, and packing versioned tarballs with
//! checksum sidecars.

pub mod archive;
pub mod cfg;
pub mod notes;
pub mod release;
pub mod vcs;
pub mod version;
pub mod webapp;

pub use cfg::{CfgDoc, CfgError};
pub use release::{ReleaseBuilder, ReleaseError};
pub use vcs::{CheckoutSpec, VcsKind};
pub use version::ReleaseVersion;
pub use webapp::WebAppCompiler;
