//! Hierarchical configuration documents and the cascade resolver
//!
//! The `web.cfg` files shipped by each module are parsed into ordered
//! section trees, merged in module order with section-level
//! `AbsoluteDefinition` overrides, and reduced to the flat dependency
//! mapping consumed by the web compiler.

mod cascade;
mod document;
mod parser;

pub use cascade::{
    merge_web_configs, resolve_dependencies, ABSOLUTE_DEFINITION, DEPENDENCY_SECTION, WEB_ROOT,
};
pub use document::{CfgDoc, CfgEntry, CfgSection};

use thiserror::Error;

/// Errors for configuration documents
#[derive(Debug, Error)]
pub enum CfgError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("option and section collide at '{path}'")]
    MergeInconsistency { path: String },
}
