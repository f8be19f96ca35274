//! Release notes pipeline
//!
//! Parses the `release.notes` format into structured data, generates the
//! reStructuredText files shipped inside the tarball (`releasenotes.rst`
//! for the released version, `releasehistory.rst` for the full history),
//! and renders the same structure to HTML.
//!
//! Format: `[version]` headers open a version block; `* Title` lines open
//! a feature; `BUGFIX:`/`CHANGE:`/`NEW:`-style prefixes categorize entries
//! and bare lines continue the previous entry; lines before the first `*`
//! are version comments.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::version::ReleaseVersion;

/// Errors for the release notes pipeline
#[derive(Debug, Error)]
pub enum NotesError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("defined release notes {} do not exist", .0.display())]
    MissingNotes(PathBuf),
}

/// Category of a change entry. Several raw keys collapse onto these:
/// BUG/FIX/BUGFIX -> Bugfix, NEW/FEATURE -> Feature, CHANGE -> Change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeKind {
    Bugfix,
    Change,
    Feature,
}

impl ChangeKind {
    fn from_raw(raw: &str) -> ChangeKind {
        match raw {
            "BUGFIX" | "BUG" | "FIX" => ChangeKind::Bugfix,
            "CHANGE" => ChangeKind::Change,
            _ => ChangeKind::Feature,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Bugfix => "Bugfix",
            ChangeKind::Change => "Change",
            ChangeKind::Feature => "Feature",
        })
    }
}

/// One `* Title` block inside a version.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feature {
    pub title: String,
    pub entries: BTreeMap<ChangeKind, Vec<String>>,
}

/// One `[version]` block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionNotes {
    pub version: String,
    pub comment: Vec<String>,
    pub features: Vec<Feature>,
}

/// The parsed `release.notes` contents, newest version first (file order).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReleaseNotes {
    pub versions: Vec<VersionNotes>,
}

/// Raw entry keys recognized at the start of a line, with or without a
/// trailing colon.
const ENTRY_KEYS: [&str; 6] = ["BUGFIX", "BUG", "FIX", "CHANGE", "NEW", "FEATURE"];

fn strip_entry_key(line: &str) -> Option<(ChangeKind, String)> {
    for key in ENTRY_KEYS {
        let rest = line
            .strip_prefix(key)
            .and_then(|r| r.strip_prefix(':').or_else(|| r.strip_prefix(' ')));
        if let Some(rest) = rest {
            return Some((ChangeKind::from_raw(key), rest.trim().to_string()));
        }
    }
    None
}

impl ReleaseNotes {
    /// Parse the `release.notes` text format.
    pub fn parse(text: &str) -> ReleaseNotes {
        let mut notes = ReleaseNotes::default();
        // Kind of the last categorized entry, for continuation lines.
        let mut last_kind: Option<ChangeKind> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let version = line[1..line.len() - 1].trim().to_string();
                notes.versions.push(VersionNotes {
                    version,
                    ..VersionNotes::default()
                });
                last_kind = None;
                continue;
            }

            let Some(current) = notes.versions.last_mut() else {
                warn!(line, "release notes line before any version header, ignored");
                continue;
            };

            if let Some(title) = line.strip_prefix('*') {
                current.features.push(Feature {
                    title: title.trim().to_string(),
                    entries: BTreeMap::new(),
                });
                last_kind = None;
                continue;
            }

            let Some(feature) = current.features.last_mut() else {
                current.comment.push(raw_line.to_string());
                continue;
            };

            if let Some((kind, entry)) = strip_entry_key(line) {
                feature.entries.entry(kind).or_default().push(entry);
                last_kind = Some(kind);
            } else if let Some(kind) = last_kind {
                if let Some(last_entry) =
                    feature.entries.get_mut(&kind).and_then(|v| v.last_mut())
                {
                    last_entry.push(' ');
                    last_entry.push_str(line);
                }
            }
        }
        notes
    }

    /// The version blocks to publish for `pkg_version`: just that version
    /// when `single`, otherwise every parsable version up to it.
    fn selected(&self, pkg_version: &str, single: bool) -> Vec<&VersionNotes> {
        let pkg_parsed = ReleaseVersion::parse(pkg_version).unwrap_or_default();
        self.versions
            .iter()
            .filter(|v| {
                if single && v.version != pkg_version {
                    return false;
                }
                match ReleaseVersion::parse(&v.version) {
                    Some(parsed) => parsed <= pkg_parsed,
                    None => {
                        warn!(version = %v.version, "unparsable version in release notes, skipped");
                        false
                    }
                }
            })
            .collect()
    }

    /// Render the selected versions as reStructuredText.
    pub fn to_rst(&self, pkg_version: &str, single: bool) -> String {
        let mut out: Vec<String> = Vec::new();
        for version in self.selected(pkg_version, single) {
            let heading = format!("Version {}", version.version);
            out.push(String::new());
            out.push("=".repeat(heading.len()));
            out.push(heading.clone());
            out.push("=".repeat(heading.len()));
            out.push(String::new());
            if !version.comment.is_empty() {
                out.push(version.comment.join("\n"));
                out.push(String::new());
            }
            for feature in &version.features {
                if feature.entries.is_empty() {
                    continue;
                }
                out.push(feature.title.clone());
                out.push("=".repeat(feature.title.len()));
                out.push(String::new());
                for (kind, entries) in &feature.entries {
                    let label = kind.to_string();
                    out.push(label.clone());
                    out.push(":".repeat(label.len() + 5));
                    out.push(String::new());
                    for entry in entries {
                        out.push(format!(" - {entry}"));
                    }
                    out.push(String::new());
                }
            }
        }
        out.join("\n")
    }

    /// Render the selected versions as a standalone HTML document.
    pub fn to_html(&self, pkg_version: &str, single: bool, title: &str) -> String {
        let mut body = String::new();
        for version in self.selected(pkg_version, single) {
            body.push_str(&format!(
                "<h1>Version {}</h1>\n",
                escape_html(&version.version)
            ));
            for line in &version.comment {
                body.push_str(&format!("<p>{}</p>\n", escape_html(line.trim())));
            }
            for feature in &version.features {
                if feature.entries.is_empty() {
                    continue;
                }
                body.push_str(&format!("<h2>{}</h2>\n", escape_html(&feature.title)));
                for (kind, entries) in &feature.entries {
                    body.push_str(&format!("<h3>{kind}</h3>\n<ul>\n"));
                    for entry in entries {
                        body.push_str(&format!("<li>{}</li>\n", escape_html(entry)));
                    }
                    body.push_str("</ul>\n");
                }
            }
        }
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n\
             <title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
            escape_html(title),
            body
        )
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// The two generated documents: the released version's notes and the full
/// history.
const OUTPUTS: [(&str, bool); 2] = [("releasenotes", true), ("releasehistory", false)];

/// Run the whole pipeline for a checked-out module.
///
/// Reads `release.notes` (or `notes_path` when given), writes
/// `releasenotes.rst`/`releasehistory.rst` and their `.html` renditions
/// into the module directory, and with `copy_outside` leaves an extra
/// `<base>.<name>.<version>.html` copy next to the tarball.
pub fn generate_release_notes(
    destination: &Path,
    name: &str,
    version: &str,
    notes_path: Option<&Path>,
    copy_outside: bool,
) -> Result<(), NotesError> {
    let module_dir = destination.join(name);
    let source = match notes_path {
        Some(path) => {
            if !path.is_file() {
                return Err(NotesError::MissingNotes(path.to_path_buf()));
            }
            path.to_path_buf()
        }
        None => {
            let default = module_dir.join("release.notes");
            if !default.is_file() {
                warn!("no release.notes file found");
                return Ok(());
            }
            default
        }
    };

    let notes = ReleaseNotes::parse(&fs::read_to_string(&source)?);
    info!(path = %source.display(), "loaded release notes");

    for (base, single) in OUTPUTS {
        let rst = notes.to_rst(version, single);
        fs::write(module_dir.join(format!("{base}.rst")), rst)?;

        let html = notes.to_html(version, single, &format!("{name} {version}"));
        fs::write(module_dir.join(format!("{base}.html")), &html)?;
        if copy_outside {
            info!("leaving a copy of the release notes outside the tarball");
            fs::write(
                destination.join(format!("{base}.{name}.{version}.html")),
                &html,
            )?;
        }
        info!(document = base, "compiled release notes");
    }
    Ok(())
}
