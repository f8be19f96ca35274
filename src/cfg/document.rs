//! Hierarchical configuration documents
//!
//! A `CfgDoc` is an ordered tree of named sections. Each section holds
//! key -> string options and child sections. Keys are unique within a
//! section and sections are unique by name within their parent, so a
//! slash-delimited path like `WebApp/Dependencies` addresses at most one
//! node.

use indexmap::IndexMap;
use std::fmt;
use std::fs;
use std::path::Path;

use super::parser::parse_document;
use super::CfgError;

/// A node in a configuration section: either a leaf option or a subsection.
#[derive(Debug, Clone, PartialEq)]
pub enum CfgEntry {
    Option(String),
    Section(CfgSection),
}

/// An ordered collection of options and child sections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CfgSection {
    entries: IndexMap<String, CfgEntry>,
}

impl CfgSection {
    /// Set an option, replacing any previous entry under the same name.
    pub fn set_option(&mut self, name: &str, value: &str) {
        self.entries
            .insert(name.to_string(), CfgEntry::Option(value.to_string()));
    }

    /// Get a mutable reference to a child section, creating it if absent.
    ///
    /// Returns `None` if the name is already taken by an option.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut CfgSection> {
        let entry = self
            .entries
            .entry(name.to_string())
            .or_insert_with(|| CfgEntry::Section(CfgSection::default()));
        match entry {
            CfgEntry::Section(sec) => Some(sec),
            CfgEntry::Option(_) => None,
        }
    }

    /// Names of the child sections, in definition order.
    pub fn section_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| match entry {
                CfgEntry::Section(_) => Some(name.clone()),
                CfgEntry::Option(_) => None,
            })
            .collect()
    }

    /// Option name/value pairs, in definition order.
    pub fn options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            CfgEntry::Option(value) => Some((name.as_str(), value.as_str())),
            CfgEntry::Section(_) => None,
        })
    }

    pub fn get(&self, name: &str) -> Option<&CfgEntry> {
        self.entries.get(name)
    }

    /// Attach a fully-built child section. Fails if the name is already
    /// taken by an option or another section.
    pub(super) fn attach_section(&mut self, name: String, section: CfgSection) -> bool {
        if self.entries.contains_key(&name) {
            return false;
        }
        self.entries.insert(name, CfgEntry::Section(section));
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn merge_from(&mut self, other: CfgSection, path: &mut Vec<String>) -> Result<(), CfgError> {
        for (name, entry) in other.entries {
            match self.entries.get_mut(&name) {
                None => {
                    self.entries.insert(name, entry);
                }
                Some(existing) => match (existing, entry) {
                    (CfgEntry::Option(old), CfgEntry::Option(new)) => *old = new,
                    (CfgEntry::Section(old), CfgEntry::Section(new)) => {
                        path.push(name);
                        old.merge_from(new, path)?;
                        path.pop();
                    }
                    _ => {
                        path.push(name);
                        return Err(CfgError::MergeInconsistency {
                            path: path.join("/"),
                        });
                    }
                },
            }
        }
        Ok(())
    }

    fn write_text(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        for (name, entry) in &self.entries {
            match entry {
                CfgEntry::Option(value) => {
                    out.push_str(&format!("{pad}{name} = {value}\n"));
                }
                CfgEntry::Section(section) => {
                    out.push_str(&format!("{pad}{name}\n{pad}{{\n"));
                    section.write_text(out, indent + 1);
                    out.push_str(&format!("{pad}}}\n"));
                }
            }
        }
    }
}

/// A complete configuration document rooted at an anonymous section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CfgDoc {
    root: CfgSection,
}

/// Split a slash-delimited path into components, ignoring empty segments so
/// that `/WebApp/Dependencies` and `WebApp/Dependencies` are equivalent.
fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|p| !p.is_empty()).collect()
}

impl CfgDoc {
    /// Parse a document from its text form.
    pub fn parse(text: &str) -> Result<Self, CfgError> {
        parse_document(text).map(|root| CfgDoc { root })
    }

    /// Load and parse a document from a file.
    pub fn load(path: &Path) -> Result<Self, CfgError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn root(&self) -> &CfgSection {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut CfgSection {
        &mut self.root
    }

    fn lookup(&self, path: &str) -> Option<&CfgEntry> {
        let mut parts = split_path(path).into_iter();
        let first = parts.next()?;
        let mut entry = self.root.get(first)?;
        for part in parts {
            match entry {
                CfgEntry::Section(section) => entry = section.get(part)?,
                CfgEntry::Option(_) => return None,
            }
        }
        Some(entry)
    }

    /// Get an option value by path. Returns `None` if the path is absent or
    /// addresses a section.
    pub fn get_option(&self, path: &str) -> Option<&str> {
        match self.lookup(path)? {
            CfgEntry::Option(value) => Some(value.as_str()),
            CfgEntry::Section(_) => None,
        }
    }

    /// Truthy reading of an option: `true`, `yes`, `y` or `1`
    /// (case-insensitive). Absent options and sections read as `false`.
    pub fn get_bool(&self, path: &str) -> bool {
        self.get_option(path)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "y" | "1"))
            .unwrap_or(false)
    }

    pub fn is_section(&self, path: &str) -> bool {
        matches!(self.lookup(path), Some(CfgEntry::Section(_)))
    }

    /// The section at `path`, or `None` if absent or an option.
    pub fn section(&self, path: &str) -> Option<&CfgSection> {
        match self.lookup(path)? {
            CfgEntry::Section(section) => Some(section),
            CfgEntry::Option(_) => None,
        }
    }

    /// Names of the child sections under `path` (empty if the path is not a
    /// section).
    pub fn list_sections(&self, path: &str) -> Vec<String> {
        self.section(path)
            .map(|s| s.section_names())
            .unwrap_or_default()
    }

    /// Delete the option or section subtree at `path`.
    ///
    /// Returns `true` if something was removed; an absent path is a no-op.
    pub fn delete(&mut self, path: &str) -> bool {
        let parts = split_path(path);
        let Some((last, ancestors)) = parts.split_last() else {
            return false;
        };
        let mut section = &mut self.root;
        for part in ancestors {
            match section.entries.get_mut(*part) {
                Some(CfgEntry::Section(child)) => section = child,
                _ => return false,
            }
        }
        section.entries.shift_remove(*last).is_some()
    }

    /// Merge `other` into this document.
    ///
    /// Overlapping options take `other`'s value; overlapping sections merge
    /// recursively; new entries are appended in `other`'s order. An option
    /// colliding with a section is a structural inconsistency and aborts
    /// the merge.
    pub fn merge_from(&mut self, other: CfgDoc) -> Result<(), CfgError> {
        let mut path = Vec::new();
        self.root.merge_from(other.root, &mut path)
    }

    /// Whether the document has any content at all.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

impl fmt::Display for CfgDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.root.write_text(&mut out, 0);
        f.write_str(&out)
    }
}
