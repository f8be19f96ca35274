//! Release version strings
//!
//! DIRAC releases are tagged `vNrNpN`, with an optional `-preN` suffix for
//! pre-releases. Missing components read as zero, so versions compare as
//! plain 4-tuples.

use regex_lite::Regex;
use std::fs;
use std::io;
use std::path::Path;

/// A parsed `vNrNpN-preN` version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub pre: u32,
}

impl ReleaseVersion {
    /// Parse a version string. Returns `None` when the string does not
    /// start with a `vN...` version.
    pub fn parse(version: &str) -> Option<Self> {
        let re = Regex::new(r"^v([0-9]+)(?:r([0-9]+))?(?:p([0-9]+))?(?:-pre([0-9]+))?")
            .unwrap_or_else(|_| unreachable!());
        let caps = re.captures(version.trim())?;
        let num = |i: usize| {
            caps.get(i)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .unwrap_or(0)
        };
        Some(ReleaseVersion {
            major: num(1),
            minor: num(2),
            patch: num(3),
            pre: num(4),
        })
    }
}

const VERSION_FIELDS: [(&str, fn(&ReleaseVersion) -> u32); 4] = [
    ("majorVersion", |v| v.major),
    ("minorVersion", |v| v.minor),
    ("patchLevel", |v| v.patch),
    ("preVersion", |v| v.pre),
];

/// Rewrite the version assignments in the packaged module's `__init__.py`.
///
/// The distribution ships Python source whose metadata lines look like
/// `majorVersion = 6`. A missing file or an unparsable version is a no-op.
pub fn write_version_to_init(root: &Path, version: &str) -> io::Result<()> {
    let Some(parsed) = ReleaseVersion::parse(version) else {
        return Ok(());
    };
    let init_file = root.join("__init__.py");
    if !init_file.is_file() {
        return Ok(());
    }
    let contents = fs::read_to_string(&init_file)?;

    let rules: Vec<(Regex, String)> = VERSION_FIELDS
        .iter()
        .map(|(name, get)| {
            let re = Regex::new(&format!(r"^({name}\s*=)\s*[0-9]+\s*"))
                .unwrap_or_else(|_| unreachable!());
            (re, format!("{name} = {}", get(&parsed)))
        })
        .collect();

    let rewritten: Vec<String> = contents
        .split('\n')
        .map(|line| {
            let mut line = line.to_string();
            for (re, replacement) in &rules {
                line = re.replace(&line, replacement.as_str()).into_owned();
            }
            line
        })
        .collect();

    fs::write(&init_file, rewritten.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_version() {
        let v = ReleaseVersion::parse("v6r20p14").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.pre), (6, 20, 14, 0));
    }

    #[test]
    fn test_parse_partial_versions() {
        assert_eq!(ReleaseVersion::parse("v7").unwrap().major, 7);
        let v = ReleaseVersion::parse("v7r1-pre3").unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.pre), (7, 1, 0, 3));
    }

    #[test]
    fn test_parse_rejects_non_versions() {
        assert!(ReleaseVersion::parse("integration").is_none());
        assert!(ReleaseVersion::parse("master").is_none());
        assert!(ReleaseVersion::parse("6r20").is_none());
    }

    #[test]
    fn test_version_ordering() {
        let a = ReleaseVersion::parse("v6r20p1").unwrap();
        let b = ReleaseVersion::parse("v6r21").unwrap();
        assert!(a < b);
        assert!(ReleaseVersion::parse("v7").unwrap() > b);
    }

    #[test]
    fn test_write_version_to_init() {
        let dir = TempDir::new().unwrap();
        let init = dir.path().join("__init__.py");
        std::fs::write(
            &init,
            "majorVersion = 0\nminorVersion = 0\npatchLevel = 0\npreVersion = 0\nother = 1\n",
        )
        .unwrap();

        write_version_to_init(dir.path(), "v6r20p14").unwrap();

        let contents = std::fs::read_to_string(&init).unwrap();
        assert!(contents.contains("majorVersion = 6"));
        assert!(contents.contains("minorVersion = 20"));
        assert!(contents.contains("patchLevel = 14"));
        assert!(contents.contains("preVersion = 0"));
        assert!(contents.contains("other = 1"));
    }

    #[test]
    fn test_write_version_missing_init_is_noop() {
        let dir = TempDir::new().unwrap();
        write_version_to_init(dir.path(), "v6r20").unwrap();
        assert!(!dir.path().join("__init__.py").exists());
    }

    #[test]
    fn test_write_version_unparsable_is_noop() {
        let dir = TempDir::new().unwrap();
        let init = dir.path().join("__init__.py");
        std::fs::write(&init, "majorVersion = 3\n").unwrap();
        write_version_to_init(dir.path(), "integration").unwrap();
        let contents = std::fs::read_to_string(&init).unwrap();
        assert!(contents.contains("majorVersion = 3"));
    }
}
