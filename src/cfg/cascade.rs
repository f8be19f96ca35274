//! Configuration cascade resolver
//!
//! Merges each module's `WebApp/web.cfg` into a single document, in module
//! order, honoring section-level `AbsoluteDefinition` overrides: a section
//! carrying a truthy marker fully replaces any earlier definition at the
//! same path instead of merging into it. The merged document's
//! `/WebApp/Dependencies` options form the flat dependency mapping the web
//! compiler uses to resolve one application's upstream classpath.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tracing::{error, info};

use super::{CfgDoc, CfgError};

/// Root of the override scan.
pub const WEB_ROOT: &str = "WebApp";

/// Path of the dependency section within the merged document.
pub const DEPENDENCY_SECTION: &str = "WebApp/Dependencies";

/// Option marking a section as fully replacing prior definitions.
pub const ABSOLUTE_DEFINITION: &str = "AbsoluteDefinition";

/// Merge the `web.cfg` documents of `modules` (in order) found under
/// `destination/<module>/WebApp/web.cfg`.
///
/// Missing files and parse failures skip the module with a diagnostic; only
/// a structurally inconsistent merge is an error.
pub fn merge_web_configs(destination: &Path, modules: &[String]) -> Result<CfgDoc, CfgError> {
    let mut accumulator = CfgDoc::default();
    for module in modules {
        let cfg_path = destination.join(module).join("WebApp").join("web.cfg");
        if !cfg_path.is_file() {
            info!(path = %cfg_path.display(), "web configuration file does not exist, skipping");
            continue;
        }
        let mut candidate = match CfgDoc::load(&cfg_path) {
            Ok(doc) => doc,
            Err(e) => {
                error!(path = %cfg_path.display(), error = %e, "could not load web configuration");
                continue;
            }
        };
        info!(path = %cfg_path.display(), "loaded web configuration");
        apply_absolute_definitions(&mut accumulator, &mut candidate, module);
        accumulator.merge_from(candidate)?;
    }
    Ok(accumulator)
}

/// Breadth-first scan of `candidate` from the `/WebApp` root. A section with
/// a truthy `AbsoluteDefinition` marker deletes the accumulator's subtree at
/// that path, loses the marker, and is not descended into; any other
/// section has its children enqueued.
fn apply_absolute_definitions(accumulator: &mut CfgDoc, candidate: &mut CfgDoc, module: &str) {
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(WEB_ROOT.to_string());
    while let Some(current) = queue.pop_front() {
        if !candidate.is_section(&current) {
            continue;
        }
        let marker = format!("{current}/{ABSOLUTE_DEFINITION}");
        if candidate.get_bool(&marker) {
            info!(module, section = %current, "section is an absolute definition");
            accumulator.delete(&current);
            candidate.delete(&marker);
        } else {
            for child in candidate.list_sections(&current) {
                queue.push_back(format!("{current}/{child}"));
            }
        }
    }
}

/// Resolve the flat dependency mapping for an ordered module sequence.
///
/// Keys are `"<extension>.<application>"`, values the dotted reference of
/// the upstream application. An absent dependency section yields an empty
/// mapping.
pub fn resolve_dependencies(
    destination: &Path,
    modules: &[String],
) -> Result<HashMap<String, String>, CfgError> {
    let merged = merge_web_configs(destination, modules)?;
    let mapping = match merged.section(DEPENDENCY_SECTION) {
        Some(section) => section
            .options()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        None => HashMap::new(),
    };
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_web_cfg(root: &Path, module: &str, contents: &str) {
        let dir = root.join(module).join("WebApp");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("web.cfg"), contents).unwrap();
    }

    #[test]
    fn test_single_module_mapping() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(
            dir.path(),
            "WebAppDIRAC",
            "WebApp\n{\n  Dependencies\n  {\n    Acct = DIRAC.Accounting\n  }\n}\n",
        );
        let mapping =
            resolve_dependencies(dir.path(), &["WebAppDIRAC".to_string()]).unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["Acct"], "DIRAC.Accounting");
    }

    #[test]
    fn test_absolute_definition_replaces_subtree() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(
            dir.path(),
            "WebAppDIRAC",
            "WebApp\n{\n  Dependencies\n  {\n    Acct = DIRAC.Accounting\n  }\n}\n",
        );
        write_web_cfg(
            dir.path(),
            "LHCbWebDIRAC",
            "WebApp\n{\n  Dependencies\n  {\n    AbsoluteDefinition = True\n    Acct2 = DIRAC.Other\n  }\n}\n",
        );
        let mapping = resolve_dependencies(
            dir.path(),
            &["WebAppDIRAC".to_string(), "LHCbWebDIRAC".to_string()],
        )
        .unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["Acct2"], "DIRAC.Other");
        assert!(!mapping.contains_key("Acct"));
    }

    #[test]
    fn test_marker_not_persisted_in_merged_document() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(
            dir.path(),
            "Ext",
            "WebApp\n{\n  Dependencies\n  {\n    AbsoluteDefinition = yes\n    A = X.Y\n  }\n}\n",
        );
        let merged = merge_web_configs(dir.path(), &["Ext".to_string()]).unwrap();
        assert!(merged
            .get_option("WebApp/Dependencies/AbsoluteDefinition")
            .is_none());
        assert_eq!(merged.get_option("WebApp/Dependencies/A"), Some("X.Y"));
    }

    #[test]
    fn test_disjoint_keys_union() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(
            dir.path(),
            "WebAppDIRAC",
            "WebApp\n{\n  Dependencies\n  {\n    A = DIRAC.A\n  }\n}\n",
        );
        write_web_cfg(
            dir.path(),
            "Ext",
            "WebApp\n{\n  Dependencies\n  {\n    B = Ext.B\n  }\n}\n",
        );
        let mapping = resolve_dependencies(
            dir.path(),
            &["WebAppDIRAC".to_string(), "Ext".to_string()],
        )
        .unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping["A"], "DIRAC.A");
        assert_eq!(mapping["B"], "Ext.B");
    }

    #[test]
    fn test_missing_module_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(
            dir.path(),
            "WebAppDIRAC",
            "WebApp\n{\n  Dependencies\n  {\n    A = DIRAC.A\n  }\n}\n",
        );
        let with_missing = resolve_dependencies(
            dir.path(),
            &["WebAppDIRAC".to_string(), "NoSuchModule".to_string()],
        )
        .unwrap();
        let alone =
            resolve_dependencies(dir.path(), &["WebAppDIRAC".to_string()]).unwrap();
        assert_eq!(with_missing, alone);
    }

    #[test]
    fn test_parse_failure_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(
            dir.path(),
            "WebAppDIRAC",
            "WebApp\n{\n  Dependencies\n  {\n    A = DIRAC.A\n  }\n}\n",
        );
        write_web_cfg(dir.path(), "Broken", "WebApp\n{\n  oops\n");
        let mapping = resolve_dependencies(
            dir.path(),
            &["WebAppDIRAC".to_string(), "Broken".to_string()],
        )
        .unwrap();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["A"], "DIRAC.A");
    }

    #[test]
    fn test_no_dependency_section_yields_empty_mapping() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(dir.path(), "WebAppDIRAC", "WebApp\n{\n  Theme = crisp\n}\n");
        let mapping =
            resolve_dependencies(dir.path(), &["WebAppDIRAC".to_string()]).unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn test_override_deletes_deeper_children_of_base() {
        let dir = TempDir::new().unwrap();
        write_web_cfg(
            dir.path(),
            "Base",
            "WebApp\n{\n  Dependencies\n  {\n    Deep\n    {\n      k = v\n    }\n    A = X\n  }\n}\n",
        );
        write_web_cfg(
            dir.path(),
            "Ext",
            "WebApp\n{\n  Dependencies\n  {\n    AbsoluteDefinition = 1\n    B = Y\n  }\n}\n",
        );
        let merged =
            merge_web_configs(dir.path(), &["Base".to_string(), "Ext".to_string()])
                .unwrap();
        assert!(!merged.is_section("WebApp/Dependencies/Deep"));
        assert!(merged.get_option("WebApp/Dependencies/A").is_none());
        assert_eq!(merged.get_option("WebApp/Dependencies/B"), Some("Y"));
    }
}
