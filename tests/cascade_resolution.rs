//! Configuration cascade integration tests
//!
//! Exercise the full web.cfg cascade through the public API: on-disk
//! module layouts, absolute-definition overrides and the flat dependency
//! mapping handed to the web compiler.

use dirac_distribution::cfg::{merge_web_configs, resolve_dependencies};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_web_cfg(root: &Path, module: &str, contents: &str) {
    let dir = root.join(module).join("WebApp");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("web.cfg"), contents).unwrap();
}

const BASE_CFG: &str = "\
WebApp
{
  Theme
  {
    Name = crisp
    Variant = classic
  }
  Dependencies
  {
    Accounting = DIRAC.Accounting
    Monitoring = DIRAC.Monitoring
  }
}
";

const EXTENSION_CFG: &str = "\
WebApp
{
  Theme
  {
    AbsoluteDefinition = True
    Name = triton
  }
  Dependencies
  {
    MyAccounting = DIRAC.Accounting
  }
}
";

#[test]
fn test_extension_dependencies_extend_base() {
    let dir = TempDir::new().unwrap();
    write_web_cfg(dir.path(), "WebAppDIRAC", BASE_CFG);
    write_web_cfg(dir.path(), "LHCbWebDIRAC", EXTENSION_CFG);

    let mapping = resolve_dependencies(
        dir.path(),
        &["WebAppDIRAC".to_string(), "LHCbWebDIRAC".to_string()],
    )
    .unwrap();

    assert_eq!(mapping.len(), 3);
    assert_eq!(mapping["Accounting"], "DIRAC.Accounting");
    assert_eq!(mapping["Monitoring"], "DIRAC.Monitoring");
    assert_eq!(mapping["MyAccounting"], "DIRAC.Accounting");
}

#[test]
fn test_absolute_definition_replaces_whole_section() {
    let dir = TempDir::new().unwrap();
    write_web_cfg(dir.path(), "WebAppDIRAC", BASE_CFG);
    write_web_cfg(dir.path(), "LHCbWebDIRAC", EXTENSION_CFG);

    let merged = merge_web_configs(
        dir.path(),
        &["WebAppDIRAC".to_string(), "LHCbWebDIRAC".to_string()],
    )
    .unwrap();

    // The theme section is fully replaced, not merged.
    assert_eq!(merged.get_option("WebApp/Theme/Name"), Some("triton"));
    assert_eq!(merged.get_option("WebApp/Theme/Variant"), None);
    // The marker never reaches the merged document.
    assert_eq!(merged.get_option("WebApp/Theme/AbsoluteDefinition"), None);
}

#[test]
fn test_module_order_decides_option_winners() {
    let dir = TempDir::new().unwrap();
    write_web_cfg(
        dir.path(),
        "First",
        "WebApp\n{\n  Dependencies\n  {\n    App = First.App\n  }\n}\n",
    );
    write_web_cfg(
        dir.path(),
        "Second",
        "WebApp\n{\n  Dependencies\n  {\n    App = Second.App\n  }\n}\n",
    );

    let forward = resolve_dependencies(
        dir.path(),
        &["First".to_string(), "Second".to_string()],
    )
    .unwrap();
    let backward = resolve_dependencies(
        dir.path(),
        &["Second".to_string(), "First".to_string()],
    )
    .unwrap();

    assert_eq!(forward["App"], "Second.App");
    assert_eq!(backward["App"], "First.App");
}

#[test]
fn test_modules_without_config_do_not_change_result() {
    let dir = TempDir::new().unwrap();
    write_web_cfg(dir.path(), "WebAppDIRAC", BASE_CFG);
    // LHCbWebDIRAC checked out but ships no web.cfg at all.
    fs::create_dir_all(dir.path().join("LHCbWebDIRAC").join("WebApp")).unwrap();

    let with_ext = resolve_dependencies(
        dir.path(),
        &["WebAppDIRAC".to_string(), "LHCbWebDIRAC".to_string()],
    )
    .unwrap();
    let alone = resolve_dependencies(dir.path(), &["WebAppDIRAC".to_string()]).unwrap();

    assert_eq!(with_ext, alone);
}

#[test]
fn test_no_modules_yield_empty_mapping() {
    let dir = TempDir::new().unwrap();
    let mapping = resolve_dependencies(dir.path(), &[]).unwrap();
    assert!(mapping.is_empty());
}
