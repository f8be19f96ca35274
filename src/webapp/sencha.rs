//! Sencha compiler plumbing
//!
//! The actual ExtJS compilation is delegated to the external `sencha`
//! tool. This module renders the compile templates it consumes, patches
//! the SDK's `package.json` for the duration of a compile, and builds and
//! runs the command lines.

use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use super::WebAppError;

/// Render a compile template to a named temporary file.
///
/// Substitutes `%EXT_VERSION%` and every `%KEY%` from `extra` (keys
/// upper-cased), and returns the path of the rendered file. The file is
/// persisted; callers remove it when the compile is done.
pub(super) fn write_in_file(
    template_dir: &Path,
    template_name: &str,
    ext_version: &str,
    extra: &[(&str, &str)],
) -> Result<PathBuf, WebAppError> {
    let template_path = template_dir.join(template_name);
    let mut data = fs::read_to_string(&template_path)?;
    data = data.replace("%EXT_VERSION%", ext_version);
    for (key, value) in extra {
        data = data.replace(&format!("%{}%", key.to_uppercase()), value);
    }
    let (mut file, path) = tempfile::Builder::new()
        .suffix(&format!(".compilejs.{template_name}"))
        .tempfile()
        .map_err(WebAppError::Io)?
        .keep()
        .map_err(|e| WebAppError::Io(e.error))?;
    file.write_all(data.as_bytes())?;
    debug!(template = template_name, path = %path.display(), "rendered compile template");
    Ok(path)
}

/// Temporary `package.json` patch for the SDK, restored when dropped.
///
/// Sets ES6 output and, for per-application compiles, the overrides
/// directory. The original file is backed up next to itself and put back
/// even when the compile fails.
pub(super) struct ExtJsConfigGuard {
    config_path: PathBuf,
    backup_path: PathBuf,
}

impl ExtJsConfigGuard {
    pub(super) fn apply(sdk_path: &Path, overrides: Option<&Path>) -> Result<Self, WebAppError> {
        let config_path = sdk_path.join("package.json");
        let mut config: Value = serde_json::from_str(&fs::read_to_string(&config_path)?)?;

        if let Some(overrides) = overrides {
            info!(path = %overrides.display(), "applying overrides");
            config["overrides"] = json!(overrides.to_string_lossy());
        }
        config["language"] = json!({"js": {"output": "ES6"}});

        let backup_path = sdk_path.join("package.json.bak");
        fs::copy(&config_path, &backup_path)?;
        fs::write(&config_path, serde_json::to_string(&config)?)?;

        Ok(ExtJsConfigGuard {
            config_path,
            backup_path,
        })
    }
}

impl Drop for ExtJsConfigGuard {
    fn drop(&mut self) {
        let _ = fs::copy(&self.backup_path, &self.config_path);
        let _ = fs::remove_file(&self.backup_path);
    }
}

/// Arguments for a core page compile:
/// `sencha -sdk SDK compile -classpath=... page -yui -input-file IN -out OUT`.
pub(super) fn core_compile_args(
    sdk_path: &Path,
    class_paths: &[PathBuf],
    in_file: &Path,
    out_file: &Path,
) -> Vec<String> {
    vec![
        "-sdk".to_string(),
        sdk_path.to_string_lossy().into_owned(),
        "compile".to_string(),
        format!("-classpath={}", join_class_paths(class_paths)),
        "page".to_string(),
        "-yui".to_string(),
        "-input-file".to_string(),
        in_file.to_string_lossy().into_owned(),
        "-out".to_string(),
        out_file.to_string_lossy().into_owned(),
    ]
}

/// Arguments for a per-application compile: build the page, restore it,
/// exclude foreign namespaces, concat a yui-compressed bundle.
pub(super) fn app_compile_args(
    sdk_path: &Path,
    class_paths: &[PathBuf],
    in_file: &Path,
    out_file: &Path,
    compressed_js: &Path,
    exclude_packages: &str,
) -> Vec<String> {
    vec![
        "-sdk".to_string(),
        sdk_path.to_string_lossy().into_owned(),
        "compile".to_string(),
        format!("-classpath={}", join_class_paths(class_paths)),
        "page".to_string(),
        "-name=page".to_string(),
        "-input-file".to_string(),
        in_file.to_string_lossy().into_owned(),
        "-out".to_string(),
        out_file.to_string_lossy().into_owned(),
        "and".to_string(),
        "restore".to_string(),
        "page".to_string(),
        "and".to_string(),
        "exclude".to_string(),
        "-not".to_string(),
        "-namespace".to_string(),
        format!("Ext.dirac.*{exclude_packages}"),
        "and".to_string(),
        "concat".to_string(),
        "-yui".to_string(),
        compressed_js.to_string_lossy().into_owned(),
    ]
}

fn join_class_paths(class_paths: &[PathBuf]) -> String {
    class_paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

/// Run the `sencha` tool with the given arguments.
pub(super) fn run_sencha(args: &[String]) -> Result<(), WebAppError> {
    info!(command = %format!("sencha {}", args.join(" ")), "running");
    let status = Command::new("sencha").args(args).status()?;
    if !status.success() {
        return Err(WebAppError::CompilerFailed {
            command: format!("sencha {}", args.join(" ")),
            status: status.to_string(),
        });
    }
    Ok(())
}
