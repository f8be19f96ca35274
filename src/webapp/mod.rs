//! ExtJS web application compiler
//!
//! Drives the external `sencha` tool to compile the web framework core
//! and every discovered application, after deploying the ExtJS runtime
//! resources into the static tree. Extension modules resolve their
//! application dependencies through the configuration cascade before
//! compiling, and the resulting static tree gains `.gz` siblings for
//! precompressed serving.

mod compress;
mod sencha;

pub use compress::gzip_tree;

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::cfg::{self, CfgError};
use sencha::ExtJsConfigGuard;

/// Errors for web application compilation
#[derive(Debug, Error)]
pub enum WebAppError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid SDK package configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Cfg(#[from] CfgError),

    #[error("command '{command}' failed: {status}")]
    CompilerFailed { command: String, status: String },

    #[error("extension directory '{}' is empty", .0.display())]
    EmptyExtensionDir(PathBuf),

    #[error("cannot create resource directory '{}': {}", .0.display(), .1)]
    ResourceDir(PathBuf, io::Error),
}

/// Module holding the core web framework sources.
const BASE_MODULE: &str = "WebAppDIRAC";

/// Resources-only module name: deploys the ExtJS runtime without compiling.
const RESOURCES_MODULE: &str = "DIRACWebAppResources";

/// Compiles the static tree of a web module and its extensions.
pub struct WebAppCompiler {
    name: String,
    destination: PathBuf,
    sdk_path: PathBuf,
    template_dir: PathBuf,
    ext_version: String,
    ext_dir: String,
    py3_style: bool,
    app_dependency: HashMap<String, String>,
}

impl WebAppCompiler {
    pub fn new(name: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        WebAppCompiler {
            name: name.into(),
            destination: destination.into(),
            sdk_path: PathBuf::from("/ext-6.2.0/"),
            template_dir: PathBuf::from("/CompileTemplates"),
            ext_version: "6.2.0".to_string(),
            ext_dir: "extjs".to_string(),
            py3_style: false,
            app_dependency: HashMap::new(),
        }
    }

    /// Location of the ExtJS SDK.
    pub fn with_extjs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sdk_path = path.into();
        self
    }

    /// Directory holding the `core.tpl` / `app.tpl` compile templates.
    pub fn with_template_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_dir = path.into();
        self
    }

    /// Per-module packaging: only the named module's static tree is
    /// compiled, and resources are deployed only for the resources module.
    pub fn with_py3_style(mut self, py3_style: bool) -> Self {
        self.py3_style = py3_style;
        self
    }

    /// Static root of the core web framework.
    fn web_app_path(&self) -> PathBuf {
        self.destination.join(BASE_MODULE).join("WebApp")
    }

    /// Every static tree visible to dependency resolution, base first.
    fn all_static_paths(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.web_app_path().join("static")];
        if self.name != BASE_MODULE {
            paths.push(
                self.destination
                    .join(&self.name)
                    .join("WebApp")
                    .join("static"),
            );
        }
        paths
    }

    /// The static trees that actually get compiled this run.
    fn static_paths_to_compile(&self) -> Vec<PathBuf> {
        let all = self.all_static_paths();
        if self.py3_style {
            vec![all[all.len() - 1].clone()]
        } else {
            all
        }
    }

    /// Base classpath shared by every compile invocation.
    fn class_paths(&self) -> Vec<PathBuf> {
        let static_core = self.web_app_path().join("static").join("core").join("js");
        vec![
            static_core.join("utils"),
            static_core.join("core"),
            self.sdk_path.join("build/ext-all-debug.js"),
            self.sdk_path.join("build/packages/ux/classic/ux-debug.js"),
            self.sdk_path.join("build/packages/charts/classic/charts-debug.js"),
        ]
    }

    /// Compile the framework and all applications, then gzip the result.
    pub fn run(&mut self) -> Result<(), WebAppError> {
        if self.py3_style {
            if self.name == RESOURCES_MODULE {
                let web_app_path = self.destination.join(&self.name).join("WebApp");
                info!(module = %self.name, "deploying ExtJS resources");
                self.deploy_resources(&web_app_path)?;
                info!("zipping static files");
                gzip_tree(&web_app_path.join("static"))?;
                info!("done");
                return Ok(());
            }
            info!(module = %self.name, "skipping resource deployment for non-resource module");
        } else {
            self.deploy_resources(&self.web_app_path())?;
        }

        if self.name != BASE_MODULE {
            self.app_dependency = cfg::resolve_dependencies(
                &self.destination,
                &[BASE_MODULE.to_string(), self.name.clone()],
            )?;
        }

        self.compile_core()?;

        for static_path in self.static_paths_to_compile() {
            info!(path = %static_path.display(), "looking for applications");
            let Some(ext_name) = self.detect_extension(&static_path)? else {
                continue;
            };
            let ext_path = static_path.join(&ext_name);
            if !ext_path.is_dir() {
                continue;
            }
            info!(extension = %ext_name, "exploring");
            let mut app_names: Vec<String> = fs::read_dir(&ext_path)?
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            app_names.sort();
            for app_name in app_names {
                let expected_js = ext_path
                    .join(&app_name)
                    .join("classes")
                    .join(format!("{app_name}.js"));
                if !expected_js.is_file() {
                    continue;
                }
                let class_path = self.get_classpath(&ext_name, &app_name);
                info!(
                    application = %format!("{ext_name}.{app_name}.classes.{app_name}"),
                    classpath = ?class_path,
                    "compiling application"
                );
                self.compile_app(&ext_path, &ext_name, &app_name, class_path)?;
            }
            info!("zipping static files");
            gzip_tree(&static_path)?;
        }
        info!("done");
        Ok(())
    }

    /// Copy the ExtJS runtime directories and bundles into
    /// `<web_app_path>/static/<ext_dir>`. Existing directories are kept.
    fn deploy_resources(&self, web_app_path: &Path) -> Result<(), WebAppError> {
        let extjs_dir = web_app_path.join("static").join(&self.ext_dir);
        fs::create_dir_all(&extjs_dir)
            .map_err(|e| WebAppError::ResourceDir(extjs_dir.clone(), e))?;

        let dirs_to_copy = [
            self.sdk_path.join("build/packages"),
            self.sdk_path.join("build/classic"),
        ];
        for dir_src in &dirs_to_copy {
            let dest_dir = match dir_src.file_name() {
                Some(name) => extjs_dir.join(name),
                None => continue,
            };
            if dest_dir.exists() {
                warn!(path = %dest_dir.display(), "directory already exists, not overwritten");
                continue;
            }
            copy_dir_recursive(dir_src, &dest_dir)?;
        }

        let files_to_copy = [
            self.sdk_path.join("build/ext-all.js"),
            self.sdk_path.join("build/ext-all-debug.js"),
            self.sdk_path.join("build/packages/ux/classic/ux-debug.js"),
        ];
        for file_path in &files_to_copy {
            let dest = match file_path.file_name() {
                Some(name) => extjs_dir.join(name),
                None => continue,
            };
            if let Err(e) = fs::copy(file_path, &dest) {
                warn!(path = %file_path.display(), error = %e, "could not copy resource file");
            }
        }
        Ok(())
    }

    /// Compile the framework core page, unless a build already exists.
    fn compile_core(&self) -> Result<(), WebAppError> {
        let static_path = self.web_app_path().join("static");
        info!(path = %static_path.display(), "compiling core");

        let build_dir = static_path.join("core").join("build");
        let out_file = build_dir.join("index.html");
        if out_file.is_file() {
            info!(path = %out_file.display(), "already exists, skipping core compilation");
            return Ok(());
        }

        let in_file =
            sencha::write_in_file(&self.template_dir, "core.tpl", &self.ext_version, &[])?;
        let _ = fs::remove_dir_all(&build_dir);

        let args =
            sencha::core_compile_args(&self.sdk_path, &self.class_paths(), &in_file, &out_file);
        let result = {
            let _guard = ExtJsConfigGuard::apply(&self.sdk_path, None)?;
            sencha::run_sencha(&args)
        };
        let _ = fs::remove_file(&in_file);
        result
    }

    /// Compile one application into `<ext_path>/<app>/build`.
    fn compile_app(
        &self,
        ext_path: &Path,
        ext_name: &str,
        app_name: &str,
        ext_class_path: Option<PathBuf>,
    ) -> Result<(), WebAppError> {
        let in_file = sencha::write_in_file(
            &self.template_dir,
            "app.tpl",
            &self.ext_version,
            &[(
                "app_location",
                &format!("{ext_name}.{app_name}.classes.{app_name}"),
            )],
        )?;
        let build_dir = ext_path.join(app_name).join("build");
        let _ = fs::remove_dir_all(&build_dir);
        fs::create_dir_all(&build_dir)?;

        let out_file = build_dir.join("index.html");
        let compressed_js = build_dir.join(format!("{app_name}.js"));

        let mut class_paths = self.class_paths();
        let exclude_packages = match &ext_class_path {
            Some(path) => {
                class_paths.push(path.clone());
                format!(",DIRAC.*,{ext_name}.*")
            }
            None => format!(",{ext_name}.*"),
        };
        class_paths.push(ext_path.join(app_name).join("classes"));

        let args = sencha::app_compile_args(
            &self.sdk_path,
            &class_paths,
            &in_file,
            &out_file,
            &compressed_js,
            &exclude_packages,
        );
        let overrides = ext_path.join(app_name).join("overrides");
        let result = {
            let _guard = ExtJsConfigGuard::apply(&self.sdk_path, Some(&overrides))?;
            sencha::run_sencha(&args)
        };
        let _ = fs::remove_file(&in_file);
        result
    }

    /// Pick the extension namespace under a static tree: the entry
    /// containing "DIRAC", preferring any extension over the bare base.
    fn detect_extension(&self, static_path: &Path) -> Result<Option<String>, WebAppError> {
        let mut entries: Vec<String> = fs::read_dir(static_path)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        if entries.is_empty() {
            return Err(WebAppError::EmptyExtensionDir(static_path.to_path_buf()));
        }
        entries.sort();
        let mut candidates: Vec<String> =
            entries.into_iter().filter(|e| e.contains("DIRAC")).collect();
        if candidates.len() > 1 {
            candidates.retain(|e| e != "DIRAC");
        }
        match candidates.pop() {
            Some(ext) => {
                info!(extension = %ext, "detected extension");
                Ok(Some(ext))
            }
            None => {
                warn!(path = %static_path.display(), "no extension namespace found");
                Ok(None)
            }
        }
    }

    /// Resolve the upstream classpath of an application through the
    /// dependency mapping. The last static tree holding the referenced
    /// application wins.
    fn get_classpath(&self, ext_name: &str, app_name: &str) -> Option<PathBuf> {
        let dependency = self.app_dependency.get(&format!("{ext_name}.{app_name}"))?;
        let mut parts = dependency.split('.');
        let dep_ext = parts.next()?;
        let dep_app = parts.next()?;

        let mut class_path = None;
        for static_path in self.all_static_paths() {
            let expected = static_path.join(dep_ext).join(dep_app).join("classes");
            if expected.is_dir() {
                class_path = Some(expected);
            }
        }
        class_path
    }
}

/// Recursive directory copy preserving the tree layout. Symlinks are not
/// followed.
fn copy_dir_recursive(source: &Path, destination: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
