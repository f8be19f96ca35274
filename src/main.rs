//! DIRAC Distribution CLI
//!
//! Entry point for the `dirac-dist` command-line tool.

use clap::{Parser, Subcommand};
use dirac_distribution::webapp::WebAppCompiler;
use dirac_distribution::{ReleaseBuilder, VcsKind};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dirac-dist")]
#[command(about = "DIRAC distribution tooling", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a release tarball for a module
    Tarball {
        /// Version to tar
        #[arg(short = 'v', long = "version")]
        tag: String,

        /// VCS path to retrieve sources from
        #[arg(short = 'u', long = "sourceURL")]
        source_url: String,

        /// Destination where to build the tar files
        #[arg(short = 'D', long)]
        destination: Option<PathBuf>,

        /// Tarball name
        #[arg(short = 'n', long)]
        name: String,

        /// VCS to use to retrieve the sources (autodiscovered if not given)
        #[arg(short = 'z', long)]
        vcs: Option<VcsKind>,

        /// VCS branch (if needed)
        #[arg(short = 'b', long = "vcsBranch")]
        vcs_branch: Option<String>,

        /// VCS path (if needed)
        #[arg(short = 'p', long = "vcsPath")]
        vcs_path: Option<String>,

        /// Path to the release notes
        #[arg(short = 'K', long = "relNotes")]
        rel_notes: Option<PathBuf>,

        /// Leave a copy of the compiled release notes outside the tarball
        #[arg(short = 'A', long = "outRelNotes")]
        out_rel_notes: bool,

        /// Base module version to check out for a web extension
        #[arg(short = 'e', long = "extensionVersion")]
        extension_version: Option<String>,

        /// Base module code repository for a web extension
        #[arg(short = 'E', long = "extensionSource")]
        extension_source: Option<String>,

        /// Directory of the ExtJS library
        #[arg(short = 'P', long)]
        extjspath: Option<PathBuf>,
    },

    /// Compile the web framework of a checked-out module
    WebappCompile {
        /// Module to compile (for example WebAppDIRAC or an extension)
        #[arg(short = 'n', long)]
        name: String,

        /// Directory containing the checked-out modules
        #[arg(short = 'D', long)]
        destination: PathBuf,

        /// Directory of the ExtJS library
        #[arg(short = 'P', long)]
        extjspath: Option<PathBuf>,

        /// Per-module packaging: compile only the named module's tree
        #[arg(long)]
        py3_style: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Tarball {
            tag,
            source_url,
            destination,
            name,
            vcs,
            vcs_branch,
            vcs_path,
            rel_notes,
            out_rel_notes,
            extension_version,
            extension_source,
            extjspath,
        } => {
            let mut builder = ReleaseBuilder::new(name, tag, source_url)
                .with_notes_outside(out_rel_notes);
            if let Some(destination) = destination {
                builder = builder.with_destination(destination);
            }
            if let Some(vcs) = vcs {
                builder = builder.with_vcs(vcs);
            }
            if let Some(branch) = vcs_branch {
                builder = builder.with_branch(branch);
            }
            if let Some(sub_path) = vcs_path {
                builder = builder.with_sub_path(sub_path);
            }
            if let Some(rel_notes) = rel_notes {
                builder = builder.with_notes_path(rel_notes);
            }
            if let Some(extension_version) = extension_version {
                builder = builder.with_extension_version(extension_version);
            }
            if let Some(extension_source) = extension_source {
                builder = builder.with_extension_source(extension_source);
            }
            if let Some(extjspath) = extjspath {
                builder = builder.with_extjs_path(extjspath);
            }
            match builder.run() {
                Ok(tarball) => {
                    println!("Tarball successfully created at {}", tarball.display());
                }
                Err(e) => {
                    eprintln!("Error creating tarball: {}", e);
                    process::exit(1);
                }
            }
        }
        Commands::WebappCompile {
            name,
            destination,
            extjspath,
            py3_style,
        } => {
            let mut compiler =
                WebAppCompiler::new(name, destination).with_py3_style(py3_style);
            if let Some(extjspath) = extjspath {
                compiler = compiler.with_extjs_path(extjspath);
            }
            if let Err(e) = compiler.run() {
                eprintln!("Error compiling web framework: {}", e);
                process::exit(1);
            }
        }
    }
}
