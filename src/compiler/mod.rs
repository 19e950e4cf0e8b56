//! Page compiler collaborator.
//!
//! The orchestrator never parses templates itself. It hands each page to a
//! `PageCompiler` and records what comes back:
//!
//! ```text
//! CompileContext (shared, read-only) ──┐
//!                                      ├──► PageCompiler::compile() ──► artifact name | CompileError
//! CompileRequest (one per page) ───────┘
//! ```

pub mod command;
pub mod naming;

use crate::{
    error::{CompileError, JspcError},
    resolver::{ClassPath, Page, TaglibMap},
};
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

pub use command::CommandCompiler;

pub const DEFAULT_JAVA_ENCODING: &str = "UTF-8";
pub const DEFAULT_JAVA_VERSION: &str = "1.8";
pub const DEFAULT_URI_BASE: &str = "/";

/// Code generation settings handed to the page compiler unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Charset of generated sources
    pub java_encoding: String,
    /// `-source` level for the Java compiler
    pub source: String,
    /// `-target` level for the Java compiler
    pub target: String,
    /// Drop template text that is only whitespace
    pub trim_spaces: bool,
    /// Add an `X-Powered-By` response header
    pub x_powered_by: bool,
    /// One `write()` call per template line
    pub mapped: bool,
    /// URI directory page compilations are relative to
    pub uri_base: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            java_encoding: DEFAULT_JAVA_ENCODING.into(),
            source: DEFAULT_JAVA_VERSION.into(),
            target: DEFAULT_JAVA_VERSION.into(),
            trim_spaces: false,
            x_powered_by: false,
            mapped: false,
            uri_base: DEFAULT_URI_BASE.into(),
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("Java encoding", &self.java_encoding),
            ("Source level", &self.source),
            ("Target level", &self.target),
        ] {
            if value.trim().is_empty() {
                bail!(JspcError::config(format!("{field} must not be empty")));
            }
        }
        if !self.uri_base.starts_with('/') {
            bail!(JspcError::config(format!(
                "URI base must start with `/`, got `{}`",
                self.uri_base
            )));
        }
        Ok(())
    }
}

/// State shared by every compile call of a run.
///
/// Built once after resolution and never mutated while workers run.
#[derive(Debug)]
pub struct CompileContext {
    output_dir: PathBuf,
    classpath: ClassPath,
    taglibs: TaglibMap,
    package: Option<String>,
    generation: GenerationOptions,
}

impl CompileContext {
    pub fn new(output_dir: PathBuf, classpath: ClassPath, taglibs: TaglibMap, package: Option<String>) -> Self {
        Self {
            output_dir,
            classpath,
            taglibs,
            package,
            generation: GenerationOptions::default(),
        }
    }

    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    pub fn app_root(&self) -> &Path {
        self.classpath.app_root()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn classpath(&self) -> &ClassPath {
        &self.classpath
    }

    pub fn taglibs(&self) -> &TaglibMap {
        &self.taglibs
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn generation(&self) -> &GenerationOptions {
        &self.generation
    }
}

/// One page to compile.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub page: &'a Page,
    /// Explicit class name; only ever set for the first page of a run
    pub class_name: Option<&'a str>,
    pub context: &'a CompileContext,
}

impl CompileRequest<'_> {
    /// Artifact name the page gets when the compiler does not report one.
    pub fn default_artifact(&self) -> String {
        naming::derive_artifact_name(&self.page.uri, self.context.package(), self.class_name)
    }
}

/// External page-to-code compiler.
///
/// Called concurrently from every worker, so implementations must keep
/// per-call state local to `compile`.
pub trait PageCompiler: Send + Sync {
    /// Called once per run before any page is compiled.
    fn prepare(&self, _context: &CompileContext) -> Result<()> {
        Ok(())
    }

    /// Compile a page, returning the fully qualified artifact name.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<String, CompileError>;
}
