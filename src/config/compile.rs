//! `[compile]` section configuration.

use super::defaults;
use crate::{compiler::GenerationOptions, scheduler::ThreadCount};
use educe::Educe;
use serde::Deserialize;
use std::path::PathBuf;

/// `[compile]` section in jspc.toml - scheduling and the page compiler.
///
/// # Example
/// ```toml
/// [compile]
/// output = "target/jspc"
/// package = "com.acme.jsp"
/// threads = "1.5C"        # or 4, "x2", "auto"
/// fail_fast = true
/// command = ["java", "-jar", "jasper-page.jar"]
/// java_encoding = "UTF-8"
/// source = "17"
/// target = "17"
/// trim_spaces = true
/// ```
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CompileConfig {
    /// Output directory for generated sources and classes.
    #[serde(default = "defaults::compile::output")]
    #[educe(Default = defaults::compile::output())]
    pub output: PathBuf,

    /// Target package. Generated servlets go to `org.apache.jsp` when unset.
    #[serde(default)]
    pub package: Option<String>,

    /// Explicit class name for the first page.
    #[serde(default)]
    pub class_name: Option<String>,

    #[serde(default = "defaults::compile::threads")]
    #[educe(Default = defaults::compile::threads())]
    pub threads: ThreadCount,

    /// Stop dispatching pages after the first failure.
    #[serde(default)]
    pub fail_fast: bool,

    /// Any failure suppresses the descriptor and fails the run.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub fail_on_error: bool,

    /// Delete generated sources after a successful compile.
    #[serde(default)]
    pub delete_sources: bool,

    /// Process exit code for a failed run.
    #[serde(default = "defaults::compile::failure_code")]
    #[educe(Default = defaults::compile::failure_code())]
    pub failure_code: i32,

    /// External page compiler, run once per page.
    #[serde(default = "defaults::compile::command")]
    #[educe(Default = defaults::compile::command())]
    pub command: Vec<String>,

    /// Charset of generated Java sources.
    #[serde(default = "defaults::compile::java_encoding")]
    #[educe(Default = defaults::compile::java_encoding())]
    pub java_encoding: String,

    /// Java compiler `-source` level.
    #[serde(default = "defaults::compile::java_version")]
    #[educe(Default = defaults::compile::java_version())]
    pub source: String,

    /// Java compiler `-target` level.
    #[serde(default = "defaults::compile::java_version")]
    #[educe(Default = defaults::compile::java_version())]
    pub target: String,

    /// Remove template text that is only whitespace.
    #[serde(default)]
    pub trim_spaces: bool,

    /// Add an `X-Powered-By` response header.
    #[serde(default)]
    pub x_powered_by: bool,

    /// One `write()` call per template line.
    #[serde(default)]
    pub mapped: bool,

    /// URI directory compilations are relative to.
    #[serde(default = "defaults::compile::uri_base")]
    #[educe(Default = defaults::compile::uri_base())]
    pub uri_base: String,
}

impl CompileConfig {
    pub fn generation(&self) -> GenerationOptions {
        GenerationOptions {
            java_encoding: self.java_encoding.clone(),
            source: self.source.clone(),
            target: self.target.clone(),
            trim_spaces: self.trim_spaces,
            x_powered_by: self.x_powered_by,
            mapped: self.mapped,
            uri_base: self.uri_base.clone(),
        }
    }
}
