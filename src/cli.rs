//! Command-line interface definitions.
//!
//! Every flag overrides the matching `jspc.toml` value.

use crate::{descriptor::OutputMode, logger::Level, scheduler::ThreadCount};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Parallel JSP precompiler
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("descriptor").multiple(false)))]
#[command(group(ArgGroup::new("verbosity").multiple(false)))]
pub struct Cli {
    /// Config file (default: jspc.toml)
    #[arg(short = 'C', long, default_value = "jspc.toml")]
    pub config: PathBuf,

    /// Application root, the directory that holds WEB-INF
    #[arg(long)]
    pub webapp: Option<PathBuf>,

    /// Output directory for generated sources
    #[arg(short = 'd', long)]
    pub output: Option<PathBuf>,

    /// Target package of generated servlets
    #[arg(short = 'p', long)]
    pub package: Option<String>,

    /// Class name for the first page
    #[arg(short = 'c', long = "class-name")]
    pub class_name: Option<String>,

    /// Exit code used when the run fails
    #[arg(long, value_name = "CODE", num_args = 0..=1, default_missing_value = "1")]
    pub die: Option<i32>,

    /// Keep going and write the descriptor even when pages fail
    #[arg(long = "no-fail-on-error")]
    pub no_fail_on_error: bool,

    /// Stop dispatching pages after the first failure
    #[arg(long = "fail-fast")]
    pub fail_fast: bool,

    /// Write bare servlet entries for inclusion into another web.xml
    #[arg(long, value_name = "FILE", group = "descriptor")]
    pub webinc: Option<PathBuf>,

    /// Write a standalone web-fragment.xml
    #[arg(long, value_name = "FILE", group = "descriptor")]
    pub webfrg: Option<PathBuf>,

    /// Write a standalone web.xml
    #[arg(long, value_name = "FILE", group = "descriptor")]
    pub webxml: Option<PathBuf>,

    /// Merge entries into the application's web.xml, writing the result to FILE
    #[arg(long, value_name = "FILE", group = "descriptor")]
    pub mergexml: Option<PathBuf>,

    /// Merge entries into the application's web.xml in place
    #[arg(long = "add-webxml-mappings", group = "descriptor")]
    pub add_webxml_mappings: bool,

    /// Character encoding of the written descriptor
    #[arg(long = "webxml-encoding", value_name = "ENCODING")]
    pub webxml_encoding: Option<String>,

    /// Extra classpath entries, separated by the platform path separator
    #[arg(long)]
    pub classpath: Option<String>,

    /// Worker count: `4`, `2.0C` or `x2`
    #[arg(long)]
    pub threads: Option<ThreadCount>,

    /// Delete generated sources after a successful compile
    #[arg(long = "delete-sources")]
    pub delete_sources: bool,

    /// External page compiler and its fixed arguments; takes every value up to the end
    #[arg(long, value_name = "ARG", num_args = 1.., allow_hyphen_values = true)]
    pub command: Option<Vec<String>>,

    /// Charset of generated Java sources (default UTF-8)
    #[arg(long = "java-encoding", value_name = "ENCODING")]
    pub java_encoding: Option<String>,

    /// Java compiler `-source` level (default 1.8)
    #[arg(long, value_name = "VERSION")]
    pub source: Option<String>,

    /// Java compiler `-target` level (default 1.8)
    #[arg(long, value_name = "VERSION")]
    pub target: Option<String>,

    /// Remove template text that is only whitespace
    #[arg(long = "trim-spaces")]
    pub trim_spaces: bool,

    /// Add an X-Powered-By response header
    #[arg(long = "x-powered-by")]
    pub x_powered_by: bool,

    /// Generate one write() call per template line
    #[arg(long)]
    pub mapped: bool,

    /// URI directory compilations are relative to (default /)
    #[arg(long = "uri-base", value_name = "DIR")]
    pub uri_base: Option<String>,

    /// Log failures only (default)
    #[arg(short = 'l', group = "verbosity")]
    pub warn: bool,

    /// Log every compiled page
    #[arg(short = 's', group = "verbosity")]
    pub info: bool,

    /// Log resolution details, twice for worker tracing
    #[arg(short = 'v', action = clap::ArgAction::Count, group = "verbosity")]
    pub verbose: u8,

    /// Log nothing
    #[arg(short = 'q', long, group = "verbosity")]
    pub quiet: bool,

    /// Pages to compile; the whole application when empty
    pub pages: Vec<PathBuf>,
}

impl Cli {
    pub fn level(&self) -> Level {
        match (self.quiet, self.info, self.verbose) {
            (true, _, _) => Level::Off,
            (_, _, 2..) => Level::Trace,
            (_, _, 1) => Level::Debug,
            (_, true, _) => Level::Info,
            _ => Level::Warn,
        }
    }

    /// Descriptor shape and destination selected on the command line.
    pub fn descriptor(&self) -> Option<(OutputMode, Option<PathBuf>)> {
        if let Some(path) = &self.webinc {
            Some((OutputMode::Include, Some(path.clone())))
        } else if let Some(path) = &self.webfrg {
            Some((OutputMode::Fragment, Some(path.clone())))
        } else if let Some(path) = &self.webxml {
            Some((OutputMode::Full, Some(path.clone())))
        } else if let Some(path) = &self.mergexml {
            Some((OutputMode::Merge, Some(path.clone())))
        } else if self.add_webxml_mappings {
            Some((OutputMode::Merge, None))
        } else {
            None
        }
    }
}
