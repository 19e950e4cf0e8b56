//! jspc - a parallel JSP precompiler orchestrator.
//!
//! Resolves the pages, classpath and tag libraries of a web application,
//! hands every page to an external page compiler on a pool of workers, and
//! describes the compiled servlets in a deployment descriptor.
//!
//! ```ignore
//! let mut options = PrecompileOptions::new("target/jspc");
//! options.app_root = Some("src/main/webapp".into());
//! options.descriptor = Some(DescriptorOutputSpec::new(OutputMode::Fragment, Some("web-fragment.xml".into())));
//!
//! let compiler = CommandCompiler::new(vec!["jasper-page".into()], logger.clone())?;
//! let report = Precompiler::new(options, Box::new(compiler), logger).execute()?;
//! report.check()?;
//! ```

pub mod cli;
pub mod compiler;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod logger;
pub mod precompile;
pub mod resolver;
pub mod scheduler;

pub use compiler::{CommandCompiler, CompileContext, CompileRequest, GenerationOptions, PageCompiler};
pub use descriptor::{DescriptorOutputSpec, OutputMode};
pub use error::{CompileError, JspcError};
pub use logger::{Level, Logger};
pub use precompile::{DescriptorStatus, PrecompileOptions, Precompiler, Report, RunState};
pub use scheduler::{ResultEntry, Results, SchedulerConfig, ThreadCount};
