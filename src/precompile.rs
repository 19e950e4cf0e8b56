//! One precompilation run, end to end.
//!
//! ```text
//! Idle ──► Resolving ──► Dispatching ──► Joining ──► Finalized
//!            │                                          ▲
//!            └──────────── configuration error ─────────┘
//! ```
//!
//! A `Precompiler` executes once. The descriptor is written after every
//! worker has joined, and only when the failure policy allows it.

use crate::{
    compiler::{CompileContext, GenerationOptions, PageCompiler},
    descriptor::{self, DescriptorOutputSpec},
    error::JspcError,
    log,
    logger::Logger,
    resolver::{self, locate_app_root},
    scheduler::{Results, Scheduler, SchedulerConfig, results::DEFAULT_FAILURE_CODE},
};
use anyhow::{Result, bail};
use parking_lot::Mutex;
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Options
// ============================================================================

/// Everything one run needs, already validated by the caller's config layer.
#[derive(Debug, Clone)]
pub struct PrecompileOptions {
    /// Located from the first page when unset
    pub app_root: Option<PathBuf>,
    /// Explicit pages, compiled in this order; empty means discover
    pub pages: Vec<PathBuf>,
    /// Extra classpath entries, searched after `WEB-INF`
    pub classpath: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub package: Option<String>,
    pub generation: GenerationOptions,
    pub scheduler: SchedulerConfig,
    /// No descriptor is written when unset
    pub descriptor: Option<DescriptorOutputSpec>,
    pub failure_code: i32,
}

impl PrecompileOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_root: None,
            pages: Vec::new(),
            classpath: Vec::new(),
            output_dir: output_dir.into(),
            package: None,
            generation: GenerationOptions::default(),
            scheduler: SchedulerConfig::default(),
            descriptor: None,
            failure_code: DEFAULT_FAILURE_CODE,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.failure_code <= 0 {
            bail!(JspcError::config(format!(
                "Failure code must be greater than zero, got {}",
                self.failure_code
            )));
        }
        if self.scheduler.threads == 0 {
            bail!(JspcError::config("Thread count must be greater than zero"));
        }
        self.generation.validate()?;
        if let Some(spec) = &self.descriptor {
            spec.validate()?;
        }
        Ok(())
    }

    /// Configured root, or the nearest ancestor of the first page holding `WEB-INF`.
    fn app_root(&self) -> Result<PathBuf> {
        match (&self.app_root, self.pages.first()) {
            (Some(root), _) => Ok(root.clone()),
            (None, Some(first)) => locate_app_root(first),
            (None, None) => bail!(JspcError::config(
                "No application root configured and no page to locate it from"
            )),
        }
    }
}

// ============================================================================
// Run State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Resolving,
    Dispatching,
    Joining,
    Finalized,
}

/// What happened to the descriptor output.
#[derive(Debug)]
pub enum DescriptorStatus {
    NotRequested,
    /// Failures occurred under fail-on-error
    Suppressed,
    Written(PathBuf),
    Failed(anyhow::Error),
}

// ============================================================================
// Report
// ============================================================================

/// Outcome of a finished run.
#[derive(Debug)]
pub struct Report {
    results: Results,
    descriptor: DescriptorStatus,
    fails_on_error: bool,
}

impl Report {
    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn descriptor(&self) -> &DescriptorStatus {
        &self.descriptor
    }

    pub fn summary(&self) -> String {
        self.results.summary()
    }

    /// Process exit code: the failure code when the run failed, else 0.
    pub fn exit_code(&self) -> i32 {
        let failed = self.results.has_error() && self.fails_on_error;
        if failed || matches!(self.descriptor, DescriptorStatus::Failed(_)) {
            self.results.failure_code()
        } else {
            0
        }
    }

    /// Turn a failed run into an error for library callers.
    pub fn check(&self) -> Result<()> {
        if self.results.has_error() && self.fails_on_error {
            bail!(JspcError::Aggregate {
                failed: self.results.failure_count(),
                total: self.results.total(),
            });
        }
        if let DescriptorStatus::Failed(e) = &self.descriptor {
            bail!("Descriptor output failed: {e:#}");
        }
        Ok(())
    }
}

// ============================================================================
// Precompiler
// ============================================================================

/// Drives resolution, scheduling and descriptor output for one run.
pub struct Precompiler {
    options: PrecompileOptions,
    compiler: Box<dyn PageCompiler>,
    logger: Logger,
    state: Mutex<RunState>,
}

impl Precompiler {
    pub fn new(options: PrecompileOptions, compiler: Box<dyn PageCompiler>, logger: Logger) -> Self {
        Self {
            options,
            compiler,
            logger,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn options(&self) -> &PrecompileOptions {
        &self.options
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    fn enter(&self, next: RunState) {
        log!(self.logger, Trace; "precompile"; "{:?} -> {next:?}", self.state());
        *self.state.lock() = next;
    }

    /// Run the whole pipeline. A second call fails with `AlreadyExecuted`.
    ///
    /// Page failures do not make this return `Err`; they are in the report.
    /// Errors here are configuration or setup problems found before any
    /// page was compiled.
    pub fn execute(&self) -> Result<Report> {
        {
            let mut state = self.state.lock();
            if *state != RunState::Idle {
                bail!(JspcError::AlreadyExecuted);
            }
            *state = RunState::Resolving;
        }

        let outcome = self.run();
        self.enter(RunState::Finalized);
        outcome
    }

    fn run(&self) -> Result<Report> {
        let options = &self.options;
        options.validate()?;

        let app_root = options.app_root()?;
        let resolved = resolver::resolve(&app_root, &options.pages, &options.classpath, &self.logger)?;

        fs::create_dir_all(&options.output_dir).map_err(|e| JspcError::Io(options.output_dir.clone(), e))?;
        let context = CompileContext::new(
            options.output_dir.clone(),
            resolved.classpath,
            resolved.taglibs,
            options.package.clone(),
        )
        .with_generation(options.generation.clone());

        self.enter(RunState::Dispatching);
        let scheduler = Scheduler::new(
            options.scheduler.clone(),
            self.compiler.as_ref(),
            &context,
            &self.logger,
            Results::new(options.failure_code),
        )?;
        scheduler.run(&resolved.pages)?;
        self.enter(RunState::Joining);

        let descriptor = match &options.descriptor {
            None => DescriptorStatus::NotRequested,
            Some(_) if !scheduler.should_write_descriptor() => {
                log!(self.logger, Warn; "descriptor"; "skipped, {} pages failed", scheduler.results().failure_count());
                DescriptorStatus::Suppressed
            }
            Some(spec) => self.write_descriptor(spec, context.app_root(), scheduler.results()),
        };

        Ok(Report {
            fails_on_error: scheduler.config().fails_on_error(),
            results: scheduler.into_results(),
            descriptor,
        })
    }

    fn write_descriptor(&self, spec: &DescriptorOutputSpec, app_root: &Path, results: &Results) -> DescriptorStatus {
        match descriptor::write_descriptor(spec, app_root, &results.successes(), &self.logger) {
            Ok(path) => DescriptorStatus::Written(path),
            Err(e) => {
                log!(self.logger, Error; "descriptor"; "{e:#}");
                DescriptorStatus::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::CompileRequest,
        descriptor::{OutputMode, dom::Document},
        error::CompileError,
    };
    use tempfile::TempDir;

    /// Pages whose body contains `INVALID` fail to compile.
    struct ContentCompiler;

    impl PageCompiler for ContentCompiler {
        fn compile(&self, request: &CompileRequest<'_>) -> Result<String, CompileError> {
            let body = fs::read_to_string(&request.page.path).map_err(anyhow::Error::from)?;
            if body.contains("INVALID") {
                return Err(anyhow::anyhow!("unterminated <% tag in {}", request.page.uri).into());
            }
            Ok(request.default_artifact())
        }
    }

    /// Webapp with `valid` good pages and one invalid page listed first.
    fn webapp(valid: usize) -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("WEB-INF")).unwrap();

        let invalid = dir.path().join("invalid.jsp");
        fs::write(&invalid, "<% INVALID").unwrap();

        let mut pages = vec![invalid];
        for i in 0..valid {
            let page = dir.path().join(format!("page{i}.jsp"));
            fs::write(&page, "<html>ok</html>").unwrap();
            pages.push(page);
        }
        (dir, pages)
    }

    /// Fails every page unless the run trims template whitespace.
    struct TrimmingCompiler;

    impl PageCompiler for TrimmingCompiler {
        fn compile(&self, request: &CompileRequest<'_>) -> Result<String, CompileError> {
            let generation = request.context.generation();
            if !generation.trim_spaces || generation.source != "17" {
                return Err(anyhow::anyhow!("unexpected generation options {generation:?}").into());
            }
            Ok(request.default_artifact())
        }
    }

    fn precompiler(options: PrecompileOptions) -> Precompiler {
        Precompiler::new(options, Box::new(ContentCompiler), Logger::silent())
    }

    #[test]
    fn test_single_page_include() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("WEB-INF")).unwrap();
        let page = dir.path().join("simple.jsp");
        fs::write(&page, "<html/>").unwrap();
        let target = dir.path().join("out/web-include.xml");

        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = vec![page];
        options.descriptor = Some(DescriptorOutputSpec::new(OutputMode::Include, Some(target.clone())));

        let precompiler = precompiler(options);
        let report = precompiler.execute().unwrap();

        assert_eq!(precompiler.state(), RunState::Finalized);
        assert_eq!(report.results().success_count(), 1);
        assert_eq!(report.results().successes()[0].page_uri(), "/simple.jsp");
        assert!(matches!(report.descriptor(), DescriptorStatus::Written(path) if *path == target));
        assert_eq!(report.exit_code(), 0);

        let content = fs::read_to_string(&target).unwrap();
        assert!(!content.is_empty());
        assert!(!content.contains("<?xml"));
        assert!(content.contains("<url-pattern>/simple.jsp</url-pattern>"));
    }

    #[test]
    fn test_failures_tolerated_without_fail_on_error() {
        let (dir, pages) = webapp(4);
        let target = dir.path().join("web.xml");

        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages;
        options.scheduler.fail_on_error = false;
        options.descriptor = Some(DescriptorOutputSpec::new(OutputMode::Full, Some(target.clone())));

        let report = precompiler(options).execute().unwrap();
        assert_eq!(report.results().success_count(), 4);
        assert_eq!(report.results().failure_count(), 1);
        assert_eq!(report.exit_code(), 0);
        assert!(report.check().is_ok());

        let doc = Document::from_bytes(&fs::read(&target).unwrap()).unwrap();
        assert_eq!(doc.root.children_named("servlet").count(), 4);
    }

    #[test]
    fn test_fail_fast_suppresses_descriptor() {
        let (dir, pages) = webapp(4);
        let target = dir.path().join("web.xml");

        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages;
        options.scheduler.fail_on_error = false;
        options.scheduler.fail_fast = true;
        options.failure_code = 7;
        options.descriptor = Some(DescriptorOutputSpec::new(OutputMode::Full, Some(target.clone())));

        let report = precompiler(options).execute().unwrap();
        assert_eq!(report.results().failure_count(), 1);
        assert!(report.results().total() < 5);
        assert!(matches!(report.descriptor(), DescriptorStatus::Suppressed));
        assert!(!target.exists());
        assert_eq!(report.exit_code(), 7);

        let err = report.check().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JspcError>(),
            Some(JspcError::Aggregate { failed: 1, .. })
        ));
    }

    #[test]
    fn test_fail_on_error_suppresses_descriptor() {
        let (dir, pages) = webapp(2);
        let target = dir.path().join("web-fragment.xml");

        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages;
        options.descriptor = Some(DescriptorOutputSpec::new(OutputMode::Fragment, Some(target.clone())));

        let report = precompiler(options).execute().unwrap();
        assert_eq!(report.results().total(), 3);
        assert!(!target.exists());
        assert_eq!(report.exit_code(), DEFAULT_FAILURE_CODE);
    }

    #[test]
    fn test_executes_only_once() {
        let (dir, pages) = webapp(1);
        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages;
        options.scheduler.fail_on_error = false;

        let precompiler = precompiler(options);
        assert_eq!(precompiler.state(), RunState::Idle);
        precompiler.execute().unwrap();

        let err = precompiler.execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<JspcError>(), Some(JspcError::AlreadyExecuted)));
    }

    #[test]
    fn test_app_root_located_from_first_page() {
        let (dir, pages) = webapp(1);
        let nested = dir.path().join("admin");
        fs::create_dir_all(&nested).unwrap();
        let page = nested.join("panel.jsp");
        fs::write(&page, "ok").unwrap();

        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = vec![page, pages[1].clone()];

        let report = precompiler(options).execute().unwrap();
        let uris: Vec<_> = report.results().successes().iter().map(|e| e.page_uri().to_owned()).collect();
        assert!(uris.contains(&"/admin/panel.jsp".to_owned()));
        assert!(uris.contains(&"/page0.jsp".to_owned()));
    }

    #[test]
    fn test_configuration_errors() {
        // no root and no pages
        let err = precompiler(PrecompileOptions::new("out")).execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<JspcError>(), Some(JspcError::Configuration(_))));

        // descriptor without destination
        let (dir, pages) = webapp(1);
        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages.clone();
        options.descriptor = Some(DescriptorOutputSpec::new(OutputMode::Include, None));
        let rejected = precompiler(options);
        assert!(rejected.execute().is_err());
        assert_eq!(rejected.state(), RunState::Finalized);

        // failure code
        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages.clone();
        options.failure_code = 0;
        assert!(precompiler(options).execute().is_err());

        // relative uri base
        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages;
        options.generation.uri_base = "shop".into();
        let err = precompiler(options).execute().unwrap_err();
        assert!(matches!(err.downcast_ref::<JspcError>(), Some(JspcError::Configuration(_))));
    }

    #[test]
    fn test_generation_options_reach_compiler() {
        let (dir, pages) = webapp(2);
        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages[1..].to_vec();
        options.generation = GenerationOptions { trim_spaces: true, source: "17".into(), ..Default::default() };

        let precompiler = Precompiler::new(options, Box::new(TrimmingCompiler), Logger::silent());
        let report = precompiler.execute().unwrap();
        assert_eq!(report.results().success_count(), 2);
        assert!(!report.results().has_error());
    }

    #[test]
    fn test_descriptor_failure_sets_exit_code() {
        let (dir, pages) = webapp(1);
        fs::write(dir.path().join("WEB-INF/web.xml"), "<beans/>").unwrap();

        let mut options = PrecompileOptions::new(dir.path().join("out"));
        options.pages = pages[1..].to_vec();
        options.descriptor = Some(DescriptorOutputSpec::new(OutputMode::Merge, None));

        let report = precompiler(options).execute().unwrap();
        assert_eq!(report.results().success_count(), 1);
        assert!(matches!(report.descriptor(), DescriptorStatus::Failed(_)));
        assert_eq!(report.exit_code(), DEFAULT_FAILURE_CODE);
        assert!(report.check().is_err());
    }
}
