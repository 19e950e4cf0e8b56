//! Concurrent page compilation.
//!
//! A fixed pool of workers drains the page list through a single locked
//! cursor. Each worker loops on `next_task()`, compiles the page and records
//! exactly one result entry:
//!
//! ```text
//! pages ──► next_task() ─┬─► worker 0 ─┬─► Results
//!                        ├─► worker 1 ─┤
//!                        └─► worker N ─┘
//! ```
//!
//! With fail-fast enabled the cursor stops handing out pages once a failure
//! has been recorded. Work already in flight always runs to completion, so
//! up to `threads - 1` pages may still finish after the first failure.

pub mod results;

use crate::{
    compiler::{CompileContext, CompileRequest, PageCompiler, naming},
    error::{CompileError, JspcError},
    log,
    logger::{Logger, ProgressBar},
    resolver::Page,
};
use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, de};
use std::{
    any::Any,
    fmt, fs,
    panic::{self, AssertUnwindSafe},
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

pub use results::{ResultEntry, Results};

// ============================================================================
// Thread Count
// ============================================================================

/// Worker count, absolute or relative to the available cores.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum ThreadCount {
    /// Half the cores plus one
    #[default]
    Auto,
    Absolute(usize),
    /// `ceil(factor × cores)`
    PerCore(f64),
}

fn available_cores() -> usize {
    thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

impl ThreadCount {
    /// Resolve against the cores of this machine.
    pub fn resolve(self) -> Result<usize> {
        self.resolve_with(available_cores())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn resolve_with(self, cores: usize) -> Result<usize> {
        let threads = match self {
            Self::Auto => cores / 2 + 1,
            Self::Absolute(n) => n,
            Self::PerCore(factor) => (factor * cores as f64).ceil().max(0.0) as usize,
        };
        if threads == 0 {
            bail!(JspcError::config(format!("Thread count `{self}` resolves to zero workers")));
        }
        Ok(threads)
    }
}

impl FromStr for ThreadCount {
    type Err = JspcError;

    /// Accepts `4`, `1.5C`, `2c`, `x2` and `×2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || JspcError::config(format!("Invalid thread count `{s}`"));

        let multiplier = s
            .strip_suffix(['C', 'c'])
            .or_else(|| s.strip_prefix(['x', 'X', '×']));

        match multiplier {
            Some(factor) => {
                let factor: f64 = factor.trim().parse().map_err(|_| invalid())?;
                if !factor.is_finite() || factor <= 0.0 {
                    return Err(invalid());
                }
                Ok(Self::PerCore(factor))
            }
            None => {
                let count: i64 = s.parse().map_err(|_| invalid())?;
                let count = usize::try_from(count).ok().filter(|n| *n > 0).ok_or_else(invalid)?;
                Ok(Self::Absolute(count))
            }
        }
    }
}

impl fmt::Display for ThreadCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Absolute(n) => write!(f, "{n}"),
            Self::PerCore(factor) => write!(f, "{factor}C"),
        }
    }
}

impl<'de> Deserialize<'de> for ThreadCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(i64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => n.to_string().parse().map_err(de::Error::custom),
            Raw::Text(s) if s.eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            Raw::Text(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Policy knobs for one run.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Resolved worker count, always > 0
    pub threads: usize,
    /// Stop dispatching new pages after the first failure
    pub fail_fast: bool,
    /// Any failure suppresses descriptor output and fails the run
    pub fail_on_error: bool,
    /// Explicit class name for the first page
    pub class_name: Option<String>,
    /// Remove generated `.java` sources after a successful compile
    pub delete_sources: bool,
}

impl SchedulerConfig {
    /// Whether failures fail the run. A fail-fast stop always does.
    pub fn fails_on_error(&self) -> bool {
        self.fail_on_error || self.fail_fast
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            fail_fast: false,
            fail_on_error: true,
            class_name: None,
            delete_sources: false,
        }
    }
}

// ============================================================================
// Task Queue
// ============================================================================

struct Cursor {
    next: usize,
    /// Once set, no further page is handed out
    closed: bool,
}

/// Shared page list with a single locked pop.
struct TaskQueue<'p> {
    pages: &'p [Page],
    cursor: Mutex<Cursor>,
    fail_fast: bool,
}

impl<'p> TaskQueue<'p> {
    fn new(pages: &'p [Page], fail_fast: bool) -> Self {
        Self {
            pages,
            cursor: Mutex::new(Cursor { next: 0, closed: false }),
            fail_fast,
        }
    }

    /// Pop the next page, or `None` once exhausted or stopped by fail-fast.
    ///
    /// The check and the pop happen under one lock, and a closed queue
    /// stays closed.
    fn next_task(&self, results: &Results) -> Option<&'p Page> {
        let mut cursor = self.cursor.lock();
        if cursor.closed {
            return None;
        }
        if (self.fail_fast && results.has_error()) || cursor.next >= self.pages.len() {
            cursor.closed = true;
            return None;
        }

        let page = &self.pages[cursor.next];
        cursor.next += 1;
        Some(page)
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Drives one compilation run. A scheduler runs at most once.
pub struct Scheduler<'a> {
    config: SchedulerConfig,
    compiler: &'a dyn PageCompiler,
    context: &'a CompileContext,
    logger: &'a Logger,
    results: Results,
    executed: AtomicBool,
}

impl<'a> Scheduler<'a> {
    /// Create a scheduler around a fresh aggregator.
    ///
    /// An aggregator that already holds entries belongs to another run.
    pub fn new(
        config: SchedulerConfig,
        compiler: &'a dyn PageCompiler,
        context: &'a CompileContext,
        logger: &'a Logger,
        results: Results,
    ) -> Result<Self> {
        if !results.is_empty() {
            bail!(JspcError::AlreadyExecuted);
        }
        if config.threads == 0 {
            bail!(JspcError::config("Thread count must be greater than zero"));
        }
        Ok(Self {
            config,
            compiler,
            context,
            logger,
            results,
            executed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn into_results(self) -> Results {
        self.results
    }

    /// Whether descriptor output should be produced for this run.
    pub fn should_write_descriptor(&self) -> bool {
        !self.results.has_error() || !self.config.fails_on_error()
    }

    /// Compile every page and block until all workers are done.
    pub fn run(&self, pages: &[Page]) -> Result<()> {
        if self.executed.swap(true, Ordering::SeqCst) {
            bail!(JspcError::AlreadyExecuted);
        }

        self.compiler.prepare(self.context).context("Failed to prepare page compiler")?;

        let progress = self.logger.progress("compile", pages.len());
        let progress = progress.as_ref();

        // the explicit class name goes to the first page only, compiled here
        let mut queued = pages;
        if let Some(class_name) = self.config.class_name.as_deref()
            && let Some((first, rest)) = pages.split_first()
        {
            self.compile_page(first, Some(class_name), progress);
            queued = rest;
        }

        let queue = TaskQueue::new(queued, self.config.fail_fast);
        let threads = self.config.threads.min(queued.len()).max(1);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("jspc-worker-{i}"))
            .build()
            .context("Failed to start worker pool")?;

        log!(self.logger, Debug; "schedule"; "{} pages queued on {threads} workers", queued.len());

        pool.scope(|scope| {
            for worker in 0..threads {
                let queue = &queue;
                scope.spawn(move |_| self.worker_loop(worker, queue, progress));
            }
        });

        if let Some(progress) = progress {
            progress.finish();
        }
        Ok(())
    }

    fn worker_loop(&self, worker: usize, queue: &TaskQueue<'_>, progress: Option<&ProgressBar>) {
        log!(self.logger, Trace; "schedule"; "worker {worker} started");
        let mut compiled = 0usize;
        while let Some(page) = queue.next_task(&self.results) {
            self.compile_page(page, None, progress);
            compiled += 1;
        }
        log!(self.logger, Trace; "schedule"; "worker {worker} finished after {compiled} pages");
    }

    /// Compile one page and record exactly one entry for it.
    fn compile_page(&self, page: &Page, class_name: Option<&str>, progress: Option<&ProgressBar>) {
        let request = CompileRequest {
            page,
            class_name,
            context: self.context,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.compiler.compile(&request)))
            .unwrap_or_else(|payload| Err(CompileError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(artifact) => {
                log!(self.logger, Info; "compile"; "built {} as {artifact}", page.uri);
                if self.config.delete_sources {
                    self.delete_source(&artifact);
                }
                self.results.add_success(page.uri.as_str(), artifact);
            }
            Err(cause) => {
                log!(self.logger, Warn; "compile"; "failed {}: {cause}", page.uri);
                self.results.add_failure(page.uri.as_str(), cause);
            }
        }

        if let Some(progress) = progress {
            progress.inc();
        }
    }

    fn delete_source(&self, artifact: &str) {
        let source = naming::artifact_source_path(self.context.output_dir(), artifact);
        if !source.exists() {
            return;
        }
        match fs::remove_file(&source) {
            Ok(()) => log!(self.logger, Debug; "compile"; "deleted {}", source.display()),
            Err(e) => log!(self.logger, Warn; "compile"; "cannot delete {}: {e}", source.display()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}
