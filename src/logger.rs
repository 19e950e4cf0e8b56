//! Logging handle with colored output and a progress bar.
//!
//! This module provides:
//! - `Logger`, an explicit handle passed to every component (no global state)
//! - `log!` macro for formatted terminal output with colored prefixes
//! - `ProgressBar` for displaying progress while pages compile
//!
//! # Example
//!
//! ```ignore
//! let logger = Logger::new(Level::Info);
//! log!(logger, Info; "compile"; "built {}", uri);
//!
//! if let Some(progress) = logger.progress("compile", pages.len()) {
//!     progress.inc();
//!     progress.finish();
//! }
//! ```

use colored::{ColoredString, Colorize};
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType, size},
};
use serde::Deserialize;
use std::{
    fmt,
    io::{IsTerminal, Write, stdout},
    str::FromStr,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use parking_lot::Mutex;

/// Cached terminal width (fetched once on first use)
static TERMINAL_WIDTH: OnceLock<u16> = OnceLock::new();

// ============================================================================
// Layout Constants
// ============================================================================
//
// Progress bar format: "[module] [████░░░░] 42/100"
//                       ^------^ ^-------^ ^----^
//                       prefix   bar       count

/// Length of brackets around module name: "[]"
const BRACKET_LEN: usize = 2;
/// Space after prefix: "[module] " <- this space
const SPACE_AFTER_PREFIX: usize = 1;
/// Bar wrapper: " []" (space + brackets around progress bar)
const BAR_WRAPPER_LEN: usize = 3;
/// Space before count: "...] 42/100" <- this space
const SPACE_BEFORE_COUNT: usize = 1;
/// Minimum progress bar width in characters
const MIN_BAR_WIDTH: usize = 10;
/// Maximum progress bar width in characters
const MAX_BAR_WIDTH: usize = 40;

/// Calculate total prefix length for a module name.
///
/// Returns: `module.len() + 3` (for `[`, `]`, and trailing space)
#[inline]
const fn calc_prefix_len(module_len: usize) -> usize {
    module_len + BRACKET_LEN + SPACE_AFTER_PREFIX
}

/// Get terminal width, cached after first call.
/// Falls back to 120 columns if detection fails.
fn get_terminal_width() -> u16 {
    *TERMINAL_WIDTH.get_or_init(|| size().map(|(w, _)| w).unwrap_or(120))
}

// ============================================================================
// Levels
// ============================================================================

/// Verbosity threshold. A message is printed when its level is at or
/// below the logger's level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "error" => Ok(Self::Error),
            "warn" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level `{other}`")),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Log Macro
// ============================================================================

/// Log a message through a `Logger` handle with a colored module prefix.
///
/// The message is only formatted when the level is enabled.
///
/// # Usage
/// ```ignore
/// log!(logger, Warn; "taglib"; "cannot parse {}", location);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:ident; $module:expr; $($arg:tt)*) => {{
        let logger: &$crate::logger::Logger = &$logger;
        if logger.enabled($crate::logger::Level::$level) {
            logger.log($crate::logger::Level::$level, $module, &format!($($arg)*));
        }
    }};
}

// ============================================================================
// Logger Handle
// ============================================================================

/// Explicit logging handle.
///
/// Cloning is cheap; all clones share the same level and progress state.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

struct LoggerInner {
    level: Level,
    /// A progress bar holds the last terminal line
    bar_active: AtomicBool,
    /// Serializes terminal writes from worker threads
    lock: Mutex<()>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("level", &self.inner.level).finish()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Level::default())
    }
}

impl Logger {
    pub fn new(level: Level) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                level,
                bar_active: AtomicBool::new(false),
                lock: Mutex::new(()),
            }),
        }
    }

    /// A logger that prints nothing.
    pub fn silent() -> Self {
        Self::new(Level::Off)
    }

    pub fn level(&self) -> Level {
        self.inner.level
    }

    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level != Level::Off && level <= self.inner.level
    }

    /// Log a message with a colored module prefix.
    ///
    /// Automatically truncates long single-line messages to fit terminal width.
    pub fn log(&self, level: Level, module: &str, message: &str) {
        let _guard = self.inner.lock.lock();
        let prefix = colorize_prefix(module, level);
        let width = get_terminal_width() as usize;

        let mut stdout = stdout().lock();

        let bar_active = self.inner.bar_active.load(Ordering::SeqCst);
        if bar_active {
            execute!(stdout, cursor::MoveUp(1)).ok();
            execute!(stdout, Clear(ClearType::FromCursorDown)).ok();
        }

        if message.contains('\n') {
            writeln!(stdout, "{prefix} {message}").ok();
        } else {
            let max_msg_len = width.saturating_sub(calc_prefix_len(module.len()));
            writeln!(stdout, "{prefix} {}", truncate_str(message, max_msg_len)).ok();
        }

        if bar_active {
            writeln!(stdout).ok();
        }

        stdout.flush().ok();
    }

    /// Create a progress bar when it would not fight with the log output.
    ///
    /// Returns `None` when stdout is not a terminal, when the logger is
    /// chatty enough to report every page anyway, or when there is at most
    /// one item to process.
    pub fn progress(&self, module: &'static str, total: usize) -> Option<ProgressBar> {
        if self.inner.level >= Level::Info || self.inner.level == Level::Off || total <= 1 {
            return None;
        }
        if !stdout().is_terminal() {
            return None;
        }
        Some(ProgressBar::new(self.clone(), module, total))
    }
}

// ============================================================================
// Progress Bar
// ============================================================================

/// Progress bar on the last terminal line, redrawn in place with ANSI
/// cursor control. Log lines are printed above it.
pub struct ProgressBar {
    logger: Logger,
    /// Colored prefix string (e.g., "[compile]" in yellow)
    prefix: ColoredString,
    /// Pre-calculated display length of prefix
    prefix_len: usize,
    total: usize,
    current: AtomicUsize,
}

impl ProgressBar {
    fn new(logger: Logger, module: &'static str, total: usize) -> Self {
        // Reserve the terminal line
        let mut stdout = stdout().lock();
        writeln!(stdout).ok();
        stdout.flush().ok();

        logger.inner.bar_active.store(true, Ordering::SeqCst);

        Self {
            logger,
            prefix: format!("[{module}]").bright_yellow().bold(),
            prefix_len: calc_prefix_len(module.len()),
            total,
            current: AtomicUsize::new(0),
        }
    }

    /// Count one finished item. Safe to call from every worker.
    #[inline]
    pub fn inc(&self) {
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.display(current);
    }

    fn display(&self, current: usize) {
        let _guard = self.logger.inner.lock.lock();

        let width = get_terminal_width() as usize;
        let progress_text = format!("{}/{}", current, self.total);
        let overhead = self.prefix_len + BAR_WRAPPER_LEN + SPACE_BEFORE_COUNT + progress_text.len();
        let bar_width = width.saturating_sub(overhead).clamp(MIN_BAR_WIDTH, MAX_BAR_WIDTH);
        let progress_bar = render_bar(current, self.total, bar_width);

        let mut stdout = stdout().lock();
        execute!(stdout, cursor::MoveUp(1)).ok();
        execute!(stdout, Clear(ClearType::CurrentLine)).ok();
        writeln!(stdout, "{} [{}] {}", self.prefix, progress_bar, progress_text).ok();
        stdout.flush().ok();
    }

    /// Clear the bar from the terminal.
    pub fn finish(&self) {
        if !self.logger.inner.bar_active.swap(false, Ordering::SeqCst) {
            return;
        }
        let _guard = self.logger.inner.lock.lock();

        let mut stdout = stdout().lock();
        execute!(stdout, cursor::MoveUp(1)).ok();
        execute!(stdout, Clear(ClearType::CurrentLine)).ok();
        stdout.flush().ok();
    }
}

impl Drop for ProgressBar {
    fn drop(&mut self) {
        self.finish();
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Apply color to a module prefix based on the message level.
#[inline]
fn colorize_prefix(module: &str, level: Level) -> ColoredString {
    let prefix = format!("[{module}]");
    match level {
        Level::Error => prefix.bright_red().bold(),
        Level::Warn => prefix.bright_yellow().bold(),
        Level::Info => prefix.bright_green().bold(),
        Level::Debug => prefix.bright_blue().bold(),
        Level::Trace | Level::Off => prefix.dimmed(),
    }
}

/// `width` cells of filled and empty blocks for `current` of `total`.
fn render_bar(current: usize, total: usize, width: usize) -> String {
    let filled = if total > 0 { (current.min(total) * width) / total } else { 0 };
    "█".repeat(filled) + &"░".repeat(width.saturating_sub(filled))
}

/// Truncate a string to fit within `max_len` bytes.
///
/// Ensures the result is valid UTF-8 by finding the nearest character boundary.
#[inline]
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Tests
// ============================================================================
