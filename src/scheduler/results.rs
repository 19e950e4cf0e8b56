//! Results of one scheduling run.

use crate::error::CompileError;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Default process exit code when a run fails
pub const DEFAULT_FAILURE_CODE: i32 = 1;

/// Outcome for a single page. Every dispatched page produces exactly one.
#[derive(Debug, Clone)]
pub enum ResultEntry {
    Success { page_uri: String, artifact: String },
    Failure { page_uri: String, cause: Arc<CompileError> },
}

impl ResultEntry {
    pub fn page_uri(&self) -> &str {
        match self {
            Self::Success { page_uri, .. } | Self::Failure { page_uri, .. } => page_uri,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Thread-safe aggregator filled by every worker.
///
/// Entries keep completion order within each list.
#[derive(Debug)]
pub struct Results {
    successes: Mutex<Vec<ResultEntry>>,
    failures: Mutex<Vec<ResultEntry>>,
    failure_code: i32,
    started: Instant,
}

impl Default for Results {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_CODE)
    }
}

impl Results {
    pub fn new(failure_code: i32) -> Self {
        Self {
            successes: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            failure_code,
            started: Instant::now(),
        }
    }

    pub fn add_success(&self, page_uri: impl Into<String>, artifact: impl Into<String>) {
        self.successes.lock().push(ResultEntry::Success {
            page_uri: page_uri.into(),
            artifact: artifact.into(),
        });
    }

    pub fn add_failure(&self, page_uri: impl Into<String>, cause: CompileError) {
        self.failures.lock().push(ResultEntry::Failure {
            page_uri: page_uri.into(),
            cause: Arc::new(cause),
        });
    }

    /// Snapshot of successful entries in completion order.
    pub fn successes(&self) -> Vec<ResultEntry> {
        self.successes.lock().clone()
    }

    /// Snapshot of failed entries in completion order.
    pub fn failures(&self) -> Vec<ResultEntry> {
        self.failures.lock().clone()
    }

    pub fn success_count(&self) -> usize {
        self.successes.lock().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }

    pub fn total(&self) -> usize {
        self.success_count() + self.failure_count()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    #[inline]
    pub fn has_error(&self) -> bool {
        !self.failures.lock().is_empty()
    }

    pub fn failure_code(&self) -> i32 {
        self.failure_code
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `Generation completed for [N] files with [E] errors in [T] milliseconds`
    pub fn summary(&self) -> String {
        format!(
            "Generation completed for [{}] files with [{}] errors in [{}] milliseconds",
            self.total(),
            self.failure_count(),
            self.elapsed().as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_counts() {
        let results = Results::default();
        assert!(results.is_empty());
        assert!(!results.has_error());

        results.add_success("/a.jsp", "org.apache.jsp.a_jsp");
        results.add_success("/b.jsp", "org.apache.jsp.b_jsp");
        results.add_failure("/c.jsp", anyhow::anyhow!("broken").into());

        assert_eq!(results.success_count(), 2);
        assert_eq!(results.failure_count(), 1);
        assert_eq!(results.total(), 3);
        assert!(results.has_error());
        assert_eq!(results.failure_code(), DEFAULT_FAILURE_CODE);
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let results = Results::new(3);
        results.add_success("/b.jsp", "B");
        results.add_success("/a.jsp", "A");

        let uris: Vec<_> = results.successes().iter().map(|e| e.page_uri().to_owned()).collect();
        assert_eq!(uris, ["/b.jsp", "/a.jsp"]);
        assert!(results.successes().iter().all(ResultEntry::is_success));
        assert_eq!(results.failure_code(), 3);
    }

    #[test]
    fn test_concurrent_appends() {
        let results = Results::default();
        (0..200).into_par_iter().for_each(|i| {
            if i % 10 == 0 {
                results.add_failure(format!("/{i}.jsp"), anyhow::anyhow!("bad").into());
            } else {
                results.add_success(format!("/{i}.jsp"), format!("p{i}"));
            }
        });

        assert_eq!(results.total(), 200);
        assert_eq!(results.failure_count(), 20);
    }

    #[test]
    fn test_summary_format() {
        let results = Results::default();
        results.add_success("/a.jsp", "A");
        let summary = results.summary();
        assert!(summary.starts_with("Generation completed for [1] files with [0] errors in ["));
        assert!(summary.ends_with("] milliseconds"));
    }
}
