//! Error types.
//!
//! `JspcError` covers run-level failures; `CompileError` is the cause stored
//! in a failure entry for a single page.

use std::{path::PathBuf, process::ExitStatus};
use thiserror::Error;

/// Run-level errors
#[derive(Debug, Error)]
pub enum JspcError {
    /// Invalid paths, worker count, output selection, or no pages to compile.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("This precompiler instance has already been executed")]
    AlreadyExecuted,

    #[error("{failed} of {total} pages failed to compile")]
    Aggregate { failed: usize, total: usize },

    #[error("Invalid descriptor `{path}` to add mappings: expected <web-app> root, found <{found}>")]
    DescriptorStructure { path: PathBuf, found: String },

    #[error("IO error when accessing `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("XML error in `{0}`")]
    Xml(PathBuf, #[source] quick_xml::Error),

    #[error("Unknown character encoding `{0}`")]
    Encoding(String),
}

impl JspcError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Why a single page failed to compile
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Failed to execute `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed with {status}\n{output}")]
    Exit {
        command: String,
        status: ExitStatus,
        output: String,
    },

    #[error("Page compiler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_jspc_error_display() {
        let io_err = JspcError::Io(
            PathBuf::from("web.xml"),
            Error::new(ErrorKind::NotFound, "file not found"),
        );
        let display = format!("{io_err}");
        assert!(display.contains("IO error"));
        assert!(display.contains("web.xml"));

        let aggregate = JspcError::Aggregate { failed: 1, total: 5 };
        assert_eq!(format!("{aggregate}"), "1 of 5 pages failed to compile");

        let structure = JspcError::DescriptorStructure {
            path: PathBuf::from("WEB-INF/web.xml"),
            found: "beans".into(),
        };
        assert!(format!("{structure}").contains("<beans>"));
    }

    #[test]
    fn test_compile_error_from_anyhow() {
        let err: CompileError = anyhow::anyhow!("syntax error at line 3").into();
        assert_eq!(format!("{err}"), "syntax error at line 3");
    }
}
