//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

// ============================================================================
// [compile] Section Defaults
// ============================================================================

pub mod compile {
    use crate::{
        compiler::{DEFAULT_JAVA_ENCODING, DEFAULT_JAVA_VERSION, DEFAULT_URI_BASE},
        scheduler::{ThreadCount, results::DEFAULT_FAILURE_CODE},
    };
    use std::path::PathBuf;

    pub fn output() -> PathBuf {
        "target/jspc".into()
    }

    pub fn threads() -> ThreadCount {
        ThreadCount::Auto
    }

    pub fn failure_code() -> i32 {
        DEFAULT_FAILURE_CODE
    }

    pub fn command() -> Vec<String> {
        vec!["jasper-page".into()]
    }

    pub fn java_encoding() -> String {
        DEFAULT_JAVA_ENCODING.into()
    }

    pub fn java_version() -> String {
        DEFAULT_JAVA_VERSION.into()
    }

    pub fn uri_base() -> String {
        DEFAULT_URI_BASE.into()
    }
}

// ============================================================================
// [descriptor] Section Defaults
// ============================================================================

pub mod descriptor {
    use crate::descriptor::DEFAULT_ENCODING;

    pub fn encoding() -> String {
        DEFAULT_ENCODING.into()
    }
}
