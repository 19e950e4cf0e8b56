//! Deployment descriptor output.
//!
//! Describes every successfully compiled page as a `<servlet>` plus a
//! `<servlet-mapping>`, in one of four shapes:
//!
//! | Mode       | Output                                                |
//! |------------|-------------------------------------------------------|
//! | `include`  | bare entries between comment markers, no root element |
//! | `fragment` | standalone `web-fragment.xml`                         |
//! | `full`     | standalone `web.xml`                                  |
//! | `merge`    | entries spliced into the application's `web.xml`      |
//!
//! # Example
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <web-app ...>
//!     <!-- Automatically generated web.xml -->
//!
//!     <servlet>
//!         <servlet-name>org.apache.jsp.index_jsp</servlet-name>
//!         <servlet-class>org.apache.jsp.index_jsp</servlet-class>
//!     </servlet>
//!
//!     <servlet-mapping>
//!         <servlet-name>org.apache.jsp.index_jsp</servlet-name>
//!         <url-pattern>/index.jsp</url-pattern>
//!     </servlet-mapping>
//!
//! </web-app>
//! ```

pub mod dom;
pub mod merge;
pub mod webxml;

use crate::{error::JspcError, log, logger::Logger, resolver::pages::normalize_separators, scheduler::ResultEntry};
use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use serde::Deserialize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Constants
// ============================================================================

/// Default descriptor encoding
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Name declared by generated web fragments
pub const FRAGMENT_NAME: &str = "jspc";

const JAVAEE_NS: &str = "http://xmlns.jcp.org/xml/ns/javaee";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

// ============================================================================
// Output Spec
// ============================================================================

/// Shape of the generated descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Include,
    Fragment,
    Full,
    Merge,
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Include => "include",
            Self::Fragment => "fragment",
            Self::Full => "full",
            Self::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// Where and how to write the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorOutputSpec {
    pub mode: OutputMode,
    /// Required for every mode but `merge`, which defaults to the
    /// application's own `WEB-INF/web.xml`
    pub destination: Option<PathBuf>,
    /// Encoding label, e.g. `UTF-8` or `ISO-8859-1`
    pub encoding: String,
}

impl DescriptorOutputSpec {
    pub fn new(mode: OutputMode, destination: Option<PathBuf>) -> Self {
        Self {
            mode,
            destination,
            encoding: DEFAULT_ENCODING.to_owned(),
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Check the destination and encoding before any page is compiled.
    pub fn validate(&self) -> Result<()> {
        resolve_encoding(&self.encoding)?;
        if self.mode != OutputMode::Merge && self.destination.is_none() {
            bail!(JspcError::config(format!("Output mode `{}` requires a destination file", self.mode)));
        }
        Ok(())
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Look up an encoding by its WHATWG label.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| JspcError::Encoding(label.to_owned()).into())
}

/// Label to declare for text encoded with `label`.
///
/// Encodings that cannot be produced (UTF-16) are written as UTF-8 and
/// declared as such.
pub fn declared_encoding(label: &str) -> Result<String> {
    let encoding = resolve_encoding(label)?;
    if encoding.output_encoding() == encoding {
        Ok(label.trim().to_owned())
    } else {
        Ok(encoding.output_encoding().name().to_owned())
    }
}

/// Encode text; unmappable characters become numeric character references.
pub fn encode(text: &str, label: &str) -> Result<Vec<u8>> {
    let encoding = resolve_encoding(label)?;
    let (bytes, _, _) = encoding.encode(text);
    Ok(bytes.into_owned())
}

fn write_encoded(path: &Path, text: &str, label: &str) -> Result<()> {
    let bytes = encode(text, label)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, bytes).with_context(|| format!("Failed to write descriptor to {}", path.display()))
}

// ============================================================================
// Rendering
// ============================================================================

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// `(artifact, url pattern)` for every success, in completion order.
pub fn servlet_entries(successes: &[ResultEntry]) -> Vec<(&str, String)> {
    successes
        .iter()
        .filter_map(|entry| match entry {
            ResultEntry::Success { page_uri, artifact } => Some((artifact.as_str(), normalize_separators(page_uri))),
            ResultEntry::Failure { .. } => None,
        })
        .collect()
}

/// All `<servlet>` blocks, a blank line, then all `<servlet-mapping>` blocks.
fn render_entries(xml: &mut String, successes: &[ResultEntry]) {
    let entries = servlet_entries(successes);

    for (artifact, _) in &entries {
        let name = escape_xml(artifact);
        xml.push_str("    <servlet>\n");
        xml.push_str(&format!("        <servlet-name>{name}</servlet-name>\n"));
        xml.push_str(&format!("        <servlet-class>{name}</servlet-class>\n"));
        xml.push_str("    </servlet>\n");
    }
    xml.push('\n');
    for (artifact, pattern) in &entries {
        xml.push_str("    <servlet-mapping>\n");
        xml.push_str(&format!("        <servlet-name>{}</servlet-name>\n", escape_xml(artifact)));
        xml.push_str(&format!("        <url-pattern>{}</url-pattern>\n", escape_xml(pattern)));
        xml.push_str("    </servlet-mapping>\n");
    }
}

/// Bare entries for splicing by another tool. No XML declaration.
pub fn render_include(successes: &[ResultEntry]) -> String {
    let mut xml = String::with_capacity(256 + successes.len() * 256);
    xml.push_str("<!-- Automatically generated web include -->\n\n");
    render_entries(&mut xml, successes);
    xml.push_str("\n<!-- End of web include -->\n");
    xml
}

/// Standalone `web-fragment.xml`.
pub fn render_fragment(successes: &[ResultEntry], encoding: &str) -> String {
    let mut xml = String::with_capacity(512 + successes.len() * 256);
    xml.push_str(&format!(r#"<?xml version="1.0" encoding="{encoding}"?>"#));
    xml.push('\n');
    xml.push_str(&format!(r#"<web-fragment xmlns="{JAVAEE_NS}" xmlns:xsi="{XSI_NS}""#));
    xml.push('\n');
    xml.push_str(&format!(
        r#"              xsi:schemaLocation="{JAVAEE_NS} {JAVAEE_NS}/web-fragment_4_0.xsd""#
    ));
    xml.push('\n');
    xml.push_str(r#"              version="4.0" metadata-complete="true">"#);
    xml.push('\n');
    xml.push_str(&format!("    <name>{FRAGMENT_NAME}</name>\n"));
    xml.push_str("    <!-- Automatically generated web-fragment.xml -->\n\n");
    render_entries(&mut xml, successes);
    xml.push_str("\n</web-fragment>\n");
    xml
}

/// Standalone `web.xml`.
pub fn render_full(successes: &[ResultEntry], encoding: &str) -> String {
    let mut xml = String::with_capacity(512 + successes.len() * 256);
    xml.push_str(&format!(r#"<?xml version="1.0" encoding="{encoding}"?>"#));
    xml.push('\n');
    xml.push_str(&format!(r#"<web-app xmlns="{JAVAEE_NS}" xmlns:xsi="{XSI_NS}""#));
    xml.push('\n');
    xml.push_str(&format!(r#"              xsi:schemaLocation="{JAVAEE_NS} {JAVAEE_NS}/web-app_4_0.xsd""#));
    xml.push('\n');
    xml.push_str(r#"              version="4.0">"#);
    xml.push('\n');
    xml.push_str("    <!-- Automatically generated web.xml -->\n\n");
    render_entries(&mut xml, successes);
    xml.push_str("\n</web-app>\n");
    xml
}

// ============================================================================
// Public API
// ============================================================================

/// Write the descriptor for `successes` and return the file written.
pub fn write_descriptor(
    spec: &DescriptorOutputSpec,
    app_root: &Path,
    successes: &[ResultEntry],
    logger: &Logger,
) -> Result<PathBuf> {
    let declared = declared_encoding(&spec.encoding)?;

    let path = match spec.mode {
        OutputMode::Merge => merge::merge_into_web_xml(app_root, spec.destination.as_deref(), successes, &spec.encoding, logger)?,
        mode => {
            let Some(path) = spec.destination.clone() else {
                bail!(JspcError::config(format!("Output mode `{mode}` requires a destination file")));
            };
            let xml = match mode {
                OutputMode::Include => render_include(successes),
                OutputMode::Fragment => render_fragment(successes, &declared),
                _ => render_full(successes, &declared),
            };
            write_encoded(&path, &xml, &spec.encoding)?;
            path
        }
    };

    log!(logger, Info; "descriptor"; "{} written to {}", spec.mode, path.display());
    Ok(path)
}
