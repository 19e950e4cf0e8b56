//! `[app]` section configuration.

use educe::Educe;
use serde::Deserialize;
use std::path::PathBuf;

/// `[app]` section in jspc.toml - the web application to precompile.
///
/// # Example
/// ```toml
/// [app]
/// root = "src/main/webapp"
/// pages = ["src/main/webapp/index.jsp"]
/// classpath = ["lib/servlet-api.jar"]
/// ```
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application root. Located from the first page when unset.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Explicit pages in compile order. Empty means every page under root.
    #[serde(default)]
    pub pages: Vec<PathBuf>,

    /// Extra classpath entries, searched after `WEB-INF/classes` and `WEB-INF/lib`.
    #[serde(default)]
    pub classpath: Vec<PathBuf>,
}
