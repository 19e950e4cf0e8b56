//! Resource and classpath resolution.
//!
//! Runs once before scheduling and produces everything the page compiler
//! reads: the page list, the classpath and the tag library map.
//!
//! ```text
//! app root ──► discover_pages() ──────────► Vec<Page>
//!          ──► resolve_classpath() ───────► ClassPath
//!          ──► discover_tag_libraries() ──► TaglibMap
//! ```

pub mod classpath;
pub mod pages;
pub mod taglib;

use crate::{descriptor::webxml, error::JspcError, log, logger::Logger};
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

pub use classpath::{ClassPath, ClassPathEntry, resolve_classpath, split_classpath};
pub use pages::{Page, discover_pages, locate_app_root};
pub use taglib::{DeclaredTaglib, TagLibrary, TaglibMap, discover_tag_libraries};

/// Everything resolution produces for one run.
#[derive(Debug)]
pub struct Resolved {
    pub pages: Vec<Page>,
    pub classpath: ClassPath,
    pub taglibs: TaglibMap,
}

/// Resolve pages, classpath and tag libraries for an application.
///
/// Explicit pages are kept in the given order; without them the tree is
/// scanned. Ending up with no page at all is a configuration error.
pub fn resolve(app_root: &Path, explicit: &[PathBuf], extra_classpath: &[PathBuf], logger: &Logger) -> Result<Resolved> {
    if !app_root.is_dir() {
        bail!(JspcError::config(format!(
            "Application root `{}` is not a readable directory",
            app_root.display()
        )));
    }

    let pages = if explicit.is_empty() {
        discover_pages(app_root)?
    } else {
        explicit
            .iter()
            .map(|page| Page::explicit(page, app_root))
            .collect::<Result<Vec<_>>>()?
    };
    if pages.is_empty() {
        bail!(JspcError::config(format!(
            "No JSP pages found under `{}`",
            app_root.display()
        )));
    }
    log!(logger, Debug; "resolve"; "{} pages to compile", pages.len());

    let classpath = resolve_classpath(app_root, extra_classpath, logger)?;
    let declared = webxml::declared_taglibs(classpath.app_root(), logger);
    let taglibs = discover_tag_libraries(&classpath, &declared, logger);
    log!(logger, Debug; "resolve"; "{} tag library keys", taglibs.len());

    Ok(Resolved {
        pages,
        classpath,
        taglibs,
    })
}
