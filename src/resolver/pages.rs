//! Page discovery and URI computation.

use crate::error::JspcError;
use anyhow::{Result, bail};
use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Recognized template extensions
pub const PAGE_EXTENSIONS: &[&str] = &["jsp", "jspx"];

/// Directory marking the root of a web application
pub const WEB_INF: &str = "WEB-INF";

/// A template page to compile.
///
/// `uri` is the path relative to the application root with forward
/// slashes and a leading `/`, e.g. `/admin/index.jsp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub path: PathBuf,
    pub uri: String,
}

impl Page {
    /// Build a page from a file path, computing its URI against `app_root`.
    ///
    /// Both paths are canonicalized. A page outside the root keeps its
    /// normalized path as URI.
    pub fn from_path(path: &Path, app_root: &Path) -> Result<Self> {
        let path = fs::canonicalize(path).map_err(|e| JspcError::Io(path.to_path_buf(), e))?;
        let root = fs::canonicalize(app_root).unwrap_or_else(|_| app_root.to_path_buf());

        let uri = match path.strip_prefix(&root) {
            Ok(relative) => format!("/{}", normalize_separators(&relative.to_string_lossy())),
            Err(_) => normalize_separators(&path.to_string_lossy()),
        };

        Ok(Self { path, uri })
    }

    /// Resolve an explicitly configured page. Unreadable pages are fatal.
    pub fn explicit(path: &Path, app_root: &Path) -> Result<Self> {
        if !path.is_file() || fs::File::open(path).is_err() {
            bail!(JspcError::config(format!(
                "Invalid JSP file `{}`",
                path.display()
            )));
        }
        Self::from_path(path, app_root)
    }
}

/// Replace platform separators with `/`.
#[inline]
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Check whether a file name carries a template extension.
pub fn is_page(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PAGE_EXTENSIONS.contains(&ext))
}

/// Recursively collect every page under the application root.
///
/// Traversal order follows the filesystem and is not part of the contract:
/// callers must not depend on it for correctness.
pub fn discover_pages(app_root: &Path) -> Result<Vec<Page>> {
    if !app_root.is_dir() {
        bail!(JspcError::config(format!(
            "Application root `{}` is not a readable directory",
            app_root.display()
        )));
    }

    WalkDir::new(app_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_page(e.path()))
        .map(|e| Page::from_path(e.path(), app_root))
        .collect()
}

/// Locate the application root from a page path.
///
/// Walks up from the page until a directory containing `WEB-INF` is found.
pub fn locate_app_root(page: &Path) -> Result<PathBuf> {
    let start = fs::canonicalize(page).map_err(|e| JspcError::Io(page.to_path_buf(), e))?;

    start
        .ancestors()
        .skip(1)
        .find(|dir| dir.join(WEB_INF).is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            JspcError::config(format!(
                "The webapp path cannot be located using the first JSP file `{}`",
                page.display()
            ))
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn webapp() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("WEB-INF/classes")).unwrap();
        fs::create_dir_all(dir.path().join("admin")).unwrap();
        fs::write(dir.path().join("index.jsp"), "<html/>").unwrap();
        fs::write(dir.path().join("admin/panel.jspx"), "<jsp:root/>").unwrap();
        fs::write(dir.path().join("admin/notes.txt"), "not a page").unwrap();
        fs::write(dir.path().join("WEB-INF/hidden.jsp"), "<html/>").unwrap();
        dir
    }

    #[test]
    fn test_is_page() {
        assert!(is_page(Path::new("a/b.jsp")));
        assert!(is_page(Path::new("b.jspx")));
        assert!(!is_page(Path::new("b.jspf")));
        assert!(!is_page(Path::new("jsp")));
    }

    #[test]
    fn test_discover_pages_recursive() {
        let dir = webapp();
        let mut uris: Vec<_> = discover_pages(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.uri)
            .collect();
        uris.sort();
        assert_eq!(uris, ["/WEB-INF/hidden.jsp", "/admin/panel.jspx", "/index.jsp"]);
    }

    #[test]
    fn test_discover_pages_missing_root() {
        let err = discover_pages(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<JspcError>(),
            Some(JspcError::Configuration(_))
        ));
    }

    #[test]
    fn test_page_uri_relative_to_root() {
        let dir = webapp();
        let page = Page::from_path(&dir.path().join("admin/panel.jspx"), dir.path()).unwrap();
        assert_eq!(page.uri, "/admin/panel.jspx");
        assert!(page.path.is_absolute());
    }

    #[test]
    fn test_page_outside_root_keeps_path() {
        let dir = webapp();
        let other = TempDir::new().unwrap();
        let file = other.path().join("loose.jsp");
        fs::write(&file, "").unwrap();

        let page = Page::from_path(&file, dir.path()).unwrap();
        assert!(page.uri.ends_with("/loose.jsp"));
        assert!(!page.uri.contains('\\'));
    }

    #[test]
    fn test_explicit_page_must_exist() {
        let dir = webapp();
        let err = Page::explicit(&dir.path().join("missing.jsp"), dir.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid JSP file"));
    }

    #[test]
    fn test_locate_app_root() {
        let dir = webapp();
        let root = locate_app_root(&dir.path().join("admin/panel.jspx")).unwrap();
        assert_eq!(root, fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_locate_app_root_fails_without_web_inf() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("page.jsp");
        fs::write(&file, "").unwrap();
        assert!(locate_app_root(&file).is_err());
    }

    #[test]
    fn test_normalize_separators() {
        assert_eq!(normalize_separators(r"admin\panel.jsp"), "admin/panel.jsp");
    }
}
