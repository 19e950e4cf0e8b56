//! Classpath assembly and resource lookup.
//!
//! The resolved `ClassPath` plays the role of the class-loading context
//! handed to the page compiler: an ordered list of directories and archives
//! plus lookups for web resources and `META-INF` content inside them.

use crate::{log, logger::Logger, resolver::pages::normalize_separators};
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    env,
    ffi::OsString,
    fs::{self, File},
    io::Read,
    path::{Path, PathBuf},
};
use zip::{ZipArchive, result::ZipError};

/// Application classes directory, relative to the root
pub const CLASSES_DIR: &str = "WEB-INF/classes";
/// Application library directory, relative to the root
pub const LIB_DIR: &str = "WEB-INF/lib";
/// Prefix for web resources packaged inside classpath entries
pub const RESOURCES_PREFIX: &str = "META-INF/resources";

/// A single classpath element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPathEntry {
    /// Exploded classes directory
    Directory(PathBuf),
    /// Packaged archive (jar/zip)
    Archive(PathBuf),
}

impl ClassPathEntry {
    pub fn path(&self) -> &Path {
        match self {
            Self::Directory(path) | Self::Archive(path) => path,
        }
    }

    fn from_existing(path: PathBuf) -> Self {
        if path.is_dir() {
            Self::Directory(path)
        } else {
            Self::Archive(path)
        }
    }
}

/// Ordered classpath scoped to one application.
#[derive(Debug, Clone)]
pub struct ClassPath {
    app_root: PathBuf,
    entries: Vec<ClassPathEntry>,
}

/// Split a platform path-separator list, dropping empty segments.
pub fn split_classpath(classpath: &str) -> Vec<PathBuf> {
    env::split_paths(classpath)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// Build the effective classpath for an application.
///
/// Order: `extra` entries (missing ones are logged and skipped), then
/// `WEB-INF/classes`, then every `*.jar` directly under `WEB-INF/lib`.
/// Jar order follows the directory listing and carries no meaning.
pub fn resolve_classpath(app_root: &Path, extra: &[PathBuf], logger: &Logger) -> Result<ClassPath> {
    let mut entries = Vec::with_capacity(extra.len() + 8);

    for entry in extra {
        match fs::canonicalize(entry) {
            Ok(path) => entries.push(ClassPathEntry::from_existing(path)),
            Err(_) => log!(logger, Warn; "classpath"; "invalid classpath entry: {}", entry.display()),
        }
    }

    let classes = app_root.join(CLASSES_DIR);
    if classes.is_dir() {
        entries.push(ClassPathEntry::Directory(canonical(&classes)));
    }

    let lib = app_root.join(LIB_DIR);
    if lib.is_dir() {
        let listing = fs::read_dir(&lib)
            .with_context(|| format!("Failed to list {}", lib.display()))?;
        for dir_entry in listing.filter_map(Result::ok) {
            let path = dir_entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "jar") {
                entries.push(ClassPathEntry::Archive(canonical(&path)));
            }
        }
    }

    log!(logger, Trace; "classpath"; "entries configured: {:?}", entries);

    Ok(ClassPath {
        app_root: canonical(app_root),
        entries,
    })
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl ClassPath {
    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    pub fn entries(&self) -> &[ClassPathEntry] {
        &self.entries
    }

    /// Platform-formatted search path, e.g. `a.jar:b.jar` on unix.
    pub fn to_search_path(&self) -> OsString {
        env::join_paths(self.entries.iter().map(ClassPathEntry::path)).unwrap_or_else(|_| {
            let mut joined = OsString::new();
            for (i, entry) in self.entries.iter().enumerate() {
                if i > 0 {
                    joined.push(if cfg!(windows) { ";" } else { ":" });
                }
                joined.push(entry.path());
            }
            joined
        })
    }

    /// Express a filesystem path as a web path when it lives under the root.
    ///
    /// `/srv/app/WEB-INF/lib/a.jar` becomes `/WEB-INF/lib/a.jar`; anything
    /// outside the root is returned as-is.
    pub fn web_location(&self, path: &Path) -> String {
        match path.strip_prefix(&self.app_root) {
            Ok(relative) => format!("/{}", normalize_separators(&relative.to_string_lossy())),
            Err(_) => normalize_separators(&path.to_string_lossy()),
        }
    }

    /// Fetch a web resource such as `/WEB-INF/tlds/app.tld`.
    ///
    /// Looks in the application root first, then under
    /// `META-INF/resources` of every classpath entry in order.
    pub fn web_resource(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let relative = path.trim_start_matches('/');

        let local = self.app_root.join(relative);
        if local.is_file() {
            let bytes = fs::read(&local).with_context(|| format!("Failed to read {}", local.display()))?;
            return Ok(Some(bytes));
        }

        let packaged = format!("{RESOURCES_PREFIX}/{relative}");
        for entry in &self.entries {
            let found = match entry {
                ClassPathEntry::Directory(dir) => {
                    let file = dir.join(&packaged);
                    if file.is_file() {
                        Some(fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?)
                    } else {
                        None
                    }
                }
                ClassPathEntry::Archive(archive) => read_archive_entry(archive, &packaged)?,
            };
            if found.is_some() {
                return Ok(found);
            }
        }

        Ok(None)
    }
}

/// Read one named entry from an archive. `None` when the entry is absent.
pub fn read_archive_entry(archive: &Path, name: &str) -> Result<Option<Vec<u8>>> {
    let mut zip = open_archive(archive)?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read `{name}` from {}", archive.display()));
        }
    };

    let mut bytes = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or_default());
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read `{name}` from {}", archive.display()))?;
    Ok(Some(bytes))
}

/// Read every archive entry whose full name matches `pattern`.
///
/// Entries that cannot be read are returned as errors so the caller can log
/// and skip them individually.
pub fn read_matching_entries(archive: &Path, pattern: &Regex) -> Result<Vec<(String, Result<Vec<u8>>)>> {
    let mut zip = open_archive(archive)?;
    let names: Vec<String> = zip
        .file_names()
        .filter(|name| pattern.is_match(name))
        .map(str::to_owned)
        .collect();

    let matches = names
        .into_iter()
        .map(|name| {
            let read = zip
                .by_name(&name)
                .map_err(anyhow::Error::from)
                .and_then(|mut entry| {
                    let mut bytes = Vec::new();
                    entry.read_to_end(&mut bytes)?;
                    Ok(bytes)
                });
            (name, read)
        })
        .collect();

    Ok(matches)
}

fn open_archive(archive: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    ZipArchive::new(file).with_context(|| format!("Invalid archive {}", archive.display()))
}
