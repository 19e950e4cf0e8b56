//! Generated artifact naming.
//!
//! Mirrors how Jasper names generated servlets, so a name derived here
//! matches what the page compiler produces when it does not report one:
//! `/admin/user-list.jsp` becomes `org.apache.jsp.admin.user_002dlist_jsp`.

use std::path::{Path, PathBuf};

/// Package used when no target package is configured
pub const DEFAULT_PACKAGE: &str = "org.apache.jsp";

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const", "continue",
    "default", "do", "double", "else", "enum", "extends", "false", "final", "finally", "float", "for", "goto",
    "if", "implements", "import", "instanceof", "int", "interface", "long", "native", "new", "null", "package",
    "private", "protected", "public", "return", "short", "static", "strictfp", "super", "switch",
    "synchronized", "this", "throw", "throws", "transient", "true", "try", "void", "volatile", "while",
];

#[inline]
fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

#[inline]
fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

pub fn is_java_keyword(word: &str) -> bool {
    JAVA_KEYWORDS.contains(&word)
}

/// `_` followed by the lowercase 4-digit hex code point.
fn mangle_char(ch: char) -> String {
    format!("_{:04x}", u32::from(ch))
}

/// Turn an arbitrary path component into a valid identifier.
///
/// `.` becomes `_`; `_` and any other illegal character are hex-escaped so
/// distinct inputs never collide.
pub fn make_java_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);

    if !name.chars().next().is_some_and(is_identifier_start) {
        out.push('_');
    }
    for ch in name.chars() {
        match ch {
            '.' => out.push('_'),
            '_' => out.push_str(&mangle_char(ch)),
            ch if is_identifier_part(ch) => out.push(ch),
            ch => out.push_str(&mangle_char(ch)),
        }
    }

    if is_java_keyword(&out) {
        out.push('_');
    }
    out
}

/// Dotted package suffix for the directories of a page URI.
pub fn make_java_package(dirs: &str) -> String {
    dirs.split('/')
        .filter(|segment| !segment.is_empty())
        .map(make_java_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

/// Fully qualified artifact name for a page URI.
pub fn derive_artifact_name(uri: &str, package: Option<&str>, class_name: Option<&str>) -> String {
    let relative = uri.trim_start_matches('/');
    let (dirs, file) = relative.rsplit_once('/').unwrap_or(("", relative));

    let base = package.filter(|p| !p.is_empty()).unwrap_or(DEFAULT_PACKAGE);
    let sub_package = make_java_package(dirs);
    let class = class_name.map_or_else(|| make_java_identifier(file), str::to_owned);

    if sub_package.is_empty() {
        format!("{base}.{class}")
    } else {
        format!("{base}.{sub_package}.{class}")
    }
}

/// Whether `name` is a dotted sequence of identifiers, e.g. `a.b.C`.
pub fn is_qualified_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_part)
        })
}

/// Intermediate source file generated for an artifact under `output_dir`.
pub fn artifact_source_path(output_dir: &Path, artifact: &str) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    for segment in artifact.split('.') {
        path.push(segment);
    }
    path.set_extension("java");
    path
}
