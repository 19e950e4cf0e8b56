//! Splicing generated entries into an existing `web.xml`.
//!
//! The entries go right before the first root child that must follow
//! servlet declarations in the descriptor schema, or at the end of the root
//! when there is none. Writing back over the original first renames it to
//! `web.xml.jspc-<YYYYmmddHHMMSS>`.

use super::{
    declared_encoding,
    dom::{Document, Element, Node},
    render_full, servlet_entries,
    webxml::{WEB_APP, WEB_XML},
    write_encoded,
};
use crate::{error::JspcError, log, logger::Logger, scheduler::ResultEntry};
use anyhow::{Result, bail};
use chrono::Local;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

/// Root children that may only appear after `<servlet>` declarations.
pub const STOP_ELEMENTS: &[&str] = &[
    "servlet-mapping",
    "session-config",
    "mime-mapping",
    "welcome-file-list",
    "error-page",
    "jsp-config",
    "taglib",
    "resource-env-ref",
    "resource-ref",
    "security-constraint",
    "login-config",
    "security-role",
    "env-entry",
    "ejb-ref",
    "ejb-local-ref",
];

const BEGIN_MARKER: &str = " Automatically generated web include ";
const END_MARKER: &str = " End of web include ";

/// Index of the first root child that generated entries must precede.
pub fn insertion_point(root: &Element) -> Option<usize> {
    root.children
        .iter()
        .position(|node| matches!(node, Node::Element(e) if STOP_ELEMENTS.contains(&e.local_name())))
}

/// `<name>` with its children on indented lines.
fn block(name: &str, children: [Element; 2]) -> Element {
    let mut element = Element::new(name);
    for child in children {
        element.children.push(Node::text("\n        "));
        element.children.push(Node::Element(child));
    }
    element.children.push(Node::text("\n    "));
    element
}

/// Insert markers and entries into the root, keeping its indentation.
pub fn splice(root: &mut Element, successes: &[ResultEntry]) {
    let entries = servlet_entries(successes);
    let mut nodes = Vec::with_capacity(entries.len() * 4 + 6);

    nodes.push(Node::text("\n\n    "));
    nodes.push(Node::comment(BEGIN_MARKER));
    nodes.push(Node::text("\n    "));

    for (artifact, _) in &entries {
        nodes.push(Node::Element(block(
            "servlet",
            [Element::with_text("servlet-name", artifact), Element::with_text("servlet-class", artifact)],
        )));
        nodes.push(Node::text("\n    "));
    }
    for (artifact, pattern) in &entries {
        nodes.push(Node::Element(block(
            "servlet-mapping",
            [Element::with_text("servlet-name", artifact), Element::with_text("url-pattern", pattern)],
        )));
        nodes.push(Node::text("\n    "));
    }

    nodes.push(Node::comment(END_MARKER));
    nodes.push(Node::text("\n\n    "));

    match insertion_point(root) {
        Some(index) => {
            root.children.splice(index..index, nodes);
        }
        None => root.children.extend(nodes),
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Rename `path` to a timestamped sibling and return the new name.
fn backup(path: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();

    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".jspc-{stamp}"));
    let mut target = path.with_file_name(&name);

    // never clobber an earlier backup taken within the same second
    let mut attempt = 1;
    while target.exists() {
        let mut numbered = name.clone();
        numbered.push(format!("-{attempt}"));
        target = path.with_file_name(numbered);
        attempt += 1;
    }

    fs::rename(path, &target).map_err(|e| JspcError::Io(path.to_path_buf(), e))?;
    Ok(target)
}

/// Merge entries into `<app_root>/WEB-INF/web.xml`.
///
/// Without an existing descriptor a full one is written instead, to
/// `destination` or to the application's `WEB-INF/web.xml`.
pub fn merge_into_web_xml(
    app_root: &Path,
    destination: Option<&Path>,
    successes: &[ResultEntry],
    encoding: &str,
    logger: &Logger,
) -> Result<PathBuf> {
    let web_xml = app_root.join(WEB_XML);
    let declared = declared_encoding(encoding)?;

    if !web_xml.is_file() {
        let target = destination.map_or_else(|| web_xml.clone(), Path::to_path_buf);
        log!(logger, Info; "descriptor"; "no {WEB_XML} to merge into, writing a full descriptor");
        write_encoded(&target, &render_full(successes, &declared), encoding)?;
        return Ok(target);
    }

    let bytes = fs::read(&web_xml).map_err(|e| JspcError::Io(web_xml.clone(), e))?;
    let mut doc = Document::from_bytes(&bytes).map_err(|e| match e.downcast::<quick_xml::Error>() {
        Ok(xml) => JspcError::Xml(web_xml.clone(), xml).into(),
        Err(other) => other.context(format!("Failed to parse {}", web_xml.display())),
    })?;

    if doc.root.local_name() != WEB_APP {
        bail!(JspcError::DescriptorStructure {
            path: web_xml,
            found: doc.root.name().to_owned(),
        });
    }

    splice(&mut doc.root, successes);
    let xml = doc.to_xml_string(&declared)?;

    let target = match destination {
        Some(dest) if !same_path(dest, &web_xml) => dest.to_path_buf(),
        _ => {
            let saved = backup(&web_xml)?;
            log!(logger, Info; "descriptor"; "original descriptor saved as {}", saved.display());
            web_xml
        }
    };

    write_encoded(&target, &xml, encoding)?;
    Ok(target)
}
