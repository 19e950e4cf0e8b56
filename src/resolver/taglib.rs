//! Tag library descriptor discovery.
//!
//! Sources are scanned in a fixed order and a key that is already present
//! is never overwritten, so earlier sources take precedence:
//!
//! 1. taglibs declared in `WEB-INF/web.xml`
//! 2. `*.tld` files anywhere under `WEB-INF`
//! 3. `META-INF/**.tld` inside classpath directories and archives

use crate::{
    descriptor::dom::{Document, Element},
    log,
    logger::Logger,
    resolver::{
        classpath::{ClassPath, ClassPathEntry, read_archive_entry, read_matching_entries},
        pages::{WEB_INF, normalize_separators},
    },
};
use anyhow::{Result, anyhow, bail};
use regex::Regex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fs,
    path::Path,
    sync::{Arc, LazyLock},
};
use walkdir::WalkDir;

/// TLD entries inside archives
static RE_ARCHIVE_TLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^META-INF/.*\.tld$").unwrap());

/// Entry name of the single descriptor a taglib jar may be referenced by
pub const JAR_TAGLIB_ENTRY: &str = "META-INF/taglib.tld";

/// Exploded `META-INF` directories are searched this deep for `*.tld`
const META_INF_SCAN_DEPTH: usize = 2;

// ============================================================================
// Model
// ============================================================================

/// A `<taglib>` reference declared by the application descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredTaglib {
    pub uri: String,
    pub location: String,
}

/// Parsed tag library metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagLibrary {
    pub uri: Option<String>,
    pub short_name: Option<String>,
    pub tlib_version: Option<String>,
    pub jsp_version: Option<String>,
    pub info: Option<String>,
    pub tags: Vec<TagInfo>,
    pub tag_files: Vec<TagFileInfo>,
    pub functions: Vec<FunctionInfo>,
    pub listeners: Vec<String>,
    pub validator: Option<ValidatorInfo>,
    /// Web path of the descriptor, or of the archive containing it
    pub location: String,
    /// Entry name when the descriptor lives inside an archive
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagInfo {
    pub name: String,
    pub tag_class: Option<String>,
    pub tei_class: Option<String>,
    pub body_content: String,
    pub dynamic_attributes: bool,
    pub attributes: Vec<AttributeInfo>,
    pub variables: Vec<VariableInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttributeInfo {
    pub name: String,
    pub required: bool,
    pub rtexprvalue: bool,
    pub fragment: bool,
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub deferred_value: Option<String>,
    pub deferred_method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableInfo {
    pub name_given: Option<String>,
    pub name_from_attribute: Option<String>,
    pub variable_class: String,
    pub declare: bool,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagFileInfo {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub function_class: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatorInfo {
    pub validator_class: String,
    pub init_params: BTreeMap<String, String>,
}

/// Where a descriptor was read from; decides its lookup keys.
#[derive(Debug, Clone, Copy)]
pub enum TldSource<'a> {
    /// A file reachable by web path, e.g. `/WEB-INF/tlds/app.tld`
    File { location: &'a str },
    /// An entry inside an archive, with the archive's web location
    Archive { location: &'a str, entry: &'a str },
}

fn parse_bool(text: Option<String>, default: bool) -> bool {
    text.map_or(default, |t| matches!(t.to_ascii_lowercase().as_str(), "true" | "yes"))
}

impl TagLibrary {
    /// Parse descriptor bytes. The root element must be `<taglib>`.
    pub fn parse(bytes: &[u8], source: TldSource<'_>) -> Result<Self> {
        let doc = Document::from_bytes(bytes)?;
        let root = &doc.root;
        if root.local_name() != "taglib" {
            bail!("Expected <taglib> root, found <{}>", root.name());
        }

        let (location, path) = match source {
            TldSource::File { location } => (location.to_owned(), None),
            TldSource::Archive { location, entry } => (location.to_owned(), Some(entry.to_owned())),
        };

        // JSP 1.1 descriptors use the older element names as fallback
        Ok(Self {
            uri: root.child_text("uri"),
            short_name: first_child_text(root, &["short-name", "shortname"]),
            tlib_version: first_child_text(root, &["tlib-version", "tlibversion"]),
            jsp_version: first_child_text(root, &["jsp-version", "jspversion"])
                .or_else(|| root.attribute("version")),
            info: first_child_text(root, &["description", "info"]),
            tags: root.children_named("tag").map(parse_tag).collect(),
            tag_files: root
                .children_named("tag-file")
                .map(|e| TagFileInfo {
                    name: e.child_text("name").unwrap_or_default(),
                    path: e.child_text("path").unwrap_or_default(),
                })
                .collect(),
            functions: root
                .children_named("function")
                .map(|e| FunctionInfo {
                    name: e.child_text("name").unwrap_or_default(),
                    function_class: e.child_text("function-class").unwrap_or_default(),
                    signature: e.child_text("function-signature").unwrap_or_default(),
                })
                .collect(),
            listeners: root
                .children_named("listener")
                .filter_map(|e| e.child_text("listener-class"))
                .collect(),
            validator: root.child("validator").map(|e| ValidatorInfo {
                validator_class: e.child_text("validator-class").unwrap_or_default(),
                init_params: e
                    .children_named("init-param")
                    .filter_map(|p| {
                        let name = p.child_text("param-name")?;
                        Some((name, p.child_text("param-value").unwrap_or_default()))
                    })
                    .collect(),
            }),
            location,
            path,
        })
    }
}

fn first_child_text(element: &Element, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| element.child_text(name))
}

fn parse_tag(tag: &Element) -> TagInfo {
    TagInfo {
        name: tag.child_text("name").unwrap_or_default(),
        tag_class: first_child_text(tag, &["tag-class", "tagclass"]),
        tei_class: first_child_text(tag, &["tei-class", "teiclass"]),
        body_content: first_child_text(tag, &["body-content", "bodycontent"]).unwrap_or_else(|| "JSP".into()),
        dynamic_attributes: parse_bool(tag.child_text("dynamic-attributes"), false),
        attributes: tag
            .children_named("attribute")
            .map(|a| AttributeInfo {
                name: a.child_text("name").unwrap_or_default(),
                required: parse_bool(a.child_text("required"), false),
                rtexprvalue: parse_bool(a.child_text("rtexprvalue"), false),
                fragment: parse_bool(a.child_text("fragment"), false),
                type_name: a.child_text("type"),
                deferred_value: a
                    .child("deferred-value")
                    .map(|d| d.child_text("type").unwrap_or_else(|| "java.lang.Object".into())),
                deferred_method: a
                    .child("deferred-method")
                    .map(|d| d.child_text("method-signature").unwrap_or_else(|| "void method()".into())),
            })
            .collect(),
        variables: tag
            .children_named("variable")
            .map(|v| VariableInfo {
                name_given: v.child_text("name-given"),
                name_from_attribute: v.child_text("name-from-attribute"),
                variable_class: v.child_text("variable-class").unwrap_or_else(|| "java.lang.String".into()),
                declare: parse_bool(v.child_text("declare"), true),
                scope: v.child_text("scope").unwrap_or_else(|| "NESTED".into()),
            })
            .collect(),
    }
}

// ============================================================================
// Map
// ============================================================================

/// Tag libraries by lookup key. First insertion of a key wins.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct TaglibMap {
    entries: BTreeMap<String, Arc<TagLibrary>>,
}

impl TaglibMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key is already taken. Returns whether it was inserted.
    pub fn insert_first(&mut self, key: impl Into<String>, library: Arc<TagLibrary>) -> bool {
        let key = key.into();
        if key.is_empty() || self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, library);
        true
    }

    /// Register a parsed library under every key its source grants.
    ///
    /// Always its `<uri>`; a file descriptor also by its location; an
    /// archive descriptor by the archive location only for `META-INF/taglib.tld`.
    pub fn register(&mut self, library: TagLibrary) -> Vec<String> {
        let library = Arc::new(library);
        let mut keys = Vec::with_capacity(2);

        if let Some(uri) = &library.uri {
            keys.push(uri.clone());
        }
        match &library.path {
            None => keys.push(library.location.clone()),
            Some(entry) if entry == JAR_TAGLIB_ENTRY => keys.push(library.location.clone()),
            Some(_) => {}
        }

        keys.into_iter()
            .filter(|key| self.insert_first(key.clone(), Arc::clone(&library)))
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<&Arc<TagLibrary>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Discover every tag library visible to the application.
///
/// Parse failures are logged and skipped; discovery itself never fails.
pub fn discover_tag_libraries(classpath: &ClassPath, declared: &[DeclaredTaglib], logger: &Logger) -> TaglibMap {
    let mut map = TaglibMap::new();

    scan_declared(classpath, declared, &mut map, logger);
    scan_web_inf(classpath, &mut map, logger);
    scan_classpath(classpath, &mut map, logger);

    log!(logger, Trace; "taglib"; "tag libraries found: {:?}", map.keys().collect::<Vec<_>>());
    map
}

/// Parse and register, logging failures under `source_kind`.
fn add_library(
    map: &mut TaglibMap,
    bytes: Result<Vec<u8>>,
    source: TldSource<'_>,
    source_kind: &str,
    logger: &Logger,
) -> Option<Vec<String>> {
    let display = match source {
        TldSource::File { location } => location.to_owned(),
        TldSource::Archive { location, entry } => format!("{location}!/{entry}"),
    };

    match bytes.and_then(|bytes| TagLibrary::parse(&bytes, source)) {
        Ok(library) => {
            let keys = map.register(library);
            log!(logger, Debug; "taglib"; "{display} registered as {keys:?}");
            Some(keys)
        }
        Err(e) => {
            log!(logger, Warn; "taglib"; "error parsing TLD file from {source_kind} {display}: {e:#}");
            None
        }
    }
}

/// Declared locations are web paths; relative ones resolve against `/WEB-INF/`.
fn declared_web_path(location: &str) -> String {
    let location = normalize_separators(location.trim());
    if location.starts_with('/') {
        location
    } else {
        format!("/{WEB_INF}/{location}")
    }
}

fn scan_declared(classpath: &ClassPath, declared: &[DeclaredTaglib], map: &mut TaglibMap, logger: &Logger) {
    for taglib in declared {
        let location = declared_web_path(&taglib.location);

        // a declared jar stands for its META-INF/taglib.tld
        let added = if location.ends_with(".jar") {
            let archive = classpath.app_root().join(location.trim_start_matches('/'));
            let bytes = read_archive_entry(&archive, JAR_TAGLIB_ENTRY)
                .and_then(|found| found.ok_or_else(|| anyhow!("no {JAR_TAGLIB_ENTRY} in archive")));
            let source = TldSource::Archive { location: &location, entry: JAR_TAGLIB_ENTRY };
            add_library(map, bytes, source, "web.xml taglib", logger)
        } else {
            let bytes = classpath
                .web_resource(&location)
                .and_then(|found| found.ok_or_else(|| anyhow!("resource not found")));
            add_library(map, bytes, TldSource::File { location: &location }, "web.xml taglib", logger)
        };

        // the declared uri resolves to the descriptor it points at
        if added.is_some()
            && let Some(library) = map.get(&location).cloned()
        {
            map.insert_first(taglib.uri.clone(), library);
        }
    }
}

fn scan_web_inf(classpath: &ClassPath, map: &mut TaglibMap, logger: &Logger) {
    let web_inf = classpath.app_root().join(WEB_INF);
    if !web_inf.is_dir() {
        return;
    }

    let mut files: Vec<_> = WalkDir::new(&web_inf)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && has_tld_extension(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();

    for file in files {
        let location = classpath.web_location(&file);
        let bytes = fs::read(&file).map_err(anyhow::Error::from);
        add_library(map, bytes, TldSource::File { location: &location }, "WEB-INF directory", logger);
    }
}

fn scan_classpath(classpath: &ClassPath, map: &mut TaglibMap, logger: &Logger) {
    for entry in classpath.entries() {
        match entry {
            ClassPathEntry::Directory(dir) => {
                let meta_inf = dir.join("META-INF");
                if !meta_inf.is_dir() {
                    continue;
                }
                let files = WalkDir::new(&meta_inf)
                    .max_depth(META_INF_SCAN_DEPTH)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file() && has_tld_extension(e.path()));
                for file in files {
                    let location = classpath.web_location(file.path());
                    let bytes = fs::read(file.path()).map_err(anyhow::Error::from);
                    add_library(map, bytes, TldSource::File { location: &location }, "classpath directory", logger);
                }
            }
            ClassPathEntry::Archive(archive) => {
                let location = classpath.web_location(archive);
                match read_matching_entries(archive, &RE_ARCHIVE_TLD) {
                    Ok(matches) => {
                        for (name, bytes) in matches {
                            let source = TldSource::Archive { location: &location, entry: &name };
                            add_library(map, bytes, source, "jar file", logger);
                        }
                    }
                    Err(e) => log!(logger, Warn; "taglib"; "cannot scan {location} for TLD files: {e:#}"),
                }
            }
        }
    }
}

fn has_tld_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "tld")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::classpath::{resolve_classpath, tests::write_jar};
    use tempfile::TempDir;

    fn tld(uri: &str, short_name: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<taglib xmlns="http://java.sun.com/xml/ns/javaee" version="2.1">
    <tlib-version>1.0</tlib-version>
    <short-name>{short_name}</short-name>
    <uri>{uri}</uri>
    <tag>
        <name>hello</name>
        <tag-class>com.example.HelloTag</tag-class>
        <body-content>empty</body-content>
        <attribute>
            <name>who</name>
            <required>true</required>
            <rtexprvalue>true</rtexprvalue>
        </attribute>
    </tag>
    <function>
        <name>upper</name>
        <function-class>com.example.Fn</function-class>
        <function-signature>java.lang.String upper(java.lang.String)</function-signature>
    </function>
</taglib>
"#
        )
    }

    #[test]
    fn test_parse_tld() {
        let lib = TagLibrary::parse(
            tld("http://example.com/tags", "ex").as_bytes(),
            TldSource::File { location: "/WEB-INF/ex.tld" },
        )
        .unwrap();

        assert_eq!(lib.uri.as_deref(), Some("http://example.com/tags"));
        assert_eq!(lib.short_name.as_deref(), Some("ex"));
        assert_eq!(lib.jsp_version.as_deref(), Some("2.1"));
        assert_eq!(lib.tags.len(), 1);

        let tag = &lib.tags[0];
        assert_eq!(tag.name, "hello");
        assert_eq!(tag.tag_class.as_deref(), Some("com.example.HelloTag"));
        assert_eq!(tag.body_content, "empty");
        assert!(tag.attributes[0].required);
        assert_eq!(lib.functions[0].function_class, "com.example.Fn");
    }

    #[test]
    fn test_parse_legacy_tld() {
        let legacy = r#"<taglib>
            <tlibversion>1.0</tlibversion>
            <jspversion>1.1</jspversion>
            <shortname>old</shortname>
            <tag><name>t</name><tagclass>com.example.Old</tagclass></tag>
        </taglib>"#;
        let lib = TagLibrary::parse(legacy.as_bytes(), TldSource::File { location: "/x.tld" }).unwrap();
        assert_eq!(lib.short_name.as_deref(), Some("old"));
        assert_eq!(lib.jsp_version.as_deref(), Some("1.1"));
        assert_eq!(lib.tags[0].tag_class.as_deref(), Some("com.example.Old"));
        assert_eq!(lib.tags[0].body_content, "JSP");
    }

    #[test]
    fn test_parse_rejects_other_roots() {
        let err = TagLibrary::parse(b"<web-app/>", TldSource::File { location: "/x.tld" }).unwrap_err();
        assert!(err.to_string().contains("<taglib>"));
    }

    #[test]
    fn test_register_keys() {
        let mut map = TaglibMap::new();

        let file = TagLibrary { uri: Some("u1".into()), location: "/WEB-INF/a.tld".into(), ..Default::default() };
        assert_eq!(map.register(file), ["u1", "/WEB-INF/a.tld"]);

        let nested = TagLibrary {
            uri: Some("u2".into()),
            location: "/WEB-INF/lib/a.jar".into(),
            path: Some("META-INF/sub/b.tld".into()),
            ..Default::default()
        };
        assert_eq!(map.register(nested), ["u2"]);

        let main = TagLibrary {
            uri: Some("u3".into()),
            location: "/WEB-INF/lib/a.jar".into(),
            path: Some(JAR_TAGLIB_ENTRY.into()),
            ..Default::default()
        };
        assert_eq!(map.register(main), ["u3", "/WEB-INF/lib/a.jar"]);
    }

    #[test]
    fn test_insert_first_wins() {
        let mut map = TaglibMap::new();
        let a = Arc::new(TagLibrary { short_name: Some("a".into()), ..Default::default() });
        let b = Arc::new(TagLibrary { short_name: Some("b".into()), ..Default::default() });

        assert!(map.insert_first("k", a));
        assert!(!map.insert_first("k", b));
        assert_eq!(map.get("k").unwrap().short_name.as_deref(), Some("a"));
        assert!(!map.insert_first("", Arc::new(TagLibrary::default())));
    }

    #[test]
    fn test_declared_taglib_wins_over_scans() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let uri = "http://example.com/shared";

        // pass 1: declared in web.xml, outside the WEB-INF scan's reach
        fs::create_dir_all(root.join("config")).unwrap();
        fs::write(root.join("config/declared.tld"), tld(uri, "declared")).unwrap();
        // pass 2: WEB-INF scan
        fs::create_dir_all(root.join("WEB-INF/tlds")).unwrap();
        fs::write(root.join("WEB-INF/tlds/webinf.tld"), tld(uri, "webinf")).unwrap();
        // pass 3: jar scan
        fs::create_dir_all(root.join("WEB-INF/lib")).unwrap();
        write_jar(&root.join("WEB-INF/lib/tags.jar"), &[("META-INF/jar.tld", &tld(uri, "jar"))]);

        let logger = Logger::silent();
        let classpath = resolve_classpath(root, &[], &logger).unwrap();
        let declared = [DeclaredTaglib { uri: "/declared".into(), location: "/config/declared.tld".into() }];
        let map = discover_tag_libraries(&classpath, &declared, &logger);

        assert_eq!(map.get(uri).unwrap().short_name.as_deref(), Some("declared"));
        assert_eq!(map.get("/declared").unwrap().short_name.as_deref(), Some("declared"));
        // locations stay reachable for every source
        assert_eq!(map.get("/WEB-INF/tlds/webinf.tld").unwrap().short_name.as_deref(), Some("webinf"));
    }

    #[test]
    fn test_web_inf_wins_over_jar() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let uri = "http://example.com/tags";

        fs::create_dir_all(root.join("WEB-INF/lib")).unwrap();
        fs::write(root.join("WEB-INF/app.tld"), tld(uri, "webinf")).unwrap();
        write_jar(&root.join("WEB-INF/lib/tags.jar"), &[(JAR_TAGLIB_ENTRY, &tld(uri, "jar"))]);

        let logger = Logger::silent();
        let classpath = resolve_classpath(root, &[], &logger).unwrap();
        let map = discover_tag_libraries(&classpath, &[], &logger);

        assert_eq!(map.get(uri).unwrap().short_name.as_deref(), Some("webinf"));
        // the jar's main descriptor is still reachable through the jar location
        assert_eq!(map.get("/WEB-INF/lib/tags.jar").unwrap().short_name.as_deref(), Some("jar"));
    }

    #[test]
    fn test_malformed_tld_is_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("WEB-INF")).unwrap();
        fs::write(root.join("WEB-INF/broken.tld"), "<taglib><uri>x</taglib>").unwrap();
        fs::write(root.join("WEB-INF/good.tld"), tld("good", "good")).unwrap();

        let logger = Logger::silent();
        let classpath = resolve_classpath(root, &[], &logger).unwrap();
        let declared = [DeclaredTaglib { uri: "missing".into(), location: "missing.tld".into() }];
        let map = discover_tag_libraries(&classpath, &declared, &logger);

        assert!(map.get("good").is_some());
        assert!(map.get("x").is_none());
        assert!(map.get("missing").is_none());
    }

    #[test]
    fn test_classpath_directory_meta_inf() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("WEB-INF/classes/META-INF/tags")).unwrap();
        fs::write(root.join("WEB-INF/classes/META-INF/tags/dir.tld"), tld("dir", "dir")).unwrap();

        let logger = Logger::silent();
        let classpath = resolve_classpath(root, &[], &logger).unwrap();
        let map = discover_tag_libraries(&classpath, &[], &logger);

        // also found by the WEB-INF walk, first
        let lib = map.get("dir").unwrap();
        assert_eq!(lib.location, "/WEB-INF/classes/META-INF/tags/dir.tld");
    }

    #[test]
    fn test_declared_relative_location() {
        assert_eq!(declared_web_path("tlds/a.tld"), "/WEB-INF/tlds/a.tld");
        assert_eq!(declared_web_path("/x/a.tld"), "/x/a.tld");
    }

    #[test]
    fn test_map_serializes_as_object() {
        let mut map = TaglibMap::new();
        map.register(TagLibrary { uri: Some("u".into()), location: "/a.tld".into(), ..Default::default() });
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["u"]["location"], "/a.tld");
        assert!(json.get("/a.tld").is_some());
    }
}
