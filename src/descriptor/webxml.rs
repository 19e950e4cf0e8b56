//! Reading the application's own `WEB-INF/web.xml`.

use super::dom::{Document, Element};
use crate::{log, logger::Logger, resolver::DeclaredTaglib};
use std::{fs, path::Path};

/// Application descriptor, relative to the root
pub const WEB_XML: &str = "WEB-INF/web.xml";

/// Expected root element of an application descriptor
pub const WEB_APP: &str = "web-app";

/// Taglibs declared by `<jsp-config>` and the legacy top-level `<taglib>`.
pub fn parse_declared_taglibs(root: &Element) -> Vec<DeclaredTaglib> {
    let from_jsp_config = root
        .children_named("jsp-config")
        .flat_map(|config| config.children_named("taglib"));

    from_jsp_config
        .chain(root.children_named("taglib"))
        .filter_map(|taglib| {
            Some(DeclaredTaglib {
                uri: taglib.child_text("taglib-uri")?,
                location: taglib.child_text("taglib-location")?,
            })
        })
        .collect()
}

/// Declared taglibs of the application at `app_root`.
///
/// A missing descriptor declares nothing; an unreadable or malformed one is
/// logged and treated the same way.
pub fn declared_taglibs(app_root: &Path, logger: &Logger) -> Vec<DeclaredTaglib> {
    let path = app_root.join(WEB_XML);
    if !path.is_file() {
        return Vec::new();
    }

    let doc = match fs::read(&path).map_err(anyhow::Error::from).and_then(|b| Document::from_bytes(&b)) {
        Ok(doc) => doc,
        Err(e) => {
            log!(logger, Warn; "webxml"; "cannot read {}: {e:#}", path.display());
            return Vec::new();
        }
    };

    if doc.root.local_name() != WEB_APP {
        log!(logger, Warn; "webxml"; "{} has root <{}>, ignoring its taglibs", path.display(), doc.root.name());
        return Vec::new();
    }

    let declared = parse_declared_taglibs(&doc.root);
    log!(logger, Debug; "webxml"; "{} declared taglibs in {}", declared.len(), path.display());
    declared
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<web-app version="2.3">
    <taglib>
        <taglib-uri>/legacy</taglib-uri>
        <taglib-location>/WEB-INF/legacy.tld</taglib-location>
    </taglib>
    <jsp-config>
        <taglib>
            <taglib-uri>http://example.com/tags</taglib-uri>
            <taglib-location>tlds/example.tld</taglib-location>
        </taglib>
        <taglib>
            <taglib-uri>incomplete</taglib-uri>
        </taglib>
    </jsp-config>
</web-app>
"#;

    #[test]
    fn test_parse_declared_taglibs() {
        let doc = Document::parse(DESCRIPTOR).unwrap();
        let declared = parse_declared_taglibs(&doc.root);
        assert_eq!(
            declared,
            [
                DeclaredTaglib { uri: "http://example.com/tags".into(), location: "tlds/example.tld".into() },
                DeclaredTaglib { uri: "/legacy".into(), location: "/WEB-INF/legacy.tld".into() },
            ]
        );
    }

    #[test]
    fn test_declared_taglibs_from_disk() {
        let dir = TempDir::new().unwrap();
        assert!(declared_taglibs(dir.path(), &Logger::silent()).is_empty());

        fs::create_dir_all(dir.path().join("WEB-INF")).unwrap();
        fs::write(dir.path().join(WEB_XML), DESCRIPTOR).unwrap();
        assert_eq!(declared_taglibs(dir.path(), &Logger::silent()).len(), 2);

        fs::write(dir.path().join(WEB_XML), "<web-app><taglib>").unwrap();
        assert!(declared_taglibs(dir.path(), &Logger::silent()).is_empty());
    }
}
