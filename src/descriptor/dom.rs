//! Minimal mutable XML tree on top of quick-xml.
//!
//! Keeps markup lossless where it matters for splicing: start tags keep
//! their raw attribute text, text keeps its escaped form, and comments,
//! whitespace, CDATA and processing instructions stay as nodes in order.

use anyhow::{Result, bail};
use encoding_rs::{Encoding, UTF_8};
use quick_xml::{
    Reader, Writer,
    escape::unescape,
    events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event},
};
use regex::Regex;
use std::{io::Cursor, sync::LazyLock};

/// `encoding="..."` inside a leading XML declaration
static RE_DECLARED_ENCODING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[ \t\r\n]*<\?xml[^>]*[ \t\r\n]encoding[ \t\r\n]*=[ \t\r\n]*["']([A-Za-z0-9._:-]+)["']"#).unwrap()
});

/// Decode raw descriptor bytes to text.
///
/// A byte-order mark wins, then the declared encoding, then UTF-8.
pub fn decode_xml(bytes: &[u8]) -> String {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let declared = RE_DECLARED_ENCODING
        .captures(&head)
        .and_then(|caps| Encoding::for_label(caps[1].as_bytes()))
        .unwrap_or(UTF_8);
    let (text, _, _) = declared.decode(bytes);
    text.into_owned()
}

/// A node in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Escaped character data, entity references included verbatim
    Text(String),
    Comment(String),
    CData(String),
    ProcessingInstruction(String),
    DocType(String),
}

/// An element with its raw start-tag content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    /// Tag content between `<` and `>`: name plus raw attributes
    raw_start: String,
    /// Written as `<name/>` when it has no children
    self_closing: bool,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            raw_start: name.to_owned(),
            self_closing: false,
            children: Vec::new(),
        }
    }

    /// Element with a single escaped text child, e.g. `<servlet-name>x</servlet-name>`.
    pub fn with_text(name: &str, text: &str) -> Self {
        let mut element = Self::new(name);
        element.children.push(Node::text(text));
        element
    }

    /// Qualified tag name as written, e.g. `j:web-app`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag name without namespace prefix
    pub fn local_name(&self) -> &str {
        self.name.rsplit_once(':').map_or(self.name.as_str(), |(_, local)| local)
    }

    /// Unescaped value of an attribute on the start tag.
    pub fn attribute(&self, name: &str) -> Option<String> {
        let start = BytesStart::from_content(self.raw_start.as_str(), self.name.len());
        let attr = start.try_get_attribute(name).ok().flatten()?;
        attr.unescape_value().ok().map(|value| value.into_owned())
    }

    /// Direct child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First direct child element with the given local name.
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.local_name() == local_name)
    }

    /// All direct child elements with the given local name.
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.local_name() == local_name)
    }

    /// Unescaped, trimmed text content of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out.trim().to_owned()
    }

    /// Trimmed text of the named child, `None` when absent or empty.
    pub fn child_text(&self, local_name: &str) -> Option<String> {
        self.child(local_name)
            .map(Element::text)
            .filter(|text| !text.is_empty())
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(raw) => match unescape(raw) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(raw),
                },
                Node::CData(data) => out.push_str(data),
                Node::Element(element) => element.collect_text(out),
                _ => {}
            }
        }
    }
}

impl Node {
    /// Text node from unescaped content.
    pub fn text(content: &str) -> Self {
        Self::Text(quick_xml::escape::escape(content).into_owned())
    }

    pub fn comment(content: &str) -> Self {
        Self::Comment(content.to_owned())
    }
}

/// A parsed document: nodes before the root, the root, nodes after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub prolog: Vec<Node>,
    pub root: Element,
    pub epilog: Vec<Node>,
}

impl Document {
    /// Parse a whole document from text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<Element> = None;
        // open elements, innermost last
        let mut stack: Vec<Element> = Vec::new();

        loop {
            let event = reader.read_event()?;
            let node = match event {
                Event::Start(e) => {
                    stack.push(element_from_start(&e, false));
                    continue;
                }
                Event::End(_) => {
                    let Some(element) = stack.pop() else {
                        bail!("Unbalanced closing tag at position {}", reader.buffer_position());
                    };
                    Node::Element(element)
                }
                Event::Empty(e) => Node::Element(element_from_start(&e, true)),
                Event::Text(e) => Node::Text(String::from_utf8_lossy(&e).into_owned()),
                Event::GeneralRef(e) => Node::Text(format!("&{};", String::from_utf8_lossy(&e))),
                Event::CData(e) => Node::CData(String::from_utf8_lossy(&e).into_owned()),
                Event::Comment(e) => Node::Comment(String::from_utf8_lossy(&e).into_owned()),
                Event::PI(e) => Node::ProcessingInstruction(String::from_utf8_lossy(&e).into_owned()),
                Event::DocType(e) => Node::DocType(String::from_utf8_lossy(&e).into_owned()),
                // the declaration is rewritten on output with the target encoding
                Event::Decl(_) => continue,
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => push_merging_text(&mut parent.children, node),
                None => match node {
                    Node::Element(element) => {
                        if root.is_some() {
                            bail!("Multiple root elements");
                        }
                        root = Some(element);
                    }
                    other if root.is_none() => prolog.push(other),
                    other => epilog.push(other),
                },
            }
        }

        if let Some(open) = stack.last() {
            bail!("Unclosed element <{}>", open.name);
        }
        let Some(root) = root else {
            bail!("Document has no root element");
        };

        Ok(Self { prolog, root, epilog })
    }

    /// Decode and parse raw document bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::parse(&decode_xml(bytes))
    }

    /// Serialize with an XML declaration naming `encoding`.
    ///
    /// The returned text still has to be encoded by the caller.
    pub fn to_xml_string(&self, encoding: &str) -> Result<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some(encoding), None)))?;

        // keep the prolog on its own lines even when the source had none
        if !matches!(self.prolog.first(), Some(Node::Text(_))) {
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
        }
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        if !self.prolog.is_empty() && !matches!(self.prolog.last(), Some(Node::Text(_))) {
            writer.write_event(Event::Text(BytesText::from_escaped("\n")))?;
        }

        write_element(&mut writer, &self.root)?;

        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }

        let bytes = writer.into_inner().into_inner();
        Ok(String::from_utf8(bytes)?)
    }
}

/// Adjacent text nodes (split around entity references) are merged.
fn push_merging_text(children: &mut Vec<Node>, node: Node) {
    if let Node::Text(next) = &node
        && let Some(Node::Text(previous)) = children.last_mut()
    {
        previous.push_str(next);
        return;
    }
    children.push(node);
}

fn element_from_start(start: &BytesStart<'_>, self_closing: bool) -> Element {
    Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        raw_start: String::from_utf8_lossy(start).into_owned(),
        self_closing,
        children: Vec::new(),
    }
}

fn write_node(writer: &mut Writer<Cursor<Vec<u8>>>, node: &Node) -> Result<()> {
    match node {
        Node::Element(element) => write_element(writer, element)?,
        Node::Text(raw) => writer.write_event(Event::Text(BytesText::from_escaped(raw.as_str())))?,
        Node::Comment(comment) => writer.write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))?,
        Node::CData(data) => writer.write_event(Event::CData(BytesCData::new(data.as_str())))?,
        Node::ProcessingInstruction(content) => writer.write_event(Event::PI(BytesPI::new(content.as_str())))?,
        Node::DocType(content) => writer.write_event(Event::DocType(BytesText::from_escaped(content.as_str())))?,
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, element: &Element) -> Result<()> {
    let start = BytesStart::from_content(element.raw_start.as_str(), element.name.len());
    if element.children.is_empty() && element.self_closing {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(element.name.as_str())))?;
    Ok(())
}
