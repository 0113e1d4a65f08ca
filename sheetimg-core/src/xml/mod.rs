//! Namespace-aware XML parts backed by quick-xml
//!
//! Parts are small (content types, relationship tables, `cellimages.xml`,
//! one worksheet at a time), so each one is loaded into a tree, edited in
//! place and serialized back in full.
//!
//! Parsing never resolves a DTD or an external entity: `DOCTYPE` events are
//! dropped and only the predefined XML entities and character references are
//! expanded. Unbalanced end tags are recovered with a warning; anything the
//! tokenizer rejects is reported as [`EmbedError::MalformedPart`].

pub mod templates;

pub use templates::PartTemplates;

use crate::error::{EmbedError, Result};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::Writer;
use tracing::warn;

/// Node of a parsed part
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
    ProcessingInstruction(String),
}

/// An element with its qualified name as written and its resolved namespace
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name, e.g. `xdr:pic`
    pub name: String,
    /// Namespace URI the prefix resolved to when parsed or created
    pub namespace: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Name without its prefix
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    /// True if this element is `{namespace}local`
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local_name() == local
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Drop every attribute and child
    pub fn clear(&mut self) {
        self.attributes.clear();
        self.children.clear();
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn children_named<'a>(
        &'a self,
        namespace: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |e| e.is(namespace, local))
    }

    pub fn children_named_mut<'a>(
        &'a mut self,
        namespace: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a mut Element> + 'a {
        self.child_elements_mut().filter(move |e| e.is(namespace, local))
    }

    pub fn find_child(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.is(namespace, local))
    }

    pub fn find_child_mut(&mut self, namespace: &str, local: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.is(namespace, local))
    }

    /// Count `{namespace}local` elements anywhere below this element
    pub fn count_descendants(&self, namespace: &str, local: &str) -> usize {
        self.child_elements()
            .map(|child| {
                usize::from(child.is(namespace, local)) + child.count_descendants(namespace, local)
            })
            .sum()
    }

    /// Concatenated text of direct text children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) | Node::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn has_element_children(&self) -> bool {
        self.children.iter().any(|n| matches!(n, Node::Element(_)))
    }

    /// Whitespace between elements is formatting, not content
    fn drop_formatting_whitespace(&mut self) {
        if self.has_element_children() {
            self.children
                .retain(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()));
        }
    }
}

/// A parsed XML part
#[derive(Debug, Clone, PartialEq)]
pub struct XmlPart {
    /// Comments and processing instructions preceding the root
    pub prolog: Vec<Node>,
    pub root: Element,
}

impl XmlPart {
    pub fn new(root: Element) -> Self {
        Self {
            prolog: Vec::new(),
            root,
        }
    }

    /// Parse a part. `part` names it in errors and log lines.
    pub fn parse(xml: &str, part: &str) -> Result<Self> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().check_end_names = false;

        let mut prolog = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let (resolved, event) =
                reader
                    .read_resolved_event()
                    .map_err(|source| EmbedError::MalformedPart {
                        part: part.to_string(),
                        source,
                    })?;
            match event {
                Event::Start(e) => {
                    let element = element_from_start(&e, resolved, part);
                    stack.push(element);
                }
                Event::Empty(e) => {
                    let element = element_from_start(&e, resolved, part);
                    attach(&mut stack, &mut root, element, part);
                }
                Event::End(e) => {
                    let Some(mut element) = stack.pop() else {
                        warn!(part, "ignoring stray end tag </{}>", decode(e.name().as_ref()));
                        continue;
                    };
                    if element.name.as_bytes() != e.name().as_ref() {
                        warn!(
                            part,
                            "end tag </{}> closes <{}>",
                            decode(e.name().as_ref()),
                            element.name
                        );
                    }
                    element.drop_formatting_whitespace();
                    attach(&mut stack, &mut root, element, part);
                }
                Event::Text(e) => {
                    let text = match e.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(err) => {
                            warn!(part, error = %err, "keeping unresolved entity as literal text");
                            decode(&e)
                        }
                    };
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Text(text));
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::CData(decode(&e)));
                    }
                }
                Event::Comment(e) => {
                    let node = Node::Comment(decode(&e));
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => prolog.push(node),
                        None => {}
                    }
                }
                Event::PI(e) => {
                    let node = Node::ProcessingInstruction(decode(&e));
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => prolog.push(node),
                        None => {}
                    }
                }
                Event::DocType(_) => {
                    warn!(part, "ignoring DOCTYPE declaration");
                }
                Event::Decl(_) => {}
                Event::Eof => break,
            }
        }

        while let Some(mut element) = stack.pop() {
            warn!(part, "closing unterminated <{}> at end of input", element.name);
            element.drop_formatting_whitespace();
            attach(&mut stack, &mut root, element, part);
        }

        match root {
            Some(root) => Ok(Self { prolog, root }),
            None => Err(EmbedError::PartMissingRequiredStructure {
                part: part.to_string(),
                element: "root",
            }),
        }
    }

    /// Serialize with an XML declaration and two-space indentation
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        emit(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))),
        )?;
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        let bytes = writer.into_inner();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Prefix bound to `namespace` on the root element.
    ///
    /// `Some("")` means the namespace is the default one.
    pub fn prefix_for(&self, namespace: &str) -> Option<String> {
        self.root.attributes.iter().find_map(|(key, value)| {
            if value != namespace {
                return None;
            }
            if key == "xmlns" {
                Some(String::new())
            } else {
                key.strip_prefix("xmlns:").map(str::to_string)
            }
        })
    }

    /// Prefix for `namespace`, declaring it on the root with `preferred` if unbound
    pub fn ensure_prefix(&mut self, namespace: &str, preferred: &str) -> String {
        if let Some(prefix) = self.prefix_for(namespace) {
            return prefix;
        }
        // Declaring a default namespace here would move unprefixed elements
        let base = if preferred.is_empty() { "ns" } else { preferred };
        let mut prefix = base.to_string();
        let mut n = 1;
        while self.root.attribute(&format!("xmlns:{prefix}")).is_some() {
            prefix = format!("{base}{n}");
            n += 1;
        }
        self.root
            .set_attribute(format!("xmlns:{prefix}"), namespace.to_string());
        prefix
    }

    /// Element or attribute name for `local` in `namespace`, declaring it if needed
    pub fn qualified(&mut self, namespace: &str, preferred: &str, local: &str) -> String {
        let prefix = self.ensure_prefix(namespace, preferred);
        if prefix.is_empty() {
            local.to_string()
        } else {
            format!("{prefix}:{local}")
        }
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn element_from_start(start: &BytesStart<'_>, resolved: ResolveResult<'_>, part: &str) -> Element {
    let name = decode(start.name().as_ref());
    let namespace = match resolved {
        ResolveResult::Bound(ns) => Some(decode(ns.0)),
        ResolveResult::Unbound => None,
        ResolveResult::Unknown(prefix) => {
            warn!(part, "element <{}> uses undeclared prefix {}", name, decode(&prefix));
            None
        }
    };

    let mut attributes = Vec::new();
    for attr in start.attributes().with_checks(false) {
        match attr {
            Ok(attr) => {
                let key = decode(attr.key.as_ref());
                let value = match attr.unescape_value() {
                    Ok(value) => value.into_owned(),
                    Err(_) => decode(&attr.value),
                };
                attributes.push((key, value));
            }
            Err(err) => warn!(part, error = %err, "skipping malformed attribute on <{}>", name),
        }
    }

    Element {
        name,
        namespace,
        attributes,
        children: Vec::new(),
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element, part: &str) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(Node::Element(element));
    } else if root.is_none() {
        *root = Some(element);
    } else {
        warn!(part, "dropping second top-level element <{}>", element.name);
    }
}

fn emit<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| EmbedError::XmlWrite(e.to_string()))
}

fn write_node<W: std::io::Write>(writer: &mut Writer<W>, node: &Node) -> Result<()> {
    match node {
        Node::Element(e) => write_element(writer, e),
        Node::Text(t) => emit(writer, Event::Text(BytesText::new(t))),
        Node::CData(t) => emit(writer, Event::CData(BytesCData::new(t.as_str()))),
        Node::Comment(t) => emit(writer, Event::Comment(BytesText::from_escaped(t.as_str()))),
        Node::ProcessingInstruction(t) => emit(writer, Event::PI(BytesPI::new(t.as_str()))),
    }
}

fn write_element<W: std::io::Write>(writer: &mut Writer<W>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() {
        return emit(writer, Event::Empty(start));
    }

    emit(writer, Event::Start(start))?;
    for child in &element.children {
        write_node(writer, child)?;
    }
    emit(writer, Event::End(BytesEnd::new(element.name.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
    const XDR_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing";

    #[test]
    fn test_parse_resolves_namespaces() {
        let xml = r#"<?xml version="1.0"?>
<etc:cellImages xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:etc="http://www.wps.cn/officeDocument/2017/etCustomData">
  <etc:cellImage><xdr:pic/></etc:cellImage>
  <etc:cellImage><xdr:pic/></etc:cellImage>
</etc:cellImages>"#;
        let part = XmlPart::parse(xml, "xl/cellimages.xml").unwrap();
        assert_eq!(part.root.local_name(), "cellImages");
        assert_eq!(
            part.root.namespace.as_deref(),
            Some("http://www.wps.cn/officeDocument/2017/etCustomData")
        );
        assert_eq!(part.root.count_descendants(XDR_NS, "pic"), 2);
        assert_eq!(part.prefix_for(XDR_NS).as_deref(), Some("xdr"));
    }

    #[test]
    fn test_default_namespace_prefix_is_empty() {
        let xml = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"/>"#;
        let part = XmlPart::parse(xml, "rels").unwrap();
        assert!(part.root.is(RELS_NS, "Relationships"));
        assert_eq!(part.prefix_for(RELS_NS).as_deref(), Some(""));
    }

    #[test]
    fn test_round_trip_is_stable() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <sheetData>
        <row r="1"><c r="A1" t="inlineStr"><is><t xml:space="preserve"> a &amp; b </t></is></c></row>
        <row r="2"><c r="A2"><f>_xlfn.DISPIMG("ID_1",1)</f><v>=DISPIMG("ID_1",1)</v></c></row>
    </sheetData>
    <!-- trailing comment -->
</worksheet>"#;
        let first = XmlPart::parse(xml, "sheet").unwrap();
        let written = first.to_xml().unwrap();
        assert!(written.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        let second = XmlPart::parse(&written, "sheet").unwrap();
        assert_eq!(first, second);
        assert_eq!(second.to_xml().unwrap(), written);
    }

    #[test]
    fn test_significant_whitespace_is_kept() {
        let xml = r#"<root><t> </t><u>  x  </u></root>"#;
        let part = XmlPart::parse(xml, "p").unwrap();
        let texts: Vec<String> = part.root.child_elements().map(|e| e.text()).collect();
        assert_eq!(texts, vec![" ".to_string(), "  x  ".to_string()]);
    }

    #[test]
    fn test_doctype_is_not_processed() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE root [<!ENTITY xxe SYSTEM "file:///etc/passwd">]>
<root><v>&xxe;</v></root>"#;
        let part = XmlPart::parse(xml, "p").unwrap();
        let value = part.root.child_elements().next().unwrap().text();
        assert!(!value.contains("root:"));
        assert!(!part.to_xml().unwrap().contains("DOCTYPE"));
    }

    #[test]
    fn test_recovers_unterminated_elements() {
        let xml = r#"<root><a><b/></root>"#;
        let part = XmlPart::parse(xml, "p").unwrap();
        assert_eq!(part.root.name, "root");
        let a = part.root.child_elements().next().unwrap();
        assert_eq!(a.name, "a");
        assert_eq!(a.child_elements().count(), 1);
    }

    #[test]
    fn test_empty_input_has_no_root() {
        let err = XmlPart::parse("", "p").unwrap_err();
        assert!(matches!(err, EmbedError::PartMissingRequiredStructure { .. }));
    }

    #[test]
    fn test_ensure_prefix_declares_missing_namespace() {
        let mut part = XmlPart::parse(r#"<root xmlns:a="urn:a"/>"#, "p").unwrap();
        assert_eq!(part.ensure_prefix("urn:a", "x"), "a");
        assert_eq!(part.ensure_prefix("urn:b", "a"), "a1");
        assert_eq!(part.root.attribute("xmlns:a1"), Some("urn:b"));
        assert_eq!(part.qualified("urn:b", "a", "node"), "a1:node");
    }

    #[test]
    fn test_attribute_values_are_escaped_on_write() {
        let mut part = XmlPart::new(Element::new("root", None));
        part.root.set_attribute("descr", r#"a "quoted" <name> & more"#);
        let written = part.to_xml().unwrap();
        let reparsed = XmlPart::parse(&written, "p").unwrap();
        assert_eq!(
            reparsed.root.attribute("descr"),
            Some(r#"a "quoted" <name> & more"#)
        );
    }
}
