//! Owned XML tree built on `quick-xml` events.
//!
//! Parts are small (a form template's `document.xml` is a few hundred KB at
//! most), so parsing into a tree and cloning it per generated document keeps
//! the editing code simple. Whitespace text is preserved as-is; declarations,
//! comments and processing instructions are carried through verbatim.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::TemplateError;

#[derive(Debug, Clone)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    /// Declarations, comments, CDATA, processing instructions.
    Other(Event<'static>),
}

#[derive(Debug, Clone, Default)]
pub struct XmlElement {
    /// Qualified name, prefix included (e.g. `w:tbl`).
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element sharing this element's namespace prefix.
    pub fn sibling_named(&self, local: &str) -> Self {
        match self.prefix() {
            Some(prefix) => Self::new(format!("{prefix}:{local}")),
            None => Self::new(local),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn is(&self, local: &str) -> bool {
        self.local_name() == local
    }

    /// Attribute value by local name, ignoring the prefix.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| local_part(key) == local)
            .map(|(_, value)| value.as_str())
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.elements().find(|el| el.is(local))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            match node {
                XmlNode::Text(text) => out.push_str(text),
                XmlNode::Element(el) => out.push_str(&el.text()),
                XmlNode::Other(_) => {}
            }
        }
        out
    }

    /// Visit every descendant element named `local`, outermost first.
    /// Matching elements are not searched further.
    pub fn for_each_mut<E>(
        &mut self,
        local: &str,
        f: &mut impl FnMut(&mut XmlElement) -> Result<(), E>,
    ) -> Result<(), E> {
        for child in self.elements_mut() {
            if child.is(local) {
                f(child)?;
            } else {
                child.for_each_mut(local, f)?;
            }
        }
        Ok(())
    }

    /// Collect every descendant element named `local`, outermost first.
    pub fn descendants<'a>(&'a self, local: &str, out: &mut Vec<&'a XmlElement>) {
        for child in self.elements() {
            if child.is(local) {
                out.push(child);
            } else {
                child.descendants(local, out);
            }
        }
    }
}

fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// A parsed XML part.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    /// Declaration, comments and whitespace before the root element.
    prolog: Vec<XmlNode>,
    root: XmlElement,
    /// Comments and whitespace after the root element.
    epilog: Vec<XmlNode>,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, TemplateError> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut nodes = Vec::new();

        let push = |stack: &mut Vec<XmlElement>, nodes: &mut Vec<XmlNode>, node: XmlNode| {
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => nodes.push(node),
            }
        };

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Eof => break,
                Event::Start(e) => stack.push(element_from_start(&e)?),
                Event::Empty(e) => {
                    let el = element_from_start(&e)?;
                    push(&mut stack, &mut nodes, XmlNode::Element(el));
                }
                Event::End(e) => {
                    let el = stack.pop().ok_or_else(|| {
                        TemplateError::MalformedXml(format!(
                            "unexpected closing tag `{}`",
                            String::from_utf8_lossy(e.name().as_ref())
                        ))
                    })?;
                    push(&mut stack, &mut nodes, XmlNode::Element(el));
                }
                Event::Text(e) => {
                    let text = e.unescape()?.into_owned();
                    push(&mut stack, &mut nodes, XmlNode::Text(text));
                }
                other => push(&mut stack, &mut nodes, XmlNode::Other(other.into_owned())),
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(TemplateError::MalformedXml(format!(
                "element `{}` is never closed",
                open.name
            )));
        }
        let Some(index) = nodes.iter().position(|n| matches!(n, XmlNode::Element(_))) else {
            return Err(TemplateError::MalformedXml("no root element".to_string()));
        };
        let mut epilog = nodes.split_off(index);
        let root = match epilog.remove(0) {
            XmlNode::Element(el) => el,
            _ => return Err(TemplateError::MalformedXml("no root element".to_string())),
        };
        if let Some(XmlNode::Element(extra)) =
            epilog.iter().find(|n| matches!(n, XmlNode::Element(_)))
        {
            return Err(TemplateError::MalformedXml(format!(
                "second root element `{}`",
                extra.name
            )));
        }
        Ok(Self {
            prolog: nodes,
            root,
            epilog,
        })
    }

    pub fn root(&self) -> &XmlElement {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut XmlElement {
        &mut self.root
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TemplateError> {
        let mut writer = Writer::new(Vec::new());
        for node in &self.prolog {
            write_node(&mut writer, node)?;
        }
        write_element(&mut writer, &self.root)?;
        for node in &self.epilog {
            write_node(&mut writer, node)?;
        }
        Ok(writer.into_inner())
    }
}

fn element_from_start(e: &BytesStart<'_>) -> Result<XmlElement, TemplateError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn write_node<W: std::io::Write>(
    writer: &mut Writer<W>,
    node: &XmlNode,
) -> Result<(), TemplateError> {
    match node {
        XmlNode::Element(el) => write_element(writer, el)?,
        XmlNode::Text(text) => writer.write_event(Event::Text(BytesText::new(text)))?,
        XmlNode::Other(event) => writer.write_event(event.clone())?,
    }
    Ok(())
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    el: &XmlElement,
) -> Result<(), TemplateError> {
    let mut start = BytesStart::new(el.name.as_str());
    for (key, value) in &el.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if el.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
    } else {
        writer.write_event(Event::Start(start))?;
        for child in &el.children {
            write_node(writer, child)?;
        }
        writer.write_event(Event::End(BytesEnd::new(el.name.as_str())))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="urn:w"><w:body><w:p><w:r><w:t xml:space="preserve">A &amp; B </w:t></w:r></w:p><!-- note --><w:sectPr/></w:body></w:document>"#;

    #[test]
    fn parses_prefixed_tree_and_text() {
        let doc = XmlDocument::parse(SAMPLE.as_bytes()).unwrap();
        let root = doc.root();
        assert_eq!(root.name, "w:document");
        assert_eq!(root.local_name(), "document");
        assert_eq!(root.prefix(), Some("w"));
        let body = root.child("body").unwrap();
        assert_eq!(body.text(), "A & B ");
        let t = body.child("p").unwrap().child("r").unwrap().child("t").unwrap();
        assert_eq!(t.attribute("space"), Some("preserve"));
    }

    #[test]
    fn serialises_back_to_equivalent_xml() {
        let doc = XmlDocument::parse(SAMPLE.as_bytes()).unwrap();
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert!(out.contains(r#"<w:t xml:space="preserve">A &amp; B </w:t>"#));
        assert!(out.contains("<!-- note -->"));
        assert!(out.contains("<w:sectPr/>"));

        let reparsed = XmlDocument::parse(out.as_bytes()).unwrap();
        assert_eq!(reparsed.root().text(), doc.root().text());
    }

    #[test]
    fn rejects_unbalanced_documents() {
        assert!(XmlDocument::parse(b"<a><b></b>").is_err());
        assert!(XmlDocument::parse(b"<!-- only a comment -->").is_err());
    }

    #[test]
    fn a_second_root_element_is_rejected() {
        let err = XmlDocument::parse(b"<a/><b/>").unwrap_err();
        assert!(err.to_string().contains("second root element `b`"), "got: {err}");
    }

    #[test]
    fn content_around_the_root_survives_editing() {
        let mut doc = XmlDocument::parse(b"<?xml version=\"1.0\"?>\n<a><b/></a>\n<!-- end -->").unwrap();
        doc.root_mut().children.clear();
        let out = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        assert_eq!(out, "<?xml version=\"1.0\"?>\n<a/>\n<!-- end -->");
    }

    #[test]
    fn sibling_named_reuses_prefix() {
        let tc = XmlElement::new("w:tc");
        assert_eq!(tc.sibling_named("p").name, "w:p");
        assert_eq!(XmlElement::new("tc").sibling_named("p").name, "p");
    }
}
