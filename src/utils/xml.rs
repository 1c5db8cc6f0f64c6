//! Minimal owned XML element tree built on quick-xml events.
//!
//! E-utilities responses are small (at most one batch of articles), so the
//! whole document is materialized and queried with descendant lookups.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::sources::SourceError;

/// A node inside an element: a child element or a run of text
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An owned XML element
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .flatten()
            .map(|attr| {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (key, value)
            })
            .collect();

        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// Attribute value by name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Direct child elements
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.name == name)
    }

    /// All descendants in document order, excluding `self`
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.elements().collect();
        stack.reverse();
        while let Some(elem) = stack.pop() {
            out.push(elem);
            let before = stack.len();
            stack.extend(elem.elements());
            stack[before..].reverse();
        }
        out
    }

    /// Descendants with the given name, in document order
    pub fn descendants_named(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        let name = name.to_owned();
        self.descendants().into_iter().filter(move |e| e.name == name)
    }

    /// First descendant with the given name
    pub fn descendant(&self, name: &str) -> Option<&XmlElement> {
        self.descendants_named(name).next()
    }

    /// Take ownership of the direct children with the given name
    pub fn into_children_named(self, name: &str) -> Vec<XmlElement> {
        self.children
            .into_iter()
            .filter_map(|n| match n {
                XmlNode::Element(e) if e.name == name => Some(e),
                _ => None,
            })
            .collect()
    }

    /// All text below this element (inline markup flattened),
    /// with whitespace runs collapsed to single spaces
    pub fn text(&self) -> String {
        let mut raw = String::new();
        self.collect_text(&mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }
}

/// Parse a full document and return its root element
pub fn parse_document(xml: &str) -> Result<XmlElement, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => stack.push(XmlElement::from_start(&e)),
            Ok(Event::Empty(e)) => {
                let elem = XmlElement::from_start(&e);
                attach(&mut stack, &mut root, elem);
            }
            Ok(Event::End(_)) => {
                let elem = stack
                    .pop()
                    .ok_or_else(|| SourceError::Parse("XML: unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, elem);
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map(|c| c.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    top.children.push(XmlNode::Text(text));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    top.children.push(XmlNode::Text(text));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(SourceError::Parse(format!(
                    "XML error at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        }
    }

    if !stack.is_empty() {
        return Err(SourceError::Parse("XML: unclosed element".to_string()));
    }
    root.ok_or_else(|| SourceError::Parse("XML: document has no root element".to_string()))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, elem: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(elem)),
        None => {
            if root.is_none() {
                *root = Some(elem);
            }
        }
    }
}
