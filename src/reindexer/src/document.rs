//! In-memory element tree for the small archive documents (index and schemas).
//!
//! Nodes keep the raw events they were read from, so anything the rewriters do
//! not touch is written back byte-for-byte apart from quote normalisation
//! inside tags.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::name::QName;
use quick_xml::{Reader, Writer};

use crate::error::{ReindexError, Result};

#[derive(Debug, Clone)]
pub enum Node {
    Element(Element),
    /// Text, CDATA, comments, processing instructions and the XML declaration
    Other(Event<'static>),
}

impl Node {
    fn is_whitespace(&self) -> bool {
        match self {
            Node::Other(Event::Text(text)) => text.iter().all(|b| b.is_ascii_whitespace()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub start: BytesStart<'static>,
    pub children: Vec<Node>,
    self_closing: bool,
}

impl Element {
    fn new(start: BytesStart<'static>, self_closing: bool) -> Self {
        Self {
            start,
            children: Vec::new(),
            self_closing,
        }
    }

    pub fn local_name(&self) -> &[u8] {
        self.start.local_name().into_inner()
    }

    pub fn is(&self, local_name: &str) -> bool {
        self.local_name() == local_name.as_bytes()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Other(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Other(_) => None,
        })
    }

    /// First child element with the given local name
    pub fn child(&self, local_name: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(local_name))
    }

    pub fn child_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(local_name))
    }

    /// Unescaped text content of this element
    pub fn text(&self) -> Result<String> {
        let mut text = String::new();
        for node in &self.children {
            match node {
                Node::Other(Event::Text(t)) => text.push_str(&t.unescape()?),
                Node::Other(Event::CData(data)) => text.push_str(&String::from_utf8_lossy(data)),
                _ => {}
            }
        }
        Ok(text)
    }

    pub fn set_text(&mut self, text: &str) {
        self.children = vec![Node::Other(Event::Text(BytesText::new(text).into_owned()))];
        self.self_closing = false;
    }

    /// Unescaped value of the attribute with the given qualified name
    pub fn attribute(&self, name: &str) -> Result<Option<String>> {
        for attr in self.start.attributes() {
            let attr = attr?;
            if attr.key.as_ref() == name.as_bytes() {
                return Ok(Some(attr.unescape_value()?.into_owned()));
            }
        }
        Ok(None)
    }

    /// Replace an attribute's value in place, keeping attribute order
    pub fn set_attribute(&mut self, name: &str, value: &str) -> Result<()> {
        let mut attributes: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for attr in self.start.attributes() {
            let attr = attr?;
            attributes.push((attr.key.as_ref().to_vec(), attr.value.into_owned()));
        }

        let element_name = String::from_utf8_lossy(self.start.name().as_ref()).into_owned();
        let mut start = BytesStart::new(element_name);
        let mut replaced = false;
        for (key, raw_value) in &attributes {
            if key.as_slice() == name.as_bytes() {
                start.push_attribute((name, value));
                replaced = true;
            } else {
                start.push_attribute(Attribute {
                    key: QName(key.as_slice()),
                    value: Cow::Borrowed(raw_value.as_slice()),
                });
            }
        }
        if !replaced {
            start.push_attribute((name, value));
        }

        self.start = start;
        Ok(())
    }

    /// Keep only the child elements for which `keep` returns true.
    ///
    /// Whitespace directly preceding a dropped element goes with it.
    pub fn retain_elements<F>(&mut self, mut keep: F) -> Result<()>
    where
        F: FnMut(&Element) -> Result<bool>,
    {
        let mut retained: Vec<Node> = Vec::with_capacity(self.children.len());
        for node in self.children.drain(..) {
            match node {
                Node::Element(element) => {
                    if keep(&element)? {
                        retained.push(Node::Element(element));
                    } else if retained.last().is_some_and(Node::is_whitespace) {
                        retained.pop();
                    }
                }
                other => retained.push(other),
            }
        }
        self.children = retained;
        Ok(())
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        if self.self_closing && self.children.is_empty() {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }

        writer.write_event(Event::Start(self.start.borrow()))?;
        for child in &self.children {
            write_node(child, writer)?;
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }
}

fn write_node<W: Write>(node: &Node, writer: &mut Writer<W>) -> Result<()> {
    match node {
        Node::Element(element) => element.write(writer),
        Node::Other(event) => {
            writer.write_event(event.borrow())?;
            Ok(())
        }
    }
}

/// Strip a namespace prefix from a qualified name
pub fn local(name: &[u8]) -> &[u8] {
    match name.iter().position(|b| *b == b':') {
        Some(colon) => &name[colon + 1..],
        None => name,
    }
}

/// A whole XML document held in memory
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    nodes: Vec<Node>,
}

impl Document {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::parse(BufReader::new(file), path)
    }

    pub fn parse<R: BufRead>(source: R, path: &Path) -> Result<Self> {
        let mut reader = Reader::from_reader(source);
        let mut buf = Vec::new();
        let mut open: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let node = match reader.read_event_into(&mut buf)? {
                Event::Start(start) => {
                    open.push(Element::new(start.into_owned(), false));
                    None
                }
                Event::Empty(start) => Some(Node::Element(Element::new(start.into_owned(), true))),
                Event::End(_) => match open.pop() {
                    Some(element) => Some(Node::Element(element)),
                    None => return Err(ReindexError::malformed(path, "unbalanced end tag")),
                },
                Event::Eof => break,
                other => Some(Node::Other(other.into_owned())),
            };

            if let Some(node) = node {
                match open.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => nodes.push(node),
                }
            }
            buf.clear();
        }

        if !open.is_empty() {
            return Err(ReindexError::malformed(path, "unexpected end of document"));
        }

        let document = Self {
            path: path.to_path_buf(),
            nodes,
        };
        if document.root().is_none() {
            return Err(ReindexError::malformed(path, "document has no root element"));
        }
        Ok(document)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Other(_) => None,
        })
    }

    pub fn root_mut(&mut self) -> Option<&mut Element> {
        self.nodes.iter_mut().find_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Other(_) => None,
        })
    }

    /// Root element, or a malformation error naming the document
    pub fn require_root_mut(&mut self, local_name: &str) -> Result<&mut Element> {
        let path = self.path.clone();
        match self.root_mut() {
            Some(root) if root.is(local_name) => Ok(root),
            _ => Err(ReindexError::malformed(
                path,
                format!("expected <{local_name}> root element"),
            )),
        }
    }

    pub fn write<W: Write>(&self, sink: W) -> Result<()> {
        let mut writer = Writer::new(sink);
        for node in &self.nodes {
            write_node(node, &mut writer)?;
        }
        writer.into_inner().flush()?;
        Ok(())
    }
}
