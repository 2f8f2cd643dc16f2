//! Namespace-agnostic XML selection.
//!
//! Providers bind the OAI-PMH namespace to whatever prefix they like (or to
//! none). Elements are therefore matched on their local names only, along an
//! [`ElementPath`] from the document root.

use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use oaiharvest_core::{Result, SetupError};

/// A namespace declaration: raw attribute key (`xmlns` or `xmlns:p`) and value.
type Namespace = (Vec<u8>, Vec<u8>);

/// A compiled path of local element names from the document root.
///
/// `*` matches any single element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath {
    expression: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Name(String),
    Any,
}

impl ElementPath {
    /// Compile a `/`-separated path such as `OAI-PMH/GetRecord/record/header`.
    pub fn compile(expression: &str) -> Result<Self> {
        let invalid = |reason: &str| SetupError::Expression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = expression.strip_prefix('/').unwrap_or(expression);
        if trimmed.is_empty() {
            return Err(invalid("path is empty").into());
        }

        let segments = trimmed
            .split('/')
            .map(|segment| match segment {
                "" => Err(invalid("empty segment")),
                "*" => Ok(Segment::Any),
                name if name.contains(':') => {
                    Err(invalid("prefixes are not matched, use the local name"))
                }
                name if name
                    .chars()
                    .any(|c| c.is_whitespace() || "[]()@*=\"'".contains(c)) =>
                {
                    Err(invalid("segments must be plain element names"))
                }
                name => Ok(Segment::Name(name.to_string())),
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            expression: expression.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.expression
    }

    fn matches(&self, stack: &[Frame]) -> bool {
        stack.len() == self.segments.len()
            && self
                .segments
                .iter()
                .zip(stack)
                .all(|(segment, frame)| match segment {
                    Segment::Any => true,
                    Segment::Name(name) => *name == frame.name,
                })
    }
}

/// A small owned element tree, used for headers and other short fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> std::result::Result<Self, String> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            if is_namespace_declaration(attr.key.as_ref()) {
                continue;
            }
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            attributes.push((
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            ..Self::default()
        })
    }

    /// Local name of the element.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the attribute with the given local name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Text content directly inside this element, trimmed.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    /// First child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All children with the given local name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

/// The result of walking a document along one path.
#[derive(Debug)]
pub struct Selection<T> {
    /// Local name of the document element.
    pub root: Option<String>,
    /// Every match, in document order.
    pub matches: Vec<T>,
}

/// Select the matching elements as owned trees.
pub fn select_elements(xml: &[u8], path: &ElementPath) -> std::result::Result<Selection<Element>, String> {
    select(xml, path, |_| ElementCapture::default())
}

/// Select the matching elements serialized back to XML.
///
/// Namespace declarations that the subtree relies on but that were made on
/// an ancestor are repeated on the subtree's root element, so each match is
/// a standalone document.
pub fn select_subtrees(xml: &[u8], path: &ElementPath) -> std::result::Result<Selection<Vec<u8>>, String> {
    select(xml, path, |inherited| SubtreeCapture {
        inherited,
        events: Vec::new(),
    })
}

struct Frame {
    name: String,
    namespaces: Vec<Namespace>,
}

impl Frame {
    fn new(start: &BytesStart<'_>) -> std::result::Result<Self, String> {
        let mut namespaces = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            if is_namespace_declaration(attr.key.as_ref()) {
                namespaces.push((attr.key.as_ref().to_vec(), attr.value.to_vec()));
            }
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            namespaces,
        })
    }
}

trait Capture {
    type Output;

    /// Receives every event of the matched subtree, its own start and end included.
    fn event(&mut self, event: &Event<'_>) -> std::result::Result<(), String>;

    fn finish(self) -> std::result::Result<Self::Output, String>;
}

fn select<C, N>(xml: &[u8], path: &ElementPath, mut begin: N) -> std::result::Result<Selection<C::Output>, String>
where
    C: Capture,
    N: FnMut(Vec<Namespace>) -> C,
{
    let mut reader = Reader::from_reader(xml);
    let mut stack: Vec<Frame> = Vec::new();
    let mut active: Option<(C, usize)> = None;
    let mut selection = Selection {
        root: None,
        matches: Vec::new(),
    };

    loop {
        let event = reader.read_event().map_err(|e| e.to_string())?;
        match &event {
            Event::Start(start) | Event::Empty(start) => {
                let frame = Frame::new(start)?;
                if stack.is_empty() {
                    if let Some(root) = &selection.root {
                        return Err(format!("second document element <{}> after <{root}>", frame.name));
                    }
                    selection.root = Some(frame.name.clone());
                }
                stack.push(frame);

                if active.is_none() && path.matches(&stack) {
                    let inherited = in_scope_namespaces(&stack[..stack.len() - 1]);
                    active = Some((begin(inherited), stack.len()));
                }
                if let Some((capture, _)) = active.as_mut() {
                    capture.event(&event)?;
                }
                if matches!(event, Event::Empty(_)) {
                    close_element(&mut stack, &mut active, &mut selection)?;
                }
            }
            Event::End(_) => {
                if let Some((capture, _)) = active.as_mut() {
                    capture.event(&event)?;
                }
                close_element(&mut stack, &mut active, &mut selection)?;
            }
            Event::Text(text) if stack.is_empty() => {
                if !text.iter().all(u8::is_ascii_whitespace) {
                    return Err("text outside of the document element".to_string());
                }
            }
            Event::Eof => break,
            _ => {
                if let Some((capture, _)) = active.as_mut() {
                    capture.event(&event)?;
                }
            }
        }
    }

    if let Some(frame) = stack.last() {
        return Err(format!("unexpected end of document inside <{}>", frame.name));
    }
    if selection.root.is_none() {
        return Err("document has no element".to_string());
    }
    Ok(selection)
}

fn close_element<C: Capture>(
    stack: &mut Vec<Frame>,
    active: &mut Option<(C, usize)>,
    selection: &mut Selection<C::Output>,
) -> std::result::Result<(), String> {
    if active.as_ref().is_some_and(|(_, depth)| *depth == stack.len()) {
        if let Some((capture, _)) = active.take() {
            selection.matches.push(capture.finish()?);
        }
    }
    stack.pop();
    Ok(())
}

/// Declarations visible at the end of `frames`, innermost winning.
fn in_scope_namespaces(frames: &[Frame]) -> Vec<Namespace> {
    let mut scope: Vec<Namespace> = Vec::new();
    for (key, value) in frames.iter().flat_map(|frame| &frame.namespaces) {
        match scope.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value.clone(),
            None => scope.push((key.clone(), value.clone())),
        }
    }
    scope
}

fn is_namespace_declaration(key: &[u8]) -> bool {
    key == b"xmlns" || key.starts_with(b"xmlns:")
}

#[derive(Default)]
struct ElementCapture {
    open: Vec<Element>,
    done: Option<Element>,
}

impl ElementCapture {
    fn attach(&mut self, element: Element) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(element),
            None => self.done = Some(element),
        }
    }
}

impl Capture for ElementCapture {
    type Output = Element;

    fn event(&mut self, event: &Event<'_>) -> std::result::Result<(), String> {
        match event {
            Event::Start(start) => self.open.push(Element::from_start(start)?),
            Event::Empty(start) => {
                let element = Element::from_start(start)?;
                self.attach(element);
            }
            Event::End(_) => {
                if let Some(element) = self.open.pop() {
                    self.attach(element);
                }
            }
            Event::Text(text) => {
                if let Some(element) = self.open.last_mut() {
                    element.text.push_str(&text.unescape().map_err(|e| e.to_string())?);
                }
            }
            Event::CData(cdata) => {
                if let Some(element) = self.open.last_mut() {
                    element.text.push_str(&String::from_utf8_lossy(cdata));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> std::result::Result<Element, String> {
        self.done.ok_or_else(|| "incomplete element".to_string())
    }
}

struct SubtreeCapture {
    inherited: Vec<Namespace>,
    events: Vec<Event<'static>>,
}

impl SubtreeCapture {
    /// Prefixes used by element or attribute names in the subtree.
    /// `None` stands for the default namespace.
    fn used_prefixes(&self) -> Vec<Option<Vec<u8>>> {
        let mut used: Vec<Option<Vec<u8>>> = Vec::new();
        let mut note = |prefix: Option<Vec<u8>>| {
            if !used.contains(&prefix) {
                used.push(prefix);
            }
        };
        for event in &self.events {
            if let Event::Start(start) | Event::Empty(start) = event {
                note(start.name().prefix().map(|p| p.as_ref().to_vec()));
                for attr in start.attributes().flatten() {
                    if let Some(prefix) = attr.key.prefix() {
                        if prefix.as_ref() != b"xmlns" && prefix.as_ref() != b"xml" {
                            note(Some(prefix.as_ref().to_vec()));
                        }
                    }
                }
            }
        }
        used
    }

    fn declarations_to_repeat(&self, root: &BytesStart<'_>) -> Vec<Namespace> {
        let used = self.used_prefixes();
        let declared: Vec<Vec<u8>> = root
            .attributes()
            .flatten()
            .map(|attr| attr.key.as_ref().to_vec())
            .collect();

        self.inherited
            .iter()
            .filter(|(key, _)| !declared.contains(key))
            .filter(|(key, _)| {
                let prefix = key.strip_prefix(b"xmlns:").map(<[u8]>::to_vec);
                used.contains(&prefix)
            })
            .cloned()
            .collect()
    }
}

impl Capture for SubtreeCapture {
    type Output = Vec<u8>;

    fn event(&mut self, event: &Event<'_>) -> std::result::Result<(), String> {
        self.events.push(event.clone().into_owned());
        Ok(())
    }

    fn finish(self) -> std::result::Result<Vec<u8>, String> {
        let mut writer = Writer::new(Vec::new());
        let mut events = self.events.iter();

        match events.next() {
            Some(Event::Start(root)) => {
                let root = with_declarations(root, &self.declarations_to_repeat(root));
                writer.write_event(Event::Start(root)).map_err(|e| e.to_string())?;
            }
            Some(Event::Empty(root)) => {
                let root = with_declarations(root, &self.declarations_to_repeat(root));
                writer.write_event(Event::Empty(root)).map_err(|e| e.to_string())?;
            }
            _ => return Err("subtree does not start with an element".to_string()),
        }
        for event in events {
            writer.write_event(event.clone()).map_err(|e| e.to_string())?;
        }
        Ok(writer.into_inner())
    }
}

fn with_declarations(start: &BytesStart<'_>, declarations: &[Namespace]) -> BytesStart<'static> {
    let mut start = start.clone().into_owned();
    for (key, value) in declarations {
        start.push_attribute((key.as_slice(), value.as_slice()));
    }
    start
}
