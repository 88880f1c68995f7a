//! Owned XML tree.
//!
//! The configuration is held as a tree of [`XmlNode`] values with exclusive
//! ownership: every element has exactly one parent, and references between
//! entities are name strings resolved through the resolver and this layer,
//! never pointers. Parsing and serialization go through `quick-xml` events.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};

use crate::types::EngineError;

/// A single XML element: tag, attributes in document order, optional text,
/// and child elements in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNode {
    /// Element tag name.
    pub tag: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Trimmed text content, if any.
    pub text: Option<String>,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Create an empty element.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Create an `<entry name="...">` element, the standard PAN-OS list item.
    pub fn entry(name: impl Into<String>) -> Self {
        let mut node = Self::new("entry");
        node.set_attr("name", name);
        node
    }

    /// Create an element with text content.
    pub fn with_text(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Self::new(tag);
        node.text = Some(text.into());
        node
    }

    /// Attribute value by name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The `name` attribute, present on every entry element.
    pub fn name(&self) -> Option<&str> {
        self.attr("name")
    }

    /// Set (or replace) an attribute.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.attributes.iter_mut().find(|(k, _)| *k == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name, value));
        }
    }

    /// First child with the given tag.
    pub fn get_child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// First child with the given tag, mutable.
    pub fn get_child_mut(&mut self, tag: &str) -> Option<&mut XmlNode> {
        self.children.iter_mut().find(|c| c.tag == tag)
    }

    /// All children with the given tag.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Child `entry` element with the given `name` attribute.
    pub fn find_entry(&self, name: &str) -> Option<&XmlNode> {
        self.children
            .iter()
            .find(|c| c.tag == "entry" && c.name() == Some(name))
    }

    /// Child `entry` element with the given `name` attribute, mutable.
    pub fn find_entry_mut(&mut self, name: &str) -> Option<&mut XmlNode> {
        self.children
            .iter_mut()
            .find(|c| c.tag == "entry" && c.name() == Some(name))
    }

    /// Index of the child `entry` with the given name, if present.
    pub fn entry_position(&self, name: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|c| c.tag == "entry" && c.name() == Some(name))
    }

    /// Names of all child `entry` elements, in document order.
    pub fn entry_names(&self) -> Vec<String> {
        self.children
            .iter()
            .filter(|c| c.tag == "entry")
            .filter_map(|c| c.name().map(str::to_string))
            .collect()
    }

    /// Append a child, returning a mutable reference to it.
    pub fn append_child(&mut self, child: XmlNode) -> &mut XmlNode {
        self.children.push(child);
        self.children.last_mut().unwrap()
    }

    /// Insert a child at the given index (clamped to the child count).
    pub fn insert_child(&mut self, index: usize, child: XmlNode) {
        let index = index.min(self.children.len());
        self.children.insert(index, child);
    }

    /// Detach the first child with the given tag.
    pub fn remove_child_named(&mut self, tag: &str) -> Option<XmlNode> {
        let idx = self.children.iter().position(|c| c.tag == tag)?;
        Some(self.children.remove(idx))
    }

    /// Detach the child `entry` with the given name.
    pub fn remove_entry(&mut self, name: &str) -> Option<XmlNode> {
        let idx = self.entry_position(name)?;
        Some(self.children.remove(idx))
    }

    /// Set the text content.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    /// Text of the first child with the given tag.
    pub fn child_text(&self, tag: &str) -> Option<&str> {
        self.get_child(tag).and_then(|c| c.text.as_deref())
    }

    /// Set the text of a child element, creating the child if missing.
    pub fn set_child_text(&mut self, tag: &str, text: impl Into<String>) {
        match self.get_child_mut(tag) {
            Some(child) => child.text = Some(text.into()),
            None => {
                self.children.push(XmlNode::with_text(tag, text));
            }
        }
    }

    /// `member` texts of the named child container, e.g.
    /// `member_values("source")` for `<source><member>a</member></source>`.
    pub fn member_values(&self, container_tag: &str) -> Vec<String> {
        self.get_child(container_tag)
            .map(|c| {
                c.children_named("member")
                    .filter_map(|m| m.text.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace the named child container with a fresh member list.
    pub fn set_members(&mut self, container_tag: &str, values: &[String]) {
        self.remove_child_named(container_tag);
        let mut container = XmlNode::new(container_tag);
        for value in values {
            container.children.push(XmlNode::with_text("member", value));
        }
        self.children.push(container);
    }

    /// Parse an XML document into a node tree.
    ///
    /// Comments, processing instructions, and the declaration are dropped;
    /// whitespace-only text is ignored.
    pub fn parse_str(xml: &str) -> Result<XmlNode, EngineError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<XmlNode> = Vec::new();
        let mut root: Option<XmlNode> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    stack.push(node_from_start(&e)?);
                }
                Ok(Event::Empty(e)) => {
                    let node = node_from_start(&e)?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| EngineError::ParseError("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|e| EngineError::ParseError(e.to_string()))?;
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if let Some(top) = stack.last_mut() {
                            append_text(top, trimmed);
                        }
                    }
                }
                Ok(Event::CData(t)) => {
                    let raw = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    if let Some(top) = stack.last_mut() {
                        append_text(top, &raw);
                    }
                }
                Ok(Event::Decl(_)) | Ok(Event::Comment(_)) | Ok(Event::PI(_))
                | Ok(Event::DocType(_)) => {}
                Ok(Event::Eof) => break,
                Err(e) => return Err(EngineError::ParseError(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(EngineError::ParseError(format!(
                "unclosed element '{}'",
                stack.last().map(|n| n.tag.as_str()).unwrap_or("?")
            )));
        }
        root.ok_or_else(|| EngineError::ParseError("empty document".to_string()))
    }

    /// Serialize this subtree as a compact XML fragment (no declaration).
    pub fn to_xml(&self) -> String {
        let mut writer = Writer::new(Vec::new());
        // Writing to an in-memory buffer cannot fail.
        let _ = write_node(&mut writer, self);
        String::from_utf8_lossy(&writer.into_inner()).into_owned()
    }

    /// Serialize as a complete pretty-printed document with XML declaration,
    /// 2-space indent, UTF-8.
    pub fn to_pretty_xml(&self) -> String {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let _ = writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)));
        let _ = write_node(&mut writer, self);
        let mut out = String::from_utf8_lossy(&writer.into_inner()).into_owned();
        out.push('\n');
        out
    }

    /// Convert to a JSON map.
    ///
    /// Attributes become plain keys, text becomes `_text`, `member` children
    /// collapse into a `_members` array, and repeated child tags become
    /// arrays.
    pub fn to_dict(&self) -> Value {
        let mut map = Map::new();
        for (k, v) in &self.attributes {
            map.insert(k.clone(), Value::String(v.clone()));
        }
        if let Some(text) = &self.text {
            map.insert("_text".to_string(), Value::String(text.clone()));
        }
        for child in &self.children {
            if child.tag == "member" {
                if let Some(text) = &child.text {
                    match map
                        .entry("_members".to_string())
                        .or_insert_with(|| Value::Array(Vec::new()))
                    {
                        Value::Array(arr) => arr.push(Value::String(text.clone())),
                        _ => {}
                    }
                }
                continue;
            }
            let child_value = child.to_dict();
            match map.get_mut(&child.tag) {
                Some(Value::Array(arr)) => arr.push(child_value),
                Some(existing) => {
                    let prior = existing.take();
                    *existing = Value::Array(vec![prior, child_value]);
                }
                None => {
                    map.insert(child.tag.clone(), child_value);
                }
            }
        }
        Value::Object(map)
    }

    /// Build a node tree from a JSON map produced by [`XmlNode::to_dict`]
    /// (or hand-written in the same shape).
    pub fn from_dict(data: &Value, tag: impl Into<String>) -> Result<XmlNode, EngineError> {
        let map = data
            .as_object()
            .ok_or_else(|| EngineError::invalid_argument("element data must be a JSON object"))?;
        let mut node = XmlNode::new(tag);
        for (key, value) in map {
            match (key.as_str(), value) {
                ("_text", Value::String(s)) => node.text = Some(s.clone()),
                ("_members", Value::Array(items)) => {
                    for item in items {
                        if let Value::String(s) = item {
                            node.children.push(XmlNode::with_text("member", s));
                        }
                    }
                }
                (_, Value::Object(_)) => {
                    node.children.push(XmlNode::from_dict(value, key.clone())?);
                }
                (_, Value::Array(items)) if items.iter().all(Value::is_object) => {
                    for item in items {
                        node.children.push(XmlNode::from_dict(item, key.clone())?);
                    }
                }
                (_, Value::String(s)) => node.set_attr(key.clone(), s.clone()),
                (_, other) => node.set_attr(key.clone(), other.to_string()),
            }
        }
        Ok(node)
    }
}

fn append_text(node: &mut XmlNode, fragment: &str) {
    match &mut node.text {
        Some(existing) => {
            existing.push(' ');
            existing.push_str(fragment);
        }
        None => node.text = Some(fragment.to_string()),
    }
}

fn node_from_start(e: &BytesStart<'_>) -> Result<XmlNode, EngineError> {
    let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut node = XmlNode::new(tag);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| EngineError::ParseError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| EngineError::ParseError(e.to_string()))?
            .into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn attach(
    stack: &mut Vec<XmlNode>,
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> Result<(), EngineError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
        Ok(())
    } else if root.is_some() {
        Err(EngineError::ParseError(
            "multiple root elements".to_string(),
        ))
    } else {
        *root = Some(node);
        Ok(())
    }
}

fn write_node<W: std::io::Write>(
    writer: &mut Writer<W>,
    node: &XmlNode,
) -> Result<(), quick_xml::Error> {
    let mut start = BytesStart::new(node.tag.as_str());
    for (k, v) in &node.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    if node.children.is_empty() && node.text.is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if let Some(text) = &node.text {
        writer.write_event(Event::Text(BytesText::new(text)))?;
    }
    for child in &node.children {
        write_node(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(node.tag.as_str())))?;
    Ok(())
}

/// Merge `source` into `target`.
///
/// Both elements must share a tag. Source attributes and text overwrite the
/// target's only when `overwrite` is set or the target slot is empty. Child
/// elements with a `name` attribute are matched by tag+name and merged
/// recursively; unmatched children are appended as deep clones.
pub fn merge_element(
    target: &mut XmlNode,
    source: &XmlNode,
    overwrite: bool,
) -> Result<(), EngineError> {
    if target.tag != source.tag {
        return Err(EngineError::invalid_argument(format!(
            "cannot merge elements with different tags: {} and {}",
            target.tag, source.tag
        )));
    }

    for (key, value) in &source.attributes {
        if overwrite || target.attr(key).is_none() {
            target.set_attr(key.clone(), value.clone());
        }
    }

    if let Some(text) = &source.text {
        if overwrite || target.text.is_none() {
            target.text = Some(text.clone());
        }
    }

    for source_child in &source.children {
        let matched = source_child.name().and_then(|name| {
            target
                .children
                .iter_mut()
                .find(|c| c.tag == source_child.tag && c.name() == Some(name))
        });
        match matched {
            Some(target_child) => merge_element(target_child, source_child, overwrite)?,
            None => target.children.push(source_child.clone()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> XmlNode {
        XmlNode::parse_str(
            r#"<config>
                 <shared>
                   <address>
                     <entry name="web"><ip-netmask>10.0.0.1/32</ip-netmask></entry>
                     <entry name="db"><ip-netmask>10.0.0.2/32</ip-netmask></entry>
                   </address>
                 </shared>
               </config>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_basic_structure() {
        let root = sample();
        assert_eq!(root.tag, "config");
        let address = root.get_child("shared").unwrap().get_child("address").unwrap();
        assert_eq!(address.entry_names(), vec!["web", "db"]);
        let web = address.find_entry("web").unwrap();
        assert_eq!(web.child_text("ip-netmask"), Some("10.0.0.1/32"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(XmlNode::parse_str("<config><a></config>").is_err());
        assert!(XmlNode::parse_str("").is_err());
        assert!(XmlNode::parse_str("<a/><b/>").is_err());
    }

    #[test]
    fn test_round_trip_escaping() {
        let mut node = XmlNode::new("tag");
        node.set_attr("name", "a<b&c");
        node.set_child_text("comments", "x > y & z");
        let xml = node.to_xml();
        let parsed = XmlNode::parse_str(&xml).unwrap();
        assert_eq!(parsed.attr("name"), Some("a<b&c"));
        assert_eq!(parsed.child_text("comments"), Some("x > y & z"));
    }

    #[test]
    fn test_member_values() {
        let node = XmlNode::parse_str(
            "<entry name=\"r1\"><source><member>a</member><member>b</member></source></entry>",
        )
        .unwrap();
        assert_eq!(node.member_values("source"), vec!["a", "b"]);
        assert!(node.member_values("destination").is_empty());
    }

    #[test]
    fn test_set_members_replaces() {
        let mut node = XmlNode::entry("r1");
        node.set_members("source", &["a".to_string()]);
        node.set_members("source", &["b".to_string(), "c".to_string()]);
        assert_eq!(node.member_values("source"), vec!["b", "c"]);
        assert_eq!(node.children_named("source").count(), 1);
    }

    #[test]
    fn test_remove_entry_detaches() {
        let mut root = sample();
        let address = root
            .get_child_mut("shared")
            .unwrap()
            .get_child_mut("address")
            .unwrap();
        let removed = address.remove_entry("web").unwrap();
        assert_eq!(removed.name(), Some("web"));
        assert_eq!(address.entry_names(), vec!["db"]);
    }

    #[test]
    fn test_to_dict_members_and_text() {
        let node = XmlNode::parse_str(
            r#"<entry name="g1">
                 <static><member>a</member><member>b</member></static>
                 <description>two hosts</description>
               </entry>"#,
        )
        .unwrap();
        let dict = node.to_dict();
        assert_eq!(dict["name"], json!("g1"));
        assert_eq!(dict["static"]["_members"], json!(["a", "b"]));
        assert_eq!(dict["description"]["_text"], json!("two hosts"));
    }

    #[test]
    fn test_dict_round_trip() {
        let node = XmlNode::parse_str(
            r#"<entry name="svc"><protocol><tcp><port>8080</port></tcp></protocol></entry>"#,
        )
        .unwrap();
        let rebuilt = XmlNode::from_dict(&node.to_dict(), "entry").unwrap();
        assert_eq!(rebuilt.name(), Some("svc"));
        assert_eq!(
            rebuilt
                .get_child("protocol")
                .and_then(|p| p.get_child("tcp"))
                .and_then(|t| t.child_text("port")),
            Some("8080")
        );
    }

    #[test]
    fn test_merge_appends_unmatched_entries() {
        let mut target = XmlNode::parse_str(
            "<address><entry name=\"a\"><ip-netmask>1.1.1.1</ip-netmask></entry></address>",
        )
        .unwrap();
        let source = XmlNode::parse_str(
            "<address><entry name=\"b\"><ip-netmask>2.2.2.2</ip-netmask></entry></address>",
        )
        .unwrap();
        merge_element(&mut target, &source, false).unwrap();
        assert_eq!(target.entry_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_merge_overwrite_policy_on_matched_text() {
        let mut target =
            XmlNode::parse_str("<tag><entry name=\"a\">old</entry></tag>").unwrap();
        let source = XmlNode::parse_str("<tag><entry name=\"a\">new</entry></tag>").unwrap();

        let mut kept = target.clone();
        merge_element(&mut kept, &source, false).unwrap();
        assert_eq!(kept.find_entry("a").unwrap().text.as_deref(), Some("old"));

        merge_element(&mut target, &source, true).unwrap();
        assert_eq!(target.find_entry("a").unwrap().text.as_deref(), Some("new"));
    }

    #[test]
    fn test_merge_appends_unnamed_children() {
        // Children without a name attribute never match; they accumulate.
        let mut target =
            XmlNode::parse_str("<entry name=\"a\"><color>color1</color></entry>").unwrap();
        let source =
            XmlNode::parse_str("<entry name=\"a\"><color>color5</color></entry>").unwrap();
        merge_element(&mut target, &source, true).unwrap();
        assert_eq!(target.children_named("color").count(), 2);
    }

    #[test]
    fn test_merge_tag_mismatch() {
        let mut target = XmlNode::new("address");
        let source = XmlNode::new("service");
        assert!(merge_element(&mut target, &source, true).is_err());
    }

    #[test]
    fn test_pretty_print_has_declaration() {
        let out = sample().to_pretty_xml();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(out.contains("<entry name=\"web\">"));
    }
}
