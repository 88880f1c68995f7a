//! XPath-subset parsing and evaluation.
//!
//! The resolver emits, and the criteria DSL consumes, a small XPath subset:
//! `/`-separated child steps, the `*` wildcard, and predicates of the forms
//! `[@attr='v']`, `[@attr]`, `[child='v']`, `[child]`, and `[text()='v']`.
//! Anything outside that subset is rejected with
//! [`EngineError::InvalidXPath`].

use crate::types::EngineError;
use crate::xml::node::XmlNode;
use crate::xml::tree::NodePath;

/// A parsed XPath expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPath {
    /// True when the expression started with `/` (matched from the root).
    pub absolute: bool,
    /// Location steps, outermost first.
    pub steps: Vec<Step>,
}

/// One location step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Tag test.
    pub tag: StepTag,
    /// Conjunctive predicates.
    pub predicates: Vec<Predicate>,
}

/// Tag test of a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTag {
    /// Exact element name.
    Name(String),
    /// `*` — any element.
    Wildcard,
}

/// A step predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `[@attr='value']`
    AttrEq(String, String),
    /// `[@attr]`
    AttrPresent(String),
    /// `[text()='value']`
    TextEq(String),
    /// `[child='value']`
    ChildEq(String, String),
    /// `[child]`
    ChildPresent(String),
}

impl XPath {
    /// Parse an expression.
    pub fn parse(expr: &str) -> Result<Self, EngineError> {
        Parser::new(expr).parse()
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            if self.absolute || i > 0 {
                out.push('/');
            }
            match &step.tag {
                StepTag::Name(n) => out.push_str(n),
                StepTag::Wildcard => out.push('*'),
            }
            for pred in &step.predicates {
                match pred {
                    Predicate::AttrEq(k, v) => out.push_str(&format!("[@{k}='{v}']")),
                    Predicate::AttrPresent(k) => out.push_str(&format!("[@{k}]")),
                    Predicate::TextEq(v) => out.push_str(&format!("[text()='{v}']")),
                    Predicate::ChildEq(k, v) => out.push_str(&format!("[{k}='{v}']")),
                    Predicate::ChildPresent(k) => out.push_str(&format!("[{k}]")),
                }
            }
        }
        out
    }
}

impl std::fmt::Display for XPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    original: &'a str,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            chars: expr.chars().peekable(),
            original: expr,
        }
    }

    fn error(&self, message: &str) -> EngineError {
        EngineError::InvalidXPath(format!("{message} in '{}'", self.original))
    }

    fn parse(mut self) -> Result<XPath, EngineError> {
        let absolute = self.chars.peek() == Some(&'/');
        if absolute {
            self.chars.next();
        }
        let mut steps = Vec::new();
        loop {
            steps.push(self.parse_step()?);
            match self.chars.next() {
                None => break,
                Some('/') => continue,
                Some(c) => return Err(self.error(&format!("unexpected '{c}'"))),
            }
        }
        if steps.is_empty() {
            return Err(self.error("empty expression"));
        }
        Ok(XPath { absolute, steps })
    }

    fn parse_step(&mut self) -> Result<Step, EngineError> {
        let tag = if self.chars.peek() == Some(&'*') {
            self.chars.next();
            StepTag::Wildcard
        } else {
            let name = self.parse_name()?;
            if name.is_empty() {
                return Err(self.error("expected element name"));
            }
            StepTag::Name(name)
        };
        let mut predicates = Vec::new();
        while self.chars.peek() == Some(&'[') {
            self.chars.next();
            predicates.push(self.parse_predicate()?);
            match self.chars.next() {
                Some(']') => {}
                _ => return Err(self.error("unterminated predicate")),
            }
        }
        Ok(Step { tag, predicates })
    }

    fn parse_name(&mut self) -> Result<String, EngineError> {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Ok(name)
    }

    fn parse_predicate(&mut self) -> Result<Predicate, EngineError> {
        if self.chars.peek() == Some(&'@') {
            self.chars.next();
            let attr = self.parse_name()?;
            if attr.is_empty() {
                return Err(self.error("expected attribute name"));
            }
            if self.chars.peek() == Some(&'=') {
                self.chars.next();
                let value = self.parse_quoted()?;
                return Ok(Predicate::AttrEq(attr, value));
            }
            return Ok(Predicate::AttrPresent(attr));
        }

        let name = self.parse_name()?;
        if name.is_empty() {
            return Err(self.error("expected predicate"));
        }
        // text() function test
        if name == "text" && self.chars.peek() == Some(&'(') {
            self.chars.next();
            if self.chars.next() != Some(')') {
                return Err(self.error("malformed text()"));
            }
            if self.chars.next() != Some('=') {
                return Err(self.error("text() predicate requires a comparison"));
            }
            let value = self.parse_quoted()?;
            return Ok(Predicate::TextEq(value));
        }
        if self.chars.peek() == Some(&'=') {
            self.chars.next();
            let value = self.parse_quoted()?;
            return Ok(Predicate::ChildEq(name, value));
        }
        Ok(Predicate::ChildPresent(name))
    }

    fn parse_quoted(&mut self) -> Result<String, EngineError> {
        let quote = match self.chars.next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted value")),
        };
        let mut value = String::new();
        for c in self.chars.by_ref() {
            if c == quote {
                return Ok(value);
            }
            value.push(c);
        }
        Err(self.error("unterminated quoted value"))
    }
}

fn predicate_matches(node: &XmlNode, pred: &Predicate) -> bool {
    match pred {
        Predicate::AttrEq(k, v) => node.attr(k) == Some(v.as_str()),
        Predicate::AttrPresent(k) => node.attr(k).is_some(),
        Predicate::TextEq(v) => node.text.as_deref() == Some(v.as_str()),
        Predicate::ChildEq(k, v) => node.child_text(k) == Some(v.as_str()),
        Predicate::ChildPresent(k) => node.get_child(k).is_some(),
    }
}

fn step_matches(node: &XmlNode, step: &Step) -> bool {
    let tag_ok = match &step.tag {
        StepTag::Name(n) => node.tag == *n,
        StepTag::Wildcard => true,
    };
    tag_ok && step.predicates.iter().all(|p| predicate_matches(node, p))
}

/// Find all matching node paths for an expression against a tree root.
///
/// Absolute expressions test their first step against the root element
/// itself; relative expressions descend from the root's children.
pub fn find_paths(root: &XmlNode, xpath: &XPath) -> Vec<NodePath> {
    let mut out = Vec::new();
    if xpath.absolute {
        if let Some(first) = xpath.steps.first() {
            if step_matches(root, first) {
                descend(root, NodePath::root(), &xpath.steps[1..], &mut out);
            }
        }
    } else {
        descend(root, NodePath::root(), &xpath.steps, &mut out);
    }
    out
}

fn descend(node: &XmlNode, path: NodePath, steps: &[Step], out: &mut Vec<NodePath>) {
    let Some(step) = steps.first() else {
        out.push(path);
        return;
    };
    for (idx, child) in node.children.iter().enumerate() {
        if step_matches(child, step) {
            descend(child, path.child(idx), &steps[1..], out);
        }
    }
}

/// Select matching nodes relative to an element (predicate evaluation for
/// the criteria DSL and reference projections).
pub fn select<'a>(node: &'a XmlNode, xpath: &XPath) -> Vec<&'a XmlNode> {
    let mut out = Vec::new();
    if xpath.absolute {
        if let Some(first) = xpath.steps.first() {
            if step_matches(node, first) {
                select_descend(node, &xpath.steps[1..], &mut out);
            }
        }
    } else {
        select_descend(node, &xpath.steps, &mut out);
    }
    out
}

fn select_descend<'a>(node: &'a XmlNode, steps: &[Step], out: &mut Vec<&'a XmlNode>) {
    let Some(step) = steps.first() else {
        out.push(node);
        return;
    };
    for child in &node.children {
        if step_matches(child, step) {
            select_descend(child, &steps[1..], out);
        }
    }
}

/// Whether an expression matches at least once relative to an element.
pub fn matches(node: &XmlNode, xpath: &XPath) -> bool {
    !select(node, xpath).is_empty()
}

/// First matching path, if any.
pub fn find_first(root: &XmlNode, xpath: &XPath) -> Option<NodePath> {
    find_paths(root, xpath).into_iter().next()
}

/// Walk an absolute expression, creating missing elements along the way, and
/// return the path of the final element.
///
/// Creation is only defined for plain name steps and steps whose sole
/// predicate is `[@name='...']` (an `entry`-style element); a missing element
/// behind any other predicate is an error.
pub fn ensure_path(root: &mut XmlNode, xpath: &XPath) -> Result<NodePath, EngineError> {
    if !xpath.absolute {
        return Err(EngineError::InvalidXPath(
            "ensure_path requires an absolute expression".to_string(),
        ));
    }
    let Some(first) = xpath.steps.first() else {
        return Err(EngineError::InvalidXPath("empty expression".to_string()));
    };
    if !step_matches(root, first) {
        return Err(EngineError::InvalidXPath(format!(
            "expression root does not match document root '{}'",
            root.tag
        )));
    }

    let mut node = root;
    let mut path = NodePath::root();
    for step in &xpath.steps[1..] {
        let existing = node
            .children
            .iter()
            .position(|c| step_matches(c, step));
        let idx = match existing {
            Some(idx) => idx,
            None => {
                let created = create_for_step(step)?;
                node.children.push(created);
                node.children.len() - 1
            }
        };
        path = path.child(idx);
        node = &mut node.children[idx];
    }
    Ok(path)
}

fn create_for_step(step: &Step) -> Result<XmlNode, EngineError> {
    let StepTag::Name(tag) = &step.tag else {
        return Err(EngineError::InvalidXPath(
            "cannot create an element for a wildcard step".to_string(),
        ));
    };
    let mut node = XmlNode::new(tag.clone());
    match step.predicates.as_slice() {
        [] => Ok(node),
        [Predicate::AttrEq(k, v)] => {
            node.set_attr(k.clone(), v.clone());
            Ok(node)
        }
        _ => Err(EngineError::InvalidXPath(format!(
            "cannot create an element for predicated step '{tag}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> XmlNode {
        XmlNode::parse_str(
            r#"<config>
                 <devices>
                   <entry name="localhost.localdomain">
                     <vsys>
                       <entry name="vsys1">
                         <address>
                           <entry name="web"><ip-netmask>10.0.0.1/32</ip-netmask></entry>
                         </address>
                       </entry>
                     </vsys>
                   </entry>
                 </devices>
                 <shared>
                   <address>
                     <entry name="dns"><fqdn>dns.example.com</fqdn></entry>
                   </address>
                 </shared>
               </config>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_and_render() {
        let expr = "/config/devices/entry[@name='localhost.localdomain']/vsys/entry[@name='vsys1']";
        let xpath = XPath::parse(expr).unwrap();
        assert!(xpath.absolute);
        assert_eq!(xpath.steps.len(), 5);
        assert_eq!(xpath.to_string(), expr);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(XPath::parse("").is_err());
        assert!(XPath::parse("/config/entry[@name='x]").is_err());
        assert!(XPath::parse("/config/entry[@name=x]").is_err());
        assert!(XPath::parse("//config").is_err());
        assert!(XPath::parse("/config/child::entry").is_err());
    }

    #[test]
    fn test_absolute_lookup() {
        let root = tree();
        let xpath = XPath::parse(
            "/config/devices/entry[@name='localhost.localdomain']/vsys/entry[@name='vsys1']/address/entry[@name='web']",
        )
        .unwrap();
        let paths = find_paths(&root, &xpath);
        assert_eq!(paths.len(), 1);
        let node = paths[0].resolve(&root).unwrap();
        assert_eq!(node.child_text("ip-netmask"), Some("10.0.0.1/32"));
    }

    #[test]
    fn test_wildcard_and_child_predicates() {
        let root = tree();
        let xpath = XPath::parse("/config/*/address/entry[fqdn='dns.example.com']").unwrap();
        let paths = find_paths(&root, &xpath);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].resolve(&root).unwrap().name(), Some("dns"));
    }

    #[test]
    fn test_relative_select() {
        let root = tree();
        let entry = select(
            &root,
            &XPath::parse("shared/address/entry[@name='dns']").unwrap(),
        );
        assert_eq!(entry.len(), 1);

        let rule = XmlNode::parse_str(
            "<entry name=\"r\"><source><member>a</member><member>b</member></source></entry>",
        )
        .unwrap();
        let members = select(&rule, &XPath::parse("source/member").unwrap());
        assert_eq!(members.len(), 2);
        assert!(matches(&rule, &XPath::parse("source/member[text()='a']").unwrap()));
        assert!(!matches(&rule, &XPath::parse("source/member[text()='z']").unwrap()));
    }

    #[test]
    fn test_ensure_path_creates_entries() {
        let mut root = XmlNode::parse_str("<config><shared/></config>").unwrap();
        let xpath = XPath::parse(
            "/config/devices/entry[@name='localhost.localdomain']/device-group/entry[@name='DG1']/address",
        )
        .unwrap();
        let path = ensure_path(&mut root, &xpath).unwrap();
        let node = path.resolve(&root).unwrap();
        assert_eq!(node.tag, "address");

        // Walking the same expression again reuses existing nodes.
        let again = ensure_path(&mut root, &xpath).unwrap();
        assert_eq!(path, again);
        assert_eq!(root.get_child("devices").unwrap().children.len(), 1);
    }

    #[test]
    fn test_ensure_path_rejects_uncreatable() {
        let mut root = XmlNode::parse_str("<config/>").unwrap();
        let xpath = XPath::parse("/config/rulebase/entry[bi-directional='yes']").unwrap();
        assert!(ensure_path(&mut root, &xpath).is_err());
    }
}
