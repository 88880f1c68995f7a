//! Typed views over object entries.
//!
//! Each view reads the fields the engine needs out of an `entry` element and
//! can rebuild an equivalent element. Views are snapshots; mutations go back
//! through the tree.

use serde::{Deserialize, Serialize};

use crate::types::EngineError;
use crate::xml::XmlNode;

/// The four address value forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddrType {
    /// `ip-netmask` — address or CIDR network.
    IpNetmask,
    /// `ip-range` — `start-end`.
    IpRange,
    /// `fqdn` — fully qualified domain name.
    Fqdn,
    /// `ip-wildcard` — address with wildcard mask.
    IpWildcard,
}

impl AddrType {
    /// The XML element tag for this form.
    pub fn element(&self) -> &'static str {
        match self {
            Self::IpNetmask => "ip-netmask",
            Self::IpRange => "ip-range",
            Self::Fqdn => "fqdn",
            Self::IpWildcard => "ip-wildcard",
        }
    }

    /// All forms, in catalog order.
    pub fn all() -> [AddrType; 4] {
        [Self::IpNetmask, Self::IpRange, Self::Fqdn, Self::IpWildcard]
    }
}

/// An address object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Entry name.
    pub name: String,
    /// Which value form the entry carries.
    pub addr_type: AddrType,
    /// The value text.
    pub value: String,
    /// Optional description.
    pub description: Option<String>,
    /// Tag references.
    pub tags: Vec<String>,
}

impl Address {
    /// Read an address from its entry element.
    pub fn from_node(node: &XmlNode) -> Result<Self, EngineError> {
        let name = entry_name(node)?;
        let (addr_type, value) = AddrType::all()
            .into_iter()
            .find_map(|t| {
                node.child_text(t.element())
                    .map(|v| (t, v.to_string()))
            })
            .ok_or_else(|| {
                EngineError::invalid_argument(format!("address '{name}' has no value form"))
            })?;
        Ok(Self {
            name,
            addr_type,
            value,
            description: node.child_text("description").map(str::to_string),
            tags: node.member_values("tag"),
        })
    }

    /// Build an entry element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::entry(&self.name);
        node.set_child_text(self.addr_type.element(), &self.value);
        if let Some(description) = &self.description {
            node.set_child_text("description", description);
        }
        if !self.tags.is_empty() {
            node.set_members("tag", &self.tags);
        }
        node
    }
}

/// Static member list or dynamic tag filter of an address group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMembership {
    /// `static/member` list.
    Static(Vec<String>),
    /// `dynamic/filter` expression.
    Dynamic(String),
}

/// An address group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressGroup {
    /// Entry name.
    pub name: String,
    /// Static members or dynamic filter.
    pub membership: GroupMembership,
    /// Optional description.
    pub description: Option<String>,
    /// Tag references.
    pub tags: Vec<String>,
}

impl AddressGroup {
    /// Read an address group from its entry element.
    pub fn from_node(node: &XmlNode) -> Result<Self, EngineError> {
        let name = entry_name(node)?;
        let membership = if let Some(static_elem) = node.get_child("static") {
            GroupMembership::Static(
                static_elem
                    .children_named("member")
                    .filter_map(|m| m.text.clone())
                    .collect(),
            )
        } else if let Some(dynamic) = node.get_child("dynamic") {
            GroupMembership::Dynamic(
                dynamic
                    .child_text("filter")
                    .unwrap_or_default()
                    .to_string(),
            )
        } else {
            return Err(EngineError::invalid_argument(format!(
                "address group '{name}' is neither static nor dynamic"
            )));
        };
        Ok(Self {
            name,
            membership,
            description: node.child_text("description").map(str::to_string),
            tags: node.member_values("tag"),
        })
    }

    /// Build an entry element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::entry(&self.name);
        match &self.membership {
            GroupMembership::Static(members) => {
                let mut static_elem = XmlNode::new("static");
                for member in members {
                    static_elem.children.push(XmlNode::with_text("member", member));
                }
                node.children.push(static_elem);
            }
            GroupMembership::Dynamic(filter) => {
                let mut dynamic = XmlNode::new("dynamic");
                dynamic.set_child_text("filter", filter);
                node.children.push(dynamic);
            }
        }
        if let Some(description) = &self.description {
            node.set_child_text("description", description);
        }
        if !self.tags.is_empty() {
            node.set_members("tag", &self.tags);
        }
        node
    }
}

/// A service object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Entry name.
    pub name: String,
    /// Transport protocol element (`tcp`, `udp`, `sctp`).
    pub protocol: String,
    /// Destination port range text.
    pub port: Option<String>,
    /// Source port range text.
    pub source_port: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Tag references.
    pub tags: Vec<String>,
}

impl Service {
    /// Read a service from its entry element.
    pub fn from_node(node: &XmlNode) -> Result<Self, EngineError> {
        let name = entry_name(node)?;
        let protocol_elem = node.get_child("protocol").ok_or_else(|| {
            EngineError::invalid_argument(format!("service '{name}' has no protocol"))
        })?;
        let transport = protocol_elem.children.first().ok_or_else(|| {
            EngineError::invalid_argument(format!("service '{name}' has an empty protocol"))
        })?;
        Ok(Self {
            name,
            protocol: transport.tag.clone(),
            port: transport.child_text("port").map(str::to_string),
            source_port: transport.child_text("source-port").map(str::to_string),
            description: node.child_text("description").map(str::to_string),
            tags: node.member_values("tag"),
        })
    }

    /// Build an entry element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::entry(&self.name);
        let mut transport = XmlNode::new(&self.protocol);
        if let Some(port) = &self.port {
            transport.set_child_text("port", port);
        }
        if let Some(source_port) = &self.source_port {
            transport.set_child_text("source-port", source_port);
        }
        let mut protocol = XmlNode::new("protocol");
        protocol.children.push(transport);
        node.children.push(protocol);
        if let Some(description) = &self.description {
            node.set_child_text("description", description);
        }
        if !self.tags.is_empty() {
            node.set_members("tag", &self.tags);
        }
        node
    }
}

/// A service group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroup {
    /// Entry name.
    pub name: String,
    /// Member service or nested group names.
    pub members: Vec<String>,
    /// Tag references.
    pub tags: Vec<String>,
}

impl ServiceGroup {
    /// Read a service group from its entry element.
    pub fn from_node(node: &XmlNode) -> Result<Self, EngineError> {
        let name = entry_name(node)?;
        Ok(Self {
            name,
            members: node.member_values("members"),
            tags: node.member_values("tag"),
        })
    }

    /// Build an entry element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::entry(&self.name);
        node.set_members("members", &self.members);
        if !self.tags.is_empty() {
            node.set_members("tag", &self.tags);
        }
        node
    }
}

/// A tag object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Entry name.
    pub name: String,
    /// Color code or color name.
    pub color: Option<String>,
    /// Free-text comments.
    pub comments: Option<String>,
}

impl Tag {
    /// Read a tag from its entry element.
    pub fn from_node(node: &XmlNode) -> Result<Self, EngineError> {
        Ok(Self {
            name: entry_name(node)?,
            color: node.child_text("color").map(str::to_string),
            comments: node.child_text("comments").map(str::to_string),
        })
    }

    /// Build an entry element.
    pub fn to_node(&self) -> XmlNode {
        let mut node = XmlNode::entry(&self.name);
        if let Some(color) = &self.color {
            node.set_child_text("color", color);
        }
        if let Some(comments) = &self.comments {
            node.set_child_text("comments", comments);
        }
        node
    }
}

fn entry_name(node: &XmlNode) -> Result<String, EngineError> {
    node.name()
        .map(str::to_string)
        .ok_or_else(|| EngineError::invalid_argument("entry element has no name attribute"))
}

/// Extract the tag names a dynamic group filter refers to.
///
/// Quoted tokens (single or double quotes) are taken verbatim; bare tokens
/// are taken unless they are the boolean operators or parentheses. The
/// tokenizer never looks inside quotes for operators.
pub fn dynamic_filter_tags(filter: &str) -> Vec<String> {
    let mut tags = Vec::new();
    let mut chars = filter.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut token = String::new();
                for inner in chars.by_ref() {
                    if inner == quote {
                        break;
                    }
                    token.push(inner);
                }
                if !token.is_empty() && !tags.contains(&token) {
                    tags.push(token);
                }
            }
            '(' | ')' => {
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut token = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == '\'' || c == '"' {
                        break;
                    }
                    token.push(c);
                    chars.next();
                }
                let lowered = token.to_lowercase();
                if !token.is_empty()
                    && lowered != "and"
                    && lowered != "or"
                    && lowered != "not"
                    && !tags.contains(&token)
                {
                    tags.push(token);
                }
            }
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trip() {
        let node = XmlNode::parse_str(
            r#"<entry name="web">
                 <ip-netmask>10.0.0.1/32</ip-netmask>
                 <description>front end</description>
                 <tag><member>prod</member></tag>
               </entry>"#,
        )
        .unwrap();
        let address = Address::from_node(&node).unwrap();
        assert_eq!(address.addr_type, AddrType::IpNetmask);
        assert_eq!(address.value, "10.0.0.1/32");
        assert_eq!(address.tags, vec!["prod"]);

        let rebuilt = address.to_node();
        assert_eq!(rebuilt.child_text("ip-netmask"), Some("10.0.0.1/32"));
        assert_eq!(Address::from_node(&rebuilt).unwrap(), address);
    }

    #[test]
    fn test_address_requires_value_form() {
        let node = XmlNode::parse_str("<entry name=\"empty\"/>").unwrap();
        assert!(Address::from_node(&node).is_err());
    }

    #[test]
    fn test_address_group_static_and_dynamic() {
        let static_node = XmlNode::parse_str(
            "<entry name=\"g1\"><static><member>a</member><member>b</member></static></entry>",
        )
        .unwrap();
        let group = AddressGroup::from_node(&static_node).unwrap();
        assert_eq!(
            group.membership,
            GroupMembership::Static(vec!["a".to_string(), "b".to_string()])
        );

        let dynamic_node = XmlNode::parse_str(
            "<entry name=\"g2\"><dynamic><filter>'web' and 'prod'</filter></dynamic></entry>",
        )
        .unwrap();
        let group = AddressGroup::from_node(&dynamic_node).unwrap();
        assert_eq!(
            group.membership,
            GroupMembership::Dynamic("'web' and 'prod'".to_string())
        );
    }

    #[test]
    fn test_service_round_trip() {
        let node = XmlNode::parse_str(
            r#"<entry name="http-alt">
                 <protocol><tcp><port>8080-8081</port><source-port>1024-65535</source-port></tcp></protocol>
               </entry>"#,
        )
        .unwrap();
        let service = Service::from_node(&node).unwrap();
        assert_eq!(service.protocol, "tcp");
        assert_eq!(service.port.as_deref(), Some("8080-8081"));
        assert_eq!(service.source_port.as_deref(), Some("1024-65535"));
        assert_eq!(Service::from_node(&service.to_node()).unwrap(), service);
    }

    #[test]
    fn test_dynamic_filter_tags_quoted() {
        assert_eq!(
            dynamic_filter_tags("'web servers' and 'prod'"),
            vec!["web servers", "prod"]
        );
        assert_eq!(
            dynamic_filter_tags("\"a\" or ('b' and 'c')"),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn test_dynamic_filter_tags_bare_and_operators() {
        assert_eq!(dynamic_filter_tags("web and not db"), vec!["web", "db"]);
        // Operator words inside quotes are tag text, not operators.
        assert_eq!(dynamic_filter_tags("'and' or plain"), vec!["and", "plain"]);
        assert!(dynamic_filter_tags("").is_empty());
    }
}
