//! Criteria DSL for filtering entities.
//!
//! A criteria map holds field tests evaluated against a candidate entry
//! element. Each key is one of:
//!
//! - a plain field name, compared against the child element's text (string
//!   value), or against a member list by membership (array value, any
//!   overlap; string value, containment in the list);
//! - `name`, compared against the entry's name attribute;
//! - `has-tag`, requiring the tag member list to contain the value;
//! - `value`, compared against the entity's value form (address forms);
//! - an `xpath:`-prefixed key whose remainder is a raw XPath predicate that
//!   must select at least one node relative to the candidate.

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::EngineError;
use crate::xml::{matches as xpath_matches, XPath, XmlNode};

/// A parsed criteria map.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    fields: Map<String, Value>,
}

impl Criteria {
    /// Wrap a JSON map of criteria.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Parse from any JSON value; non-objects are rejected.
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(EngineError::invalid_argument(
                "criteria must be a JSON object",
            )),
        }
    }

    /// Whether the criteria map is empty (matches everything).
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Evaluate against a candidate entry element.
    pub fn matches(&self, node: &XmlNode) -> bool {
        for (key, expected) in &self.fields {
            if let Some(expr) = key.strip_prefix("xpath:") {
                match XPath::parse(expr) {
                    Ok(xpath) => {
                        if !xpath_matches(node, &xpath) {
                            return false;
                        }
                    }
                    Err(e) => {
                        debug!(expr, error = %e, "unparseable xpath criterion never matches");
                        return false;
                    }
                }
                continue;
            }

            let ok = match key.as_str() {
                "name" => value_eq(node.name(), expected),
                "has-tag" => member_test(&node.member_values("tag"), expected),
                "value" => {
                    ["ip-netmask", "ip-range", "fqdn", "ip-wildcard"]
                        .iter()
                        .any(|form| value_eq(node.child_text(form), expected))
                }
                field => field_test(node, field, expected),
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

fn value_eq(actual: Option<&str>, expected: &Value) -> bool {
    match (actual, expected) {
        (Some(actual), Value::String(s)) => actual == s,
        (Some(actual), Value::Array(options)) => options
            .iter()
            .any(|o| o.as_str().map(|s| s == actual).unwrap_or(false)),
        (Some(actual), other) => actual == other.to_string(),
        (None, Value::Null) => true,
        (None, _) => false,
    }
}

fn member_test(members: &[String], expected: &Value) -> bool {
    match expected {
        Value::String(s) => members.iter().any(|m| m == s),
        Value::Array(options) => options.iter().any(|o| {
            o.as_str()
                .map(|s| members.iter().any(|m| m == s))
                .unwrap_or(false)
        }),
        _ => false,
    }
}

fn field_test(node: &XmlNode, field: &str, expected: &Value) -> bool {
    let Some(child) = node.get_child(field) else {
        return false;
    };
    // Member lists match by membership; scalar children by text equality.
    let members: Vec<String> = child
        .children_named("member")
        .filter_map(|m| m.text.clone())
        .collect();
    if !members.is_empty() {
        return member_test(&members, expected);
    }
    match expected {
        Value::Null => true,
        _ => value_eq(child.text.as_deref(), expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn criteria(value: Value) -> Criteria {
        Criteria::from_value(value).unwrap()
    }

    fn rule() -> XmlNode {
        XmlNode::parse_str(
            r#"<entry name="allow-web">
                 <action>allow</action>
                 <source><member>web</member><member>lb</member></source>
                 <tag><member>prod</member></tag>
                 <ip-netmask>10.0.0.1/32</ip-netmask>
               </entry>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_name_and_field_equality() {
        assert!(criteria(json!({"name": "allow-web"})).matches(&rule()));
        assert!(!criteria(json!({"name": "other"})).matches(&rule()));
        assert!(criteria(json!({"action": "allow"})).matches(&rule()));
        assert!(!criteria(json!({"action": "deny"})).matches(&rule()));
    }

    #[test]
    fn test_membership() {
        assert!(criteria(json!({"source": "web"})).matches(&rule()));
        assert!(criteria(json!({"source": ["db", "lb"]})).matches(&rule()));
        assert!(!criteria(json!({"source": "db"})).matches(&rule()));
    }

    #[test]
    fn test_has_tag_and_value() {
        assert!(criteria(json!({"has-tag": "prod"})).matches(&rule()));
        assert!(!criteria(json!({"has-tag": "dev"})).matches(&rule()));
        assert!(criteria(json!({"value": "10.0.0.1/32"})).matches(&rule()));
        assert!(!criteria(json!({"value": "10.0.0.2/32"})).matches(&rule()));
    }

    #[test]
    fn test_field_presence_with_null() {
        assert!(criteria(json!({"action": null})).matches(&rule()));
        assert!(!criteria(json!({"schedule": null})).matches(&rule()));
    }

    #[test]
    fn test_xpath_criterion() {
        assert!(criteria(json!({"xpath:source/member[text()='web']": true})).matches(&rule()));
        assert!(!criteria(json!({"xpath:source/member[text()='db']": true})).matches(&rule()));
    }

    #[test]
    fn test_empty_matches_everything() {
        assert!(criteria(json!({})).matches(&rule()));
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Criteria::from_value(json!(["a"])).is_err());
    }
}
