//! Cross-version attribute adaptation.
//!
//! Any copy between versions runs the element through this adapter: the
//! attribute catalog says which sub-elements the target version refuses, and
//! which it demands. Removals are silent (logged); a missing required
//! element fails the copy unless the caller opted into tolerant mode. The
//! two conversions that are not pure element presence — tag color codes and
//! NAT `fallback` — are hard-coded here.

use tracing::{debug, warn};

use crate::model::catalog::{
    named_color_code, object_catalog, rule_catalog, AttributeSpan, NAMED_COLOR_EPOCH,
};
use crate::types::{EngineError, ObjectKind, PanOsVersion, RuleKind};
use crate::xml::XmlNode;

/// Adapts elements from a source version to a target version.
#[derive(Debug, Clone, Copy)]
pub struct VersionAdapter {
    /// Version the element came from.
    pub source: PanOsVersion,
    /// Version the element is headed to.
    pub target: PanOsVersion,
    /// When set, a missing required element logs a warning instead of
    /// failing the copy.
    pub tolerant: bool,
}

impl VersionAdapter {
    /// Create an adapter for a version transition.
    pub fn new(source: PanOsVersion, target: PanOsVersion) -> Self {
        Self {
            source,
            target,
            tolerant: false,
        }
    }

    /// Switch to tolerant mode.
    pub fn tolerant(mut self) -> Self {
        self.tolerant = true;
        self
    }

    /// Adapt an object entry in place. Returns the adaptation notes.
    pub fn adapt_object(
        &self,
        node: &mut XmlNode,
        kind: ObjectKind,
    ) -> Result<Vec<String>, EngineError> {
        if self.source == self.target {
            return Ok(Vec::new());
        }
        let mut notes = self.apply_catalog(node, kind.as_str(), object_catalog(kind))?;

        // Tag colors: named colors only exist from the named-color epoch on.
        if kind == ObjectKind::Tag && self.target < NAMED_COLOR_EPOCH {
            if let Some(color) = node.get_child_mut("color") {
                if let Some(text) = &color.text {
                    let bare = text.strip_prefix("color").unwrap_or(text);
                    if bare.parse::<u32>().is_err() {
                        let code = named_color_code(text);
                        debug!(from = %text, to = %code, "converting named color for older target");
                        notes.push(format!("converted named color '{text}' to code {code}"));
                        color.text = Some(code);
                    }
                }
            }
        }

        Ok(notes)
    }

    /// Adapt a rule entry in place. Returns the adaptation notes.
    pub fn adapt_rule(
        &self,
        node: &mut XmlNode,
        kind: RuleKind,
    ) -> Result<Vec<String>, EngineError> {
        if self.source == self.target {
            return Ok(Vec::new());
        }
        self.apply_catalog(node, kind.as_str(), rule_catalog(kind))
    }

    fn apply_catalog(
        &self,
        node: &mut XmlNode,
        kind_label: &str,
        spans: &[AttributeSpan],
    ) -> Result<Vec<String>, EngineError> {
        let name = node.name().unwrap_or("unknown").to_string();
        let mut notes = Vec::new();

        for span in spans {
            if !span.supported_in(self.target) {
                let mut removed = 0;
                while node.remove_child_named(span.element).is_some() {
                    removed += 1;
                }
                if removed > 0 {
                    debug!(
                        element = span.element,
                        kind = kind_label,
                        name = %name,
                        target = %self.target,
                        "removed element unsupported in target version"
                    );
                    notes.push(format!(
                        "removed '{}' (unsupported in {})",
                        span.element, self.target
                    ));
                }
                continue;
            }

            if span.required_in(self.target) && node.get_child(span.element).is_none() {
                // NAT fallback is the one element the engine may synthesize:
                // the neutral value 'none' is defined by the schema itself.
                if span.element == "fallback" {
                    node.children.push(XmlNode::with_text("fallback", "none"));
                    notes.push(format!(
                        "inserted default '<fallback>none</fallback>' required by {}",
                        self.target
                    ));
                    continue;
                }
                if self.tolerant {
                    warn!(
                        element = span.element,
                        kind = kind_label,
                        name = %name,
                        target = %self.target,
                        "required element missing; continuing in tolerant mode"
                    );
                    notes.push(format!(
                        "missing required '{}' for {}",
                        span.element, self.target
                    ));
                    continue;
                }
                return Err(EngineError::VersionIncompatible {
                    kind: kind_label.to_string(),
                    name,
                    element: span.element.to_string(),
                    target_version: self.target.to_string(),
                });
            }
        }
        Ok(notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::version::{V10_1, V10_2, V11_2};

    fn security_rule_11x() -> XmlNode {
        XmlNode::parse_str(
            r#"<entry name="r1">
                 <action>allow</action>
                 <rule-type>universal</rule-type>
                 <ssl-decrypt-mirror>if1</ssl-decrypt-mirror>
                 <url-category-match>any</url-category-match>
                 <disable-server-response-inspection>yes</disable-server-response-inspection>
                 <source><member>any</member></source>
               </entry>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_downgrade_security_rule_to_10_1() {
        let mut rule = security_rule_11x();
        let adapter = VersionAdapter::new(V11_2, V10_1);
        let notes = adapter.adapt_rule(&mut rule, RuleKind::Security).unwrap();

        for element in [
            "rule-type",
            "ssl-decrypt-mirror",
            "url-category-match",
            "disable-server-response-inspection",
        ] {
            assert!(rule.get_child(element).is_none(), "{element} should be gone");
        }
        // Everything else is preserved.
        assert_eq!(rule.child_text("action"), Some("allow"));
        assert_eq!(rule.member_values("source"), vec!["any"]);
        assert_eq!(notes.len(), 4);
    }

    #[test]
    fn test_downgrade_to_10_2_keeps_dsri() {
        let mut rule = security_rule_11x();
        let adapter = VersionAdapter::new(V11_2, V10_2);
        adapter.adapt_rule(&mut rule, RuleKind::Security).unwrap();
        assert!(rule.get_child("rule-type").is_none());
        assert!(rule
            .get_child("disable-server-response-inspection")
            .is_some());
    }

    #[test]
    fn test_nat_fallback_synthesized_on_upgrade() {
        let mut rule = XmlNode::parse_str("<entry name=\"n1\"><service>any</service></entry>").unwrap();
        let adapter = VersionAdapter::new(V10_1, V10_2);
        let notes = adapter.adapt_rule(&mut rule, RuleKind::Nat).unwrap();
        assert_eq!(rule.child_text("fallback"), Some("none"));
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_nat_fallback_removed_on_downgrade() {
        let mut rule =
            XmlNode::parse_str("<entry name=\"n1\"><fallback>none</fallback></entry>").unwrap();
        let adapter = VersionAdapter::new(V10_2, V10_1);
        adapter.adapt_rule(&mut rule, RuleKind::Nat).unwrap();
        assert!(rule.get_child("fallback").is_none());
    }

    #[test]
    fn test_same_version_is_identity() {
        let mut rule = security_rule_11x();
        let before = rule.clone();
        VersionAdapter::new(V11_2, V11_2)
            .adapt_rule(&mut rule, RuleKind::Security)
            .unwrap();
        assert_eq!(rule, before);
    }

    #[test]
    fn test_named_color_converted_for_old_target() {
        let mut tag =
            XmlNode::parse_str("<entry name=\"t\"><color>azure-blue</color></entry>").unwrap();
        VersionAdapter::new(V11_2, V10_1)
            .adapt_object(&mut tag, ObjectKind::Tag)
            .unwrap();
        assert_eq!(tag.child_text("color"), Some("23"));

        // Numeric codes pass through untouched.
        let mut tag =
            XmlNode::parse_str("<entry name=\"t\"><color>color5</color></entry>").unwrap();
        VersionAdapter::new(V11_2, V10_1)
            .adapt_object(&mut tag, ObjectKind::Tag)
            .unwrap();
        assert_eq!(tag.child_text("color"), Some("color5"));
    }

    #[test]
    fn test_address_override_removed_for_10_1() {
        let mut address = XmlNode::parse_str(
            "<entry name=\"a\"><ip-netmask>1.1.1.1</ip-netmask><enable-override>yes</enable-override></entry>",
        )
        .unwrap();
        VersionAdapter::new(V10_2, V10_1)
            .adapt_object(&mut address, ObjectKind::Address)
            .unwrap();
        assert!(address.get_child("enable-override").is_none());
        assert!(address.get_child("ip-netmask").is_some());
    }
}
