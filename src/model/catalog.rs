//! Attribute catalog: which sub-elements exist in which PAN-OS version.
//!
//! This table is the sole source of truth for the version adapter. An
//! element listed here is legal only from its `introduced` version onward;
//! elements not listed are version-neutral. `required_from` marks elements
//! a target version refuses to live without.

use crate::types::version::{PanOsVersion, V10_2, V11_0};
use crate::types::{ObjectKind, RuleKind};

/// Version bounds of one sub-element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpan {
    /// Sub-element tag.
    pub element: &'static str,
    /// First version in which the element is legal.
    pub introduced: PanOsVersion,
    /// Version from which the element becomes mandatory, if any.
    pub required_from: Option<PanOsVersion>,
}

impl AttributeSpan {
    const fn new(element: &'static str, introduced: PanOsVersion) -> Self {
        Self {
            element,
            introduced,
            required_from: None,
        }
    }

    const fn required(element: &'static str, introduced: PanOsVersion) -> Self {
        Self {
            element,
            introduced,
            required_from: Some(introduced),
        }
    }

    /// Whether the element is legal at the given version.
    pub fn supported_in(&self, version: PanOsVersion) -> bool {
        version >= self.introduced
    }

    /// Whether the element is mandatory at the given version.
    pub fn required_in(&self, version: PanOsVersion) -> bool {
        self.required_from.map(|v| version >= v).unwrap_or(false)
    }
}

const ADDRESS_SPANS: &[AttributeSpan] = &[
    AttributeSpan::new("enable-override", V10_2),
    AttributeSpan::new("override-session-timeout", V10_2),
    AttributeSpan::new("whitelist", V10_2),
];

const EXTERNAL_LIST_SPANS: &[AttributeSpan] = &[
    AttributeSpan::new("auth", V10_2),
    AttributeSpan::new("client-cert", V10_2),
    AttributeSpan::new("client-key", V10_2),
    AttributeSpan::new("certificate-profile", V10_2),
];

const SECURITY_RULE_SPANS: &[AttributeSpan] = &[
    AttributeSpan::new("disable-server-response-inspection", V10_2),
    AttributeSpan::new("ssl-decrypt-mirror", V11_0),
    AttributeSpan::new("url-category-match", V11_0),
    AttributeSpan::new("rule-type", V11_0),
];

const NAT_RULE_SPANS: &[AttributeSpan] = &[AttributeSpan::required("fallback", V10_2)];

const PBF_RULE_SPANS: &[AttributeSpan] = &[AttributeSpan::new("symmetric-return-addresses", V10_2)];

const DECRYPTION_RULE_SPANS: &[AttributeSpan] = &[
    AttributeSpan::new("ssl-protocol-version-min", V10_2),
    AttributeSpan::new("tls13-action", V11_0),
];

/// Version-sensitive sub-elements of an object kind.
pub fn object_catalog(kind: ObjectKind) -> &'static [AttributeSpan] {
    match kind {
        ObjectKind::Address => ADDRESS_SPANS,
        ObjectKind::ExternalList => EXTERNAL_LIST_SPANS,
        _ => &[],
    }
}

/// Version-sensitive sub-elements of a rule kind.
pub fn rule_catalog(kind: RuleKind) -> &'static [AttributeSpan] {
    match kind {
        RuleKind::Security => SECURITY_RULE_SPANS,
        RuleKind::Nat => NAT_RULE_SPANS,
        RuleKind::Pbf => PBF_RULE_SPANS,
        RuleKind::Decryption => DECRYPTION_RULE_SPANS,
        _ => &[],
    }
}

/// First version that accepts named tag colors. Older targets only take
/// numeric codes.
pub const NAMED_COLOR_EPOCH: PanOsVersion = V10_2;

/// Recognized tag color names, in code order.
pub const NAMED_COLORS: [&str; 39] = [
    "red",
    "green",
    "blue",
    "yellow",
    "copper",
    "orange",
    "purple",
    "gray",
    "light-green",
    "cyan",
    "light-gray",
    "blue-gray",
    "lime",
    "black",
    "gold",
    "brown",
    "olive",
    "maroon",
    "red-orange",
    "yellow-orange",
    "forest-green",
    "turquoise-blue",
    "azure-blue",
    "cerulean-blue",
    "midnight-blue",
    "medium-blue",
    "cobalt-blue",
    "violet-blue",
    "blue-violet",
    "medium-violet",
    "medium-rose",
    "lavender",
    "orchid",
    "thistle",
    "plum",
    "raspberry",
    "crimson",
    "rose",
    "magenta",
];

/// Numeric code for a named color; unknown names take the default code `1`.
pub fn named_color_code(name: &str) -> String {
    NAMED_COLORS
        .iter()
        .position(|n| n.eq_ignore_ascii_case(name))
        .map(|idx| (idx + 1).to_string())
        .unwrap_or_else(|| "1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::version::{V10_1, V11_2};

    #[test]
    fn test_security_rule_transitions() {
        let spans = rule_catalog(RuleKind::Security);
        let find = |el: &str| spans.iter().find(|s| s.element == el).unwrap();

        // 11.x-only elements disappear at or below 10.2.
        for el in ["ssl-decrypt-mirror", "url-category-match", "rule-type"] {
            assert!(!find(el).supported_in(V10_2));
            assert!(find(el).supported_in(V11_0));
        }
        // disable-server-response-inspection is 10.2+, gone at 10.1.
        assert!(!find("disable-server-response-inspection").supported_in(V10_1));
        assert!(find("disable-server-response-inspection").supported_in(V10_2));
    }

    #[test]
    fn test_nat_fallback_required_from_10_2() {
        let span = &rule_catalog(RuleKind::Nat)[0];
        assert_eq!(span.element, "fallback");
        assert!(!span.supported_in(V10_1));
        assert!(span.required_in(V10_2));
        assert!(span.required_in(V11_2));
        assert!(!span.required_in(V10_1));
    }

    #[test]
    fn test_pbf_and_decryption_transitions() {
        let pbf = &rule_catalog(RuleKind::Pbf)[0];
        assert_eq!(pbf.element, "symmetric-return-addresses");
        assert!(!pbf.supported_in(V10_1));

        let decryption = rule_catalog(RuleKind::Decryption);
        let min = decryption
            .iter()
            .find(|s| s.element == "ssl-protocol-version-min")
            .unwrap();
        assert!(!min.supported_in(V10_1));
        assert!(min.supported_in(V10_2));
        let tls13 = decryption
            .iter()
            .find(|s| s.element == "tls13-action")
            .unwrap();
        assert!(!tls13.supported_in(V10_2));
        assert!(tls13.supported_in(V11_0));
    }

    #[test]
    fn test_object_catalogs() {
        assert!(!object_catalog(ObjectKind::Address).is_empty());
        assert!(!object_catalog(ObjectKind::ExternalList).is_empty());
        assert!(object_catalog(ObjectKind::Tag).is_empty());
        assert!(rule_catalog(RuleKind::Qos).is_empty());
    }

    #[test]
    fn test_named_color_codes() {
        assert_eq!(named_color_code("red"), "1");
        assert_eq!(named_color_code("Blue"), "3");
        assert_eq!(named_color_code("magenta"), "39");
        assert_eq!(named_color_code("not-a-color"), "1");
    }
}
