//! Structural validation of entities.
//!
//! Validation never mutates; it returns `(ok, errors)` with human-readable
//! messages. The checks cover the well-known structural constraints per
//! kind, not the full vendor schema.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

use regex_lite::Regex;

use crate::model::catalog::NAMED_COLORS;
use crate::types::kind::SECURITY_PROFILE_KINDS;
use crate::types::{ObjectKind, RuleKind};
use crate::xml::XmlNode;

fn fqdn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9\-]*[A-Za-z0-9])?)*$")
            .unwrap()
    })
}

fn time_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]-([01][0-9]|2[0-3]):[0-5][0-9]$").unwrap())
}

fn datetime_range_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\d{4}/\d{2}/\d{2}@([01][0-9]|2[0-3]):[0-5][0-9]-\d{4}/\d{2}/\d{2}@([01][0-9]|2[0-3]):[0-5][0-9]$",
        )
        .unwrap()
    })
}

/// Validate an object entry against the structural rules of its kind.
pub fn validate_object(node: &XmlNode, kind: ObjectKind) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    match node.name() {
        None => errors.push("entry has no name attribute".to_string()),
        Some("") => errors.push("entry name is empty".to_string()),
        Some(_) => {}
    }

    match kind {
        ObjectKind::Address => validate_address(node, &mut errors),
        ObjectKind::AddressGroup => validate_address_group(node, &mut errors),
        ObjectKind::Service => validate_service(node, &mut errors),
        ObjectKind::ServiceGroup => validate_service_group(node, &mut errors),
        ObjectKind::Tag => validate_tag(node, &mut errors),
        ObjectKind::ExternalList => validate_edl(node, &mut errors),
        ObjectKind::Schedule => validate_schedule(node, &mut errors),
        ObjectKind::SecurityProfileGroup => validate_profile_group(node, &mut errors),
        _ => {}
    }

    (errors.is_empty(), errors)
}

/// Validate a rule entry. Only well-known structural constraints are
/// checked; rulebase semantics are out of scope.
pub fn validate_rule(node: &XmlNode, kind: RuleKind) -> (bool, Vec<String>) {
    let mut errors = Vec::new();
    match node.name() {
        None => errors.push("rule entry has no name attribute".to_string()),
        Some("") => errors.push("rule name is empty".to_string()),
        Some(_) => {}
    }
    // Only NAT rules may carry a bi-directional element.
    if kind != RuleKind::Nat && node.get_child("bi-directional").is_some() {
        errors.push(format!(
            "bi-directional is not valid on a {kind} rule"
        ));
    }
    (errors.is_empty(), errors)
}

fn validate_address(node: &XmlNode, errors: &mut Vec<String>) {
    let forms = ["ip-netmask", "ip-range", "fqdn", "ip-wildcard"];
    let present: Vec<&str> = forms
        .iter()
        .filter(|f| node.get_child(f).is_some())
        .copied()
        .collect();

    match present.as_slice() {
        [] => {
            errors.push(format!(
                "address must have one of these types: {}",
                forms.join(", ")
            ));
            return;
        }
        [_] => {}
        many => {
            errors.push(format!(
                "address carries multiple value forms: {}",
                many.join(", ")
            ));
        }
    }

    for form in present {
        let value = node.child_text(form).unwrap_or("");
        let ok = match form {
            "ip-netmask" => is_valid_ip_netmask(value),
            "ip-range" => is_valid_ip_range(value),
            "fqdn" => is_valid_fqdn(value),
            "ip-wildcard" => is_valid_ip_wildcard(value),
            _ => true,
        };
        if !ok {
            errors.push(format!("invalid {form} value: '{value}'"));
        }
    }
}

fn validate_address_group(node: &XmlNode, errors: &mut Vec<String>) {
    let static_elem = node.get_child("static");
    let dynamic_elem = node.get_child("dynamic");

    match (static_elem, dynamic_elem) {
        (None, None) => {
            errors.push("address group must be either static or dynamic".to_string());
        }
        (Some(_), Some(_)) => {
            errors.push("address group cannot be both static and dynamic".to_string());
        }
        _ => {}
    }

    if let Some(static_elem) = static_elem {
        let members: Vec<_> = static_elem.children_named("member").collect();
        if members.is_empty() {
            errors.push("static address group has no members".to_string());
        }
        for member in members {
            if member.text.as_deref().map(str::trim).unwrap_or("").is_empty() {
                errors.push("empty member in static address group".to_string());
            }
        }
    }

    if let Some(dynamic_elem) = dynamic_elem {
        match dynamic_elem.child_text("filter").map(str::trim) {
            None | Some("") => {
                errors.push("dynamic address group has an empty filter expression".to_string());
            }
            Some(filter) => {
                if let Err(reason) = check_dynamic_filter(filter) {
                    errors.push(format!("invalid dynamic filter expression: {reason}"));
                }
            }
        }
    }
}

/// A dynamic filter may contain quoted tag tokens, the operators `and`,
/// `or`, `not`, and parentheses. Quotes must balance.
fn check_dynamic_filter(filter: &str) -> Result<(), String> {
    let mut chars = filter.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == quote {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err("unbalanced quotes".to_string());
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
                if lowered != "and" && lowered != "or" && lowered != "not" {
                    return Err(format!("unquoted token '{token}'"));
                }
            }
        }
    }
    Ok(())
}

fn validate_service(node: &XmlNode, errors: &mut Vec<String>) {
    let Some(protocol) = node.get_child("protocol") else {
        errors.push("service is missing a protocol element".to_string());
        return;
    };
    let Some(transport) = protocol.children.first() else {
        errors.push("service protocol element is empty".to_string());
        return;
    };

    match transport.tag.as_str() {
        "tcp" | "udp" | "sctp" => {
            match transport.child_text("port") {
                None | Some("") => errors.push(format!(
                    "service is missing a port element for {} protocol",
                    transport.tag
                )),
                Some(port) if !is_valid_port_range(port) => {
                    errors.push(format!("invalid destination port range: '{port}'"));
                }
                Some(_) => {}
            }
            if let Some(source_port) = transport.child_text("source-port") {
                if !is_valid_port_range(source_port) {
                    errors.push(format!("invalid source port range: '{source_port}'"));
                }
            }
        }
        other => errors.push(format!("unsupported protocol: {other}")),
    }
}

fn validate_service_group(node: &XmlNode, errors: &mut Vec<String>) {
    let Some(members_elem) = node.get_child("members") else {
        errors.push("service group is missing a members element".to_string());
        return;
    };
    let members: Vec<_> = members_elem.children_named("member").collect();
    if members.is_empty() {
        errors.push("service group has no members".to_string());
    }
    for member in members {
        if member.text.as_deref().map(str::trim).unwrap_or("").is_empty() {
            errors.push("empty member in service group".to_string());
        }
    }
}

fn validate_tag(node: &XmlNode, errors: &mut Vec<String>) {
    if let Some(color) = node.child_text("color") {
        // Accept "colorN", bare numeric codes 1-32, or a recognized name.
        let numeric = color.strip_prefix("color").unwrap_or(color);
        match numeric.parse::<u32>() {
            Ok(code) if (1..=32).contains(&code) => {}
            Ok(code) => errors.push(format!("invalid color value: {code} (must be 1-32)")),
            Err(_) => {
                if !NAMED_COLORS.iter().any(|n| n.eq_ignore_ascii_case(color)) {
                    errors.push(format!("invalid color name: {color}"));
                }
            }
        }
    }
}

fn validate_edl(node: &XmlNode, errors: &mut Vec<String>) {
    let Some(type_elem) = node.get_child("type") else {
        errors.push("external list is missing a type element".to_string());
        return;
    };
    let Some(list_type) = type_elem.children.first() else {
        errors.push("external list type element is empty".to_string());
        return;
    };
    if list_type.tag.starts_with("predefined") {
        return;
    }
    match list_type.child_text("url") {
        None | Some("") => errors.push("external list has no url".to_string()),
        Some(url)
            if !url.starts_with("http://")
                && !url.starts_with("https://")
                && !url.starts_with("s3://") =>
        {
            errors.push(format!(
                "external list url must start with http://, https://, or s3://: '{url}'"
            ));
        }
        Some(_) => {}
    }
}

fn validate_schedule(node: &XmlNode, errors: &mut Vec<String>) {
    let Some(schedule_type) = node.get_child("schedule-type") else {
        errors.push("schedule is missing a schedule-type element".to_string());
        return;
    };
    let recurring = schedule_type.get_child("recurring");
    let non_recurring = schedule_type.get_child("non-recurring");

    match (recurring, non_recurring) {
        (None, None) => {
            errors.push("schedule must be recurring or non-recurring".to_string());
        }
        (Some(_), Some(_)) => {
            errors.push("schedule cannot be both recurring and non-recurring".to_string());
        }
        (Some(recurring), None) => {
            if let Some(daily) = recurring.get_child("daily") {
                for member in daily.children_named("member") {
                    let value = member.text.as_deref().unwrap_or("");
                    if !time_range_regex().is_match(value) {
                        errors.push(format!("invalid daily time range: '{value}'"));
                    }
                }
            }
            if let Some(weekly) = recurring.get_child("weekly") {
                for day in &weekly.children {
                    for member in day.children_named("member") {
                        let value = member.text.as_deref().unwrap_or("");
                        if !time_range_regex().is_match(value) {
                            errors.push(format!("invalid weekly time range: '{value}'"));
                        }
                    }
                }
            }
        }
        (None, Some(non_recurring)) => {
            for member in non_recurring.children_named("member") {
                let value = member.text.as_deref().unwrap_or("");
                if !datetime_range_regex().is_match(value) {
                    errors.push(format!("invalid non-recurring window: '{value}'"));
                }
            }
        }
    }
}

fn validate_profile_group(node: &XmlNode, errors: &mut Vec<String>) {
    let references = SECURITY_PROFILE_KINDS.iter().any(|kind| {
        kind.profile_element()
            .and_then(|element| node.get_child(element))
            .map(|child| {
                child.children_named("member").next().is_some() || child.text.is_some()
            })
            .unwrap_or(false)
    });
    if !references {
        errors.push("security profile group references no profiles".to_string());
    }
}

fn is_valid_ip_netmask(value: &str) -> bool {
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value, None),
    };
    if let Ok(_v4) = addr.parse::<Ipv4Addr>() {
        return match prefix {
            None => true,
            Some(p) => p.parse::<u8>().map(|p| p <= 32).unwrap_or(false),
        };
    }
    if addr.parse::<Ipv6Addr>().is_ok() {
        return match prefix {
            None => true,
            Some(p) => p.parse::<u8>().map(|p| p <= 128).unwrap_or(false),
        };
    }
    false
}

fn is_valid_ip_range(value: &str) -> bool {
    let Some((start, end)) = value.split_once('-') else {
        return false;
    };
    let v4 = start.parse::<Ipv4Addr>().is_ok() && end.parse::<Ipv4Addr>().is_ok();
    let v6 = start.parse::<Ipv6Addr>().is_ok() && end.parse::<Ipv6Addr>().is_ok();
    v4 || v6
}

fn is_valid_fqdn(value: &str) -> bool {
    !value.is_empty() && value.len() <= 253 && fqdn_regex().is_match(value)
}

fn is_valid_ip_wildcard(value: &str) -> bool {
    match value.split_once('/') {
        Some((addr, mask)) => {
            addr.parse::<Ipv4Addr>().is_ok() && mask.parse::<Ipv4Addr>().is_ok()
        }
        None => false,
    }
}

fn is_valid_port_range(value: &str) -> bool {
    if value.trim().is_empty() {
        return false;
    }
    value.split(',').all(|part| {
        let part = part.trim();
        match part.split_once('-') {
            Some((low, high)) => match (low.parse::<u16>(), high.parse::<u16>()) {
                (Ok(low), Ok(high)) => low <= high,
                _ => false,
            },
            None => part.parse::<u16>().is_ok(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(xml: &str) -> XmlNode {
        XmlNode::parse_str(xml).unwrap()
    }

    #[test]
    fn test_address_valid_forms() {
        let (ok, _) = validate_object(
            &entry("<entry name=\"a\"><ip-netmask>10.0.0.0/24</ip-netmask></entry>"),
            ObjectKind::Address,
        );
        assert!(ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"a\"><ip-range>10.0.0.1-10.0.0.9</ip-range></entry>"),
            ObjectKind::Address,
        );
        assert!(ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"a\"><fqdn>www.example.com</fqdn></entry>"),
            ObjectKind::Address,
        );
        assert!(ok);
    }

    #[test]
    fn test_address_invalid() {
        let (ok, errors) = validate_object(&entry("<entry name=\"a\"/>"), ObjectKind::Address);
        assert!(!ok);
        assert!(errors[0].contains("must have one of these types"));

        let (ok, _) = validate_object(
            &entry("<entry name=\"a\"><ip-netmask>999.0.0.1/24</ip-netmask></entry>"),
            ObjectKind::Address,
        );
        assert!(!ok);

        let (ok, errors) = validate_object(
            &entry("<entry name=\"a\"><ip-netmask>10.0.0.1</ip-netmask><fqdn>x.example.com</fqdn></entry>"),
            ObjectKind::Address,
        );
        assert!(!ok);
        assert!(errors[0].contains("multiple value forms"));
    }

    #[test]
    fn test_address_group_static_xor_dynamic() {
        let (ok, _) = validate_object(
            &entry("<entry name=\"g\"><static><member>a</member></static></entry>"),
            ObjectKind::AddressGroup,
        );
        assert!(ok);

        let (ok, errors) = validate_object(
            &entry("<entry name=\"g\"><static><member>a</member></static><dynamic><filter>'t'</filter></dynamic></entry>"),
            ObjectKind::AddressGroup,
        );
        assert!(!ok);
        assert!(errors[0].contains("cannot be both"));

        let (ok, _) = validate_object(&entry("<entry name=\"g\"/>"), ObjectKind::AddressGroup);
        assert!(!ok);
    }

    #[test]
    fn test_dynamic_filter_rules() {
        assert!(check_dynamic_filter("'web' and ('db' or 'cache')").is_ok());
        assert!(check_dynamic_filter("'web' and not 'db'").is_ok());
        assert!(check_dynamic_filter("'unclosed").is_err());
        assert!(check_dynamic_filter("'web' xor 'db'").is_err());
        assert!(check_dynamic_filter("bare and 'db'").is_err());
    }

    #[test]
    fn test_service_ports() {
        let (ok, _) = validate_object(
            &entry("<entry name=\"s\"><protocol><tcp><port>80,8080-8090</port></tcp></protocol></entry>"),
            ObjectKind::Service,
        );
        assert!(ok);

        let (ok, errors) = validate_object(
            &entry("<entry name=\"s\"><protocol><tcp><port>99999</port></tcp></protocol></entry>"),
            ObjectKind::Service,
        );
        assert!(!ok);
        assert!(errors[0].contains("invalid destination port range"));

        let (ok, _) = validate_object(
            &entry("<entry name=\"s\"><protocol><gre/></protocol></entry>"),
            ObjectKind::Service,
        );
        assert!(!ok);
    }

    #[test]
    fn test_tag_colors() {
        let (ok, _) = validate_object(
            &entry("<entry name=\"t\"><color>color7</color></entry>"),
            ObjectKind::Tag,
        );
        assert!(ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"t\"><color>azure-blue</color></entry>"),
            ObjectKind::Tag,
        );
        assert!(ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"t\"><color>color44</color></entry>"),
            ObjectKind::Tag,
        );
        assert!(!ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"t\"><color>chartreuse</color></entry>"),
            ObjectKind::Tag,
        );
        assert!(!ok);
    }

    #[test]
    fn test_edl_url_schemes() {
        let (ok, _) = validate_object(
            &entry("<entry name=\"e\"><type><ip><url>https://lists.example.com/ips</url></ip></type></entry>"),
            ObjectKind::ExternalList,
        );
        assert!(ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"e\"><type><ip><url>ftp://lists.example.com</url></ip></type></entry>"),
            ObjectKind::ExternalList,
        );
        assert!(!ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"e\"><type><predefined-ip><name>panw-known-ip</name></predefined-ip></type></entry>"),
            ObjectKind::ExternalList,
        );
        assert!(ok);
    }

    #[test]
    fn test_schedule_windows() {
        let (ok, _) = validate_object(
            &entry(
                "<entry name=\"s\"><schedule-type><recurring><daily><member>09:00-17:00</member></daily></recurring></schedule-type></entry>",
            ),
            ObjectKind::Schedule,
        );
        assert!(ok);

        let (ok, _) = validate_object(
            &entry(
                "<entry name=\"s\"><schedule-type><non-recurring><member>2026/01/01@00:00-2026/01/31@23:59</member></non-recurring></schedule-type></entry>",
            ),
            ObjectKind::Schedule,
        );
        assert!(ok);

        let (ok, _) = validate_object(
            &entry(
                "<entry name=\"s\"><schedule-type><recurring><daily><member>25:00-26:00</member></daily></recurring></schedule-type></entry>",
            ),
            ObjectKind::Schedule,
        );
        assert!(!ok);

        let (ok, errors) = validate_object(
            &entry("<entry name=\"s\"><schedule-type/></entry>"),
            ObjectKind::Schedule,
        );
        assert!(!ok);
        assert!(errors[0].contains("recurring"));
    }

    #[test]
    fn test_profile_group_needs_a_profile() {
        let (ok, _) = validate_object(
            &entry("<entry name=\"g\"><virus><member>av</member></virus></entry>"),
            ObjectKind::SecurityProfileGroup,
        );
        assert!(ok);
        let (ok, _) = validate_object(
            &entry("<entry name=\"g\"/>"),
            ObjectKind::SecurityProfileGroup,
        );
        assert!(!ok);
    }

    #[test]
    fn test_rule_validation() {
        let (ok, _) = validate_rule(
            &entry("<entry name=\"r\"><bi-directional>yes</bi-directional></entry>"),
            RuleKind::Nat,
        );
        assert!(ok);
        let (ok, errors) = validate_rule(
            &entry("<entry name=\"r\"><bi-directional>yes</bi-directional></entry>"),
            RuleKind::Security,
        );
        assert!(!ok);
        assert!(errors[0].contains("bi-directional"));
    }
}
