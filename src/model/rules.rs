//! Typed views over rule entries.

use serde::{Deserialize, Serialize};

use crate::types::kind::SECURITY_PROFILE_KINDS;
use crate::types::{EngineError, ObjectKind};
use crate::xml::XmlNode;

/// A security rule, with the fields the engine inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityRule {
    /// Rule name.
    pub name: String,
    /// `allow`, `deny`, `drop`, ...
    pub action: Option<String>,
    /// Whether the rule is disabled.
    pub disabled: bool,
    /// Source zones.
    pub from_zones: Vec<String>,
    /// Destination zones.
    pub to_zones: Vec<String>,
    /// Source addresses.
    pub source: Vec<String>,
    /// Destination addresses.
    pub destination: Vec<String>,
    /// Services.
    pub service: Vec<String>,
    /// Applications.
    pub application: Vec<String>,
    /// URL categories.
    pub category: Vec<String>,
    /// Source users.
    pub source_user: Vec<String>,
    /// Referenced security profile group, if the rule uses one.
    pub profile_group: Option<String>,
    /// Individually referenced profiles `(kind, name)`.
    pub profiles: Vec<(ObjectKind, String)>,
    /// Schedule reference.
    pub schedule: Option<String>,
    /// Tag references.
    pub tags: Vec<String>,
    /// Log forwarding setting.
    pub log_setting: Option<String>,
    /// Description.
    pub description: Option<String>,
}

impl SecurityRule {
    /// Read a security rule from its entry element.
    pub fn from_node(node: &XmlNode) -> Result<Self, EngineError> {
        let name = rule_name(node)?;
        let profile_setting = node.get_child("profile-setting");
        let profile_group = profile_setting
            .and_then(|ps| ps.get_child("group"))
            .and_then(|g| g.children_named("member").next())
            .and_then(|m| m.text.clone());
        let mut profiles = Vec::new();
        if let Some(profiles_elem) = profile_setting.and_then(|ps| ps.get_child("profiles")) {
            for kind in SECURITY_PROFILE_KINDS {
                let element = kind.profile_element().unwrap_or_default();
                if let Some(profile) = profiles_elem.get_child(element) {
                    for member in profile.children_named("member") {
                        if let Some(text) = &member.text {
                            profiles.push((kind, text.clone()));
                        }
                    }
                    // Some exports carry the profile name as bare text.
                    if let Some(text) = &profile.text {
                        profiles.push((kind, text.clone()));
                    }
                }
            }
        }
        Ok(Self {
            name,
            action: node.child_text("action").map(str::to_string),
            disabled: node.child_text("disabled") == Some("yes"),
            from_zones: node.member_values("from"),
            to_zones: node.member_values("to"),
            source: node.member_values("source"),
            destination: node.member_values("destination"),
            service: node.member_values("service"),
            application: node.member_values("application"),
            category: node.member_values("category"),
            source_user: node.member_values("source-user"),
            profile_group,
            profiles,
            schedule: node.child_text("schedule").map(str::to_string),
            tags: node.member_values("tag"),
            log_setting: node.child_text("log-setting").map(str::to_string),
            description: node.child_text("description").map(str::to_string),
        })
    }
}

/// A NAT rule, with the fields the splitter and merger inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatRule {
    /// Rule name.
    pub name: String,
    /// Source zones.
    pub from_zones: Vec<String>,
    /// Destination zones.
    pub to_zones: Vec<String>,
    /// Source addresses.
    pub source: Vec<String>,
    /// Destination addresses.
    pub destination: Vec<String>,
    /// Service reference.
    pub service: Option<String>,
    /// Whether `bi-directional` is set to `yes`.
    pub bi_directional: bool,
    /// `nat-type` text.
    pub nat_type: Option<String>,
    /// Whether the rule carries a `source-translation` block.
    pub has_source_translation: bool,
    /// Whether the rule carries a `destination-translation` block.
    pub has_destination_translation: bool,
    /// Whether the rule is disabled.
    pub disabled: bool,
    /// Tag references.
    pub tags: Vec<String>,
    /// Description.
    pub description: Option<String>,
}

impl NatRule {
    /// Read a NAT rule from its entry element.
    pub fn from_node(node: &XmlNode) -> Result<Self, EngineError> {
        Ok(Self {
            name: rule_name(node)?,
            from_zones: node.member_values("from"),
            to_zones: node.member_values("to"),
            source: node.member_values("source"),
            destination: node.member_values("destination"),
            service: node.child_text("service").map(str::to_string),
            bi_directional: node.child_text("bi-directional") == Some("yes"),
            nat_type: node.child_text("nat-type").map(str::to_string),
            has_source_translation: node.get_child("source-translation").is_some(),
            has_destination_translation: node.get_child("destination-translation").is_some(),
            disabled: node.child_text("disabled") == Some("yes"),
            tags: node.member_values("tag"),
            description: node.child_text("description").map(str::to_string),
        })
    }
}

fn rule_name(node: &XmlNode) -> Result<String, EngineError> {
    node.name()
        .map(str::to_string)
        .ok_or_else(|| EngineError::invalid_argument("rule entry has no name attribute"))
}
