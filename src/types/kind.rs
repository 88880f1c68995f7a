//! Entity kind vocabulary.
//!
//! Every addressable definition in a configuration is either an object
//! ([`ObjectKind`]) or a rule ([`RuleKind`] within a [`Rulebase`]). Kinds
//! carry the static data the rest of the engine dispatches on: the XML
//! container fragment under a context base path, and the API label.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Address object (`ip-netmask`, `ip-range`, `fqdn`, or `ip-wildcard`).
    Address,
    /// Static or dynamic address group.
    AddressGroup,
    /// Service object (protocol + port ranges).
    Service,
    /// Service group.
    ServiceGroup,
    /// Custom application.
    Application,
    /// Application group.
    ApplicationGroup,
    /// Tag (color + comments).
    Tag,
    /// Schedule (recurring or non-recurring).
    Schedule,
    /// Custom URL category.
    CustomUrlCategory,
    /// External dynamic list.
    ExternalList,
    /// Region object.
    Region,
    /// Dynamic user group.
    DynamicUserGroup,
    /// Antivirus security profile.
    Virus,
    /// Anti-spyware security profile.
    Spyware,
    /// Vulnerability protection profile.
    Vulnerability,
    /// URL filtering profile.
    UrlFiltering,
    /// File blocking profile.
    FileBlocking,
    /// WildFire analysis profile.
    WildfireAnalysis,
    /// DNS security profile.
    DnsSecurity,
    /// Data filtering profile.
    DataFiltering,
    /// Security profile group referencing the individual profiles.
    SecurityProfileGroup,
}

/// All object kinds, in catalog order.
pub const ALL_OBJECT_KINDS: [ObjectKind; 21] = [
    ObjectKind::Address,
    ObjectKind::AddressGroup,
    ObjectKind::Service,
    ObjectKind::ServiceGroup,
    ObjectKind::Application,
    ObjectKind::ApplicationGroup,
    ObjectKind::Tag,
    ObjectKind::Schedule,
    ObjectKind::CustomUrlCategory,
    ObjectKind::ExternalList,
    ObjectKind::Region,
    ObjectKind::DynamicUserGroup,
    ObjectKind::Virus,
    ObjectKind::Spyware,
    ObjectKind::Vulnerability,
    ObjectKind::UrlFiltering,
    ObjectKind::FileBlocking,
    ObjectKind::WildfireAnalysis,
    ObjectKind::DnsSecurity,
    ObjectKind::DataFiltering,
    ObjectKind::SecurityProfileGroup,
];

/// The eight individual security-profile kinds.
pub const SECURITY_PROFILE_KINDS: [ObjectKind; 8] = [
    ObjectKind::Virus,
    ObjectKind::Spyware,
    ObjectKind::Vulnerability,
    ObjectKind::UrlFiltering,
    ObjectKind::FileBlocking,
    ObjectKind::WildfireAnalysis,
    ObjectKind::DnsSecurity,
    ObjectKind::DataFiltering,
];

impl ObjectKind {
    /// API label, e.g. `address_group`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::AddressGroup => "address_group",
            Self::Service => "service",
            Self::ServiceGroup => "service_group",
            Self::Application => "application",
            Self::ApplicationGroup => "application_group",
            Self::Tag => "tag",
            Self::Schedule => "schedule",
            Self::CustomUrlCategory => "custom_url_category",
            Self::ExternalList => "external_list",
            Self::Region => "region",
            Self::DynamicUserGroup => "dynamic_user_group",
            Self::Virus => "virus",
            Self::Spyware => "spyware",
            Self::Vulnerability => "vulnerability",
            Self::UrlFiltering => "url_filtering",
            Self::FileBlocking => "file_blocking",
            Self::WildfireAnalysis => "wildfire_analysis",
            Self::DnsSecurity => "dns_security",
            Self::DataFiltering => "data_filtering",
            Self::SecurityProfileGroup => "security_profile_group",
        }
    }

    /// Parse an API label. Accepts both `_` and `-` separators.
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.to_lowercase().replace('-', "_");
        ALL_OBJECT_KINDS
            .iter()
            .find(|k| k.as_str() == normalized)
            .copied()
    }

    /// XML container fragment under a context base path.
    ///
    /// Security profiles and custom URL categories live under the shared
    /// `profiles` container; the profile group container keeps the legacy
    /// `profile-group` element name.
    pub fn container_path(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::AddressGroup => "address-group",
            Self::Service => "service",
            Self::ServiceGroup => "service-group",
            Self::Application => "application",
            Self::ApplicationGroup => "application-group",
            Self::Tag => "tag",
            Self::Schedule => "schedule",
            Self::CustomUrlCategory => "profiles/custom-url-category",
            Self::ExternalList => "external-list",
            Self::Region => "region",
            Self::DynamicUserGroup => "dynamic-user-group",
            Self::Virus => "profiles/virus",
            Self::Spyware => "profiles/spyware",
            Self::Vulnerability => "profiles/vulnerability",
            Self::UrlFiltering => "profiles/url-filtering",
            Self::FileBlocking => "profiles/file-blocking",
            Self::WildfireAnalysis => "profiles/wildfire-analysis",
            Self::DnsSecurity => "profiles/dns-security",
            Self::DataFiltering => "profiles/data-filtering",
            Self::SecurityProfileGroup => "profile-group",
        }
    }

    /// The XML element name used for this profile inside a rule's
    /// `profile-setting/profiles` block, for the eight profile kinds.
    pub fn profile_element(&self) -> Option<&'static str> {
        match self {
            Self::Virus => Some("virus"),
            Self::Spyware => Some("spyware"),
            Self::Vulnerability => Some("vulnerability"),
            Self::UrlFiltering => Some("url-filtering"),
            Self::FileBlocking => Some("file-blocking"),
            Self::WildfireAnalysis => Some("wildfire-analysis"),
            Self::DnsSecurity => Some("dns-security"),
            Self::DataFiltering => Some("data-filtering"),
            _ => None,
        }
    }

    /// Whether this is one of the eight individual security-profile kinds.
    pub fn is_security_profile(&self) -> bool {
        SECURITY_PROFILE_KINDS.contains(self)
    }

    /// For group kinds, the kind of their members.
    pub fn member_kind(&self) -> Option<ObjectKind> {
        match self {
            Self::AddressGroup => Some(Self::Address),
            Self::ServiceGroup => Some(Self::Service),
            Self::ApplicationGroup => Some(Self::Application),
            _ => None,
        }
    }

    /// Whether entries of this kind carry a static member list.
    pub fn is_group(&self) -> bool {
        matches!(
            self,
            Self::AddressGroup | Self::ServiceGroup | Self::ApplicationGroup
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rule kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Security policy rule.
    Security,
    /// NAT rule.
    Nat,
    /// Policy-based forwarding rule.
    Pbf,
    /// Decryption rule.
    Decryption,
    /// QoS rule.
    Qos,
    /// Authentication rule.
    Authentication,
    /// Application override rule.
    ApplicationOverride,
    /// DoS protection rule.
    Dos,
}

/// All rule kinds.
pub const ALL_RULE_KINDS: [RuleKind; 8] = [
    RuleKind::Security,
    RuleKind::Nat,
    RuleKind::Pbf,
    RuleKind::Decryption,
    RuleKind::Qos,
    RuleKind::Authentication,
    RuleKind::ApplicationOverride,
    RuleKind::Dos,
];

impl RuleKind {
    /// API label, e.g. `application_override`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Nat => "nat",
            Self::Pbf => "pbf",
            Self::Decryption => "decryption",
            Self::Qos => "qos",
            Self::Authentication => "authentication",
            Self::ApplicationOverride => "application_override",
            Self::Dos => "dos",
        }
    }

    /// Parse an API label. Accepts both `_` and `-` separators.
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.to_lowercase().replace('-', "_");
        ALL_RULE_KINDS
            .iter()
            .find(|k| k.as_str() == normalized)
            .copied()
    }

    /// XML container fragment inside a rulebase.
    pub fn container_path(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Nat => "nat",
            Self::Pbf => "pbf",
            Self::Decryption => "decryption",
            Self::Qos => "qos",
            Self::Authentication => "authentication",
            Self::ApplicationOverride => "application-override",
            Self::Dos => "dos",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which rulebase a rule lives in.
///
/// Firewalls have a single `rulebase`; Panorama contexts split rules into
/// `pre-rulebase` and `post-rulebase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rulebase {
    /// The firewall's single rulebase.
    Direct,
    /// Panorama pre-rules (evaluated before local rules).
    Pre,
    /// Panorama post-rules (evaluated after local rules).
    Post,
}

impl Rulebase {
    /// XML element name.
    pub fn container_path(&self) -> &'static str {
        match self {
            Self::Direct => "rulebase",
            Self::Pre => "pre-rulebase",
            Self::Post => "post-rulebase",
        }
    }

    /// The rulebases applicable to a device type.
    pub fn for_device(device_type: crate::types::DeviceType) -> &'static [Rulebase] {
        match device_type {
            crate::types::DeviceType::Firewall => &[Rulebase::Direct],
            crate::types::DeviceType::Panorama => &[Rulebase::Pre, Rulebase::Post],
        }
    }
}

impl fmt::Display for Rulebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.container_path())
    }
}
