//! Context-aware XPath resolution.
//!
//! Maps `(kind, device type, context, version)` tuples to concrete XPath
//! strings. Paths are assembled from a version-keyed template table with a
//! `{base_path}` placeholder; the base path itself is a function of device
//! type and context. When the requested version is unknown, the highest
//! known version at or below it is used, else the newest known version.

use crate::types::{Context, DeviceType, EngineError, ObjectKind, PanOsVersion, RuleKind, Rulebase};
use crate::types::version::{V10_1, V10_2, V11_0, V11_1, V11_2};

/// The device entry under which all device-local configuration lives.
pub const LOCALHOST: &str = "/config/devices/entry[@name='localhost.localdomain']";

/// Path templates for one schema version.
///
/// Today every known version shares one layout; the table exists so a future
/// version can diverge without touching call sites.
#[derive(Debug, Clone, Copy)]
struct TemplateSet {
    object_entry: &'static str,
    object_container: &'static str,
    policy_entry: &'static str,
    policy_container: &'static str,
}

const DEFAULT_TEMPLATES: TemplateSet = TemplateSet {
    object_entry: "{base_path}/{container}/entry[@name='{name}']",
    object_container: "{base_path}/{container}",
    policy_entry: "{base_path}/{rulebase}/{container}/rules/entry[@name='{name}']",
    policy_container: "{base_path}/{rulebase}/{container}/rules",
};

static VERSIONED_TEMPLATES: [(PanOsVersion, TemplateSet); 5] = [
    (V10_1, DEFAULT_TEMPLATES),
    (V10_2, DEFAULT_TEMPLATES),
    (V11_0, DEFAULT_TEMPLATES),
    (V11_1, DEFAULT_TEMPLATES),
    (V11_2, DEFAULT_TEMPLATES),
];

fn templates_for(version: PanOsVersion) -> &'static TemplateSet {
    let resolved = version.nearest_known();
    VERSIONED_TEMPLATES
        .iter()
        .find(|(v, _)| *v == resolved)
        .map(|(_, t)| t)
        .unwrap_or(&VERSIONED_TEMPLATES[VERSIONED_TEMPLATES.len() - 1].1)
}

fn check_name(name: &str) -> Result<(), EngineError> {
    if name.contains('\'') {
        return Err(EngineError::InvalidXPath(format!(
            "entity name '{name}' contains a quote"
        )));
    }
    Ok(())
}

/// The base path under which all entities of a context live.
pub fn context_xpath(device_type: DeviceType, context: &Context) -> Result<String, EngineError> {
    context.validate_for(device_type)?;
    let path = match context {
        Context::Shared => "/config/shared".to_string(),
        Context::Vsys(name) => {
            check_name(name)?;
            format!("{LOCALHOST}/vsys/entry[@name='{name}']")
        }
        Context::DeviceGroup(name) => {
            check_name(name)?;
            format!("{LOCALHOST}/device-group/entry[@name='{name}']")
        }
        Context::Template(name) => {
            check_name(name)?;
            format!("{LOCALHOST}/template/entry[@name='{name}']/config/shared")
        }
    };
    Ok(path)
}

/// XPath of an object entry, or of its container when `name` is `None`.
pub fn object_xpath(
    kind: ObjectKind,
    device_type: DeviceType,
    context: &Context,
    version: PanOsVersion,
    name: Option<&str>,
) -> Result<String, EngineError> {
    let base_path = context_xpath(device_type, context)?;
    let templates = templates_for(version);
    let container = kind.container_path();
    match name {
        Some(name) => {
            check_name(name)?;
            Ok(templates
                .object_entry
                .replace("{base_path}", &base_path)
                .replace("{container}", container)
                .replace("{name}", name))
        }
        None => Ok(templates
            .object_container
            .replace("{base_path}", &base_path)
            .replace("{container}", container)),
    }
}

/// Whether a rulebase side is legal for a device type and context.
///
/// Firewalls (and Panorama templates, which hold firewall-shaped config)
/// carry a single `rulebase`; Panorama shared and device-group contexts
/// split rules into `pre-rulebase` and `post-rulebase`.
pub fn valid_rulebase(device_type: DeviceType, context: &Context, rulebase: Rulebase) -> bool {
    match (device_type, context) {
        (DeviceType::Firewall, _) => rulebase == Rulebase::Direct,
        (DeviceType::Panorama, Context::Template(_)) => rulebase == Rulebase::Direct,
        (DeviceType::Panorama, _) => matches!(rulebase, Rulebase::Pre | Rulebase::Post),
    }
}

/// XPath of a rule entry, or of its `rules` container when `name` is `None`.
pub fn policy_xpath(
    kind: RuleKind,
    device_type: DeviceType,
    context: &Context,
    rulebase: Rulebase,
    version: PanOsVersion,
    name: Option<&str>,
) -> Result<String, EngineError> {
    let base_path = context_xpath(device_type, context)?;
    if !valid_rulebase(device_type, context, rulebase) {
        return Err(EngineError::InvalidContext {
            device_type,
            context: format!("{} in {}", rulebase, context.label()),
        });
    }
    let templates = templates_for(version);
    let container = kind.container_path();
    match name {
        Some(name) => {
            check_name(name)?;
            Ok(templates
                .policy_entry
                .replace("{base_path}", &base_path)
                .replace("{rulebase}", rulebase.container_path())
                .replace("{container}", container)
                .replace("{name}", name))
        }
        None => Ok(templates
            .policy_container
            .replace("{base_path}", &base_path)
            .replace("{rulebase}", rulebase.container_path())
            .replace("{container}", container)),
    }
}
