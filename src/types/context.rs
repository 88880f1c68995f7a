//! Device types and configuration contexts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::error::EngineError;

/// The kind of device a configuration belongs to.
///
/// Device type is not declared in the XML and is inferred when the caller
/// does not supply it (see [`crate::detect`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// A standalone firewall: entities live under `vsys` entries.
    Firewall,
    /// A Panorama management server: entities live under `device-group`
    /// entries, `template` entries, and `shared`.
    Panorama,
}

impl DeviceType {
    /// Parse from the lowercase labels used at the API boundary.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "firewall" => Some(Self::Firewall),
            "panorama" => Some(Self::Panorama),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firewall => write!(f, "firewall"),
            Self::Panorama => write!(f, "panorama"),
        }
    }
}

/// The scope in which an entity lives.
///
/// A context resolves to a base path in the tree under which all entities
/// for that scope are stored. Name uniqueness per entity kind holds within
/// one context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum Context {
    /// The `shared` scope, visible to every other context on the device.
    Shared,
    /// A Panorama device group.
    DeviceGroup(String),
    /// A firewall virtual system.
    Vsys(String),
    /// A Panorama template (its nested shared scope).
    Template(String),
}

impl Context {
    /// Build a device-group context.
    pub fn device_group(name: impl Into<String>) -> Self {
        Self::DeviceGroup(name.into())
    }

    /// Build a vsys context.
    pub fn vsys(name: impl Into<String>) -> Self {
        Self::Vsys(name.into())
    }

    /// Build a template context.
    pub fn template(name: impl Into<String>) -> Self {
        Self::Template(name.into())
    }

    /// The context's scope name, if it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Shared => None,
            Self::DeviceGroup(n) | Self::Vsys(n) | Self::Template(n) => Some(n),
        }
    }

    /// Stable label for logs and error messages.
    pub fn label(&self) -> String {
        match self {
            Self::Shared => "shared".to_string(),
            Self::DeviceGroup(n) => format!("device_group({n})"),
            Self::Vsys(n) => format!("vsys({n})"),
            Self::Template(n) => format!("template({n})"),
        }
    }

    /// Check that this context is legal on the given device type.
    ///
    /// Device-group and template contexts belong to Panorama; vsys contexts
    /// belong to firewalls. `shared` is legal on both. Scope names must be
    /// non-empty.
    pub fn validate_for(&self, device_type: DeviceType) -> Result<(), EngineError> {
        if let Some(name) = self.name() {
            if name.is_empty() {
                return Err(EngineError::invalid_argument(format!(
                    "empty scope name for context '{}'",
                    self.label()
                )));
            }
        }
        let legal = match (device_type, self) {
            (_, Self::Shared) => true,
            (DeviceType::Panorama, Self::DeviceGroup(_)) => true,
            (DeviceType::Panorama, Self::Template(_)) => true,
            (DeviceType::Firewall, Self::Vsys(_)) => true,
            _ => false,
        };
        if legal {
            Ok(())
        } else {
            Err(EngineError::InvalidContext {
                device_type,
                context: self.label(),
            })
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_parsing() {
        assert_eq!(DeviceType::from_str("firewall"), Some(DeviceType::Firewall));
        assert_eq!(DeviceType::from_str("PANORAMA"), Some(DeviceType::Panorama));
        assert_eq!(DeviceType::from_str("router"), None);
    }

    #[test]
    fn test_context_validation() {
        assert!(Context::Shared.validate_for(DeviceType::Firewall).is_ok());
        assert!(Context::Shared.validate_for(DeviceType::Panorama).is_ok());
        assert!(Context::vsys("vsys1").validate_for(DeviceType::Firewall).is_ok());
        assert!(Context::device_group("DG1")
            .validate_for(DeviceType::Panorama)
            .is_ok());

        // Cross-device combinations are rejected with a typed error.
        let err = Context::device_group("DG1")
            .validate_for(DeviceType::Firewall)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidContext { .. }));
        assert!(Context::vsys("vsys1").validate_for(DeviceType::Panorama).is_err());
        assert!(Context::template("t1").validate_for(DeviceType::Firewall).is_err());
    }

    #[test]
    fn test_empty_scope_name_rejected() {
        let err = Context::vsys("").validate_for(DeviceType::Firewall).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_labels() {
        assert_eq!(Context::Shared.label(), "shared");
        assert_eq!(Context::device_group("DG1").label(), "device_group(DG1)");
    }
}
