//! PAN-OS version handling.
//!
//! Versions are `(major, minor)` pairs with a total order. The engine knows
//! a fixed set of schema-bearing versions; requests for other versions fall
//! back to the highest known version at or below the request, else to the
//! newest known version.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::error::EngineError;

/// A PAN-OS version as a `(major, minor)` pair.
///
/// Implements `Ord` so version comparisons (`source > target`) read the way
/// the schema transitions are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PanOsVersion {
    /// Major release number.
    pub major: u16,
    /// Minor release number.
    pub minor: u16,
}

/// PAN-OS 10.1.
pub const V10_1: PanOsVersion = PanOsVersion { major: 10, minor: 1 };
/// PAN-OS 10.2.
pub const V10_2: PanOsVersion = PanOsVersion { major: 10, minor: 2 };
/// PAN-OS 11.0.
pub const V11_0: PanOsVersion = PanOsVersion { major: 11, minor: 0 };
/// PAN-OS 11.1.
pub const V11_1: PanOsVersion = PanOsVersion { major: 11, minor: 1 };
/// PAN-OS 11.2.
pub const V11_2: PanOsVersion = PanOsVersion { major: 11, minor: 2 };

/// Versions with distinct schema behavior, oldest first.
pub const KNOWN_VERSIONS: [PanOsVersion; 5] = [V10_1, V10_2, V11_0, V11_1, V11_2];

impl PanOsVersion {
    /// Create a version from major/minor parts.
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parse `"11.2"` or `"11.2.3"` (patch level is ignored).
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| EngineError::invalid_argument(format!("invalid version: '{s}'")))?;
        let minor = parts
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(|| EngineError::invalid_argument(format!("invalid version: '{s}'")))?;
        Ok(Self { major, minor })
    }

    /// Whether this is one of the schema-bearing versions the engine knows.
    pub fn is_known(&self) -> bool {
        KNOWN_VERSIONS.contains(self)
    }

    /// Map a requested version onto a known one.
    ///
    /// Returns the highest known version at or below the request; if the
    /// request predates every known version, returns the newest known
    /// version instead.
    pub fn nearest_known(&self) -> PanOsVersion {
        KNOWN_VERSIONS
            .iter()
            .rev()
            .find(|v| **v <= *self)
            .copied()
            .unwrap_or(V11_2)
    }

    /// The newest version the engine knows.
    pub fn newest_known() -> PanOsVersion {
        V11_2
    }
}

impl fmt::Display for PanOsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Default for PanOsVersion {
    fn default() -> Self {
        V11_2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(V10_1 < V10_2);
        assert!(V10_2 < V11_0);
        assert!(V11_1 < V11_2);
        assert!(PanOsVersion::new(9, 1) < V10_1);
    }

    #[test]
    fn test_parse() {
        assert_eq!(PanOsVersion::parse("10.2").unwrap(), V10_2);
        assert_eq!(PanOsVersion::parse("11.2.3").unwrap(), V11_2);
        assert_eq!(PanOsVersion::parse(" 10.1 ").unwrap(), V10_1);
        assert!(PanOsVersion::parse("ten.two").is_err());
        assert!(PanOsVersion::parse("11").is_err());
    }

    #[test]
    fn test_nearest_known_exact() {
        assert_eq!(V10_2.nearest_known(), V10_2);
    }

    #[test]
    fn test_nearest_known_between() {
        // 10.3 never shipped a distinct schema; it behaves as 10.2.
        assert_eq!(PanOsVersion::new(10, 3).nearest_known(), V10_2);
        assert_eq!(PanOsVersion::new(12, 0).nearest_known(), V11_2);
    }

    #[test]
    fn test_nearest_known_before_all() {
        assert_eq!(PanOsVersion::new(9, 1).nearest_known(), V11_2);
    }

    #[test]
    fn test_display() {
        assert_eq!(V11_0.to_string(), "11.0");
    }
}
