//! Device-type and version inference.
//!
//! Configurations do not declare whether they came from a firewall or a
//! Panorama. Detection probes marker paths with confidence weights and sums
//! them per device kind; the higher total wins and ties resolve to firewall.

use tracing::{debug, info};

use crate::resolver::LOCALHOST;
use crate::types::{DeviceType, PanOsVersion};
use crate::xml::{find_paths, ConfigTree, XPath};

const PANORAMA_MARKERS: &[(&str, u32)] = &[
    // Definitive Panorama markers.
    ("/config/devices/entry[@name='localhost.localdomain']/device-group", 10),
    ("/config/devices/entry[@name='localhost.localdomain']/template", 10),
    ("/config/devices/entry[@name='localhost.localdomain']/log-settings/panorama", 10),
    ("/config/panorama", 15),
    ("/config/shared", 8),
    // Strong Panorama indicators.
    ("/config/devices/entry[@name='localhost.localdomain']/device-config", 7),
    ("/config/devices/entry[@name='localhost.localdomain']/template-stack", 7),
    ("/config/devices/entry[@name='localhost.localdomain']/collector-group", 7),
];

const FIREWALL_MARKERS: &[(&str, u32)] = &[
    // Definitive firewall markers.
    ("/config/devices/entry[@name='localhost.localdomain']/vsys", 10),
    ("/config/devices/entry[@name='localhost.localdomain']/network/interface", 9),
    ("/config/devices/entry[@name='localhost.localdomain']/network/virtual-router", 8),
    ("/config/devices/entry[@name='localhost.localdomain']/network/profiles", 7),
    // Strong firewall indicators.
    ("/config/devices/entry[@name='localhost.localdomain']/vsys/entry/zone", 8),
    ("/config/devices/entry[@name='localhost.localdomain']/vsys/entry/rulebase", 8),
    ("/config/devices/entry[@name='localhost.localdomain']/network/ike", 6),
    ("/config/devices/entry[@name='localhost.localdomain']/network/qos", 6),
    ("/config/devices/entry[@name='localhost.localdomain']/network/tunnel", 6),
    ("/config/devices/entry[@name='localhost.localdomain']/network/vlan", 5),
];

fn score_markers<'a>(tree: &ConfigTree, markers: &[(&'a str, u32)]) -> (u32, Vec<&'a str>) {
    let mut score = 0;
    let mut indicators = Vec::new();
    for (expr, weight) in markers {
        let Ok(xpath) = XPath::parse(expr) else {
            continue;
        };
        if !find_paths(tree.root(), &xpath).is_empty() {
            score += weight;
            indicators.push(expr.rsplit('/').next().unwrap_or(expr));
        }
    }
    (score, indicators)
}

/// Infer the device type of a configuration.
pub fn detect_device_type(tree: &ConfigTree) -> DeviceType {
    let (mut panorama_score, panorama_indicators) = score_markers(tree, PANORAMA_MARKERS);
    let (firewall_score, firewall_indicators) = score_markers(tree, FIREWALL_MARKERS);

    // Hostname hint: "panorama" in the hostname is a small extra clue.
    if let Ok(xpath) = XPath::parse(&format!("{LOCALHOST}/deviceconfig/system/hostname")) {
        if let Some(path) = find_paths(tree.root(), &xpath).into_iter().next() {
            if let Some(node) = tree.node(&path) {
                if let Some(hostname) = &node.text {
                    if hostname.to_lowercase().contains("panorama") {
                        panorama_score += 3;
                    }
                }
            }
        }
    }

    debug!(
        panorama_score,
        firewall_score,
        panorama_indicators = ?panorama_indicators,
        firewall_indicators = ?firewall_indicators,
        "device type scoring"
    );

    // Ties resolve to firewall; most operations default to firewall contexts.
    let detected = if panorama_score > firewall_score {
        DeviceType::Panorama
    } else {
        DeviceType::Firewall
    };
    info!(device_type = %detected, "detected device type");
    detected
}

/// Read the declared PAN-OS version from the root `version` attribute, when
/// present. Callers supply the version otherwise.
pub fn detect_version(tree: &ConfigTree) -> Option<PanOsVersion> {
    let declared = tree.root().attr("version")?;
    PanOsVersion::parse(declared).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_panorama() {
        let tree = ConfigTree::parse(
            r#"<config>
                 <shared/>
                 <devices>
                   <entry name="localhost.localdomain">
                     <device-group><entry name="DG1"/></device-group>
                     <template/>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap();
        assert_eq!(detect_device_type(&tree), DeviceType::Panorama);
    }

    #[test]
    fn test_detects_firewall() {
        let tree = ConfigTree::parse(
            r#"<config>
                 <devices>
                   <entry name="localhost.localdomain">
                     <vsys><entry name="vsys1"><rulebase/><zone/></entry></vsys>
                     <network><interface/><virtual-router/></network>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap();
        assert_eq!(detect_device_type(&tree), DeviceType::Firewall);
    }

    #[test]
    fn test_tie_defaults_to_firewall() {
        let tree = ConfigTree::parse("<config><mgt-config/></config>").unwrap();
        assert_eq!(detect_device_type(&tree), DeviceType::Firewall);
    }

    #[test]
    fn test_hostname_hint() {
        let tree = ConfigTree::parse(
            r#"<config>
                 <shared/>
                 <devices>
                   <entry name="localhost.localdomain">
                     <deviceconfig><system><hostname>panorama-m500</hostname></system></deviceconfig>
                     <vsys><entry name="vsys1"/></vsys>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap();
        // shared(8) + hostname(3) = 11 beats vsys(10).
        assert_eq!(detect_device_type(&tree), DeviceType::Panorama);
    }

    #[test]
    fn test_version_from_root_attribute() {
        let tree = ConfigTree::parse(r#"<config version="10.2.3"><shared/></config>"#).unwrap();
        assert_eq!(detect_version(&tree), Some(PanOsVersion::new(10, 2)));
        let tree = ConfigTree::parse("<config/>").unwrap();
        assert_eq!(detect_version(&tree), None);
    }
}
