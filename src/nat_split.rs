//! Bidirectional NAT rule splitting.
//!
//! A bidirectional NAT rule is an ordinary NAT entry with
//! `bi-directional=yes`, semantically a pair of unidirectional rules. The
//! splitter materializes that pair: a reverse rule named
//! `<original><suffix>` is inserted immediately after the original, with
//! zones and addresses swapped (or forced to `any`), translations swapped
//! or synthesized, and the bidirectional flag cleared.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::resolver;
use crate::types::{Context, DeviceType, EngineError, PanOsVersion, RuleKind, Rulebase};
use crate::xml::{find_first, ConfigTree, XPath, XmlNode};

/// Options controlling the reverse-rule transformation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatSplitOptions {
    /// Suffix appended to the original rule name for the reverse rule.
    pub reverse_suffix: String,
    /// Swap `from` and `to` zones in the reverse rule.
    pub zone_swap: bool,
    /// Swap `source` and `destination` addresses (and translations).
    pub address_swap: bool,
    /// Remove `bi-directional` from the original rule.
    pub disable_orig_bidirectional: bool,
    /// Instead of swapping, force the reverse rule's source zone and source
    /// address to `any`.
    pub return_rule_any_any: bool,
}

impl Default for NatSplitOptions {
    fn default() -> Self {
        Self {
            reverse_suffix: "-reverse".to_string(),
            zone_swap: true,
            address_swap: true,
            disable_orig_bidirectional: true,
            return_rule_any_any: false,
        }
    }
}

/// Outcome of a single split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    /// The original rule name.
    pub original_rule: String,
    /// The created reverse rule name.
    pub reverse_rule: String,
    /// Whether `bi-directional` was removed from the original.
    pub bidirectional_disabled: bool,
    /// Best-effort translation synthesis notes.
    pub warnings: Vec<String>,
}

/// Per-rule entry in a batch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitDetail {
    /// Rule the split was attempted on.
    pub rule_name: String,
    /// Whether it succeeded.
    pub success: bool,
    /// Created reverse rule name on success.
    pub reverse_rule: Option<String>,
    /// Failure reason otherwise.
    pub error: Option<String>,
}

/// Batch split summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSplitSummary {
    /// Rules examined.
    pub processed: usize,
    /// Successful splits.
    pub succeeded: usize,
    /// Failed splits.
    pub failed: usize,
    /// Per-rule outcomes.
    pub details: Vec<SplitDetail>,
}

/// Splits bidirectional NAT rules into explicit pairs.
pub struct NatSplitter {
    device_type: DeviceType,
    version: PanOsVersion,
}

impl NatSplitter {
    /// Create a splitter for the given device type and version.
    pub fn new(device_type: DeviceType, version: PanOsVersion) -> Self {
        Self {
            device_type,
            version,
        }
    }

    /// Split one bidirectional NAT rule.
    pub fn split_rule(
        &self,
        tree: &mut ConfigTree,
        rulebase: Rulebase,
        context: &Context,
        rule_name: &str,
        options: &NatSplitOptions,
    ) -> Result<SplitOutcome, EngineError> {
        let container_expr = resolver::policy_xpath(
            RuleKind::Nat,
            self.device_type,
            context,
            rulebase,
            self.version,
            None,
        )?;
        let xpath = XPath::parse(&container_expr)?;
        let Some(container_path) = find_first(tree.root(), &xpath) else {
            return Err(EngineError::not_found("nat", rule_name));
        };

        let reverse_name = format!("{rule_name}{}", options.reverse_suffix);
        let mut warnings = Vec::new();

        let container = tree
            .node_mut(&container_path)
            .ok_or_else(|| EngineError::Internal("rules container path did not resolve".to_string()))?;

        let Some(position) = container.entry_position(rule_name) else {
            return Err(EngineError::not_found("nat", rule_name));
        };
        if container.find_entry(&reverse_name).is_some() {
            return Err(EngineError::Conflict {
                kind: "nat".to_string(),
                name: reverse_name,
                message: "reverse rule already exists".to_string(),
            });
        }

        let original = &container.children[position];
        if original.child_text("bi-directional") != Some("yes") {
            return Err(EngineError::invalid_argument(format!(
                "NAT rule '{rule_name}' is not bidirectional"
            )));
        }

        // Build the reverse rule from a clone of the original.
        let mut reverse = original.clone();
        reverse.set_attr("name", reverse_name.clone());
        configure_reverse_rule(&mut reverse, options, &mut warnings);

        container.insert_child(position + 1, reverse);
        info!(rule = rule_name, reverse = %reverse_name, "bidirectional NAT rule split");

        let mut bidirectional_disabled = false;
        if options.disable_orig_bidirectional {
            if let Some(original) = container.find_entry_mut(rule_name) {
                original.remove_child_named("bi-directional");
                bidirectional_disabled = true;
            }
        }

        Ok(SplitOutcome {
            original_rule: rule_name.to_string(),
            reverse_rule: reverse_name,
            bidirectional_disabled,
            warnings,
        })
    }

    /// Split every bidirectional NAT rule in the rulebase, optionally
    /// filtered by a name substring. Per-rule failures never abort the
    /// batch.
    pub fn split_all(
        &self,
        tree: &mut ConfigTree,
        rulebase: Rulebase,
        context: &Context,
        name_filter: Option<&str>,
        options: &NatSplitOptions,
    ) -> Result<BatchSplitSummary, EngineError> {
        let container_expr = resolver::policy_xpath(
            RuleKind::Nat,
            self.device_type,
            context,
            rulebase,
            self.version,
            None,
        )?;
        let xpath = XPath::parse(&container_expr)?;

        let candidates: Vec<String> = find_first(tree.root(), &xpath)
            .and_then(|p| tree.node(&p))
            .map(|container| {
                container
                    .children_named("entry")
                    .filter(|e| e.child_text("bi-directional") == Some("yes"))
                    .filter(|e| {
                        name_filter
                            .map(|f| e.name().map(|n| n.contains(f)).unwrap_or(false))
                            .unwrap_or(true)
                    })
                    .filter_map(|e| e.name().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        info!(count = candidates.len(), "splitting bidirectional NAT rules");
        let mut summary = BatchSplitSummary {
            processed: candidates.len(),
            succeeded: 0,
            failed: 0,
            details: Vec::with_capacity(candidates.len()),
        };

        for rule_name in &candidates {
            match self.split_rule(tree, rulebase, context, rule_name, options) {
                Ok(outcome) => {
                    summary.succeeded += 1;
                    summary.details.push(SplitDetail {
                        rule_name: rule_name.clone(),
                        success: true,
                        reverse_rule: Some(outcome.reverse_rule),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(rule = %rule_name, error = %e, "split failed");
                    summary.failed += 1;
                    summary.details.push(SplitDetail {
                        rule_name: rule_name.clone(),
                        success: false,
                        reverse_rule: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(summary)
    }
}

/// Transform a cloned rule into its reverse.
fn configure_reverse_rule(rule: &mut XmlNode, options: &NatSplitOptions, warnings: &mut Vec<String>) {
    rule.remove_child_named("bi-directional");

    if options.return_rule_any_any {
        set_members_any(rule, "source");
        set_members_any(rule, "from");
    } else {
        if options.zone_swap {
            swap_element_contents(rule, "from", "to");
        }
        if options.address_swap {
            swap_element_contents(rule, "source", "destination");
        }
    }

    // The reverse rule is a plain unidirectional IPv4 rule.
    if let Some(nat_type) = rule.get_child_mut("nat-type") {
        nat_type.text = Some("ipv4".to_string());
    }

    if options.address_swap && !options.return_rule_any_any {
        adapt_translations(rule, warnings);
    }
}

fn set_members_any(rule: &mut XmlNode, tag: &str) {
    if let Some(elem) = rule.get_child_mut(tag) {
        elem.children.clear();
        elem.children.push(XmlNode::with_text("member", "any"));
    }
}

/// Swap the contents (children and text) of two sibling elements, keeping
/// the elements themselves in place.
fn swap_element_contents(rule: &mut XmlNode, tag_a: &str, tag_b: &str) {
    let index_a = rule.children.iter().position(|c| c.tag == tag_a);
    let index_b = rule.children.iter().position(|c| c.tag == tag_b);
    let (Some(index_a), Some(index_b)) = (index_a, index_b) else {
        return;
    };
    if index_a == index_b {
        return;
    }
    let (low, high) = if index_a < index_b {
        (index_a, index_b)
    } else {
        (index_b, index_a)
    };
    let (head, tail) = rule.children.split_at_mut(high);
    let a = &mut head[low];
    let b = &mut tail[0];
    std::mem::swap(&mut a.children, &mut b.children);
    std::mem::swap(&mut a.text, &mut b.text);
}

/// Swap or synthesize the translation blocks for the reverse direction.
fn adapt_translations(rule: &mut XmlNode, warnings: &mut Vec<String>) {
    let source = rule.remove_child_named("source-translation");
    let destination = rule.remove_child_named("destination-translation");

    match (source, destination) {
        (Some(source), Some(destination)) => {
            rule.children
                .push(source_translation_from(&destination, warnings));
            rule.children
                .push(destination_translation_from(&source, warnings));
        }
        (Some(source), None) => {
            rule.children
                .push(destination_translation_from(&source, warnings));
        }
        (None, Some(destination)) => {
            rule.children
                .push(source_translation_from(&destination, warnings));
        }
        (None, None) => {}
    }
}

/// Build a `source-translation` block out of a destination-translation.
fn source_translation_from(destination: &XmlNode, warnings: &mut Vec<String>) -> XmlNode {
    let mut translation = XmlNode::new("source-translation");

    match destination.child_text("translated-address") {
        Some(address) if !address.is_empty() => {
            let mut static_ip = XmlNode::new("static-ip");
            static_ip.set_child_text("translated-address", address);
            translation.children.push(static_ip);
            // Preserve the port intent where the destination carried one.
            if destination.child_text("translated-port").is_some() {
                translation.set_child_text("static-port", "yes");
            }
        }
        _ => {
            warnings.push(
                "destination translation has no translated-address; synthesized 0.0.0.0 interface fallback"
                    .to_string(),
            );
            let mut dynamic = XmlNode::new("dynamic-ip-and-port");
            let mut translated = XmlNode::new("translated-address");
            let mut interface = XmlNode::new("interface-address");
            interface.set_child_text("ip", "0.0.0.0");
            translated.children.push(interface);
            dynamic.children.push(translated);
            translation.children.push(dynamic);
        }
    }
    translation
}

/// Build a `destination-translation` block out of a source-translation.
fn destination_translation_from(source: &XmlNode, warnings: &mut Vec<String>) -> XmlNode {
    let mut translation = XmlNode::new("destination-translation");

    // The translated address can live under static-ip, dynamic-ip, or
    // dynamic-ip-and-port, each with its own shape.
    let address = source
        .get_child("static-ip")
        .and_then(|s| s.child_text("translated-address"))
        .or_else(|| {
            source
                .get_child("dynamic-ip")
                .and_then(|d| d.child_text("translated-address"))
        })
        .or_else(|| {
            source
                .get_child("dynamic-ip-and-port")
                .and_then(first_ip_below)
        });

    match address {
        Some(address) => translation.set_child_text("translated-address", address),
        None => {
            warnings.push(
                "source translation has no resolvable translated address; synthesized 0.0.0.0"
                    .to_string(),
            );
            translation.set_child_text("translated-address", "0.0.0.0");
        }
    }

    if source
        .get_child("static-port")
        .map(|p| p.text.as_deref() == Some("yes"))
        .unwrap_or(false)
    {
        warnings.push("static-port translation approximated with port 0".to_string());
        translation.set_child_text("translated-port", "0");
    }
    translation
}

/// First `ip` text anywhere below the element.
fn first_ip_below(node: &XmlNode) -> Option<&str> {
    for child in &node.children {
        if child.tag == "ip" {
            if let Some(text) = &child.text {
                return Some(text);
            }
        }
        if let Some(found) = first_ip_below(child) {
            return Some(found);
        }
    }
    None
}
