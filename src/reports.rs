//! Analysis reports over a configuration.
//!
//! Reports are plain serializable structs; rendering to JSON/CSV/HTML is
//! the caller's concern. Hit counts are an input here, never produced.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dedupe::{Deduplicator, PrimaryStrategy};
use crate::graph::{Dependency, Reference, ReferenceGraph};
use crate::resolver;
use crate::types::kind::ALL_RULE_KINDS;
use crate::types::{Context, DeviceType, EngineError, ObjectKind, PanOsVersion, RuleKind, Rulebase};
use crate::xml::{find_first, ConfigTree, XPath};

/// Objects of a kind that nothing in the reachability scope references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedObjectsReport {
    /// Kind analyzed.
    pub kind: ObjectKind,
    /// Context analyzed.
    pub context: Context,
    /// Total objects of the kind in the context.
    pub total: usize,
    /// Names with no incoming references.
    pub unused: Vec<String>,
}

/// Value-equivalent objects, grouped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateObjectsReport {
    /// Kind analyzed.
    pub kind: ObjectKind,
    /// Context analyzed.
    pub context: Context,
    /// Classes with two or more members, keyed by canonical value.
    pub duplicates: BTreeMap<String, Vec<String>>,
}

/// Per-rulebase rule statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulebaseCoverage {
    /// Rule kind.
    pub rule_kind: RuleKind,
    /// Rulebase side.
    pub rulebase: Rulebase,
    /// Context scanned.
    pub context: Context,
    /// Total rules.
    pub total: usize,
    /// Disabled rules.
    pub disabled: usize,
    /// Rules with `any` source, destination, and service.
    pub any_any: usize,
}

/// Rule statistics across every rulebase in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCoverageReport {
    /// One entry per non-empty rulebase.
    pub rulebases: Vec<RulebaseCoverage>,
    /// Total rules across all rulebases.
    pub total_rules: usize,
}

/// Forward and reverse references of one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceCheckReport {
    /// Kind of the checked entity.
    pub kind: ObjectKind,
    /// Name of the checked entity.
    pub name: String,
    /// Context of the checked entity.
    pub context: Context,
    /// What it references.
    pub depends_on: Vec<Dependency>,
    /// Referenced names that do not resolve anywhere reachable.
    pub unresolved: Vec<String>,
    /// What references it.
    pub referenced_by: Vec<Reference>,
}

/// Activity bucket of a rule, from caller-supplied hit counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitBucket {
    /// Zero hits.
    Unused,
    /// 1–99 hits.
    Low,
    /// 100–9 999 hits.
    Medium,
    /// 10 000+ hits.
    High,
    /// Rule not present in the supplied counts.
    NoData,
}

impl HitBucket {
    fn for_count(count: Option<u64>) -> Self {
        match count {
            None => Self::NoData,
            Some(0) => Self::Unused,
            Some(1..=99) => Self::Low,
            Some(100..=9_999) => Self::Medium,
            Some(_) => Self::High,
        }
    }
}

/// One rule's hit activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleHitCount {
    /// Rule name.
    pub rule: String,
    /// Supplied count, if any.
    pub count: Option<u64>,
    /// Derived bucket.
    pub bucket: HitBucket,
}

/// Hit-count analysis of one rulebase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitCountReport {
    /// Rule kind analyzed.
    pub rule_kind: RuleKind,
    /// Context analyzed.
    pub context: Context,
    /// Per-rule activity, in rulebase order.
    pub rules: Vec<RuleHitCount>,
    /// Bucket totals.
    pub bucket_counts: BTreeMap<String, usize>,
}

/// Compute the unused objects of a kind in a context.
pub fn unused_objects(
    tree: &ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
    kind: ObjectKind,
    context: &Context,
) -> Result<UnusedObjectsReport, EngineError> {
    let graph = ReferenceGraph::new(tree, device_type, version);
    let names = object_names(tree, device_type, version, kind, context)?;
    let mut unused = Vec::new();
    for name in &names {
        if graph.is_unused(kind, name, context)? {
            unused.push(name.clone());
        }
    }
    Ok(UnusedObjectsReport {
        kind,
        context: context.clone(),
        total: names.len(),
        unused,
    })
}

/// Group value-equivalent objects of a kind in a context.
pub fn duplicate_objects(
    tree: &ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
    kind: ObjectKind,
    context: &Context,
) -> Result<DuplicateObjectsReport, EngineError> {
    let dedup = Deduplicator::new(device_type, version, PrimaryStrategy::First);
    let duplicates: BTreeMap<String, Vec<String>> = dedup
        .find_duplicates(tree, kind, context)?
        .into_iter()
        .filter(|(_, names)| names.len() >= 2)
        .collect();
    Ok(DuplicateObjectsReport {
        kind,
        context: context.clone(),
        duplicates,
    })
}

/// Rule statistics across every context and rulebase in the tree.
pub fn rule_coverage(
    tree: &ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
) -> Result<RuleCoverageReport, EngineError> {
    let graph = ReferenceGraph::new(tree, device_type, version);
    let contexts: Vec<Context> = match device_type {
        DeviceType::Panorama => {
            let mut contexts = vec![Context::Shared];
            contexts.extend(graph.device_groups().into_iter().map(Context::DeviceGroup));
            contexts
        }
        DeviceType::Firewall => graph.vsys_names().into_iter().map(Context::Vsys).collect(),
    };

    let mut rulebases = Vec::new();
    let mut total_rules = 0;
    for context in &contexts {
        for rule_kind in ALL_RULE_KINDS {
            for rulebase in Rulebase::for_device(device_type) {
                let Ok(expr) = resolver::policy_xpath(
                    rule_kind,
                    device_type,
                    context,
                    *rulebase,
                    version,
                    None,
                ) else {
                    continue;
                };
                let xpath = XPath::parse(&expr)?;
                let Some(container) = find_first(tree.root(), &xpath).and_then(|p| tree.node(&p))
                else {
                    continue;
                };
                let entries: Vec<_> = container.children_named("entry").collect();
                if entries.is_empty() {
                    continue;
                }
                let disabled = entries
                    .iter()
                    .filter(|e| e.child_text("disabled") == Some("yes"))
                    .count();
                let any_any = entries
                    .iter()
                    .filter(|e| {
                        e.member_values("source") == ["any"]
                            && e.member_values("destination") == ["any"]
                            && (e.member_values("service") == ["any"]
                                || e.member_values("service").is_empty())
                    })
                    .count();
                total_rules += entries.len();
                rulebases.push(RulebaseCoverage {
                    rule_kind,
                    rulebase: *rulebase,
                    context: context.clone(),
                    total: entries.len(),
                    disabled,
                    any_any,
                });
            }
        }
    }
    Ok(RuleCoverageReport {
        rulebases,
        total_rules,
    })
}

/// Forward and reverse references of one entity.
pub fn reference_check(
    tree: &ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
    kind: ObjectKind,
    name: &str,
    context: &Context,
) -> Result<ReferenceCheckReport, EngineError> {
    let graph = ReferenceGraph::new(tree, device_type, version);
    let depends_on = graph.depends_on(kind, name, context)?;
    let unresolved = depends_on
        .iter()
        .filter(|d| !d.resolved)
        .map(|d| d.name.clone())
        .collect();
    let referenced_by = graph.referenced_by(kind, name, context)?;
    Ok(ReferenceCheckReport {
        kind,
        name: name.to_string(),
        context: context.clone(),
        depends_on,
        unresolved,
        referenced_by,
    })
}

/// Bucket a rulebase's rules by caller-supplied hit counts.
pub fn hit_count_analysis(
    tree: &ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
    rule_kind: RuleKind,
    rulebase: Rulebase,
    context: &Context,
    hits: &BTreeMap<String, u64>,
) -> Result<HitCountReport, EngineError> {
    let expr = resolver::policy_xpath(rule_kind, device_type, context, rulebase, version, None)?;
    let xpath = XPath::parse(&expr)?;
    let mut rules = Vec::new();
    if let Some(container) = find_first(tree.root(), &xpath).and_then(|p| tree.node(&p)) {
        for entry in container.children_named("entry") {
            let Some(rule_name) = entry.name() else {
                continue;
            };
            let count = hits.get(rule_name).copied();
            rules.push(RuleHitCount {
                rule: rule_name.to_string(),
                count,
                bucket: HitBucket::for_count(count),
            });
        }
    }
    let mut bucket_counts: BTreeMap<String, usize> = BTreeMap::new();
    for rule in &rules {
        let label = serde_json::to_value(rule.bucket)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        *bucket_counts.entry(label).or_insert(0) += 1;
    }
    Ok(HitCountReport {
        rule_kind,
        context: context.clone(),
        rules,
        bucket_counts,
    })
}

fn object_names(
    tree: &ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
    kind: ObjectKind,
    context: &Context,
) -> Result<Vec<String>, EngineError> {
    let expr = resolver::object_xpath(kind, device_type, context, version, None)?;
    let xpath = XPath::parse(&expr)?;
    Ok(find_first(tree.root(), &xpath)
        .and_then(|p| tree.node(&p))
        .map(|c| c.entry_names())
        .unwrap_or_default())
}
