//! Deduplication of value-equivalent objects.
//!
//! Objects of one kind within one context are grouped by a canonical value
//! key; each equivalence class keeps one primary and the rest are deleted,
//! with every reference in the reachability scope rewritten to the primary
//! name. A dry run returns the proposed mapping without mutating.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::graph::ReferenceGraph;
use crate::resolver;
use crate::types::kind::ALL_RULE_KINDS;
use crate::types::{Context, DeviceType, EngineError, ObjectKind, PanOsVersion, Rulebase};
use crate::xml::{find_first, ConfigTree, XPath, XmlNode};

/// How the surviving primary of an equivalence class is chosen.
///
/// For a fixed strategy and input the choice is a pure function of the
/// class; `shortest`/`longest` tie-break alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryStrategy {
    /// First name in encounter (document) order.
    First,
    /// Shortest name; alphabetical tiebreak.
    Shortest,
    /// Longest name; alphabetical tiebreak.
    Longest,
    /// Alphabetically first name.
    Alphabetical,
}

impl PrimaryStrategy {
    /// Parse an API label.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "first" => Some(Self::First),
            "shortest" => Some(Self::Shortest),
            "longest" => Some(Self::Longest),
            "alphabetical" => Some(Self::Alphabetical),
            _ => None,
        }
    }

    /// Choose the primary from a class (names in encounter order).
    pub fn choose<'a>(&self, names: &'a [String]) -> &'a str {
        match self {
            Self::First => names.first().map(String::as_str).unwrap_or(""),
            Self::Shortest => names
                .iter()
                .min_by_key(|n| (n.len(), n.as_str()))
                .map(String::as_str)
                .unwrap_or(""),
            Self::Longest => names
                .iter()
                .min_by_key(|n| (std::cmp::Reverse(n.len()), n.as_str()))
                .map(String::as_str)
                .unwrap_or(""),
            Self::Alphabetical => names
                .iter()
                .min_by_key(|n| n.as_str())
                .map(String::as_str)
                .unwrap_or(""),
        }
    }
}

/// One equivalence class in a dedup report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateClass {
    /// Canonical value key shared by the class.
    pub value_key: String,
    /// The surviving name.
    pub primary: String,
    /// Names merged away (empty in a class of one is never reported).
    pub duplicates: Vec<String>,
}

/// One rewritten reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenReference {
    /// Context the holder lives in.
    pub context: String,
    /// Human-readable holder description (`security rule 'r1'`, ...).
    pub holder: String,
    /// The field rewritten.
    pub field: String,
    /// Old referenced name.
    pub from: String,
    /// New referenced name (the primary).
    pub to: String,
}

/// Outcome of a dedup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeReport {
    /// Object kind deduplicated.
    pub kind: ObjectKind,
    /// Context deduplicated.
    pub context: Context,
    /// Equivalence classes with two or more members.
    pub classes: Vec<DuplicateClass>,
    /// Names deleted from the tree (empty on a dry run).
    pub removed: Vec<String>,
    /// References rewritten to primary names (empty on a dry run).
    pub rewritten: Vec<RewrittenReference>,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

/// Finds and collapses value-equivalent objects.
pub struct Deduplicator {
    device_type: DeviceType,
    version: PanOsVersion,
    strategy: PrimaryStrategy,
}

impl Deduplicator {
    /// Create a deduplicator.
    pub fn new(device_type: DeviceType, version: PanOsVersion, strategy: PrimaryStrategy) -> Self {
        Self {
            device_type,
            version,
            strategy,
        }
    }

    /// Group objects of a kind by canonical value key.
    ///
    /// The map is ordered by value key; each class lists names in document
    /// order. Classes of one are included (callers filter as needed).
    pub fn find_duplicates(
        &self,
        tree: &ConfigTree,
        kind: ObjectKind,
        context: &Context,
    ) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
        let container_expr =
            resolver::object_xpath(kind, self.device_type, context, self.version, None)?;
        let xpath = XPath::parse(&container_expr)?;
        let mut classes: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let Some(path) = find_first(tree.root(), &xpath) else {
            return Ok(classes);
        };
        let Some(container) = tree.node(&path) else {
            return Ok(classes);
        };
        for entry in container.children_named("entry") {
            let Some(name) = entry.name() else {
                continue;
            };
            let Some(key) = value_key(entry, kind)? else {
                continue;
            };
            classes.entry(key).or_default().push(name.to_string());
        }
        Ok(classes)
    }

    /// Collapse duplicates of a kind within a context.
    ///
    /// With `dry_run`, the proposed classes are reported and nothing is
    /// mutated. With `validate`, the postcondition — no reference in the
    /// reachability scope still points at a deleted name — is checked after
    /// the apply phase.
    pub fn deduplicate(
        &self,
        tree: &mut ConfigTree,
        kind: ObjectKind,
        context: &Context,
        dry_run: bool,
        validate: bool,
    ) -> Result<DedupeReport, EngineError> {
        context.validate_for(self.device_type)?;
        let groups = self.find_duplicates(tree, kind, context)?;

        let mut classes = Vec::new();
        let mut rename: BTreeMap<String, String> = BTreeMap::new();
        for (value_key, names) in &groups {
            if names.len() < 2 {
                continue;
            }
            let primary = self.strategy.choose(names).to_string();
            let duplicates: Vec<String> =
                names.iter().filter(|n| **n != primary).cloned().collect();
            for duplicate in &duplicates {
                rename.insert(duplicate.clone(), primary.clone());
            }
            classes.push(DuplicateClass {
                value_key: value_key.clone(),
                primary,
                duplicates,
            });
        }

        info!(
            kind = %kind,
            context = %context,
            classes = classes.len(),
            dry_run,
            "deduplication analysis complete"
        );

        if dry_run || classes.is_empty() {
            return Ok(DedupeReport {
                kind,
                context: context.clone(),
                classes,
                removed: Vec::new(),
                rewritten: Vec::new(),
                dry_run,
            });
        }

        // Apply phase: delete non-primaries, then rewrite references across
        // the reachability scope.
        let scope = ReferenceGraph::new(tree, self.device_type, self.version)
            .reachability_scope(context);

        let container_expr =
            resolver::object_xpath(kind, self.device_type, context, self.version, None)?;
        let xpath = XPath::parse(&container_expr)?;
        let mut removed = Vec::new();
        if let Some(path) = find_first(tree.root(), &xpath) {
            if let Some(container) = tree.node_mut(&path) {
                for duplicate in rename.keys() {
                    if container.remove_entry(duplicate).is_some() {
                        removed.push(duplicate.clone());
                    }
                }
            }
        }

        let mut rewritten = Vec::new();
        for ctx in &scope {
            self.rewrite_context(tree, kind, ctx, &rename, &mut rewritten)?;
        }

        if validate {
            self.check_postcondition(tree, kind, context, &removed)?;
        }

        Ok(DedupeReport {
            kind,
            context: context.clone(),
            classes,
            removed,
            rewritten,
            dry_run: false,
        })
    }

    /// Rewrite references in one context: rule projections plus group
    /// member lists (and tag carriers for tag dedup).
    fn rewrite_context(
        &self,
        tree: &mut ConfigTree,
        kind: ObjectKind,
        ctx: &Context,
        rename: &BTreeMap<String, String>,
        rewritten: &mut Vec<RewrittenReference>,
    ) -> Result<(), EngineError> {
        // Rule field projections per kind (the policy merger's list).
        let rule_fields: &[&str] = match kind {
            ObjectKind::Address | ObjectKind::AddressGroup => &["source", "destination"],
            ObjectKind::Service | ObjectKind::ServiceGroup => &["service"],
            ObjectKind::Application | ObjectKind::ApplicationGroup => &["application"],
            ObjectKind::CustomUrlCategory => &["category"],
            ObjectKind::Tag => &["tag"],
            _ => &[],
        };

        for rule_kind in ALL_RULE_KINDS {
            for rulebase in Rulebase::for_device(self.device_type) {
                let Ok(expr) = resolver::policy_xpath(
                    rule_kind,
                    self.device_type,
                    ctx,
                    *rulebase,
                    self.version,
                    None,
                ) else {
                    continue;
                };
                let xpath = XPath::parse(&expr)?;
                let Some(path) = find_first(tree.root(), &xpath) else {
                    continue;
                };
                let Some(container) = tree.node_mut(&path) else {
                    continue;
                };
                for rule in container.children.iter_mut().filter(|c| c.tag == "entry") {
                    let holder = format!(
                        "{} rule '{}'",
                        rule_kind,
                        rule.name().unwrap_or("unknown")
                    );
                    for field in rule_fields {
                        rewrite_members(rule, field, rename, ctx, &holder, rewritten);
                    }
                    if kind == ObjectKind::Schedule {
                        rewrite_text_child(rule, "schedule", rename, ctx, &holder, rewritten);
                    }
                    if kind == ObjectKind::SecurityProfileGroup {
                        if let Some(group) = rule
                            .get_child_mut("profile-setting")
                            .and_then(|ps| ps.get_child_mut("group"))
                        {
                            rewrite_member_list(group, rename, ctx, &holder, "profile-setting group", rewritten);
                        }
                    }
                }
            }
        }

        // Group member lists.
        let group_kind = match kind {
            ObjectKind::Address | ObjectKind::AddressGroup => Some(ObjectKind::AddressGroup),
            ObjectKind::Service | ObjectKind::ServiceGroup => Some(ObjectKind::ServiceGroup),
            ObjectKind::Application | ObjectKind::ApplicationGroup => {
                Some(ObjectKind::ApplicationGroup)
            }
            _ => None,
        };
        if let Some(group_kind) = group_kind {
            if let Some(container) = self.container_mut(tree, group_kind, ctx)? {
                for entry in container.children.iter_mut().filter(|c| c.tag == "entry") {
                    let holder =
                        format!("{} '{}'", group_kind, entry.name().unwrap_or("unknown"));
                    let list = if group_kind == ObjectKind::AddressGroup {
                        entry.get_child_mut("static")
                    } else {
                        entry.get_child_mut("members")
                    };
                    if let Some(list) = list {
                        rewrite_member_list(list, rename, ctx, &holder, "member", rewritten);
                    }
                }
            }
        }

        // Profile groups reference the individual profile kinds.
        if kind.is_security_profile() {
            let element = kind.profile_element().unwrap_or_default();
            if let Some(container) =
                self.container_mut(tree, ObjectKind::SecurityProfileGroup, ctx)?
            {
                for entry in container.children.iter_mut().filter(|c| c.tag == "entry") {
                    let holder = format!(
                        "security_profile_group '{}'",
                        entry.name().unwrap_or("unknown")
                    );
                    if let Some(list) = entry.get_child_mut(element) {
                        rewrite_member_list(list, rename, ctx, &holder, element, rewritten);
                    }
                }
            }
        }

        // Tag dedup also rewrites tag carriers: object tag lists and
        // dynamic group filters, so no dangling tag reference survives.
        if kind == ObjectKind::Tag {
            for carrier in [
                ObjectKind::Address,
                ObjectKind::AddressGroup,
                ObjectKind::Service,
                ObjectKind::ServiceGroup,
            ] {
                if let Some(container) = self.container_mut(tree, carrier, ctx)? {
                    for entry in container.children.iter_mut().filter(|c| c.tag == "entry") {
                        let holder = format!("{} '{}'", carrier, entry.name().unwrap_or("unknown"));
                        rewrite_members(entry, "tag", rename, ctx, &holder, rewritten);
                        if let Some(filter) = entry
                            .get_child_mut("dynamic")
                            .and_then(|d| d.get_child_mut("filter"))
                        {
                            if let Some(text) = &filter.text {
                                let mut updated = text.clone();
                                for (from, to) in rename {
                                    updated = updated
                                        .replace(&format!("'{from}'"), &format!("'{to}'"))
                                        .replace(&format!("\"{from}\""), &format!("\"{to}\""));
                                }
                                if updated != *text {
                                    rewritten.push(RewrittenReference {
                                        context: ctx.label(),
                                        holder: holder.clone(),
                                        field: "dynamic filter".to_string(),
                                        from: text.clone(),
                                        to: updated.clone(),
                                    });
                                    filter.text = Some(updated);
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn container_mut<'t>(
        &self,
        tree: &'t mut ConfigTree,
        kind: ObjectKind,
        ctx: &Context,
    ) -> Result<Option<&'t mut XmlNode>, EngineError> {
        let Ok(expr) = resolver::object_xpath(kind, self.device_type, ctx, self.version, None)
        else {
            return Ok(None);
        };
        let xpath = XPath::parse(&expr)?;
        let Some(path) = find_first(tree.root(), &xpath) else {
            return Ok(None);
        };
        Ok(tree.node_mut(&path))
    }

    fn check_postcondition(
        &self,
        tree: &ConfigTree,
        kind: ObjectKind,
        context: &Context,
        removed: &[String],
    ) -> Result<(), EngineError> {
        let graph = ReferenceGraph::new(tree, self.device_type, self.version);
        let mut survivors = Vec::new();
        for name in removed {
            let refs = graph.referenced_by(kind, name, context)?;
            for reference in refs {
                survivors.push(format!(
                    "{} still references deleted {} '{}' via {}",
                    reference.holder_name, kind, name, reference.field
                ));
            }
        }
        if survivors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ValidationFailed {
                name: kind.as_str().to_string(),
                errors: survivors,
            })
        }
    }
}

fn rewrite_members(
    entry: &mut XmlNode,
    field: &str,
    rename: &BTreeMap<String, String>,
    ctx: &Context,
    holder: &str,
    rewritten: &mut Vec<RewrittenReference>,
) {
    if let Some(list) = entry.get_child_mut(field) {
        rewrite_member_list(list, rename, ctx, holder, field, rewritten);
    }
}

fn rewrite_member_list(
    list: &mut XmlNode,
    rename: &BTreeMap<String, String>,
    ctx: &Context,
    holder: &str,
    field: &str,
    rewritten: &mut Vec<RewrittenReference>,
) {
    let mut seen: Vec<String> = list
        .children_named("member")
        .filter_map(|m| m.text.clone())
        .collect();
    let mut changed = false;
    for member in &mut seen {
        if let Some(primary) = rename.get(member) {
            rewritten.push(RewrittenReference {
                context: ctx.label(),
                holder: holder.to_string(),
                field: field.to_string(),
                from: member.clone(),
                to: primary.clone(),
            });
            *member = primary.clone();
            changed = true;
        }
    }
    if !changed {
        return;
    }
    // Rewriting can introduce duplicate members; collapse them.
    let mut deduped: Vec<String> = Vec::with_capacity(seen.len());
    for member in seen {
        if !deduped.contains(&member) {
            deduped.push(member);
        }
    }
    list.children.retain(|c| c.tag != "member");
    for member in &deduped {
        list.children.push(XmlNode::with_text("member", member));
    }
}

fn rewrite_text_child(
    entry: &mut XmlNode,
    field: &str,
    rename: &BTreeMap<String, String>,
    ctx: &Context,
    holder: &str,
    rewritten: &mut Vec<RewrittenReference>,
) {
    if let Some(child) = entry.get_child_mut(field) {
        if let Some(text) = &child.text {
            if let Some(primary) = rename.get(text) {
                rewritten.push(RewrittenReference {
                    context: ctx.label(),
                    holder: holder.to_string(),
                    field: field.to_string(),
                    from: text.clone(),
                    to: primary.clone(),
                });
                child.text = Some(primary.clone());
            }
        }
    }
}

/// Canonical value key of an entry; `None` when the kind has no value
/// identity for this entry (e.g. a dynamic group during static-group dedup).
fn value_key(entry: &XmlNode, kind: ObjectKind) -> Result<Option<String>, EngineError> {
    match kind {
        ObjectKind::Address => {
            for (form, canon) in [
                ("ip-netmask", canonical_netmask as fn(&str) -> String),
                ("ip-range", canonical_range),
                ("fqdn", canonical_fqdn),
                ("ip-wildcard", |v: &str| v.trim().to_string()),
            ] {
                if let Some(value) = entry.child_text(form) {
                    return Ok(Some(format!("{form}:{}", canon(value))));
                }
            }
            Ok(None)
        }
        ObjectKind::Service => {
            let Some(protocol) = entry.get_child("protocol") else {
                return Ok(None);
            };
            let Some(transport) = protocol.children.first() else {
                return Ok(None);
            };
            let port = canonical_port_list(transport.child_text("port").unwrap_or(""));
            let source_port =
                canonical_port_list(transport.child_text("source-port").unwrap_or(""));
            Ok(Some(format!("{}:{}:{}", transport.tag, port, source_port)))
        }
        ObjectKind::Tag => {
            let color = entry.child_text("color").unwrap_or("");
            let comments = entry.child_text("comments").unwrap_or("");
            Ok(Some(format!("color={color}|comments={comments}")))
        }
        ObjectKind::AddressGroup => {
            let Some(static_elem) = entry.get_child("static") else {
                return Ok(None);
            };
            let mut members: Vec<String> = static_elem
                .children_named("member")
                .filter_map(|m| m.text.clone())
                .collect();
            members.sort();
            Ok(Some(format!("static:{}", members.join(","))))
        }
        ObjectKind::ServiceGroup => {
            let mut members = entry.member_values("members");
            members.sort();
            Ok(Some(format!("members:{}", members.join(","))))
        }
        other => Err(EngineError::invalid_argument(format!(
            "deduplication is not defined for kind '{other}'"
        ))),
    }
}

/// Normalize an IP netmask to network form: host bits masked off, prefix
/// made explicit.
fn canonical_netmask(value: &str) -> String {
    let value = value.trim();
    let (addr, prefix) = match value.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.parse::<u8>().ok()),
        None => (value, None),
    };
    if let Ok(v4) = addr.parse::<Ipv4Addr>() {
        let prefix = prefix.unwrap_or(32).min(32);
        let bits = u32::from(v4);
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        let network = Ipv4Addr::from(bits & mask);
        return format!("{network}/{prefix}");
    }
    if let Ok(v6) = addr.parse::<Ipv6Addr>() {
        let prefix = prefix.unwrap_or(128).min(128);
        let bits = u128::from(v6);
        let mask = if prefix == 0 {
            0
        } else {
            u128::MAX << (128 - prefix)
        };
        let network = Ipv6Addr::from(bits & mask);
        return format!("{network}/{prefix}");
    }
    value.to_string()
}

/// Normalize a range so the lower endpoint comes first.
fn canonical_range(value: &str) -> String {
    let value = value.trim();
    let Some((start, end)) = value.split_once('-') else {
        return value.to_string();
    };
    match (start.parse::<Ipv4Addr>(), end.parse::<Ipv4Addr>()) {
        (Ok(start), Ok(end)) if end < start => format!("{end}-{start}"),
        (Ok(start), Ok(end)) => format!("{start}-{end}"),
        _ => {
            if end < start {
                format!("{end}-{start}")
            } else {
                value.to_string()
            }
        }
    }
}

fn canonical_fqdn(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Sort and normalize a comma-separated port list.
fn canonical_port_list(value: &str) -> String {
    let mut parts: Vec<String> = value
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    parts.sort();
    parts.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::version::V11_0;

    fn dg1_tree() -> ConfigTree {
        ConfigTree::parse(
            r#"<config>
                 <devices>
                   <entry name="localhost.localdomain">
                     <device-group>
                       <entry name="DG1">
                         <address>
                           <entry name="server1"><ip-netmask>10.0.0.1/32</ip-netmask></entry>
                           <entry name="server-one"><ip-netmask>10.0.0.1/32</ip-netmask></entry>
                           <entry name="db-server"><ip-netmask>10.0.0.2/32</ip-netmask></entry>
                           <entry name="database"><ip-netmask>10.0.0.2/32</ip-netmask></entry>
                         </address>
                         <address-group>
                           <entry name="servers">
                             <static>
                               <member>server1</member>
                               <member>server-one</member>
                               <member>db-server</member>
                             </static>
                           </entry>
                         </address-group>
                         <pre-rulebase>
                           <security>
                             <rules>
                               <entry name="r1">
                                 <source><member>server-one</member></source>
                                 <destination><member>database</member></destination>
                               </entry>
                             </rules>
                           </security>
                         </pre-rulebase>
                       </entry>
                     </device-group>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap()
    }

    fn dedup() -> Deduplicator {
        Deduplicator::new(DeviceType::Panorama, V11_0, PrimaryStrategy::Shortest)
    }

    #[test]
    fn test_canonical_forms() {
        assert_eq!(canonical_netmask("10.0.0.5/24"), "10.0.0.0/24");
        assert_eq!(canonical_netmask("10.0.0.5"), "10.0.0.5/32");
        assert_eq!(canonical_range("10.0.0.9-10.0.0.1"), "10.0.0.1-10.0.0.9");
        assert_eq!(canonical_fqdn(" WWW.Example.COM "), "www.example.com");
        assert_eq!(canonical_port_list("8080, 80"), "80,8080");
    }

    #[test]
    fn test_primary_strategies() {
        let names = vec![
            "server1".to_string(),
            "server-one".to_string(),
            "alpha-server-name".to_string(),
        ];
        assert_eq!(PrimaryStrategy::First.choose(&names), "server1");
        assert_eq!(PrimaryStrategy::Shortest.choose(&names), "server1");
        assert_eq!(PrimaryStrategy::Longest.choose(&names), "alpha-server-name");
        assert_eq!(
            PrimaryStrategy::Alphabetical.choose(&names),
            "alpha-server-name"
        );

        // Alphabetical tiebreak on equal lengths.
        let tied = vec!["bbb".to_string(), "aaa".to_string()];
        assert_eq!(PrimaryStrategy::Shortest.choose(&tied), "aaa");
        assert_eq!(PrimaryStrategy::Longest.choose(&tied), "aaa");
    }

    #[test]
    fn test_find_duplicates_groups_by_canonical_value() {
        let tree = dg1_tree();
        let groups = dedup()
            .find_duplicates(&tree, ObjectKind::Address, &Context::device_group("DG1"))
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups.get("ip-netmask:10.0.0.1/32").unwrap(),
            &vec!["server1".to_string(), "server-one".to_string()]
        );
    }

    #[test]
    fn test_dry_run_reports_without_mutation() {
        let mut tree = dg1_tree();
        let before = tree.root().to_xml();
        let report = dedup()
            .deduplicate(
                &mut tree,
                ObjectKind::Address,
                &Context::device_group("DG1"),
                true,
                false,
            )
            .unwrap();
        assert!(report.dry_run);
        assert_eq!(report.classes.len(), 2);
        assert!(report.removed.is_empty());
        assert_eq!(tree.root().to_xml(), before);
    }

    #[test]
    fn test_apply_removes_duplicates_and_rewrites() {
        let mut tree = dg1_tree();
        let report = dedup()
            .deduplicate(
                &mut tree,
                ObjectKind::Address,
                &Context::device_group("DG1"),
                false,
                true,
            )
            .unwrap();

        // shortest: 'server1' beats 'server-one'; 'database' beats 'db-server'.
        let primaries: Vec<&str> = report.classes.iter().map(|c| c.primary.as_str()).collect();
        assert!(primaries.contains(&"server1"));
        assert!(primaries.contains(&"database"));
        assert_eq!(report.removed.len(), 2);
        assert!(report.removed.contains(&"server-one".to_string()));
        assert!(report.removed.contains(&"db-server".to_string()));

        // The group member list was rewritten and deduped.
        let xpath = XPath::parse(&format!(
            "{}/device-group/entry[@name='DG1']/address-group/entry[@name='servers']",
            resolver::LOCALHOST
        ))
        .unwrap();
        let group = find_first(tree.root(), &xpath)
            .and_then(|p| tree.node(&p))
            .unwrap();
        let members: Vec<String> = group
            .get_child("static")
            .unwrap()
            .children_named("member")
            .filter_map(|m| m.text.clone())
            .collect();
        assert_eq!(members, vec!["server1", "database"]);

        // The rule fields were rewritten too.
        let xpath = XPath::parse(&format!(
            "{}/device-group/entry[@name='DG1']/pre-rulebase/security/rules/entry[@name='r1']",
            resolver::LOCALHOST
        ))
        .unwrap();
        let rule = find_first(tree.root(), &xpath)
            .and_then(|p| tree.node(&p))
            .unwrap();
        assert_eq!(rule.member_values("source"), vec!["server1"]);
        assert_eq!(rule.member_values("destination"), vec!["database"]);
    }

    #[test]
    fn test_deterministic_for_fixed_input() {
        let report1 = dedup()
            .deduplicate(
                &mut dg1_tree(),
                ObjectKind::Address,
                &Context::device_group("DG1"),
                false,
                false,
            )
            .unwrap();
        let report2 = dedup()
            .deduplicate(
                &mut dg1_tree(),
                ObjectKind::Address,
                &Context::device_group("DG1"),
                false,
                false,
            )
            .unwrap();
        assert_eq!(report1.classes, report2.classes);
        assert_eq!(report1.removed, report2.removed);
    }

    #[test]
    fn test_unsupported_kind_rejected() {
        let tree = dg1_tree();
        let err = dedup()
            .find_duplicates(&tree, ObjectKind::Schedule, &Context::device_group("DG1"))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }
}
