//! Reference graph: who refers to whom, in both directions.
//!
//! The graph is computed lazily per query against a borrowed tree; it holds
//! no state of its own, so a mutation (which requires the borrow to end)
//! can never be observed through a stale graph.
//!
//! Contextual reachability on Panorama is first-class: an object in
//! `shared` is referenceable from every device group; an object in device
//! group `D` is referenceable from `D` and its descendants (declared by
//! `parent-dg` elements; with no hierarchy data every device group is a
//! direct child of `shared`).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::objects::dynamic_filter_tags;
use crate::resolver;
use crate::types::kind::{ALL_RULE_KINDS, SECURITY_PROFILE_KINDS};
use crate::types::{
    Context, DeviceType, EngineError, ObjectKind, PanOsVersion, RuleKind, Rulebase,
};
use crate::xml::{find_paths, ConfigTree, XPath, XmlNode};

/// The entity holding a reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "holder_type", rename_all = "snake_case")]
pub enum ReferenceHolder {
    /// An object (e.g. a group listing the entity as a member).
    Object {
        /// Holder kind.
        kind: ObjectKind,
    },
    /// A rule.
    Rule {
        /// Holder rule kind.
        kind: RuleKind,
        /// The rulebase side the rule lives in.
        rulebase: Rulebase,
    },
}

/// One incoming reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// What holds the reference.
    pub holder: ReferenceHolder,
    /// Name of the holding entity.
    pub holder_name: String,
    /// Context the holder lives in.
    pub context: Context,
    /// The field the reference appears in (`source`, `static member`, ...).
    pub field: String,
}

/// A resolved outgoing dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Kind of the referenced entity (best resolution: the kind under which
    /// the name actually resolves, else the expected kind).
    pub kind: ObjectKind,
    /// Referenced name.
    pub name: String,
    /// Whether the name resolves in the reachable scope.
    pub resolved: bool,
}

/// Reference graph over one configuration tree.
pub struct ReferenceGraph<'a> {
    tree: &'a ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
}

impl<'a> ReferenceGraph<'a> {
    /// Build a graph view over a tree.
    pub fn new(tree: &'a ConfigTree, device_type: DeviceType, version: PanOsVersion) -> Self {
        Self {
            tree,
            device_type,
            version,
        }
    }

    /// All device-group names in the tree.
    pub fn device_groups(&self) -> Vec<String> {
        let Ok(xpath) = XPath::parse(&format!("{}/device-group", resolver::LOCALHOST)) else {
            return Vec::new();
        };
        find_paths(self.tree.root(), &xpath)
            .first()
            .and_then(|p| self.tree.node(p))
            .map(|n| n.entry_names())
            .unwrap_or_default()
    }

    /// All vsys names in the tree.
    pub fn vsys_names(&self) -> Vec<String> {
        let Ok(xpath) = XPath::parse(&format!("{}/vsys", resolver::LOCALHOST)) else {
            return Vec::new();
        };
        find_paths(self.tree.root(), &xpath)
            .first()
            .and_then(|p| self.tree.node(p))
            .map(|n| n.entry_names())
            .unwrap_or_default()
    }

    /// Declared parent of a device group, when the tree carries hierarchy.
    fn parent_device_group(&self, name: &str) -> Option<String> {
        let xpath = XPath::parse(&format!(
            "{}/device-group/entry[@name='{name}']",
            resolver::LOCALHOST
        ))
        .ok()?;
        let path = find_paths(self.tree.root(), &xpath).into_iter().next()?;
        self.tree
            .node(&path)?
            .child_text("parent-dg")
            .map(str::to_string)
    }

    /// Device groups at or below the given group in the hierarchy.
    pub fn descendant_device_groups(&self, name: &str) -> Vec<String> {
        let all = self.device_groups();
        let mut descendants = vec![name.to_string()];
        // Fixed point over the declared parent chain.
        loop {
            let mut grew = false;
            for dg in &all {
                if descendants.contains(dg) {
                    continue;
                }
                if let Some(parent) = self.parent_device_group(dg) {
                    if descendants.contains(&parent) {
                        descendants.push(dg.clone());
                        grew = true;
                    }
                }
            }
            if !grew {
                break;
            }
        }
        descendants
    }

    /// Contexts from which references to an entity in `context` are legal.
    pub fn reachability_scope(&self, context: &Context) -> Vec<Context> {
        match (self.device_type, context) {
            (DeviceType::Panorama, Context::Shared) => {
                let mut scope = vec![Context::Shared];
                scope.extend(self.device_groups().into_iter().map(Context::DeviceGroup));
                scope
            }
            (DeviceType::Panorama, Context::DeviceGroup(name)) => self
                .descendant_device_groups(name)
                .into_iter()
                .map(Context::DeviceGroup)
                .collect(),
            (DeviceType::Firewall, Context::Shared) => {
                let mut scope = vec![Context::Shared];
                scope.extend(self.vsys_names().into_iter().map(Context::Vsys));
                scope
            }
            _ => vec![context.clone()],
        }
    }

    fn container(&self, kind: ObjectKind, context: &Context) -> Option<&'a XmlNode> {
        let expr = resolver::object_xpath(kind, self.device_type, context, self.version, None).ok()?;
        let xpath = XPath::parse(&expr).ok()?;
        find_paths(self.tree.root(), &xpath)
            .into_iter()
            .next()
            .and_then(|p| self.tree.node(&p))
    }

    fn rules_container(
        &self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
    ) -> Option<&'a XmlNode> {
        let expr =
            resolver::policy_xpath(kind, self.device_type, context, rulebase, self.version, None)
                .ok()?;
        let xpath = XPath::parse(&expr).ok()?;
        find_paths(self.tree.root(), &xpath)
            .into_iter()
            .next()
            .and_then(|p| self.tree.node(&p))
    }

    fn find_object(&self, kind: ObjectKind, name: &str, context: &Context) -> Option<&'a XmlNode> {
        self.container(kind, context)
            .and_then(|c| c.find_entry(name))
    }

    /// Resolve a referenced name to the kind it is actually defined under,
    /// trying `candidates` in order across the contexts visible from
    /// `context` (itself, then shared).
    fn resolve_kind(
        &self,
        name: &str,
        candidates: &[ObjectKind],
        context: &Context,
    ) -> Dependency {
        let mut lookup_contexts = vec![context.clone()];
        if *context != Context::Shared {
            lookup_contexts.push(Context::Shared);
        }
        for kind in candidates {
            for ctx in &lookup_contexts {
                if self.find_object(*kind, name, ctx).is_some() {
                    return Dependency {
                        kind: *kind,
                        name: name.to_string(),
                        resolved: true,
                    };
                }
            }
        }
        Dependency {
            kind: candidates.first().copied().unwrap_or(ObjectKind::Address),
            name: name.to_string(),
            resolved: false,
        }
    }

    /// Entities the given object references, resolved to their actual kinds.
    pub fn depends_on(
        &self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<Vec<Dependency>, EngineError> {
        let node = self
            .find_object(kind, name, context)
            .ok_or_else(|| EngineError::not_found(kind.as_str(), name))?;
        let mut deps = Vec::new();

        // Tag references are dependencies for every kind that carries them.
        for tag in node.member_values("tag") {
            deps.push(self.resolve_kind(&tag, &[ObjectKind::Tag], context));
        }

        match kind {
            ObjectKind::AddressGroup => {
                if let Some(static_elem) = node.get_child("static") {
                    for member in static_elem.children_named("member") {
                        if let Some(member_name) = &member.text {
                            deps.push(self.resolve_kind(
                                member_name,
                                &[ObjectKind::Address, ObjectKind::AddressGroup],
                                context,
                            ));
                        }
                    }
                }
                if let Some(dynamic) = node.get_child("dynamic") {
                    if let Some(filter) = dynamic.child_text("filter") {
                        for tag in dynamic_filter_tags(filter) {
                            deps.push(self.resolve_kind(&tag, &[ObjectKind::Tag], context));
                        }
                    }
                }
            }
            ObjectKind::ServiceGroup => {
                for member_name in node.member_values("members") {
                    deps.push(self.resolve_kind(
                        &member_name,
                        &[ObjectKind::Service, ObjectKind::ServiceGroup],
                        context,
                    ));
                }
            }
            ObjectKind::ApplicationGroup => {
                for member_name in node.member_values("members") {
                    deps.push(self.resolve_kind(
                        &member_name,
                        &[ObjectKind::Application, ObjectKind::ApplicationGroup],
                        context,
                    ));
                }
            }
            ObjectKind::SecurityProfileGroup => {
                for profile_kind in SECURITY_PROFILE_KINDS {
                    let element = profile_kind.profile_element().unwrap_or_default();
                    if let Some(child) = node.get_child(element) {
                        for member in child.children_named("member") {
                            if let Some(profile_name) = &member.text {
                                deps.push(self.resolve_kind(profile_name, &[profile_kind], context));
                            }
                        }
                    }
                }
            }
            ObjectKind::UrlFiltering => {
                // URL filtering profiles reference custom categories in their
                // allow/block/... member lists.
                for list in &node.children {
                    for member in list.children_named("member") {
                        if let Some(member_name) = &member.text {
                            let dep = self.resolve_kind(
                                member_name,
                                &[ObjectKind::CustomUrlCategory],
                                context,
                            );
                            if dep.resolved {
                                deps.push(dep);
                            }
                        }
                    }
                }
            }
            ObjectKind::CustomUrlCategory => {
                // URL List categories may reference external dynamic lists.
                for member_name in node.member_values("list") {
                    let dep =
                        self.resolve_kind(&member_name, &[ObjectKind::ExternalList], context);
                    if dep.resolved {
                        deps.push(dep);
                    }
                }
            }
            _ => {}
        }

        deps.dedup();
        Ok(deps)
    }

    /// Entities a rule references.
    pub fn rule_depends_on(
        &self,
        kind: RuleKind,
        rulebase: Rulebase,
        name: &str,
        context: &Context,
    ) -> Result<Vec<Dependency>, EngineError> {
        let rules = self
            .rules_container(kind, rulebase, context)
            .ok_or_else(|| EngineError::not_found(kind.as_str(), name))?;
        let rule = rules
            .find_entry(name)
            .ok_or_else(|| EngineError::not_found(kind.as_str(), name))?;

        let mut deps = Vec::new();
        for field in ["source", "destination"] {
            for member in rule.member_values(field) {
                if member != "any" {
                    deps.push(self.resolve_kind(
                        &member,
                        &[ObjectKind::Address, ObjectKind::AddressGroup],
                        context,
                    ));
                }
            }
        }
        for member in rule.member_values("service") {
            if member != "any" && member != "application-default" {
                deps.push(self.resolve_kind(
                    &member,
                    &[ObjectKind::Service, ObjectKind::ServiceGroup],
                    context,
                ));
            }
        }
        for member in rule.member_values("application") {
            if member != "any" {
                deps.push(self.resolve_kind(
                    &member,
                    &[ObjectKind::Application, ObjectKind::ApplicationGroup],
                    context,
                ));
            }
        }
        for member in rule.member_values("category") {
            if member != "any" {
                deps.push(self.resolve_kind(&member, &[ObjectKind::CustomUrlCategory], context));
            }
        }
        if let Some(schedule) = rule.child_text("schedule") {
            deps.push(self.resolve_kind(schedule, &[ObjectKind::Schedule], context));
        }
        for tag in rule.member_values("tag") {
            deps.push(self.resolve_kind(&tag, &[ObjectKind::Tag], context));
        }
        if let Some(profile_setting) = rule.get_child("profile-setting") {
            if let Some(group) = profile_setting.get_child("group") {
                for member in group.children_named("member") {
                    if let Some(group_name) = &member.text {
                        deps.push(self.resolve_kind(
                            group_name,
                            &[ObjectKind::SecurityProfileGroup],
                            context,
                        ));
                    }
                }
            }
            if let Some(profiles) = profile_setting.get_child("profiles") {
                for profile_kind in SECURITY_PROFILE_KINDS {
                    let element = profile_kind.profile_element().unwrap_or_default();
                    if let Some(child) = profiles.get_child(element) {
                        for member in child.children_named("member") {
                            if let Some(profile_name) = &member.text {
                                deps.push(self.resolve_kind(profile_name, &[profile_kind], context));
                            }
                        }
                    }
                }
            }
        }

        deps.dedup();
        Ok(deps)
    }

    /// Every reference to the named object from its reachability scope.
    pub fn referenced_by(
        &self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<Vec<Reference>, EngineError> {
        let mut references = Vec::new();
        let scope = self.reachability_scope(context);
        debug!(kind = %kind, name, scope = scope.len(), "scanning reachability scope");

        for ctx in &scope {
            self.scan_object_references(kind, name, ctx, &mut references);
            self.scan_rule_references(kind, name, ctx, &mut references);
        }
        Ok(references)
    }

    /// Whether nothing in the reachability scope references the object.
    pub fn is_unused(
        &self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<bool, EngineError> {
        Ok(self.referenced_by(kind, name, context)?.is_empty())
    }

    fn scan_object_references(
        &self,
        kind: ObjectKind,
        name: &str,
        ctx: &Context,
        out: &mut Vec<Reference>,
    ) {
        // Static group membership.
        let group_kind = match kind {
            ObjectKind::Address | ObjectKind::AddressGroup => Some(ObjectKind::AddressGroup),
            ObjectKind::Service | ObjectKind::ServiceGroup => Some(ObjectKind::ServiceGroup),
            ObjectKind::Application | ObjectKind::ApplicationGroup => {
                Some(ObjectKind::ApplicationGroup)
            }
            _ => None,
        };
        if let Some(group_kind) = group_kind {
            if let Some(container) = self.container(group_kind, ctx) {
                for entry in container.children_named("entry") {
                    let members = if group_kind == ObjectKind::AddressGroup {
                        entry
                            .get_child("static")
                            .map(|s| {
                                s.children_named("member")
                                    .filter_map(|m| m.text.clone())
                                    .collect::<Vec<_>>()
                            })
                            .unwrap_or_default()
                    } else {
                        entry.member_values("members")
                    };
                    if members.iter().any(|m| m == name) {
                        out.push(Reference {
                            holder: ReferenceHolder::Object { kind: group_kind },
                            holder_name: entry.name().unwrap_or("unknown").to_string(),
                            context: ctx.clone(),
                            field: "static member".to_string(),
                        });
                    }
                }
            }
        }

        // Tags show up in object tag lists and dynamic group filters.
        if kind == ObjectKind::Tag {
            for tagged_kind in [
                ObjectKind::Address,
                ObjectKind::AddressGroup,
                ObjectKind::Service,
                ObjectKind::ServiceGroup,
            ] {
                if let Some(container) = self.container(tagged_kind, ctx) {
                    for entry in container.children_named("entry") {
                        if entry.member_values("tag").iter().any(|t| t == name) {
                            out.push(Reference {
                                holder: ReferenceHolder::Object { kind: tagged_kind },
                                holder_name: entry.name().unwrap_or("unknown").to_string(),
                                context: ctx.clone(),
                                field: "tag".to_string(),
                            });
                        }
                    }
                }
            }
            if let Some(container) = self.container(ObjectKind::AddressGroup, ctx) {
                for entry in container.children_named("entry") {
                    let filter_tags = entry
                        .get_child("dynamic")
                        .and_then(|d| d.child_text("filter"))
                        .map(dynamic_filter_tags)
                        .unwrap_or_default();
                    if filter_tags.iter().any(|t| t == name) {
                        out.push(Reference {
                            holder: ReferenceHolder::Object {
                                kind: ObjectKind::AddressGroup,
                            },
                            holder_name: entry.name().unwrap_or("unknown").to_string(),
                            context: ctx.clone(),
                            field: "dynamic filter".to_string(),
                        });
                    }
                }
            }
        }

        // Individual profiles are referenced by profile groups.
        if kind.is_security_profile() {
            if let Some(container) = self.container(ObjectKind::SecurityProfileGroup, ctx) {
                let element = kind.profile_element().unwrap_or_default();
                for entry in container.children_named("entry") {
                    if entry.member_values(element).iter().any(|m| m == name) {
                        out.push(Reference {
                            holder: ReferenceHolder::Object {
                                kind: ObjectKind::SecurityProfileGroup,
                            },
                            holder_name: entry.name().unwrap_or("unknown").to_string(),
                            context: ctx.clone(),
                            field: element.to_string(),
                        });
                    }
                }
            }
        }

        // External lists are referenced by URL List categories.
        if kind == ObjectKind::ExternalList {
            if let Some(container) = self.container(ObjectKind::CustomUrlCategory, ctx) {
                for entry in container.children_named("entry") {
                    if entry.member_values("list").iter().any(|m| m == name) {
                        out.push(Reference {
                            holder: ReferenceHolder::Object {
                                kind: ObjectKind::CustomUrlCategory,
                            },
                            holder_name: entry.name().unwrap_or("unknown").to_string(),
                            context: ctx.clone(),
                            field: "list".to_string(),
                        });
                    }
                }
            }
        }
    }

    fn scan_rule_references(
        &self,
        kind: ObjectKind,
        name: &str,
        ctx: &Context,
        out: &mut Vec<Reference>,
    ) {
        // Fixed predicate sets: which rule fields can hold this kind.
        let member_fields: &[&str] = match kind {
            ObjectKind::Address | ObjectKind::AddressGroup => &["source", "destination"],
            ObjectKind::Service | ObjectKind::ServiceGroup => &["service"],
            ObjectKind::Application | ObjectKind::ApplicationGroup => &["application"],
            ObjectKind::CustomUrlCategory => &["category"],
            ObjectKind::Tag => &["tag"],
            _ => &[],
        };
        let checks_schedule = kind == ObjectKind::Schedule;
        let checks_profile_group = kind == ObjectKind::SecurityProfileGroup;
        let checks_profile = kind.is_security_profile();

        if member_fields.is_empty() && !checks_schedule && !checks_profile_group && !checks_profile
        {
            return;
        }

        for rule_kind in ALL_RULE_KINDS {
            for rulebase in Rulebase::for_device(self.device_type) {
                let Some(rules) = self.rules_container(rule_kind, *rulebase, ctx) else {
                    continue;
                };
                for rule in rules.children_named("entry") {
                    let holder_name = rule.name().unwrap_or("unknown").to_string();
                    for field in member_fields {
                        if rule.member_values(field).iter().any(|m| m == name) {
                            out.push(Reference {
                                holder: ReferenceHolder::Rule {
                                    kind: rule_kind,
                                    rulebase: *rulebase,
                                },
                                holder_name: holder_name.clone(),
                                context: ctx.clone(),
                                field: field.to_string(),
                            });
                        }
                    }
                    if checks_schedule && rule.child_text("schedule") == Some(name) {
                        out.push(Reference {
                            holder: ReferenceHolder::Rule {
                                kind: rule_kind,
                                rulebase: *rulebase,
                            },
                            holder_name: holder_name.clone(),
                            context: ctx.clone(),
                            field: "schedule".to_string(),
                        });
                    }
                    if checks_profile_group || checks_profile {
                        if let Some(profile_setting) = rule.get_child("profile-setting") {
                            if checks_profile_group {
                                let in_group = profile_setting
                                    .get_child("group")
                                    .map(|g| {
                                        g.children_named("member")
                                            .any(|m| m.text.as_deref() == Some(name))
                                    })
                                    .unwrap_or(false);
                                if in_group {
                                    out.push(Reference {
                                        holder: ReferenceHolder::Rule {
                                            kind: rule_kind,
                                            rulebase: *rulebase,
                                        },
                                        holder_name: holder_name.clone(),
                                        context: ctx.clone(),
                                        field: "profile-setting group".to_string(),
                                    });
                                }
                            }
                            if checks_profile {
                                let element = kind.profile_element().unwrap_or_default();
                                let referenced = profile_setting
                                    .get_child("profiles")
                                    .and_then(|p| p.get_child(element))
                                    .map(|c| {
                                        c.children_named("member")
                                            .any(|m| m.text.as_deref() == Some(name))
                                    })
                                    .unwrap_or(false);
                                if referenced {
                                    out.push(Reference {
                                        holder: ReferenceHolder::Rule {
                                            kind: rule_kind,
                                            rulebase: *rulebase,
                                        },
                                        holder_name: holder_name.clone(),
                                        context: ctx.clone(),
                                        field: format!("profile-setting {element}"),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
