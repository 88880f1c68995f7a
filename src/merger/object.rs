//! Object copying between contexts.
//!
//! `copy_object` moves a single object, honoring the conflict strategy and
//! the version adapter, then cascades over the object's references: tags
//! always, kind-specific references when `copy_references` is on. Cascades
//! run depth-first with a `(kind, name)` visited set, so mutually referring
//! groups terminate.
//!
//! Failures of reference copies never roll back the primary copy; they are
//! recorded as warnings in the summary.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::adapter::VersionAdapter;
use crate::conflict::{ConflictResolver, ConflictStrategy};
use crate::criteria::Criteria;
use crate::graph::ReferenceGraph;
use crate::merger::{MergeDomain, MergeSummary};
use crate::model::objects::dynamic_filter_tags;
use crate::resolver;
use crate::types::kind::SECURITY_PROFILE_KINDS;
use crate::types::{Context, DeviceType, EngineError, ObjectKind, PanOsVersion};
use crate::validate;
use crate::xml::{ensure_path, find_first, XPath, XmlNode};

/// Options for a single object copy.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Back-compat alias for the `skip` strategy: when no explicit strategy
    /// is given, `true` means skip existing targets, `false` means
    /// overwrite them.
    pub skip_if_exists: bool,
    /// Copy the object's kind-specific references (group members, profile
    /// references, quoted filter tags, ...).
    pub copy_references: bool,
    /// Run the structural validator on the source before copying.
    pub validate: bool,
    /// Explicit conflict strategy for this call; overrides the engine-wide
    /// default and the `skip_if_exists` alias.
    pub conflict_strategy: Option<ConflictStrategy>,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            skip_if_exists: true,
            copy_references: true,
            validate: false,
            conflict_strategy: None,
        }
    }
}

/// Options for dependency-mode copies.
#[derive(Debug, Clone, Default)]
pub struct DependencyOptions {
    /// Per-copy options.
    pub copy: CopyOptions,
    /// Also copy entities that reference the requested one.
    pub include_referenced_by: bool,
    /// Include policy holders among the reverse references. The merger
    /// records them in [`ObjectMerger::pending_policies`]; rule copying
    /// itself belongs to the policy merger.
    pub include_policies: bool,
}

/// A rule that references a copied object, left for the policy merger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPolicy {
    /// Rule kind label.
    pub kind: crate::types::RuleKind,
    /// Rulebase side.
    pub rulebase: crate::types::Rulebase,
    /// Rule name.
    pub name: String,
    /// Context the rule lives in.
    pub context: Context,
}

/// Copies objects (and their references) between contexts.
pub struct ObjectMerger {
    source_device: DeviceType,
    target_device: DeviceType,
    source_version: PanOsVersion,
    target_version: PanOsVersion,
    conflict: ConflictResolver,
    summary: MergeSummary,
    pending_policies: Vec<PendingPolicy>,
}

impl ObjectMerger {
    /// Create a merger for the given device/version pair.
    pub fn new(
        source_device: DeviceType,
        source_version: PanOsVersion,
        target_device: DeviceType,
        target_version: PanOsVersion,
    ) -> Self {
        Self {
            source_device,
            target_device,
            source_version,
            target_version,
            conflict: ConflictResolver::default(),
            summary: MergeSummary::default(),
            pending_policies: Vec::new(),
        }
    }

    /// Use a specific conflict resolver (default strategy, rename suffix).
    pub fn with_conflict_resolver(mut self, conflict: ConflictResolver) -> Self {
        self.conflict = conflict;
        self
    }

    /// The merge accounting so far.
    pub fn summary(&self) -> &MergeSummary {
        &self.summary
    }

    /// Consume the merger, returning the summary.
    pub fn into_summary(self) -> MergeSummary {
        self.summary
    }

    /// Rules referencing copied objects, recorded when
    /// [`DependencyOptions::include_policies`] is set.
    pub fn pending_policies(&self) -> &[PendingPolicy] {
        &self.pending_policies
    }

    /// Copy one object from a source context to a target context.
    ///
    /// Returns `true` when the primary copy was installed. All outcomes are
    /// recorded in the summary.
    pub fn copy_object(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
    ) -> bool {
        let mut processed = HashSet::new();
        self.copy_object_inner(
            domain,
            kind,
            name,
            source_context,
            target_context,
            options,
            &mut processed,
            false,
        )
    }

    /// Copy a set of named objects. Returns the number copied.
    pub fn copy_objects(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        names: &[String],
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
    ) -> usize {
        let mut copied = 0;
        for name in names {
            if self.copy_object(domain, kind, name, source_context, target_context, options) {
                copied += 1;
            }
        }
        copied
    }

    /// Copy every object of the given kinds present in the source context,
    /// optionally filtered by criteria. Returns the number copied.
    pub fn merge_all_objects(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kinds: &[ObjectKind],
        source_context: &Context,
        target_context: &Context,
        criteria: Option<&Criteria>,
        options: &CopyOptions,
    ) -> usize {
        let mut copied = 0;
        for &kind in kinds {
            let names = match self.source_entry_names(domain, kind, source_context, criteria) {
                Ok(names) => names,
                Err(e) => {
                    self.summary.record_error(kind.as_str(), "*", &e);
                    continue;
                }
            };
            info!(kind = %kind, count = names.len(), "merging all objects of kind");
            copied += self.copy_objects(
                domain,
                kind,
                &names,
                source_context,
                target_context,
                options,
            );
        }
        copied
    }

    /// Copy an object after its transitive dependencies, depth-first.
    ///
    /// Dependencies are copied with references off (the dependency walk
    /// already covers them). With `include_referenced_by`, object holders
    /// that point at the entity are copied too, and rule holders are
    /// recorded as pending policies when `include_policies` is set.
    pub fn copy_object_with_dependencies(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        options: &DependencyOptions,
    ) -> bool {
        // Collect the dependency closure, post-order.
        let mut ordered: Vec<(ObjectKind, String)> = Vec::new();
        let mut visited: HashSet<(ObjectKind, String)> = HashSet::new();
        self.collect_dependencies(
            domain,
            kind,
            name,
            source_context,
            &mut visited,
            &mut ordered,
        );

        let dep_options = CopyOptions {
            copy_references: false,
            ..options.copy.clone()
        };
        let mut processed = HashSet::new();
        for (dep_kind, dep_name) in &ordered {
            if *dep_kind == kind && dep_name == name {
                continue;
            }
            // A dependency may live in shared while the object lives in a
            // device group; copy it from wherever it actually resolves.
            let dep_context = self
                .resolve_source_kind(domain, &[*dep_kind], dep_name, source_context)
                .map(|(_, ctx)| ctx)
                .unwrap_or_else(|| source_context.clone());
            self.copy_object_inner(
                domain,
                *dep_kind,
                dep_name,
                &dep_context,
                target_context,
                &dep_options,
                &mut processed,
                true,
            );
        }

        let copied = self.copy_object_inner(
            domain,
            kind,
            name,
            source_context,
            target_context,
            &dep_options,
            &mut processed,
            false,
        );

        if copied && options.include_referenced_by {
            self.copy_reverse_references(
                domain,
                kind,
                name,
                source_context,
                target_context,
                options,
                &mut processed,
            );
        }
        copied
    }

    fn collect_dependencies(
        &mut self,
        domain: &MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        visited: &mut HashSet<(ObjectKind, String)>,
        ordered: &mut Vec<(ObjectKind, String)>,
    ) {
        if !visited.insert((kind, name.to_string())) {
            return;
        }
        let graph = ReferenceGraph::new(domain.source(), self.source_device, self.source_version);
        let deps = match graph.depends_on(kind, name, source_context) {
            Ok(deps) => deps,
            Err(e) => {
                debug!(kind = %kind, name, error = %e, "dependency walk stopped");
                return;
            }
        };
        for dep in deps {
            if dep.resolved {
                self.collect_dependencies(
                    domain,
                    dep.kind,
                    &dep.name,
                    source_context,
                    visited,
                    ordered,
                );
            }
        }
        ordered.push((kind, name.to_string()));
    }

    fn copy_reverse_references(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        options: &DependencyOptions,
        processed: &mut HashSet<(ObjectKind, String)>,
    ) {
        let holders = {
            let graph =
                ReferenceGraph::new(domain.source(), self.source_device, self.source_version);
            match graph.referenced_by(kind, name, source_context) {
                Ok(refs) => refs,
                Err(e) => {
                    self.summary
                        .warnings
                        .push(format!("reverse reference scan failed for '{name}': {e}"));
                    return;
                }
            }
        };

        for holder in holders {
            match holder.holder {
                crate::graph::ReferenceHolder::Object { kind: holder_kind } => {
                    self.copy_object_inner(
                        domain,
                        holder_kind,
                        &holder.holder_name,
                        &holder.context,
                        target_context,
                        &options.copy,
                        processed,
                        true,
                    );
                }
                crate::graph::ReferenceHolder::Rule { kind, rulebase } => {
                    if options.include_policies {
                        self.pending_policies.push(PendingPolicy {
                            kind,
                            rulebase,
                            name: holder.holder_name,
                            context: holder.context,
                        });
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_object_inner(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
        processed: &mut HashSet<(ObjectKind, String)>,
        as_reference: bool,
    ) -> bool {
        if name.is_empty() {
            self.summary
                .record_skipped(kind.as_str(), name, "invalid object name");
            return false;
        }
        if !processed.insert((kind, name.to_string())) {
            // Already handled within this operation; cascades revisit pairs.
            return true;
        }
        if let Err(e) = source_context.validate_for(self.source_device) {
            self.summary.record_error(kind.as_str(), name, &e);
            return false;
        }
        if let Err(e) = target_context.validate_for(self.target_device) {
            self.summary.record_error(kind.as_str(), name, &e);
            return false;
        }

        debug!(
            kind = %kind,
            name,
            from = %source_context,
            to = %target_context,
            "copying object"
        );

        // Locate the source object.
        let source_elem = match self.find_source_entry(domain, kind, name, source_context) {
            Ok(Some(elem)) => elem,
            Ok(None) => {
                self.summary
                    .record_skipped(kind.as_str(), name, "not found in source");
                return false;
            }
            Err(e) => {
                self.summary.record_error(kind.as_str(), name, &e);
                return false;
            }
        };

        if options.validate {
            let (ok, errors) = validate::validate_object(&source_elem, kind);
            if !ok {
                self.summary.record_skipped(
                    kind.as_str(),
                    name,
                    format!("validation failed: {}", errors.join("; ")),
                );
                return false;
            }
        }

        // Conflict handling against an existing target.
        let mut install_elem = source_elem.clone();
        match self.find_target_entry(domain, kind, name, target_context) {
            Ok(Some(existing)) => {
                let strategy = options.conflict_strategy.unwrap_or({
                    if options.skip_if_exists {
                        ConflictStrategy::Skip
                    } else {
                        ConflictStrategy::Overwrite
                    }
                });
                let resolution = self.conflict.resolve(
                    &source_elem,
                    &existing,
                    Some(kind),
                    name,
                    Some(strategy),
                );
                if !resolution.proceed {
                    self.summary
                        .record_skipped(kind.as_str(), name, resolution.message);
                    return false;
                }
                if let Some(replacement) = resolution.replacement {
                    install_elem = replacement;
                }
                // Detach the existing entry unless the replacement arrives
                // under a different name (rename).
                if install_elem.name() == Some(name) {
                    if let Err(e) = self.detach_target_entry(domain, kind, name, target_context) {
                        self.summary.record_error(kind.as_str(), name, &e);
                        return false;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.summary.record_error(kind.as_str(), name, &e);
                return false;
            }
        }

        // Cross-version adaptation.
        match VersionAdapter::new(self.source_version, self.target_version)
            .adapt_object(&mut install_elem, kind)
        {
            Ok(notes) => self.summary.warnings.extend(
                notes
                    .into_iter()
                    .map(|n| format!("{kind} '{name}': {n}")),
            ),
            Err(e) => {
                self.summary.record_error(kind.as_str(), name, &e);
                return false;
            }
        }

        // Install, synthesizing the container chain when absent.
        let installed_name = install_elem.name().unwrap_or(name).to_string();
        if let Err(e) = self.install(domain, kind, target_context, install_elem) {
            self.summary.record_error(kind.as_str(), name, &e);
            return false;
        }
        if as_reference {
            self.summary.record_reference(kind.as_str(), &installed_name);
        } else {
            self.summary.record_merged(kind.as_str(), &installed_name);
        }
        info!(kind = %kind, name = %installed_name, to = %target_context, "object copied");

        // Tag cascade runs regardless of copy_references; tags referenced by
        // the object must resolve in the target (references off to avoid
        // divergence).
        self.cascade_tags(
            domain,
            &source_elem,
            source_context,
            target_context,
            options,
            processed,
        );

        if options.copy_references {
            self.cascade_references(
                domain,
                kind,
                &source_elem,
                source_context,
                target_context,
                options,
                processed,
            );
        }
        true
    }

    // ── resolution helpers ──────────────────────────────────────────────

    fn entry_xpath(
        &self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
        device: DeviceType,
        version: PanOsVersion,
    ) -> Result<XPath, EngineError> {
        let expr = resolver::object_xpath(kind, device, context, version, Some(name))?;
        XPath::parse(&expr)
    }

    fn find_source_entry(
        &self,
        domain: &MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<Option<XmlNode>, EngineError> {
        let xpath = self.entry_xpath(kind, name, context, self.source_device, self.source_version)?;
        Ok(find_first(domain.source().root(), &xpath)
            .and_then(|p| domain.source().node(&p))
            .cloned())
    }

    fn find_target_entry(
        &self,
        domain: &MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<Option<XmlNode>, EngineError> {
        let xpath = self.entry_xpath(kind, name, context, self.target_device, self.target_version)?;
        Ok(find_first(domain.target().root(), &xpath)
            .and_then(|p| domain.target().node(&p))
            .cloned())
    }

    fn detach_target_entry(
        &self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<(), EngineError> {
        let container_expr = resolver::object_xpath(
            kind,
            self.target_device,
            context,
            self.target_version,
            None,
        )?;
        let xpath = XPath::parse(&container_expr)?;
        let target = domain.target_mut();
        let Some(path) = find_first(target.root(), &xpath) else {
            return Err(EngineError::Internal(format!(
                "container for existing {kind} '{name}' vanished"
            )));
        };
        let container = target
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("container path did not resolve".to_string()))?;
        container.remove_entry(name).ok_or_else(|| {
            EngineError::Internal(format!("existing {kind} '{name}' vanished during detach"))
        })?;
        Ok(())
    }

    fn install(
        &self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        context: &Context,
        elem: XmlNode,
    ) -> Result<(), EngineError> {
        let container_expr = resolver::object_xpath(
            kind,
            self.target_device,
            context,
            self.target_version,
            None,
        )?;
        let xpath = XPath::parse(&container_expr)?;
        let target = domain.target_mut();
        let path = ensure_path(target.root_mut(), &xpath)?;
        let container = target
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("created container did not resolve".to_string()))?;
        container.children.push(elem);
        Ok(())
    }

    fn source_entry_names(
        &self,
        domain: &MergeDomain<'_>,
        kind: ObjectKind,
        context: &Context,
        criteria: Option<&Criteria>,
    ) -> Result<Vec<String>, EngineError> {
        let expr =
            resolver::object_xpath(kind, self.source_device, context, self.source_version, None)?;
        let xpath = XPath::parse(&expr)?;
        let Some(path) = find_first(domain.source().root(), &xpath) else {
            return Ok(Vec::new());
        };
        let Some(container) = domain.source().node(&path) else {
            return Ok(Vec::new());
        };
        Ok(container
            .children_named("entry")
            .filter(|e| criteria.map(|c| c.matches(e)).unwrap_or(true))
            .filter_map(|e| e.name().map(str::to_string))
            .collect())
    }

    /// The kind a referenced name actually resolves to in the source, tried
    /// in candidate order against the source context, then shared.
    fn resolve_source_kind(
        &self,
        domain: &MergeDomain<'_>,
        candidates: &[ObjectKind],
        name: &str,
        context: &Context,
    ) -> Option<(ObjectKind, Context)> {
        let mut contexts = vec![context.clone()];
        if *context != Context::Shared {
            contexts.push(Context::Shared);
        }
        for &kind in candidates {
            for ctx in &contexts {
                if let Ok(Some(_)) = self.find_source_entry(domain, kind, name, ctx) {
                    return Some((kind, ctx.clone()));
                }
            }
        }
        None
    }

    // ── cascades ────────────────────────────────────────────────────────

    fn cascade_tags(
        &mut self,
        domain: &mut MergeDomain<'_>,
        source_elem: &XmlNode,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
        processed: &mut HashSet<(ObjectKind, String)>,
    ) {
        let tag_options = CopyOptions {
            copy_references: false,
            ..options.clone()
        };
        for tag in source_elem.member_values("tag") {
            if let Some((_, found_ctx)) =
                self.resolve_source_kind(domain, &[ObjectKind::Tag], &tag, source_context)
            {
                self.copy_object_inner(
                    domain,
                    ObjectKind::Tag,
                    &tag,
                    &found_ctx,
                    target_context,
                    &tag_options,
                    processed,
                    true,
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn cascade_references(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        source_elem: &XmlNode,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
        processed: &mut HashSet<(ObjectKind, String)>,
    ) {
        match kind {
            ObjectKind::AddressGroup => {
                // Static members are addresses or nested groups.
                if let Some(static_elem) = source_elem.get_child("static") {
                    let members: Vec<String> = static_elem
                        .children_named("member")
                        .filter_map(|m| m.text.clone())
                        .collect();
                    self.copy_members_as(
                        domain,
                        &[ObjectKind::Address, ObjectKind::AddressGroup],
                        &members,
                        source_context,
                        target_context,
                        options,
                        processed,
                    );
                }
                // Dynamic filters reference tags by quoted name.
                if let Some(filter) = source_elem
                    .get_child("dynamic")
                    .and_then(|d| d.child_text("filter"))
                {
                    let tags = dynamic_filter_tags(filter);
                    self.copy_members_as(
                        domain,
                        &[ObjectKind::Tag],
                        &tags,
                        source_context,
                        target_context,
                        options,
                        processed,
                    );
                }
            }
            ObjectKind::ServiceGroup => {
                let members = source_elem.member_values("members");
                self.copy_members_as(
                    domain,
                    &[ObjectKind::Service, ObjectKind::ServiceGroup],
                    &members,
                    source_context,
                    target_context,
                    options,
                    processed,
                );
            }
            ObjectKind::ApplicationGroup => {
                let members = source_elem.member_values("members");
                self.copy_members_as(
                    domain,
                    &[ObjectKind::Application, ObjectKind::ApplicationGroup],
                    &members,
                    source_context,
                    target_context,
                    options,
                    processed,
                );
            }
            ObjectKind::SecurityProfileGroup => {
                for profile_kind in SECURITY_PROFILE_KINDS {
                    let element = profile_kind.profile_element().unwrap_or_default();
                    let members = source_elem.member_values(element);
                    self.copy_members_as(
                        domain,
                        &[profile_kind],
                        &members,
                        source_context,
                        target_context,
                        options,
                        processed,
                    );
                }
            }
            kind if kind.is_security_profile() => {
                self.cascade_profile_references(
                    domain,
                    kind,
                    source_elem,
                    source_context,
                    target_context,
                    options,
                    processed,
                );
            }
            ObjectKind::CustomUrlCategory => {
                // URL List categories can point at external dynamic lists.
                let members = source_elem.member_values("list");
                self.copy_members_as(
                    domain,
                    &[ObjectKind::ExternalList],
                    &members,
                    source_context,
                    target_context,
                    options,
                    processed,
                );
            }
            _ => {}
        }
    }

    /// Cascade for the eight individual security profiles: referenced custom
    /// applications (application exceptions) and, for URL filtering,
    /// referenced custom URL categories.
    #[allow(clippy::too_many_arguments)]
    fn cascade_profile_references(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: ObjectKind,
        source_elem: &XmlNode,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
        processed: &mut HashSet<(ObjectKind, String)>,
    ) {
        let mut applications: Vec<String> = Vec::new();
        collect_application_entries(source_elem, &mut applications);
        self.copy_members_as(
            domain,
            &[ObjectKind::Application],
            &applications,
            source_context,
            target_context,
            options,
            processed,
        );

        if kind == ObjectKind::UrlFiltering {
            let mut categories: Vec<String> = Vec::new();
            for list in &source_elem.children {
                for member in list.children_named("member") {
                    if let Some(name) = &member.text {
                        if !categories.contains(name) {
                            categories.push(name.clone());
                        }
                    }
                }
            }
            self.copy_members_as(
                domain,
                &[ObjectKind::CustomUrlCategory],
                &categories,
                source_context,
                target_context,
                options,
                processed,
            );
        }
    }

    /// Copy each named member under the first candidate kind it resolves to
    /// in the source. Unresolvable members are quietly skipped; they may be
    /// predefined vendor entities.
    #[allow(clippy::too_many_arguments)]
    fn copy_members_as(
        &mut self,
        domain: &mut MergeDomain<'_>,
        candidates: &[ObjectKind],
        names: &[String],
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
        processed: &mut HashSet<(ObjectKind, String)>,
    ) {
        for name in names {
            let Some((member_kind, found_ctx)) =
                self.resolve_source_kind(domain, candidates, name, source_context)
            else {
                debug!(name = %name, "reference does not resolve to a source object; skipping");
                continue;
            };
            let copied = self.copy_object_inner(
                domain,
                member_kind,
                name,
                &found_ctx,
                target_context,
                options,
                processed,
                true,
            );
            if !copied {
                warn!(kind = %member_kind, name = %name, "reference copy failed");
                self.summary
                    .warnings
                    .push(format!("reference {member_kind} '{name}' was not copied"));
            }
        }
    }
}

/// Collect `application/entry/@name` values anywhere below the element.
fn collect_application_entries(node: &XmlNode, out: &mut Vec<String>) {
    for child in &node.children {
        if child.tag == "application" {
            for entry in child.children_named("entry") {
                if let Some(name) = entry.name() {
                    if !out.iter().any(|n| n == name) {
                        out.push(name.to_string());
                    }
                }
            }
        }
        collect_application_entries(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::version::V11_0;
    use crate::xml::ConfigTree;

    fn panorama_tree() -> ConfigTree {
        ConfigTree::parse(
            r#"<config>
                 <shared>
                   <tag><entry name="prod"><color>color2</color></entry></tag>
                   <address>
                     <entry name="web">
                       <ip-netmask>10.0.0.1/32</ip-netmask>
                       <tag><member>prod</member></tag>
                     </entry>
                     <entry name="db"><ip-netmask>10.0.0.2/32</ip-netmask></entry>
                   </address>
                   <address-group>
                     <entry name="servers"><static><member>web</member><member>db</member></static></entry>
                     <entry name="outer"><static><member>servers</member></static></entry>
                   </address-group>
                 </shared>
                 <devices>
                   <entry name="localhost.localdomain">
                     <device-group>
                       <entry name="DG1"/>
                     </device-group>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap()
    }

    fn merger() -> ObjectMerger {
        ObjectMerger::new(
            DeviceType::Panorama,
            V11_0,
            DeviceType::Panorama,
            V11_0,
        )
    }

    fn dg1_address<'t>(tree: &'t ConfigTree, name: &str) -> Option<&'t XmlNode> {
        let xpath = XPath::parse(&format!(
            "{}/device-group/entry[@name='DG1']/address/entry[@name='{name}']",
            resolver::LOCALHOST
        ))
        .unwrap();
        find_first(tree.root(), &xpath).and_then(|p| tree.node(&p))
    }

    #[test]
    fn test_copy_address_creates_container() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_object(
            &mut domain,
            ObjectKind::Address,
            "web",
            &Context::Shared,
            &Context::device_group("DG1"),
            &CopyOptions::default(),
        );
        assert!(copied);

        let entry = dg1_address(&tree, "web").expect("address installed in DG1");
        assert_eq!(entry.child_text("ip-netmask"), Some("10.0.0.1/32"));
        assert!(merger
            .summary()
            .merged
            .iter()
            .any(|m| m.kind == "address" && m.name == "web"));
        // The referenced tag cascaded along.
        assert!(merger
            .summary()
            .copied_references
            .iter()
            .any(|m| m.kind == "tag" && m.name == "prod"));
    }

    #[test]
    fn test_skip_if_exists_is_idempotent() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let options = CopyOptions::default();
        assert!(merger.copy_object(
            &mut domain,
            ObjectKind::Address,
            "web",
            &Context::Shared,
            &Context::device_group("DG1"),
            &options,
        ));
        let serialized = tree.root().to_xml();

        let mut merger2 = self::merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger2.copy_object(
            &mut domain,
            ObjectKind::Address,
            "web",
            &Context::Shared,
            &Context::device_group("DG1"),
            &options,
        );
        assert!(!copied);
        assert!(merger2
            .summary()
            .skipped
            .iter()
            .any(|s| s.name == "web" && s.reason.contains("already exists")));
        // No tree change on the second run.
        assert_eq!(tree.root().to_xml(), serialized);
    }

    #[test]
    fn test_missing_source_recorded() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_object(
            &mut domain,
            ObjectKind::Address,
            "ghost",
            &Context::Shared,
            &Context::device_group("DG1"),
            &CopyOptions::default(),
        );
        assert!(!copied);
        assert!(merger
            .summary()
            .skipped
            .iter()
            .any(|s| s.reason == "not found in source"));
    }

    #[test]
    fn test_group_copy_cascades_members() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_object(
            &mut domain,
            ObjectKind::AddressGroup,
            "servers",
            &Context::Shared,
            &Context::device_group("DG1"),
            &CopyOptions::default(),
        );
        assert!(copied);
        assert!(dg1_address(&tree, "web").is_some());
        assert!(dg1_address(&tree, "db").is_some());
    }

    #[test]
    fn test_nested_group_cascade_terminates() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_object(
            &mut domain,
            ObjectKind::AddressGroup,
            "outer",
            &Context::Shared,
            &Context::device_group("DG1"),
            &CopyOptions::default(),
        );
        assert!(copied);
        // The nested group and its members all arrived.
        let xpath = XPath::parse(&format!(
            "{}/device-group/entry[@name='DG1']/address-group/entry[@name='servers']",
            resolver::LOCALHOST
        ))
        .unwrap();
        assert!(find_first(tree.root(), &xpath).is_some());
        assert!(dg1_address(&tree, "web").is_some());
    }

    #[test]
    fn test_dependencies_mode_copies_closure() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_object_with_dependencies(
            &mut domain,
            ObjectKind::AddressGroup,
            "outer",
            &Context::Shared,
            &Context::device_group("DG1"),
            &DependencyOptions::default(),
        );
        assert!(copied);
        assert!(dg1_address(&tree, "web").is_some());
        assert!(dg1_address(&tree, "db").is_some());
    }

    #[test]
    fn test_invalid_context_combination() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_object(
            &mut domain,
            ObjectKind::Address,
            "web",
            &Context::vsys("vsys1"),
            &Context::device_group("DG1"),
            &CopyOptions::default(),
        );
        assert!(!copied);
        assert!(merger
            .summary()
            .skipped
            .iter()
            .any(|s| s.reason.contains("not valid")));
    }

    #[test]
    fn test_overwrite_replaces_target() {
        let mut tree = ConfigTree::parse(
            r#"<config>
                 <shared>
                   <address><entry name="web"><ip-netmask>10.0.0.1/32</ip-netmask></entry></address>
                 </shared>
                 <devices>
                   <entry name="localhost.localdomain">
                     <device-group>
                       <entry name="DG1">
                         <address><entry name="web"><ip-netmask>99.0.0.1/32</ip-netmask></entry></address>
                       </entry>
                     </device-group>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_object(
            &mut domain,
            ObjectKind::Address,
            "web",
            &Context::Shared,
            &Context::device_group("DG1"),
            &CopyOptions {
                conflict_strategy: Some(ConflictStrategy::Overwrite),
                ..CopyOptions::default()
            },
        );
        assert!(copied);
        let entry = dg1_address(&tree, "web").unwrap();
        assert_eq!(entry.child_text("ip-netmask"), Some("10.0.0.1/32"));
        // Exactly one entry remains.
        let xpath = XPath::parse(&format!(
            "{}/device-group/entry[@name='DG1']/address",
            resolver::LOCALHOST
        ))
        .unwrap();
        let container_path = find_first(tree.root(), &xpath).unwrap();
        assert_eq!(tree.node(&container_path).unwrap().entry_names(), vec!["web"]);
    }
}
