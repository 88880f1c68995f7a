//! Public engine façade.
//!
//! An [`Engine`] owns one configuration tree plus the inferred (or
//! supplied) device type and version, and exposes the object/policy CRUD,
//! merge, dedup, NAT-split, and report surface. The engine is
//! single-threaded per tree; run engines on independent trees for
//! parallelism.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::conflict::{ConflictResolver, ConflictStrategy};
use crate::criteria::Criteria;
use crate::dedupe::{DedupeReport, Deduplicator, PrimaryStrategy};
use crate::detect;
use crate::merger::policy::insert_into_container;
use crate::merger::{
    CopyOptions, DependencyOptions, MergeDomain, MergeSummary, ObjectMerger, PolicyMerger,
    PolicyPosition,
};
use crate::nat_split::{BatchSplitSummary, NatSplitOptions, NatSplitter, SplitOutcome};
use crate::reports;
use crate::resolver;
use crate::types::{
    Context, DeviceType, EngineError, ObjectKind, PanOsVersion, RuleKind, Rulebase,
};
use crate::xml::{ensure_path, CacheStats, ConfigTree, LookupCache, NodePath, XPath, XmlNode};

/// A named object with its dictionary form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Entry name.
    pub name: String,
    /// Dictionary form of the entry (see the dict conventions).
    pub data: Value,
}

/// The configuration transformation engine.
pub struct Engine {
    tree: ConfigTree,
    device_type: DeviceType,
    version: PanOsVersion,
    cache: LookupCache,
    conflict: ConflictResolver,
}

impl Engine {
    /// Build an engine over a parsed tree. Device type and version are
    /// inferred when omitted (version falls back to the newest known).
    pub fn new(
        tree: ConfigTree,
        device_type: Option<DeviceType>,
        version: Option<PanOsVersion>,
    ) -> Self {
        let device_type = device_type.unwrap_or_else(|| detect::detect_device_type(&tree));
        let version = version
            .or_else(|| detect::detect_version(&tree))
            .unwrap_or_else(PanOsVersion::newest_known);
        info!(device_type = %device_type, version = %version, "engine ready");
        Self {
            tree,
            device_type,
            version,
            cache: LookupCache::default(),
            conflict: ConflictResolver::default(),
        }
    }

    /// Parse a configuration string and build an engine over it.
    pub fn from_xml(
        xml: &str,
        device_type: Option<DeviceType>,
        version: Option<PanOsVersion>,
    ) -> Result<Self, EngineError> {
        Ok(Self::new(ConfigTree::parse(xml)?, device_type, version))
    }

    /// Set the engine-wide default conflict strategy.
    pub fn with_default_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict = ConflictResolver::new(strategy);
        self
    }

    /// The inferred or supplied device type.
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// The inferred or supplied version.
    pub fn version(&self) -> PanOsVersion {
        self.version
    }

    /// Borrow the tree.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Take the tree back out of the engine.
    pub fn into_tree(self) -> ConfigTree {
        self.tree
    }

    /// Serialize the tree as pretty-printed UTF-8 XML with declaration.
    pub fn to_xml_string(&self) -> String {
        self.tree.to_xml_string()
    }

    /// Lookup cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ── lookup plumbing ─────────────────────────────────────────────────

    fn find_cached(&self, expr: &str) -> Result<Vec<NodePath>, EngineError> {
        if let Some(paths) = self
            .cache
            .get(expr, self.tree.id(), self.tree.revision())
        {
            return Ok(paths);
        }
        let xpath = XPath::parse(expr)?;
        let paths = crate::xml::find_paths(self.tree.root(), &xpath);
        self.cache
            .put(expr, self.tree.id(), self.tree.revision(), paths.clone());
        Ok(paths)
    }

    fn object_container_path(
        &self,
        kind: ObjectKind,
        context: &Context,
    ) -> Result<Option<NodePath>, EngineError> {
        let expr = resolver::object_xpath(kind, self.device_type, context, self.version, None)?;
        Ok(self.find_cached(&expr)?.into_iter().next())
    }

    fn policy_container_path(
        &self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
    ) -> Result<Option<NodePath>, EngineError> {
        let expr =
            resolver::policy_xpath(kind, self.device_type, context, rulebase, self.version, None)?;
        Ok(self.find_cached(&expr)?.into_iter().next())
    }

    // ── objects ─────────────────────────────────────────────────────────

    /// All objects of a kind in a context.
    pub fn get_objects(
        &self,
        kind: ObjectKind,
        context: &Context,
    ) -> Result<Vec<ObjectSummary>, EngineError> {
        context.validate_for(self.device_type)?;
        let Some(path) = self.object_container_path(kind, context)? else {
            return Ok(Vec::new());
        };
        let container = self
            .tree
            .node(&path)
            .ok_or_else(|| EngineError::Internal("container path did not resolve".to_string()))?;
        Ok(container
            .children_named("entry")
            .filter_map(|e| {
                e.name().map(|name| ObjectSummary {
                    name: name.to_string(),
                    data: e.to_dict(),
                })
            })
            .collect())
    }

    /// One object's dictionary form.
    pub fn get_object(
        &self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<Value, EngineError> {
        self.get_object_node(kind, name, context).map(XmlNode::to_dict)
    }

    /// One object's entry element.
    pub fn get_object_node(
        &self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<&XmlNode, EngineError> {
        context.validate_for(self.device_type)?;
        let expr =
            resolver::object_xpath(kind, self.device_type, context, self.version, Some(name))?;
        let path = self
            .find_cached(&expr)?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::not_found(kind.as_str(), name))?;
        self.tree
            .node(&path)
            .ok_or_else(|| EngineError::Internal("entry path did not resolve".to_string()))
    }

    /// Add a new object entry. Fails with [`EngineError::Conflict`] when an
    /// object of that name already exists.
    pub fn add_object(
        &mut self,
        kind: ObjectKind,
        context: &Context,
        entry: XmlNode,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        let name = entry
            .name()
            .ok_or_else(|| EngineError::invalid_argument("entry element has no name attribute"))?
            .to_string();
        if self.get_object_node(kind, &name, context).is_ok() {
            return Err(EngineError::Conflict {
                kind: kind.as_str().to_string(),
                name,
                message: "object already exists".to_string(),
            });
        }
        let expr = resolver::object_xpath(kind, self.device_type, context, self.version, None)?;
        let xpath = XPath::parse(&expr)?;
        let path = ensure_path(self.tree.root_mut(), &xpath)?;
        let container = self
            .tree
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("created container did not resolve".to_string()))?;
        container.children.push(entry);
        Ok(())
    }

    /// Replace an existing object entry, keeping its position.
    pub fn update_object(
        &mut self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
        mut entry: XmlNode,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        entry.set_attr("name", name);
        let Some(container_path) = self.object_container_path(kind, context)? else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        let container = self
            .tree
            .node_mut(&container_path)
            .ok_or_else(|| EngineError::Internal("container path did not resolve".to_string()))?;
        let Some(position) = container.entry_position(name) else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        container.children[position] = entry;
        Ok(())
    }

    /// Delete an object entry.
    pub fn delete_object(
        &mut self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        let Some(container_path) = self.object_container_path(kind, context)? else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        let container = self
            .tree
            .node_mut(&container_path)
            .ok_or_else(|| EngineError::Internal("container path did not resolve".to_string()))?;
        container
            .remove_entry(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(kind.as_str(), name))
    }

    /// Names of the objects matching the criteria.
    pub fn filter_objects(
        &self,
        kind: ObjectKind,
        context: &Context,
        criteria: &Criteria,
    ) -> Result<Vec<String>, EngineError> {
        context.validate_for(self.device_type)?;
        let Some(path) = self.object_container_path(kind, context)? else {
            return Ok(Vec::new());
        };
        let container = self
            .tree
            .node(&path)
            .ok_or_else(|| EngineError::Internal("container path did not resolve".to_string()))?;
        Ok(container
            .children_named("entry")
            .filter(|e| criteria.matches(e))
            .filter_map(|e| e.name().map(str::to_string))
            .collect())
    }

    // ── policies ────────────────────────────────────────────────────────

    /// All rules of a kind in a rulebase, as dictionaries.
    pub fn get_policies(
        &self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
    ) -> Result<Vec<ObjectSummary>, EngineError> {
        context.validate_for(self.device_type)?;
        let Some(path) = self.policy_container_path(kind, rulebase, context)? else {
            return Ok(Vec::new());
        };
        let container = self
            .tree
            .node(&path)
            .ok_or_else(|| EngineError::Internal("rules path did not resolve".to_string()))?;
        Ok(container
            .children_named("entry")
            .filter_map(|e| {
                e.name().map(|name| ObjectSummary {
                    name: name.to_string(),
                    data: e.to_dict(),
                })
            })
            .collect())
    }

    /// Add a rule at the requested position.
    pub fn add_policy(
        &mut self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        entry: XmlNode,
        position: PolicyPosition,
        ref_policy_name: Option<&str>,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        let name = entry
            .name()
            .ok_or_else(|| EngineError::invalid_argument("rule entry has no name attribute"))?
            .to_string();
        let expr =
            resolver::policy_xpath(kind, self.device_type, context, rulebase, self.version, None)?;
        let xpath = XPath::parse(&expr)?;
        let path = ensure_path(self.tree.root_mut(), &xpath)?;
        let container = self
            .tree
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("created rules container did not resolve".to_string()))?;
        if container.find_entry(&name).is_some() {
            return Err(EngineError::Conflict {
                kind: kind.as_str().to_string(),
                name,
                message: "rule already exists".to_string(),
            });
        }
        let mut warnings = Vec::new();
        insert_into_container(container, entry, position, ref_policy_name, &mut warnings);
        Ok(())
    }

    /// Replace an existing rule in place.
    pub fn update_policy(
        &mut self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        name: &str,
        mut entry: XmlNode,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        entry.set_attr("name", name);
        let Some(path) = self.policy_container_path(kind, rulebase, context)? else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        let container = self
            .tree
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("rules path did not resolve".to_string()))?;
        let Some(position) = container.entry_position(name) else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        container.children[position] = entry;
        Ok(())
    }

    /// Delete a rule.
    pub fn delete_policy(
        &mut self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        name: &str,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        let Some(path) = self.policy_container_path(kind, rulebase, context)? else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        let container = self
            .tree
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("rules path did not resolve".to_string()))?;
        container
            .remove_entry(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(kind.as_str(), name))
    }

    /// Move a rule to a new position among its siblings.
    pub fn move_policy(
        &mut self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        name: &str,
        position: PolicyPosition,
        ref_policy_name: Option<&str>,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        let Some(path) = self.policy_container_path(kind, rulebase, context)? else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        let container = self
            .tree
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("rules path did not resolve".to_string()))?;
        let entry = container
            .remove_entry(name)
            .ok_or_else(|| EngineError::not_found(kind.as_str(), name))?;
        let mut warnings = Vec::new();
        insert_into_container(container, entry, position, ref_policy_name, &mut warnings);
        Ok(())
    }

    /// Clone a rule under a new name, placed immediately after the
    /// original.
    pub fn clone_policy(
        &mut self,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        name: &str,
        new_name: &str,
    ) -> Result<(), EngineError> {
        context.validate_for(self.device_type)?;
        let Some(path) = self.policy_container_path(kind, rulebase, context)? else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        let container = self
            .tree
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("rules path did not resolve".to_string()))?;
        if container.find_entry(new_name).is_some() {
            return Err(EngineError::Conflict {
                kind: kind.as_str().to_string(),
                name: new_name.to_string(),
                message: "rule already exists".to_string(),
            });
        }
        let Some(position) = container.entry_position(name) else {
            return Err(EngineError::not_found(kind.as_str(), name));
        };
        let mut clone = container.children[position].clone();
        clone.set_attr("name", new_name);
        container.insert_child(position + 1, clone);
        Ok(())
    }

    // ── merges ──────────────────────────────────────────────────────────

    /// Copy one object between contexts of this tree.
    pub fn merge_object(
        &mut self,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
    ) -> (bool, MergeSummary) {
        let mut merger = ObjectMerger::new(
            self.device_type,
            self.version,
            self.device_type,
            self.version,
        )
        .with_conflict_resolver(self.conflict.clone());
        let mut domain = MergeDomain::single(&mut self.tree);
        let copied = merger.copy_object(
            &mut domain,
            kind,
            name,
            source_context,
            target_context,
            options,
        );
        (copied, merger.into_summary())
    }

    /// Copy one object plus its transitive dependencies.
    pub fn merge_object_with_dependencies(
        &mut self,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        options: &DependencyOptions,
    ) -> (bool, MergeSummary) {
        let mut merger = ObjectMerger::new(
            self.device_type,
            self.version,
            self.device_type,
            self.version,
        )
        .with_conflict_resolver(self.conflict.clone());
        let mut domain = MergeDomain::single(&mut self.tree);
        let copied = merger.copy_object_with_dependencies(
            &mut domain,
            kind,
            name,
            source_context,
            target_context,
            options,
        );

        // Rule holders recorded during the reverse pass are copied here,
        // where the policy merger is in scope.
        let pending: Vec<_> = merger.pending_policies().to_vec();
        let mut summary = merger.into_summary();
        if options.include_policies && !pending.is_empty() {
            let mut policies = PolicyMerger::new(
                self.device_type,
                self.version,
                self.device_type,
                self.version,
            )
            .with_conflict_resolver(self.conflict.clone());
            let mut domain = MergeDomain::single(&mut self.tree);
            for holder in pending {
                policies.copy_policy(
                    &mut domain,
                    holder.kind,
                    holder.rulebase,
                    &holder.name,
                    &holder.context,
                    target_context,
                    PolicyPosition::Bottom,
                    None,
                    &options.copy,
                );
            }
            let policy_summary = policies.into_summary();
            summary.merged.extend(policy_summary.merged);
            summary
                .copied_references
                .extend(policy_summary.copied_references);
            summary.skipped.extend(policy_summary.skipped);
            summary.warnings.extend(policy_summary.warnings);
        }
        (copied, summary)
    }

    /// Copy every object of the given kinds between contexts of this tree.
    pub fn merge_all_objects(
        &mut self,
        kinds: &[ObjectKind],
        source_context: &Context,
        target_context: &Context,
        criteria: Option<&Criteria>,
        options: &CopyOptions,
    ) -> (usize, MergeSummary) {
        let mut merger = ObjectMerger::new(
            self.device_type,
            self.version,
            self.device_type,
            self.version,
        )
        .with_conflict_resolver(self.conflict.clone());
        let mut domain = MergeDomain::single(&mut self.tree);
        let copied = merger.merge_all_objects(
            &mut domain,
            kinds,
            source_context,
            target_context,
            criteria,
            options,
        );
        (copied, merger.into_summary())
    }

    /// Copy one rule between contexts of this tree.
    #[allow(clippy::too_many_arguments)]
    pub fn merge_policy(
        &mut self,
        kind: RuleKind,
        rulebase: Rulebase,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        position: PolicyPosition,
        ref_policy_name: Option<&str>,
        options: &CopyOptions,
    ) -> (bool, MergeSummary) {
        let mut merger = PolicyMerger::new(
            self.device_type,
            self.version,
            self.device_type,
            self.version,
        )
        .with_conflict_resolver(self.conflict.clone());
        let mut domain = MergeDomain::single(&mut self.tree);
        let copied = merger.copy_policy(
            &mut domain,
            kind,
            rulebase,
            name,
            source_context,
            target_context,
            position,
            ref_policy_name,
            options,
        );
        (copied, merger.into_summary())
    }

    /// Copy all rules of the given kinds between contexts of this tree.
    pub fn merge_all_policies(
        &mut self,
        kinds: &[RuleKind],
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
    ) -> (usize, MergeSummary) {
        let mut merger = PolicyMerger::new(
            self.device_type,
            self.version,
            self.device_type,
            self.version,
        )
        .with_conflict_resolver(self.conflict.clone());
        let mut domain = MergeDomain::single(&mut self.tree);
        let copied = merger.merge_all_policies(
            &mut domain,
            kinds,
            source_context,
            target_context,
            options,
        );
        (copied, merger.into_summary())
    }

    /// Copy one object from another tree into this one, adapting versions.
    #[allow(clippy::too_many_arguments)]
    pub fn merge_object_from(
        &mut self,
        source: &ConfigTree,
        source_device: DeviceType,
        source_version: PanOsVersion,
        kind: ObjectKind,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
    ) -> (bool, MergeSummary) {
        let mut merger = ObjectMerger::new(
            source_device,
            source_version,
            self.device_type,
            self.version,
        )
        .with_conflict_resolver(self.conflict.clone());
        let mut domain = MergeDomain::cross(source, &mut self.tree);
        let copied = merger.copy_object(
            &mut domain,
            kind,
            name,
            source_context,
            target_context,
            options,
        );
        (copied, merger.into_summary())
    }

    // ── dedup / NAT / reports ───────────────────────────────────────────

    /// Collapse value-equivalent objects of a kind within a context.
    pub fn deduplicate(
        &mut self,
        kind: ObjectKind,
        context: &Context,
        strategy: PrimaryStrategy,
        dry_run: bool,
        validate: bool,
    ) -> Result<DedupeReport, EngineError> {
        Deduplicator::new(self.device_type, self.version, strategy).deduplicate(
            &mut self.tree,
            kind,
            context,
            dry_run,
            validate,
        )
    }

    /// Split one bidirectional NAT rule.
    pub fn split_bidirectional_nat(
        &mut self,
        rulebase: Rulebase,
        context: &Context,
        rule_name: &str,
        options: &NatSplitOptions,
    ) -> Result<SplitOutcome, EngineError> {
        NatSplitter::new(self.device_type, self.version).split_rule(
            &mut self.tree,
            rulebase,
            context,
            rule_name,
            options,
        )
    }

    /// Split every bidirectional NAT rule, optionally filtered by name
    /// substring.
    pub fn split_all_bidirectional_nat(
        &mut self,
        rulebase: Rulebase,
        context: &Context,
        name_filter: Option<&str>,
        options: &NatSplitOptions,
    ) -> Result<BatchSplitSummary, EngineError> {
        NatSplitter::new(self.device_type, self.version).split_all(
            &mut self.tree,
            rulebase,
            context,
            name_filter,
            options,
        )
    }

    /// Objects of a kind with no incoming references.
    pub fn unused_objects(
        &self,
        kind: ObjectKind,
        context: &Context,
    ) -> Result<reports::UnusedObjectsReport, EngineError> {
        reports::unused_objects(&self.tree, self.device_type, self.version, kind, context)
    }

    /// Value-equivalent objects of a kind, grouped.
    pub fn duplicate_objects(
        &self,
        kind: ObjectKind,
        context: &Context,
    ) -> Result<reports::DuplicateObjectsReport, EngineError> {
        reports::duplicate_objects(&self.tree, self.device_type, self.version, kind, context)
    }

    /// Rule statistics across the whole tree.
    pub fn rule_coverage(&self) -> Result<reports::RuleCoverageReport, EngineError> {
        reports::rule_coverage(&self.tree, self.device_type, self.version)
    }

    /// Forward and reverse references of one entity.
    pub fn reference_check(
        &self,
        kind: ObjectKind,
        name: &str,
        context: &Context,
    ) -> Result<reports::ReferenceCheckReport, EngineError> {
        reports::reference_check(&self.tree, self.device_type, self.version, kind, name, context)
    }

    /// Bucket a rulebase's rules by caller-supplied hit counts.
    pub fn hit_count_analysis(
        &self,
        rule_kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        hits: &BTreeMap<String, u64>,
    ) -> Result<reports::HitCountReport, EngineError> {
        reports::hit_count_analysis(
            &self.tree,
            self.device_type,
            self.version,
            rule_kind,
            rulebase,
            context,
            hits,
        )
    }
}
