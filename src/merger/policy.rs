//! Policy copying between contexts.
//!
//! Rules are copied in two phases: the rule entry itself (conflict-checked,
//! version-adapted, positioned among its siblings), then the objects it
//! references, collected into typed buckets from a fixed projection list
//! and copied through the object merger — whose cascades extend group
//! references to a fixed point.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::adapter::VersionAdapter;
use crate::conflict::{ConflictResolver, ConflictStrategy};
use crate::criteria::Criteria;
use crate::merger::object::{CopyOptions, ObjectMerger};
use crate::merger::{MergeDomain, MergeSummary};
use crate::resolver;
use crate::types::kind::SECURITY_PROFILE_KINDS;
use crate::types::{
    Context, DeviceType, EngineError, ObjectKind, PanOsVersion, RuleKind, Rulebase,
};
use crate::validate;
use crate::xml::{ensure_path, find_first, XPath, XmlNode};

/// Where to insert a copied rule relative to its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPosition {
    /// First in the rulebase.
    Top,
    /// Last in the rulebase (the default).
    Bottom,
    /// Immediately before a named reference rule.
    Before,
    /// Immediately after a named reference rule.
    After,
}

impl PolicyPosition {
    /// Parse an API label.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "top" => Some(Self::Top),
            "bottom" => Some(Self::Bottom),
            "before" => Some(Self::Before),
            "after" => Some(Self::After),
            _ => None,
        }
    }
}

/// One typed reference bucket entry: candidate kinds plus the name.
type CollectedRef = (&'static [ObjectKind], String);

/// Copies rules (and the objects they reference) between contexts.
pub struct PolicyMerger {
    source_device: DeviceType,
    target_device: DeviceType,
    source_version: PanOsVersion,
    target_version: PanOsVersion,
    conflict: ConflictResolver,
    summary: MergeSummary,
}

impl PolicyMerger {
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
        }
    }

    /// Use a specific conflict resolver.
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

    /// The rulebase side a source rule lands in on the target device.
    ///
    /// Cross-device copies map pre/post rules onto a firewall's single
    /// rulebase and direct rules onto Panorama pre-rules.
    pub fn target_rulebase(&self, rulebase: Rulebase, target_context: &Context) -> Rulebase {
        if resolver::valid_rulebase(self.target_device, target_context, rulebase) {
            return rulebase;
        }
        match self.target_device {
            DeviceType::Firewall => Rulebase::Direct,
            DeviceType::Panorama => Rulebase::Pre,
        }
    }

    /// Copy one rule. Returns `true` when the rule was installed.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_policy(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: RuleKind,
        rulebase: Rulebase,
        name: &str,
        source_context: &Context,
        target_context: &Context,
        position: PolicyPosition,
        ref_policy_name: Option<&str>,
        options: &CopyOptions,
    ) -> bool {
        let label = kind.as_str();
        if name.is_empty() {
            self.summary.record_skipped(label, name, "invalid rule name");
            return false;
        }
        if let Err(e) = source_context.validate_for(self.source_device) {
            self.summary.record_error(label, name, &e);
            return false;
        }
        if let Err(e) = target_context.validate_for(self.target_device) {
            self.summary.record_error(label, name, &e);
            return false;
        }

        debug!(kind = label, name, from = %source_context, to = %target_context, "copying policy");

        // Locate the source rule.
        let source_rule = match self.find_rule(
            domain.source(),
            kind,
            rulebase,
            name,
            source_context,
            self.source_device,
            self.source_version,
        ) {
            Ok(Some(rule)) => rule,
            Ok(None) => {
                self.summary.record_skipped(label, name, "not found in source");
                return false;
            }
            Err(e) => {
                self.summary.record_error(label, name, &e);
                return false;
            }
        };

        if options.validate {
            let (ok, errors) = validate::validate_rule(&source_rule, kind);
            if !ok {
                self.summary.record_skipped(
                    label,
                    name,
                    format!("validation failed: {}", errors.join("; ")),
                );
                return false;
            }
        }

        let target_rulebase = self.target_rulebase(rulebase, target_context);

        // Conflict handling against an existing target rule.
        let mut install_rule = source_rule.clone();
        match self.find_rule(
            domain.target(),
            kind,
            target_rulebase,
            name,
            target_context,
            self.target_device,
            self.target_version,
        ) {
            Ok(Some(existing)) => {
                let strategy = options.conflict_strategy.unwrap_or({
                    if options.skip_if_exists {
                        ConflictStrategy::Skip
                    } else {
                        ConflictStrategy::Overwrite
                    }
                });
                let resolution =
                    self.conflict
                        .resolve(&source_rule, &existing, None, name, Some(strategy));
                if !resolution.proceed {
                    self.summary.record_skipped(label, name, resolution.message);
                    return false;
                }
                if let Some(replacement) = resolution.replacement {
                    install_rule = replacement;
                }
                if install_rule.name() == Some(name) {
                    if let Err(e) = self.detach_rule(
                        domain,
                        kind,
                        target_rulebase,
                        name,
                        target_context,
                    ) {
                        self.summary.record_error(label, name, &e);
                        return false;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                self.summary.record_error(label, name, &e);
                return false;
            }
        }

        // Cross-version adaptation, rule-kind specific.
        match VersionAdapter::new(self.source_version, self.target_version)
            .adapt_rule(&mut install_rule, kind)
        {
            Ok(notes) => self
                .summary
                .warnings
                .extend(notes.into_iter().map(|n| format!("{label} '{name}': {n}"))),
            Err(e) => {
                self.summary.record_error(label, name, &e);
                return false;
            }
        }

        // Install at the requested position.
        let installed_name = install_rule.name().unwrap_or(name).to_string();
        if let Err(e) = self.insert_rule(
            domain,
            kind,
            target_rulebase,
            target_context,
            install_rule,
            position,
            ref_policy_name,
        ) {
            self.summary.record_error(label, name, &e);
            return false;
        }
        self.summary.record_merged(label, &installed_name);
        info!(kind = label, name = %installed_name, to = %target_context, "policy copied");

        // Phase 2: copy the objects the rule references.
        if options.copy_references {
            let refs = collect_rule_references(&source_rule);
            self.copy_collected_references(domain, refs, source_context, target_context);
        }
        true
    }

    /// Copy the named rules (or all rules matching the criteria when
    /// `names` is `None`). Returns the number copied.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_policies(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: RuleKind,
        rulebase: Rulebase,
        names: Option<&[String]>,
        criteria: Option<&Criteria>,
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
    ) -> usize {
        let names: Vec<String> = match names {
            Some(names) => names.to_vec(),
            None => match self.rule_names(domain, kind, rulebase, source_context, criteria) {
                Ok(names) => names,
                Err(e) => {
                    self.summary.record_error(kind.as_str(), "*", &e);
                    return 0;
                }
            },
        };

        let mut copied = 0;
        for name in &names {
            if self.copy_policy(
                domain,
                kind,
                rulebase,
                name,
                source_context,
                target_context,
                PolicyPosition::Bottom,
                None,
                options,
            ) {
                copied += 1;
            }
        }
        copied
    }

    /// Copy every rule of the given kinds across every rulebase side the
    /// source device has. Returns the number copied.
    pub fn merge_all_policies(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kinds: &[RuleKind],
        source_context: &Context,
        target_context: &Context,
        options: &CopyOptions,
    ) -> usize {
        let mut copied = 0;
        for &kind in kinds {
            for rulebase in Rulebase::for_device(self.source_device) {
                copied += self.copy_policies(
                    domain,
                    kind,
                    *rulebase,
                    None,
                    None,
                    source_context,
                    target_context,
                    options,
                );
            }
        }
        copied
    }

    // ── helpers ─────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn find_rule(
        &self,
        tree: &crate::xml::ConfigTree,
        kind: RuleKind,
        rulebase: Rulebase,
        name: &str,
        context: &Context,
        device: DeviceType,
        version: PanOsVersion,
    ) -> Result<Option<XmlNode>, EngineError> {
        let expr = resolver::policy_xpath(kind, device, context, rulebase, version, Some(name))?;
        let xpath = XPath::parse(&expr)?;
        Ok(find_first(tree.root(), &xpath)
            .and_then(|p| tree.node(&p))
            .cloned())
    }

    fn rule_names(
        &self,
        domain: &MergeDomain<'_>,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        criteria: Option<&Criteria>,
    ) -> Result<Vec<String>, EngineError> {
        let expr = resolver::policy_xpath(
            kind,
            self.source_device,
            context,
            rulebase,
            self.source_version,
            None,
        )?;
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

    fn detach_rule(
        &self,
        domain: &mut MergeDomain<'_>,
        kind: RuleKind,
        rulebase: Rulebase,
        name: &str,
        context: &Context,
    ) -> Result<(), EngineError> {
        let expr = resolver::policy_xpath(
            kind,
            self.target_device,
            context,
            rulebase,
            self.target_version,
            None,
        )?;
        let xpath = XPath::parse(&expr)?;
        let target = domain.target_mut();
        let Some(path) = find_first(target.root(), &xpath) else {
            return Err(EngineError::Internal(format!(
                "rules container for existing {kind} '{name}' vanished"
            )));
        };
        let container = target
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("rules container path did not resolve".to_string()))?;
        container.remove_entry(name).ok_or_else(|| {
            EngineError::Internal(format!("existing {kind} rule '{name}' vanished during detach"))
        })?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn insert_rule(
        &mut self,
        domain: &mut MergeDomain<'_>,
        kind: RuleKind,
        rulebase: Rulebase,
        context: &Context,
        rule: XmlNode,
        position: PolicyPosition,
        ref_policy_name: Option<&str>,
    ) -> Result<(), EngineError> {
        let expr = resolver::policy_xpath(
            kind,
            self.target_device,
            context,
            rulebase,
            self.target_version,
            None,
        )?;
        let xpath = XPath::parse(&expr)?;
        let target = domain.target_mut();
        let path = ensure_path(target.root_mut(), &xpath)?;
        let container = target
            .node_mut(&path)
            .ok_or_else(|| EngineError::Internal("created rules container did not resolve".to_string()))?;

        let mut warnings = Vec::new();
        insert_into_container(container, rule, position, ref_policy_name, &mut warnings);
        self.summary.warnings.extend(warnings);
        Ok(())
    }

    fn copy_collected_references(
        &mut self,
        domain: &mut MergeDomain<'_>,
        refs: Vec<CollectedRef>,
        source_context: &Context,
        target_context: &Context,
    ) {
        if refs.is_empty() {
            return;
        }
        debug!(count = refs.len(), "copying policy references");

        // The object merger's cascades extend group membership to a fixed
        // point; conflict handling stays on skip so existing target objects
        // are left alone.
        let mut objects = ObjectMerger::new(
            self.source_device,
            self.source_version,
            self.target_device,
            self.target_version,
        )
        .with_conflict_resolver(self.conflict.clone());
        let ref_options = CopyOptions {
            skip_if_exists: true,
            copy_references: true,
            validate: false,
            conflict_strategy: Some(ConflictStrategy::Skip),
        };

        for (candidates, name) in refs {
            let Some((kind, found_ctx)) =
                self.lookup_source_kind(domain, candidates, &name, source_context)
            else {
                debug!(name = %name, "rule reference does not resolve to a source object");
                continue;
            };
            objects.copy_object(domain, kind, &name, &found_ctx, target_context, &ref_options);
        }

        let reference_summary = objects.into_summary();
        self.summary.copied_references.extend(reference_summary.merged);
        self.summary
            .copied_references
            .extend(reference_summary.copied_references);
        self.summary.warnings.extend(
            reference_summary
                .skipped
                .into_iter()
                .filter(|s| !s.reason.contains("already exists"))
                .map(|s| format!("reference {} '{}': {}", s.kind, s.name, s.reason)),
        );
        self.summary.warnings.extend(reference_summary.warnings);
    }

    fn lookup_source_kind(
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
                let Ok(expr) = resolver::object_xpath(
                    kind,
                    self.source_device,
                    ctx,
                    self.source_version,
                    Some(name),
                ) else {
                    continue;
                };
                let Ok(xpath) = XPath::parse(&expr) else {
                    continue;
                };
                if find_first(domain.source().root(), &xpath).is_some() {
                    return Some((kind, ctx.clone()));
                }
            }
        }
        None
    }
}

/// Insert a rule into a rules container at the requested position.
///
/// `before`/`after` need a reference rule; a missing name or a reference
/// rule that is not present degrades to bottom with a warning.
pub(crate) fn insert_into_container(
    container: &mut XmlNode,
    rule: XmlNode,
    position: PolicyPosition,
    ref_policy_name: Option<&str>,
    warnings: &mut Vec<String>,
) {
    let index = match position {
        PolicyPosition::Top => 0,
        PolicyPosition::Bottom => container.children.len(),
        PolicyPosition::Before | PolicyPosition::After => {
            let Some(ref_name) = ref_policy_name else {
                warn!("reference rule name required for before/after; adding at bottom");
                warnings.push(
                    "position before/after without a reference rule; added at bottom".to_string(),
                );
                container.children.push(rule);
                return;
            };
            match container.entry_position(ref_name) {
                Some(ref_index) if position == PolicyPosition::Before => ref_index,
                Some(ref_index) => ref_index + 1,
                None => {
                    warn!(ref_name, "reference rule not found; adding at bottom");
                    warnings.push(format!(
                        "reference rule '{ref_name}' not found; added at bottom"
                    ));
                    container.children.push(rule);
                    return;
                }
            }
        }
    };
    container.insert_child(index, rule);
}

const ADDRESS_CANDIDATES: &[ObjectKind] = &[ObjectKind::Address, ObjectKind::AddressGroup];
const SERVICE_CANDIDATES: &[ObjectKind] = &[ObjectKind::Service, ObjectKind::ServiceGroup];
const APPLICATION_CANDIDATES: &[ObjectKind] =
    &[ObjectKind::Application, ObjectKind::ApplicationGroup];
const PROFILE_GROUP_CANDIDATES: &[ObjectKind] = &[ObjectKind::SecurityProfileGroup];
const SCHEDULE_CANDIDATES: &[ObjectKind] = &[ObjectKind::Schedule];
const CATEGORY_CANDIDATES: &[ObjectKind] = &[ObjectKind::CustomUrlCategory];
const TAG_CANDIDATES: &[ObjectKind] = &[ObjectKind::Tag];

/// Collect object references out of a rule, using the fixed projection list
/// (`source/member`, `destination/member`, `service/member`,
/// `application/member`, `profile-setting/group/member`,
/// `profile-setting/profiles/*`, `schedule`, `category/member`,
/// `tag/member`).
fn collect_rule_references(rule: &XmlNode) -> Vec<CollectedRef> {
    let mut seen: BTreeSet<(ObjectKind, String)> = BTreeSet::new();
    let mut refs: Vec<CollectedRef> = Vec::new();
    let mut push = |candidates: &'static [ObjectKind], name: String| {
        let key = (candidates[0], name.clone());
        if seen.insert(key) {
            refs.push((candidates, name));
        }
    };

    for member in rule.member_values("source") {
        if member != "any" {
            push(ADDRESS_CANDIDATES, member);
        }
    }
    for member in rule.member_values("destination") {
        if member != "any" {
            push(ADDRESS_CANDIDATES, member);
        }
    }
    for member in rule.member_values("service") {
        if member != "any" && member != "application-default" {
            push(SERVICE_CANDIDATES, member);
        }
    }
    for member in rule.member_values("application") {
        if member != "any" {
            push(APPLICATION_CANDIDATES, member);
        }
    }
    for member in rule.member_values("category") {
        if member != "any" {
            push(CATEGORY_CANDIDATES, member);
        }
    }
    for member in rule.member_values("tag") {
        push(TAG_CANDIDATES, member);
    }
    if let Some(schedule) = rule.child_text("schedule") {
        push(SCHEDULE_CANDIDATES, schedule.to_string());
    }
    if let Some(profile_setting) = rule.get_child("profile-setting") {
        if let Some(group) = profile_setting.get_child("group") {
            for member in group.children_named("member") {
                if let Some(name) = &member.text {
                    push(PROFILE_GROUP_CANDIDATES, name.clone());
                }
            }
        }
        if let Some(profiles) = profile_setting.get_child("profiles") {
            for kind in SECURITY_PROFILE_KINDS {
                let element = kind.profile_element().unwrap_or_default();
                if let Some(child) = profiles.get_child(element) {
                    for member in child.children_named("member") {
                        if let Some(name) = &member.text {
                            push(profile_candidates(kind), name.clone());
                        }
                    }
                }
            }
        }
    }
    refs
}

fn profile_candidates(kind: ObjectKind) -> &'static [ObjectKind] {
    match kind {
        ObjectKind::Virus => &[ObjectKind::Virus],
        ObjectKind::Spyware => &[ObjectKind::Spyware],
        ObjectKind::Vulnerability => &[ObjectKind::Vulnerability],
        ObjectKind::UrlFiltering => &[ObjectKind::UrlFiltering],
        ObjectKind::FileBlocking => &[ObjectKind::FileBlocking],
        ObjectKind::WildfireAnalysis => &[ObjectKind::WildfireAnalysis],
        ObjectKind::DnsSecurity => &[ObjectKind::DnsSecurity],
        _ => &[ObjectKind::DataFiltering],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::version::{V10_1, V11_0, V11_2};
    use crate::xml::ConfigTree;

    fn panorama_tree() -> ConfigTree {
        ConfigTree::parse(
            r#"<config>
                 <shared>
                   <address>
                     <entry name="web"><ip-netmask>10.0.0.1/32</ip-netmask></entry>
                   </address>
                   <schedule><entry name="work-hours"/></schedule>
                 </shared>
                 <devices>
                   <entry name="localhost.localdomain">
                     <device-group>
                       <entry name="SRC">
                         <pre-rulebase>
                           <security>
                             <rules>
                               <entry name="r1">
                                 <action>allow</action>
                                 <source><member>web</member></source>
                                 <destination><member>any</member></destination>
                                 <schedule>work-hours</schedule>
                               </entry>
                               <entry name="r2"><action>deny</action></entry>
                             </rules>
                           </security>
                         </pre-rulebase>
                       </entry>
                       <entry name="DG1"/>
                     </device-group>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap()
    }

    fn dg1_rules<'t>(tree: &'t ConfigTree) -> Option<&'t XmlNode> {
        let xpath = XPath::parse(&format!(
            "{}/device-group/entry[@name='DG1']/pre-rulebase/security/rules",
            resolver::LOCALHOST
        ))
        .unwrap();
        find_first(tree.root(), &xpath).and_then(|p| tree.node(&p))
    }

    fn merger() -> PolicyMerger {
        PolicyMerger::new(
            DeviceType::Panorama,
            V11_0,
            DeviceType::Panorama,
            V11_0,
        )
    }

    #[test]
    fn test_copy_policy_with_references() {
        let mut tree = panorama_tree();
        let mut merger = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_policy(
            &mut domain,
            RuleKind::Security,
            Rulebase::Pre,
            "r1",
            &Context::device_group("SRC"),
            &Context::device_group("DG1"),
            PolicyPosition::Bottom,
            None,
            &CopyOptions::default(),
        );
        assert!(copied);

        let rules = dg1_rules(&tree).unwrap();
        assert_eq!(rules.entry_names(), vec!["r1"]);
        // The referenced address and schedule came along from shared.
        assert!(merger
            .summary()
            .copied_references
            .iter()
            .any(|r| r.kind == "address" && r.name == "web"));
        assert!(merger
            .summary()
            .copied_references
            .iter()
            .any(|r| r.kind == "schedule" && r.name == "work-hours"));
    }

    #[test]
    fn test_position_before_and_degradation() {
        let mut tree = panorama_tree();
        let mut merger = merger();

        let mut domain = MergeDomain::single(&mut tree);
        merger.copy_policy(
            &mut domain,
            RuleKind::Security,
            Rulebase::Pre,
            "r2",
            &Context::device_group("SRC"),
            &Context::device_group("DG1"),
            PolicyPosition::Bottom,
            None,
            &CopyOptions::default(),
        );
        merger.copy_policy(
            &mut domain,
            RuleKind::Security,
            Rulebase::Pre,
            "r1",
            &Context::device_group("SRC"),
            &Context::device_group("DG1"),
            PolicyPosition::Before,
            Some("r2"),
            &CopyOptions::default(),
        );
        assert_eq!(dg1_rules(&tree).unwrap().entry_names(), vec!["r1", "r2"]);

        // Missing reference rule degrades to bottom with a warning.
        let mut tree = panorama_tree();
        let mut merger = self::merger();
        let mut domain = MergeDomain::single(&mut tree);
        merger.copy_policy(
            &mut domain,
            RuleKind::Security,
            Rulebase::Pre,
            "r1",
            &Context::device_group("SRC"),
            &Context::device_group("DG1"),
            PolicyPosition::After,
            Some("ghost"),
            &CopyOptions::default(),
        );
        assert_eq!(dg1_rules(&tree).unwrap().entry_names(), vec!["r1"]);
        assert!(merger
            .summary()
            .warnings
            .iter()
            .any(|w| w.contains("ghost")));
    }

    #[test]
    fn test_merge_all_policies_idempotent_under_skip() {
        let mut tree = panorama_tree();

        let mut first = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = first.merge_all_policies(
            &mut domain,
            &[RuleKind::Security],
            &Context::device_group("SRC"),
            &Context::device_group("DG1"),
            &CopyOptions::default(),
        );
        assert_eq!(copied, 2);
        let serialized = tree.root().to_xml();

        let mut second = merger();
        let mut domain = MergeDomain::single(&mut tree);
        let copied = second.merge_all_policies(
            &mut domain,
            &[RuleKind::Security],
            &Context::device_group("SRC"),
            &Context::device_group("DG1"),
            &CopyOptions::default(),
        );
        assert_eq!(copied, 0);
        assert_eq!(second.summary().skipped_count(), 2);
        assert_eq!(tree.root().to_xml(), serialized);
    }

    #[test]
    fn test_version_transition_applied() {
        let mut tree = ConfigTree::parse(
            r#"<config>
                 <devices>
                   <entry name="localhost.localdomain">
                     <device-group>
                       <entry name="SRC">
                         <pre-rulebase>
                           <security>
                             <rules>
                               <entry name="r1">
                                 <action>allow</action>
                                 <rule-type>universal</rule-type>
                                 <disable-server-response-inspection>yes</disable-server-response-inspection>
                               </entry>
                             </rules>
                           </security>
                         </pre-rulebase>
                       </entry>
                       <entry name="DG1"/>
                     </device-group>
                   </entry>
                 </devices>
               </config>"#,
        )
        .unwrap();
        let mut merger = PolicyMerger::new(
            DeviceType::Panorama,
            V11_2,
            DeviceType::Panorama,
            V10_1,
        );
        let mut domain = MergeDomain::single(&mut tree);
        let copied = merger.copy_policy(
            &mut domain,
            RuleKind::Security,
            Rulebase::Pre,
            "r1",
            &Context::device_group("SRC"),
            &Context::device_group("DG1"),
            PolicyPosition::Bottom,
            None,
            &CopyOptions::default(),
        );
        assert!(copied);
        let rule = dg1_rules(&tree).unwrap().find_entry("r1").unwrap();
        assert!(rule.get_child("rule-type").is_none());
        assert!(rule.get_child("disable-server-response-inspection").is_none());
        assert_eq!(rule.child_text("action"), Some("allow"));
        // The source rule is untouched.
        let src = XPath::parse(&format!(
            "{}/device-group/entry[@name='SRC']/pre-rulebase/security/rules/entry[@name='r1']",
            resolver::LOCALHOST
        ))
        .unwrap();
        let src_rule = find_first(tree.root(), &src).and_then(|p| tree.node(&p)).unwrap();
        assert!(src_rule.get_child("rule-type").is_some());
    }

    #[test]
    fn test_collect_rule_references_projections() {
        let rule = XmlNode::parse_str(
            r#"<entry name="r">
                 <source><member>a1</member><member>any</member></source>
                 <destination><member>d1</member></destination>
                 <service><member>svc</member><member>application-default</member></service>
                 <application><member>app1</member></application>
                 <category><member>cat1</member></category>
                 <tag><member>t1</member></tag>
                 <schedule>sched1</schedule>
                 <profile-setting>
                   <group><member>pg1</member></group>
                   <profiles><virus><member>av1</member></virus></profiles>
                 </profile-setting>
               </entry>"#,
        )
        .unwrap();
        let refs = collect_rule_references(&rule);
        let names: Vec<&str> = refs.iter().map(|(_, n)| n.as_str()).collect();
        for expected in ["a1", "d1", "svc", "app1", "cat1", "t1", "sched1", "pg1", "av1"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        assert!(!names.contains(&"any"));
        assert!(!names.contains(&"application-default"));
    }

    #[test]
    fn test_cross_device_rulebase_mapping() {
        let merger = PolicyMerger::new(
            DeviceType::Panorama,
            V11_0,
            DeviceType::Firewall,
            V11_0,
        );
        assert_eq!(
            merger.target_rulebase(Rulebase::Pre, &Context::vsys("vsys1")),
            Rulebase::Direct
        );
        let merger = self::merger();
        assert_eq!(
            merger.target_rulebase(Rulebase::Post, &Context::device_group("DG1")),
            Rulebase::Post
        );
    }
}
