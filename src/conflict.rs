//! Conflict resolution strategies.
//!
//! Every write that could overwrite an existing entity goes through the
//! resolver. A strategy decides whether the copy proceeds and with what
//! element; `skip` is the engine-wide default.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::objects::GroupMembership;
use crate::model::AddressGroup;
use crate::types::ObjectKind;
use crate::xml::{merge_element, XmlNode};

/// Default suffix for the `rename` strategy.
pub const DEFAULT_RENAME_SUFFIX: &str = "_imported";

/// What to do when the target already holds an entity of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Do not copy; keep the target (the default).
    Skip,
    /// Replace the target with the source.
    Overwrite,
    /// Alias of `overwrite`.
    KeepSource,
    /// Reject the copy; the target wins.
    KeepTarget,
    /// Type-specific union of source and target.
    Merge,
    /// Copy the source under a suffixed name alongside the target.
    Rename,
    /// Keep whichever side has the newer `last-modified`; fall back to
    /// overwrite when the timestamps are unusable.
    KeepNewer,
    /// Delegates to the engine-wide default; the core has no UI seam.
    Interactive,
}

impl ConflictStrategy {
    /// Parse an API label.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "overwrite" => Some(Self::Overwrite),
            "keep_source" => Some(Self::KeepSource),
            "keep_target" => Some(Self::KeepTarget),
            "merge" => Some(Self::Merge),
            "rename" => Some(Self::Rename),
            "keep_newer" => Some(Self::KeepNewer),
            "interactive" => Some(Self::Interactive),
            _ => None,
        }
    }

    /// API label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::KeepSource => "keep_source",
            Self::KeepTarget => "keep_target",
            Self::Merge => "merge",
            Self::Rename => "rename",
            Self::KeepNewer => "keep_newer",
            Self::Interactive => "interactive",
        }
    }
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a conflict resolution.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Whether the copy goes ahead.
    pub proceed: bool,
    /// Replacement element to install instead of the raw source clone. When
    /// the replacement carries a different name (rename), the existing
    /// target stays in place.
    pub replacement: Option<XmlNode>,
    /// Human-readable outcome for the batch summary.
    pub message: String,
}

impl Resolution {
    fn declined(message: impl Into<String>) -> Self {
        Self {
            proceed: false,
            replacement: None,
            message: message.into(),
        }
    }

    fn accepted(replacement: Option<XmlNode>, message: impl Into<String>) -> Self {
        Self {
            proceed: true,
            replacement,
            message: message.into(),
        }
    }
}

/// Strategy-pluggable conflict resolver.
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    default_strategy: ConflictStrategy,
    rename_suffix: String,
}

impl ConflictResolver {
    /// Create a resolver with the given engine-wide default.
    pub fn new(default_strategy: ConflictStrategy) -> Self {
        Self {
            default_strategy,
            rename_suffix: DEFAULT_RENAME_SUFFIX.to_string(),
        }
    }

    /// Override the rename suffix.
    pub fn with_rename_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.rename_suffix = suffix.into();
        self
    }

    /// The engine-wide default strategy.
    pub fn default_strategy(&self) -> ConflictStrategy {
        self.default_strategy
    }

    /// Resolve a conflict between a source and an existing target entity.
    ///
    /// `kind` enables the type-specific merge unions; rules pass `None` and
    /// take the generic merge path.
    pub fn resolve(
        &self,
        source: &XmlNode,
        target: &XmlNode,
        kind: Option<ObjectKind>,
        name: &str,
        strategy: Option<ConflictStrategy>,
    ) -> Resolution {
        let strategy = strategy.unwrap_or(self.default_strategy);
        debug!(name, strategy = %strategy, "resolving conflict");

        match strategy {
            ConflictStrategy::Skip => {
                Resolution::declined("already exists")
            }
            ConflictStrategy::Overwrite | ConflictStrategy::KeepSource => Resolution::accepted(
                Some(source.clone()),
                "existing object overwritten with source",
            ),
            ConflictStrategy::KeepTarget => Resolution::declined("target object kept"),
            ConflictStrategy::Merge => self.merge(source, target, kind, name),
            ConflictStrategy::Rename => {
                let new_name = format!("{name}{}", self.rename_suffix);
                let mut renamed = source.clone();
                renamed.set_attr("name", new_name.clone());
                Resolution::accepted(
                    Some(renamed),
                    format!("source copied under new name '{new_name}'"),
                )
            }
            ConflictStrategy::KeepNewer => self.keep_newer(source, target, name),
            ConflictStrategy::Interactive => {
                warn!(
                    name,
                    default = %self.default_strategy,
                    "interactive conflict resolution is not available in the core; using default"
                );
                let fallback = if self.default_strategy == ConflictStrategy::Interactive {
                    ConflictStrategy::Skip
                } else {
                    self.default_strategy
                };
                self.resolve(source, target, kind, name, Some(fallback))
            }
        }
    }

    fn merge(
        &self,
        source: &XmlNode,
        target: &XmlNode,
        kind: Option<ObjectKind>,
        name: &str,
    ) -> Resolution {
        match kind {
            Some(ObjectKind::AddressGroup) => {
                // Address groups never take the generic path: appending the
                // source's membership block would leave an entry that is
                // both static and dynamic.
                return merge_address_group(source, target, name);
            }
            Some(ObjectKind::ServiceGroup) => {
                let mut merged = target.clone();
                let mut members = merged.member_values("members");
                for member in source.member_values("members") {
                    if !members.contains(&member) {
                        members.push(member);
                    }
                }
                merged.set_members("members", &members);
                return Resolution::accepted(Some(merged), "merged service group members");
            }
            Some(ObjectKind::Tag) => {
                let mut merged = target.clone();
                for field in ["color", "comments"] {
                    if merged.child_text(field).is_none() {
                        if let Some(value) = source.child_text(field) {
                            merged.set_child_text(field, value);
                        }
                    }
                }
                return Resolution::accepted(Some(merged), "merged tag attributes");
            }
            _ => {}
        }

        // Generic kinds: structural merge with source precedence.
        let mut merged = target.clone();
        match merge_element(&mut merged, source, true) {
            Ok(()) => Resolution::accepted(Some(merged), "merged with source precedence"),
            Err(e) => {
                warn!(name, error = %e, "merge failed; keeping target");
                Resolution::declined(format!("merge failed: {e}"))
            }
        }
    }

    fn keep_newer(&self, source: &XmlNode, target: &XmlNode, name: &str) -> Resolution {
        let source_time = last_modified(source);
        let target_time = last_modified(target);
        match (source_time, target_time) {
            (Some(source_time), Some(target_time)) => {
                if source_time > target_time {
                    Resolution::accepted(Some(source.clone()), "source is newer")
                } else {
                    Resolution::declined("target is newer")
                }
            }
            _ => {
                debug!(name, "no usable last-modified timestamps; falling back to overwrite");
                Resolution::accepted(
                    Some(source.clone()),
                    "no timestamps to compare, overwrote target",
                )
            }
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(ConflictStrategy::Skip)
    }
}

fn merge_address_group(source: &XmlNode, target: &XmlNode, name: &str) -> Resolution {
    let (Ok(source_group), Ok(target_group)) = (
        AddressGroup::from_node(source),
        AddressGroup::from_node(target),
    ) else {
        return Resolution::declined("address group is malformed; keeping target");
    };

    match (&target_group.membership, &source_group.membership) {
        (GroupMembership::Static(target_members), GroupMembership::Static(source_members)) => {
            let mut merged = target.clone();
            let mut members = target_members.clone();
            for member in source_members {
                if !members.contains(member) {
                    members.push(member.clone());
                }
            }
            if let Some(static_elem) = merged.get_child_mut("static") {
                static_elem.children.retain(|c| c.tag != "member");
                for member in &members {
                    static_elem.children.push(XmlNode::with_text("member", member));
                }
            }
            Resolution::accepted(Some(merged), "merged address group members")
        }
        (GroupMembership::Dynamic(target_filter), GroupMembership::Dynamic(source_filter)) => {
            let mut merged = target.clone();
            let combined = format!("({target_filter}) and ({source_filter})");
            if let Some(dynamic) = merged.get_child_mut("dynamic") {
                dynamic.set_child_text("filter", combined);
            }
            Resolution::accepted(Some(merged), "combined dynamic filters")
        }
        // Static/dynamic mixtures have no membership union. The target's
        // membership stays; only an empty description is filled in.
        _ => {
            warn!(
                name,
                "cannot merge static and dynamic address group memberships; keeping target membership"
            );
            let mut merged = target.clone();
            if merged.child_text("description").is_none() {
                if let Some(description) = source.child_text("description") {
                    merged.set_child_text("description", description);
                }
            }
            Resolution::accepted(
                Some(merged),
                "membership types differ; kept target membership, copied description",
            )
        }
    }
}

fn last_modified(node: &XmlNode) -> Option<NaiveDateTime> {
    let text = node.child_text("last-modified")?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.naive_utc());
    }
    NaiveDateTime::parse_from_str(text, "%Y/%m/%d %H:%M:%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(xml: &str) -> XmlNode {
        XmlNode::parse_str(xml).unwrap()
    }

    #[test]
    fn test_skip_declines() {
        let resolver = ConflictResolver::default();
        let source = node("<entry name=\"a\"/>");
        let target = node("<entry name=\"a\"/>");
        let resolution = resolver.resolve(&source, &target, None, "a", None);
        assert!(!resolution.proceed);
        assert!(resolution.message.contains("already exists"));
    }

    #[test]
    fn test_overwrite_accepts_source() {
        let resolver = ConflictResolver::default();
        let source = node("<entry name=\"a\"><ip-netmask>2.2.2.2</ip-netmask></entry>");
        let target = node("<entry name=\"a\"><ip-netmask>1.1.1.1</ip-netmask></entry>");
        let resolution = resolver.resolve(
            &source,
            &target,
            Some(ObjectKind::Address),
            "a",
            Some(ConflictStrategy::Overwrite),
        );
        assert!(resolution.proceed);
        assert_eq!(
            resolution.replacement.unwrap().child_text("ip-netmask"),
            Some("2.2.2.2")
        );
    }

    #[test]
    fn test_merge_static_groups_unions_members() {
        let resolver = ConflictResolver::default();
        let target = node("<entry name=\"g\"><static><member>a</member><member>b</member></static></entry>");
        let source = node("<entry name=\"g\"><static><member>b</member><member>c</member></static></entry>");
        let resolution = resolver.resolve(
            &source,
            &target,
            Some(ObjectKind::AddressGroup),
            "g",
            Some(ConflictStrategy::Merge),
        );
        assert!(resolution.proceed);
        let merged = resolution.replacement.unwrap();
        let members: Vec<String> = merged
            .get_child("static")
            .unwrap()
            .children_named("member")
            .filter_map(|m| m.text.clone())
            .collect();
        assert_eq!(members, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_dynamic_filters_combined() {
        let resolver = ConflictResolver::default();
        let target = node("<entry name=\"g\"><dynamic><filter>'web'</filter></dynamic></entry>");
        let source = node("<entry name=\"g\"><dynamic><filter>'prod'</filter></dynamic></entry>");
        let resolution = resolver.resolve(
            &source,
            &target,
            Some(ObjectKind::AddressGroup),
            "g",
            Some(ConflictStrategy::Merge),
        );
        let merged = resolution.replacement.unwrap();
        assert_eq!(
            merged.get_child("dynamic").unwrap().child_text("filter"),
            Some("('web') and ('prod')")
        );
    }

    #[test]
    fn test_merge_mismatched_group_keeps_target_membership() {
        let resolver = ConflictResolver::default();
        let target = node("<entry name=\"g\"><static><member>a</member></static></entry>");
        let source = node(
            "<entry name=\"g\"><dynamic><filter>'prod'</filter></dynamic><description>from source</description></entry>",
        );
        let resolution = resolver.resolve(
            &source,
            &target,
            Some(ObjectKind::AddressGroup),
            "g",
            Some(ConflictStrategy::Merge),
        );
        assert!(resolution.proceed);
        let merged = resolution.replacement.unwrap();
        // Never both static and dynamic: the target's membership survives.
        assert!(merged.get_child("static").is_some());
        assert!(merged.get_child("dynamic").is_none());
        // Only the empty description was filled from the source.
        assert_eq!(merged.child_text("description"), Some("from source"));

        // A target that already has a description keeps it.
        let target = node(
            "<entry name=\"g\"><dynamic><filter>'web'</filter></dynamic><description>target text</description></entry>",
        );
        let source = node(
            "<entry name=\"g\"><static><member>a</member></static><description>source text</description></entry>",
        );
        let resolution = resolver.resolve(
            &source,
            &target,
            Some(ObjectKind::AddressGroup),
            "g",
            Some(ConflictStrategy::Merge),
        );
        let merged = resolution.replacement.unwrap();
        assert!(merged.get_child("dynamic").is_some());
        assert!(merged.get_child("static").is_none());
        assert_eq!(merged.child_text("description"), Some("target text"));
    }

    #[test]
    fn test_merge_tag_fills_empty_fields_only() {
        let resolver = ConflictResolver::default();
        let target = node("<entry name=\"t\"><color>color2</color></entry>");
        let source =
            node("<entry name=\"t\"><color>color9</color><comments>from source</comments></entry>");
        let resolution = resolver.resolve(
            &source,
            &target,
            Some(ObjectKind::Tag),
            "t",
            Some(ConflictStrategy::Merge),
        );
        let merged = resolution.replacement.unwrap();
        assert_eq!(merged.child_text("color"), Some("color2"));
        assert_eq!(merged.child_text("comments"), Some("from source"));
    }

    #[test]
    fn test_rename_appends_suffix() {
        let resolver = ConflictResolver::default();
        let source = node("<entry name=\"a\"/>");
        let target = node("<entry name=\"a\"/>");
        let resolution = resolver.resolve(
            &source,
            &target,
            None,
            "a",
            Some(ConflictStrategy::Rename),
        );
        assert!(resolution.proceed);
        assert_eq!(
            resolution.replacement.unwrap().name(),
            Some("a_imported")
        );
    }

    #[test]
    fn test_keep_newer_compares_timestamps() {
        let resolver = ConflictResolver::default();
        let newer = node(
            "<entry name=\"a\"><last-modified>2026/05/01 10:00:00</last-modified></entry>",
        );
        let older = node(
            "<entry name=\"a\"><last-modified>2026/01/01 10:00:00</last-modified></entry>",
        );

        let resolution = resolver.resolve(
            &newer,
            &older,
            None,
            "a",
            Some(ConflictStrategy::KeepNewer),
        );
        assert!(resolution.proceed);

        let resolution = resolver.resolve(
            &older,
            &newer,
            None,
            "a",
            Some(ConflictStrategy::KeepNewer),
        );
        assert!(!resolution.proceed);
    }

    #[test]
    fn test_keep_newer_without_timestamps_overwrites() {
        let resolver = ConflictResolver::default();
        let source = node("<entry name=\"a\"/>");
        let target = node("<entry name=\"a\"/>");
        let resolution = resolver.resolve(
            &source,
            &target,
            None,
            "a",
            Some(ConflictStrategy::KeepNewer),
        );
        assert!(resolution.proceed);
    }

    #[test]
    fn test_interactive_delegates_to_default() {
        let resolver = ConflictResolver::new(ConflictStrategy::Overwrite);
        let source = node("<entry name=\"a\"/>");
        let target = node("<entry name=\"a\"/>");
        let resolution = resolver.resolve(
            &source,
            &target,
            None,
            "a",
            Some(ConflictStrategy::Interactive),
        );
        assert!(resolution.proceed);

        // An interactive default cannot loop; it degrades to skip.
        let resolver = ConflictResolver::new(ConflictStrategy::Interactive);
        let resolution = resolver.resolve(
            &source,
            &target,
            None,
            "a",
            Some(ConflictStrategy::Interactive),
        );
        assert!(!resolution.proceed);
    }
}
