//! Object and policy mergers.
//!
//! Both mergers copy entities between contexts — within one tree or across
//! two — pulling in transitive dependencies and resolving name conflicts
//! through the conflict resolver. Batch operations never abort on per-item
//! failures; the summary explains what happened.

pub mod object;
pub mod policy;

use serde::{Deserialize, Serialize};

use crate::types::EngineError;
use crate::xml::ConfigTree;

pub use object::{CopyOptions, DependencyOptions, ObjectMerger};
pub use policy::{PolicyMerger, PolicyPosition};

/// The trees a merge operates over.
///
/// Copies read from the source tree and write to the target tree; a merge
/// within one configuration borrows the same tree for both roles, which is
/// why reads and writes are strictly phased inside each step.
pub enum MergeDomain<'a> {
    /// Source and target contexts live in one tree.
    Single(&'a mut ConfigTree),
    /// Source and target are distinct trees.
    Cross {
        /// Tree copied from (never mutated).
        source: &'a ConfigTree,
        /// Tree copied into.
        target: &'a mut ConfigTree,
    },
}

impl<'a> MergeDomain<'a> {
    /// Merge within one tree.
    pub fn single(tree: &'a mut ConfigTree) -> Self {
        Self::Single(tree)
    }

    /// Merge across two trees.
    pub fn cross(source: &'a ConfigTree, target: &'a mut ConfigTree) -> Self {
        Self::Cross { source, target }
    }

    /// The tree being read from.
    pub fn source(&self) -> &ConfigTree {
        match self {
            Self::Single(tree) => tree,
            Self::Cross { source, .. } => source,
        }
    }

    /// The tree being written to, readable.
    pub fn target(&self) -> &ConfigTree {
        match self {
            Self::Single(tree) => tree,
            Self::Cross { target, .. } => target,
        }
    }

    /// The tree being written to.
    pub fn target_mut(&mut self) -> &mut ConfigTree {
        match self {
            Self::Single(tree) => tree,
            Self::Cross { target, .. } => target,
        }
    }
}

/// One successfully copied entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedItem {
    /// Entity kind label.
    pub kind: String,
    /// Entity name as installed in the target.
    pub name: String,
}

/// One entity that was not copied, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Entity kind label.
    pub kind: String,
    /// Entity name.
    pub name: String,
    /// Why the copy did not happen.
    pub reason: String,
}

/// Accounting for a merge run. Per-item failures land here; they never
/// abort the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeSummary {
    /// Entities copied by explicit request.
    pub merged: Vec<MergedItem>,
    /// Entities copied as references of requested entities.
    pub copied_references: Vec<MergedItem>,
    /// Entities skipped, with reasons.
    pub skipped: Vec<SkippedItem>,
    /// Non-fatal notes (failed reference copies, version adaptations).
    pub warnings: Vec<String>,
}

impl MergeSummary {
    /// Number of entities copied by explicit request.
    pub fn merged_count(&self) -> usize {
        self.merged.len()
    }

    /// Number of entities skipped.
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub(crate) fn record_merged(&mut self, kind: &str, name: &str) {
        self.merged.push(MergedItem {
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }

    pub(crate) fn record_reference(&mut self, kind: &str, name: &str) {
        self.copied_references.push(MergedItem {
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }

    pub(crate) fn record_skipped(&mut self, kind: &str, name: &str, reason: impl Into<String>) {
        self.skipped.push(SkippedItem {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        });
    }

    pub(crate) fn record_error(&mut self, kind: &str, name: &str, error: &EngineError) {
        self.skipped.push(SkippedItem {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: error.to_string(),
        });
    }
}
