//! # panflow
//!
//! Schema-aware transformation engine for PAN-OS XML device
//! configurations.
//!
//! A PAN-OS configuration is one large XML document covering two device
//! kinds (firewall and Panorama) across several versions whose schemas
//! differ. This crate interprets such a tree as a structured object/policy
//! graph, resolves cross-object references, and performs schema-aware
//! edits:
//!
//! - a context-aware XPath resolver mapping `(kind, device, context,
//!   version)` tuples to concrete paths;
//! - typed views over addresses, services, tags, security profiles, and
//!   the rule kinds, with an attribute catalog of per-version legality;
//! - a lazily computed reference graph honoring Panorama reachability;
//! - mergers that copy objects or policies between contexts with
//!   transitive dependencies and pluggable conflict strategies;
//! - a deduplicator that collapses value-equivalent objects and rewrites
//!   every reference;
//! - a NAT splitter that turns bidirectional rules into explicit pairs;
//! - a cross-version adapter inserting/removing version-specific elements
//!   during any copy;
//! - structural validators per entity kind.
//!
//! ## Architecture
//!
//! ```text
//! Engine ──> Mergers / Deduplicator / NatSplitter ──> ReferenceGraph
//!    │              │                                     │
//!    │              └──> ConflictResolver, VersionAdapter │
//!    └──> Resolver ──> XML access layer (tree + cache) <──┘
//! ```
//!
//! ## Ownership model
//!
//! The tree is owned exclusively: every element has one parent, and
//! references between entities are name strings resolved through the
//! resolver, never pointers. The engine is single-threaded per tree;
//! parallelism is safe across independent trees.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod conflict;
pub mod criteria;
pub mod dedupe;
pub mod detect;
pub mod engine;
pub mod graph;
pub mod merger;
pub mod model;
pub mod nat_split;
pub mod reports;
pub mod resolver;
pub mod types;
pub mod validate;
pub mod xml;

// Re-exports
pub use adapter::VersionAdapter;
pub use conflict::{ConflictResolver, ConflictStrategy, Resolution};
pub use criteria::Criteria;
pub use dedupe::{DedupeReport, Deduplicator, PrimaryStrategy};
pub use detect::{detect_device_type, detect_version};
pub use engine::{Engine, ObjectSummary};
pub use graph::{Dependency, Reference, ReferenceGraph, ReferenceHolder};
pub use merger::{
    CopyOptions, DependencyOptions, MergeDomain, MergeSummary, ObjectMerger, PolicyMerger,
    PolicyPosition,
};
pub use model::{Address, AddressGroup, NatRule, SecurityRule, Service, ServiceGroup, Tag};
pub use nat_split::{BatchSplitSummary, NatSplitOptions, NatSplitter, SplitOutcome};
pub use types::{
    Context, DeviceType, EngineError, ObjectKind, PanOsVersion, RuleKind, Rulebase,
};
pub use xml::{ConfigTree, DiffItem, DiffType, LookupCache, NodePath, XPath, XmlNode};

/// Schema version of the report and summary types.
/// Increment on breaking changes to any serialized shape.
pub const ENGINE_SCHEMA_VERSION: &str = "1.0.0";
