//! Core vocabulary types for the engine.

pub mod context;
pub mod error;
pub mod kind;
pub mod version;

pub use context::{Context, DeviceType};
pub use error::EngineError;
pub use kind::{
    ObjectKind, RuleKind, Rulebase, ALL_OBJECT_KINDS, ALL_RULE_KINDS, SECURITY_PROFILE_KINDS,
};
pub use version::{PanOsVersion, KNOWN_VERSIONS, V10_1, V10_2, V11_0, V11_1, V11_2};
