//! Error types for the transformation engine.
//!
//! Every fallible engine operation returns [`EngineError`]. Batch operations
//! record per-item failures in their summaries instead of propagating them;
//! only whole-operation failures (parse, resolver misconfiguration) surface
//! as errors to the caller.

use crate::types::context::DeviceType;

/// Crate-wide error type.
///
/// The variants mirror the failure categories the engine distinguishes:
/// resolution misses, conflicts, illegal context combinations, bad inputs,
/// malformed XPath, cross-version incompatibilities, validation failures,
/// parse failures, and internal invariant violations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Entity or context path does not resolve in the source/target tree.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Entity kind label (e.g. `address`, `security` rule).
        kind: String,
        /// Entity name that failed to resolve.
        name: String,
    },

    /// Target already exists and the active conflict strategy declined.
    #[error("conflict on {kind} '{name}': {message}")]
    Conflict {
        /// Entity kind label.
        kind: String,
        /// Conflicting entity name.
        name: String,
        /// Strategy-provided explanation.
        message: String,
    },

    /// Device-type/context combination is illegal.
    #[error("context '{context}' is not valid on a {device_type} configuration")]
    InvalidContext {
        /// Device type of the request.
        device_type: DeviceType,
        /// Context label that was rejected.
        context: String,
    },

    /// Missing or malformed required parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Resolver produced or received a malformed XPath.
    #[error("invalid xpath: {0}")]
    InvalidXPath(String),

    /// A required-in-target attribute is missing in the source.
    #[error("{kind} '{name}' cannot move to {target_version}: required element '{element}' is absent")]
    VersionIncompatible {
        /// Entity kind label.
        kind: String,
        /// Entity name.
        name: String,
        /// The required sub-element that is missing.
        element: String,
        /// The target version that requires it.
        target_version: String,
    },

    /// Structural validation rejected the entity.
    #[error("validation failed for '{name}': {}", errors.join("; "))]
    ValidationFailed {
        /// Entity name.
        name: String,
        /// Human-readable validator messages.
        errors: Vec<String>,
    },

    /// Input XML could not be parsed or fails structural sanity.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Unexpected condition (e.g. a detached element where a parent was expected).
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Shorthand for a [`EngineError::NotFound`] with string-ish arguments.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Shorthand for an [`EngineError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// True when the error marks a per-item condition that batch operations
    /// record in their summaries rather than abort on.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Conflict { .. }
                | Self::VersionIncompatible { .. }
                | Self::ValidationFailed { .. }
        )
    }
}
