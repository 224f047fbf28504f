//! Error types for transcription and dynamics assembly.

use thiserror::Error;

/// Errors raised while building layouts, assembling the decision vector or
/// evaluating phase dynamics.
///
/// Three families matter to callers:
///
/// - configuration errors ([`is_config_error`](Self::is_config_error)), detected
///   while a layout or the assembler is being built
/// - [`NotImplementedVariant`](Self::NotImplementedVariant), a recognized but
///   unsupported combination
/// - [`MissingValue`](Self::MissingValue), a strict interpolated series queried
///   at a node it does not define
///
/// All of them abort the current build step. None is retried.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OcpError {
    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A declared shape disagrees with the one reported by the model or the layout.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being checked.
        what: String,
        /// Expected size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Scale factors must be strictly positive and finite.
    #[error("invalid scaling for {name}[{index}]: {value} (must be positive and finite)")]
    InvalidScaling {
        /// Slot the factor belongs to.
        name: String,
        /// Component index inside the slot.
        index: usize,
        /// The rejected factor.
        value: f64,
    },

    /// Members of one fatigue group do not share the same flags or law types.
    #[error("heterogeneous fatigue group {group}: {reason}")]
    HeterogeneousFatigue {
        /// Name of the group (`tau`, `muscles`, ...).
        group: String,
        /// What differs.
        reason: String,
    },

    /// Cross-phase sharing forms a cycle.
    #[error("phase {phase} shares {block} variables through a cycle")]
    SharingCycle {
        /// Phase where the cycle was detected.
        phase: usize,
        /// `"state"` or `"control"`.
        block: &'static str,
    },

    /// Recognized combination that is not supported.
    #[error("not implemented: {reason}")]
    NotImplementedVariant {
        /// What is unsupported.
        reason: String,
    },

    /// Strict interpolated series queried at an undefined node.
    #[error("no value defined at node {node} ({available} points available)")]
    MissingValue {
        /// Queried node.
        node: f64,
        /// Number of defined control points.
        available: usize,
    },

    /// Operation called in the wrong assembler state.
    #[error("invalid assembler state: expected {expected}, currently {actual}")]
    InvalidState {
        /// Required state.
        expected: &'static str,
        /// Current state.
        actual: &'static str,
    },

    /// Solution vector length differs from the decision vector length.
    #[error("solution has {actual} entries, decision vector has {expected}")]
    SolutionLength {
        /// Decision vector length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },

    /// A slot or parameter name was not found.
    #[error("unknown variable: {name}")]
    UnknownVariable {
        /// The missing name.
        name: String,
    },

    /// The model collaborator failed (singular system, unsupported call, ...).
    #[error("model error: {reason}")]
    Model {
        /// Description of the failure.
        reason: String,
    },
}

impl OcpError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a not-implemented error.
    #[must_use]
    pub fn not_implemented(reason: impl Into<String>) -> Self {
        Self::NotImplementedVariant {
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error.
    #[must_use]
    pub fn dimension_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Create an unknown variable error.
    #[must_use]
    pub fn unknown(name: impl Into<String>) -> Self {
        Self::UnknownVariable { name: name.into() }
    }

    /// Create a model error.
    #[must_use]
    pub fn model(reason: impl Into<String>) -> Self {
        Self::Model {
            reason: reason.into(),
        }
    }

    /// Check if this is a configuration error (detected at layout/assembly time).
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. }
                | Self::DimensionMismatch { .. }
                | Self::InvalidScaling { .. }
                | Self::HeterogeneousFatigue { .. }
                | Self::SharingCycle { .. }
        )
    }

    /// Check if this is an unsupported-variant error.
    #[must_use]
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplementedVariant { .. })
    }

    /// Check if this is a missing interpolation value.
    #[must_use]
    pub fn is_missing_value(&self) -> bool {
        matches!(self, Self::MissingValue { .. })
    }
}
