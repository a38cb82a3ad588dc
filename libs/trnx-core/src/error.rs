//! Error types for the graph assembly and execution engine.
//!
//! Package errors live in `trnx-plugin-abi`; everything else lives here.
//! Each variant maps to a stable string tag via [`TrnxError::code`] so
//! external front-ends can depend on the tag independent of the
//! human-readable message.

use thiserror::Error;

/// Result type that uses [`TrnxError`].
pub type Result<T> = std::result::Result<T, TrnxError>;

#[derive(Error, Debug)]
pub enum TrnxError {
    // --- graph assembly errors ---
    #[error("illegal operation '{operation}' in state '{state}'")]
    IllegalState { state: String, operation: String },

    #[error("plugin '{0}' is already loaded")]
    DuplicatePlugin(String),

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("unknown port '{port}' on plugin '{plugin}'")]
    UnknownPort { plugin: String, port: String },

    #[error("port type mismatch connecting {producer}.{output} -> {consumer}.{input}")]
    PortTypeMismatch {
        producer: String,
        output: String,
        consumer: String,
        input: String,
    },

    #[error("input '{consumer}.{input}' already has a connected producer; fan-in is forbidden")]
    FanInForbidden { consumer: String, input: String },

    #[error("cycle detected among plugins: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("plugin '{plugin}' has unbound required input '{port}'")]
    UnboundInput { plugin: String, port: String },

    #[error("build failed: {0}")]
    BuildFailed(String),

    // --- runtime/resource errors ---
    #[error("shape/type mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("failed to allocate shared region '{name}': {reason}")]
    RegionAllocationFailed { name: String, reason: String },

    #[error("id '{0}' is already registered")]
    IdConflict(String),
}

impl TrnxError {
    /// Stable string tag for this error kind, independent of the
    /// human-readable [`std::fmt::Display`] message.
    pub fn code(&self) -> &'static str {
        match self {
            TrnxError::IllegalState { .. } => "illegal_state",
            TrnxError::DuplicatePlugin(_) => "duplicate_plugin",
            TrnxError::UnknownPlugin(_) => "unknown_plugin",
            TrnxError::UnknownPort { .. } => "unknown_port",
            TrnxError::PortTypeMismatch { .. } => "port_type_mismatch",
            TrnxError::FanInForbidden { .. } => "fan_in_forbidden",
            TrnxError::CycleDetected(_) => "cycle_detected",
            TrnxError::UnboundInput { .. } => "unbound_input",
            TrnxError::BuildFailed(_) => "build_failed",
            TrnxError::ShapeMismatch { .. } => "shape_mismatch",
            TrnxError::RegionAllocationFailed { .. } => "region_allocation_failed",
            TrnxError::IdConflict(_) => "id_conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_for_identical_inputs() {
        let a = TrnxError::UnknownPlugin("Alpha".into());
        let b = TrnxError::UnknownPlugin("Alpha".into());
        assert_eq!(a.code(), b.code());
        assert_eq!(a.code(), "unknown_plugin");
    }

    #[test]
    fn cycle_detected_displays_node_set() {
        let err = TrnxError::CycleDetected(vec!["A".into(), "B".into()]);
        assert!(format!("{err}").contains('A'));
        assert_eq!(err.code(), "cycle_detected");
    }
}
