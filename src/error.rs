//! Error taxonomy for graph construction, simulation and the computation cache.
//!
//! Every variant is `Clone`: a failed cached computation hands the very same
//! error to each waiter.

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::NodeId;

/// Errors produced while analysing a page load.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LanternError {
    /// The trace or network log cannot be analysed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// No single navigation root could be selected.
    #[error("no root: {0}")]
    NoRoot(String),

    /// The simulator could not assign a timing to every node.
    #[error("cycle detected: {} node(s) never became ready: {unresolved:?}", unresolved.len())]
    CycleDetected {
        /// Nodes that were still unassigned when the ready set drained.
        unresolved: Vec<NodeId>,
    },

    /// The computation cache could not serve a request.
    #[error("computation cache error: {0}")]
    Cache(String),

    /// A value could not be serialized (cache keys, exports).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ConfigError> for LanternError {
    fn from(err: ConfigError) -> Self {
        LanternError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for LanternError {
    fn from(err: serde_json::Error) -> Self {
        LanternError::Serialization(err.to_string())
    }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, LanternError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_nodes() {
        let err = LanternError::CycleDetected {
            unresolved: vec![3, 4],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 node(s)"));
        assert!(msg.contains("[3, 4]"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: LanternError = ConfigError::Validation("rtt_ms must be positive".into()).into();
        assert!(matches!(err, LanternError::Config(ref m) if m.contains("rtt_ms")));
    }
}
