use crate::{BackendError, RouteLabel};
use thiserror::Error;

/// Errors surfaced by `trigger` and the components it drives
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Invalid vector: expected {expected} dimensions, got {actual}")]
    InvalidVector { expected: usize, actual: usize },

    #[error("No flow resolved for route '{route}'")]
    UnresolvedFlow { route: RouteLabel },

    #[error("Unknown node type '{node_type}' on node '{node}'")]
    UnknownNodeType { node: String, node_type: String },

    #[error("Embedding gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Node '{node}' failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: NodeError,
        /// Output aggregated before the failure, for diagnostics only
        partial_output: String,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Run cancelled")]
    Cancelled,
}

impl RunError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Cancelled")]
    Cancelled,
}

impl NodeError {
    /// Timeouts and transient backend failures may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            NodeError::Backend(e) => e.is_transient(),
            NodeError::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Gateway timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Gateway rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A row with the same unique name already exists
    #[error("{entity} '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Store backend failure: {0}")]
    Backend(String),
}

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(GatewayError::Timeout { ms: 5_000 }.is_transient());
        assert!(GatewayError::Unavailable("503".into()).is_transient());
        assert!(!GatewayError::Rejected("401".into()).is_transient());

        assert!(NodeError::Backend(BackendError::Transient("502".into())).is_transient());
        assert!(NodeError::Timeout { ms: 1_000 }.is_transient());
        assert!(!NodeError::Backend(BackendError::Fatal("bad prompt".into())).is_transient());
        assert!(!NodeError::Configuration("missing plugin_id".into()).is_transient());
    }

    #[test]
    fn sub_second_timeouts_keep_their_duration() {
        assert_eq!(NodeError::Timeout { ms: 250 }.to_string(), "Timeout after 250ms");
        assert_eq!(
            GatewayError::Timeout { ms: 1_500 }.to_string(),
            "Gateway timed out after 1500ms"
        );
    }

    #[test]
    fn node_execution_display_names_the_node() {
        let err = RunError::NodeExecution {
            node: "Image Generator".into(),
            source: NodeError::Backend(BackendError::Fatal("content filtered".into())),
            partial_output: String::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Image Generator"));
        assert!(msg.contains("content filtered"));
    }
}
