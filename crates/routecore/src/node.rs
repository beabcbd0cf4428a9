use crate::{events::EventEmitter, Agent, Flow, NodeError, NodeId, Thread};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Closed set of node implementations, keyed by the stored type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Plugin,
    StabilityTextToImage,
    FinnhubFunctionCall,
    Echo,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Plugin,
        NodeKind::StabilityTextToImage,
        NodeKind::FinnhubFunctionCall,
        NodeKind::Echo,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Plugin => "plugin",
            NodeKind::StabilityTextToImage => "stability_text_to_image",
            NodeKind::FinnhubFunctionCall => "finnhub_function_call",
            NodeKind::Echo => "echo",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.tag() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Core trait that all executable nodes implement
#[async_trait]
pub trait Node: Send + Sync {
    fn kind(&self) -> NodeKind;

    /// Execute the node; the returned text becomes the next node's input
    async fn execute(&self, ctx: NodeContext) -> Result<String, NodeError>;
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: NodeId,
    pub node_name: String,
    pub agent: Agent,
    pub flow: Arc<Flow>,
    pub thread: Thread,

    /// Output of the previous node, or the run input for the first node
    pub input: String,

    /// Static configuration for this node
    pub config: Map<String, Value>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when the run is; long backend calls should race it
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl NodeContext {
    pub fn config_str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.config.get(name).and_then(Value::as_str).unwrap_or(default)
    }
}
