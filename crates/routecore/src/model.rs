use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use uuid::Uuid;

pub type FlowId = Uuid;
pub type NodeId = Uuid;
pub type PluginId = Uuid;
pub type RunId = Uuid;
pub type AgentId = Uuid;
pub type ThreadId = Uuid;

/// A named, ordered sequence of nodes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flow {
    #[serde(default = "Uuid::new_v4")]
    pub id: FlowId,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }
}

/// One stage of a flow as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSpec {
    #[serde(default = "Uuid::new_v4")]
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Tag selecting the node implementation, e.g. "plugin"
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            node_type: node_type.into(),
            config: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

/// A sandboxed plugin that `plugin` nodes invoke
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plugin {
    pub id: PluginId,
    pub name: String,
    pub description: String,
    pub wasm_url: String,
}

/// Everything needed to create a plugin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub wasm_url: String,
}

impl PluginSpec {
    pub fn into_plugin(self) -> Plugin {
        Plugin {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            wasm_url: self.wasm_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Thread {
    pub id: ThreadId,
    pub title: Option<String>,
}

impl Thread {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: None,
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Created,
    Routed,
    Executing,
    ShortCircuited,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::Cancelled)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Created, Routed) => true,
            (Routed, Executing) | (Routed, ShortCircuited) => true,
            (Executing, Completed) | (ShortCircuited, Completed) => true,
            (from, Failed) | (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// One end-to-end invocation of the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub agent: Agent,
    /// Bound flow, if any; routing may replace it
    pub flow: Option<Flow>,
    pub thread: Thread,
    pub input: String,
    pub state: RunState,
}

impl Run {
    pub fn new(agent: Agent, thread: Thread, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent,
            flow: None,
            thread,
            input: input.into(),
            state: RunState::Created,
        }
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = Some(flow);
        self
    }

    /// Move to `next`, refusing transitions the state machine does not allow
    pub fn advance(&mut self, next: RunState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                run_id = %self.id,
                from = ?self.state,
                to = ?next,
                "Rejected run state transition"
            );
            return false;
        }
        tracing::debug!(run_id = %self.id, from = ?self.state, to = ?next, "Run state transition");
        self.state = next;
        true
    }
}

/// Retry policy for transient failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0 for the first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.max(1.0).powi(retry as i32);
        let ms = (self.delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}
