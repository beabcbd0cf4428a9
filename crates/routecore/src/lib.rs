//! Core abstractions for the routing pipeline
//!
//! This crate holds the data model, the error taxonomy and the traits that
//! the runtime and the node library depend on. It performs no I/O itself.

mod backend;
mod error;
pub mod events;
mod model;
mod node;
mod route;
mod sink;
mod store;

pub use backend::{BackendError, ImageGenerator, ModelGateway, SandboxRuntime};
pub use error::{ConfigError, GatewayError, NodeError, RunError, StoreError};
pub use events::{EventBus, EventEmitter, ExecutionEvent, ExecutionId, NodeEvent};
pub use model::{
    Agent, AgentId, Flow, FlowId, NodeId, NodeSpec, Plugin, PluginId, PluginSpec, RetryPolicy,
    Run, RunId, RunState, Thread, ThreadId,
};
pub use node::{Node, NodeContext, NodeKind};
pub use route::{RouteLabel, UnknownRouteLabel};
pub use sink::{ChannelSink, NullSink, OutputChunk, OutputSink, SinkError};
pub use store::FlowStore;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, RunError>;
