//! Routing and execution runtime
//!
//! This crate classifies input into routes, resolves routes to flows against
//! a store, and drives a flow's nodes in order while streaming their output.

mod embedding;
mod executor;
mod registry;
mod resolver;
mod retry;
mod router;
mod runtime;
mod store;
mod table;

pub use embedding::{EmbeddingGateway, HashEmbedder};
pub use executor::{PipelineContext, PipelineExecutor};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry};
pub use resolver::FlowResolver;
pub use retry::{with_retry, Attempt, Transient};
pub use router::{RouteCentroid, SemanticRouter, ShortcutClassifier};
pub use runtime::{RouteRuntime, RuntimeConfig};
pub use store::MemoryStore;
pub use table::{
    FlowTemplate, NodeTemplate, RouteAction, RouteEntry, RouteTable, ShortcutRule,
    BUILTIN_ROUTES, ROUTE_TABLE_VERSION,
};
