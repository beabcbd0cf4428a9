use routecore::{Node, NodeError, NodeKind, NodeSpec, RunError};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory trait for creating node instances
pub trait NodeFactory: Send + Sync {
    /// Create a new instance of the node for the given stored spec
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError>;

    fn kind(&self) -> NodeKind;

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node kind
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry mapping node kinds to their factories
pub struct NodeRegistry {
    factories: HashMap<NodeKind, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node factory, replacing any previous one for the same kind
    pub fn register(&mut self, factory: Arc<dyn NodeFactory>) {
        let kind = factory.kind();
        tracing::info!("Registering node type: {}", kind);
        self.factories.insert(kind, factory);
    }

    /// Create a node instance from a stored spec
    ///
    /// Unknown tags, and known kinds nobody registered, are both reported as
    /// [`RunError::UnknownNodeType`].
    pub fn create_node(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, RunError> {
        let unknown = || RunError::UnknownNodeType {
            node: spec.name.clone(),
            node_type: spec.node_type.clone(),
        };

        let kind: NodeKind = spec.node_type.parse().map_err(|_| unknown())?;
        let factory = self.factories.get(&kind).ok_or_else(unknown)?;

        factory.create(spec).map_err(|source| RunError::NodeExecution {
            node: spec.name.clone(),
            source,
            partial_output: String::new(),
        })
    }

    /// Registered kinds in declaration order
    pub fn list_node_kinds(&self) -> Vec<NodeKind> {
        NodeKind::ALL
            .into_iter()
            .filter(|kind| self.factories.contains_key(kind))
            .collect()
    }

    pub fn get_metadata(&self, kind: NodeKind) -> Option<NodeMetadata> {
        self.factories.get(&kind).map(|f| f.metadata())
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
