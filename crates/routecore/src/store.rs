use crate::{Flow, FlowId, NodeSpec, Plugin, PluginId, PluginSpec, StoreError};
use async_trait::async_trait;

/// Persistence contract for flows, nodes and plugins
///
/// Flow and plugin names are unique. `create_flow` and `create_plugin` must
/// fail with [`StoreError::Duplicate`] when the name is taken, including when
/// two callers race to create it. `append_node` must fail the same way when
/// the flow already holds a node with that id.
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn find_flow_by_name(&self, name: &str) -> Result<Option<Flow>, StoreError>;

    async fn create_flow(&self, name: &str) -> Result<Flow, StoreError>;

    async fn append_node(&self, flow_id: FlowId, node: NodeSpec) -> Result<NodeSpec, StoreError>;

    /// Create a flow together with its nodes
    ///
    /// The default runs `create_flow` then `append_node` for each node, so a
    /// concurrent reader can observe the flow before its nodes land. Stores
    /// with transactions should override it.
    async fn create_flow_with_nodes(
        &self,
        name: &str,
        nodes: Vec<NodeSpec>,
    ) -> Result<Flow, StoreError> {
        let mut flow = self.create_flow(name).await?;
        for node in nodes {
            let stored = self.append_node(flow.id, node).await?;
            flow.nodes.push(stored);
        }
        Ok(flow)
    }

    async fn find_plugin_by_name(&self, name: &str) -> Result<Option<Plugin>, StoreError>;

    async fn find_plugin(&self, id: PluginId) -> Result<Option<Plugin>, StoreError>;

    async fn create_plugin(&self, spec: PluginSpec) -> Result<Plugin, StoreError>;
}
