use async_trait::async_trait;
use routecore::{Flow, FlowId, FlowStore, NodeSpec, Plugin, PluginId, PluginSpec, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    flows: HashMap<String, Flow>,
    plugins: HashMap<PluginId, Plugin>,
    plugin_names: HashMap<String, PluginId>,
}

/// In-process store with unique flow and plugin names
///
/// Check and insert happen under one write lock, so racing creators get
/// [`StoreError::Duplicate`] exactly like they would from a unique index.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn flow_count(&self) -> usize {
        self.inner.read().await.flows.len()
    }

    pub async fn plugin_count(&self) -> usize {
        self.inner.read().await.plugins.len()
    }

    pub async fn flow_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.read().await.flows.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl FlowStore for MemoryStore {
    async fn find_flow_by_name(&self, name: &str) -> Result<Option<Flow>, StoreError> {
        Ok(self.inner.read().await.flows.get(name).cloned())
    }

    async fn create_flow(&self, name: &str) -> Result<Flow, StoreError> {
        self.create_flow_with_nodes(name, Vec::new()).await
    }

    async fn append_node(&self, flow_id: FlowId, node: NodeSpec) -> Result<NodeSpec, StoreError> {
        let mut inner = self.inner.write().await;
        let flow = inner
            .flows
            .values_mut()
            .find(|f| f.id == flow_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "flow",
                key: flow_id.to_string(),
            })?;
        if flow.nodes.iter().any(|n| n.id == node.id) {
            return Err(StoreError::Duplicate {
                entity: "node",
                name: node.id.to_string(),
            });
        }
        flow.nodes.push(node.clone());
        Ok(node)
    }

    async fn create_flow_with_nodes(
        &self,
        name: &str,
        nodes: Vec<NodeSpec>,
    ) -> Result<Flow, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.flows.contains_key(name) {
            return Err(StoreError::Duplicate {
                entity: "flow",
                name: name.to_string(),
            });
        }
        let mut flow = Flow::new(name);
        flow.nodes = nodes;
        inner.flows.insert(name.to_string(), flow.clone());
        Ok(flow)
    }

    async fn find_plugin_by_name(&self, name: &str) -> Result<Option<Plugin>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .plugin_names
            .get(name)
            .and_then(|id| inner.plugins.get(id))
            .cloned())
    }

    async fn find_plugin(&self, id: PluginId) -> Result<Option<Plugin>, StoreError> {
        Ok(self.inner.read().await.plugins.get(&id).cloned())
    }

    async fn create_plugin(&self, spec: PluginSpec) -> Result<Plugin, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.plugin_names.contains_key(&spec.name) {
            return Err(StoreError::Duplicate {
                entity: "plugin",
                name: spec.name,
            });
        }
        let plugin = spec.into_plugin();
        inner.plugin_names.insert(plugin.name.clone(), plugin.id);
        inner.plugins.insert(plugin.id, plugin.clone());
        Ok(plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flow_names_are_unique() {
        let store = MemoryStore::new();
        store.create_flow("Image Generator").await.unwrap();
        let err = store.create_flow("Image Generator").await.unwrap_err();
        assert_eq!(
            err,
            StoreError::Duplicate {
                entity: "flow",
                name: "Image Generator".into()
            }
        );
        assert_eq!(store.flow_count().await, 1);
    }

    #[tokio::test]
    async fn appended_nodes_keep_order() {
        let store = MemoryStore::new();
        let flow = store.create_flow("Chain").await.unwrap();
        store.append_node(flow.id, NodeSpec::new("first", "echo")).await.unwrap();
        store.append_node(flow.id, NodeSpec::new("second", "echo")).await.unwrap();

        let stored = store.find_flow_by_name("Chain").await.unwrap().unwrap();
        let names: Vec<_> = stored.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[tokio::test]
    async fn node_ids_are_unique_within_a_flow() {
        let store = MemoryStore::new();
        let flow = store.create_flow("Chain").await.unwrap();
        let node = NodeSpec::new("only", "echo");
        store.append_node(flow.id, node.clone()).await.unwrap();

        let err = store.append_node(flow.id, node).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "node", .. }));
        let stored = store.find_flow_by_name("Chain").await.unwrap().unwrap();
        assert_eq!(stored.nodes.len(), 1);
    }

    #[tokio::test]
    async fn append_to_missing_flow_fails() {
        let store = MemoryStore::new();
        let err = store
            .append_node(uuid::Uuid::new_v4(), NodeSpec::new("orphan", "echo"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "flow", .. }));
    }

    #[tokio::test]
    async fn plugins_by_name_and_id() {
        let store = MemoryStore::new();
        let plugin = store
            .create_plugin(PluginSpec {
                name: "World Zipcode Finder".into(),
                description: String::new(),
                wasm_url: "https://example.invalid/zip.wasm".into(),
            })
            .await
            .unwrap();

        assert_eq!(store.find_plugin(plugin.id).await.unwrap(), Some(plugin.clone()));
        assert_eq!(
            store.find_plugin_by_name("World Zipcode Finder").await.unwrap(),
            Some(plugin)
        );
        assert!(store
            .create_plugin(PluginSpec {
                name: "World Zipcode Finder".into(),
                description: String::new(),
                wasm_url: String::new(),
            })
            .await
            .is_err());
    }
}
