use crate::{FlowTemplate, RouteAction, RouteTable};
use routecore::{
    Flow, FlowStore, NodeSpec, Plugin, PluginSpec, RouteLabel, RunError, StoreError,
};
use std::sync::Arc;

/// Maps route labels to flows, creating canonical flows on first use
pub struct FlowResolver {
    store: Arc<dyn FlowStore>,
    table: Arc<RouteTable>,
}

impl FlowResolver {
    pub fn new(store: Arc<dyn FlowStore>, table: Arc<RouteTable>) -> Self {
        Self { store, table }
    }

    pub async fn resolve(&self, route: RouteLabel, bound: Option<&Flow>) -> Result<Flow, RunError> {
        match self.table.action(route) {
            RouteAction::Flow(template) => self.ensure_exists(template).await,
            RouteAction::Bound => bound.cloned().ok_or(RunError::UnresolvedFlow { route }),
            RouteAction::Canned { .. } => Err(RunError::UnresolvedFlow { route }),
        }
    }

    /// Get-or-create the template's flow
    ///
    /// Safe under concurrent callers in any number of processes: a duplicate
    /// on create means another caller won, so the flow is re-fetched once.
    /// A flow found without nodes (a creator still appending, or one that
    /// failed halfway) gets the template node appended under its stable id.
    pub async fn ensure_exists(&self, template: &FlowTemplate) -> Result<Flow, RunError> {
        let flow = match self.store.find_flow_by_name(&template.flow).await? {
            Some(flow) => flow,
            None => self.create(template).await?,
        };

        if flow.nodes.is_empty() {
            return self.complete(flow, template).await;
        }
        Ok(flow)
    }

    async fn create(&self, template: &FlowTemplate) -> Result<Flow, RunError> {
        let node = self.template_node(template).await?;
        match self.store.create_flow_with_nodes(&template.flow, vec![node]).await {
            Ok(flow) => {
                tracing::info!(flow = %flow.name, flow_id = %flow.id, "Created flow");
                Ok(flow)
            }
            Err(StoreError::Duplicate { .. }) => {
                tracing::debug!(flow = %template.flow, "Flow created concurrently, re-fetching");
                self.refetch(template).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete(&self, flow: Flow, template: &FlowTemplate) -> Result<Flow, RunError> {
        tracing::warn!(
            flow = %flow.name,
            flow_id = %flow.id,
            "Flow has no nodes, appending template node"
        );
        let node = self.template_node(template).await?;
        match self.store.append_node(flow.id, node).await {
            Ok(_) | Err(StoreError::Duplicate { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let flow = self.refetch(template).await?;
        if flow.nodes.is_empty() {
            return Err(StoreError::Backend(format!(
                "flow '{}' still has no nodes after append",
                flow.name
            ))
            .into());
        }
        Ok(flow)
    }

    async fn refetch(&self, template: &FlowTemplate) -> Result<Flow, RunError> {
        self.store
            .find_flow_by_name(&template.flow)
            .await?
            .ok_or_else(|| not_found("flow", &template.flow))
    }

    /// The template's node with its stable id and, for plugin nodes, `plugin_id`
    async fn template_node(&self, template: &FlowTemplate) -> Result<NodeSpec, RunError> {
        let mut node = template.node.to_spec();
        node.id = template.node_id();
        if let Some(spec) = &template.plugin {
            let plugin = self.ensure_plugin(spec).await?;
            node.config
                .insert("plugin_id".to_string(), plugin.id.to_string().into());
        }
        Ok(node)
    }

    async fn ensure_plugin(&self, spec: &PluginSpec) -> Result<Plugin, RunError> {
        if let Some(plugin) = self.store.find_plugin_by_name(&spec.name).await? {
            return Ok(plugin);
        }

        match self.store.create_plugin(spec.clone()).await {
            Ok(plugin) => {
                tracing::info!(plugin = %plugin.name, plugin_id = %plugin.id, "Created plugin");
                Ok(plugin)
            }
            Err(StoreError::Duplicate { .. }) => self
                .store
                .find_plugin_by_name(&spec.name)
                .await?
                .ok_or_else(|| not_found("plugin", &spec.name)),
            Err(e) => Err(e.into()),
        }
    }
}

fn not_found(entity: &'static str, name: &str) -> RunError {
    RunError::Store(StoreError::NotFound {
        entity,
        key: name.to_string(),
    })
}
