use crate::transport::send_text;
use async_trait::async_trait;
use routecore::{
    BackendError, FlowStore, Node, NodeContext, NodeError, NodeKind, NodeSpec, Plugin, PluginId,
    SandboxRuntime,
};
use routeruntime::{NodeFactory, NodeMetadata};
use std::sync::Arc;
use std::time::Duration;

/// Runs a stored plugin in the sandbox with the node input
pub struct PluginNode {
    plugin_id: PluginId,
    store: Arc<dyn FlowStore>,
    sandbox: Arc<dyn SandboxRuntime>,
}

#[async_trait]
impl Node for PluginNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Plugin
    }

    async fn execute(&self, ctx: NodeContext) -> Result<String, NodeError> {
        let plugin = self
            .store
            .find_plugin(self.plugin_id)
            .await?
            .ok_or_else(|| NodeError::PluginNotFound(self.plugin_id.to_string()))?;

        ctx.events.info(format!("Invoking plugin {}", plugin.name));
        crate::cancellable(&ctx, self.sandbox.invoke(&plugin, &ctx.input)).await
    }
}

pub struct PluginNodeFactory {
    store: Arc<dyn FlowStore>,
    sandbox: Arc<dyn SandboxRuntime>,
}

impl PluginNodeFactory {
    pub fn new(store: Arc<dyn FlowStore>, sandbox: Arc<dyn SandboxRuntime>) -> Self {
        Self { store, sandbox }
    }
}

impl NodeFactory for PluginNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        let raw = spec
            .config_str("plugin_id")
            .ok_or_else(|| NodeError::Configuration("Missing 'plugin_id' config".into()))?;
        let plugin_id: PluginId = raw
            .parse()
            .map_err(|_| NodeError::Configuration(format!("Invalid plugin_id: {}", raw)))?;

        Ok(Box::new(PluginNode {
            plugin_id,
            store: Arc::clone(&self.store),
            sandbox: Arc::clone(&self.sandbox),
        }))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Plugin
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Runs a WASM plugin in the sandbox".to_string(),
            category: "plugin".to_string(),
        }
    }
}

/// Sandbox reached over HTTP
///
/// POSTs `{"plugin": {...}, "input": "..."}` to the endpoint. A JSON reply
/// with a string `output` field yields that field; any other body is
/// returned as is.
pub struct HttpSandbox {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpSandbox {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SandboxRuntime for HttpSandbox {
    async fn invoke(&self, plugin: &Plugin, input: &str) -> Result<String, BackendError> {
        let request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "plugin": {
                    "id": plugin.id,
                    "name": plugin.name,
                    "wasm_url": plugin.wasm_url,
                },
                "input": input,
            }));

        let body = send_text(request).await?;
        Ok(extract_output(body))
    }
}

fn extract_output(body: String) -> String {
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Object(map)) => match map.get("output") {
            Some(serde_json::Value::String(output)) => output.clone(),
            _ => body,
        },
        _ => body,
    }
}
