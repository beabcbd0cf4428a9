//! Built-in node library
//!
//! Node implementations for every `NodeKind` plus the HTTP clients that
//! back them.

mod echo;
mod embeddings;
mod finnhub;
mod plugin;
mod stability;
mod transport;

pub use echo::EchoNode;
pub use embeddings::{MistralEmbeddings, MISTRAL_EMBED_DIMENSION, MISTRAL_EMBED_MODEL};
pub use finnhub::{FinnhubClient, FinnhubFunctionCallNode, MistralGateway, Quote};
pub use plugin::{HttpSandbox, PluginNode};
pub use stability::{StabilityClient, StabilityTextToImageNode};

use async_trait::async_trait;
use routecore::{
    BackendError, FlowStore, ImageGenerator, ModelGateway, NodeContext, NodeError, Plugin,
    SandboxRuntime,
};
use routeruntime::NodeRegistry;
use std::future::Future;
use std::sync::Arc;

/// Race a backend call against the node's cancellation token
pub(crate) async fn cancellable<F>(ctx: &NodeContext, call: F) -> Result<String, NodeError>
where
    F: Future<Output = Result<String, BackendError>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancellation.cancelled() => Err(NodeError::Cancelled),
        result = call => Ok(result?),
    }
}

/// External services the built-in nodes depend on
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn FlowStore>,
    pub sandbox: Arc<dyn SandboxRuntime>,
    pub images: Arc<dyn ImageGenerator>,
    pub model: Arc<dyn ModelGateway>,
}

impl Backends {
    /// Every backend fails with a fatal "not configured" error
    pub fn unconfigured(store: Arc<dyn FlowStore>) -> Self {
        Self {
            store,
            sandbox: Arc::new(Unconfigured("sandbox")),
            images: Arc::new(Unconfigured("image generator")),
            model: Arc::new(Unconfigured("model gateway")),
        }
    }
}

/// Stand-in for a backend whose credentials are missing
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
    fn error(&self) -> BackendError {
        BackendError::Fatal(format!("{} is not configured", self.0))
    }
}

#[async_trait]
impl SandboxRuntime for Unconfigured {
    async fn invoke(&self, _plugin: &Plugin, _input: &str) -> Result<String, BackendError> {
        Err(self.error())
    }
}

#[async_trait]
impl ImageGenerator for Unconfigured {
    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        Err(self.error())
    }
}

#[async_trait]
impl ModelGateway for Unconfigured {
    async fn call(
        &self,
        _gateway: &str,
        _model: &str,
        _input: &str,
    ) -> Result<String, BackendError> {
        Err(self.error())
    }
}

/// Register all built-in nodes with a registry
pub fn register_all(registry: &mut NodeRegistry, backends: &Backends) {
    registry.register(Arc::new(echo::EchoNodeFactory));
    registry.register(Arc::new(plugin::PluginNodeFactory::new(
        Arc::clone(&backends.store),
        Arc::clone(&backends.sandbox),
    )));
    registry.register(Arc::new(stability::StabilityTextToImageNodeFactory::new(
        Arc::clone(&backends.images),
    )));
    registry.register(Arc::new(finnhub::FinnhubFunctionCallNodeFactory::new(
        Arc::clone(&backends.model),
    )));
}
