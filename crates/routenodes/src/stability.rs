use crate::transport::send_json;
use async_trait::async_trait;
use routecore::{BackendError, ImageGenerator, Node, NodeContext, NodeError, NodeKind, NodeSpec};
use routeruntime::{NodeFactory, NodeMetadata};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STABILITY_URL: &str = "https://api.stability.ai";
pub const DEFAULT_ENGINE: &str = "stable-diffusion-xl-1024-v1-0";

/// Turns the input prompt into an image reference
pub struct StabilityTextToImageNode {
    images: Arc<dyn ImageGenerator>,
}

#[async_trait]
impl Node for StabilityTextToImageNode {
    fn kind(&self) -> NodeKind {
        NodeKind::StabilityTextToImage
    }

    async fn execute(&self, ctx: NodeContext) -> Result<String, NodeError> {
        let prompt = ctx.input.trim();
        if prompt.is_empty() {
            return Err(NodeError::Configuration("Empty image prompt".into()));
        }

        ctx.events.info(format!("Generating image for {} chars of prompt", prompt.len()));
        crate::cancellable(&ctx, self.images.generate(prompt)).await
    }
}

pub struct StabilityTextToImageNodeFactory {
    images: Arc<dyn ImageGenerator>,
}

impl StabilityTextToImageNodeFactory {
    pub fn new(images: Arc<dyn ImageGenerator>) -> Self {
        Self { images }
    }
}

impl NodeFactory for StabilityTextToImageNodeFactory {
    fn create(&self, _spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(StabilityTextToImageNode {
            images: Arc::clone(&self.images),
        }))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::StabilityTextToImage
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Generates an image via the Stability API".to_string(),
            category: "image".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct GenerationResponse {
    artifacts: Vec<Artifact>,
}

#[derive(Deserialize)]
struct Artifact {
    base64: String,
}

/// Stability text-to-image REST client
pub struct StabilityClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    engine: String,
    timeout: Duration,
}

impl StabilityClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_STABILITY_URL.to_string(),
            engine: DEFAULT_ENGINE.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/generation/{}/text-to-image",
            self.base_url.trim_end_matches('/'),
            self.engine
        )
    }
}

#[async_trait]
impl ImageGenerator for StabilityClient {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let request = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "text_prompts": [{ "text": prompt }],
                "samples": 1,
            }));

        let response: GenerationResponse = send_json(request).await?;
        let artifact = response
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Fatal("Stability returned no artifacts".into()))?;

        Ok(format!("data:image/png;base64,{}", artifact.base64))
    }
}
