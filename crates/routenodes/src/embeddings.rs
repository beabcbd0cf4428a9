use crate::transport::{send_json, to_gateway_error};
use async_trait::async_trait;
use routecore::GatewayError;
use routeruntime::EmbeddingGateway;
use serde::Deserialize;
use std::time::Duration;

pub const MISTRAL_EMBED_MODEL: &str = "mistral-embed";
pub const MISTRAL_EMBED_DIMENSION: usize = 1024;

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Mistral embeddings endpoint
pub struct MistralEmbeddings {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl MistralEmbeddings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: crate::finnhub::DEFAULT_MISTRAL_URL.to_string(),
            model: MISTRAL_EMBED_MODEL.to_string(),
            dimension: MISTRAL_EMBED_DIMENSION,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl EmbeddingGateway for MistralEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "input": [text],
            }));

        let response: EmbeddingResponse = send_json(request)
            .await
            .map_err(|e| to_gateway_error(e, self.timeout))?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| GatewayError::Rejected("Empty embedding response".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mistral"
    }
}
