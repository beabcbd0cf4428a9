//! Narrow contracts for the external services nodes call into.

use crate::Plugin;
use async_trait::async_trait;
use thiserror::Error;

/// Failure shape shared by every node backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Worth retrying: 5xx, rate limits, dropped connections
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal failure: {0}")]
    Fatal(String),

    #[error("request timed out")]
    Timeout,
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_) | BackendError::Timeout)
    }

    /// Classify an HTTP status the way every HTTP backend does
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if status == 429 || status >= 500 {
            BackendError::Transient(format!("HTTP {}: {}", status, body))
        } else {
            BackendError::Fatal(format!("HTTP {}: {}", status, body))
        }
    }
}

/// Executes a plugin inside an external sandbox
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    async fn invoke(&self, plugin: &Plugin, input: &str) -> Result<String, BackendError>;
}

/// Text-to-image generation; returns an image reference such as a data URI
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Function-calling model gateway
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn call(&self, gateway: &str, model: &str, input: &str) -> Result<String, BackendError>;
}
