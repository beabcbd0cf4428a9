use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// One node's full output, delivered as it is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Position of the producing node in its flow
    pub index: usize,
    pub node_name: String,
    pub content: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Sink closed")]
    Closed,

    #[error("Sink did not accept chunk within {ms}ms")]
    Timeout { ms: u64 },

    #[error("Sink failed: {0}")]
    Failed(String),
}

/// Caller-supplied destination for streamed output
///
/// Failures here never fail the pipeline; the executor logs and moves on.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn emit(&self, chunk: OutputChunk) -> Result<(), SinkError>;
}

/// Bounded channel sink; the caller consumes the paired receiver
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<OutputChunk>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<OutputChunk>) -> Self {
        Self { sender }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutputChunk>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn emit(&self, chunk: OutputChunk) -> Result<(), SinkError> {
        self.sender.send(chunk).await.map_err(|_| SinkError::Closed)
    }
}

/// Discards every chunk
pub struct NullSink;

#[async_trait]
impl OutputSink for NullSink {
    async fn emit(&self, _chunk: OutputChunk) -> Result<(), SinkError> {
        Ok(())
    }
}
