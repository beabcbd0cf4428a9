use crate::registry::NodeRegistry;
use crate::retry::{with_retry, Attempt};
use chrono::Utc;
use routecore::{
    Agent, EventBus, EventEmitter, ExecutionEvent, ExecutionId, Flow, Node, NodeContext, NodeError,
    NodeEvent, OutputChunk, OutputSink, RetryPolicy, RunError, Thread,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// What a run hands to its flow's first node
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub execution_id: ExecutionId,
    pub agent: Agent,
    pub thread: Thread,
    pub input: String,
}

/// Executes a flow's nodes strictly in order
///
/// Each node's output is the next node's input and is appended to the
/// aggregate that `run` returns. Every output is also offered to the sink,
/// whose failures are logged and otherwise ignored.
pub struct PipelineExecutor {
    sink_timeout: Duration,
    node_timeout: Option<Duration>,
    retry: RetryPolicy,
}

impl PipelineExecutor {
    pub fn new(sink_timeout: Duration, node_timeout: Option<Duration>, retry: RetryPolicy) -> Self {
        Self {
            sink_timeout,
            node_timeout,
            retry,
        }
    }

    pub async fn run(
        &self,
        flow: &Flow,
        ctx: PipelineContext,
        registry: &NodeRegistry,
        event_bus: &EventBus,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<String, RunError> {
        // Instantiate everything first so a bad tag fails before any side effect
        let nodes = flow
            .nodes
            .iter()
            .map(|spec| registry.create_node(spec).map(|node| (spec, node)))
            .collect::<Result<Vec<_>, _>>()?;

        let flow_ref = Arc::new(flow.clone());
        let execution_id = ctx.execution_id;
        let mut input = ctx.input;
        let mut output = String::new();

        tracing::info!(flow = %flow.name, nodes = nodes.len(), "Executing flow");

        for (index, (spec, node)) in nodes.into_iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(flow = %flow.name, next_node = %spec.name, "Cancelled before node");
                return Err(RunError::Cancelled);
            }

            event_bus.emit(ExecutionEvent::NodeStarted {
                execution_id,
                node_id: spec.id,
                node_name: spec.name.clone(),
                node_type: node.kind().tag().to_string(),
                timestamp: Utc::now(),
            });

            let emitter = event_bus.create_emitter(execution_id, spec.id);
            let node_ctx = NodeContext {
                node_id: spec.id,
                node_name: spec.name.clone(),
                agent: ctx.agent.clone(),
                flow: Arc::clone(&flow_ref),
                thread: ctx.thread.clone(),
                input: input.clone(),
                config: spec.config.clone(),
                events: emitter.clone(),
                cancellation: cancel.child_token(),
            };

            let start = Instant::now();
            let node: &dyn Node = node.as_ref();
            let node_timeout = self.node_timeout;
            let result = with_retry(
                &self.retry,
                cancel,
                &spec.name,
                |attempt, err: &NodeError| {
                    emitter.emit(NodeEvent::Retrying {
                        attempt,
                        error: err.to_string(),
                    })
                },
                || execute_once(node, node_ctx.clone(), node_timeout),
            )
            .await;
            let duration_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(node_output) => {
                    tracing::info!("Node {} completed in {}ms", spec.name, duration_ms);
                    event_bus.emit(ExecutionEvent::NodeCompleted {
                        execution_id,
                        node_id: spec.id,
                        output_len: node_output.len(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });

                    self.deliver(
                        sink,
                        &emitter,
                        OutputChunk {
                            index,
                            node_name: spec.name.clone(),
                            content: node_output.clone(),
                        },
                    )
                    .await;

                    output.push_str(&node_output);
                    input = node_output;
                }
                Err(Attempt::Cancelled) | Err(Attempt::Failed(NodeError::Cancelled)) => {
                    tracing::info!(node = %spec.name, "Cancelled during node");
                    return Err(RunError::Cancelled);
                }
                Err(Attempt::Failed(e)) => {
                    tracing::error!("Node {} failed: {}", spec.name, e);
                    event_bus.emit(ExecutionEvent::NodeFailed {
                        execution_id,
                        node_id: spec.id,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    return Err(RunError::NodeExecution {
                        node: spec.name.clone(),
                        source: e,
                        partial_output: output,
                    });
                }
            }
        }

        Ok(output)
    }

    async fn deliver(&self, sink: &dyn OutputSink, emitter: &EventEmitter, chunk: OutputChunk) {
        let node_name = chunk.node_name.clone();
        match timeout(self.sink_timeout, sink.emit(chunk)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(node = %node_name, error = %e, "Sink rejected chunk");
                emitter.warn(format!("Output not delivered: {}", e));
            }
            Err(_) => {
                let timeout_ms = self.sink_timeout.as_millis() as u64;
                tracing::warn!(node = %node_name, timeout_ms, "Sink timed out, chunk dropped");
                emitter.warn(format!("Output dropped after {}ms sink timeout", timeout_ms));
            }
        }
    }
}

async fn execute_once(
    node: &dyn Node,
    ctx: NodeContext,
    node_timeout: Option<Duration>,
) -> Result<String, NodeError> {
    match node_timeout {
        Some(limit) => timeout(limit, node.execute(ctx))
            .await
            .unwrap_or(Err(NodeError::Timeout {
                ms: limit.as_millis() as u64,
            })),
        None => node.execute(ctx).await,
    }
}
