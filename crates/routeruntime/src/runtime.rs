use crate::retry::{with_retry, Attempt};
use crate::{
    EmbeddingGateway, FlowResolver, NodeRegistry, PipelineContext, PipelineExecutor,
    RouteAction, RouteTable, SemanticRouter, ShortcutClassifier,
};
use chrono::Utc;
use routecore::{
    ConfigError, EventBus, ExecutionEvent, FlowStore, OutputSink, RetryPolicy, RouteLabel,
    Run, RunError, RunState,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Configuration for the runtime
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_buffer_size: usize,
    /// How long the executor waits for the sink to take one chunk
    pub sink_timeout_ms: u64,
    pub node_timeout_ms: Option<u64>,
    /// Router scores below this fall back to the default route
    pub min_similarity: f32,
    pub embedding_retry: RetryPolicy,
    pub node_retry: RetryPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            sink_timeout_ms: 2_000,
            node_timeout_ms: Some(120_000),
            min_similarity: 0.2,
            embedding_retry: RetryPolicy::default(),
            node_retry: RetryPolicy::default(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    runtime: RuntimeConfig,
}

impl RuntimeConfig {
    /// Parse the `[runtime]` table of a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(file.runtime)
    }
}

/// Routes input to a flow and executes it
///
/// One instance serves many concurrent runs; share it behind an `Arc`.
pub struct RouteRuntime {
    gateway: Arc<dyn EmbeddingGateway>,
    router: SemanticRouter,
    shortcuts: ShortcutClassifier,
    table: Arc<RouteTable>,
    resolver: FlowResolver,
    executor: PipelineExecutor,
    registry: Arc<NodeRegistry>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
}

impl RouteRuntime {
    /// Build a runtime, training the router from the table's utterances
    pub async fn build(
        config: RuntimeConfig,
        table: RouteTable,
        registry: NodeRegistry,
        store: Arc<dyn FlowStore>,
        gateway: Arc<dyn EmbeddingGateway>,
    ) -> Result<Self, RunError> {
        let router = SemanticRouter::train(
            gateway.as_ref(),
            &table,
            config.min_similarity,
            &config.embedding_retry,
        )
        .await?;
        Ok(Self::with_router(config, table, registry, store, gateway, router))
    }

    /// Build a runtime around an already trained router
    pub fn with_router(
        config: RuntimeConfig,
        table: RouteTable,
        registry: NodeRegistry,
        store: Arc<dyn FlowStore>,
        gateway: Arc<dyn EmbeddingGateway>,
        router: SemanticRouter,
    ) -> Self {
        let table = Arc::new(table);
        let executor = PipelineExecutor::new(
            Duration::from_millis(config.sink_timeout_ms),
            config.node_timeout_ms.map(Duration::from_millis),
            config.node_retry.clone(),
        );

        Self {
            gateway,
            router,
            shortcuts: ShortcutClassifier::new(table.shortcuts.clone()),
            resolver: FlowResolver::new(store, Arc::clone(&table)),
            table,
            executor,
            registry: Arc::new(registry),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Classify `input`, returning the route and whether a shortcut decided it
    pub async fn classify(
        &self,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<(RouteLabel, bool), RunError> {
        if let Some(route) = self.shortcuts.classify(input) {
            return Ok((route, true));
        }

        let gateway = self.gateway.as_ref();
        let vector = with_retry(
            &self.config.embedding_retry,
            cancel,
            "embed input",
            |_, _| {},
            || gateway.embed(input),
        )
        .await
        .map_err(|e| match e {
            Attempt::Failed(err) => RunError::Gateway(err),
            Attempt::Cancelled => RunError::Cancelled,
        })?;

        Ok((self.router.route(&vector)?, false))
    }

    /// Run the pipeline for `run`, streaming node output to `sink`
    ///
    /// Returns the concatenated output of every node, or the canned response
    /// for short-circuited routes.
    pub async fn trigger(
        &self,
        run: &mut Run,
        sink: &dyn OutputSink,
        cancel: CancellationToken,
    ) -> Result<String, RunError> {
        let start = Instant::now();
        self.event_bus.emit(ExecutionEvent::RunStarted {
            execution_id: run.id,
            timestamp: Utc::now(),
        });
        tracing::info!(run_id = %run.id, agent = %run.agent.name, "Triggering run");

        let result = self.drive(run, sink, &cancel).await;

        match &result {
            Ok(_) => {}
            Err(RunError::Cancelled) => {
                run.advance(RunState::Cancelled);
                tracing::info!(run_id = %run.id, "Run cancelled");
            }
            Err(e) => {
                run.advance(RunState::Failed);
                tracing::error!(run_id = %run.id, error = %e, "Run failed");
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        self.event_bus.emit(ExecutionEvent::RunCompleted {
            execution_id: run.id,
            outcome: run.state,
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    async fn drive(
        &self,
        run: &mut Run,
        sink: &dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<String, RunError> {
        let (route, shortcut) = self.classify(&run.input, cancel).await?;
        run.advance(RunState::Routed);
        self.event_bus.emit(ExecutionEvent::Routed {
            execution_id: run.id,
            route,
            shortcut,
            timestamp: Utc::now(),
        });
        tracing::info!(run_id = %run.id, %route, shortcut, "Routed input");

        if let RouteAction::Canned { response } = self.table.action(route) {
            run.advance(RunState::ShortCircuited);
            self.event_bus.emit(ExecutionEvent::ShortCircuited {
                execution_id: run.id,
                route,
                timestamp: Utc::now(),
            });
            run.advance(RunState::Completed);
            return Ok(response.clone());
        }

        // Store I/O is a cancellation point
        let flow = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RunError::Cancelled),
            flow = self.resolver.resolve(route, run.flow.as_ref()) => flow?,
        };
        if run.flow.is_none() {
            run.flow = Some(flow.clone());
        }

        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }

        run.advance(RunState::Executing);
        let ctx = PipelineContext {
            execution_id: run.id,
            agent: run.agent.clone(),
            thread: run.thread.clone(),
            input: run.input.clone(),
        };
        let output = self
            .executor
            .run(&flow, ctx, &self.registry, &self.event_bus, sink, cancel)
            .await?;

        run.advance(RunState::Completed);
        Ok(output)
    }
}
