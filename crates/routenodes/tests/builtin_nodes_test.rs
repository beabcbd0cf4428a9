// crates/routenodes/tests/builtin_nodes_test.rs

use async_trait::async_trait;
use routecore::{
    Agent, BackendError, EventBus, ExecutionEvent, Flow, FlowStore, GatewayError, ImageGenerator,
    ModelGateway, Node, NodeContext, NodeError, NodeEvent, NodeSpec, OutputChunk, OutputSink,
    Plugin, RetryPolicy, RouteLabel, Run, RunError, RunState, SandboxRuntime, SinkError, Thread,
};
use routenodes::{register_all, Backends};
use routeruntime::{
    EmbeddingGateway, MemoryStore, NodeRegistry, RouteRuntime, RouteTable, RuntimeConfig,
    SemanticRouter,
};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingSink {
    chunks: Mutex<Vec<OutputChunk>>,
}

#[async_trait]
impl OutputSink for RecordingSink {
    async fn emit(&self, chunk: OutputChunk) -> Result<(), SinkError> {
        self.chunks.lock().unwrap().push(chunk);
        Ok(())
    }
}

impl RecordingSink {
    fn contents(&self) -> Vec<String> {
        self.chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.content.clone())
            .collect()
    }
}

/// Model gateway that records its arguments and answers with a fixed string
struct FakeModel {
    answer: String,
    calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl ModelGateway for FakeModel {
    async fn call(&self, gateway: &str, model: &str, input: &str) -> Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((gateway.into(), model.into(), input.into()));
        Ok(self.answer.clone())
    }
}

struct FakeImages {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("data:image/png;base64,c3Vuc2V0".to_string())
    }
}

struct FakeSandbox {
    invocations: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SandboxRuntime for FakeSandbox {
    async fn invoke(&self, plugin: &Plugin, input: &str) -> Result<String, BackendError> {
        self.invocations
            .lock()
            .unwrap()
            .push((plugin.name.clone(), input.to_string()));
        Ok("Beverly Hills, CA".to_string())
    }
}

struct FixedGateway {
    vector: Vec<f32>,
}

#[async_trait]
impl EmbeddingGateway for FixedGateway {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(self.vector.clone())
    }

    fn dimension(&self) -> usize {
        self.vector.len()
    }
}

const PRICE: [f32; 3] = [1.0, 0.0, 0.0];
const ZIP: [f32; 3] = [0.0, 1.0, 0.0];
const CHAT: [f32; 3] = [0.0, 0.0, 1.0];

fn no_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        delay_ms: 1,
        backoff_multiplier: 1.0,
        max_delay_ms: 1,
    }
}

struct Harness {
    runtime: RouteRuntime,
    store: Arc<MemoryStore>,
    model: Arc<FakeModel>,
    images: Arc<FakeImages>,
    sandbox: Arc<FakeSandbox>,
}

fn harness(vector: [f32; 3]) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let model = Arc::new(FakeModel {
        answer: "Bitcoin is trading at $67,000.".to_string(),
        calls: Mutex::new(Vec::new()),
    });
    let images = Arc::new(FakeImages {
        prompts: Mutex::new(Vec::new()),
    });
    let sandbox = Arc::new(FakeSandbox {
        invocations: Mutex::new(Vec::new()),
    });

    let backends = Backends {
        store: store.clone(),
        sandbox: sandbox.clone(),
        images: images.clone(),
        model: model.clone(),
    };
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, &backends);

    let mut router = SemanticRouter::new(3, RouteLabel::Bitcoin).with_min_similarity(0.5);
    router.add_route(RouteLabel::BitcoinPrice, &[PRICE.to_vec()]).unwrap();
    router.add_route(RouteLabel::Zipcode, &[ZIP.to_vec()]).unwrap();
    router.add_route(RouteLabel::Bitcoin, &[CHAT.to_vec()]).unwrap();

    let config = RuntimeConfig {
        node_timeout_ms: None,
        min_similarity: 0.5,
        embedding_retry: no_retry(),
        node_retry: no_retry(),
        ..RuntimeConfig::default()
    };
    let runtime = RouteRuntime::with_router(
        config,
        RouteTable::builtin().unwrap(),
        registry,
        store.clone(),
        Arc::new(FixedGateway {
            vector: vector.to_vec(),
        }),
        router,
    );

    Harness {
        runtime,
        store,
        model,
        images,
        sandbox,
    }
}

fn run(input: &str) -> Run {
    Run::new(Agent::new("satoshi"), Thread::new(), input)
}

#[tokio::test]
async fn test_bitcoin_price_calls_model_once_and_streams_answer() {
    let h = harness(PRICE);
    let sink = RecordingSink::default();
    let mut run = run("What's the bitcoin price today?");

    let output = h
        .runtime
        .trigger(&mut run, &sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "Bitcoin is trading at $67,000.");
    assert_eq!(sink.contents(), ["Bitcoin is trading at $67,000."]);
    assert_eq!(run.state, RunState::Completed);

    let calls = h.model.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        [(
            "mistral".to_string(),
            "mistral-large-latest".to_string(),
            "What's the bitcoin price today?".to_string()
        )]
    );
    assert_eq!(h.store.flow_names().await, ["Financial Analysis"]);
}

#[tokio::test]
async fn test_image_shortcut_returns_image_reference() {
    // Embedding would say "zipcode"; the shortcut wins
    let h = harness(ZIP);
    let sink = RecordingSink::default();
    let mut run = run("make an image of a sunset");

    let output = h
        .runtime
        .trigger(&mut run, &sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "data:image/png;base64,c3Vuc2V0");
    assert_eq!(*h.images.prompts.lock().unwrap(), ["make an image of a sunset"]);
    assert!(h.sandbox.invocations.lock().unwrap().is_empty());
    assert_eq!(h.store.flow_names().await, ["Image Generator"]);
}

#[tokio::test]
async fn test_zipcode_route_invokes_stored_plugin() {
    let h = harness(ZIP);
    let mut run = run("where is 90210");

    let output = h
        .runtime
        .trigger(&mut run, &RecordingSink::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "Beverly Hills, CA");
    assert_eq!(
        *h.sandbox.invocations.lock().unwrap(),
        [("World Zipcode Finder".to_string(), "where is 90210".to_string())]
    );
    assert_eq!(h.store.plugin_count().await, 1);
}

#[tokio::test]
async fn test_default_route_runs_bound_echo_flow() {
    let h = harness(CHAT);
    let bound = Flow::new("Passthrough").with_node(NodeSpec::new("Echo", "echo"));
    let mut run = run("tell me about bitcoin").with_flow(bound);

    let output = h
        .runtime
        .trigger(&mut run, &RecordingSink::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output, "tell me about bitcoin");
    assert_eq!(h.store.flow_count().await, 0);
}

#[tokio::test]
async fn test_plugin_node_without_plugin_id_fails_before_running() {
    let h = harness(CHAT);
    let bound = Flow::new("Broken").with_node(NodeSpec::new("Zip", "plugin"));
    let mut run = run("hello").with_flow(bound);

    let err = h
        .runtime
        .trigger(&mut run, &RecordingSink::default(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::NodeExecution { ref node, .. } if node == "Zip"));
    assert!(h.sandbox.invocations.lock().unwrap().is_empty());
    assert_eq!(run.state, RunState::Failed);
}

#[tokio::test]
async fn test_unconfigured_backends_fail_fatally() {
    let store: Arc<dyn FlowStore> = Arc::new(MemoryStore::new());
    let backends = Backends::unconfigured(store);

    let err = backends.model.call("mistral", "m", "hi").await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Fatal("model gateway is not configured".to_string())
    );
    assert!(!backends.images.generate("x").await.unwrap_err().is_transient());
}

#[test]
fn test_register_all_covers_every_kind() {
    let store: Arc<dyn FlowStore> = Arc::new(MemoryStore::new());
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, &Backends::unconfigured(store));

    assert_eq!(registry.list_node_kinds(), routecore::NodeKind::ALL.to_vec());
    for kind in registry.list_node_kinds() {
        assert!(!registry.get_metadata(kind).unwrap().description.is_empty());
    }
}

/// Image backend that never answers
struct HangingImages;

#[async_trait]
impl ImageGenerator for HangingImages {
    async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
        std::future::pending::<()>().await;
        Ok(String::new())
    }
}

fn node_context(bus: &EventBus, input: &str, cancellation: CancellationToken) -> NodeContext {
    let spec = NodeSpec::new("node", "echo");
    let run = Run::new(Agent::new("satoshi"), Thread::new(), input);
    NodeContext {
        node_id: spec.id,
        node_name: spec.name.clone(),
        agent: run.agent.clone(),
        flow: Arc::new(Flow::new("Direct").with_node(spec.clone())),
        thread: run.thread.clone(),
        input: input.to_string(),
        config: spec.config.clone(),
        events: bus.create_emitter(run.id, spec.id),
        cancellation,
    }
}

fn build(backends: &Backends, node_type: &str) -> Box<dyn Node> {
    let mut registry = NodeRegistry::new();
    register_all(&mut registry, backends);
    registry.create_node(&NodeSpec::new("node", node_type)).unwrap()
}

#[tokio::test]
async fn test_backend_call_stops_when_node_is_cancelled() {
    let store: Arc<dyn FlowStore> = Arc::new(MemoryStore::new());
    let mut backends = Backends::unconfigured(store);
    backends.images = Arc::new(HangingImages);
    let node = build(&backends, "stability_text_to_image");

    let bus = EventBus::new(16);
    let cancellation = CancellationToken::new();
    let ctx = node_context(&bus, "make an image of a sunset", cancellation.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cancellation.cancel();
    });

    let err = node.execute(ctx).await.unwrap_err();
    canceller.await.unwrap();
    assert_eq!(err, NodeError::Cancelled);
}

#[tokio::test]
async fn test_empty_model_answer_emits_warning() {
    let store: Arc<dyn FlowStore> = Arc::new(MemoryStore::new());
    let mut backends = Backends::unconfigured(store);
    backends.model = Arc::new(FakeModel {
        answer: "  ".to_string(),
        calls: Mutex::new(Vec::new()),
    });
    let node = build(&backends, "finnhub_function_call");

    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let output = node
        .execute(node_context(&bus, "btc?", CancellationToken::new()))
        .await
        .unwrap();
    assert_eq!(output, "  ");

    let mut warnings = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ExecutionEvent::NodeEvent {
            event: NodeEvent::Warning { message },
            ..
        } = event
        {
            warnings.push(message);
        }
    }
    assert_eq!(warnings, ["mistral-large-latest returned an empty answer"]);
}
