// crates/routeruntime/tests/resolver_test.rs

use async_trait::async_trait;
use futures::future::join_all;
use routecore::{
    Flow, FlowId, FlowStore, NodeSpec, Plugin, PluginId, PluginSpec, RouteLabel, RunError,
    StoreError,
};
use routeruntime::{FlowResolver, MemoryStore, RouteAction, RouteTable};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn resolver(store: Arc<dyn FlowStore>) -> FlowResolver {
    FlowResolver::new(store, Arc::new(RouteTable::builtin().unwrap()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_resolutions_create_one_flow() {
    let store = Arc::new(MemoryStore::new());
    let resolver = Arc::new(resolver(store.clone()));

    let tasks = (0..16).map(|_| {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.resolve(RouteLabel::Finance, None).await })
    });
    let flows: Vec<Flow> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(store.flow_count().await, 1);
    assert!(flows.iter().all(|f| f.id == flows[0].id));
    assert_eq!(flows[0].name, "Financial Analysis");
    assert_eq!(flows[0].nodes.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_zipcode_resolutions_create_one_plugin() {
    let store = Arc::new(MemoryStore::new());
    let resolver = Arc::new(resolver(store.clone()));

    let tasks = (0..16).map(|_| {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.resolve(RouteLabel::Zipcode, None).await })
    });
    let flows: Vec<Flow> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(store.flow_count().await, 1);
    assert_eq!(store.plugin_count().await, 1);

    let plugin = store
        .find_plugin_by_name("World Zipcode Finder")
        .await
        .unwrap()
        .unwrap();
    let node = &flows[0].nodes[0];
    assert_eq!(node.node_type, "plugin");
    assert_eq!(node.config_str("plugin_id"), Some(plugin.id.to_string().as_str()));
}

#[tokio::test]
async fn test_finance_routes_share_one_flow() {
    let store = Arc::new(MemoryStore::new());
    let resolver = resolver(store.clone());

    let price = resolver.resolve(RouteLabel::BitcoinPrice, None).await.unwrap();
    let finance = resolver.resolve(RouteLabel::Finance, None).await.unwrap();

    assert_eq!(price.id, finance.id);
    assert_eq!(store.flow_names().await, ["Financial Analysis"]);
}

/// Hides the first successful lookup, as if another process created the
/// flow between our read and our insert
struct StaleReadStore {
    inner: MemoryStore,
    stale: AtomicBool,
}

#[async_trait]
impl FlowStore for StaleReadStore {
    async fn find_flow_by_name(&self, name: &str) -> Result<Option<Flow>, StoreError> {
        if self.stale.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.find_flow_by_name(name).await
    }

    async fn create_flow(&self, name: &str) -> Result<Flow, StoreError> {
        self.inner.create_flow(name).await
    }

    async fn append_node(&self, flow_id: FlowId, node: NodeSpec) -> Result<NodeSpec, StoreError> {
        self.inner.append_node(flow_id, node).await
    }

    async fn create_flow_with_nodes(
        &self,
        name: &str,
        nodes: Vec<NodeSpec>,
    ) -> Result<Flow, StoreError> {
        self.inner.create_flow_with_nodes(name, nodes).await
    }

    async fn find_plugin_by_name(&self, name: &str) -> Result<Option<Plugin>, StoreError> {
        self.inner.find_plugin_by_name(name).await
    }

    async fn find_plugin(&self, id: PluginId) -> Result<Option<Plugin>, StoreError> {
        self.inner.find_plugin(id).await
    }

    async fn create_plugin(&self, spec: PluginSpec) -> Result<Plugin, StoreError> {
        self.inner.create_plugin(spec).await
    }
}

#[tokio::test]
async fn test_duplicate_on_create_refetches_existing_flow() {
    let inner = MemoryStore::new();
    let existing = inner
        .create_flow_with_nodes(
            "Image Generator",
            vec![NodeSpec::new("Image Generator", "stability_text_to_image")],
        )
        .await
        .unwrap();
    let store = Arc::new(StaleReadStore {
        inner,
        stale: AtomicBool::new(true),
    });

    let flow = resolver(store.clone())
        .resolve(RouteLabel::MakeAnImageOf, None)
        .await
        .unwrap();

    assert_eq!(flow.id, existing.id);
    assert_eq!(store.inner.flow_count().await, 1);
}

/// Store without an atomic create-with-nodes; creation yields between the
/// flow insert and the node append, and `append_node` can be told to fail once
struct PlainStore {
    inner: MemoryStore,
    fail_next_append: AtomicBool,
}

impl PlainStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_next_append: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FlowStore for PlainStore {
    async fn find_flow_by_name(&self, name: &str) -> Result<Option<Flow>, StoreError> {
        self.inner.find_flow_by_name(name).await
    }

    async fn create_flow(&self, name: &str) -> Result<Flow, StoreError> {
        let flow = self.inner.create_flow(name).await?;
        tokio::task::yield_now().await;
        Ok(flow)
    }

    async fn append_node(&self, flow_id: FlowId, node: NodeSpec) -> Result<NodeSpec, StoreError> {
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("conn reset".into()));
        }
        self.inner.append_node(flow_id, node).await
    }

    async fn find_plugin_by_name(&self, name: &str) -> Result<Option<Plugin>, StoreError> {
        self.inner.find_plugin_by_name(name).await
    }

    async fn find_plugin(&self, id: PluginId) -> Result<Option<Plugin>, StoreError> {
        self.inner.find_plugin(id).await
    }

    async fn create_plugin(&self, spec: PluginSpec) -> Result<Plugin, StoreError> {
        self.inner.create_plugin(spec).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_step_store_never_yields_nodeless_flow() {
    let store = Arc::new(PlainStore::new());
    let resolver = Arc::new(resolver(store.clone()));

    let tasks = (0..32).map(|_| {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move { resolver.resolve(RouteLabel::Finance, None).await })
    });
    let flows: Vec<Flow> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert!(flows.iter().all(|f| f.nodes.len() == 1));
    assert!(flows.iter().all(|f| f.id == flows[0].id));

    let stored = store
        .inner
        .find_flow_by_name("Financial Analysis")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.nodes.len(), 1);
    assert_eq!(stored.nodes[0].node_type, "finnhub_function_call");
}

#[tokio::test]
async fn test_half_created_flow_is_completed_on_next_resolve() {
    let store = Arc::new(PlainStore::new());
    store.fail_next_append.store(true, Ordering::SeqCst);
    let resolver = resolver(store.clone());

    let first = resolver.resolve(RouteLabel::MakeAnImageOf, None).await;
    assert!(matches!(first, Err(RunError::Store(StoreError::Backend(_)))));
    let orphan = store
        .inner
        .find_flow_by_name("Image Generator")
        .await
        .unwrap()
        .unwrap();
    assert!(orphan.nodes.is_empty());

    let second = resolver.resolve(RouteLabel::MakeAnImageOf, None).await.unwrap();
    assert_eq!(second.id, orphan.id);
    assert_eq!(second.nodes.len(), 1);
    assert_eq!(second.nodes[0].node_type, "stability_text_to_image");

    let third = resolver.resolve(RouteLabel::MakeAnImageOf, None).await.unwrap();
    assert_eq!(third, second);
}

#[tokio::test]
async fn test_bound_and_canned_routes() {
    let store = Arc::new(MemoryStore::new());
    let resolver = resolver(store.clone());
    let bound = Flow::new("Chat");

    let flow = resolver.resolve(RouteLabel::Bitcoin, Some(&bound)).await.unwrap();
    assert_eq!(flow.id, bound.id);

    assert!(matches!(
        resolver.resolve(RouteLabel::Bitcoin, None).await,
        Err(RunError::UnresolvedFlow {
            route: RouteLabel::Bitcoin
        })
    ));
    assert!(matches!(
        resolver.resolve(RouteLabel::CraigWrightSatoshi, Some(&bound)).await,
        Err(RunError::UnresolvedFlow { .. })
    ));
    assert_eq!(store.flow_count().await, 0);
}

#[tokio::test]
async fn test_ensure_exists_returns_stored_flow_unchanged() {
    let store = Arc::new(MemoryStore::new());
    let table = RouteTable::builtin().unwrap();
    let RouteAction::Flow(template) = table.action(RouteLabel::MakeAnImageOf).clone() else {
        panic!("expected a flow action");
    };
    let resolver = FlowResolver::new(store.clone(), Arc::new(table));

    let first = resolver.ensure_exists(&template).await.unwrap();
    let second = resolver.ensure_exists(&template).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.nodes[0].description, "Generates an image via the Stability API");
}
