// crates/routecli/src/main.rs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use routecore::{
    Agent, ChannelSink, ExecutionEvent, Flow, FlowStore, NodeEvent, NodeSpec, Run, Thread,
};
use routenodes::{
    Backends, FinnhubClient, HttpSandbox, MistralEmbeddings, MistralGateway, StabilityClient,
};
use routeruntime::{
    EmbeddingGateway, HashEmbedder, MemoryStore, NodeRegistry, RouteAction, RouteRuntime,
    RouteTable, RuntimeConfig, BUILTIN_ROUTES,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const OFFLINE_EMBEDDING_DIMENSION: usize = 512;

#[derive(Parser)]
#[command(name = "route")]
#[command(about = "Semantic routing pipeline CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route an input and run the resulting flow
    Trigger {
        /// Text to route
        input: String,

        /// Route table TOML file (defaults to the built-in table)
        #[arg(short, long)]
        routes: Option<PathBuf>,

        /// Runtime config TOML file with a [runtime] table
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Flow JSON bound to the run, used by the default route
        #[arg(short, long)]
        flow_file: Option<PathBuf>,

        /// Show debug logs and execution events
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the route table
    Routes {
        #[arg(short, long)]
        routes: Option<PathBuf>,
    },

    /// List available node types
    Nodes,

    /// Write the built-in route table to a file
    Init {
        #[arg(short, long, default_value = "routes.toml")]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Trigger {
            input,
            routes,
            config,
            flow_file,
            verbose,
        } => {
            init_logging(verbose);
            trigger(input, routes, config, flow_file, verbose).await?;
        }

        Commands::Routes { routes } => {
            print_routes(&load_table(routes.as_deref())?);
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            std::fs::write(&output, BUILTIN_ROUTES)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Created route table: {}", output.display());
        }
    }

    Ok(())
}

fn load_table(path: Option<&Path>) -> Result<RouteTable> {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(RouteTable::from_toml_str(&source)?)
        }
        None => Ok(RouteTable::builtin()?),
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(RuntimeConfig::from_toml_str(&source)?)
        }
        None => Ok(RuntimeConfig::default()),
    }
}

fn load_flow(path: Option<&Path>) -> Result<Flow> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(Flow::new("Passthrough").with_node(NodeSpec::new("Echo", "echo"))),
    }
}

fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Real backends where credentials exist, fatal stand-ins elsewhere
fn backends_from_env(store: Arc<dyn FlowStore>) -> Backends {
    let mut backends = Backends::unconfigured(store);

    if let Some(url) = env_key("SANDBOX_URL") {
        backends.sandbox = Arc::new(HttpSandbox::new(url));
    }
    if let Some(key) = env_key("STABILITY_API_KEY") {
        backends.images = Arc::new(StabilityClient::new(key));
    }
    if let Some(key) = env_key("MISTRAL_API_KEY") {
        let mut gateway = MistralGateway::new(key);
        match env_key("FINNHUB_API_KEY") {
            Some(finnhub) => gateway = gateway.with_quotes(FinnhubClient::new(finnhub)),
            None => tracing::warn!("FINNHUB_API_KEY not set; model runs without quote lookups"),
        }
        backends.model = Arc::new(gateway);
    }
    backends
}

fn embeddings_from_env() -> Arc<dyn EmbeddingGateway> {
    match env_key("MISTRAL_API_KEY") {
        Some(key) => Arc::new(MistralEmbeddings::new(key)),
        None => {
            tracing::warn!("MISTRAL_API_KEY not set; routing with offline hash embeddings");
            Arc::new(HashEmbedder::new(OFFLINE_EMBEDDING_DIMENSION))
        }
    }
}

async fn trigger(
    input: String,
    routes: Option<PathBuf>,
    config: Option<PathBuf>,
    flow_file: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let table = load_table(routes.as_deref())?;
    let config = load_config(config.as_deref())?;
    let bound = load_flow(flow_file.as_deref())?;

    let store: Arc<dyn FlowStore> = Arc::new(MemoryStore::new());
    let mut registry = NodeRegistry::new();
    routenodes::register_all(&mut registry, &backends_from_env(Arc::clone(&store)));

    let runtime =
        RouteRuntime::build(config, table, registry, store, embeddings_from_env()).await?;

    let event_task = verbose.then(|| {
        let mut events = runtime.subscribe_events();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                print_event(&event);
            }
        })
    });

    let (sink, mut chunks) = ChannelSink::channel(16);
    let printer = tokio::spawn(async move {
        while let Some(chunk) = chunks.recv().await {
            println!("[{}] {}", chunk.node_name, chunk.content);
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut run = Run::new(Agent::new("cli"), Thread::new(), input).with_flow(bound);
    let result = runtime.trigger(&mut run, &sink, cancel).await;

    drop(sink);
    printer.await.ok();
    if let Some(task) = event_task {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        task.abort();
    }

    let output = result?;
    println!();
    println!("Run {} {:?}", run.id, run.state);
    println!("{}", output);
    Ok(())
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::RunStarted { execution_id, .. } => {
            println!("> run {} started", execution_id);
        }
        ExecutionEvent::Routed { route, shortcut, .. } => {
            let via = if *shortcut { "shortcut" } else { "router" };
            println!("> routed to {} ({})", route, via);
        }
        ExecutionEvent::ShortCircuited { route, .. } => {
            println!("> {} answered with canned response", route);
        }
        ExecutionEvent::NodeStarted {
            node_name, node_type, ..
        } => {
            println!("  > node {} ({})", node_name, node_type);
        }
        ExecutionEvent::NodeCompleted {
            node_id,
            output_len,
            duration_ms,
            ..
        } => {
            println!("  > node {} produced {} bytes in {}ms", node_id, output_len, duration_ms);
        }
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ! node {} failed: {}", node_id, error);
        }
        ExecutionEvent::NodeEvent { node_id, event, .. } => match event {
            NodeEvent::Info { message } => println!("    [{}] {}", node_id, message),
            NodeEvent::Warning { message } => println!("    [{}] warning: {}", node_id, message),
            NodeEvent::Retrying { attempt, error } => {
                println!("    [{}] retry {} after: {}", node_id, attempt, error)
            }
        },
        ExecutionEvent::RunCompleted {
            outcome,
            duration_ms,
            ..
        } => {
            println!("> run finished {:?} in {}ms", outcome, duration_ms);
        }
    }
}

fn print_routes(table: &RouteTable) {
    println!("Route table v{} (default: {})", table.version, table.default_route);
    for rule in &table.shortcuts {
        println!("  shortcut {:?} -> {}", rule.phrase, rule.route);
    }
    println!();

    for entry in &table.routes {
        let action = match &entry.action {
            RouteAction::Bound => "bound flow".to_string(),
            RouteAction::Canned { response } => format!("canned {:?}", response),
            RouteAction::Flow(template) => {
                format!("flow {:?} ({})", template.flow, template.node.node_type)
            }
        };
        println!(
            "  {:<22} {} [{} utterances]",
            entry.label.as_str(),
            action,
            entry.utterances.len()
        );
    }
}

fn list_nodes() {
    println!("Available Node Types:");
    println!();

    let store: Arc<dyn FlowStore> = Arc::new(MemoryStore::new());
    let mut registry = NodeRegistry::new();
    routenodes::register_all(&mut registry, &Backends::unconfigured(store));

    for kind in registry.list_node_kinds() {
        if let Some(metadata) = registry.get_metadata(kind) {
            println!("  * {} ({})", kind, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  * {}", kind);
        }
    }
}
