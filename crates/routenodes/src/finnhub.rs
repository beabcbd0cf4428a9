use crate::transport::send_json;
use async_trait::async_trait;
use routecore::{BackendError, ModelGateway, Node, NodeContext, NodeError, NodeKind, NodeSpec};
use routeruntime::{NodeFactory, NodeMetadata};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_GATEWAY: &str = "mistral";
pub const DEFAULT_MODEL: &str = "mistral-large-latest";
pub const DEFAULT_MISTRAL_URL: &str = "https://api.mistral.ai";
pub const DEFAULT_FINNHUB_URL: &str = "https://finnhub.io";

const QUOTE_TOOL: &str = "get_stock_quote";

/// Answers financial questions through a function-calling model
pub struct FinnhubFunctionCallNode {
    model: Arc<dyn ModelGateway>,
}

#[async_trait]
impl Node for FinnhubFunctionCallNode {
    fn kind(&self) -> NodeKind {
        NodeKind::FinnhubFunctionCall
    }

    async fn execute(&self, ctx: NodeContext) -> Result<String, NodeError> {
        let gateway = ctx.config_str_or("gateway", DEFAULT_GATEWAY);
        let model = ctx.config_str_or("model", DEFAULT_MODEL);

        ctx.events.info(format!("Calling {} via {}", model, gateway));
        let answer = crate::cancellable(&ctx, self.model.call(gateway, model, &ctx.input)).await?;
        if answer.trim().is_empty() {
            ctx.events.warn(format!("{} returned an empty answer", model));
        }
        Ok(answer)
    }
}

pub struct FinnhubFunctionCallNodeFactory {
    model: Arc<dyn ModelGateway>,
}

impl FinnhubFunctionCallNodeFactory {
    pub fn new(model: Arc<dyn ModelGateway>) -> Self {
        Self { model }
    }
}

impl NodeFactory for FinnhubFunctionCallNodeFactory {
    fn create(&self, spec: &NodeSpec) -> Result<Box<dyn Node>, NodeError> {
        for key in ["gateway", "model"] {
            if let Some(value) = spec.config.get(key) {
                if !value.is_string() {
                    return Err(NodeError::Configuration(format!(
                        "'{}' must be a string",
                        key
                    )));
                }
            }
        }

        Ok(Box::new(FinnhubFunctionCallNode {
            model: Arc::clone(&self.model),
        }))
    }

    fn kind(&self) -> NodeKind {
        NodeKind::FinnhubFunctionCall
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Answers market questions with live Finnhub quotes".to_string(),
            category: "finance".to_string(),
        }
    }
}

/// Current quote for one symbol as returned by Finnhub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(rename = "c")]
    pub current: f64,
    #[serde(rename = "d", default)]
    pub change: Option<f64>,
    #[serde(rename = "dp", default)]
    pub percent_change: Option<f64>,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "pc")]
    pub previous_close: f64,
}

pub struct FinnhubClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FinnhubClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_FINNHUB_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn quote(&self, symbol: &str) -> Result<Quote, BackendError> {
        let url = format!("{}/api/v1/quote", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())]);
        send_json(request).await
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize, Serialize, Clone)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize, Serialize, Clone)]
struct ToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Deserialize, Serialize, Clone)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct QuoteArgs {
    symbol: String,
}

/// Mistral chat completions with an optional Finnhub quote tool
///
/// When quotes are available the model may request one round of
/// `get_stock_quote` calls; the results are sent back and the second reply
/// is returned verbatim.
pub struct MistralGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    quotes: Option<FinnhubClient>,
    timeout: Duration,
}

impl MistralGateway {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_MISTRAL_URL.to_string(),
            quotes: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_quotes(mut self, quotes: FinnhubClient) -> Self {
        self.quotes = Some(quotes);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn complete(&self, body: Value) -> Result<AssistantMessage, BackendError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(url)
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(&body);

        let response: ChatResponse = send_json(request).await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| BackendError::Fatal("Model returned no choices".into()))
    }

    async fn run_tool(&self, quotes: &FinnhubClient, call: &ToolCall) -> String {
        if call.function.name != QUOTE_TOOL {
            return json!({ "error": format!("unknown tool {}", call.function.name) }).to_string();
        }
        let args: QuoteArgs = match serde_json::from_str(&call.function.arguments) {
            Ok(args) => args,
            Err(e) => return json!({ "error": format!("bad arguments: {}", e) }).to_string(),
        };

        debug!(symbol = %args.symbol, "Fetching quote");
        match quotes.quote(&args.symbol).await {
            Ok(quote) => serde_json::to_string(&quote).unwrap_or_default(),
            Err(e) => json!({ "error": e.to_string() }).to_string(),
        }
    }
}

fn quote_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": QUOTE_TOOL,
            "description": "Get the current price quote for a stock or crypto symbol",
            "parameters": {
                "type": "object",
                "properties": {
                    "symbol": {
                        "type": "string",
                        "description": "Ticker symbol, e.g. AAPL or BINANCE:BTCUSDT"
                    }
                },
                "required": ["symbol"]
            }
        }
    })
}

#[async_trait]
impl ModelGateway for MistralGateway {
    async fn call(&self, gateway: &str, model: &str, input: &str) -> Result<String, BackendError> {
        if gateway != DEFAULT_GATEWAY {
            return Err(BackendError::Fatal(format!("Unsupported gateway: {}", gateway)));
        }

        let mut messages = vec![json!({ "role": "user", "content": input })];
        let mut body = json!({ "model": model, "messages": messages });
        if self.quotes.is_some() {
            body["tools"] = json!([quote_tool()]);
            body["tool_choice"] = json!("auto");
        }

        let reply = self.complete(body).await?;
        let quotes = match (&self.quotes, reply.tool_calls.is_empty()) {
            (Some(quotes), false) => quotes,
            _ => return Ok(reply.content.unwrap_or_default()),
        };

        messages.push(json!({
            "role": "assistant",
            "content": reply.content.clone().unwrap_or_default(),
            "tool_calls": reply.tool_calls,
        }));
        for call in &reply.tool_calls {
            let result = self.run_tool(quotes, call).await;
            messages.push(json!({
                "role": "tool",
                "name": call.function.name,
                "content": result,
                "tool_call_id": call.id,
            }));
        }

        let followup = self
            .complete(json!({ "model": model, "messages": messages }))
            .await?;
        Ok(followup.content.unwrap_or_default())
    }
}
