use routecore::{ConfigError, NodeId, NodeKind, NodeSpec, PluginSpec, RouteLabel};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Route table format version this build understands
pub const ROUTE_TABLE_VERSION: u32 = 1;

/// The route table compiled into the binary
pub const BUILTIN_ROUTES: &str = include_str!("../routes.toml");

static BOUND: RouteAction = RouteAction::Bound;

/// Versioned mapping from route labels to what a run should do
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RouteTable {
    pub version: u32,
    #[serde(default)]
    pub default_route: RouteLabel,
    #[serde(default)]
    pub shortcuts: Vec<ShortcutRule>,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

/// Literal phrase that forces a route before the semantic router runs
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ShortcutRule {
    pub phrase: String,
    pub route: RouteLabel,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RouteEntry {
    pub label: RouteLabel,
    /// Example inputs the semantic router learns this route from
    #[serde(default)]
    pub utterances: Vec<String>,
    pub action: RouteAction,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteAction {
    /// Use the flow already bound to the run
    Bound,
    /// Answer with a fixed string; no flow is resolved or executed
    Canned { response: String },
    /// Get-or-create the named flow from this template
    Flow(FlowTemplate),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FlowTemplate {
    pub flow: String,
    pub node: NodeTemplate,
    /// Plugin ensured before the flow; its id lands in the node's `plugin_id`
    #[serde(default)]
    pub plugin: Option<PluginSpec>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeTemplate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub node_type: NodeKind,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl FlowTemplate {
    /// Id of the template's node, derived from the flow and node names
    ///
    /// Every resolver appends the node under the same id, so a store that
    /// rejects duplicate node ids keeps the flow at one node.
    pub fn node_id(&self) -> NodeId {
        let key = format!("{}/{}", self.flow, self.node.name);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }
}

impl NodeTemplate {
    pub fn to_spec(&self) -> NodeSpec {
        let mut spec = NodeSpec::new(&self.name, self.node_type.tag())
            .with_description(&self.description);
        spec.config = self.config.clone();
        spec
    }
}

impl RouteTable {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let table: RouteTable =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str(BUILTIN_ROUTES)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != ROUTE_TABLE_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported route table version {} (expected {})",
                self.version, ROUTE_TABLE_VERSION
            )));
        }

        for rule in &self.shortcuts {
            if rule.phrase.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "empty shortcut phrase for route '{}'",
                    rule.route
                )));
            }
        }

        let mut seen = HashSet::new();
        let mut flows: HashMap<&str, &FlowTemplate> = HashMap::new();

        for entry in &self.routes {
            if !seen.insert(entry.label) {
                return Err(ConfigError::Invalid(format!(
                    "route '{}' is listed twice",
                    entry.label
                )));
            }

            match &entry.action {
                RouteAction::Bound => {}
                RouteAction::Canned { response } => {
                    if response.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "canned route '{}' has an empty response",
                            entry.label
                        )));
                    }
                }
                RouteAction::Flow(template) => {
                    let is_plugin = template.node.node_type == NodeKind::Plugin;
                    if is_plugin != template.plugin.is_some() {
                        return Err(ConfigError::Invalid(format!(
                            "route '{}': plugin nodes need a plugin, \
                             and only plugin nodes may have one",
                            entry.label
                        )));
                    }
                    // One canonical template per flow name, otherwise creation order
                    // decides the flow
                    if let Some(existing) = flows.insert(&template.flow, template) {
                        if existing != template {
                            return Err(ConfigError::Invalid(format!(
                                "flow '{}' is defined differently by more than one route",
                                template.flow
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Action for `label`; labels without an entry use the bound flow
    pub fn action(&self, label: RouteLabel) -> &RouteAction {
        self.entry(label).map(|e| &e.action).unwrap_or(&BOUND)
    }

    pub fn entry(&self, label: RouteLabel) -> Option<&RouteEntry> {
        self.routes.iter().find(|e| e.label == label)
    }
}
