//! Tool System
//!
//! Tools are named, described callables exposed to the model. They always
//! answer with a string: failures are rendered as `Error: ...` text for the
//! model to read, never raised.
//!
//! The [`ToolRegistry`] discovers tools from [`ToolSource`]s, tracks runtime
//! registrations and recomputes availability on every query.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::error::{AgentError, Result};

/// Category of tools backed by the search provider
pub const WEB_SEARCH_CATEGORY: &str = "web_search";

/// Category assigned to tools registered at runtime
pub const CUSTOM_CATEGORY: &str = "custom";

/// Tool outputs longer than this are truncated before reaching the model
pub const MAX_RESULT_CHARS: usize = 10_000;

/// Tool call request from the model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    pub arguments: HashMap<String, serde_json::Value>,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    /// Parse the JSON argument string sent by the model
    ///
    /// # Errors
    ///
    /// Returns `AgentError::ToolValidation` when the arguments are not a JSON object.
    pub fn from_json(
        name: impl Into<String>,
        arguments: &str,
        id: Option<String>,
    ) -> Result<Self> {
        let name = name.into();
        let arguments = if arguments.trim().is_empty() {
            HashMap::new()
        } else {
            serde_json::from_str(arguments).map_err(|e| {
                AgentError::ToolValidation(format!("Invalid arguments for {name}: {e}"))
            })?
        };
        Ok(Self { name, arguments, id })
    }

    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    pub fn int_arg(&self, key: &str) -> Option<i64> {
        self.arguments.get(key).and_then(serde_json::Value::as_i64)
    }

    /// List-of-strings argument; `null` and missing are both `None`
    pub fn str_list_arg(&self, key: &str) -> Option<Vec<String>> {
        self.arguments.get(key).and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    /// Whether the tool actually ran
    pub success: bool,

    /// Text handed back to the model
    pub output: String,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: format!("Error: {}", error.into()),
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, integer, boolean, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,

    /// Element type for array parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
}

impl ParameterSchema {
    pub fn required(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: true,
            default: None,
            items: None,
        }
    }

    pub fn optional(name: &str, param_type: &str, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, param_type, description)
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_items(mut self, item_type: &str) -> Self {
        self.items = Some(item_type.into());
        self
    }
}

/// Tool definition schema (for model function calling)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping and availability rules
    #[serde(default)]
    pub category: Option<String>,

    /// Credential the tool depends on, for status display
    #[serde(default)]
    pub requires: Option<String>,
}

impl ToolSchema {
    /// Render in the OpenAI `tools` array format
    pub fn to_function_json(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = serde_json::json!({
                "type": param.param_type,
                "description": param.description,
            });
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            if let Some(items) = &param.items {
                prop["items"] = serde_json::json!({ "type": items });
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(param.name.clone());
            }
        }

        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for model function calling
    fn schema(&self) -> ToolSchema;

    /// Self-reported availability; registry rules may still disable the tool
    fn is_available(&self) -> bool {
        true
    }

    /// Execute the tool. Errors are part of the returned text.
    async fn invoke(&self, call: &ToolCall) -> String;

    /// Validate arguments before execution (optional)
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let schema = self.schema();

        for param in &schema.parameters {
            if param.required && !call.arguments.contains_key(&param.name) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// Cap a tool output at `max_chars` characters, appending a marker
pub fn truncate_result(output: String, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output;
    }
    let kept: String = output.chars().take(max_chars).collect();
    format!("{kept}... [Result truncated from {total} to {max_chars} characters]")
}

/// Look up, validate and run a tool call against a tool list
///
/// Never fails: unknown tools and invalid arguments come back as an
/// unsuccessful result whose output explains the problem.
pub async fn dispatch(tools: &[Arc<dyn Tool>], call: &ToolCall) -> ToolResult {
    let Some(tool) = tools.iter().find(|t| t.schema().name == call.name) else {
        tracing::warn!(tool = %call.name, "Model requested unknown tool");
        let error = AgentError::ToolNotFound(call.name.clone());
        return ToolResult::failure(&call.name, error.to_string()).with_id(call.id.clone());
    };

    if let Err(e) = tool.validate(call) {
        tracing::warn!(tool = %call.name, error = %e, "Tool arguments rejected");
        return ToolResult::failure(&call.name, e.to_string()).with_id(call.id.clone());
    }

    tracing::info!(tool = %call.name, "Executing tool");
    let output = truncate_result(tool.invoke(call).await, MAX_RESULT_CHARS);
    tracing::debug!(tool = %call.name, chars = output.len(), "Tool execution completed");

    ToolResult::success(&call.name, output).with_id(call.id.clone())
}

/// A provider of discoverable tools
pub trait ToolSource: Send + Sync {
    /// Tools offered by this source; availability is decided by the registry
    fn discover(&self, settings: &Settings) -> Vec<Arc<dyn Tool>>;
}

/// Whether a tool came from discovery or a runtime registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    FunctionTool,
    Custom,
}

/// Status snapshot of one registry entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub category: String,
    pub requires: Option<String>,
    #[serde(rename = "type")]
    pub kind: ToolKind,
}

/// Per-category counts in a registry summary
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub total: usize,
    pub available: usize,
}

/// Registry-wide summary
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    pub total_tools: usize,
    pub available_tools: usize,
    pub categories: BTreeMap<String, CategoryCount>,
    pub tool_names: Vec<String>,
    pub available_tool_names: Vec<String>,
}

struct Entry {
    name: String,
    tool: Arc<dyn Tool>,
    kind: ToolKind,
}

/// Registry of tools, owned by the agent facade
pub struct ToolRegistry {
    settings: Settings,
    sources: Vec<Box<dyn ToolSource>>,
    entries: Vec<Entry>,
}

impl ToolRegistry {
    /// Create an empty registry; call [`discover`](Self::discover) to populate
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            sources: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Add a tool source consulted by discovery
    pub fn with_source(mut self, source: impl ToolSource + 'static) -> Self {
        self.add_source(Box::new(source));
        self
    }

    /// Add a boxed tool source consulted by discovery
    pub fn add_source(&mut self, source: Box<dyn ToolSource>) {
        self.sources.push(source);
    }

    /// Settings used for availability decisions
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings, e.g. after a credential was supplied.
    /// Availability follows immediately; call [`refresh`](Self::refresh) to
    /// also re-run discovery.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Populate from all sources. Re-discovering a name replaces it in place.
    pub fn discover(&mut self) {
        tracing::info!("Discovering available tools...");

        let discovered: Vec<Arc<dyn Tool>> = self
            .sources
            .iter()
            .flat_map(|source| source.discover(&self.settings))
            .collect();

        for tool in discovered {
            let name = tool.schema().name;
            tracing::debug!(tool = %name, "Registered tool");
            self.insert(Entry {
                name,
                tool,
                kind: ToolKind::FunctionTool,
            });
        }

        let available = self.available_tools().len();
        tracing::info!(
            available,
            total = self.entries.len(),
            "Tool discovery complete"
        );
    }

    /// Drop every entry, custom registrations included, and re-discover
    pub fn refresh(&mut self) {
        tracing::info!("Refreshing tool registry...");
        self.entries.clear();
        self.discover();
    }

    fn insert(&mut self, entry: Entry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn category_of(entry: &Entry) -> String {
        match entry.kind {
            ToolKind::Custom => CUSTOM_CATEGORY.to_string(),
            ToolKind::FunctionTool => entry
                .tool
                .schema()
                .category
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }

    fn entry_available(&self, entry: &Entry) -> bool {
        if !entry.tool.is_available() {
            return false;
        }
        match entry.kind {
            ToolKind::Custom => true,
            ToolKind::FunctionTool => {
                Self::category_of(entry) != WEB_SEARCH_CATEGORY || self.settings.exa.is_available()
            }
        }
    }

    fn status_of(&self, entry: &Entry) -> ToolStatus {
        let schema = entry.tool.schema();
        ToolStatus {
            name: entry.name.clone(),
            description: schema.description,
            available: self.entry_available(entry),
            category: Self::category_of(entry),
            requires: schema.requires,
            kind: entry.kind,
        }
    }

    /// Currently available tools, in discovery order
    pub fn available_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.entries
            .iter()
            .filter(|e| self.entry_available(e))
            .map(|e| Arc::clone(&e.tool))
            .collect()
    }

    /// Get a tool by name regardless of availability
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.tool))
    }

    /// Whether a tool exists and is available
    pub fn is_available(&self, name: &str) -> bool {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .is_some_and(|e| self.entry_available(e))
    }

    /// Status of one tool, or of every tool when `name` is `None`
    pub fn status(&self, name: Option<&str>) -> Vec<ToolStatus> {
        self.entries
            .iter()
            .filter(|e| name.is_none_or(|n| e.name == n))
            .map(|e| self.status_of(e))
            .collect()
    }

    /// Available tools in a category
    pub fn tools_by_category(&self, category: &str) -> Vec<Arc<dyn Tool>> {
        self.entries
            .iter()
            .filter(|e| Self::category_of(e) == category && self.entry_available(e))
            .map(|e| Arc::clone(&e.tool))
            .collect()
    }

    /// Register a custom tool, optionally under a different name
    pub fn register(&mut self, tool: Arc<dyn Tool>, name: Option<&str>) {
        let name = name.map_or_else(|| tool.schema().name, str::to_string);
        tracing::info!(tool = %name, "Registered custom tool");
        self.insert(Entry {
            name,
            tool,
            kind: ToolKind::Custom,
        });
    }

    /// Remove a tool; returns whether it existed
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        let removed = self.entries.len() != before;
        if removed {
            tracing::info!(tool = %name, "Unregistered tool");
        }
        removed
    }

    /// Names of all tools, in discovery order
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Totals, per-category counts and names
    pub fn summary(&self) -> RegistrySummary {
        let statuses = self.status(None);
        let mut categories: BTreeMap<String, CategoryCount> = BTreeMap::new();
        for status in &statuses {
            let count = categories.entry(status.category.clone()).or_default();
            count.total += 1;
            if status.available {
                count.available += 1;
            }
        }

        RegistrySummary {
            total_tools: statuses.len(),
            available_tools: statuses.iter().filter(|s| s.available).count(),
            categories,
            tool_names: statuses.iter().map(|s| s.name.clone()).collect(),
            available_tool_names: statuses
                .iter()
                .filter(|s| s.available)
                .map(|s| s.name.clone())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PLACEHOLDER_API_KEY;

    struct EchoTool {
        name: &'static str,
        category: &'static str,
        ready: bool,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: self.name.into(),
                description: format!("{} tool", self.name),
                parameters: vec![ParameterSchema::required("text", "string", "Text to echo")],
                category: Some(self.category.into()),
                requires: (self.category == WEB_SEARCH_CATEGORY).then(|| "exa_api_key".into()),
            }
        }

        fn is_available(&self) -> bool {
            self.ready
        }

        async fn invoke(&self, call: &ToolCall) -> String {
            call.str_arg("text").unwrap_or_default().to_string()
        }
    }

    struct SearchSource;

    impl ToolSource for SearchSource {
        fn discover(&self, _settings: &Settings) -> Vec<Arc<dyn Tool>> {
            vec![
                Arc::new(EchoTool { name: "web_search", category: WEB_SEARCH_CATEGORY, ready: true }),
                Arc::new(EchoTool { name: "get_page_content", category: WEB_SEARCH_CATEGORY, ready: true }),
            ]
        }
    }

    fn settings_with_key(key: Option<&str>) -> Settings {
        let mut settings = Settings::default();
        settings.exa.api_key = key.map(str::to_string);
        settings
    }

    fn registry(key: Option<&str>) -> ToolRegistry {
        let mut registry = ToolRegistry::new(settings_with_key(key)).with_source(SearchSource);
        registry.discover();
        registry
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.into(),
            arguments: serde_json::from_value(args).unwrap(),
            id: Some("call_1".into()),
        }
    }

    #[test]
    fn test_search_unavailable_without_real_key() {
        for key in [None, Some(""), Some(PLACEHOLDER_API_KEY)] {
            let registry = registry(key);
            assert_eq!(registry.len(), 2);
            assert!(registry.available_tools().is_empty());
            assert!(!registry.is_available("web_search"));
            assert!(registry.status(None).iter().all(|s| !s.available));
        }
    }

    #[test]
    fn test_refresh_after_supplying_key() {
        let loaded = Settings::load_from(std::iter::empty::<(String, String)>()).unwrap();
        let mut registry = ToolRegistry::new(loaded.clone()).with_source(SearchSource);
        registry.discover();
        assert!(!registry.is_available("web_search"));

        let mut updated = loaded;
        updated.exa.api_key = Some("real-key".into());
        registry.set_settings(updated);
        registry.refresh();

        assert!(registry.is_available("web_search"));
        assert!(registry.is_available("get_page_content"));
        let names: Vec<String> = registry.available_tools().iter().map(|t| t.schema().name).collect();
        assert_eq!(names, vec!["web_search", "get_page_content"]);
    }

    #[test]
    fn test_discover_and_refresh_are_idempotent() {
        let mut registry = registry(Some("real-key"));
        let first = registry.status(None);

        registry.discover();
        assert_eq!(registry.status(None), first);

        registry.refresh();
        registry.refresh();
        assert_eq!(registry.status(None), first);
    }

    #[test]
    fn test_feature_flag_disables_search() {
        let mut settings = settings_with_key(Some("real-key"));
        settings.exa.enabled = false;
        let mut registry = ToolRegistry::new(settings).with_source(SearchSource);
        registry.discover();
        assert!(!registry.is_available("web_search"));
    }

    #[test]
    fn test_custom_tools() {
        let mut registry = registry(None);
        registry.register(
            Arc::new(EchoTool { name: "echo", category: "text", ready: true }),
            None,
        );
        registry.register(
            Arc::new(EchoTool { name: "echo", category: "text", ready: false }),
            Some("sleepy"),
        );

        let echo = &registry.status(Some("echo"))[0];
        assert!(echo.available);
        assert_eq!(echo.category, CUSTOM_CATEGORY);
        assert_eq!(echo.kind, ToolKind::Custom);
        assert!(!registry.is_available("sleepy"));
        assert_eq!(registry.tools_by_category(CUSTOM_CATEGORY).len(), 1);

        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));

        registry.refresh();
        assert!(registry.get("sleepy").is_none());
    }

    #[test]
    fn test_summary() {
        let mut registry = registry(Some("real-key"));
        registry.register(
            Arc::new(EchoTool { name: "echo", category: "text", ready: true }),
            None,
        );

        let summary = registry.summary();
        assert_eq!(summary.total_tools, 3);
        assert_eq!(summary.available_tools, 3);
        assert_eq!(summary.categories[WEB_SEARCH_CATEGORY], CategoryCount { total: 2, available: 2 });
        assert_eq!(summary.categories[CUSTOM_CATEGORY], CategoryCount { total: 1, available: 1 });
        assert_eq!(summary.tool_names, vec!["web_search", "get_page_content", "echo"]);
    }

    #[test]
    fn test_function_json() {
        let schema = ToolSchema {
            name: "web_search".into(),
            description: "Search".into(),
            parameters: vec![
                ParameterSchema::required("query", "string", "Query"),
                ParameterSchema::optional("num_results", "integer", "Count").with_default(serde_json::json!(5)),
                ParameterSchema::optional("include_domains", "array", "Domains").with_items("string"),
            ],
            category: Some(WEB_SEARCH_CATEGORY.into()),
            requires: None,
        };

        let json = schema.to_function_json();
        assert_eq!(json["function"]["name"], "web_search");
        assert_eq!(json["function"]["parameters"]["required"], serde_json::json!(["query"]));
        assert_eq!(json["function"]["parameters"]["properties"]["num_results"]["default"], 5);
        assert_eq!(
            json["function"]["parameters"]["properties"]["include_domains"]["items"]["type"],
            "string"
        );
    }

    #[test]
    fn test_truncate_result() {
        assert_eq!(truncate_result("short".into(), 10), "short");
        let truncated = truncate_result("a".repeat(12), 10);
        assert_eq!(truncated, format!("{}... [Result truncated from 12 to 10 characters]", "a".repeat(10)));
    }

    #[tokio::test]
    async fn test_dispatch() {
        let tools: Vec<Arc<dyn Tool>> =
            vec![Arc::new(EchoTool { name: "echo", category: "text", ready: true })];

        let ok = dispatch(&tools, &call("echo", serde_json::json!({"text": "hi"}))).await;
        assert!(ok.success);
        assert_eq!(ok.output, "hi");
        assert_eq!(ok.id.as_deref(), Some("call_1"));

        let missing = dispatch(&tools, &call("echo", serde_json::json!({}))).await;
        assert!(!missing.success);
        assert!(missing.output.starts_with("Error: "));
        assert!(missing.output.contains("text"));

        let unknown = dispatch(&tools, &call("find_in_page", serde_json::json!({}))).await;
        assert!(!unknown.success);
        assert_eq!(unknown.output, "Error: Tool not found: find_in_page");
    }

    #[test]
    fn test_tool_call_from_json() {
        let call = ToolCall::from_json("web_search", r#"{"query": "rust", "num_results": 3}"#, None).unwrap();
        assert_eq!(call.str_arg("query"), Some("rust"));
        assert_eq!(call.int_arg("num_results"), Some(3));
        assert!(ToolCall::from_json("web_search", "", None).unwrap().arguments.is_empty());
        assert!(ToolCall::from_json("web_search", "not json", None).is_err());
    }
}
