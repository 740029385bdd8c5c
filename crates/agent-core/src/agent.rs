//! Agent Facade
//!
//! Composes settings, tool registry, execution runtime, extractor and debug
//! logger into `chat(message) -> text`.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{Settings, ValidationError};
use crate::debug_log::DebugLogger;
use crate::error::{AgentError, Result};
use crate::extract::{Extracted, Extractor, analyze};
use crate::instructions::default_instructions;
use crate::run_result::RunResult;
use crate::runtime::{ExecutionRuntime, ModelInfo, RunEventStream, RunRequest};
use crate::tool::{Tool, ToolRegistry, ToolSource, WEB_SEARCH_CATEGORY};

/// Snapshot of the agent configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentInfo {
    pub agent_name: String,
    pub model: String,
    pub vllm_base_url: String,
    pub available_tools: Vec<String>,
    pub instructions_length: usize,
    pub debug_enabled: bool,
    pub web_search_enabled: bool,
}

/// The main Agent struct
pub struct Agent {
    runtime: Arc<dyn ExecutionRuntime>,
    registry: ToolRegistry,
    custom_instructions: Option<String>,
    extractor: Extractor,
    debug: DebugLogger,
}

impl Agent {
    /// Start building an agent
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Tools offered to the model on the next run
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        if self.settings().agent.enable_tools {
            self.registry.available_tools()
        } else {
            Vec::new()
        }
    }

    fn offers_web_search(&self) -> bool {
        self.tools()
            .iter()
            .any(|t| t.schema().category.as_deref() == Some(WEB_SEARCH_CATEGORY))
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools().iter().map(|t| t.schema().name).collect()
    }

    /// Instructions for the next run: custom ones, or the defaults for the
    /// currently offered tools
    pub fn instructions(&self) -> String {
        if let Some(custom) = &self.custom_instructions {
            return custom.clone();
        }
        default_instructions(self.offers_web_search())
    }

    /// Replace the instructions
    pub fn set_instructions(&mut self, instructions: impl Into<String>) {
        self.custom_instructions = Some(instructions.into());
        tracing::info!("Agent instructions updated");
    }

    fn request(&self, message: &str) -> RunRequest {
        RunRequest::new(
            self.settings().vllm.model.clone(),
            self.instructions(),
            message,
            self.tools(),
        )
    }

    /// Send a message and wait for the answer
    ///
    /// # Errors
    ///
    /// `AgentError::EmptyResponse` when the run produced nothing extractable;
    /// `AgentError::Agent` wrapping any runtime failure.
    pub async fn chat(&self, message: &str) -> Result<String> {
        self.begin(message);
        let request = self.request(message);

        let result = match self.runtime.run(&request).await {
            Ok(result) => result,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::info!(result = %result.describe(), "Runner completed");

        self.finish(&result)
    }

    /// Send a message and stream the run. Pass the final
    /// [`RunEvent::Completed`](crate::runtime::RunEvent::Completed) result to
    /// [`finish`](Self::finish) to obtain the answer.
    ///
    /// # Errors
    ///
    /// `AgentError::Agent` wrapping a failure to start the run. Failures
    /// later in the run arrive wrapped the same way on the stream.
    pub async fn chat_stream(&self, message: &str) -> Result<RunEventStream> {
        self.begin(message);
        let request = self.request(message);

        let stream = self
            .runtime
            .run_streamed(request)
            .await
            .map_err(|e| self.fail(e))?;
        Ok(Box::pin(stream.map(|event| event.map_err(wrap_runtime_error))))
    }

    fn begin(&self, message: &str) {
        let preview: String = message.chars().take(50).collect();
        tracing::info!(message = %preview, "Starting chat");
        self.debug.log_user_input(message);
    }

    /// Log a finished run and extract its answer
    ///
    /// # Errors
    ///
    /// `AgentError::EmptyResponse` when nothing could be extracted.
    pub fn finish(&self, result: &RunResult) -> Result<String> {
        self.debug.log_runner_result(result);
        self.log_tool_executions(result);

        match self.extractor.extract(result) {
            Extracted::Found { text, source } => {
                self.debug
                    .log_agent_response(&text, json!({ "source": format!("{source:?}") }));
                Ok(text)
            }
            Extracted::Empty => {
                let analysis = analyze(result);
                tracing::error!(
                    result_type = %analysis.result_type,
                    has_final_output = analysis.has_final_output,
                    new_items = analysis.total_items,
                    item_types = ?analysis.item_types,
                    previews = ?analysis.item_previews,
                    "Empty response"
                );

                let err = AgentError::EmptyResponse {
                    details: format!(
                        "Result had {} new_items.\n{}",
                        analysis.total_items,
                        analysis.diagnostics()
                    ),
                };
                self.debug.log_error(&err, "extract_response");
                Err(err)
            }
        }
    }

    /// Wrap runtime failures so callers can tell them apart from extraction failures
    fn fail(&self, error: AgentError) -> AgentError {
        let err = wrap_runtime_error(error);
        self.debug.log_error(&err, "chat");
        err
    }

    fn log_tool_executions(&self, result: &RunResult) {
        if !self.debug.is_enabled() {
            return;
        }
        for call in analyze(result).tool_calls {
            let Some(output) = call.output else { continue };
            let arguments = serde_json::from_str(&call.arguments)
                .unwrap_or_else(|_| Value::String(call.arguments.clone()));
            self.debug.log_tool_execution(&call.name, arguments, &output);
        }
    }

    /// Check that the inference endpoint is reachable
    pub async fn health_check(&self) -> bool {
        self.runtime.health_check().await
    }

    /// Models served by the inference endpoint
    ///
    /// # Errors
    ///
    /// Propagates runtime connection or server errors.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.runtime.list_models().await
    }

    /// Current configuration snapshot
    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            agent_name: self.settings().agent.name.clone(),
            model: self.settings().vllm.model.clone(),
            vllm_base_url: self.settings().vllm.base_url.clone(),
            available_tools: self.tool_names(),
            instructions_length: self.instructions().chars().count(),
            debug_enabled: self.settings().debug.enabled,
            web_search_enabled: self.offers_web_search(),
        }
    }

    /// Get the tool registry
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Mutable registry access, for runtime tool registration between chats
    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Settings in effect, as held by the registry
    pub fn settings(&self) -> &Settings {
        self.registry.settings()
    }

    /// Get the debug logger
    pub fn debug_logger(&self) -> &DebugLogger {
        &self.debug
    }
}

fn wrap_runtime_error(error: AgentError) -> AgentError {
    match error {
        e @ (AgentError::Agent { .. } | AgentError::EmptyResponse { .. }) => e,
        other => {
            tracing::error!(error = %other, kind = other.kind(), "Error in chat");
            AgentError::agent(format!("Chat failed: {other}"), other)
        }
    }
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    runtime: Option<Arc<dyn ExecutionRuntime>>,
    settings: Settings,
    sources: Vec<Box<dyn ToolSource>>,
    tools: Vec<(Arc<dyn Tool>, Option<String>)>,
    instructions: Option<String>,
    extractor: Extractor,
    debug: Option<DebugLogger>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            runtime: None,
            settings: Settings::default(),
            sources: Vec::new(),
            tools: Vec::new(),
            instructions: None,
            extractor: Extractor::default(),
            debug: None,
        }
    }

    pub fn runtime(mut self, runtime: Arc<dyn ExecutionRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tool_source(mut self, source: impl ToolSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Register a custom tool at build time
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push((tool, None));
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.settings.vllm.model = model.into();
        self
    }

    pub fn extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn debug_logger(mut self, debug: DebugLogger) -> Self {
        self.debug = Some(debug);
        self
    }

    /// # Errors
    ///
    /// Returns `AgentError::Config` when no runtime was supplied.
    pub fn build(self) -> Result<Agent> {
        let runtime = self
            .runtime
            .ok_or_else(|| AgentError::Config(ValidationError::MissingRequired("runtime").into()))?;

        let custom_instructions = self.instructions.or_else(|| self.settings.agent.instructions.clone());
        let debug = self
            .debug
            .unwrap_or_else(|| DebugLogger::new(&self.settings.debug));

        let mut registry = ToolRegistry::new(self.settings);
        for source in self.sources {
            registry.add_source(source);
        }
        registry.discover();
        for (tool, name) in self.tools {
            registry.register(tool, name.as_deref());
        }

        let agent = Agent {
            runtime,
            registry,
            custom_instructions,
            extractor: self.extractor,
            debug,
        };

        tracing::info!(model = %agent.settings().vllm.model, "Agent initialized");
        tracing::info!(tools = ?agent.tool_names(), "Available tools");

        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::StreamExt;

    use crate::config::DebugConfig;
    use crate::run_result::RunItem;
    use crate::runtime::RunEvent;
    use crate::tool::{ToolCall, ToolSchema};

    #[derive(Default)]
    struct MockRuntime {
        result: Mutex<Option<Result<RunResult>>>,
        seen: Mutex<Vec<RunRequest>>,
    }

    impl MockRuntime {
        fn returning(result: Result<RunResult>) -> Arc<Self> {
            Arc::new(Self {
                result: Mutex::new(Some(result)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ExecutionRuntime for MockRuntime {
        async fn health_check(&self) -> bool {
            true
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>> {
            Ok(vec![ModelInfo { id: "gpt-oss-120b".into(), owned_by: None }])
        }

        async fn run(&self, request: &RunRequest) -> Result<RunResult> {
            self.seen.lock().unwrap().push(request.clone());
            self.result.lock().unwrap().take().unwrap_or_else(|| Ok(RunResult::default()))
        }

        async fn run_streamed(&self, request: RunRequest) -> Result<RunEventStream> {
            let result = self.run(&request).await?;
            let events = vec![
                Ok(RunEvent::TextDelta("Hel".into())),
                Ok(RunEvent::TextDelta("lo".into())),
                Ok(RunEvent::Completed(result)),
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    struct SearchStub;

    #[async_trait]
    impl Tool for SearchStub {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "web_search".into(),
                description: "Search".into(),
                parameters: Vec::new(),
                category: Some(WEB_SEARCH_CATEGORY.into()),
                requires: Some("exa_api_key".into()),
            }
        }

        async fn invoke(&self, _call: &ToolCall) -> String {
            "results".into()
        }
    }

    struct StubSource;

    impl ToolSource for StubSource {
        fn discover(&self, _settings: &Settings) -> Vec<Arc<dyn Tool>> {
            vec![Arc::new(SearchStub)]
        }
    }

    fn agent(runtime: Arc<MockRuntime>, settings: Settings) -> Agent {
        Agent::builder()
            .runtime(runtime)
            .settings(settings)
            .tool_source(StubSource)
            .debug_logger(DebugLogger::disabled())
            .build()
            .unwrap()
    }

    fn searchable() -> Settings {
        let mut settings = Settings::default();
        settings.exa.api_key = Some("real-key".into());
        settings
    }

    #[tokio::test]
    async fn test_chat_returns_extracted_text() {
        let runtime = MockRuntime::returning(Ok(RunResult {
            new_items: vec![RunItem::message("Paris is the capital of France.")],
            ..RunResult::default()
        }));
        let agent = agent(Arc::clone(&runtime), searchable());

        let answer = agent.chat("Capital of France?").await.unwrap();
        assert_eq!(answer, "Paris is the capital of France.");

        let seen = runtime.seen.lock().unwrap();
        assert_eq!(seen[0].input, "Capital of France?");
        assert_eq!(seen[0].tool_names(), vec!["web_search"]);
        assert!(seen[0].instructions.contains("get_page_content"));
    }

    #[tokio::test]
    async fn test_unavailable_tools_are_not_offered() {
        let runtime = MockRuntime::returning(Ok(RunResult::with_final_output("ok")));
        let agent = agent(Arc::clone(&runtime), Settings::default());

        agent.chat("hi").await.unwrap();

        let seen = runtime.seen.lock().unwrap();
        assert!(seen[0].tools.is_empty());
        assert!(!seen[0].instructions.contains("get_page_content"));
    }

    #[test]
    fn test_info_follows_registry_settings() {
        let loaded = Settings::load_from(std::iter::empty::<(String, String)>()).unwrap();
        let mut agent = agent(MockRuntime::returning(Ok(RunResult::default())), loaded.clone());
        assert!(!agent.info().web_search_enabled);

        let mut updated = loaded;
        updated.exa.api_key = Some("real-key".into());
        agent.registry_mut().set_settings(updated);
        agent.registry_mut().refresh();

        let info = agent.info();
        assert_eq!(info.available_tools, vec!["web_search"]);
        assert!(info.web_search_enabled);
        assert_eq!(agent.settings().exa.api_key.as_deref(), Some("real-key"));
        assert!(agent.instructions().contains("get_page_content"));
    }

    #[tokio::test]
    async fn test_empty_result_raises_typed_error() {
        let runtime = MockRuntime::returning(Ok(RunResult {
            new_items: vec![RunItem::reasoning("Let me think about this problem first.")],
            ..RunResult::default()
        }));
        let agent = agent(runtime, Settings::default());

        let err = agent.chat("hi").await.unwrap_err();
        let AgentError::EmptyResponse { details } = &err else {
            panic!("expected empty response, got {err:?}");
        };
        assert!(details.starts_with("Result had 1 new_items."));
        assert!(details.contains("reasoning_item=1"));
        assert_eq!(err.to_string(), "Agent completed but returned no output");
    }

    #[tokio::test]
    async fn test_runtime_failure_is_wrapped() {
        let runtime = MockRuntime::returning(Err(AgentError::Server {
            status: 500,
            message: "internal".into(),
            body: Some("boom".into()),
        }));
        let agent = agent(runtime, Settings::default());

        let err = agent.chat("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::Agent { .. }));
        assert_eq!(err.to_string(), "Chat failed: Server error (500): internal");
        assert_eq!(err.details().as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_stream_then_finish() {
        let runtime = MockRuntime::returning(Ok(RunResult::with_final_output("Hello")));
        let agent = agent(runtime, Settings::default());

        let mut stream = agent.chat_stream("hi").await.unwrap();
        let mut text = String::new();
        let mut answer = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                RunEvent::TextDelta(delta) => text.push_str(&delta),
                RunEvent::Completed(result) => answer = Some(agent.finish(&result).unwrap()),
                _ => {}
            }
        }
        assert_eq!(text, "Hello");
        assert_eq!(answer.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_debug_files_for_exchange() {
        let dir = tempfile::tempdir().unwrap();
        let debug = DebugLogger::with_session_id(
            &DebugConfig { enabled: true, log_dir: dir.path().to_path_buf(), keep_sessions: 10 },
            "20250101_000000",
        );
        let runtime = MockRuntime::returning(Ok(RunResult {
            new_items: vec![
                RunItem::tool_call("web_search", r#"{"query":"rust"}"#, Some("c1".into())),
                RunItem::tool_output(Some("c1".into()), "results"),
                RunItem::message("Rust is a language."),
            ],
            ..RunResult::default()
        }));
        let agent = Agent::builder()
            .runtime(runtime)
            .debug_logger(debug)
            .build()
            .unwrap();

        agent.chat("What is Rust?").await.unwrap();

        let summary = agent.debug_logger().session_summary();
        assert_eq!(
            summary.log_files,
            vec![
                "20250101_000000_msg001_input.json",
                "20250101_000000_msg001_response.json",
                "20250101_000000_msg001_runner_result.json",
                "20250101_000000_msg001_tool_web_search.json",
            ]
        );
    }

    #[test]
    fn test_info_and_custom_instructions() {
        let mut agent = agent(MockRuntime::returning(Ok(RunResult::default())), searchable());

        let info = agent.info();
        assert_eq!(info.agent_name, "GPT-OSS Assistant");
        assert_eq!(info.available_tools, vec!["web_search"]);
        assert!(info.web_search_enabled);
        assert_eq!(info.instructions_length, default_instructions(true).chars().count());

        agent.set_instructions("Be brief.");
        assert_eq!(agent.info().instructions_length, 9);
    }

    #[test]
    fn test_builder_requires_runtime() {
        assert!(matches!(
            Agent::builder().debug_logger(DebugLogger::disabled()).build(),
            Err(AgentError::Config(_))
        ));
    }
}
