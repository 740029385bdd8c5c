//! OpenAI-Compatible Runtime
//!
//! Implementation of `ExecutionRuntime` against a `chat/completions`
//! endpoint (vLLM and friends). Tool calls requested by the model are run
//! locally and fed back until the model answers in plain text or the turn
//! budget runs out. Every step is recorded into the [`RunResult`].

use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    Settings, Tool, ToolCall,
    error::{AgentError, Result},
    message::{Message, ToolCallRequest},
    run_result::{RawResponse, RunItem, RunResult},
    runtime::{ExecutionRuntime, ModelInfo, RunEvent, RunEventStream, RunRequest},
    tool::dispatch,
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::sse::{SseEvent, SseParser, TurnAccumulator};

/// Health probe timeout
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// First retry delay; doubles per attempt
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Capacity of the streamed event channel
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Default, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: AssistantMessage,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,

    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,

    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelInfo>,
}

/// One assistant reply, whether read whole or assembled from a stream
#[derive(Debug, Default)]
pub(crate) struct AssistantTurn {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl From<ChatCompletion> for AssistantTurn {
    fn from(completion: ChatCompletion) -> Self {
        let Some(choice) = completion.choices.into_iter().next() else {
            return Self::default();
        };
        Self {
            content: choice.message.content,
            reasoning: choice.message.reasoning_content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        }
    }
}

impl AssistantTurn {
    /// Some servers omit call ids; the follow-up messages need them
    fn with_call_ids(mut self) -> Self {
        for call in &mut self.tool_calls {
            if call.id.is_empty() {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }
        }
        self
    }

    /// Append this turn to the result; returns true when the run is over
    fn record(&self, result: &mut RunResult) -> bool {
        result.raw_responses.push(RawResponse::from_message(
            self.content.clone(),
            self.reasoning.clone(),
        ));

        if let Some(reasoning) = self.reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
            result.new_items.push(RunItem::reasoning(reasoning));
        }

        if !self.tool_calls.is_empty() {
            return false;
        }

        if let Some(text) = self.content.as_deref().filter(|t| !t.is_empty()) {
            result.new_items.push(RunItem::message(text));
            result.final_output = Some(Value::String(text.to_string()));
        }
        true
    }
}

/// Connection test report
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConnectionReport {
    pub server_url: String,
    pub configured_model: String,
    pub health_check_passed: bool,
    pub model_info_available: bool,
    pub available_models: Vec<String>,
    pub model_count: usize,
    pub error: Option<String>,
}

/// Chat-completions runtime
#[derive(Clone, Debug)]
pub struct OpenAiRuntime {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
    max_retries: u32,
    max_turns: usize,
    retry_delay: Duration,
}

impl OpenAiRuntime {
    /// Create from settings
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Connection` if the HTTP client cannot be built.
    pub fn new(settings: &Settings) -> Result<Self> {
        let timeout = settings.vllm.timeout();
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AgentError::Connection(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.vllm.base_url.trim_end_matches('/').to_string(),
            model: settings.vllm.model.clone(),
            timeout,
            max_retries: settings.vllm.max_retries,
            max_turns: settings.agent.max_turns,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Override the first retry delay
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Override the tool-loop turn budget
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn connection_error(&self, err: &reqwest::Error) -> AgentError {
        if err.is_timeout() {
            AgentError::Connection(format!("Request to {} timed out", self.base_url))
        } else if err.is_connect() {
            AgentError::Connection(format!("Cannot connect to {}: {err}", self.base_url))
        } else {
            AgentError::Connection(err.to_string())
        }
    }

    fn request_body(model: &str, messages: &[Message], tools: &[Value], stream: bool) -> Value {
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
        }
        body
    }

    /// POST a completion request, retrying connection failures and 5xx
    async fn post_completion(&self, body: &Value, stream: bool) -> Result<reqwest::Response> {
        let url = self.url("chat/completions");
        let mut attempt = 0;

        loop {
            let mut request = self.http.post(&url).json(body);
            if !stream {
                request = request.timeout(self.timeout);
            }

            let err = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    AgentError::Server {
                        status,
                        message: format!("Chat completion failed: HTTP {status}"),
                        body: (!body.is_empty()).then_some(body),
                    }
                }
                Err(e) => self.connection_error(&e),
            };

            if !err.is_retryable() || attempt >= self.max_retries {
                return Err(err);
            }

            attempt += 1;
            let delay = self.retry_delay * 2u32.saturating_pow(attempt - 1);
            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying chat completion"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn complete(&self, model: &str, messages: &[Message], tools: &[Value]) -> Result<AssistantTurn> {
        let body = Self::request_body(model, messages, tools, false);
        let completion: ChatCompletion = self
            .post_completion(&body, false)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("Invalid chat completion: {e}")))?;

        Ok(AssistantTurn::from(completion).with_call_ids())
    }

    /// Stream one completion, forwarding text deltas as they arrive
    ///
    /// Returns `None` when the receiving side has gone away.
    async fn complete_streamed(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[Value],
        tx: &mpsc::Sender<Result<RunEvent>>,
    ) -> Result<Option<AssistantTurn>> {
        let body = Self::request_body(model, messages, tools, true);
        let response = self.post_completion(&body, true).await?;

        let mut bytes = response.bytes_stream();
        let mut parser = SseParser::default();
        let mut acc = TurnAccumulator::default();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| self.connection_error(&e))?;
            for event in parser.push(&chunk) {
                match event {
                    SseEvent::Done => break 'read,
                    SseEvent::Data(data) => {
                        for delta in acc.apply(&data)? {
                            if tx.send(Ok(delta)).await.is_err() {
                                return Ok(None);
                            }
                        }
                    }
                }
            }
        }
        if let Some(SseEvent::Data(data)) = parser.finish() {
            for delta in acc.apply(&data)? {
                if tx.send(Ok(delta)).await.is_err() {
                    return Ok(None);
                }
            }
        }

        Ok(Some(acc.finish().with_call_ids()))
    }

    /// Run the requested tools and extend the conversation with their outputs
    async fn run_tools(
        tools: &[Arc<dyn Tool>],
        turn: AssistantTurn,
        messages: &mut Vec<Message>,
        result: &mut RunResult,
        tx: Option<&mpsc::Sender<Result<RunEvent>>>,
    ) {
        messages.push(Message::assistant_tool_calls(
            turn.content,
            turn.tool_calls.clone(),
        ));

        for call in turn.tool_calls {
            let name = call.function.name;
            let arguments = call.function.arguments;
            result
                .new_items
                .push(RunItem::tool_call(&name, &arguments, Some(call.id.clone())));
            if let Some(tx) = tx {
                let _ = tx
                    .send(Ok(RunEvent::ToolInvoked {
                        name: name.clone(),
                        arguments: arguments.clone(),
                    }))
                    .await;
            }

            let output = match ToolCall::from_json(&name, &arguments, Some(call.id.clone())) {
                Ok(parsed) => dispatch(tools, &parsed).await.output,
                Err(e) => format!("Error: {e}"),
            };

            result
                .new_items
                .push(RunItem::tool_output(Some(call.id.clone()), &output));
            if let Some(tx) = tx {
                let _ = tx
                    .send(Ok(RunEvent::ToolCompleted {
                        name,
                        output: output.clone(),
                    }))
                    .await;
            }
            messages.push(Message::tool(output, call.id));
        }
    }

    fn tool_definitions(tools: &[Arc<dyn Tool>]) -> Vec<Value> {
        tools.iter().map(|t| t.schema().to_function_json()).collect()
    }

    fn opening_messages(request: &RunRequest) -> Vec<Message> {
        vec![
            Message::system(&request.instructions),
            Message::user(&request.input),
        ]
    }

    async fn drive_stream(&self, request: RunRequest, tx: &mpsc::Sender<Result<RunEvent>>) -> Result<()> {
        let tools = Self::tool_definitions(&request.tools);
        let mut messages = Self::opening_messages(&request);
        let mut result = RunResult::default();

        for turn_number in 1..=self.max_turns {
            tracing::debug!(turn = turn_number, "Streaming completion");
            let Some(turn) = self
                .complete_streamed(&request.model, &messages, &tools, tx)
                .await?
            else {
                tracing::debug!("Stream receiver dropped, stopping run");
                return Ok(());
            };

            if turn.record(&mut result) {
                let _ = tx.send(Ok(RunEvent::Completed(result))).await;
                return Ok(());
            }
            Self::run_tools(&request.tools, turn, &mut messages, &mut result, Some(tx)).await;
        }

        Err(AgentError::MaxTurns(self.max_turns))
    }

    /// Connection test report
    pub async fn test_connection(&self) -> ConnectionReport {
        let mut report = ConnectionReport {
            server_url: self.base_url.clone(),
            configured_model: self.model.clone(),
            health_check_passed: self.health_check().await,
            ..ConnectionReport::default()
        };

        if !report.health_check_passed {
            report.error = Some(format!("Health check failed for {}", self.base_url));
            return report;
        }

        match self.list_models().await {
            Ok(models) => {
                report.model_info_available = true;
                report.model_count = models.len();
                report.available_models = models.into_iter().map(|m| m.id).collect();
            }
            Err(e) => report.error = Some(e.to_string()),
        }
        report
    }

    /// Poll the health endpoint until it answers or `max_wait` elapses
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Connection` when the server never came up.
    pub async fn wait_for_server(&self, max_wait: Duration, interval: Duration) -> Result<()> {
        let started = tokio::time::Instant::now();
        tracing::info!(url = %self.base_url, "Waiting for model server");

        loop {
            if self.health_check().await {
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model server is ready"
                );
                return Ok(());
            }
            if started.elapsed() + interval > max_wait {
                return Err(AgentError::Connection(format!(
                    "Server at {} did not become available within {}s",
                    self.base_url,
                    max_wait.as_secs()
                )));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

#[async_trait]
impl ExecutionRuntime for OpenAiRuntime {
    async fn health_check(&self) -> bool {
        match self
            .http
            .get(self.url("models"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(url = %self.base_url, error = %e, "Model server health check failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .http
            .get(self.url("models"))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.connection_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Server {
                status: status.as_u16(),
                message: format!("Failed to get model info: HTTP {}", status.as_u16()),
                body: (!body.is_empty()).then_some(body),
            });
        }

        let models: ModelList = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("Invalid model list: {e}")))?;
        Ok(models.data)
    }

    async fn run(&self, request: &RunRequest) -> Result<RunResult> {
        let tools = Self::tool_definitions(&request.tools);
        let mut messages = Self::opening_messages(request);
        let mut result = RunResult::default();

        tracing::debug!(model = %request.model, tools = tools.len(), "Starting run");
        for turn_number in 1..=self.max_turns {
            let turn = self.complete(&request.model, &messages, &tools).await?;
            tracing::debug!(
                turn = turn_number,
                tool_calls = turn.tool_calls.len(),
                "Completion received"
            );

            if turn.record(&mut result) {
                return Ok(result);
            }
            Self::run_tools(&request.tools, turn, &mut messages, &mut result, None).await;
        }

        Err(AgentError::MaxTurns(self.max_turns))
    }

    async fn run_streamed(&self, request: RunRequest) -> Result<RunEventStream> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let runtime = self.clone();

        tokio::spawn(async move {
            if let Err(e) = runtime.drive_stream(request, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
