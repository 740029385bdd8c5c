//! Execution Runtime
//!
//! The seam between the agent facade and whatever executes a model run.
//! A runtime takes instructions, a user message and a tool list, drives the
//! model (including any tool-call loop) and hands back a [`RunResult`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_core::runtime::{ExecutionRuntime, RunRequest};
//!
//! let request = RunRequest::new("gpt-oss-120b", instructions, "Hello", tools);
//! let result = runtime.run(&request).await?;
//! ```

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::run_result::RunResult;
use crate::tool::Tool;

/// Everything a runtime needs for one run
#[derive(Clone)]
pub struct RunRequest {
    /// Model identifier
    pub model: String,

    /// System instructions
    pub instructions: String,

    /// User message
    pub input: String,

    /// Tools offered to the model
    pub tools: Vec<Arc<dyn Tool>>,
}

impl RunRequest {
    pub fn new(
        model: impl Into<String>,
        instructions: impl Into<String>,
        input: impl Into<String>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            input: input.into(),
            tools,
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.schema().name).collect()
    }
}

impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("model", &self.model)
            .field("instructions_len", &self.instructions.len())
            .field("input", &self.input)
            .field("tools", &self.tool_names())
            .finish()
    }
}

/// Incremental event from a streamed run
#[derive(Clone, Debug, PartialEq)]
pub enum RunEvent {
    /// Answer text delta
    TextDelta(String),

    /// Reasoning text delta
    ReasoningDelta(String),

    /// Model asked for a tool
    ToolInvoked { name: String, arguments: String },

    /// Tool finished; output as handed back to the model
    ToolCompleted { name: String, output: String },

    /// Run finished; always the last event
    Completed(RunResult),
}

/// Stream type for streamed runs
pub type RunEventStream = Pin<Box<dyn Stream<Item = Result<RunEvent>> + Send>>;

/// Information about a served model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,

    #[serde(default)]
    pub owned_by: Option<String>,
}

/// Strategy trait for model-execution runtimes
///
/// The agent facade works exclusively through this interface.
#[async_trait]
pub trait ExecutionRuntime: Send + Sync {
    /// Check if the inference endpoint is reachable
    async fn health_check(&self) -> bool;

    /// List models served by the endpoint
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Execute one run to completion
    async fn run(&self, request: &RunRequest) -> Result<RunResult>;

    /// Execute one run, yielding deltas as they arrive
    async fn run_streamed(&self, request: RunRequest) -> Result<RunEventStream>;
}
