//! # agent-runtime
//!
//! Runtime side of local-agent.
//!
//! ## Modules
//!
//! - **openai**: `ExecutionRuntime` over an OpenAI-compatible
//!   `chat/completions` endpoint, plus health and model queries
//! - **sse**: event-stream parsing for streamed completions
//! - **exa**: Exa search REST client
//! - **search_tools**: `web_search` / `get_page_content` tools and their source
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{OpenAiRuntime, WebSearchSource};
//!
//! let settings = Settings::load()?;
//! let agent = Agent::builder()
//!     .runtime(Arc::new(OpenAiRuntime::new(&settings)?))
//!     .tool_source(WebSearchSource)
//!     .settings(settings)
//!     .build()?;
//! ```

pub mod exa;
pub mod openai;
pub mod search_tools;
pub mod sse;

pub use exa::{ExaClient, SearchError};
pub use openai::{ConnectionReport, OpenAiRuntime};
pub use search_tools::{PageContentTool, WebSearchSource, WebSearchTool};

// Re-export core types for convenience
pub use agent_core::{
    Agent, AgentError, ExecutionRuntime, Message, Result, Role, RunEvent, RunResult, Settings,
    Tool, ToolRegistry,
};
