//! # agent-core
//!
//! Core of a conversational agent front-end for locally served models:
//! settings, tool registry, response extraction and the agent facade.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Agent                               │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │  Extractor  │  │    Tool     │  │  ExecutionRuntime    │  │
//! │  │             │──│  Registry   │──│  (Strategy)          │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! │                   ┌─────────────┐                            │
//! │                   │ DebugLogger │                            │
//! │                   └─────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ExecutionRuntime` trait hides how a run is executed; the agent only
//! sees the resulting [`RunResult`] and recovers the answer from it.

pub mod agent;
pub mod config;
pub mod debug_log;
pub mod error;
pub mod extract;
pub mod instructions;
pub mod message;
pub mod run_result;
pub mod runtime;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentInfo};
pub use config::Settings;
pub use debug_log::DebugLogger;
pub use error::{AgentError, Result};
pub use extract::{Extracted, Extractor, extract};
pub use message::{Message, Role};
pub use run_result::RunResult;
pub use runtime::{ExecutionRuntime, RunEvent, RunRequest};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSource};
