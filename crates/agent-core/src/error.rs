//! Error Types

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Inference endpoint unreachable or timed out
    #[error("Connection error: {0}")]
    Connection(String),

    /// Inference endpoint answered with a non-success status
    #[error("Server error ({status}): {message}")]
    Server {
        status: u16,
        message: String,
        body: Option<String>,
    },

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments rejected before execution
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Invalid settings
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Generic runtime failure, wrapping whatever the runtime raised
    #[error("{message}")]
    Agent {
        message: String,
        #[source]
        source: Option<Box<AgentError>>,
    },

    /// Every extraction path came up empty
    #[error("Agent completed but returned no output")]
    EmptyResponse { details: String },

    /// Runtime tool loop exceeded its turn budget
    #[error("Maximum turns ({0}) reached")]
    MaxTurns(usize),

    /// Malformed upstream payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Wrap a runtime failure into a generic agent error
    pub fn agent(message: impl Into<String>, source: AgentError) -> Self {
        AgentError::Agent {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Connection(_) | AgentError::Io(_) => true,
            AgentError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Variant name, for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Connection(_) => "Connection",
            AgentError::Server { .. } => "Server",
            AgentError::ToolNotFound(_) => "ToolNotFound",
            AgentError::ToolValidation(_) => "ToolValidation",
            AgentError::Config(_) => "Config",
            AgentError::Agent { .. } => "Agent",
            AgentError::EmptyResponse { .. } => "EmptyResponse",
            AgentError::MaxTurns(_) => "MaxTurns",
            AgentError::Parse(_) => "Parse",
            AgentError::Io(_) => "Io",
            AgentError::Json(_) => "Json",
            AgentError::Other(_) => "Other",
        }
    }

    /// Optional diagnostic details for display under the main message
    pub fn details(&self) -> Option<String> {
        match self {
            AgentError::Server { body, .. } => body.clone(),
            AgentError::EmptyResponse { details } => Some(details.clone()),
            AgentError::Agent { source: Some(source), .. } => source.details(),
            _ => None,
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Connection(_) => {
                "Cannot reach the model server. Make sure it is running.".into()
            }
            AgentError::Server { status, .. } => {
                format!("The model server returned an error (HTTP {}).", status)
            }
            AgentError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            AgentError::Config(e) => format!("Invalid configuration: {}", e),
            AgentError::EmptyResponse { .. } => {
                "The model finished without an answer. Try rephrasing your question.".into()
            }
            AgentError::MaxTurns(_) => {
                "The request took too many tool calls. Please try a simpler query.".into()
            }
            AgentError::Agent { message, .. } => message.clone(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
