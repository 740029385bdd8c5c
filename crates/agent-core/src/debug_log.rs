//! Debug Logger
//!
//! Dumps every exchange of a session to pretty-printed JSON files:
//! `{session}_msg{NNN}_{input,response,runner_result,tool_<name>,error}.json`.
//! Write failures are logged and swallowed; debugging must never break a chat.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::DebugConfig;
use crate::error::AgentError;
use crate::extract::analyze;
use crate::run_result::{RunResult, is_truthy, stringify};

/// Summary of the current debug session
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub enabled: bool,
    pub session_id: String,
    pub message_count: usize,
    pub log_dir: PathBuf,
    pub total_log_files: usize,
    pub log_files: Vec<String>,
}

/// Per-session JSON dump writer
#[derive(Debug)]
pub struct DebugLogger {
    enabled: bool,
    log_dir: PathBuf,
    session_id: String,
    keep_sessions: usize,
    message_count: AtomicUsize,
}

impl DebugLogger {
    /// Create a logger with a timestamp-based session id
    pub fn new(config: &DebugConfig) -> Self {
        Self::with_session_id(config, Local::now().format("%Y%m%d_%H%M%S").to_string())
    }

    /// Create a logger with an explicit session id
    pub fn with_session_id(config: &DebugConfig, session_id: impl Into<String>) -> Self {
        let logger = Self {
            enabled: config.enabled,
            log_dir: config.log_dir.clone(),
            session_id: session_id.into(),
            keep_sessions: config.keep_sessions,
            message_count: AtomicUsize::new(0),
        };

        if logger.enabled {
            tracing::info!(session = %logger.session_id, dir = %logger.log_dir.display(), "Debug logger initialized");
            logger.prune_sessions();
        } else {
            tracing::debug!("Debug logging is disabled");
        }

        logger
    }

    /// A logger that never writes
    pub fn disabled() -> Self {
        Self::with_session_id(&DebugConfig::default(), "disabled")
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn message_count(&self) -> usize {
        self.message_count.load(Ordering::SeqCst)
    }

    fn file_name(&self, suffix: &str) -> String {
        format!("{}_msg{:03}_{}.json", self.session_id, self.message_count(), suffix)
    }

    fn envelope(&self, event: &str) -> serde_json::Map<String, Value> {
        let mut data = serde_json::Map::new();
        data.insert("session_id".into(), json!(self.session_id));
        data.insert("message_count".into(), json!(self.message_count()));
        data.insert("timestamp".into(), json!(Local::now().to_rfc3339()));
        data.insert("type".into(), json!(event));
        data
    }

    fn write(&self, suffix: &str, data: serde_json::Map<String, Value>) -> Option<PathBuf> {
        if !self.enabled {
            return None;
        }

        let path = self.log_dir.join(self.file_name(suffix));
        let written = std::fs::create_dir_all(&self.log_dir)
            .map_err(AgentError::from)
            .and_then(|()| Ok(serde_json::to_string_pretty(&Value::Object(data))?))
            .and_then(|body| Ok(std::fs::write(&path, body)?));

        match written {
            Ok(()) => {
                tracing::debug!(file = %path.display(), "Wrote debug log");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to write debug log");
                None
            }
        }
    }

    /// Start a new exchange and record the user message
    pub fn log_user_input(&self, message: &str) -> Option<PathBuf> {
        self.message_count.fetch_add(1, Ordering::SeqCst);

        let mut data = self.envelope("user_input");
        data.insert("message".into(), json!(message));
        data.insert("message_length".into(), json!(message.chars().count()));
        self.write("input", data)
    }

    /// Record the final answer of an exchange
    pub fn log_agent_response(&self, response: &str, metadata: Value) -> Option<PathBuf> {
        let mut data = self.envelope("agent_response");
        data.insert("response".into(), json!(response));
        data.insert("response_length".into(), json!(response.chars().count()));
        data.insert("is_empty".into(), json!(response.is_empty()));
        data.insert("metadata".into(), metadata);
        self.write("response", data)
    }

    /// Record the raw run result together with its analysis
    pub fn log_runner_result(&self, result: &RunResult) -> Option<PathBuf> {
        let final_output = result.final_output.clone().unwrap_or(Value::Null);
        let final_output_length = if is_truthy(&final_output) {
            stringify(&final_output).chars().count()
        } else {
            0
        };

        let mut data = self.envelope("runner_result");
        data.insert("result_type".into(), json!(result.describe()));
        data.insert("has_final_output".into(), json!(result.final_output.is_some()));
        data.insert("final_output".into(), final_output);
        data.insert("final_output_length".into(), json!(final_output_length));
        data.insert("analysis".into(), json!(analyze(result)));
        data.insert("result".into(), json!(result));
        self.write("runner_result", data)
    }

    /// Record one tool execution
    pub fn log_tool_execution(&self, tool_name: &str, arguments: Value, result: &str) -> Option<PathBuf> {
        let mut data = self.envelope("tool_execution");
        data.insert("tool_name".into(), json!(tool_name));
        data.insert("arguments".into(), arguments);
        data.insert("result".into(), json!(result));
        data.insert("result_length".into(), json!(result.chars().count()));
        data.insert(
            "success".into(),
            json!(!result.is_empty() && !result.starts_with("Error")),
        );
        self.write(&format!("tool_{}", file_safe(tool_name)), data)
    }

    /// Record a failure of the current exchange
    pub fn log_error(&self, error: &AgentError, context: &str) -> Option<PathBuf> {
        let mut data = self.envelope("error");
        data.insert("error_type".into(), json!(error.kind()));
        data.insert("error_message".into(), json!(error.to_string()));
        data.insert("details".into(), json!(error.details()));
        data.insert("context".into(), json!(context));
        self.write("error", data)
    }

    fn session_files(&self) -> Vec<String> {
        let prefix = format!("{}_", self.session_id);
        let mut files: Vec<String> = std::fs::read_dir(&self.log_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .filter(|name| name.starts_with(&prefix) && name.ends_with(".json"))
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }

    /// Files written so far in this session
    pub fn session_summary(&self) -> SessionSummary {
        let log_files = if self.enabled { self.session_files() } else { Vec::new() };
        SessionSummary {
            enabled: self.enabled,
            session_id: self.session_id.clone(),
            message_count: self.message_count(),
            log_dir: self.log_dir.clone(),
            total_log_files: log_files.len(),
            log_files,
        }
    }

    /// Delete files of all but the most recent `keep_sessions` sessions
    fn prune_sessions(&self) {
        let Ok(entries) = std::fs::read_dir(&self.log_dir) else {
            return;
        };

        let files: Vec<(String, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                let session = name.split_once("_msg")?.0.to_string();
                Some((session, e.path()))
            })
            .collect();

        let mut sessions: Vec<&str> = files.iter().map(|(s, _)| s.as_str()).collect();
        sessions.push(&self.session_id);
        sessions.sort_unstable();
        sessions.dedup();

        let keep = self.keep_sessions.max(1);
        if sessions.len() <= keep {
            return;
        }
        let stale: Vec<String> = sessions[..sessions.len() - keep]
            .iter()
            .map(|s| (*s).to_string())
            .collect();

        for (session, path) in &files {
            if stale.contains(session) {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::warn!(file = %path.display(), error = %e, "Failed to prune debug log");
                }
            }
        }
        tracing::debug!(removed_sessions = stale.len(), "Pruned old debug sessions");
    }
}

/// Tool names come from the model; keep them to `[A-Za-z0-9_-]` in file names
fn file_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path, enabled: bool) -> DebugConfig {
        DebugConfig {
            enabled,
            log_dir: dir.to_path_buf(),
            keep_sessions: 2,
        }
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_exchange_files() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DebugLogger::with_session_id(&config(dir.path(), true), "20250101_120000");

        let input = logger.log_user_input("What is Rust?").unwrap();
        assert!(input.ends_with("20250101_120000_msg001_input.json"));
        assert_eq!(read(&input)["message_length"], 13);

        let tool = logger
            .log_tool_execution("web_search", json!({"query": "rust"}), "Web search results for: 'rust'")
            .unwrap();
        assert!(tool.ends_with("20250101_120000_msg001_tool_web_search.json"));
        assert_eq!(read(&tool)["success"], true);

        let result = logger.log_runner_result(&RunResult::with_final_output("A language")).unwrap();
        assert_eq!(read(&result)["final_output_length"], 10);

        logger.log_agent_response("A language", json!({"source": "final_output"}));
        logger.log_user_input("Second question");
        let error = logger
            .log_error(&AgentError::EmptyResponse { details: "nothing".into() }, "chat")
            .unwrap();
        assert!(error.ends_with("20250101_120000_msg002_error.json"));
        assert_eq!(read(&error)["error_type"], "EmptyResponse");

        let summary = logger.session_summary();
        assert_eq!(summary.message_count, 2);
        assert_eq!(summary.total_log_files, 6);
        assert_eq!(summary.log_files[0], "20250101_120000_msg001_input.json");
    }

    #[test]
    fn test_tool_file_name_is_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DebugLogger::with_session_id(&config(dir.path(), true), "s");
        logger.log_user_input("hi");

        let path = logger
            .log_tool_execution("../../etc/passwd x", json!({}), "Error: Tool not found")
            .unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert!(path.ends_with("s_msg001_tool_______etc_passwd_x.json"));
        assert_eq!(read(&path)["tool_name"], "../../etc/passwd x");
        assert_eq!(read(&path)["success"], false);
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let logger = DebugLogger::with_session_id(&config(dir.path(), false), "s");

        assert!(logger.log_user_input("hello").is_none());
        assert_eq!(logger.message_count(), 1);
        assert!(!logger.session_summary().enabled);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "x").unwrap();

        let logger = DebugLogger::with_session_id(&config(&blocker, true), "s");
        assert!(logger.log_user_input("hello").is_none());
    }

    #[test]
    fn test_prunes_old_sessions() {
        let dir = tempfile::tempdir().unwrap();
        for session in ["20250101_000000", "20250102_000000", "20250103_000000"] {
            std::fs::write(dir.path().join(format!("{session}_msg001_input.json")), "{}").unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        let _logger = DebugLogger::with_session_id(&config(dir.path(), true), "20250104_000000");

        let mut remaining: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        remaining.sort();
        assert_eq!(remaining, vec!["20250103_000000_msg001_input.json", "notes.txt"]);
    }
}
