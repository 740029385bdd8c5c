//! Server-Sent Events
//!
//! Line parser for `text/event-stream` bodies and an accumulator that folds
//! chat-completion chunks into one assistant turn.

use std::collections::BTreeMap;

use agent_core::{
    error::{AgentError, Result},
    message::ToolCallRequest,
    runtime::RunEvent,
};
use serde::Deserialize;

use crate::openai::AssistantTurn;

/// One meaningful SSE line
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental `data:` line parser; chunks may split lines anywhere
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// Feed raw bytes, returning every complete event
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing line without newline
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    let payload = line.strip_prefix("data:")?.trim_start();

    match payload {
        "" => None,
        "[DONE]" => Some(SseEvent::Done),
        data => Some(SseEvent::Data(data.to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,

    #[serde(default, alias = "reasoning")]
    reasoning_content: Option<String>,

    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,

    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Folds streamed chunks into a complete assistant turn
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    content: String,
    reasoning: String,
    calls: BTreeMap<usize, PartialCall>,
}

impl TurnAccumulator {
    /// Apply one `data:` payload, returning the text deltas it carried
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Parse` for a payload that is not a chunk object.
    pub fn apply(&mut self, data: &str) -> Result<Vec<RunEvent>> {
        let chunk: ChunkBody = serde_json::from_str(data)
            .map_err(|e| AgentError::Parse(format!("Invalid stream chunk: {e}")))?;

        let mut events = Vec::new();
        for choice in chunk.choices {
            let delta = choice.delta;

            if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
                self.reasoning.push_str(&reasoning);
                events.push(RunEvent::ReasoningDelta(reasoning));
            }

            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                self.content.push_str(&content);
                events.push(RunEvent::TextDelta(content));
            }

            for call in delta.tool_calls.unwrap_or_default() {
                let partial = self.calls.entry(call.index).or_default();
                if let Some(id) = call.id {
                    partial.id = id;
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        partial.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        partial.arguments.push_str(&arguments);
                    }
                }
            }
        }
        Ok(events)
    }

    /// The complete turn, tool calls in index order
    pub(crate) fn finish(self) -> AssistantTurn {
        AssistantTurn {
            content: (!self.content.is_empty()).then_some(self.content),
            reasoning: (!self.reasoning.is_empty()).then_some(self.reasoning),
            tool_calls: self
                .calls
                .into_values()
                .map(|c| ToolCallRequest::new(c.id, c.name, c.arguments))
                .collect(),
        }
    }
}
