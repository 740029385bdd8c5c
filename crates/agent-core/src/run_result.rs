//! Run Results
//!
//! Output of one model-execution run. The shape is only loosely guaranteed:
//! every field may be missing, and items come in several kinds. Serde maps
//! the JSON form onto typed variants so extraction can match instead of probe.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Result of one chat turn, possibly spanning a tool-call sub-loop
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Terminal output of the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    /// Ordered history produced during the run
    #[serde(default, deserialize_with = "nullable_vec")]
    pub new_items: Vec<RunItem>,

    /// Chat-completion shaped responses, in request order
    #[serde(default, deserialize_with = "nullable_vec")]
    pub raw_responses: Vec<RawResponse>,
}

/// Alternate top-level fields, in probe order
pub const ALTERNATE_FIELDS: [&str; 4] = ["output", "outputs", "response", "content"];

impl RunResult {
    /// Build a result carrying only a terminal output
    pub fn with_final_output(text: impl Into<String>) -> Self {
        Self {
            final_output: Some(Value::String(text.into())),
            ..Self::default()
        }
    }

    /// Look up one of the alternate top-level fields by name
    pub fn alternate_field(&self, name: &str) -> Option<&Value> {
        match name {
            "output" => self.output.as_ref(),
            "outputs" => self.outputs.as_ref(),
            "response" => self.response.as_ref(),
            "content" => self.content.as_ref(),
            _ => None,
        }
    }

    /// Short description of which top-level fields are populated
    pub fn describe(&self) -> String {
        let mut fields = Vec::new();
        if self.final_output.is_some() {
            fields.push("final_output");
        }
        for name in ALTERNATE_FIELDS {
            if self.alternate_field(name).is_some() {
                fields.push(name);
            }
        }
        if !self.new_items.is_empty() {
            fields.push("new_items");
        }
        if !self.raw_responses.is_empty() {
            fields.push("raw_responses");
        }

        if fields.is_empty() {
            "RunResult(empty)".to_string()
        } else {
            format!("RunResult({})", fields.join(", "))
        }
    }
}

/// One element of the run history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireItem", into = "WireItem")]
pub struct RunItem {
    pub body: ItemBody,

    /// Direct `content` attribute, present on some item kinds
    pub content: Option<Value>,
}

/// Kind-specific payload of a run item
#[derive(Clone, Debug, PartialEq)]
pub enum ItemBody {
    /// Assistant message made of content parts
    MessageOutput(Vec<ContentPart>),

    /// Model reasoning trace
    Reasoning(ReasoningContent),

    /// Tool invocation requested by the model
    ToolCall {
        name: String,
        arguments: String,
        call_id: Option<String>,
    },

    /// Output returned by a tool
    ToolCallOutput {
        call_id: Option<String>,
        output: String,
    },

    /// Any other kind, kept by name
    Unrecognized(String),
}

/// Reasoning content is either a plain string or a list of parts
#[derive(Clone, Debug, PartialEq)]
pub enum ReasoningContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Missing,
}

/// One text-bearing part of a message or reasoning item
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentPart {
    pub fn text(kind: &str, text: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            text: Some(text.into()),
        }
    }
}

pub const MESSAGE_OUTPUT_ITEM: &str = "message_output_item";
pub const REASONING_ITEM: &str = "reasoning_item";
pub const TOOL_CALL_ITEM: &str = "tool_call_item";
pub const TOOL_CALL_OUTPUT_ITEM: &str = "tool_call_output_item";

impl RunItem {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            body: ItemBody::MessageOutput(vec![ContentPart::text("output_text", text)]),
            content: None,
        }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            body: ItemBody::Reasoning(ReasoningContent::Text(text.into())),
            content: None,
        }
    }

    pub fn tool_call(
        name: impl Into<String>,
        arguments: impl Into<String>,
        call_id: Option<String>,
    ) -> Self {
        Self {
            body: ItemBody::ToolCall {
                name: name.into(),
                arguments: arguments.into(),
                call_id,
            },
            content: None,
        }
    }

    pub fn tool_output(call_id: Option<String>, output: impl Into<String>) -> Self {
        Self {
            body: ItemBody::ToolCallOutput {
                call_id,
                output: output.into(),
            },
            content: None,
        }
    }

    /// Kind tag as it appears on the wire
    pub fn kind_name(&self) -> &str {
        match &self.body {
            ItemBody::MessageOutput(_) => MESSAGE_OUTPUT_ITEM,
            ItemBody::Reasoning(_) => REASONING_ITEM,
            ItemBody::ToolCall { .. } => TOOL_CALL_ITEM,
            ItemBody::ToolCallOutput { .. } => TOOL_CALL_OUTPUT_ITEM,
            ItemBody::Unrecognized(kind) => kind,
        }
    }
}

/// Flat JSON form of an item: `{type, raw_item, content}`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct WireItem {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_item: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
}

fn raw_field<'a>(raw: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    raw.and_then(|r| r.get(key)).filter(|v| !v.is_null())
}

fn raw_str(raw: Option<&Value>, key: &str) -> Option<String> {
    raw_field(raw, key).and_then(Value::as_str).map(str::to_string)
}

fn parse_parts(value: Option<&Value>) -> Vec<ContentPart> {
    value
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .map(|p| ContentPart {
                    kind: p.get("type").and_then(Value::as_str).map(str::to_string),
                    text: p.get("text").and_then(Value::as_str).map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl From<WireItem> for RunItem {
    fn from(wire: WireItem) -> Self {
        let raw = wire.raw_item.as_ref();
        let kind = wire.kind.unwrap_or_default();

        let body = match kind.as_str() {
            MESSAGE_OUTPUT_ITEM => ItemBody::MessageOutput(parse_parts(raw_field(raw, "content"))),
            REASONING_ITEM => {
                let content = match raw_field(raw, "content") {
                    Some(Value::String(s)) => ReasoningContent::Text(s.clone()),
                    Some(v @ Value::Array(_)) => ReasoningContent::Parts(parse_parts(Some(v))),
                    _ => ReasoningContent::Missing,
                };
                ItemBody::Reasoning(content)
            }
            TOOL_CALL_ITEM => ItemBody::ToolCall {
                name: raw_str(raw, "name").unwrap_or_default(),
                arguments: match raw_field(raw, "arguments") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                },
                call_id: raw_str(raw, "call_id").or_else(|| raw_str(raw, "id")),
            },
            TOOL_CALL_OUTPUT_ITEM => ItemBody::ToolCallOutput {
                call_id: raw_str(raw, "call_id"),
                output: wire
                    .output
                    .as_ref()
                    .or_else(|| raw_field(raw, "output"))
                    .map(stringify)
                    .unwrap_or_default(),
            },
            _ => ItemBody::Unrecognized(kind),
        };

        RunItem {
            body,
            content: wire.content,
        }
    }
}

fn parts_to_json(parts: &[ContentPart]) -> Value {
    serde_json::to_value(parts).unwrap_or(Value::Null)
}

impl From<RunItem> for WireItem {
    fn from(item: RunItem) -> Self {
        let kind = Some(item.kind_name().to_string());
        let (raw_item, output) = match item.body {
            ItemBody::MessageOutput(parts) => (
                Some(serde_json::json!({ "role": "assistant", "content": parts_to_json(&parts) })),
                None,
            ),
            ItemBody::Reasoning(content) => {
                let content = match content {
                    ReasoningContent::Text(s) => Value::String(s),
                    ReasoningContent::Parts(parts) => parts_to_json(&parts),
                    ReasoningContent::Missing => Value::Null,
                };
                (Some(serde_json::json!({ "content": content })), None)
            }
            ItemBody::ToolCall {
                name,
                arguments,
                call_id,
            } => (
                Some(serde_json::json!({ "name": name, "arguments": arguments, "call_id": call_id })),
                None,
            ),
            ItemBody::ToolCallOutput { call_id, output } => (
                Some(serde_json::json!({ "call_id": call_id })),
                Some(Value::String(output)),
            ),
            ItemBody::Unrecognized(_) => (None, None),
        };

        WireItem {
            kind,
            raw_item,
            content: item.content,
            output,
        }
    }
}

/// Chat-completion shaped response recorded during the run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(default, deserialize_with = "nullable_vec")]
    pub choices: Vec<RawChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawChoice {
    #[serde(default)]
    pub message: Option<RawMessage>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Usually a string; some servers send a list of content parts
    #[serde(default)]
    pub content: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
}

impl RawResponse {
    /// Build from one assistant message
    pub fn from_message(content: Option<String>, reasoning_content: Option<String>) -> Self {
        Self {
            choices: vec![RawChoice {
                message: Some(RawMessage {
                    content: content.map(Value::String),
                    reasoning_content,
                }),
            }],
            content: None,
        }
    }

    /// `choices[0].message.content`, when it is a string
    pub fn first_message_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_ref())
            .and_then(Value::as_str)
    }
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Value truthiness: null, false, 0, "", [] and {} are empty
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Strings render as themselves, everything else as compact JSON
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
