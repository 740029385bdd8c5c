//! Response Extraction
//!
//! Recovers a single textual answer from a [`RunResult`] of uncertain shape.
//! Tiers are tried in a fixed order and the first hit wins:
//!
//! 1. terminal `final_output`
//! 2. alternate top-level fields (`output`, `outputs`, `response`, `content`)
//! 3. items, most recent first
//! 4. raw chat-completion responses, in order
//!
//! Extraction is pure and never fails; "nothing found" is [`Extracted::Empty`].

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::run_result::{ItemBody, ReasoningContent, RunItem, RunResult, is_truthy, stringify};

/// Where an extracted answer came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionSource {
    FinalOutput,
    AlternateField(&'static str),
    MessageItem(usize),
    ReasoningItem(usize),
    ItemContent(usize),
    RawResponse(usize),
}

/// Outcome of extraction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extracted {
    Found {
        text: String,
        source: ExtractionSource,
    },
    Empty,
}

impl Extracted {
    pub fn text(&self) -> Option<&str> {
        match self {
            Extracted::Found { text, .. } => Some(text),
            Extracted::Empty => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Extracted::Found { text, .. } => Some(text),
            Extracted::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Extracted::Empty)
    }
}

/// Decide whether a reasoning trace reads like a final answer rather than
/// scratch work.
pub fn looks_like_answer(text: &str) -> bool {
    !text.starts_with("I need to")
        && !text.starts_with("Let me")
        && text.chars().count() > 50
        && !text.starts_with('{')
}

/// Result extractor with a swappable reasoning predicate
#[derive(Clone, Copy, Debug)]
pub struct Extractor {
    accept_reasoning: fn(&str) -> bool,
}

impl Default for Extractor {
    fn default() -> Self {
        Self {
            accept_reasoning: looks_like_answer,
        }
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the predicate that admits reasoning text as an answer
    pub fn with_reasoning_filter(mut self, accept: fn(&str) -> bool) -> Self {
        self.accept_reasoning = accept;
        self
    }

    /// Recover the answer text from a run result
    pub fn extract(&self, result: &RunResult) -> Extracted {
        tracing::debug!(result = %result.describe(), "Extracting response");

        if let Some(value) = result.final_output.as_ref().filter(|v| is_truthy(v)) {
            tracing::debug!("Using final_output");
            return found(stringify(value), ExtractionSource::FinalOutput);
        }

        if let Some(hit) = Self::from_alternate_fields(result) {
            return hit;
        }

        if let Some(hit) = self.from_items(&result.new_items) {
            return hit;
        }

        if let Some(hit) = Self::from_raw_responses(result) {
            return hit;
        }

        tracing::debug!(
            items = result.new_items.len(),
            raw_responses = result.raw_responses.len(),
            "No extractable response"
        );
        Extracted::Empty
    }

    fn from_alternate_fields(result: &RunResult) -> Option<Extracted> {
        for name in crate::run_result::ALTERNATE_FIELDS {
            let Some(value) = result.alternate_field(name).filter(|v| is_truthy(v)) else {
                continue;
            };
            let value = match value {
                Value::Array(values) => values.last().unwrap_or(value),
                other => other,
            };
            if is_truthy(value) {
                tracing::debug!(field = name, "Using alternate field");
                return Some(found(stringify(value), ExtractionSource::AlternateField(name)));
            }
        }
        None
    }

    fn from_items(&self, items: &[RunItem]) -> Option<Extracted> {
        for (index, item) in items.iter().enumerate().rev() {
            tracing::debug!(index, kind = item.kind_name(), "Inspecting item");

            match &item.body {
                ItemBody::MessageOutput(parts) => {
                    let text = parts.iter().filter_map(|p| p.text.as_deref()).find(|t| !t.is_empty());
                    if let Some(text) = text {
                        return Some(found(text.to_string(), ExtractionSource::MessageItem(index)));
                    }
                }
                _ if item.kind_name().contains("message") => {
                    if let Some(content) = item.content.as_ref().filter(|v| is_truthy(v)) {
                        return Some(found(stringify(content), ExtractionSource::ItemContent(index)));
                    }
                }
                ItemBody::Reasoning(content) => {
                    if let Some(text) = self.reasoning_answer(content) {
                        tracing::debug!(index, "Accepted reasoning text as answer");
                        return Some(found(text, ExtractionSource::ReasoningItem(index)));
                    }
                }
                _ => {}
            }

            if let Some(Value::String(s)) = &item.content {
                if !s.trim().is_empty() {
                    return Some(found(s.clone(), ExtractionSource::ItemContent(index)));
                }
            }
        }
        None
    }

    fn reasoning_answer(&self, content: &ReasoningContent) -> Option<String> {
        let accept = |raw: &str| {
            let text = raw.trim();
            (!text.is_empty() && (self.accept_reasoning)(text)).then(|| text.to_string())
        };

        match content {
            ReasoningContent::Text(s) => accept(s.as_str()),
            ReasoningContent::Parts(parts) => {
                parts.iter().filter_map(|p| p.text.as_deref()).find_map(accept)
            }
            ReasoningContent::Missing => None,
        }
    }

    fn from_raw_responses(result: &RunResult) -> Option<Extracted> {
        for (index, response) in result.raw_responses.iter().enumerate() {
            if let Some(text) = response.first_message_content().map(str::trim) {
                if !text.is_empty() {
                    return Some(found(text.to_string(), ExtractionSource::RawResponse(index)));
                }
            }
            if let Some(content) = response.content.as_ref().filter(|v| is_truthy(v)) {
                let text = stringify(content);
                if !text.trim().is_empty() {
                    return Some(found(text, ExtractionSource::RawResponse(index)));
                }
            }
        }
        None
    }
}

fn found(text: String, source: ExtractionSource) -> Extracted {
    Extracted::Found { text, source }
}

/// Extract with the default reasoning predicate
pub fn extract(result: &RunResult) -> Extracted {
    Extractor::default().extract(result)
}

// ============================================================================
// Analysis
// ============================================================================

/// Number of item previews kept in diagnostics
pub const PREVIEW_ITEMS: usize = 3;

const PREVIEW_CHARS: usize = 200;

/// Tool call recorded in a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: String,
    pub call_id: Option<String>,
    pub output: Option<String>,
}

/// Structured breakdown of a run result
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunAnalysis {
    pub result_type: String,
    pub has_final_output: bool,
    pub total_items: usize,
    pub item_types: BTreeMap<String, usize>,
    pub reasoning_steps: Vec<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub message_outputs: Vec<String>,
    pub item_previews: Vec<String>,
    pub raw_response_count: usize,
}

impl RunAnalysis {
    /// Human-readable diagnostic block for empty-response errors
    pub fn diagnostics(&self) -> String {
        let histogram = self
            .item_types
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = format!(
            "result_type: {}\nhas_final_output: {}\nnew_items_count: {}\nitem_types: {{{}}}",
            self.result_type, self.has_final_output, self.total_items, histogram
        );
        for (i, preview) in self.item_previews.iter().enumerate() {
            out.push_str(&format!("\nitem[{i}]: {preview}"));
        }
        out
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

fn item_preview(item: &RunItem) -> String {
    let detail = match &item.body {
        ItemBody::MessageOutput(parts) => parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join(" "),
        ItemBody::Reasoning(ReasoningContent::Text(s)) => s.clone(),
        ItemBody::Reasoning(ReasoningContent::Parts(parts)) => parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join(" "),
        ItemBody::Reasoning(ReasoningContent::Missing) => String::new(),
        ItemBody::ToolCall { name, arguments, .. } => format!("{name}({arguments})"),
        ItemBody::ToolCallOutput { output, .. } => output.clone(),
        ItemBody::Unrecognized(_) => item.content.as_ref().map(stringify).unwrap_or_default(),
    };
    format!("{}: {}", item.kind_name(), preview(&detail))
}

/// Summarize a run result for diagnostics and debug logs
pub fn analyze(result: &RunResult) -> RunAnalysis {
    let mut analysis = RunAnalysis {
        result_type: result.describe(),
        has_final_output: result.final_output.as_ref().is_some_and(is_truthy),
        total_items: result.new_items.len(),
        raw_response_count: result.raw_responses.len(),
        ..RunAnalysis::default()
    };

    for item in &result.new_items {
        *analysis.item_types.entry(item.kind_name().to_string()).or_insert(0) += 1;

        match &item.body {
            ItemBody::Reasoning(ReasoningContent::Text(s)) => {
                analysis.reasoning_steps.push(preview(s));
            }
            ItemBody::Reasoning(ReasoningContent::Parts(parts)) => analysis
                .reasoning_steps
                .extend(parts.iter().filter_map(|p| p.text.as_deref()).map(preview)),
            ItemBody::ToolCall {
                name,
                arguments,
                call_id,
            } => analysis.tool_calls.push(ToolCallRecord {
                name: name.clone(),
                arguments: arguments.clone(),
                call_id: call_id.clone(),
                output: None,
            }),
            ItemBody::ToolCallOutput { call_id, output } => {
                let pending = analysis
                    .tool_calls
                    .iter_mut()
                    .rev()
                    .find(|c| c.output.is_none() && (call_id.is_none() || c.call_id == *call_id));
                if let Some(call) = pending {
                    call.output = Some(output.clone());
                }
            }
            ItemBody::MessageOutput(parts) => analysis
                .message_outputs
                .extend(parts.iter().filter_map(|p| p.text.clone())),
            _ => {}
        }
    }

    analysis.item_previews = result
        .new_items
        .iter()
        .take(PREVIEW_ITEMS)
        .map(item_preview)
        .collect();

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(value: Value) -> RunResult {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_final_output_short_circuits() {
        let r = result(json!({
            "final_output": "Direct answer",
            "outputs": ["other"],
            "new_items": [{"type": "message_output_item", "raw_item": {"content": [{"text": "item text"}]}}]
        }));
        assert_eq!(
            extract(&r),
            Extracted::Found { text: "Direct answer".into(), source: ExtractionSource::FinalOutput }
        );
    }

    #[test]
    fn test_empty_final_output_falls_back_to_outputs() {
        let r = result(json!({"final_output": "", "outputs": ["first", "last"]}));
        assert_eq!(extract(&r).text(), Some("last"));

        let r = result(json!({"final_output": "", "response": {"answer": 1}}));
        assert_eq!(extract(&r).text(), Some(r#"{"answer":1}"#));
    }

    #[test]
    fn test_falsy_last_element_moves_to_next_field() {
        let r = result(json!({"output": ["something", ""], "content": "from content"}));
        assert_eq!(
            extract(&r),
            Extracted::Found {
                text: "from content".into(),
                source: ExtractionSource::AlternateField("content"),
            }
        );
    }

    #[test]
    fn test_message_output_item() {
        let r = result(json!({
            "final_output": null,
            "new_items": [
                {"type": "reasoning_item", "raw_item": {"content": "The user asks about capitals of European countries, specifically France."}},
                {"type": "message_output_item", "raw_item": {"content": [{"type": "output_text", "text": "Paris is the capital of France."}]}}
            ]
        }));
        assert_eq!(
            extract(&r),
            Extracted::Found {
                text: "Paris is the capital of France.".into(),
                source: ExtractionSource::MessageItem(1),
            }
        );
    }

    #[test]
    fn test_scratch_reasoning_is_rejected() {
        let r = result(json!({
            "new_items": [{"type": "reasoning_item", "raw_item": {"content": "Let me think about this problem first."}}]
        }));
        assert_eq!(extract(&r), Extracted::Empty);
    }

    #[test]
    fn test_answer_like_reasoning_is_accepted() {
        let text = "The answer to your question is that photosynthesis converts light energy into chemical energy.";
        let r = result(json!({
            "new_items": [{"type": "reasoning_item", "raw_item": {"content": [{"type": "reasoning_text", "text": format!("  {text}  ")}]}}]
        }));
        assert_eq!(
            extract(&r),
            Extracted::Found { text: text.into(), source: ExtractionSource::ReasoningItem(0) }
        );
    }

    #[test]
    fn test_reasoning_predicate() {
        assert!(!looks_like_answer("I need to look this up before answering the question properly."));
        assert!(!looks_like_answer("{\"query\": \"a fairly long json blob that exceeds fifty chars\"}"));
        assert!(!looks_like_answer("Short answer."));
        assert!(looks_like_answer(&"x".repeat(51)));
        assert!(!looks_like_answer(&"x".repeat(50)));
    }

    #[test]
    fn test_swapped_predicate() {
        let r = result(json!({
            "new_items": [{"type": "reasoning_item", "raw_item": {"content": "Let me think."}}]
        }));
        let extractor = Extractor::new().with_reasoning_filter(|_| true);
        assert_eq!(extractor.extract(&r).text(), Some("Let me think."));
    }

    #[test]
    fn test_generic_message_item_content() {
        let r = result(json!({
            "new_items": [{"type": "assistant_message", "content": {"text": "hi"}}]
        }));
        assert_eq!(extract(&r).text(), Some(r#"{"text":"hi"}"#));
    }

    #[test]
    fn test_direct_content_fallback_is_unstripped() {
        let r = result(json!({
            "new_items": [
                {"type": "tool_call_output_item", "raw_item": {"call_id": "c1"}, "output": "x"},
                {"type": "handoff_item", "content": "  handed off  "}
            ]
        }));
        assert_eq!(
            extract(&r),
            Extracted::Found { text: "  handed off  ".into(), source: ExtractionSource::ItemContent(1) }
        );
    }

    #[test]
    fn test_most_recent_item_wins() {
        let r = result(json!({
            "new_items": [
                {"type": "message_output_item", "raw_item": {"content": [{"text": "older"}]}},
                {"type": "message_output_item", "raw_item": {"content": [{"text": ""}, {"text": "newer"}]}}
            ]
        }));
        assert_eq!(extract(&r).text(), Some("newer"));
    }

    #[test]
    fn test_raw_responses() {
        let r = result(json!({
            "raw_responses": [
                {"choices": [{"message": {"content": "   "}}]},
                {"choices": [{"message": {"content": "  from raw  "}}]}
            ]
        }));
        assert_eq!(
            extract(&r),
            Extracted::Found { text: "from raw".into(), source: ExtractionSource::RawResponse(1) }
        );

        let r = result(json!({"raw_responses": [{"choices": [], "content": " direct "}]}));
        assert_eq!(extract(&r).text(), Some(" direct "));

        let r = result(json!({
            "raw_responses": [
                {"choices": [{"message": {"content": [{"type": "text", "text": "part"}]}}]},
                {"choices": [{"message": {"content": "second"}}]}
            ]
        }));
        assert_eq!(
            extract(&r),
            Extracted::Found { text: "second".into(), source: ExtractionSource::RawResponse(1) }
        );
    }

    #[test]
    fn test_nothing_to_extract() {
        assert!(extract(&RunResult::default()).is_empty());
        let r = result(json!({"final_output": 0, "outputs": [], "new_items": [{"type": "tool_call_item"}]}));
        assert!(extract(&r).is_empty());
    }

    #[test]
    fn test_analyze() {
        let r = result(json!({
            "new_items": [
                {"type": "reasoning_item", "raw_item": {"content": "Let me search."}},
                {"type": "tool_call_item", "raw_item": {"name": "web_search", "arguments": "{}", "call_id": "c1"}},
                {"type": "tool_call_output_item", "raw_item": {"call_id": "c1"}, "output": "results"},
                {"type": "reasoning_item", "raw_item": {"content": "Done."}}
            ]
        }));

        let analysis = analyze(&r);
        assert_eq!(analysis.total_items, 4);
        assert_eq!(analysis.item_types.get("reasoning_item"), Some(&2));
        assert_eq!(analysis.item_types.get("tool_call_item"), Some(&1));
        assert_eq!(analysis.reasoning_steps, vec!["Let me search.", "Done."]);
        assert_eq!(analysis.tool_calls[0].output.as_deref(), Some("results"));
        assert_eq!(analysis.item_previews.len(), PREVIEW_ITEMS);
        assert!(!analysis.has_final_output);

        let diagnostics = analysis.diagnostics();
        assert!(diagnostics.contains("new_items_count: 4"));
        assert!(diagnostics.contains("reasoning_item=2"));
        assert!(diagnostics.contains("item[0]: reasoning_item: Let me search."));
    }
}
