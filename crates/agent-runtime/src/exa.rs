//! Exa Search Client
//!
//! REST client for `POST /search` and `POST /contents`, plus formatters that
//! flatten responses into bounded text for the model.

use agent_core::config::{ExaConfig, PLACEHOLDER_API_KEY};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

/// Page text beyond this many characters is cut
pub const MAX_PAGE_CHARS: usize = 2000;

/// Search snippets beyond this many characters are cut
pub const MAX_SNIPPET_CHARS: usize = 300;

/// Result count used when the requested one is out of range
pub const DEFAULT_RESULT_COUNT: u32 = 5;

/// Which endpoint an error came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Search,
    Contents,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Search => "Search request",
            Operation::Contents => "Content retrieval",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::Contents => "content retrieval",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Operation::Search => "search",
            Operation::Contents => "contents",
        }
    }
}

/// Search client errors
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Exa search not available")]
    Unavailable,

    #[error("Search query cannot be empty")]
    EmptyQuery,

    #[error("URL cannot be empty")]
    EmptyUrl,

    #[error("{} timed out", .0.label())]
    Timeout(Operation),

    #[error("{} failed: {message}", .operation.label())]
    Transport { operation: Operation, message: String },

    #[error("{} failed with status {status}", .operation.label())]
    Status {
        operation: Operation,
        status: u16,
        body: String,
    },

    #[error("Unexpected {} error: {message}", .operation.noun())]
    Unexpected { operation: Operation, message: String },
}

impl SearchError {
    /// Extra context shown in parentheses at the tool boundary
    pub fn details(&self) -> Option<&str> {
        match self {
            SearchError::Unavailable => Some("API key not configured or client disabled"),
            SearchError::Status { body, .. } if !body.is_empty() => Some(body.as_str()),
            _ => None,
        }
    }

    fn from_reqwest(operation: Operation, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::Timeout(operation)
        } else if err.is_decode() {
            SearchError::Unexpected {
                operation,
                message: err.to_string(),
            }
        } else {
            SearchError::Transport {
                operation,
                message: err.to_string(),
            }
        }
    }
}

/// Normalize a requested result count into `1..=10`; anything else becomes 5
pub fn normalize_result_count(requested: i64) -> u32 {
    u32::try_from(requested)
        .ok()
        .filter(|n| (1..=10).contains(n))
        .unwrap_or(DEFAULT_RESULT_COUNT)
}

/// Parameters of one search
#[derive(Clone, Debug, Default)]
pub struct SearchRequest {
    pub query: String,
    pub num_results: Option<i64>,
    pub include_domains: Option<Vec<String>>,
    pub exclude_domains: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn num_results(mut self, n: i64) -> Self {
        self.num_results = Some(n);
        self
    }

    pub fn include_domains(mut self, domains: Vec<String>) -> Self {
        self.include_domains = Some(domains);
        self
    }

    pub fn exclude_domains(mut self, domains: Vec<String>) -> Self {
        self.exclude_domains = Some(domains);
        self
    }
}

/// One search or contents hit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub highlights: Option<Vec<String>>,

    #[serde(default)]
    pub summary: Option<String>,
}

/// Body of a `/search` or `/contents` answer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Option<Vec<SearchHit>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl SearchResponse {
    fn error_text(&self) -> Option<String> {
        self.error.as_ref().map(|e| match e {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    fn hits(&self) -> &[SearchHit] {
        self.results.as_deref().unwrap_or_default()
    }
}

/// Exa REST client
#[derive(Clone, Debug)]
pub struct ExaClient {
    http: reqwest::Client,
    config: ExaConfig,
}

impl ExaClient {
    /// Create a client from settings
    pub fn new(config: &ExaConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_default();

        if config.is_available() {
            tracing::info!("Exa search client initialized");
        } else {
            tracing::warn!("Exa search client disabled - no API key configured");
        }

        Self {
            http,
            config: config.clone(),
        }
    }

    /// Enabled and holding a real key
    pub fn is_available(&self) -> bool {
        self.config.is_available()
    }

    /// Default result count from settings
    pub fn max_results(&self) -> u32 {
        self.config.max_results
    }

    fn api_key(&self) -> &str {
        self.config.api_key.as_deref().unwrap_or(PLACEHOLDER_API_KEY)
    }

    async fn post(&self, operation: Operation, payload: &Value) -> Result<SearchResponse, SearchError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            operation.path()
        );

        let response = self
            .http
            .post(&url)
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .header("x-api-key", self.api_key())
            .json(payload)
            .send()
            .await
            .map_err(|e| SearchError::from_reqwest(operation, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                operation,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| SearchError::from_reqwest(operation, &e))
    }

    /// Search the web
    ///
    /// # Errors
    ///
    /// Unavailable client, blank query, timeout, transport failure, non-2xx
    /// status or an unparseable body.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        if !self.is_available() {
            return Err(SearchError::Unavailable);
        }
        if request.query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let num_results =
            normalize_result_count(request.num_results.unwrap_or_else(|| i64::from(self.config.max_results)));

        let mut payload = json!({
            "query": request.query,
            "numResults": num_results,
            "useAutoprompt": true,
            "contents": {
                "text": true,
                "highlights": true,
                "summary": true,
            },
        });
        if let Some(domains) = request.include_domains.as_ref().filter(|d| !d.is_empty()) {
            payload["includeDomains"] = json!(domains);
        }
        if let Some(domains) = request.exclude_domains.as_ref().filter(|d| !d.is_empty()) {
            payload["excludeDomains"] = json!(domains);
        }

        tracing::debug!(query = %request.query, num_results, "Exa search");
        self.post(Operation::Search, &payload).await
    }

    /// Fetch the content of one page
    ///
    /// # Errors
    ///
    /// Unavailable client, empty URL, timeout, transport failure, non-2xx
    /// status or an unparseable body.
    pub async fn get_content(&self, url: &str) -> Result<SearchResponse, SearchError> {
        if !self.is_available() {
            return Err(SearchError::Unavailable);
        }
        if url.is_empty() {
            return Err(SearchError::EmptyUrl);
        }

        let payload = json!({
            "ids": [url],
            "contents": {
                "text": true,
                "summary": true,
            },
        });

        tracing::debug!(url, "Exa contents");
        self.post(Operation::Contents, &payload).await
    }
}

fn truncate_chars(text: &str, max: usize) -> Option<String> {
    (text.chars().count() > max).then(|| text.chars().take(max).collect())
}

fn snippet(hit: &SearchHit) -> String {
    if let Some(text) = hit.text.as_deref().filter(|t| !t.is_empty()) {
        return match truncate_chars(text, MAX_SNIPPET_CHARS) {
            Some(cut) => format!("{cut}..."),
            None => text.to_string(),
        };
    }
    if let Some(highlights) = hit.highlights.as_ref().filter(|h| !h.is_empty()) {
        return highlights
            .iter()
            .take(2)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
    }
    if let Some(summary) = hit.summary.as_deref().filter(|s| !s.is_empty()) {
        return summary.to_string();
    }
    "No description available".to_string()
}

/// Render search results as a numbered list
pub fn format_search_results(response: &SearchResponse, query: &str) -> String {
    if let Some(error) = response.error_text() {
        return format!("Search error: {error}");
    }

    let mut lines = vec![
        format!("Web search results for: '{query}'"),
        "=".repeat(50),
    ];

    let hits = response.hits();
    if hits.is_empty() {
        lines.push("No results found for this query.".to_string());
    }
    for (i, hit) in hits.iter().enumerate() {
        lines.push(format!(
            "\n{}. {}",
            i + 1,
            hit.title.as_deref().unwrap_or("No title")
        ));
        lines.push(format!("   URL: {}", hit.url.as_deref().unwrap_or("No URL")));
        lines.push(format!("   {}", snippet(hit)));
    }

    lines.join("\n")
}

/// Render the first contents hit as title, summary and (bounded) text
pub fn format_page_content(response: &SearchResponse, url: &str) -> String {
    if let Some(error) = response.error_text() {
        return format!("Error: {error}");
    }

    let Some(hit) = response.hits().first() else {
        return format!("Error: No content found for URL: {url}");
    };

    let mut content = format!(
        "Title: {}\nURL: {url}\n\n",
        hit.title.as_deref().unwrap_or("No title")
    );

    if let Some(summary) = hit.summary.as_deref().filter(|s| !s.is_empty()) {
        content.push_str(&format!("Summary: {summary}\n\n"));
    }

    if let Some(text) = hit.text.as_deref().filter(|t| !t.is_empty()) {
        match truncate_chars(text, MAX_PAGE_CHARS) {
            Some(cut) => content.push_str(&format!("Content (truncated): {cut}...\n")),
            None => content.push_str(&format!("Content: {text}\n")),
        }
    }

    content
}
