//! Web Search Tools
//!
//! `web_search` and `get_page_content`, backed by [`ExaClient`]. Both always
//! answer with text; client errors are rendered for the model.

use std::sync::Arc;

use agent_core::{
    Settings, Tool, ToolCall, ToolSource,
    tool::{ParameterSchema, ToolSchema, WEB_SEARCH_CATEGORY},
};
use async_trait::async_trait;

use crate::exa::{
    ExaClient, SearchError, SearchRequest, format_page_content, format_search_results,
};

fn render_error(prefix: &str, err: &SearchError) -> String {
    match err.details() {
        Some(details) => format!("{prefix}: {err} ({details})"),
        None => format!("{prefix}: {err}"),
    }
}

/// Tool for searching the web
pub struct WebSearchTool {
    client: Arc<ExaClient>,
}

impl WebSearchTool {
    pub fn new(client: Arc<ExaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "web_search".into(),
            description: "Search the web for information using Exa search engine".into(),
            parameters: vec![
                ParameterSchema::required("query", "string", "The search query string"),
                ParameterSchema::optional(
                    "num_results",
                    "integer",
                    "Number of search results to return (1-10, default 5)",
                )
                .with_default(serde_json::json!(5)),
                ParameterSchema::optional(
                    "include_domains",
                    "array",
                    "Only return results from these domains",
                )
                .with_items("string"),
                ParameterSchema::optional(
                    "exclude_domains",
                    "array",
                    "Never return results from these domains",
                )
                .with_items("string"),
            ],
            category: Some(WEB_SEARCH_CATEGORY.into()),
            requires: Some("exa_api_key".into()),
        }
    }

    fn is_available(&self) -> bool {
        self.client.is_available()
    }

    async fn invoke(&self, call: &ToolCall) -> String {
        if !self.client.is_available() {
            return "Error: Web search not available - Exa API key not configured".into();
        }

        let query = call.str_arg("query").unwrap_or_default();
        if query.trim().is_empty() {
            return "Error: Search query cannot be empty".into();
        }

        let mut request =
            SearchRequest::new(query).num_results(call.int_arg("num_results").unwrap_or(5));
        request.include_domains = call.str_list_arg("include_domains");
        request.exclude_domains = call.str_list_arg("exclude_domains");

        tracing::info!(query, "Performing web search");
        match self.client.search(&request).await {
            Ok(response) => {
                let formatted = format_search_results(&response, query);
                tracing::info!(chars = formatted.len(), "Search completed");
                formatted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Web search failed");
                render_error("Web search error", &e)
            }
        }
    }
}

/// Tool for retrieving the content of one web page
pub struct PageContentTool {
    client: Arc<ExaClient>,
}

impl PageContentTool {
    pub fn new(client: Arc<ExaClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for PageContentTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "get_page_content".into(),
            description: "Get the content of a specific webpage".into(),
            parameters: vec![ParameterSchema::required(
                "url",
                "string",
                "The URL of the webpage to retrieve",
            )],
            category: Some(WEB_SEARCH_CATEGORY.into()),
            requires: Some("exa_api_key".into()),
        }
    }

    fn is_available(&self) -> bool {
        self.client.is_available()
    }

    async fn invoke(&self, call: &ToolCall) -> String {
        if !self.client.is_available() {
            return "Error: Page content retrieval not available - Exa API key not configured"
                .into();
        }

        let url = call.str_arg("url").unwrap_or_default();
        if url.is_empty() {
            return "Error: URL cannot be empty".into();
        }

        tracing::info!(url, "Retrieving page content");
        match self.client.get_content(url).await {
            Ok(response) => {
                let formatted = format_page_content(&response, url);
                tracing::info!(chars = formatted.len(), "Content retrieval completed");
                formatted
            }
            Err(e) => {
                tracing::warn!(error = %e, "Page content retrieval failed");
                render_error("Page content error", &e)
            }
        }
    }
}

/// Discovers the Exa-backed tools using the current search settings
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSearchSource;

impl ToolSource for WebSearchSource {
    fn discover(&self, settings: &Settings) -> Vec<Arc<dyn Tool>> {
        let client = Arc::new(ExaClient::new(&settings.exa));
        vec![
            Arc::new(WebSearchTool::new(Arc::clone(&client))),
            Arc::new(PageContentTool::new(client)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::ToolRegistry;
    use agent_core::config::{ExaConfig, PLACEHOLDER_API_KEY};
    use mockito::Matcher;
    use serde_json::json;

    fn client(base_url: &str, key: Option<&str>) -> Arc<ExaClient> {
        Arc::new(ExaClient::new(&ExaConfig {
            api_key: key.map(str::to_string),
            base_url: base_url.to_string(),
            ..ExaConfig::default()
        }))
    }

    fn call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            name: name.into(),
            arguments: serde_json::from_value(args).unwrap(),
            id: None,
        }
    }

    #[tokio::test]
    async fn test_web_search_normalizes_count_and_formats() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_body(Matcher::PartialJson(json!({"numResults": 5})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"results": [{"title": "Rust", "url": "https://rust-lang.org", "summary": "A language"}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let tool = WebSearchTool::new(client(&server.url(), Some("key")));
        let output = tool
            .invoke(&call("web_search", json!({"query": "rust", "num_results": 15})))
            .await;

        mock.assert_async().await;
        assert!(output.starts_with("Web search results for: 'rust'"));
        assert!(output.contains("1. Rust\n   URL: https://rust-lang.org\n   A language"));
    }

    #[tokio::test]
    async fn test_errors_become_text() {
        let tool = WebSearchTool::new(client("http://127.0.0.1:9", Some(PLACEHOLDER_API_KEY)));
        assert_eq!(
            tool.invoke(&call("web_search", json!({"query": "rust"}))).await,
            "Error: Web search not available - Exa API key not configured"
        );

        let tool = WebSearchTool::new(client("http://127.0.0.1:9", Some("key")));
        assert_eq!(
            tool.invoke(&call("web_search", json!({"query": "   "}))).await,
            "Error: Search query cannot be empty"
        );

        let page = PageContentTool::new(client("http://127.0.0.1:9", None));
        assert_eq!(
            page.invoke(&call("get_page_content", json!({"url": "https://x"}))).await,
            "Error: Page content retrieval not available - Exa API key not configured"
        );

        let page = PageContentTool::new(client("http://127.0.0.1:9", Some("key")));
        assert_eq!(
            page.invoke(&call("get_page_content", json!({"url": ""}))).await,
            "Error: URL cannot be empty"
        );
    }

    #[tokio::test]
    async fn test_server_error_is_rendered_with_details() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/contents")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let page = PageContentTool::new(client(&server.url(), Some("key")));
        let output = page
            .invoke(&call("get_page_content", json!({"url": "https://example.com"})))
            .await;

        assert_eq!(
            output,
            "Page content error: Content retrieval failed with status 500 (upstream down)"
        );
    }

    #[test]
    fn test_registry_with_search_source() {
        let mut settings = Settings::default();
        settings.exa.api_key = Some(PLACEHOLDER_API_KEY.into());
        let mut registry = ToolRegistry::new(settings.clone()).with_source(WebSearchSource);
        registry.discover();

        let statuses = registry.status(None);
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| !s.available));
        assert_eq!(statuses[0].requires.as_deref(), Some("exa_api_key"));

        settings.exa.api_key = Some("real-key".into());
        registry.set_settings(settings);
        registry.refresh();

        let names: Vec<String> = registry
            .available_tools()
            .iter()
            .map(|t| t.schema().name)
            .collect();
        assert_eq!(names, vec!["web_search", "get_page_content"]);
    }
}
