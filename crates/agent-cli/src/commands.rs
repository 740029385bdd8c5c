//! CLI commands: system info, connection test, single-shot and interactive chat.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{Agent, AgentError, DebugLogger, RunEvent, Settings, ToolRegistry};
use agent_runtime::{OpenAiRuntime, WebSearchSource};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prompt used by the connection test
const TEST_PROMPT: &str = "Hello, please introduce yourself briefly.";

const SERVER_WAIT: Duration = Duration::from_secs(60);
const SERVER_POLL: Duration = Duration::from_secs(2);

const HELP: &str = "\
Commands:
  /help              Show this help message
  /info              Show agent and system information
  /tools             Show available tools and their status
  /debug             Show debug session information
  /toggle-stream     Toggle streaming mode
  /toggle-reasoning  Toggle reasoning display
  /quit, /exit       Exit the application

Just type your message to chat with the agent!";

fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}

fn row(component: &str, status: &str, details: &str) {
    println!("  {component:<18} {status:<14} {details}");
}

fn flag(enabled: bool) -> &'static str {
    if enabled { "Enabled" } else { "Disabled" }
}

/// Wire the runtime, web search tools and settings into an agent
///
/// # Errors
///
/// Propagates builder failures.
pub fn assemble(settings: Settings, runtime: OpenAiRuntime) -> agent_core::Result<Agent> {
    Agent::builder()
        .runtime(Arc::new(runtime))
        .tool_source(WebSearchSource)
        .settings(settings)
        .build()
}

/// Build an agent, optionally waiting for the model server first
///
/// # Errors
///
/// Fails when the server never came up or the agent cannot be built.
pub async fn build_agent(settings: Settings, wait_for_server: bool) -> anyhow::Result<Agent> {
    let runtime = OpenAiRuntime::new(&settings)?;
    if wait_for_server {
        runtime.wait_for_server(SERVER_WAIT, SERVER_POLL).await?;
    }
    Ok(assemble(settings, runtime)?)
}

/// Print system information
pub async fn show_info(settings: &Settings) {
    println!("Local Agent Information");

    match OpenAiRuntime::new(settings) {
        Ok(runtime) => {
            let report = runtime.test_connection().await;
            row(
                "Model Server",
                if report.health_check_passed { "Connected" } else { "Disconnected" },
                &format!("{} ({})", report.server_url, report.configured_model),
            );
            let shown: Vec<&str> = report
                .available_models
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            row("Models Available", &report.model_count.to_string(), &shown.join(", "));
        }
        Err(e) => row("Model Server", "Error", &e.to_string()),
    }

    let mut registry = ToolRegistry::new(settings.clone()).with_source(WebSearchSource);
    registry.discover();
    let summary = registry.summary();
    row(
        "Tools Available",
        &format!("{}/{}", summary.available_tools, summary.total_tools),
        &summary.available_tool_names.join(", "),
    );

    row("Log Level", &settings.logging.level, "");
    row(
        "Debug Logging",
        flag(settings.debug.enabled),
        &if settings.debug.enabled {
            settings.debug.log_dir.display().to_string()
        } else {
            String::new()
        },
    );

    if settings.debug.enabled {
        print_debug_session(&DebugLogger::new(&settings.debug));
    }
}

fn print_debug_session(debug: &DebugLogger) {
    let summary = debug.session_summary();
    if !summary.enabled {
        println!("Debug logging is disabled");
        return;
    }
    println!("\nDebug Session");
    println!("  Session ID:      {}", summary.session_id);
    println!("  Messages Logged: {}", summary.message_count);
    println!("  Log Files:       {}", summary.total_log_files);
    println!("  Log Directory:   {}", summary.log_dir.display());
}

/// Check the server, then ask the agent for a short introduction
pub async fn test_agent(settings: Settings) -> bool {
    println!("Testing agent functionality...");

    let runtime = match OpenAiRuntime::new(&settings) {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("Agent test failed: {e}");
            return false;
        }
    };

    let report = runtime.test_connection().await;
    if !report.health_check_passed {
        println!("Model server connection failed");
        if let Some(error) = report.error {
            println!("Details: {error}");
        }
        return false;
    }
    println!("Model server connection successful");

    let outcome = match assemble(settings, runtime) {
        Ok(agent) => agent.chat(TEST_PROMPT).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(response) if response.chars().count() > 10 => {
            println!("Agent test passed");
            println!("Response preview: {}", preview(&response, 100));
            true
        }
        Ok(_) => {
            println!("Agent test failed - empty or invalid response");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "Agent test failed");
            println!("Agent test failed: {e}");
            false
        }
    }
}

/// Print a streamed run as it arrives; returns the extracted answer
async fn stream_response(agent: &Agent, message: &str, show_reasoning: bool) -> agent_core::Result<String> {
    let mut stream = agent.chat_stream(message).await?;
    let mut stdout = std::io::stdout();
    let mut printed_text = false;
    let mut in_reasoning = false;

    while let Some(event) = stream.next().await {
        match event? {
            RunEvent::ReasoningDelta(delta) => {
                if show_reasoning {
                    if !in_reasoning {
                        print!("[reasoning] ");
                        in_reasoning = true;
                    }
                    print!("{delta}");
                }
            }
            RunEvent::TextDelta(delta) => {
                if in_reasoning {
                    println!("\n");
                    in_reasoning = false;
                }
                print!("{delta}");
                printed_text = true;
            }
            RunEvent::ToolInvoked { name, arguments } => {
                println!("\n[tool] {name} {}", preview(&arguments, 80));
            }
            RunEvent::ToolCompleted { name, output } => {
                println!("[tool] {name} returned {} characters", output.chars().count());
            }
            RunEvent::Completed(result) => {
                let answer = agent.finish(&result)?;
                if printed_text {
                    println!();
                } else {
                    println!("{answer}");
                }
                return Ok(answer);
            }
        }
        let _ = stdout.flush();
    }

    Err(AgentError::Other("Stream ended before the run completed".into()))
}

async fn respond(agent: &Agent, message: &str, streaming: bool, show_reasoning: bool) -> agent_core::Result<String> {
    if streaming {
        stream_response(agent, message, show_reasoning).await
    } else {
        println!("Thinking...");
        let answer = agent.chat(message).await?;
        println!("\n{answer}");
        Ok(answer)
    }
}

fn report_error(err: &AgentError) {
    match err {
        AgentError::EmptyResponse { .. } => {
            eprintln!("\nEmpty response from agent: {err}");
            if let Some(details) = err.details() {
                eprintln!("Details: {details}");
            }
            eprintln!("This may be a model server compatibility issue. Try rephrasing your question.");
        }
        _ => {
            eprintln!("\nAgent error: {err}");
            if let Some(details) = err.details() {
                eprintln!("Details: {details}");
            }
        }
    }
}

/// Answer one message and return
///
/// # Errors
///
/// Propagates the chat failure.
pub async fn single_chat(agent: &Agent, message: &str, streaming: bool, show_reasoning: bool) -> agent_core::Result<()> {
    respond(agent, message, streaming, show_reasoning).await.map(|_| ())
}

/// Slash command typed at the interactive prompt
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Help,
    Info,
    Tools,
    Debug,
    ToggleStream,
    ToggleReasoning,
    Quit,
    Unknown(String),
}

impl Command {
    /// Parse a prompt line; `None` for plain chat messages
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.starts_with('/') {
            return None;
        }
        Some(match input.to_ascii_lowercase().as_str() {
            "/help" => Self::Help,
            "/info" => Self::Info,
            "/tools" => Self::Tools,
            "/debug" => Self::Debug,
            "/toggle-stream" => Self::ToggleStream,
            "/toggle-reasoning" => Self::ToggleReasoning,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Unknown(input.to_string()),
        })
    }
}

/// Interactive chat session
pub struct Session {
    agent: Agent,
    streaming: bool,
    show_reasoning: bool,
}

impl Session {
    pub fn new(agent: Agent, streaming: bool, show_reasoning: bool) -> Self {
        Self { agent, streaming, show_reasoning }
    }

    fn print_agent_info(&self) {
        let info = self.agent.info();
        println!("Agent Information");
        println!("  Agent Name:     {}", info.agent_name);
        println!("  Model:          {}", info.model);
        println!("  Model Server:   {}", info.vllm_base_url);
        println!(
            "  Tools:          {}",
            if info.available_tools.is_empty() { "None".into() } else { info.available_tools.join(", ") }
        );
        println!("  Streaming:      {}", flag(self.streaming));
        println!("  Show Reasoning: {}", flag(self.show_reasoning));
        println!("  Debug Logging:  {}", flag(info.debug_enabled));
        println!(
            "  Web Search:     {}",
            if info.web_search_enabled { "Available" } else { "Not configured" }
        );
    }

    fn print_tools_status(&self) {
        let summary = self.agent.registry().summary();
        println!("Tools Status");
        println!("  Available Tools: {}/{}", summary.available_tools, summary.total_tools);
        println!("  Tool Categories:");
        for (category, count) in &summary.categories {
            println!("  - {category}: {}/{} available", count.available, count.total);
        }
        if !summary.available_tool_names.is_empty() {
            println!("  Active Tools: {}", summary.available_tool_names.join(", "));
        }
        if !self.agent.settings().exa.is_available() {
            println!("\nWeb search requires an Exa API key: set EXA__API_KEY in your .env file.");
        }
    }

    /// Handle a slash command; returns false when the session should end
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Help => println!("{HELP}"),
            Command::Info => self.print_agent_info(),
            Command::Tools => self.print_tools_status(),
            Command::Debug => print_debug_session(self.agent.debug_logger()),
            Command::ToggleStream => {
                self.streaming = !self.streaming;
                println!("Streaming mode {}", flag(self.streaming).to_lowercase());
            }
            Command::ToggleReasoning => {
                self.show_reasoning = !self.show_reasoning;
                println!("Reasoning display {}", flag(self.show_reasoning).to_lowercase());
            }
            Command::Unknown(input) => {
                println!("Unknown command: {input}");
                println!("Type /help for available commands");
            }
        }
        true
    }

    /// Run the prompt loop until `/quit`, end of input or Ctrl+C at the prompt
    ///
    /// # Errors
    ///
    /// Fails only when stdin cannot be read.
    pub async fn run(mut self) -> anyhow::Result<()> {
        println!("Local Agent\nType '/help' for commands, '/quit' to exit");
        println!("Agent ready! Using model: {}", self.agent.settings().vllm.model);

        let tool_count = self.agent.tools().len();
        if tool_count == 0 {
            println!("No tools available - web search requires an Exa API key");
        } else {
            println!("{tool_count} tools available");
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("\nYou: ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => break,
            };
            let Some(line) = line else { break };

            let message = line.trim();
            if message.is_empty() {
                continue;
            }

            if let Some(command) = Command::parse(message) {
                if !self.handle(command) {
                    break;
                }
                continue;
            }

            println!("\nAssistant");
            tokio::select! {
                outcome = respond(&self.agent, message, self.streaming, self.show_reasoning) => {
                    if let Err(e) = outcome {
                        report_error(&e);
                    }
                }
                _ = tokio::signal::ctrl_c() => println!("\nInterrupted"),
            }
        }

        println!("\nGoodbye!");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(Command::parse("hello"), None);
        assert_eq!(Command::parse("/HELP"), Some(Command::Help));
        assert_eq!(Command::parse(" /exit "), Some(Command::Quit));
        assert_eq!(Command::parse("/toggle-stream"), Some(Command::ToggleStream));
        assert_eq!(Command::parse("/toggle-reasoning"), Some(Command::ToggleReasoning));
        assert_eq!(
            Command::parse("/history"),
            Some(Command::Unknown("/history".into()))
        );
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghijkl", 10), "abcdefghij...");
    }

    #[tokio::test]
    async fn test_session_toggles() {
        let agent = assemble(Settings::default(), OpenAiRuntime::new(&Settings::default()).unwrap()).unwrap();
        let mut session = Session::new(agent, true, false);

        assert!(session.handle(Command::ToggleStream));
        assert!(!session.streaming);
        assert!(session.handle(Command::ToggleReasoning));
        assert!(session.show_reasoning);
        assert!(!session.handle(Command::Quit));
    }

    #[tokio::test]
    async fn test_agent_fails_against_unreachable_server() {
        let mut settings = Settings::default();
        settings.vllm.base_url = "http://127.0.0.1:9/v1".into();
        assert!(!test_agent(settings).await);
    }
}
