//! Command-line argument parsing.

use clap::Parser;

/// Conversational agent for locally served models.
///
/// Runs an interactive chat by default. The model server and search
/// credentials come from the environment or `.env`.
#[derive(Parser, Debug)]
#[command(name = "local-agent")]
#[command(version, about, long_about = None)]
#[command(after_help = r#"Examples:
  local-agent                               # Interactive chat
  local-agent --chat "What is the weather?" # Single question
  local-agent --test                        # Test connection
  local-agent --info                        # Show system info
  local-agent --model gpt-oss-20b           # Use specific model
"#)]
pub struct Cli {
    /// Send a single message and exit.
    #[arg(short, long, value_name = "MESSAGE")]
    pub chat: Option<String>,

    /// Model to use (overrides config).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Test agent functionality.
    #[arg(short, long)]
    pub test: bool,

    /// Show system information.
    #[arg(short, long)]
    pub info: bool,

    /// Set log level.
    #[arg(
        short,
        long,
        value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"],
        ignore_case = true
    )]
    pub log_level: Option<String>,

    /// Stream responses as they are generated (default).
    #[arg(long, overrides_with = "no_stream")]
    pub stream: bool,

    /// Wait for the full response before printing.
    #[arg(long)]
    pub no_stream: bool,

    /// Show the model's reasoning while streaming.
    #[arg(long)]
    pub show_reasoning: bool,

    /// Don't wait for the model server to come up.
    #[arg(long)]
    pub no_wait: bool,
}

impl Cli {
    /// Whether responses should be streamed
    pub fn streaming(&self) -> bool {
        !self.no_stream
    }
}
