//! local-agent command-line front-end
//!
//! Interactive chat by default; `--chat`, `--info` and `--test` run once
//! and exit. Settings come from the environment and `.env`.

mod cli;
mod commands;
mod logging;

use std::process::ExitCode;

use agent_core::{AgentError, Settings, config::ConfigError};
use clap::Parser;

use crate::cli::Cli;
use crate::commands::Session;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            if let Some(agent_err) = err.downcast_ref::<AgentError>() {
                eprintln!("Agent Error: {agent_err}");
                if let Some(details) = agent_err.details() {
                    eprintln!("Details: {details}");
                }
            } else if let Some(config_err) = err.downcast_ref::<ConfigError>() {
                eprintln!("Configuration error: {config_err}");
            } else {
                tracing::error!(error = %err, "Unexpected error");
                eprintln!("Unexpected error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings = Settings::load()?;
    logging::init(&settings.logging, cli.log_level.as_deref())?;

    if let Some(model) = &cli.model {
        settings.vllm.model.clone_from(model);
    }
    tracing::info!(model = %settings.vllm.model, url = %settings.vllm.base_url, "Application initialized");

    if cli.test {
        let passed = commands::test_agent(settings).await;
        return Ok(if passed { ExitCode::SUCCESS } else { ExitCode::FAILURE });
    }

    if cli.info {
        commands::show_info(&settings).await;
        return Ok(ExitCode::SUCCESS);
    }

    let wait = settings.vllm.wait_for_server && !cli.no_wait;
    let agent = commands::build_agent(settings, wait).await?;

    if let Some(message) = &cli.chat {
        commands::single_chat(&agent, message, cli.streaming(), cli.show_reasoning).await?;
        return Ok(ExitCode::SUCCESS);
    }

    Session::new(agent, cli.streaming(), cli.show_reasoning)
        .run()
        .await?;
    Ok(ExitCode::SUCCESS)
}
