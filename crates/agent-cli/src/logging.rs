//! Tracing setup

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use agent_core::config::{LoggingConfig, level_directive};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives for a level name; HTTP internals stay at warn
fn directives(level: &str) -> String {
    format!("{},hyper=warn,reqwest=warn", level_directive(level))
}

/// Install the global subscriber
///
/// `RUST_LOG` wins when set; otherwise the `--log-level` override, then the
/// configured level. Console output goes to stderr.
pub fn init(config: &LoggingConfig, override_level: Option<&str>) -> anyhow::Result<()> {
    let level = override_level.unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)));

    let file_layer = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()?;

    tracing::debug!(level, "Logging configured");
    Ok(())
}
