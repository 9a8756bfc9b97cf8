use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::logbuf::LogBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogLevels {
    /// Events from this crate, including tool output.
    pub flow: tracing::Level,
    /// Events from dependencies (hyper, reqwest, ...).
    pub dependencies: tracing::Level,
}

pub fn levels_from_cli(cli: &crate::cli::args::Cli) -> LogLevels {
    let flow = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let dependencies = if cli.verbose { flow } else { tracing::Level::WARN };
    LogLevels { flow, dependencies }
}

/// Installs the global subscriber: compact stderr output, a plain copy in
/// `buffer` for the HTTP log tail, and optionally an appended log file.
pub fn init(levels: LogLevels, buffer: LogBuffer, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(levels.dependencies.into())
        .add_directive(format!("bflow={}", levels.flow).parse()?);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_ansi(false)
                .with_target(false)
                .with_level(false)
                .with_writer(buffer),
        )
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
