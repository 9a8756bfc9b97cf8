use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Details of an external tool invocation that did not exit cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecError {
    pub tool: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub exit_code: Option<i32>,
    pub output_tail: String,
    pub duration_ms: u128,
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "{} exited with status {}", self.tool, code)?,
            None => write!(f, "{} terminated by signal", self.tool)?,
        }
        if !self.output_tail.is_empty() {
            write!(f, ": {}", self.output_tail)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("flow already running")]
    AlreadyRunning,

    #[error("{0}")]
    Exec(ExecError),

    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("post-condition failed: {0}")]
    PostCondition(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported list_type {0:?}")]
    UnknownList(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
