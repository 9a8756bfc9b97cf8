use super::command::{execute, Invocation};
use crate::core::errors::FlowResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Seam between the stages and the operating system.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs to completion; output only goes to the log.
    async fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<()>;

    /// Runs to completion and returns stdout.
    async fn capture(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<String>;
}

/// Spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<()> {
        execute(invocation, cancel, false).await.map(|_| ())
    }

    async fn capture(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<String> {
        execute(invocation, cancel, true).await.map(|result| result.stdout)
    }
}
