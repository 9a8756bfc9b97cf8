use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::errors::{FlowError, FlowResult};
use super::logbuf::LogBuffer;
use super::models::{FlowRun, RunOptions, StepView};
use crate::pipeline::Pipeline;
use crate::utils::time;

/// Owns the single active run and everything observers may read about it.
///
/// The run flag, the step map and the log buffer sit behind separate locks,
/// so status readers never wait on the pipeline.
pub struct RunController {
    pipeline: Pipeline,
    run: Arc<Mutex<FlowRun>>,
    logs: LogBuffer,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl RunController {
    pub fn new(pipeline: Pipeline, logs: LogBuffer) -> Self {
        Self {
            pipeline,
            run: Arc::new(Mutex::new(FlowRun::default())),
            logs,
            handle: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts the pipeline in the background. Fails with
    /// [`FlowError::AlreadyRunning`], leaving all state untouched, while a
    /// run is active.
    pub fn start_run(&self, options: RunOptions) -> FlowResult<()> {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if run.running {
            return Err(FlowError::AlreadyRunning);
        }
        if self.shutdown.is_cancelled() {
            return Err(FlowError::Cancelled);
        }

        run.running = true;
        run.status = "running".to_string();
        run.started_at = Some(time::now());
        run.finished_at = None;
        self.pipeline.steps().reset();
        tracing::info!("Starting flow run");

        let pipeline = self.pipeline.clone();
        let state = Arc::clone(&self.run);
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(async move {
            let worker = tokio::spawn(async move { pipeline.run(&options, &cancel).await });
            let result = match worker.await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_err) => Err(format!("pipeline task aborted: {}", join_err)),
            };

            let finished = time::now();
            let mut run = state.lock().unwrap_or_else(PoisonError::into_inner);
            run.running = false;
            run.finished_at = Some(finished);
            run.status = match result {
                Ok(()) => format!("last run finished at {}", time::rfc3339(finished)),
                Err(err) => {
                    tracing::error!("Flow run failed: {}", err);
                    format!("run failed at {}: {}", time::rfc3339(finished), err)
                }
            };
            if let Some(started) = run.started_at {
                tracing::info!("Flow run took {}", time::elapsed(started, finished));
            }
        });

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    pub fn status(&self) -> FlowRun {
        self.run.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().unwrap_or_else(PoisonError::into_inner).running
    }

    pub fn steps(&self) -> Vec<StepView> {
        self.pipeline.steps().snapshot()
    }

    pub fn logs(&self) -> Vec<String> {
        self.logs.tail()
    }

    /// Waits for the background run, if any, to finish.
    pub async fn join(&self) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Run task failed: {}", e);
            }
        }
    }

    /// Cancels the active run, kills its child processes and waits for it.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.join().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{StepStatus, NMAP, SECURITY_CHECKS};
    use crate::core::steps::StepTracker;
    use crate::executors::{Invocation, ToolRunner};
    use crate::pipeline::testing::{self, FakeFetcher, FakeRunner};
    use crate::pipeline::ConfigSource;
    use crate::store::lists;
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    /// Blocks every tool until a permit is released.
    struct GatedRunner {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl ToolRunner for GatedRunner {
        async fn run(&self, _invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<()> {
            tokio::select! {
                permit = self.gate.acquire() => {
                    permit.map(|p| p.forget()).map_err(|_| FlowError::Cancelled)
                }
                _ = cancel.cancelled() => Err(FlowError::Cancelled),
            }
        }

        async fn capture(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<String> {
            self.run(invocation, cancel).await.map(|_| String::new())
        }
    }

    fn controller(dir: &TempDir, runner: Arc<dyn ToolRunner>) -> RunController {
        let config = testing::config_in(dir.path());
        lists::write_lines(&config.lists.ips, &["10.0.0.5"]).unwrap();
        let pipeline = Pipeline::new(ConfigSource::Fixed(Arc::new(config)), runner, StepTracker::default())
            .with_fetcher(Arc::new(FakeFetcher::default()));
        RunController::new(pipeline, LogBuffer::default())
    }

    async fn wait_for(controller: &RunController, id: &str, status: StepStatus) {
        for _ in 0..200 {
            if controller.steps().iter().any(|s| s.id == id && s.status == status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("step {} never reached {:?}", id, status);
    }

    #[tokio::test]
    async fn second_start_is_rejected_without_touching_the_first_run() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(Semaphore::new(0));
        let controller = controller(&dir, Arc::new(GatedRunner { gate: gate.clone() }));

        controller.start_run(RunOptions::default()).unwrap();
        wait_for(&controller, NMAP, StepStatus::Running).await;
        let before = controller.status();
        let steps_before = controller.steps();

        let err = controller.start_run(RunOptions::default()).unwrap_err();
        assert!(matches!(err, FlowError::AlreadyRunning));
        assert_eq!(err.to_string(), "flow already running");

        let after = controller.status();
        assert!(after.running);
        assert_eq!(after.status, "running");
        assert_eq!(after.started_at, before.started_at);
        assert_eq!(controller.steps(), steps_before);

        gate.add_permits(1);
        controller.join().await;

        let done = controller.status();
        assert!(!done.running);
        assert!(done.status.starts_with("last run finished at "), "{}", done.status);
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn failed_run_reports_the_error() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, Arc::new(FakeRunner::default().failing("nmap")));

        controller.start_run(RunOptions::default()).unwrap();
        controller.join().await;

        let status = controller.status();
        assert!(!status.running);
        assert!(status.status.starts_with("run failed at "), "{}", status.status);
        assert!(status.status.contains("nmap exited with status 1"));
        let nmap = controller.steps().into_iter().find(|s| s.id == NMAP).unwrap();
        assert_eq!(nmap.status, StepStatus::Error);
    }

    #[tokio::test]
    async fn a_finished_run_can_be_restarted_with_fresh_steps() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, Arc::new(FakeRunner::default().failing("nmap")));

        controller.start_run(RunOptions::default()).unwrap();
        controller.join().await;
        assert!(!controller.is_running());

        // single-threaded runtime: the new task has not been polled yet
        controller.start_run(RunOptions::default()).unwrap();
        assert!(controller.is_running());
        assert!(controller.steps().iter().all(|s| s.status == StepStatus::Pending));
        controller.join().await;
        let security = controller.steps().into_iter().find(|s| s.id == SECURITY_CHECKS).unwrap();
        assert_eq!(security.status, StepStatus::Pending);
    }

    #[tokio::test]
    async fn shutdown_cancels_the_active_run() {
        let dir = TempDir::new().unwrap();
        let controller = controller(&dir, Arc::new(GatedRunner { gate: Arc::new(Semaphore::new(0)) }));

        controller.start_run(RunOptions::default()).unwrap();
        wait_for(&controller, NMAP, StepStatus::Running).await;
        controller.shutdown().await;

        let status = controller.status();
        assert!(!status.running);
        assert!(status.status.ends_with("run cancelled"), "{}", status.status);
        assert!(matches!(
            controller.start_run(RunOptions::default()),
            Err(FlowError::Cancelled)
        ));
    }

    #[test]
    fn logs_come_from_the_shared_buffer() {
        let dir = TempDir::new().unwrap();
        let logs = LogBuffer::default();
        let config = testing::config_in(dir.path());
        let pipeline = Pipeline::new(
            ConfigSource::Fixed(Arc::new(config)),
            Arc::new(FakeRunner::default()),
            StepTracker::default(),
        );
        let controller = RunController::new(pipeline, logs.clone());
        logs.push("[bflow] hello");
        assert_eq!(controller.logs(), vec!["[bflow] hello"]);
        assert_eq!(controller.status().status, "idle");
    }
}
