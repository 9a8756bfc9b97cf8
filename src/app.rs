use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::{
    cli::args::{Cli, Command, RunArgs, ServeArgs},
    config::{ConfigLoader, FlowConfig},
    core::{controller::RunController, logbuf::LogBuffer, models::RunOptions, steps::StepTracker},
    executors::{toolchain, ProcessRunner},
    pipeline::{ConfigSource, Pipeline},
    server::{self, AppState},
    ui::printer,
    utils::{logging, time},
};

pub async fn run(cli: Cli) -> Result<()> {
    let config = ConfigLoader::load_with_custom_path(cli.config.as_deref())?;

    let logs = LogBuffer::default();
    logging::init(logging::levels_from_cli(&cli), logs.clone(), config.log_file.as_deref())?;

    let missing = toolchain::preflight(&config);
    if !missing.is_empty() {
        tracing::warn!("{} tool(s) missing; stages using them will fail", missing.len());
    }

    let source = ConfigSource::File(cli.config.clone());
    match cli.command {
        Command::Run(args) => run_once(source, args).await,
        Command::Serve(args) => serve(source, config, logs, args).await,
    }
}

async fn run_once(source: ConfigSource, args: RunArgs) -> Result<()> {
    let pipeline = Pipeline::new(source, Arc::new(ProcessRunner), StepTracker::default());
    let options = RunOptions {
        organization: args.organization,
        org_list: args.org_list,
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping the run");
            on_signal.cancel();
        }
    });

    let started = time::now();
    let result = pipeline.run(&options, &cancel).await;
    let finished = time::now();
    let status = match &result {
        Ok(()) => format!(
            "last run finished at {} ({})",
            time::rfc3339(finished),
            time::elapsed(started, finished)
        ),
        Err(err) => format!("run failed at {}: {}", time::rfc3339(finished), err),
    };

    printer::print_summary(&pipeline.steps().snapshot(), &status, result.is_err());
    if let Err(err) = result {
        bail!("flow run failed: {}", err);
    }
    Ok(())
}

async fn serve(source: ConfigSource, config: FlowConfig, logs: LogBuffer, args: ServeArgs) -> Result<()> {
    let pipeline = Pipeline::new(source, Arc::new(ProcessRunner), StepTracker::default());
    let state = Arc::new(AppState {
        controller: Arc::new(RunController::new(pipeline, logs)),
        lists: config.lists,
    });
    server::serve(args.addr, state)
        .await
        .with_context(|| format!("Server on {} stopped with an error", args.addr))
}
