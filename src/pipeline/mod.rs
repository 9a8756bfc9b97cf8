pub mod fetch;
pub mod stages;
pub mod targets;

#[cfg(test)]
pub mod testing;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::loader::expand_path;
use crate::config::{ConfigLoader, FlowConfig};
use crate::core::errors::{FlowError, FlowResult};
use crate::core::models::{
    RunOptions, StepStatus, DIR_FUZZ, DOC_FUZZ, DORK_LISTS, DORK_ORGS, FILTER_OUT_OF_SCOPE,
    GNMAP_SUMMARY, HTTPROBE_API, LOAD_CONFIG, NMAP, ROBOTS, SECURITY_CHECKS, SORT_HTTP, SUBFINDER,
};
use crate::core::steps::StepTracker;
use crate::executors::ToolRunner;
use crate::organizers::layout;
use crate::parsers::{RegexScanParser, ScanParser};
use crate::store::lists;
use fetch::{HttpFetcher, RobotsFetcher};
use stages::RunContext;

/// Where each run reads its configuration from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// Re-read on every run so edits apply without a restart.
    File(Option<PathBuf>),
    Fixed(Arc<FlowConfig>),
}

impl ConfigSource {
    fn load(&self) -> FlowResult<Arc<FlowConfig>> {
        match self {
            ConfigSource::File(path) => ConfigLoader::load_with_custom_path(path.as_deref())
                .map(Arc::new)
                .map_err(|e| FlowError::Config(format!("{:#}", e))),
            ConfigSource::Fixed(config) => Ok(Arc::clone(config)),
        }
    }
}

/// The fixed-order stage sequence. Cheap to clone; every clone reports into
/// the same [`StepTracker`].
#[derive(Clone)]
pub struct Pipeline {
    source: ConfigSource,
    runner: Arc<dyn ToolRunner>,
    fetcher: Option<Arc<dyn RobotsFetcher>>,
    parser: Arc<dyn ScanParser>,
    steps: StepTracker,
}

impl Pipeline {
    pub fn new(source: ConfigSource, runner: Arc<dyn ToolRunner>, steps: StepTracker) -> Self {
        Self {
            source,
            runner,
            fetcher: None,
            parser: Arc::new(RegexScanParser),
            steps,
        }
    }

    /// Overrides the HTTP fetcher built from the robots timeout.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn RobotsFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn steps(&self) -> &StepTracker {
        &self.steps
    }

    pub async fn run(&self, options: &RunOptions, cancel: &CancellationToken) -> FlowResult<()> {
        self.steps.transition(LOAD_CONFIG, StepStatus::Running);
        let ctx = match self.prepare(options, cancel) {
            Ok(ctx) => {
                self.steps.transition(LOAD_CONFIG, StepStatus::Done);
                ctx
            }
            Err(err) => {
                self.steps.transition(LOAD_CONFIG, StepStatus::Error);
                tracing::error!("Stage {} failed: {}", LOAD_CONFIG, err);
                return Err(err);
            }
        };

        ctx.track(DORK_ORGS, ctx.dork_orgs()).await?;
        ctx.track(SUBFINDER, ctx.subfinder()).await?;
        ctx.track(FILTER_OUT_OF_SCOPE, ctx.filter_out_of_scope()).await?;
        ctx.track(HTTPROBE_API, ctx.httprobe_api()).await?;
        ctx.track(DORK_LISTS, ctx.dork_lists()).await?;
        ctx.track(ROBOTS, ctx.robots()).await?;
        ctx.track(SORT_HTTP, ctx.sort_http()).await?;
        ctx.track(DOC_FUZZ, ctx.doc_fuzz()).await?;
        ctx.track(DIR_FUZZ, ctx.dir_fuzz()).await?;
        ctx.track(NMAP, ctx.nmap()).await?;
        ctx.track(GNMAP_SUMMARY, ctx.gnmap_summary()).await?;
        ctx.track(SECURITY_CHECKS, ctx.security_checks()).await?;

        tracing::info!("Flow completed");
        Ok(())
    }

    /// The load-config stage: configuration, output directories, run options.
    fn prepare(&self, options: &RunOptions, cancel: &CancellationToken) -> FlowResult<RunContext> {
        let config = self.source.load()?;
        layout::prepare_flow_dirs(&config.paths)?;

        let orgs_path = match options.org_list.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => expand_path(path),
            _ => config.lists.organizations.clone(),
        };

        if let Some(org) = options.organization.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            let outcome = lists::append_unique(&orgs_path, org)?;
            tracing::info!("Organization {} {} to {:?}", org, outcome.as_str(), orgs_path);
        }

        let fetcher: Arc<dyn RobotsFetcher> = match &self.fetcher {
            Some(fetcher) => Arc::clone(fetcher),
            None => Arc::new(HttpFetcher::new(Duration::from_secs(config.robots.timeout_secs))?),
        };

        Ok(RunContext {
            config,
            orgs_path,
            runner: Arc::clone(&self.runner),
            fetcher,
            parser: Arc::clone(&self.parser),
            steps: self.steps.clone(),
            cancel: cancel.clone(),
        })
    }
}
