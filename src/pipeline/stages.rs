//! The individual pipeline stages.
//!
//! Each stage first checks its inputs and marks itself `skipped` when they are
//! absent; otherwise it marks itself `running` and does its work. The caller
//! ([`RunContext::track`]) turns the outcome into `done` or `error`.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::fetch::RobotsFetcher;
use super::targets::{self, sanitize_filename};
use crate::config::FlowConfig;
use crate::core::errors::{FlowError, FlowResult};
use crate::core::models::{
    StepStatus, DIR_FUZZ, DOC_FUZZ, DORK_LISTS, DORK_ORGS, FILTER_OUT_OF_SCOPE, GNMAP_SUMMARY,
    HTTPROBE_API, NMAP, ROBOTS, SECURITY_CHECKS, SORT_HTTP, SUBFINDER,
};
use crate::core::steps::StepTracker;
use crate::executors::{Invocation, ToolRunner};
use crate::parsers::dorks::{self, FileStamp};
use crate::parsers::ffuf::{self, FfufResults};
use crate::parsers::gnmap::{GnmapSummary, InterestFilter, ScanParser, ServiceDescriptor};
use crate::parsers::robots::parse_robots;
use crate::store::lists;

const SEARCHSPLOIT_SEPARATOR: &str = "-----------------------------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ran,
    Skipped,
}

/// Everything one run needs, resolved once by the load-config stage.
pub struct RunContext {
    pub config: Arc<FlowConfig>,
    /// Organizations list for this run; `--org-list` overrides the configured one.
    pub orgs_path: PathBuf,
    pub runner: Arc<dyn ToolRunner>,
    pub fetcher: Arc<dyn RobotsFetcher>,
    pub parser: Arc<dyn ScanParser>,
    pub steps: StepTracker,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Awaits a stage and records its terminal status.
    pub async fn track<F>(&self, id: &'static str, stage: F) -> FlowResult<()>
    where
        F: Future<Output = FlowResult<Outcome>>,
    {
        if self.cancel.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        match stage.await {
            Ok(Outcome::Ran) => {
                self.steps.transition(id, StepStatus::Done);
                tracing::info!("Stage {} done", id);
                Ok(())
            }
            Ok(Outcome::Skipped) => Ok(()),
            Err(err) => {
                self.steps.transition(id, StepStatus::Error);
                tracing::error!("Stage {} failed: {}", id, err);
                Err(err)
            }
        }
    }

    fn begin(&self, id: &'static str) {
        self.steps.transition(id, StepStatus::Running);
        tracing::info!("Stage {} running", id);
    }

    fn skip(&self, id: &'static str, reason: &str) -> FlowResult<Outcome> {
        self.steps.transition(id, StepStatus::Skipped);
        tracing::info!("Stage {} skipped: {}", id, reason);
        Ok(Outcome::Skipped)
    }

    async fn run_tool(&self, invocation: Invocation) -> FlowResult<()> {
        self.runner.run(&invocation, &self.cancel).await
    }

    fn tool(&self, program: &str, args: Vec<String>) -> Invocation {
        Invocation::new(program, args)
    }

    pub async fn dork_orgs(&self) -> FlowResult<Outcome> {
        if !lists::exists(&self.orgs_path) {
            return self.skip(DORK_ORGS, "no organizations list");
        }
        self.begin(DORK_ORGS);

        let dorking = &self.config.paths.dorking_dir;
        let before = dorks::file_stamps(dorking)?;
        let invocation = self
            .tool(
                &self.config.tools.generate_dork_links,
                vec!["-oR".into(), absolute_arg(&self.orgs_path)?, "--api".into()],
            )
            .in_dir(dorking);
        self.run_tool(invocation).await?;
        self.collect_dork_outputs(&before)?;
        Ok(Outcome::Ran)
    }

    pub async fn subfinder(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        if !lists::exists(&lists_cfg.wildcards) {
            return self.skip(SUBFINDER, "no wildcards list");
        }
        self.begin(SUBFINDER);

        let tools = &self.config.tools;
        let script = format!(
            "{} -dL {} | {} {}",
            quote(&tools.subfinder),
            quote_path(&lists_cfg.wildcards),
            quote(&tools.anew),
            quote_path(&lists_cfg.domains)
        );
        self.run_tool(Invocation::shell(script)).await?;
        Ok(Outcome::Ran)
    }

    pub async fn filter_out_of_scope(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        if !lists::exists(&lists_cfg.domains) || !lists::exists(&lists_cfg.out_of_scope) {
            return self.skip(FILTER_OUT_OF_SCOPE, "domains or out-of-scope list missing");
        }
        self.begin(FILTER_OUT_OF_SCOPE);
        lists::filter_excluding(&lists_cfg.domains, &lists_cfg.out_of_scope)?;
        Ok(Outcome::Ran)
    }

    pub async fn httprobe_api(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        if !lists::exists(&lists_cfg.domains) {
            return self.skip(HTTPROBE_API, "no domains list");
        }
        self.begin(HTTPROBE_API);

        let tools = &self.config.tools;
        let script = format!(
            "cat {} | grep api | {} --prefer-https | {} {}",
            quote_path(&lists_cfg.domains),
            quote(&tools.httprobe),
            quote(&tools.anew),
            quote_path(&lists_cfg.apidomains)
        );
        self.run_tool(Invocation::shell(script)).await?;
        Ok(Outcome::Ran)
    }

    pub async fn dork_lists(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        let present: Vec<&Path> = [&lists_cfg.wildcards, &lists_cfg.domains, &lists_cfg.apidomains]
            .into_iter()
            .map(PathBuf::as_path)
            .filter(|p| lists::exists(p))
            .collect();
        if present.is_empty() {
            return self.skip(DORK_LISTS, "no host lists");
        }
        self.begin(DORK_LISTS);

        let before = dorks::file_stamps(&self.config.paths.dorking_dir)?;
        for list in present {
            let invocation = self
                .tool(
                    &self.config.tools.generate_dork_links,
                    vec!["-L".into(), absolute_arg(list)?, "--api".into()],
                )
                .in_dir(&self.config.paths.dorking_dir);
            self.run_tool(invocation).await?;
        }
        self.collect_dork_outputs(&before)?;
        Ok(Outcome::Ran)
    }

    /// Files dork outputs into category folders. The dork commands must have
    /// written or rewritten at least one file since `before`; output left by
    /// earlier stages or runs does not count.
    fn collect_dork_outputs(&self, before: &HashMap<PathBuf, FileStamp>) -> FlowResult<()> {
        let dorking = &self.config.paths.dorking_dir;
        let produced = dorks::changed_files(dorking, before)?;
        let moved = dorks::categorize_outputs(dorking, dorking)?;
        tracing::debug!("Dork commands produced {} files, categorized {}", produced.len(), moved);
        if produced.is_empty() {
            return Err(FlowError::PostCondition(format!(
                "dork commands produced no files in {}",
                dorking.display()
            )));
        }
        Ok(())
    }

    pub async fn robots(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        let sources = [
            lists_cfg.wildcards.as_path(),
            lists_cfg.domains.as_path(),
            lists_cfg.apidomains.as_path(),
        ];
        if !sources.iter().any(|p| lists::exists(p)) {
            return self.skip(ROBOTS, "no host lists");
        }
        self.begin(ROBOTS);

        let hosts = targets::union_of(&sources)?;
        let total = hosts.len();
        let mut fetched = stream::iter(hosts)
            .map(|target| self.fetch_robots(target))
            .buffer_unordered(self.config.concurrency.robots);

        let mut hits = 0usize;
        while let Some((target, body)) = fetched.next().await {
            let body = match body {
                Ok(body) => body,
                Err(FlowError::Cancelled) => return Err(FlowError::Cancelled),
                Err(err) => {
                    tracing::warn!("Skipping robots.txt for {}: {}", target, err);
                    continue;
                }
            };
            if self.store_robots(&target, &body)? {
                hits += 1;
            }
        }
        tracing::info!("robots.txt: {} of {} targets disallow paths", hits, total);
        Ok(Outcome::Ran)
    }

    async fn fetch_robots(&self, target: String) -> (String, FlowResult<String>) {
        let url = targets::robots_url(&target);
        tracing::debug!("GET {}", url);
        let body = tokio::select! {
            body = self.fetcher.fetch(&url) => body,
            _ = self.cancel.cancelled() => Err(FlowError::Cancelled),
        };
        (target, body)
    }

    /// Writes body and disallow list into the hit or no-hit bucket. Returns
    /// whether the target was a hit.
    fn store_robots(&self, target: &str, body: &str) -> FlowResult<bool> {
        let paths = &self.config.paths;
        let result = parse_robots(body);
        let bucket = if result.is_hit() {
            paths.robots_hits()
        } else {
            paths.robots_no_hits()
        };

        let clean = sanitize_filename(target);
        write_text(&bucket.join(format!("{}.robots.txt", clean)), body)?;
        write_text(
            &bucket.join(format!("{}.robots.urls", clean)),
            &result.disallowed_paths.join("\n"),
        )?;

        if result.is_hit() {
            lists::append_lines(&paths.robots_ledger(), &result.disallowed_paths)?;
            if let Some(sitemap) = &result.sitemap_url {
                lists::append_lines(&paths.sitemaps_file, &[sitemap])?;
            }
        }
        Ok(result.is_hit())
    }

    pub async fn sort_http(&self) -> FlowResult<Outcome> {
        let domains = &self.config.lists.domains;
        if !lists::exists(domains) {
            return self.skip(SORT_HTTP, "no domains list");
        }
        self.begin(SORT_HTTP);
        let invocation = self.tool(&self.config.tools.sort_http, vec!["-I".into(), path_arg(domains)]);
        self.run_tool(invocation).await?;
        Ok(Outcome::Ran)
    }

    pub async fn doc_fuzz(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        let sources = [
            self.orgs_path.as_path(),
            lists_cfg.wildcards.as_path(),
            lists_cfg.apidomains.as_path(),
        ];
        if !sources.iter().any(|p| lists::exists(p)) {
            return self.skip(DOC_FUZZ, "no organization, wildcard or API lists");
        }
        let wordlist = &self.config.wordlists.apidocs;
        if !lists::exists(wordlist) {
            return self.skip(DOC_FUZZ, "documentation wordlist missing");
        }
        self.begin(DOC_FUZZ);

        let fuzz_targets = targets::union_of(&sources)?;
        let doc_dir = self.config.paths.documentation();
        let mut results = stream::iter(fuzz_targets)
            .map(|target| {
                let output = doc_dir.join(format!("{}.csv", sanitize_filename(&target)));
                self.fuzz(target, wordlist, output, &[])
            })
            .buffer_unordered(self.config.concurrency.doc_fuzz);

        let ledger = self.config.paths.doc_hits();
        while let Some(result) = results.next().await {
            let (target, _, found) = result?;
            let entries: Vec<String> = found
                .inputs()
                .into_iter()
                .map(|input| format!("{} -> {}", target, input))
                .collect();
            lists::append_lines(&ledger, &entries)?;
        }
        Ok(Outcome::Ran)
    }

    pub async fn dir_fuzz(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        let sources = [lists_cfg.apidomains.as_path(), lists_cfg.wildcards.as_path()];
        if !sources.iter().any(|p| lists::exists(p)) {
            return self.skip(DIR_FUZZ, "no API or wildcard lists");
        }
        let words = self.build_fuzz_wordlist()?;
        if words == 0 {
            return self.skip(DIR_FUZZ, "fuzzing wordlists are empty");
        }
        self.begin(DIR_FUZZ);

        let paths = &self.config.paths;
        let wordlist = paths.fuzz_wordlist();
        let fuzz_targets = targets::union_of(&sources)?;
        let mut results = stream::iter(fuzz_targets)
            .map(|target| {
                let output = paths.ffuf().join(format!("{}.csv", sanitize_filename(&target)));
                self.fuzz(target, &wordlist, output, &["-p", "0.2"])
            })
            .buffer_unordered(self.config.concurrency.dir_fuzz);

        while let Some(result) = results.next().await {
            let (target, output, found) = result?;
            let clean = sanitize_filename(&target);
            match found {
                FfufResults::NoHits => {
                    fs::rename(&output, paths.fuzzing_no_hits().join(format!("{}.csv", clean)))?;
                }
                FfufResults::Hits(_) => {
                    let inputs = found.inputs();
                    write_text(&paths.fuzzing_hits().join(format!("{}.txt", clean)), &inputs.join("\n"))?;
                    lists::append_lines(&paths.all_hits(), &inputs)?;
                }
            }
        }
        Ok(Outcome::Ran)
    }

    /// Deduplicated union of the directory wordlists, written to `fuzzme`.
    fn build_fuzz_wordlist(&self) -> FlowResult<usize> {
        let w = &self.config.wordlists;
        let words = targets::union_of(&[
            w.api_wild_501.as_path(),
            w.seclist_api_longest.as_path(),
            w.custom_project_specific.as_path(),
        ])?;
        lists::write_lines(&self.config.paths.fuzz_wordlist(), &words)?;
        Ok(words.len())
    }

    async fn fuzz(
        &self,
        target: String,
        wordlist: &Path,
        output: PathBuf,
        extra: &[&str],
    ) -> FlowResult<(String, PathBuf, FfufResults)> {
        let mut args = vec![
            "-u".to_string(),
            format!("{}/FUZZ", targets::base_url(&target)),
            "-w".to_string(),
            path_arg(wordlist),
            "-mc".to_string(),
            "200,301".to_string(),
        ];
        args.extend(extra.iter().map(|a| a.to_string()));
        args.extend(["-o".to_string(), path_arg(&output), "-of".to_string(), "csv".to_string()]);

        self.run_tool(self.tool(&self.config.tools.ffuf, args)).await?;
        let found = ffuf::parse_ffuf_file(&output)?;
        Ok((target, output, found))
    }

    pub async fn nmap(&self) -> FlowResult<Outcome> {
        let lists_cfg = &self.config.lists;
        let sources = [
            lists_cfg.domains.as_path(),
            lists_cfg.apidomains.as_path(),
            lists_cfg.ips.as_path(),
        ];
        if !sources.iter().any(|p| lists::exists(p)) {
            return self.skip(NMAP, "no domains, API or IP lists");
        }
        self.begin(NMAP);

        // domains, then API hosts, then IPs; each host scanned once
        let mut seen = std::collections::HashSet::new();
        let scan_targets: Vec<String> = targets::concat_of(&sources)?
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        let nmap_dir = &self.config.paths.nmap_dir;
        let mut scans = stream::iter(scan_targets)
            .map(|target| {
                let base = nmap_dir.join(sanitize_filename(&target));
                let args = vec!["-p-".to_string(), target, "-oA".to_string(), path_arg(&base)];
                self.run_tool(self.tool(&self.config.tools.nmap, args))
            })
            .buffer_unordered(self.config.concurrency.nmap);

        while let Some(result) = scans.next().await {
            result?;
        }
        Ok(Outcome::Ran)
    }

    pub async fn gnmap_summary(&self) -> FlowResult<Outcome> {
        let settings = &self.config.nmap_summary;
        if !settings.enable {
            return self.skip(GNMAP_SUMMARY, "disabled in config");
        }
        self.begin(GNMAP_SUMMARY);

        let filter = InterestFilter::new(&settings.interesting_services, &settings.interesting_ports);
        let mut summary = GnmapSummary::default();
        for path in gnmap_files(&self.config.paths.nmap_dir)? {
            let text = fs::read_to_string(&path)?;
            summary.add(&self.parser.parse(&text), &filter);
        }

        write_text(&settings.summary_file, &summary.summary_text())?;
        write_text(&settings.pointers_file, &summary.pointers_text())?;
        write_text(&settings.services_file, &summary.services().join("\n"))?;
        tracing::info!(
            "Summarized {} hosts, {} with interesting services",
            summary.hosts(),
            summary.pointers().len()
        );

        let services = summary.services();
        if !services.is_empty() {
            let report = self.searchsploit_report(&services).await?;
            write_text(&settings.searchsploit_file, &report)?;
        }
        Ok(Outcome::Ran)
    }

    /// One lookup per unique service. A failed lookup is noted in the report
    /// and does not fail the stage.
    async fn searchsploit_report(&self, services: &[&str]) -> FlowResult<String> {
        let mut report = String::new();
        for service in services {
            report.push_str(&format!("Searching for {}\n", service));
            let term = ServiceDescriptor::parse(service)
                .map(|d| d.lookup_term())
                .unwrap_or(*service);
            let invocation = self.tool(&self.config.tools.searchsploit, vec![term.to_string()]);
            match self.runner.capture(&invocation, &self.cancel).await {
                Ok(output) => {
                    report.push_str(&output);
                    report.push('\n');
                }
                Err(FlowError::Cancelled) => return Err(FlowError::Cancelled),
                Err(err) => {
                    tracing::warn!("searchsploit failed for {}: {}", service, err);
                    report.push_str(&format!("lookup failed: {}\n", err));
                }
            }
            report.push_str(SEARCHSPLOIT_SEPARATOR);
            report.push('\n');
        }
        Ok(report)
    }

    pub async fn security_checks(&self) -> FlowResult<Outcome> {
        let domains = &self.config.lists.domains;
        if !lists::exists(domains) {
            return self.skip(SECURITY_CHECKS, "no domains list");
        }
        self.begin(SECURITY_CHECKS);

        let domains_arg = path_arg(domains);
        for template in &self.config.security_checks {
            let words = shell_words::split(template).map_err(|e| {
                FlowError::Config(format!("invalid security check {:?}: {}", template, e))
            })?;
            let words: Vec<String> = words
                .into_iter()
                .map(|w| w.replace("{domains}", &domains_arg))
                .collect();
            let Some((program, args)) = words.split_first() else {
                continue;
            };
            self.run_tool(self.tool(program, args.to_vec())).await?;
        }
        Ok(Outcome::Ran)
    }
}

/// `*.gnmap` files directly inside `dir`, sorted by name.
fn gnmap_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "gnmap") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn write_text(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Dork commands run inside the dorking directory, so list paths must not be
/// relative to the process working directory.
fn absolute_arg(path: &Path) -> io::Result<String> {
    Ok(path_arg(&std::path::absolute(path)?))
}

fn quote(word: &str) -> String {
    shell_words::quote(word).into_owned()
}

fn quote_path(path: &Path) -> String {
    quote(&path_arg(path))
}
