//! In-process stand-ins for external tools and the network.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use super::fetch::RobotsFetcher;
use crate::config::types::{ListsConfig, PathsConfig, WordlistsConfig};
use crate::config::FlowConfig;
use crate::core::errors::{ExecError, FlowError, FlowResult};
use crate::executors::{Invocation, ToolRunner};
use crate::store::lists;

type Behaviour = Box<dyn Fn(&Invocation) -> FlowResult<String> + Send + Sync>;

/// Records every invocation; optionally simulates tool side effects.
#[derive(Default)]
pub struct FakeRunner {
    calls: Mutex<Vec<Invocation>>,
    failing: Vec<String>,
    behaviour: Option<Behaviour>,
}

impl FakeRunner {
    pub fn with_behaviour<F>(mut self, behaviour: F) -> Self
    where
        F: Fn(&Invocation) -> FlowResult<String> + Send + Sync + 'static,
    {
        self.behaviour = Some(Box::new(behaviour));
        self
    }

    /// Every invocation of `program` exits with status 1.
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.push(program.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Second argument of each `program` call, in call order.
    pub fn targets_of(&self, program: &str) -> Vec<String> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.program == program)
            .filter_map(|inv| inv.args.get(1).cloned())
            .collect()
    }

    fn handle(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<String> {
        if cancel.is_cancelled() {
            return Err(FlowError::Cancelled);
        }
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        if self.failing.contains(&invocation.program) {
            return Err(FlowError::Exec(ExecError {
                tool: invocation.program.clone(),
                args: invocation.args.clone(),
                cwd: None,
                exit_code: Some(1),
                output_tail: "simulated failure".to_string(),
                duration_ms: 0,
            }));
        }
        match &self.behaviour {
            Some(behaviour) => behaviour(invocation),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<()> {
        self.handle(invocation, cancel).map(|_| ())
    }

    async fn capture(&self, invocation: &Invocation, cancel: &CancellationToken) -> FlowResult<String> {
        self.handle(invocation, cancel)
    }
}

/// Serves canned robots.txt bodies; unknown URLs fail like an unreachable host.
#[derive(Default)]
pub struct FakeFetcher {
    bodies: HashMap<String, String>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl RobotsFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> FlowResult<String> {
        self.bodies.get(url).cloned().ok_or_else(|| {
            FlowError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, format!("{} unreachable", url)))
        })
    }
}

/// A configuration whose every path lives under `root`.
pub fn config_in(root: &Path) -> FlowConfig {
    let scope = root.join("scope");
    let out = root.join("output");
    let words = root.join("wordlists");

    let mut config = FlowConfig::default();
    config.lists = ListsConfig {
        organizations: scope.join("organizations.txt"),
        ips: scope.join("ips.txt"),
        wildcards: scope.join("wildcards.txt"),
        domains: scope.join("domains.txt"),
        apidomains: scope.join("apidomains.txt"),
        out_of_scope: scope.join("out_of_scope.txt"),
    };
    config.paths = PathsConfig {
        sitemaps_file: out.join("robots/sitemaps.txt"),
        robots_dir: out.join("robots"),
        dorking_dir: out.join("dorking"),
        fuzzing_dir: out.join("fuzzing"),
        logs_dir: out.join("logs"),
        nmap_dir: out.join("nmap"),
        ..PathsConfig::default()
    };
    config.wordlists = WordlistsConfig {
        api_wild_501: words.join("api_wild_501.txt"),
        seclist_api_longest: words.join("api_longest.txt"),
        custom_project_specific: words.join("custom.txt"),
        apidocs: words.join("apidocs.txt"),
    };
    config.nmap_summary.summary_file = out.join("nmap/summary.txt");
    config.nmap_summary.pointers_file = out.join("nmap/pointers.txt");
    config.nmap_summary.services_file = out.join("nmap/services.txt");
    config.nmap_summary.searchsploit_file = out.join("nmap/searchsploit.txt");
    config.security_checks = vec!["./utils/check.sh --input {domains}".to_string()];
    config
}

/// Scope lists and wordlists for a run that exercises every stage.
pub fn seed_scope(config: &FlowConfig) {
    let l = &config.lists;
    lists::write_lines(&l.wildcards, &["example.com"]).unwrap();
    lists::write_lines(&l.domains, &["a.example.com", "api.example.com", "old.example.com"]).unwrap();
    lists::write_lines(&l.out_of_scope, &["old.example.com"]).unwrap();
    lists::write_lines(&l.apidomains, &["api.example.com"]).unwrap();
    lists::write_lines(&l.ips, &["10.0.0.5", "a.example.com"]).unwrap();

    let w = &config.wordlists;
    lists::write_lines(&w.api_wild_501, &["api", "admin"]).unwrap();
    lists::write_lines(&w.seclist_api_longest, &["admin", "swagger", "# comment"]).unwrap();
    lists::write_lines(&w.apidocs, &["swagger.json"]).unwrap();
}

/// Runner that leaves behind the files the real tools would write.
pub fn simulating_runner() -> FakeRunner {
    FakeRunner::default().with_behaviour(simulate)
}

fn simulate(invocation: &Invocation) -> FlowResult<String> {
    let arg_after = |flag: &str| {
        invocation
            .args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| invocation.args.get(i + 1))
            .cloned()
    };

    match invocation.program.as_str() {
        "generate_dork_links" => {
            let cwd = invocation.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
            let name = if arg_after("-oR").is_some() {
                "orgs_google.txt".to_string()
            } else {
                let list = arg_after("-L").unwrap_or_default();
                let stem = Path::new(&list)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{}_shodan.txt", stem)
            };
            fs::write(cwd.join(name), "dork links\n")?;
            Ok(String::new())
        }
        "ffuf" => {
            let url = arg_after("-u").unwrap_or_default();
            let wordlist = arg_after("-w").unwrap_or_default();
            let output = arg_after("-o").unwrap_or_default();
            let mut csv = String::from("FUZZ,url,redirectlocation,position,status_code,content_length\n");
            if url == "https://api.example.com/FUZZ" {
                if wordlist.ends_with("fuzzme") {
                    csv.push_str("admin,https://api.example.com/admin,,1,200,512\n");
                } else {
                    csv.push_str("swagger.json,https://api.example.com/swagger.json,,1,200,2048\n");
                }
            }
            fs::write(output, csv)?;
            Ok(String::new())
        }
        "nmap" => {
            let target = invocation.args.get(1).cloned().unwrap_or_default();
            let base = arg_after("-oA").unwrap_or_default();
            let ports = if target == "a.example.com" {
                "80/open/tcp//http//Apache httpd 2.4.52/"
            } else {
                "22/open/tcp//ssh//OpenSSH 9.0/"
            };
            let gnmap = format!(
                "# Nmap 7.94 scan initiated Thu Oct 16 10:00:00 2026 as: nmap -p- {t} -oA {b}\n\
                 Host: 10.0.0.1 ({t})\tStatus: Up\n\
                 Host: 10.0.0.1 ({t})\tPorts: {p}\tIgnored State: closed (65534)\n\
                 # Nmap done at Thu Oct 16 10:05:00 2026 -- 1 IP address (1 host up) scanned in 300.00 seconds\n",
                t = target,
                b = base,
                p = ports
            );
            fs::write(format!("{}.gnmap", base), gnmap)?;
            Ok(String::new())
        }
        "searchsploit" => Ok(format!("exploits for {}", invocation.args.join(" "))),
        _ => Ok(String::new()),
    }
}
