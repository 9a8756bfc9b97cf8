use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::models::ListKind;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    pub log_file: Option<PathBuf>,
    pub lists: ListsConfig,
    pub paths: PathsConfig,
    pub wordlists: WordlistsConfig,
    pub nmap_summary: NmapSummaryConfig,
    pub concurrency: ConcurrencyConfig,
    pub tools: ToolsConfig,
    pub robots: RobotsConfig,
    pub security_checks: Vec<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            log_file: None,
            lists: ListsConfig::default(),
            paths: PathsConfig::default(),
            wordlists: WordlistsConfig::default(),
            nmap_summary: NmapSummaryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            tools: ToolsConfig::default(),
            robots: RobotsConfig::default(),
            security_checks: default_security_checks(),
        }
    }
}

/// Scope list files. An empty path means the list is not configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListsConfig {
    pub organizations: PathBuf,
    pub ips: PathBuf,
    pub wildcards: PathBuf,
    pub domains: PathBuf,
    pub apidomains: PathBuf,
    pub out_of_scope: PathBuf,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            organizations: PathBuf::from("scope/organizations.txt"),
            ips: PathBuf::from("scope/ips.txt"),
            wildcards: PathBuf::from("scope/wildcards.txt"),
            domains: PathBuf::from("scope/domains.txt"),
            apidomains: PathBuf::from("scope/apidomains.txt"),
            out_of_scope: PathBuf::from("scope/out_of_scope.txt"),
        }
    }
}

impl ListsConfig {
    pub fn path(&self, kind: ListKind) -> &Path {
        match kind {
            ListKind::Organizations => &self.organizations,
            ListKind::Ips => &self.ips,
            ListKind::Wildcards => &self.wildcards,
            ListKind::Domains => &self.domains,
            ListKind::ApiDomains => &self.apidomains,
            ListKind::OutOfScope => &self.out_of_scope,
        }
    }
}

/// Working directories. `*_hits_dir`/`*_no_hits_dir` are relative to their
/// parent stage directory, `all_hits_file` to the fuzzing hits directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub sitemaps_file: PathBuf,
    pub robots_dir: PathBuf,
    pub robots_hits_dir: PathBuf,
    pub robots_no_hits_dir: PathBuf,
    pub dorking_dir: PathBuf,
    pub fuzzing_dir: PathBuf,
    pub ffuf_dir: PathBuf,
    pub fuzzing_hits_dir: PathBuf,
    pub fuzzing_no_hits_dir: PathBuf,
    pub all_hits_file: PathBuf,
    pub logs_dir: PathBuf,
    pub nmap_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            sitemaps_file: PathBuf::from("output/robots/sitemaps.txt"),
            robots_dir: PathBuf::from("output/robots"),
            robots_hits_dir: PathBuf::from("hits"),
            robots_no_hits_dir: PathBuf::from("no_hits"),
            dorking_dir: PathBuf::from("output/dorking"),
            fuzzing_dir: PathBuf::from("output/fuzzing"),
            ffuf_dir: PathBuf::from("ffuf"),
            fuzzing_hits_dir: PathBuf::from("hits"),
            fuzzing_no_hits_dir: PathBuf::from("no_hits"),
            all_hits_file: PathBuf::from("all_hits.txt"),
            logs_dir: PathBuf::from("output/logs"),
            nmap_dir: PathBuf::from("output/nmap"),
        }
    }
}

impl PathsConfig {
    pub fn robots_hits(&self) -> PathBuf {
        self.robots_dir.join(&self.robots_hits_dir)
    }

    pub fn robots_no_hits(&self) -> PathBuf {
        self.robots_dir.join(&self.robots_no_hits_dir)
    }

    pub fn robots_ledger(&self) -> PathBuf {
        self.robots_dir.join("_hits.txt")
    }

    pub fn ffuf(&self) -> PathBuf {
        self.fuzzing_dir.join(&self.ffuf_dir)
    }

    pub fn fuzzing_hits(&self) -> PathBuf {
        self.ffuf().join(&self.fuzzing_hits_dir)
    }

    pub fn fuzzing_no_hits(&self) -> PathBuf {
        self.ffuf().join(&self.fuzzing_no_hits_dir)
    }

    pub fn all_hits(&self) -> PathBuf {
        self.fuzzing_hits().join(&self.all_hits_file)
    }

    pub fn documentation(&self) -> PathBuf {
        self.fuzzing_dir.join("documentation")
    }

    pub fn doc_hits(&self) -> PathBuf {
        self.fuzzing_dir.join("doc_hits")
    }

    pub fn fuzz_wordlist(&self) -> PathBuf {
        self.fuzzing_dir.join("fuzzme")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WordlistsConfig {
    pub api_wild_501: PathBuf,
    pub seclist_api_longest: PathBuf,
    pub custom_project_specific: PathBuf,
    pub apidocs: PathBuf,
}

impl Default for WordlistsConfig {
    fn default() -> Self {
        Self {
            api_wild_501: PathBuf::from("wordlists/api_wild_501.txt"),
            seclist_api_longest: PathBuf::from("wordlists/api_longest.txt"),
            custom_project_specific: PathBuf::from("wordlists/custom.txt"),
            apidocs: PathBuf::from("wordlists/apidocs.txt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct NmapSummaryConfig {
    pub enable: bool,
    pub summary_file: PathBuf,
    pub pointers_file: PathBuf,
    pub services_file: PathBuf,
    #[serde(rename = "searchsploit_results")]
    pub searchsploit_file: PathBuf,
    pub interesting_services: Vec<String>,
    #[serde(deserialize_with = "ports_as_strings")]
    pub interesting_ports: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortEntry {
    Number(u32),
    Text(String),
}

/// Accepts `[22, "8080"]` alike.
fn ports_as_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries = Vec::<PortEntry>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            PortEntry::Number(n) => n.to_string(),
            PortEntry::Text(s) => s.trim().to_string(),
        })
        .collect())
}

impl Default for NmapSummaryConfig {
    fn default() -> Self {
        Self {
            enable: true,
            summary_file: PathBuf::from("output/nmap/summary.txt"),
            pointers_file: PathBuf::from("output/nmap/pointers.txt"),
            services_file: PathBuf::from("output/nmap/services.txt"),
            searchsploit_file: PathBuf::from("output/nmap/searchsploit.txt"),
            interesting_services: ["http", "https", "ssh", "ftp", "mysql", "redis"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            interesting_ports: ["21", "22", "3306", "6379", "8080", "8443"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Per-stage worker caps. `1` keeps a stage strictly sequential.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencyConfig {
    pub robots: usize,
    pub doc_fuzz: usize,
    pub dir_fuzz: usize,
    pub nmap: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            robots: 1,
            doc_fuzz: 1,
            dir_fuzz: 1,
            nmap: 1,
        }
    }
}

/// Executable names of the external tools.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub generate_dork_links: String,
    pub subfinder: String,
    pub anew: String,
    pub httprobe: String,
    pub sort_http: String,
    pub ffuf: String,
    pub nmap: String,
    pub searchsploit: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            generate_dork_links: "generate_dork_links".to_string(),
            subfinder: "subfinder".to_string(),
            anew: "anew".to_string(),
            httprobe: "httprobe".to_string(),
            sort_http: "sort_http".to_string(),
            ffuf: "ffuf".to_string(),
            nmap: "nmap".to_string(),
            searchsploit: "searchsploit".to_string(),
        }
    }
}

impl ToolsConfig {
    pub fn all(&self) -> Vec<&str> {
        vec![
            &self.generate_dork_links,
            &self.subfinder,
            &self.anew,
            &self.httprobe,
            &self.sort_http,
            &self.ffuf,
            &self.nmap,
            &self.searchsploit,
        ]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RobotsConfig {
    pub timeout_secs: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

/// Command templates run by the security-checks stage. `{domains}` is
/// replaced by the domains list path.
pub fn default_security_checks() -> Vec<String> {
    [
        "./utils/toxicache.sh --input {domains}",
        "./utils/hop_by_hop_checker.py --l {domains}",
        "python3 ./utils/request_smuggling.py --file {domains}",
        "./utils/h2csmuggler.sh --input {domains}",
        "./utils/ssi_esi.sh --input {domains}",
        "python3 ./utils/cloudflare.py --file {domains}",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
