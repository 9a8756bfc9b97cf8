//! Grepable nmap (`-oG`/`-oA`) output.
//!
//! Extraction goes through [`ScanParser`] so the pipeline does not care
//! whether the text is matched with regexes or a line scanner.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

static BANNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^# Nmap \S+ scan initiated .* as: (.+)$").expect("banner regex is hardcoded and valid")
});

static HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Host: (\S+)").expect("host regex is hardcoded and valid"));

static OPEN_PORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)/open\b").expect("open port regex is hardcoded and valid"));

static SERVICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+/open/[^/\s,]+//[^/\t\n,]+//[^/\t\n]+").expect("service regex is hardcoded and valid")
});

/// nmap options whose value is the following argument.
const OPTIONS_WITH_VALUE: &[&str] = &[
    "-oA", "-oN", "-oX", "-oG", "-oS", "-iL", "-iR", "-p", "-e", "-S", "-D", "-g",
    "--top-ports", "--exclude", "--excludefile", "--script", "--script-args",
    "--min-rate", "--max-rate", "--max-retries", "--host-timeout", "--source-port",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GnmapRecord {
    /// Target as given on the scan command line.
    pub target: String,
    pub host: String,
    pub open_ports: Vec<u16>,
    /// Raw `port/open/proto//service//version` descriptors, in file order.
    pub service_lines: Vec<String>,
}

pub trait ScanParser: Send + Sync {
    fn parse(&self, text: &str) -> GnmapRecord;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegexScanParser;

impl ScanParser for RegexScanParser {
    fn parse(&self, text: &str) -> GnmapRecord {
        let target = BANNER
            .captures(text)
            .and_then(|caps| invocation_target(&caps[1]))
            .unwrap_or_default();

        let host = HOST
            .captures(text)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let open_ports = OPEN_PORT
            .captures_iter(text)
            .filter_map(|caps| caps[1].parse::<u16>().ok())
            .filter(|port| seen.insert(*port))
            .collect();

        let service_lines = SERVICE
            .find_iter(text)
            .map(|m| m.as_str().trim_end().to_string())
            .collect();

        GnmapRecord {
            target,
            host,
            open_ports,
            service_lines,
        }
    }
}

/// Last positional argument of the recorded nmap command line.
fn invocation_target(command_line: &str) -> Option<String> {
    let mut args = command_line.split_whitespace().skip(1);
    let mut target = None;
    while let Some(arg) = args.next() {
        if OPTIONS_WITH_VALUE.contains(&arg) {
            args.next();
        } else if !arg.starts_with('-') {
            target = Some(arg.to_string());
        }
    }
    target
}

/// One `port/state/proto/owner/service/rpc/version` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor<'a> {
    pub port: &'a str,
    pub name: &'a str,
    pub version: &'a str,
}

impl<'a> ServiceDescriptor<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split('/').collect();
        if fields.len() < 5 || fields[0].is_empty() || fields[4].is_empty() {
            return None;
        }
        Some(Self {
            port: fields[0],
            name: fields[4],
            version: fields.get(6).map_or("", |v| v.trim()),
        })
    }

    /// Query string for an exploit-database lookup.
    pub fn lookup_term(&self) -> &'a str {
        if self.version.is_empty() {
            self.name
        } else {
            self.version
        }
    }
}

/// Allow-lists deciding which services are worth a pointer.
#[derive(Debug, Clone, Default)]
pub struct InterestFilter {
    services: HashSet<String>,
    ports: HashSet<String>,
}

impl InterestFilter {
    pub fn new<S: AsRef<str>>(services: &[S], ports: &[S]) -> Self {
        Self {
            services: services.iter().map(|s| s.as_ref().trim().to_string()).collect(),
            ports: ports.iter().map(|p| p.as_ref().trim().to_string()).collect(),
        }
    }

    pub fn matches(&self, descriptor: &ServiceDescriptor<'_>) -> bool {
        self.services.contains(descriptor.name) || self.ports.contains(descriptor.port)
    }
}

/// Aggregate over every host file of a run.
#[derive(Debug, Clone, Default)]
pub struct GnmapSummary {
    blocks: Vec<String>,
    pointers: Vec<String>,
    services: BTreeSet<String>,
}

impl GnmapSummary {
    pub fn add(&mut self, record: &GnmapRecord, filter: &InterestFilter) {
        let ports: Vec<String> = record.open_ports.iter().map(u16::to_string).collect();
        self.blocks.push(format!(
            "-------\nTarget: {}\nHost: {}\nOpen ports: {}\nServices:\n{}\n",
            record.target,
            record.host,
            ports.join(","),
            record.service_lines.join("\n")
        ));

        let mut interesting = Vec::new();
        for line in &record.service_lines {
            let Some(descriptor) = ServiceDescriptor::parse(line) else {
                continue;
            };
            if filter.matches(&descriptor) {
                interesting.push(line.as_str());
            }
            self.services.insert(line.clone());
        }

        if !interesting.is_empty() {
            self.pointers.push(format!(
                "Interesting services on {} ({}):\n{}\n",
                record.host,
                record.target,
                interesting.join("\n")
            ));
        }
    }

    pub fn hosts(&self) -> usize {
        self.blocks.len()
    }

    pub fn summary_text(&self) -> String {
        self.blocks.join("\n")
    }

    pub fn pointers(&self) -> &[String] {
        &self.pointers
    }

    pub fn pointers_text(&self) -> String {
        self.pointers.join("\n")
    }

    /// Deduplicated and lexicographically sorted.
    pub fn services(&self) -> Vec<&str> {
        self.services.iter().map(String::as_str).collect()
    }
}
