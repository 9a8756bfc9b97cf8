use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::FlowError;

/// A named pipeline stage. The order of [`FLOW_STEPS`] is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Step {
    pub id: &'static str,
    pub label: &'static str,
}

pub const LOAD_CONFIG: &str = "load-config";
pub const DORK_ORGS: &str = "dork-orgs";
pub const SUBFINDER: &str = "subfinder";
pub const FILTER_OUT_OF_SCOPE: &str = "filter-out-of-scope";
pub const HTTPROBE_API: &str = "httprobe-api";
pub const DORK_LISTS: &str = "dork-lists";
pub const ROBOTS: &str = "robots";
pub const SORT_HTTP: &str = "sort-http";
pub const DOC_FUZZ: &str = "doc-fuzz";
pub const DIR_FUZZ: &str = "dir-fuzz";
pub const NMAP: &str = "nmap";
pub const GNMAP_SUMMARY: &str = "gnmap-summary";
pub const SECURITY_CHECKS: &str = "security-checks";

pub const FLOW_STEPS: &[Step] = &[
    Step { id: LOAD_CONFIG, label: "Load configuration" },
    Step { id: DORK_ORGS, label: "Dork organizations" },
    Step { id: SUBFINDER, label: "Subdomain discovery (subfinder)" },
    Step { id: FILTER_OUT_OF_SCOPE, label: "Filter out-of-scope domains" },
    Step { id: HTTPROBE_API, label: "Probe API hosts (httprobe)" },
    Step { id: DORK_LISTS, label: "Dork scope lists" },
    Step { id: ROBOTS, label: "Collect robots.txt" },
    Step { id: SORT_HTTP, label: "Sort HTTP hosts" },
    Step { id: DOC_FUZZ, label: "Documentation fuzzing" },
    Step { id: DIR_FUZZ, label: "Directory fuzzing" },
    Step { id: NMAP, label: "Port scanning (nmap)" },
    Step { id: GNMAP_SUMMARY, label: "Summarize nmap results" },
    Step { id: SECURITY_CHECKS, label: "Security checks" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Skipped,
    Error,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Done => "done",
            StepStatus::Skipped => "skipped",
            StepStatus::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a step snapshot as reported to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub id: &'static str,
    pub label: &'static str,
    pub status: StepStatus,
}

/// Bookkeeping for the single active (or last) run.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRun {
    pub running: bool,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for FlowRun {
    fn default() -> Self {
        Self {
            running: false,
            status: "idle".to_string(),
            started_at: None,
            finished_at: None,
        }
    }
}

/// Per-run overrides supplied by whoever triggers the run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunOptions {
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub org_list: Option<String>,
}

/// The scope lists that can be read and written from outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Organizations,
    Ips,
    Wildcards,
    Domains,
    ApiDomains,
    OutOfScope,
}

impl ListKind {
    pub const ALL: [ListKind; 6] = [
        ListKind::Organizations,
        ListKind::Ips,
        ListKind::Wildcards,
        ListKind::Domains,
        ListKind::ApiDomains,
        ListKind::OutOfScope,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Organizations => "organizations",
            ListKind::Ips => "ips",
            ListKind::Wildcards => "wildcards",
            ListKind::Domains => "domains",
            ListKind::ApiDomains => "apidomains",
            ListKind::OutOfScope => "out_of_scope",
        }
    }
}

impl FromStr for ListKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        ListKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| FlowError::UnknownList(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn step_ids_are_unique() {
        let ids: HashSet<_> = FLOW_STEPS.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), FLOW_STEPS.len());
        assert_eq!(FLOW_STEPS.first().map(|s| s.id), Some(LOAD_CONFIG));
        assert_eq!(FLOW_STEPS.last().map(|s| s.id), Some(SECURITY_CHECKS));
    }

    #[rstest]
    #[case("organizations", ListKind::Organizations)]
    #[case("IPS", ListKind::Ips)]
    #[case("apidomains", ListKind::ApiDomains)]
    #[case(" out_of_scope ", ListKind::OutOfScope)]
    fn parses_list_kinds(#[case] raw: &str, #[case] expected: ListKind) {
        assert_eq!(raw.parse::<ListKind>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown_list_kind() {
        let err = "secrets".parse::<ListKind>().unwrap_err();
        assert!(matches!(err, FlowError::UnknownList(ref name) if name == "secrets"));
    }

    #[test]
    fn step_status_serializes_lowercase() {
        let json = serde_json::to_string(&StepStatus::Skipped).unwrap();
        assert_eq!(json, "\"skipped\"");
    }
}
