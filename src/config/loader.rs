use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::{Component, Path, PathBuf};

use super::types::FlowConfig;

const DEFAULT_CONFIG_PATHS: &[&str] = &["./flow.yaml", "./config/flow.yaml"];

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("env var regex is hardcoded and valid")
});

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `custom_path`, or the first default location that exists,
    /// falling back to built-in defaults. An explicitly requested file must
    /// exist; the default locations are optional.
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<FlowConfig> {
        if let Some(path) = custom_path {
            return Self::load_from_file(path)
                .with_context(|| format!("Failed to load config from {:?}", path));
        }

        for path in Self::candidate_paths() {
            if path.exists() {
                let config = Self::load_from_file(&path)?;
                tracing::info!("Loaded configuration from: {:?}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using default settings");
        let mut config = FlowConfig::default();
        expand_all(&mut config);
        Ok(config)
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        if let Some(dirs) = ProjectDirs::from("", "", "bflow") {
            paths.push(dirs.config_dir().join("flow.yaml"));
        }
        paths
    }

    fn load_from_file(path: &Path) -> Result<FlowConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn from_yaml(content: &str) -> Result<FlowConfig> {
        let mut config: FlowConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML config")?;
        expand_all(&mut config);
        Self::validate_config(&config)?;
        Ok(config)
    }

    fn validate_config(config: &FlowConfig) -> Result<()> {
        let caps = &config.concurrency;
        for (name, value) in [
            ("robots", caps.robots),
            ("doc_fuzz", caps.doc_fuzz),
            ("dir_fuzz", caps.dir_fuzz),
            ("nmap", caps.nmap),
        ] {
            if value == 0 {
                anyhow::bail!("concurrency.{} must be greater than 0", name);
            }
        }

        if config.robots.timeout_secs == 0 {
            anyhow::bail!("robots.timeout_secs must be greater than 0");
        }

        if config.tools.all().iter().any(|cmd| cmd.trim().is_empty()) {
            anyhow::bail!("tool commands cannot be empty");
        }

        for check in &config.security_checks {
            let words = shell_words::split(check)
                .with_context(|| format!("Invalid security check command: {}", check))?;
            if words.is_empty() {
                anyhow::bail!("security check commands cannot be empty");
            }
        }

        Ok(())
    }
}

fn expand_all(config: &mut FlowConfig) {
    if let Some(log_file) = config.log_file.as_mut() {
        expand_in_place(log_file);
    }

    let lists = &mut config.lists;
    for path in [
        &mut lists.organizations,
        &mut lists.ips,
        &mut lists.wildcards,
        &mut lists.domains,
        &mut lists.apidomains,
        &mut lists.out_of_scope,
    ] {
        expand_in_place(path);
    }

    let paths = &mut config.paths;
    for path in [
        &mut paths.sitemaps_file,
        &mut paths.robots_dir,
        &mut paths.robots_hits_dir,
        &mut paths.robots_no_hits_dir,
        &mut paths.dorking_dir,
        &mut paths.fuzzing_dir,
        &mut paths.ffuf_dir,
        &mut paths.fuzzing_hits_dir,
        &mut paths.fuzzing_no_hits_dir,
        &mut paths.all_hits_file,
        &mut paths.logs_dir,
        &mut paths.nmap_dir,
    ] {
        expand_in_place(path);
    }

    let wordlists = &mut config.wordlists;
    for path in [
        &mut wordlists.api_wild_501,
        &mut wordlists.seclist_api_longest,
        &mut wordlists.custom_project_specific,
        &mut wordlists.apidocs,
    ] {
        expand_in_place(path);
    }

    let summary = &mut config.nmap_summary;
    for path in [
        &mut summary.summary_file,
        &mut summary.pointers_file,
        &mut summary.services_file,
        &mut summary.searchsploit_file,
    ] {
        expand_in_place(path);
    }
}

fn expand_in_place(path: &mut PathBuf) {
    *path = expand_path(&path.to_string_lossy());
}

/// Expands `$VAR`/`${VAR}` (unset variables become empty), a leading `~/`,
/// and cleans the result lexically. Empty input stays empty.
pub fn expand_path(raw: &str) -> PathBuf {
    if raw.is_empty() {
        return PathBuf::new();
    }

    let expanded = ENV_VAR.replace_all(raw, |caps: &Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        std::env::var(name).unwrap_or_default()
    });

    let with_home = match expanded.strip_prefix("~/") {
        Some(rest) => match BaseDirs::new() {
            Some(base) => base.home_dir().join(rest),
            None => PathBuf::from(expanded.as_ref()),
        },
        None => PathBuf::from(expanded.as_ref()),
    };

    clean(&with_home)
}

fn clean(path: &Path) -> PathBuf {
    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = FlowConfig::default();
        assert!(ConfigLoader::validate_config(&config).is_ok());
        assert_eq!(config.security_checks.len(), 6);
        assert_eq!(config.robots.timeout_secs, 10);
    }

    #[test]
    fn test_load_custom_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
lists:
  domains: ./scope/./domains.txt
  out_of_scope: scope/oos.txt
paths:
  robots_dir: out/robots
nmap_summary:
  enable: false
  interesting_services: [http]
  interesting_ports: [22, "8080"]
concurrency:
  dir_fuzz: 4
"#;
        fs::write(&temp_file, config_content).unwrap();

        let config = ConfigLoader::load_with_custom_path(Some(temp_file.path())).unwrap();
        assert_eq!(config.lists.domains, PathBuf::from("scope/domains.txt"));
        assert_eq!(config.lists.out_of_scope, PathBuf::from("scope/oos.txt"));
        assert_eq!(config.paths.robots_hits(), PathBuf::from("out/robots/hits"));
        assert!(!config.nmap_summary.enable);
        assert_eq!(config.nmap_summary.interesting_ports, vec!["22", "8080"]);
        assert_eq!(config.concurrency.dir_fuzz, 4);
        assert_eq!(config.concurrency.robots, 1);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = ConfigLoader::from_yaml("lists:\n  domain: typo.txt\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_errors() {
        let result = ConfigLoader::from_yaml("concurrency:\n  nmap: 0\n");
        let err = format!("{:#}", result.unwrap_err());
        assert!(err.contains("concurrency.nmap must be greater than 0"), "{}", err);
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let result = ConfigLoader::load_with_custom_path(Some(Path::new("/nonexistent/flow.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_expand_env_and_home() {
        // SAFETY: test-local variable name, not read concurrently elsewhere.
        unsafe { std::env::set_var("BFLOW_TEST_ROOT", "/srv/bounty") };
        assert_eq!(expand_path("$BFLOW_TEST_ROOT/lists/a.txt"), PathBuf::from("/srv/bounty/lists/a.txt"));
        assert_eq!(expand_path("${BFLOW_TEST_ROOT}/../x"), PathBuf::from("/srv/x"));
        assert_eq!(expand_path("$BFLOW_UNSET_VARIABLE/a"), PathBuf::from("/a"));
        assert_eq!(expand_path(""), PathBuf::new());

        if let Some(base) = BaseDirs::new() {
            assert_eq!(expand_path("~/wordlists/x.txt"), base.home_dir().join("wordlists/x.txt"));
        }
    }
}
