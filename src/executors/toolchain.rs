use crate::config::FlowConfig;
use which::which;

/// Programs the configured stages would spawn.
pub fn required_tools(config: &FlowConfig) -> Vec<String> {
    let mut tools: Vec<String> = config.tools.all().into_iter().map(str::to_string).collect();
    tools.push("sh".to_string());
    for check in &config.security_checks {
        if let Some(program) = shell_words::split(check).ok().and_then(|w| w.into_iter().next()) {
            tools.push(program);
        }
    }
    tools.sort();
    tools.dedup();
    tools
}

/// Returns the tools that cannot be resolved. Missing tools only produce
/// warnings since stages whose inputs are absent never spawn them.
pub fn preflight(config: &FlowConfig) -> Vec<String> {
    let mut missing = Vec::new();

    for tool in required_tools(config) {
        match which(&tool) {
            Ok(path) => {
                tracing::debug!("Found {}: {:?}", tool, path);
            }
            Err(_) => {
                tracing::warn!("{} not found on PATH", tool);
                missing.push(tool);
            }
        }
    }

    if missing.is_empty() {
        tracing::info!("All external tools found");
    }
    missing
}
