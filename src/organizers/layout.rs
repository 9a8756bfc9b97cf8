use crate::config::types::PathsConfig;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Every output directory a run writes into.
pub fn flow_dirs(paths: &PathsConfig) -> Vec<PathBuf> {
    [
        paths.robots_dir.clone(),
        paths.robots_hits(),
        paths.robots_no_hits(),
        paths.dorking_dir.clone(),
        paths.ffuf(),
        paths.fuzzing_hits(),
        paths.fuzzing_no_hits(),
        paths.documentation(),
        paths.logs_dir.clone(),
        paths.nmap_dir.clone(),
    ]
    .into_iter()
    .filter(|dir| !dir.as_os_str().is_empty())
    .collect()
}

pub fn prepare_flow_dirs(paths: &PathsConfig) -> io::Result<Vec<PathBuf>> {
    let dirs = flow_dirs(paths);
    for dir in &dirs {
        fs::create_dir_all(dir)?;
    }

    if !paths.logs_dir.as_os_str().is_empty() {
        verify_writable(&paths.logs_dir)?;
    }

    tracing::debug!("Prepared {} output directories", dirs.len());
    Ok(dirs)
}

fn verify_writable(path: &Path) -> io::Result<()> {
    let test_file = path.join(".write_test");
    fs::write(&test_file, b"test")?;
    fs::remove_file(&test_file)
}
