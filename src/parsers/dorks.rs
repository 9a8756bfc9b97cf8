use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Category directory names, matched as substrings of file names in this order.
pub const DORK_CATEGORIES: [&str; 4] = ["shodan", "github", "google", "wayback"];

pub fn category_for(file_name: &str) -> Option<&'static str> {
    DORK_CATEGORIES
        .into_iter()
        .find(|category| file_name.contains(category))
}

/// Moves every regular file in `workdir` whose name mentions a category into
/// `dest/<category>/`. Category directories are created even when empty.
/// Returns the number of files moved.
pub fn categorize_outputs(workdir: &Path, dest: &Path) -> io::Result<usize> {
    for category in DORK_CATEGORIES {
        fs::create_dir_all(dest.join(category))?;
    }

    let mut moved = 0;
    for entry in fs::read_dir(workdir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(category) = category_for(&name.to_string_lossy()) else {
            continue;
        };
        let target = dest.join(category).join(&name);
        tracing::debug!("Moving dork output {:?} -> {:?}", entry.path(), target);
        fs::rename(entry.path(), target)?;
        moved += 1;
    }
    Ok(moved)
}

/// Modification time and size of a regular file.
pub type FileStamp = (SystemTime, u64);

/// Stamps of every regular file under `dir`, recursively. A missing `dir`
/// has no files.
pub fn file_stamps(dir: &Path) -> io::Result<HashMap<PathBuf, FileStamp>> {
    let mut stamps = HashMap::new();
    collect_stamps(dir, &mut stamps)?;
    Ok(stamps)
}

fn collect_stamps(dir: &Path, stamps: &mut HashMap<PathBuf, FileStamp>) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_stamps(&entry.path(), stamps)?;
        } else if file_type.is_file() {
            let meta = entry.metadata()?;
            stamps.insert(entry.path(), (meta.modified()?, meta.len()));
        }
    }
    Ok(())
}

/// Regular files under `dir` that are absent from `before` or whose stamp
/// differs, sorted.
pub fn changed_files(dir: &Path, before: &HashMap<PathBuf, FileStamp>) -> io::Result<Vec<PathBuf>> {
    let mut changed: Vec<PathBuf> = file_stamps(dir)?
        .into_iter()
        .filter(|(path, stamp)| before.get(path) != Some(stamp))
        .map(|(path, _)| path)
        .collect();
    changed.sort();
    Ok(changed)
}
