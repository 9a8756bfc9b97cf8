//! Line-oriented scope files.
//!
//! Every list is a UTF-8 text file with one entry per line. Blank lines and
//! `#` comments are ignored on read. A list that does not exist yet is not an
//! error: readers get `None` and decide whether that means "skip".

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Exists,
}

impl AppendOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppendOutcome::Appended => "appended",
            AppendOutcome::Exists => "exists",
        }
    }
}

/// True when `path` is configured and points at an existing file.
pub fn exists(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.is_file()
}

/// Reads the entries of a list in file order. `Ok(None)` when the list is
/// unconfigured or missing.
pub fn read_lines(path: &Path) -> io::Result<Option<Vec<String>>> {
    if path.as_os_str().is_empty() {
        return Ok(None);
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(Some(parse_lines(&content)))
}

pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Appends `entry` unless an entry equal to it ignoring case (Unicode case
/// folding) is already present. Creates the file and its parent directories on demand.
pub fn append_unique(path: &Path, entry: &str) -> io::Result<AppendOutcome> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "entry cannot be empty"));
    }

    let existing = read_lines(path)?.unwrap_or_default();
    let folded = entry.to_lowercase();
    if existing.iter().any(|line| line.to_lowercase() == folded) {
        return Ok(AppendOutcome::Exists);
    }

    ensure_parent(path)?;
    let needs_newline = fs::read(path)
        .map(|bytes| bytes.last().is_some_and(|b| *b != b'\n'))
        .unwrap_or(false);
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_newline {
        file.write_all(b"\n")?;
    }
    writeln!(file, "{}", entry)?;
    Ok(AppendOutcome::Appended)
}

/// Rewrites `path` keeping only entries absent from the `exclusions` list.
/// Returns `false` without touching anything when either file is missing.
pub fn filter_excluding(path: &Path, exclusions: &Path) -> io::Result<bool> {
    let (Some(entries), Some(excluded)) = (read_lines(path)?, read_lines(exclusions)?) else {
        return Ok(false);
    };

    let excluded: BTreeSet<&str> = excluded.iter().map(String::as_str).collect();
    let kept: Vec<&str> = entries
        .iter()
        .map(String::as_str)
        .filter(|entry| !excluded.contains(entry))
        .collect();

    let removed = entries.len() - kept.len();
    if removed > 0 {
        tracing::info!("Removed {} out-of-scope entries from {:?}", removed, path);
    }
    write_lines(path, &kept)?;
    Ok(true)
}

/// Replaces the contents of `path` with one entry per line.
pub fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> io::Result<()> {
    ensure_parent(path)?;
    let mut content = String::new();
    for line in lines {
        content.push_str(line.as_ref());
        content.push('\n');
    }
    fs::write(path, content)
}

/// Appends raw lines to a ledger file, creating it on demand.
pub fn append_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> io::Result<()> {
    if lines.is_empty() {
        return Ok(());
    }
    ensure_parent(path)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for line in lines {
        writeln!(file, "{}", line.as_ref())?;
    }
    Ok(())
}

/// Sorted, deduplicated, without empty entries.
pub fn unique<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .map(Into::into)
        .filter(|v: &String| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
