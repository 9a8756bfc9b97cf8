use std::io;
use std::path::Path;

use crate::store::lists;

/// Turns a host or URL into a string usable as a file name stem.
pub fn sanitize_filename(input: &str) -> String {
    let s = input.trim();
    let s = s.strip_prefix("http://").unwrap_or(s);
    let s = s.strip_prefix("https://").unwrap_or(s);
    let s = s.strip_prefix("www.").unwrap_or(s);
    s.replace(['/', ':', ' '], "_")
}

/// Sorted union of every list that exists; missing lists contribute nothing.
pub fn union_of(paths: &[&Path]) -> io::Result<Vec<String>> {
    let mut all = Vec::new();
    for path in paths {
        if let Some(entries) = lists::read_lines(path)? {
            all.extend(entries);
        }
    }
    Ok(lists::unique(all))
}

/// Concatenation in list order, duplicates kept.
pub fn concat_of(paths: &[&Path]) -> io::Result<Vec<String>> {
    let mut all = Vec::new();
    for path in paths {
        if let Some(entries) = lists::read_lines(path)? {
            all.extend(entries);
        }
    }
    Ok(all)
}

/// Target as a URL without trailing slash; `https://` is assumed for bare hosts.
pub fn base_url(target: &str) -> String {
    let base = target.trim().trim_end_matches('/');
    if base.contains("://") {
        base.to_string()
    } else {
        format!("https://{}", base)
    }
}

pub fn robots_url(target: &str) -> String {
    format!("{}/robots.txt", base_url(target))
}
