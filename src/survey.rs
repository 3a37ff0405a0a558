//! Date survey over a raw document tree.
//!
//! Walks a directory whose top-level folders are groups, runs the date resolver on every file
//! and reports which rule matched. Files that resolve to nothing are listed separately so they
//! can be renamed by hand.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use log::{info, warn};
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::date::{DateResolver, ResolvedDate};

/// Exclusion rules for the survey walk.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// A file is skipped if any of its directories contains one of these names.
    pub exclude_folders: Vec<String>,
    /// A file is skipped if its name starts with one of these prefixes.
    pub exclude_file_prefixes: Vec<String>,
}

impl FileFilter {
    pub fn accepts(&self, relative: &Path) -> bool {
        let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if self.exclude_file_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return false;
        }
        let dirs = relative.parent().into_iter().flat_map(Path::components);
        for dir in dirs {
            if let Component::Normal(d) = dir {
                let d = d.to_string_lossy();
                if self.exclude_folders.iter().any(|f| d.contains(f.as_str())) {
                    return false;
                }
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyEntry {
    /// Path relative to the survey root, `/`-separated.
    pub path: String,
    /// Top-level folder, or empty for files directly under the root.
    pub group: String,
    pub resolved: Option<ResolvedDate>,
}

pub fn survey_dates(root: &Path, resolver: &DateResolver, filter: &FileFilter) -> Vec<SurveyEntry> {
    let files: Vec<_> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();

    let entries: Vec<SurveyEntry> = files
        .par_iter()
        .filter_map(|path| {
            let relative = path.strip_prefix(root).ok()?;
            if !filter.accepts(relative) {
                return None;
            }
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            let group = if parts.len() > 1 {
                parts[0].clone()
            } else {
                String::new()
            };
            Some(SurveyEntry {
                path: parts.join("/"),
                group,
                resolved: resolver.resolve_path(path),
            })
        })
        .collect();

    for e in entries.iter().filter(|e| e.resolved.is_none()) {
        warn!("Unresolved date: {}", e.path);
    }
    let failed = entries.iter().filter(|e| e.resolved.is_none()).count();
    info!(
        "Surveyed {} files under {}: {} resolved, {} unresolved",
        entries.len(),
        root.display(),
        entries.len() - failed,
        failed
    );
    entries
}

/// Per-group `(files, resolved, unresolved)` counts.
pub fn group_counts(entries: &[SurveyEntry]) -> BTreeMap<&str, (usize, usize, usize)> {
    let mut counts: BTreeMap<&str, (usize, usize, usize)> = BTreeMap::new();
    for e in entries {
        let c = counts.entry(e.group.as_str()).or_default();
        c.0 += 1;
        if e.resolved.is_some() {
            c.1 += 1;
        } else {
            c.2 += 1;
        }
    }
    counts
}
