#![forbid(unsafe_code)]
//! # corpus_trends
//!
//! Batch keyword analytics over a token table drawn from several named corpora ("groups"),
//! such as news articles, forum posts and meeting minutes.
//!
//! The input is a CSV token table (`document_id, group, date, token, count`). From it the
//! pipeline derives:
//!
//! - per-period top-N keyword rankings and a global top-K ranking ([`frequency`]),
//! - keyword co-occurrence networks ([`cooccurrence`]),
//! - cosine/Jaccard similarity between groups, overall and per year ([`similarity`]),
//! - keyword diffusion lag from source groups to a target group ([`lag`]).
//!
//! Dates missing from the table are recovered from the document path by the
//! [`date::DateResolver`] cascade.
//!
//! ## Example
//! ```
//! use corpus_trends::{StopList, table::{TokenRecord, TokenTable}, frequency};
//! use chrono::NaiveDate;
//!
//! let day = NaiveDate::from_ymd_opt(2022, 1, 10);
//! let table = TokenTable::from_records(vec![
//!     TokenRecord::new("a.txt", "news", day, "housing", 3),
//!     TokenRecord::new("a.txt", "news", day, "the", 9),
//! ]);
//! let stop = StopList::new(["THE"]);
//! let docs: Vec<_> = table.documents().iter().collect();
//! let top = frequency::top_k_overall(&docs, 10, &stop);
//! assert_eq!(top[0].token, "housing");
//! assert_eq!(top.len(), 1);
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

pub mod config;
pub mod cooccurrence;
pub mod date;
pub mod error;
pub mod export;
pub mod frequency;
pub mod lag;
pub mod pipeline;
pub mod similarity;
pub mod survey;
pub mod table;

pub use config::{Config, LagConfig, UndatedPolicy};
pub use date::{DateResolver, DateRule, ResolvedDate};
pub use error::{Error, Result};
pub use export::csv_safe_cell;
pub use frequency::Period;
pub use pipeline::{RunReport, Stage, run_pipeline};

/// Case-insensitive set of excluded keywords.
///
/// Read once per run and passed by reference into every analysis, so tests can swap in a
/// different list without touching process state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopList {
    words: BTreeSet<String>,
}

impl StopList {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        StopList { words }
    }

    /// Split stop-list file content on commas and line breaks.
    pub fn parse(content: &str) -> Self {
        Self::new(content.split([',', '\n', '\r']))
    }

    /// Every `.txt` file in `dir`, merged. A missing directory yields an empty list.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            warn!("Stop-list directory {} not found; no keywords excluded", dir.display());
            return Ok(StopList::default());
        }
        let mut merged = StopList::default();
        for file in collect_files(dir, &["txt"]) {
            merged.extend(StopList::from_file(&file)?);
        }
        Ok(merged)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let list = StopList::parse(&content);
        debug!("Read {} excluded keywords from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn extend(&mut self, other: StopList) {
        self.words.extend(other.words);
    }

    pub fn contains(&self, token: &str) -> bool {
        if token.chars().any(char::is_uppercase) {
            self.words.contains(&token.to_lowercase())
        } else {
            self.words.contains(token)
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }
}

/// Collect files below `root` (or `root` itself if it is a file) whose extension matches one of
/// `extensions` case-insensitively. An empty `extensions` accepts every file.
/// Results are sorted so runs over the same tree see the same order.
pub fn collect_files(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    let wanted = |p: &Path| {
        extensions.is_empty()
            || p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    };
    if root.is_file() {
        return if wanted(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
    }
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| wanted(p))
        .collect();
    files.sort();
    files
}
