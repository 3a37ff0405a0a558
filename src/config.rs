//! Run configuration, read from an optional TOML file and overridden by CLI flags.

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};

use crate::StopList;
use crate::cooccurrence::GraphLimits;
use crate::date::DateResolver;
use crate::error::{Error, Result};
use crate::frequency::Period;

/// Whether undated documents count towards date-agnostic aggregates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum UndatedPolicy {
    #[default]
    Include,
    Exclude,
}

impl UndatedPolicy {
    pub fn includes(self) -> bool {
        self == UndatedPolicy::Include
    }
}

/// Source groups whose keywords are traced into the target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LagConfig {
    pub sources: Vec<String>,
    pub target: String,
    /// Keep only the N most frequent tokens of each source month. Unset keeps all.
    #[serde(default)]
    pub monthly_top_n: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub keyword_top_n: usize,
    pub trend_top_n: usize,
    pub wordcloud_top_n: usize,
    pub cooc_node_top_n: usize,
    pub cooc_edge_top_n: usize,
    pub cooc_label_top_n: usize,
    pub period: Period,
    pub undated: UndatedPolicy,
    pub extended_date_rules: bool,
    /// Compare only each group's top-K tokens. Unset compares full vocabularies.
    pub similarity_top_k: Option<usize>,
    /// Groups to analyze, in output order. Empty means every group found in the table.
    pub groups: Vec<String>,
    pub stopwords_dir: Option<PathBuf>,
    pub stopwords: Vec<PathBuf>,
    pub exclude_folders: Vec<String>,
    pub exclude_file_prefixes: Vec<String>,
    pub lag: Option<LagConfig>,
}

fn default_keyword_top_n() -> usize {
    50
}

fn default_trend_top_n() -> usize {
    10
}

fn default_wordcloud_top_n() -> usize {
    200
}

fn default_cooc_node_top_n() -> usize {
    60
}

fn default_cooc_edge_top_n() -> usize {
    300
}

fn default_cooc_label_top_n() -> usize {
    25
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keyword_top_n: default_keyword_top_n(),
            trend_top_n: default_trend_top_n(),
            wordcloud_top_n: default_wordcloud_top_n(),
            cooc_node_top_n: default_cooc_node_top_n(),
            cooc_edge_top_n: default_cooc_edge_top_n(),
            cooc_label_top_n: default_cooc_label_top_n(),
            period: Period::default(),
            undated: UndatedPolicy::default(),
            extended_date_rules: false,
            similarity_top_k: None,
            groups: Vec::new(),
            stopwords_dir: None,
            stopwords: Vec::new(),
            exclude_folders: vec!["_files".to_string()],
            exclude_file_prefixes: vec!["fig_".to_string(), "~$".to_string()],
            lag: None,
        }
    }
}

impl Config {
    /// Parse a TOML config file. Unknown keys and unparsable values are [`Error::Config`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject out-of-range or inconsistent values.
    pub fn validate(&self) -> Result<()> {
        let top_ns = [
            ("keyword_top_n", self.keyword_top_n),
            ("trend_top_n", self.trend_top_n),
            ("wordcloud_top_n", self.wordcloud_top_n),
            ("cooc_node_top_n", self.cooc_node_top_n),
            ("cooc_edge_top_n", self.cooc_edge_top_n),
            ("cooc_label_top_n", self.cooc_label_top_n),
        ];
        for (name, value) in top_ns {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        if self.cooc_label_top_n > self.cooc_node_top_n {
            return Err(Error::Config(format!(
                "cooc_label_top_n ({}) exceeds cooc_node_top_n ({})",
                self.cooc_label_top_n, self.cooc_node_top_n
            )));
        }
        if self.similarity_top_k == Some(0) {
            return Err(Error::Config("similarity_top_k must be at least 1".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for g in &self.groups {
            if g.trim().is_empty() {
                return Err(Error::Config("group names must not be empty".into()));
            }
            if !seen.insert(g.as_str()) {
                return Err(Error::Config(format!("group {g} listed twice")));
            }
        }
        if let Some(lag) = &self.lag {
            if lag.sources.is_empty() {
                return Err(Error::Config("lag.sources must name at least one group".into()));
            }
            if lag.sources.iter().any(|s| s == &lag.target) {
                return Err(Error::Config(format!(
                    "lag target {} is also a lag source",
                    lag.target
                )));
            }
            if lag.monthly_top_n == Some(0) {
                return Err(Error::Config("lag.monthly_top_n must be at least 1".into()));
            }
        }
        Ok(())
    }

    pub fn graph_limits(&self) -> GraphLimits {
        GraphLimits {
            node_top_n: self.cooc_node_top_n,
            edge_top_n: self.cooc_edge_top_n,
        }
    }

    pub fn date_resolver(&self) -> DateResolver {
        DateResolver::new(self.extended_date_rules)
    }

    /// Merge the stop-list directory and the extra stop-list files.
    ///
    /// A missing directory only warns; an explicitly named file that cannot be read is a
    /// configuration error.
    pub fn load_stop_list(&self) -> Result<StopList> {
        let mut stop = match &self.stopwords_dir {
            Some(dir) => StopList::from_dir(dir)?,
            None => StopList::default(),
        };
        for file in &self.stopwords {
            if !file.is_file() {
                return Err(Error::Config(format!(
                    "stop-word file {} not found",
                    file.display()
                )));
            }
            stop.extend(StopList::from_file(file)?);
        }
        info!("{} excluded keywords", stop.len());
        Ok(stop)
    }
}
