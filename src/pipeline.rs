//! Stage orchestration.
//!
//! The four stages read the same immutable [`TokenTable`] and run in parallel. A stage that fails
//! is recorded in the [`RunReport`]; its siblings still run to completion.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::StopList;
use crate::config::Config;
use crate::cooccurrence::build_graph;
use crate::error::Result;
use crate::export;
use crate::frequency::{counts_by_period, timeseries, top_k_overall, top_n_by_period};
use crate::lag::{LagSummary, analyze_lag, quick_hits, summarize};
use crate::similarity::similarity_matrices;
use crate::table::{Document, TokenTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Frequency,
    Cooccurrence,
    Similarity,
    Lag,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Frequency,
        Stage::Cooccurrence,
        Stage::Similarity,
        Stage::Lag,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Frequency => "frequency",
            Stage::Cooccurrence => "cooccurrence",
            Stage::Similarity => "similarity",
            Stage::Lag => "lag",
        };
        f.write_str(name)
    }
}

/// Slice of the corpus a per-scope artifact set is computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Combined,
    Group(String),
}

impl Scope {
    fn documents<'a>(&self, table: &'a TokenTable, groups: &[String]) -> Vec<&'a Document> {
        table
            .documents()
            .iter()
            .filter(|d| match self {
                Scope::Combined => groups.contains(&d.group),
                Scope::Group(g) => &d.group == g,
            })
            .collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Combined => f.write_str("combined"),
            Scope::Group(g) => write!(f, "group {g}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    /// Written files, relative to the output directory.
    pub artifacts: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub documents: usize,
    pub undated_documents: usize,
    pub groups: Vec<String>,
    pub stages: Vec<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag_summary: Option<LagSummary>,
}

impl RunReport {
    pub fn failed(&self) -> bool {
        self.stages.iter().any(|s| s.status == StageStatus::Failed)
    }

    pub fn failed_stages(&self) -> impl Iterator<Item = &StageReport> {
        self.stages.iter().filter(|s| s.status == StageStatus::Failed)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Documents: {} ({} undated) in {} group(s)",
            self.documents,
            self.undated_documents,
            self.groups.len()
        )?;
        for s in &self.stages {
            let status = match s.status {
                StageStatus::Completed => format!("{} file(s)", s.artifacts.len()),
                StageStatus::Skipped => "skipped".to_string(),
                StageStatus::Failed => format!("FAILED: {}", s.error.as_deref().unwrap_or("")),
            };
            writeln!(f, "  {:<13}{status}", s.stage.to_string())?;
        }
        if let Some(summary) = &self.lag_summary {
            writeln!(f, "{summary}")?;
        }
        Ok(())
    }
}

enum Outcome {
    Done(Vec<PathBuf>, Option<LagSummary>),
    Skipped,
}

struct Run<'a> {
    table: &'a TokenTable,
    config: &'a Config,
    stop: &'a StopList,
    out_dir: &'a Path,
    groups: Vec<String>,
    /// Group name to its directory below `groups/`.
    group_dirs: BTreeMap<String, String>,
}

impl Run<'_> {
    /// `combined/` or `groups/<directory name>/` under the output directory.
    fn scope_dir(&self, scope: &Scope) -> PathBuf {
        match scope {
            Scope::Combined => self.out_dir.join("combined"),
            Scope::Group(g) => {
                let name = self
                    .group_dirs
                    .get(g)
                    .cloned()
                    .unwrap_or_else(|| export::group_dir_name(g));
                self.out_dir.join("groups").join(name)
            }
        }
    }

    fn scopes(&self) -> Vec<Scope> {
        let mut scopes = vec![Scope::Combined];
        scopes.extend(self.groups.iter().cloned().map(Scope::Group));
        scopes
    }

    /// Documents visible to date-agnostic aggregates.
    fn agnostic<'d>(&self, docs: &[&'d Document]) -> Vec<&'d Document> {
        docs.iter()
            .copied()
            .filter(|d| self.config.undated.includes() || d.date.is_some())
            .collect()
    }

    fn frequency_scope(&self, scope: &Scope) -> Result<Vec<PathBuf>> {
        let dir = self.scope_dir(scope);
        let docs = scope.documents(self.table, &self.groups);
        let dated: Vec<&Document> = docs.iter().copied().filter(|d| d.date.is_some()).collect();
        if dated.is_empty() {
            warn!("No dated documents for {scope}; date-keyed tables are empty");
        }
        let period = self.config.period;

        let topn = top_n_by_period(&dated, period, self.config.trend_top_n, self.stop);
        let by_date = counts_by_period(&dated, period, self.stop);
        let series = timeseries(&dated, period, self.config.keyword_top_n, self.stop);
        let topk = top_k_overall(&self.agnostic(&docs), self.config.wordcloud_top_n, self.stop);

        let files = [
            "keyword_topn_by_date.csv",
            "keyword_topk.csv",
            "keyword_by_date.csv",
            "keyword_timeseries.csv",
        ];
        export::write_topn_by_date(&dir.join(files[0]), &topn)?;
        export::write_topk(&dir.join(files[1]), &topk)?;
        export::write_by_date(&dir.join(files[2]), &by_date, period)?;
        export::write_timeseries(&dir.join(files[3]), &series, period)?;
        Ok(files.iter().map(|f| dir.join(f)).collect())
    }

    fn cooccurrence_scope(&self, scope: &Scope) -> Result<Vec<PathBuf>> {
        let dir = self.scope_dir(scope);
        let docs = self.agnostic(&scope.documents(self.table, &self.groups));
        let graph = build_graph(&docs, self.stop, self.config.graph_limits());
        if graph.is_empty() {
            warn!("Co-occurrence graph for {scope} is empty");
        }
        info!(
            "Co-occurrence {scope}: {} nodes, {} edges; labels: {}",
            graph.nodes.len(),
            graph.edges.len(),
            graph.label_tokens(self.config.cooc_label_top_n).join(", ")
        );
        export::write_graph(&dir, &graph)?;
        Ok(vec![
            dir.join("cooccurrence_nodes.csv"),
            dir.join("cooccurrence_edges.csv"),
        ])
    }

    fn per_scope<F>(&self, f: F) -> Result<Vec<PathBuf>>
    where
        F: Fn(&Self, &Scope) -> Result<Vec<PathBuf>> + Sync,
    {
        let written: Vec<Vec<PathBuf>> = self
            .scopes()
            .par_iter()
            .map(|scope| f(self, scope))
            .collect::<Result<_>>()?;
        Ok(written.into_iter().flatten().collect())
    }

    fn similarity(&self) -> Result<Vec<PathBuf>> {
        let dir = self.out_dir.join("comparison");
        let matrices = similarity_matrices(
            self.table,
            &self.groups,
            self.stop,
            self.config.undated.includes(),
            self.config.similarity_top_k,
        );
        let mut files = Vec::new();
        for m in &matrices {
            export::write_similarity(&dir, m)?;
            files.push(dir.join(m.file_name()));
        }
        Ok(files)
    }

    fn lag(&self) -> Result<Outcome> {
        let Some(lag) = &self.config.lag else {
            info!("No lag groups configured; lag stage skipped");
            return Ok(Outcome::Skipped);
        };
        let dir = self.out_dir.join("lag");
        let records = analyze_lag(self.table, lag, self.stop);
        let hits = quick_hits(&records);
        let summary = summarize(&records);
        info!("Lag summary:\n{summary}");
        let analysis = dir.join("keyword_lag_analysis.csv");
        let quick = dir.join("keyword_lag_quick_hits.csv");
        export::write_lag(&analysis, &records)?;
        export::write_lag(&quick, &hits)?;
        Ok(Outcome::Done(vec![analysis, quick], Some(summary)))
    }

    fn stage(&self, stage: Stage) -> Result<Outcome> {
        info!("Running {stage} stage");
        match stage {
            Stage::Frequency => Ok(Outcome::Done(self.per_scope(Self::frequency_scope)?, None)),
            Stage::Cooccurrence => {
                Ok(Outcome::Done(self.per_scope(Self::cooccurrence_scope)?, None))
            }
            Stage::Similarity => Ok(Outcome::Done(self.similarity()?, None)),
            Stage::Lag => self.lag(),
        }
    }

    fn relative(&self, p: PathBuf) -> PathBuf {
        p.strip_prefix(self.out_dir).map(Path::to_path_buf).unwrap_or(p)
    }
}

/// Groups to analyze: the configured list, or every group in the table.
fn resolve_groups(table: &TokenTable, config: &Config) -> Vec<String> {
    if config.groups.is_empty() {
        return table.groups();
    }
    for g in &config.groups {
        if table.group(g).next().is_none() {
            warn!("Group {g} has no documents; its artifacts are empty");
        }
    }
    config.groups.clone()
}

/// Run every stage over `table`, writing artifacts and `run_summary.json` below `out_dir`.
pub fn run_pipeline(
    table: &TokenTable,
    config: &Config,
    stop: &StopList,
    out_dir: &Path,
) -> RunReport {
    if table.is_empty() {
        warn!("Token table is empty; every artifact will be header-only");
    }
    let groups = resolve_groups(table, config);
    let group_dirs = export::group_dir_names(&groups);
    let run = Run {
        table,
        config,
        stop,
        out_dir,
        groups,
        group_dirs,
    };

    let outcomes: Vec<(Stage, Result<Outcome>)> = Stage::ALL
        .par_iter()
        .map(|&stage| (stage, run.stage(stage)))
        .collect();

    let mut lag_summary = None;
    let mut stages = Vec::with_capacity(outcomes.len());
    for (stage, outcome) in outcomes {
        let report = match outcome {
            Ok(Outcome::Done(files, summary)) => {
                if lag_summary.is_none() {
                    lag_summary = summary;
                }
                StageReport {
                    stage,
                    status: StageStatus::Completed,
                    artifacts: files.into_iter().map(|p| run.relative(p)).collect(),
                    error: None,
                }
            }
            Ok(Outcome::Skipped) => StageReport {
                stage,
                status: StageStatus::Skipped,
                artifacts: Vec::new(),
                error: None,
            },
            Err(e) => {
                error!("{stage} stage failed: {e}");
                StageReport {
                    stage,
                    status: StageStatus::Failed,
                    artifacts: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        stages.push(report);
    }

    let report = RunReport {
        documents: table.len(),
        undated_documents: table.undated().count(),
        groups: run.groups.clone(),
        stages,
        lag_summary,
    };
    if let Err(e) = export::write_json(&out_dir.join("run_summary.json"), &report) {
        error!("Could not write run summary: {e}");
    }
    report
}
