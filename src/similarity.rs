//! Cross-group similarity, overall and per year.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::StopList;
use crate::frequency::{count_tokens, rank_tokens};
use crate::table::{Document, TokenTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cosine,
    Jaccard,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Cosine, Metric::Jaccard];

    pub fn name(self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Jaccard => "jaccard",
        }
    }

    pub fn score(self, a: &BTreeMap<String, u64>, b: &BTreeMap<String, u64>) -> Option<f64> {
        match self {
            Metric::Cosine => cosine(a, b),
            Metric::Jaccard => jaccard(a, b),
        }
    }
}

/// Time slice a matrix was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeScope {
    Overall,
    Year(i32),
}

impl fmt::Display for TimeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeScope::Overall => f.write_str("overall"),
            TimeScope::Year(y) => write!(f, "{y}"),
        }
    }
}

/// Cosine of two frequency vectors. `None` if either is all zero.
pub fn cosine(a: &BTreeMap<String, u64>, b: &BTreeMap<String, u64>) -> Option<f64> {
    let norm = |v: &BTreeMap<String, u64>| {
        v.values()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt()
    };
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(t, &x)| large.get(t).map(|&y| x as f64 * y as f64))
        .sum();
    Some((dot / (na * nb)).clamp(0.0, 1.0))
}

/// Jaccard index of the two token sets. `None` if both are empty.
pub fn jaccard(a: &BTreeMap<String, u64>, b: &BTreeMap<String, u64>) -> Option<f64> {
    let inter = a.keys().filter(|t| b.contains_key(*t)).count();
    let union = a.len() + b.len() - inter;
    if union == 0 {
        return None;
    }
    Some(inter as f64 / union as f64)
}

/// Symmetric group × group matrix. Missing scores stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatrix {
    pub metric: Metric,
    pub scope: TimeScope,
    pub groups: Vec<String>,
    scores: Vec<Vec<Option<f64>>>,
}

impl SimilarityMatrix {
    fn compute(
        metric: Metric,
        scope: TimeScope,
        groups: &[String],
        vectors: &[BTreeMap<String, u64>],
    ) -> Self {
        let n = groups.len();
        let mut scores = vec![vec![None; n]; n];
        for i in 0..n {
            scores[i][i] = (!vectors[i].is_empty()).then_some(1.0);
            for j in i + 1..n {
                let s = metric.score(&vectors[i], &vectors[j]);
                scores[i][j] = s;
                scores[j][i] = s;
            }
        }
        SimilarityMatrix {
            metric,
            scope,
            groups: groups.to_vec(),
            scores,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.groups.iter().position(|g| g == a)?;
        let j = self.groups.iter().position(|g| g == b)?;
        self.scores[i][j]
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.groups
            .iter()
            .map(String::as_str)
            .zip(self.scores.iter().map(Vec::as_slice))
    }

    /// `similarity_overall_cosine.csv`, `similarity_2022_jaccard.csv`, ...
    pub fn file_name(&self) -> String {
        format!("similarity_{}_{}.csv", self.scope, self.metric.name())
    }
}

fn group_vector(
    docs: Vec<&Document>,
    stop: &StopList,
    top_k: Option<usize>,
) -> BTreeMap<String, u64> {
    let counts = count_tokens(docs, stop);
    match top_k {
        Some(k) => rank_tokens(counts, k).into_iter().map(|r| (r.token, r.freq)).collect(),
        None => counts,
    }
}

/// Overall matrices plus one pair of matrices per year in which a compared group has dated
/// documents.
///
/// `include_undated` only affects the overall scope; yearly scopes see dated documents only.
/// Output is ordered by scope (overall first, then years ascending), then metric.
pub fn similarity_matrices(
    table: &TokenTable,
    groups: &[String],
    stop: &StopList,
    include_undated: bool,
    top_k: Option<usize>,
) -> Vec<SimilarityMatrix> {
    let years: BTreeSet<i32> = groups
        .iter()
        .flat_map(|g| table.group(g))
        .filter_map(Document::year)
        .collect();
    let mut scopes = vec![TimeScope::Overall];
    scopes.extend(years.into_iter().map(TimeScope::Year));

    scopes
        .into_par_iter()
        .flat_map_iter(|scope| {
            let vectors: Vec<BTreeMap<String, u64>> = groups
                .iter()
                .map(|g| {
                    let docs: Vec<&Document> = table
                        .group(g)
                        .filter(|d| match scope {
                            TimeScope::Overall => include_undated || d.date.is_some(),
                            TimeScope::Year(y) => d.year() == Some(y),
                        })
                        .collect();
                    group_vector(docs, stop, top_k)
                })
                .collect();
            Metric::ALL
                .into_iter()
                .map(move |m| SimilarityMatrix::compute(m, scope, groups, &vectors))
                .collect::<Vec<_>>()
        })
        .collect()
}
