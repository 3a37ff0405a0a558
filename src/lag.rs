//! Keyword diffusion lag from source groups to a target group.
//!
//! For each month of a source group, the month's keywords are traced to their first appearance
//! in the target group. `days_lag = target_first_date - source_first_date`, signed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use crate::StopList;
use crate::config::LagConfig;
use crate::frequency::{Period, rank_tokens};
use crate::table::{Document, TokenTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagRecord {
    pub token: String,
    pub source_group: String,
    /// First day of the source month; `None` for the undated bucket.
    pub source_month: Option<NaiveDate>,
    pub source_first_date: Option<NaiveDate>,
    pub target_group: String,
    pub target_first_date: Option<NaiveDate>,
    pub appears_in_target: bool,
    pub days_lag: Option<i64>,
}

impl LagRecord {
    /// `YYYY-MM`, or an empty string for the undated bucket.
    pub fn source_month_label(&self) -> String {
        self.source_month
            .map(|m| Period::Month.label(m))
            .unwrap_or_default()
    }
}

/// Where a token first shows up in the target group.
#[derive(Debug, Default)]
struct TargetHit {
    first_date: Option<NaiveDate>,
}

fn target_index<'a>(docs: &[&'a Document], stop: &StopList) -> BTreeMap<&'a str, TargetHit> {
    let mut index: BTreeMap<&str, TargetHit> = BTreeMap::new();
    for doc in docs {
        for token in doc.tokens.keys().filter(|t| !stop.contains(t)) {
            let hit = index.entry(token.as_str()).or_default();
            if let Some(date) = doc.date {
                hit.first_date = Some(hit.first_date.map_or(date, |d| d.min(date)));
            }
        }
    }
    index
}

#[derive(Debug, Default)]
struct Bucket {
    freq: BTreeMap<String, u64>,
    first_date: BTreeMap<String, NaiveDate>,
}

/// Month buckets of one source group. Tokens of undated documents that never occur in a dated
/// document of the group go to the `None` bucket.
fn source_buckets(docs: &[&Document], stop: &StopList) -> BTreeMap<Option<NaiveDate>, Bucket> {
    let mut buckets: BTreeMap<Option<NaiveDate>, Bucket> = BTreeMap::new();
    let mut dated_tokens: BTreeSet<&str> = BTreeSet::new();
    for doc in docs {
        let Some(date) = doc.date else { continue };
        let bucket = buckets.entry(Some(Period::Month.truncate(date))).or_default();
        for (token, &count) in doc.tokens.iter().filter(|(t, _)| !stop.contains(t)) {
            dated_tokens.insert(token.as_str());
            *bucket.freq.entry(token.clone()).or_insert(0) += count;
            bucket
                .first_date
                .entry(token.clone())
                .and_modify(|d| *d = (*d).min(date))
                .or_insert(date);
        }
    }
    for doc in docs.iter().filter(|d| d.date.is_none()) {
        for (token, &count) in &doc.tokens {
            if stop.contains(token) || dated_tokens.contains(token.as_str()) {
                continue;
            }
            *buckets.entry(None).or_default().freq.entry(token.clone()).or_insert(0) += count;
        }
    }
    buckets
}

/// Trace every configured source group against the target group.
///
/// A source or target group without documents contributes nothing and is reported with a
/// warning. Records are ordered by source month (undated last), token, then source group.
pub fn analyze_lag(table: &TokenTable, lag: &LagConfig, stop: &StopList) -> Vec<LagRecord> {
    let target_docs: Vec<&Document> = table.group(&lag.target).collect();
    if target_docs.is_empty() {
        warn!("Lag target group {} has no documents", lag.target);
    }
    let target = target_index(&target_docs, stop);

    let mut records: Vec<LagRecord> = lag
        .sources
        .par_iter()
        .flat_map_iter(|source| {
            let docs: Vec<&Document> = table.group(source).collect();
            if docs.is_empty() {
                warn!("Lag source group {source} has no documents");
            }
            let mut out = Vec::new();
            for (month, bucket) in source_buckets(&docs, stop) {
                let candidates = match lag.monthly_top_n {
                    Some(n) => rank_tokens(bucket.freq.clone(), n)
                        .into_iter()
                        .map(|r| r.token)
                        .collect(),
                    None => bucket.freq.keys().cloned().collect::<Vec<_>>(),
                };
                debug!(
                    "{source} {}: {} candidate keywords",
                    month.map(|m| Period::Month.label(m)).unwrap_or_else(|| "undated".into()),
                    candidates.len()
                );
                for token in candidates {
                    let source_first_date = bucket.first_date.get(&token).copied();
                    let hit = target.get(token.as_str());
                    let target_first_date = hit.and_then(|h| h.first_date);
                    let days_lag = match (source_first_date, target_first_date) {
                        (Some(s), Some(t)) => Some((t - s).num_days()),
                        _ => None,
                    };
                    out.push(LagRecord {
                        token,
                        source_group: source.clone(),
                        source_month: month,
                        source_first_date,
                        target_group: lag.target.clone(),
                        target_first_date,
                        appears_in_target: hit.is_some(),
                        days_lag,
                    });
                }
            }
            out
        })
        .collect();

    records.sort_by(|a, b| {
        (a.source_month.is_none(), a.source_month, &a.token, &a.source_group).cmp(&(
            b.source_month.is_none(),
            b.source_month,
            &b.token,
            &b.source_group,
        ))
    });
    info!(
        "Lag analysis {} -> {}: {} records",
        lag.sources.join(", "),
        lag.target,
        records.len()
    );
    records
}

/// Per token, the record with the smallest strictly positive lag.
///
/// Ties go to the earliest source date, then the source group, then the token. Output is sorted
/// by token.
pub fn quick_hits(records: &[LagRecord]) -> Vec<LagRecord> {
    let mut best: BTreeMap<&str, &LagRecord> = BTreeMap::new();
    fn key(r: &LagRecord) -> (Option<i64>, Option<NaiveDate>, &str, &str) {
        (
            r.days_lag,
            r.source_first_date,
            r.source_group.as_str(),
            r.token.as_str(),
        )
    }
    for r in records.iter().filter(|r| r.days_lag.is_some_and(|d| d > 0)) {
        best.entry(r.token.as_str())
            .and_modify(|cur| {
                if key(r) < key(*cur) {
                    *cur = r;
                }
            })
            .or_insert(r);
    }
    best.into_values().cloned().collect()
}

/// Descriptive statistics over a lag table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LagSummary {
    pub total: usize,
    pub appears_in_target: usize,
    pub with_lag: usize,
    pub mean_days: Option<f64>,
    pub median_days: Option<f64>,
    pub min_days: Option<i64>,
    pub max_days: Option<i64>,
    /// Token showed up in the target first.
    pub negative: usize,
    pub zero: usize,
    pub positive: usize,
}

pub fn summarize(records: &[LagRecord]) -> LagSummary {
    let mut lags: Vec<i64> = records.iter().filter_map(|r| r.days_lag).collect();
    lags.sort_unstable();
    let n = lags.len();
    let median_days = match n {
        0 => None,
        _ if n % 2 == 1 => Some(lags[n / 2] as f64),
        _ => Some((lags[n / 2 - 1] + lags[n / 2]) as f64 / 2.0),
    };
    LagSummary {
        total: records.len(),
        appears_in_target: records.iter().filter(|r| r.appears_in_target).count(),
        with_lag: n,
        mean_days: (n > 0).then(|| lags.iter().sum::<i64>() as f64 / n as f64),
        median_days,
        min_days: lags.first().copied(),
        max_days: lags.last().copied(),
        negative: lags.iter().filter(|&&d| d < 0).count(),
        zero: lags.iter().filter(|&&d| d == 0).count(),
        positive: lags.iter().filter(|&&d| d > 0).count(),
    }
}

impl fmt::Display for LagSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = if self.total > 0 {
            self.appears_in_target as f64 / self.total as f64 * 100.0
        } else {
            0.0
        };
        writeln!(f, "Source keywords: {}", self.total)?;
        writeln!(f, "Appear in target: {} ({pct:.1}%)", self.appears_in_target)?;
        if let (Some(mean), Some(median), Some(min), Some(max)) =
            (self.mean_days, self.median_days, self.min_days, self.max_days)
        {
            writeln!(f, "Lag days: mean {mean:.1}, median {median:.1}, min {min}, max {max}")?;
        }
        write!(
            f,
            "Earlier in target: {}, same day: {}, later in target: {}",
            self.negative, self.zero, self.positive
        )
    }
}
