//! Keyword frequency tables and rankings.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Months, NaiveDate};
use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::StopList;
use crate::table::Document;

/// Date-truncation granularity for trend tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    #[default]
    Month,
}

impl Period {
    /// First day of the period containing `date`.
    pub fn truncate(self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Day => date,
            Period::Month => date.with_day(1).unwrap_or(date),
        }
    }

    /// `YYYY-MM-DD` for days, `YYYY-MM` for months.
    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Period::Day => start.format("%Y-%m-%d").to_string(),
            Period::Month => start.format("%Y-%m").to_string(),
        }
    }

    pub fn next(self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Day => start.succ_opt(),
            Period::Month => start.checked_add_months(Months::new(1)),
        }
    }
}

/// One entry of a ranking. `rank` starts at 1 and has no gaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedToken {
    pub rank: usize,
    pub token: String,
    pub freq: u64,
}

/// Sum token counts over `docs`, skipping stop-listed tokens.
pub fn count_tokens<'a>(
    docs: impl IntoIterator<Item = &'a Document>,
    stop: &StopList,
) -> BTreeMap<String, u64> {
    let mut frequency: BTreeMap<String, u64> = BTreeMap::new();
    for doc in docs {
        for (token, &count) in &doc.tokens {
            if stop.contains(token) {
                continue;
            }
            *frequency.entry(token.clone()).or_insert(0) += count;
        }
    }
    frequency
}

/// Sort by descending frequency, ties by ascending token, number from 1 and keep `limit`.
pub fn rank_tokens(frequency: BTreeMap<String, u64>, limit: usize) -> Vec<RankedToken> {
    let mut sorted: Vec<(String, u64)> = frequency.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (token, freq))| RankedToken {
            rank: i + 1,
            token,
            freq,
        })
        .collect()
}

/// Per-period token counts over the dated documents in `docs`.
pub fn counts_by_period(
    docs: &[&Document],
    period: Period,
    stop: &StopList,
) -> BTreeMap<NaiveDate, BTreeMap<String, u64>> {
    let mut buckets: BTreeMap<NaiveDate, Vec<&Document>> = BTreeMap::new();
    for doc in docs {
        if let Some(date) = doc.date {
            buckets.entry(period.truncate(date)).or_default().push(*doc);
        }
    }
    buckets
        .into_par_iter()
        .map(|(start, bucket)| (start, count_tokens(bucket, stop)))
        .filter(|(_, counts)| !counts.is_empty())
        .collect()
}

/// Top-N ranking for every period that has at least one counted token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    pub period: Period,
    rows: BTreeMap<NaiveDate, Vec<RankedToken>>,
}

impl FrequencyTable {
    pub fn get(&self, start: NaiveDate) -> Option<&[RankedToken]> {
        self.rows.get(&start).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &[RankedToken])> {
        self.rows.iter().map(|(d, r)| (*d, r.as_slice()))
    }

    pub fn periods(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn top_n_by_period(
    docs: &[&Document],
    period: Period,
    n: usize,
    stop: &StopList,
) -> FrequencyTable {
    let rows = counts_by_period(docs, period, stop)
        .into_par_iter()
        .map(|(start, counts)| (start, rank_tokens(counts, n)))
        .collect();
    FrequencyTable { period, rows }
}

/// Date-agnostic ranking over all of `docs`.
pub fn top_k_overall(docs: &[&Document], k: usize, stop: &StopList) -> Vec<RankedToken> {
    rank_tokens(count_tokens(docs.iter().copied(), stop), k)
}

/// A row of the zero-filled keyword time series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesPoint {
    pub start: NaiveDate,
    pub token: String,
    pub freq: u64,
    /// Share of `freq` among the tracked tokens in the same period.
    pub freq_norm: f64,
}

/// Track the `top_n` tokens of the dated documents over every period between the first and
/// last dated document, filling absent (period, token) pairs with zero.
pub fn timeseries(
    docs: &[&Document],
    period: Period,
    top_n: usize,
    stop: &StopList,
) -> Vec<TimeseriesPoint> {
    let dated: Vec<&Document> = docs.iter().copied().filter(|d| d.date.is_some()).collect();
    let (Some(first), Some(last)) = (
        dated.iter().filter_map(|d| d.date).min(),
        dated.iter().filter_map(|d| d.date).max(),
    ) else {
        return Vec::new();
    };
    let tracked: BTreeSet<String> = top_k_overall(&dated, top_n, stop)
        .into_iter()
        .map(|r| r.token)
        .collect();
    if tracked.is_empty() {
        return Vec::new();
    }
    let counts = counts_by_period(&dated, period, stop);

    let mut points = Vec::new();
    let end = period.truncate(last);
    let mut cursor = Some(period.truncate(first));
    while let Some(start) = cursor.filter(|s| *s <= end) {
        let in_period = counts.get(&start);
        let freq_of = |t: &str| in_period.and_then(|c| c.get(t)).copied().unwrap_or(0);
        let total: u64 = tracked.iter().map(|t| freq_of(t.as_str())).sum();
        let denom = if total == 0 { 1.0 } else { total as f64 };
        for token in &tracked {
            let freq = freq_of(token.as_str());
            points.push(TimeseriesPoint {
                start,
                token: token.clone(),
                freq,
                freq_norm: freq as f64 / denom,
            });
        }
        cursor = period.next(start);
    }
    points
}
