//! Artifact writers.
//!
//! Every artifact is written to a temporary file in its destination directory and then renamed
//! over the final path, so a reader never sees a half-written table. Headers are always written,
//! even when there are no rows.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::WriterBuilder;
use log::warn;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::cooccurrence::CooccurrenceGraph;
use crate::error::{Error, Result};
use crate::frequency::{FrequencyTable, Period, RankedToken, TimeseriesPoint};
use crate::lag::LagRecord;
use crate::similarity::SimilarityMatrix;
use crate::survey::{SurveyEntry, group_counts};

pub const LAG_COLUMNS: [&str; 7] = [
    "token",
    "source_group",
    "source_month",
    "source_first_date",
    "target_first_date",
    "appears_in_target",
    "days_lag",
];

/// Neutralize spreadsheet formula injection by prefixing a single quote to cells that start
/// with `=`, `+`, `-`, `@`, a tab or a carriage return. Cells already starting with `'` are
/// left alone.
pub fn csv_safe_cell(mut s: String) -> String {
    if s.starts_with('\'') {
        return s;
    }
    if matches!(s.chars().next(), Some('=' | '+' | '-' | '@' | '\t' | '\r')) {
        s.insert(0, '\'');
    }
    s
}

/// Directory name for a group: everything outside `[A-Za-z0-9_-]` becomes `_`.
pub fn group_dir_name(group: &str) -> String {
    let name: String = group
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "_".to_string()
    } else {
        name
    }
}

/// Directory name per group, unique across `groups`.
///
/// Names that sanitize to the same directory get `_2`, `_3`, ... appended, assigned in sorted
/// group order so reruns map every group to the same directory.
pub fn group_dir_names(groups: &[String]) -> BTreeMap<String, String> {
    let mut sorted: Vec<&String> = groups.iter().collect();
    sorted.sort();
    sorted.dedup();
    let mut taken = BTreeSet::new();
    let mut dirs = BTreeMap::new();
    for group in sorted {
        let base = group_dir_name(group);
        let mut name = base.clone();
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        if name != base {
            warn!("Group {group} shares directory {base} with another group; writing to {name}");
        }
        taken.insert(name.clone());
        dirs.insert(group.clone(), name);
    }
    dirs
}

fn date_cell(d: Option<NaiveDate>) -> String {
    d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn score_cell(s: Option<f64>) -> String {
    s.map(|s| format!("{s:.6}")).unwrap_or_default()
}

/// Write `contents` to `path` through a temp file in the same directory.
fn write_atomic<F>(path: &Path, contents: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> std::io::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::io(&dir, e))?;
    contents(&mut tmp).map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Atomically write a CSV with `header` followed by `rows`.
pub fn write_csv<I>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    write_atomic(path, |tmp| {
        let mut wtr = WriterBuilder::new().from_writer(tmp);
        wtr.write_record(header).map_err(std::io::Error::from)?;
        for row in rows {
            wtr.write_record(&row).map_err(std::io::Error::from)?;
        }
        wtr.flush()
    })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, |tmp| {
        serde_json::to_writer_pretty(&mut *tmp, value)?;
        tmp.write_all(b"\n")
    })
}

pub fn write_lines<I>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = String>,
{
    write_atomic(path, |tmp| {
        for line in lines {
            writeln!(tmp, "{line}")?;
        }
        Ok(())
    })
}

/// `keyword_topn_by_date.csv`: `date, rank, token, freq`.
pub fn write_topn_by_date(path: &Path, table: &FrequencyTable) -> Result<()> {
    let rows = table.iter().flat_map(|(start, ranked)| {
        ranked.iter().map(move |r| {
            vec![
                table.period.label(start),
                r.rank.to_string(),
                csv_safe_cell(r.token.clone()),
                r.freq.to_string(),
            ]
        })
    });
    write_csv(path, &["date", "rank", "token", "freq"], rows)
}

/// `keyword_topk.csv`: `token, freq`, already in descending order.
pub fn write_topk(path: &Path, ranked: &[RankedToken]) -> Result<()> {
    let rows = ranked
        .iter()
        .map(|r| vec![csv_safe_cell(r.token.clone()), r.freq.to_string()]);
    write_csv(path, &["token", "freq"], rows)
}

/// `keyword_by_date.csv`: `date, token, freq`; per date by freq desc, token asc.
pub fn write_by_date(
    path: &Path,
    counts: &BTreeMap<NaiveDate, BTreeMap<String, u64>>,
    period: Period,
) -> Result<()> {
    let rows = counts.iter().flat_map(|(start, tokens)| {
        let mut sorted: Vec<(&String, &u64)> = tokens.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        sorted.into_iter().map(move |(t, f)| {
            vec![period.label(*start), csv_safe_cell(t.clone()), f.to_string()]
        })
    });
    write_csv(path, &["date", "token", "freq"], rows)
}

/// `keyword_timeseries.csv`: `date, token, freq, freq_norm`.
pub fn write_timeseries(path: &Path, points: &[TimeseriesPoint], period: Period) -> Result<()> {
    let rows = points.iter().map(|p| {
        vec![
            period.label(p.start),
            csv_safe_cell(p.token.clone()),
            p.freq.to_string(),
            format!("{:.6}", p.freq_norm),
        ]
    });
    write_csv(path, &["date", "token", "freq", "freq_norm"], rows)
}

/// `cooccurrence_nodes.csv` and `cooccurrence_edges.csv` in `dir`.
pub fn write_graph(dir: &Path, graph: &CooccurrenceGraph) -> Result<()> {
    write_csv(
        &dir.join("cooccurrence_nodes.csv"),
        &["token", "doc_freq"],
        graph
            .nodes
            .iter()
            .map(|n| vec![csv_safe_cell(n.token.clone()), n.doc_freq.to_string()]),
    )?;
    write_csv(
        &dir.join("cooccurrence_edges.csv"),
        &["source", "target", "weight"],
        graph.edges.iter().map(|e| {
            vec![
                csv_safe_cell(e.source.clone()),
                csv_safe_cell(e.target.clone()),
                e.weight.to_string(),
            ]
        }),
    )
}

/// Group × group matrix; the header starts with an empty cell.
pub fn write_similarity(dir: &Path, matrix: &SimilarityMatrix) -> Result<()> {
    let mut header: Vec<String> = vec![String::new()];
    header.extend(matrix.groups.iter().map(|g| csv_safe_cell(g.clone())));
    let header: Vec<&str> = header.iter().map(String::as_str).collect();
    let rows = matrix.rows().map(|(group, scores)| {
        let mut row = vec![csv_safe_cell(group.to_string())];
        row.extend(scores.iter().map(|s| score_cell(*s)));
        row
    });
    write_csv(&dir.join(matrix.file_name()), &header, rows)
}

pub fn write_lag(path: &Path, records: &[LagRecord]) -> Result<()> {
    let rows = records.iter().map(|r| {
        vec![
            csv_safe_cell(r.token.clone()),
            csv_safe_cell(r.source_group.clone()),
            r.source_month_label(),
            date_cell(r.source_first_date),
            date_cell(r.target_first_date),
            r.appears_in_target.to_string(),
            r.days_lag.map(|d| d.to_string()).unwrap_or_default(),
        ]
    });
    write_csv(path, &LAG_COLUMNS, rows)
}

/// `date_resolution.csv` (`path, group, date, rule`), `file_statistics.csv`
/// (`group, files, resolved, unresolved`) and `failed_date_parsing.txt`.
pub fn write_survey(dir: &Path, entries: &[SurveyEntry]) -> Result<()> {
    write_csv(
        &dir.join("date_resolution.csv"),
        &["path", "group", "date", "rule"],
        entries.iter().map(|e| {
            vec![
                csv_safe_cell(e.path.clone()),
                csv_safe_cell(e.group.clone()),
                date_cell(e.resolved.map(|r| r.date)),
                e.resolved.map(|r| r.rule.name().to_string()).unwrap_or_default(),
            ]
        }),
    )?;
    write_csv(
        &dir.join("file_statistics.csv"),
        &["group", "files", "resolved", "unresolved"],
        group_counts(entries).into_iter().map(|(g, (n, ok, failed))| {
            vec![csv_safe_cell(g.to_string()), n.to_string(), ok.to_string(), failed.to_string()]
        }),
    )?;
    write_lines(
        &dir.join("failed_date_parsing.txt"),
        entries
            .iter()
            .filter(|e| e.resolved.is_none())
            .map(|e| e.path.clone()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_prefixes_are_neutralized() {
        for s in ["=SUM(A1)", "+1", "-2", "@cmd", "\tx", "\rx"] {
            let out = csv_safe_cell(s.to_string());
            assert!(out.starts_with('\''), "{s:?} -> {out:?}");
            assert_eq!(&out[1..], s);
        }
        assert_eq!(csv_safe_cell("housing".into()), "housing");
        assert_eq!(csv_safe_cell(String::new()), "");
    }

    #[test]
    fn no_double_prefix_when_cell_already_safe() {
        let already_safe = "'@SAFE".to_string();
        assert_eq!(csv_safe_cell(already_safe.clone()), already_safe);
    }

    #[test]
    fn csv_writer_quotes_sanitized_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(
            &path,
            &["token", "freq"],
            vec![
                vec![csv_safe_cell(r#"=HYPERLINK("http://x")"#.to_string()), "1".into()],
                vec![csv_safe_cell("=BAD\nNEXT".to_string()), "2".into()],
            ],
        )
        .unwrap();
        let out = fs::read_to_string(&path).unwrap();
        assert!(out.starts_with("token,freq\n"));
        assert!(out.contains(r#"'=HYPERLINK(""http://x"")"#), "{out}");
        assert!(out.contains("'=BAD\nNEXT"));
    }

    #[test]
    fn empty_rows_still_write_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/empty.csv");
        write_csv(&path, &["a", "b"], Vec::<Vec<String>>::new()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "a,b\n");
        // Only the final file is left behind.
        let names: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn group_directory_names_are_sanitized() {
        assert_eq!(group_dir_name("news"), "news");
        assert_eq!(group_dir_name("city council/2022"), "city_council_2022");
        assert_eq!(group_dir_name("r-portland_x"), "r-portland_x");
        assert_eq!(group_dir_name(""), "_");
    }

    #[test]
    fn colliding_group_names_get_distinct_directories() {
        let groups: Vec<String> = ["city_council_2", "news", "city_council", "city council"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let dirs = group_dir_names(&groups);
        assert_eq!(dirs["city council"], "city_council");
        assert_eq!(dirs["city_council"], "city_council_2");
        assert_eq!(dirs["city_council_2"], "city_council_2_2");
        assert_eq!(dirs["news"], "news");
        let unique: BTreeSet<&String> = dirs.values().collect();
        assert_eq!(unique.len(), dirs.len());
    }

    #[test]
    fn lag_rows_keep_negative_lags_and_blank_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lag.csv");
        let rec = |token: &str, days_lag: Option<i64>| LagRecord {
            token: token.to_string(),
            source_group: "news".into(),
            source_month: NaiveDate::from_ymd_opt(2022, 1, 1),
            source_first_date: NaiveDate::from_ymd_opt(2022, 1, 4),
            target_group: "meeting".into(),
            target_first_date: days_lag.and(NaiveDate::from_ymd_opt(2022, 1, 1)),
            appears_in_target: days_lag.is_some(),
            days_lag,
        };
        write_lag(&path, &[rec("zoning", Some(-3)), rec("ferry", None)]).unwrap();
        let out = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], LAG_COLUMNS.join(","));
        assert_eq!(lines[1], "zoning,news,2022-01,2022-01-04,2022-01-01,true,-3");
        assert_eq!(lines[2], "ferry,news,2022-01,2022-01-04,,false,");
    }
}
