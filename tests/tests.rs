//! Integration tests for `corpus_trends`.
//
// This suite verifies:
// - Library behavior (loading, date resolution, rankings, lag) on small in-memory corpora
// - CLI behavior: artifact layout, determinism, empty input, config errors, date survey
//
// Notes:
// - CLI tests run the binary with a per-process working directory (no global CWD change).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use serde_json::Value as Json;
use tempfile::tempdir;

use corpus_trends::table::{Document, TokenTable};
use corpus_trends::{DateResolver, LagConfig, StopList, collect_files, lag};

// --------------------- helpers ---------------------

const TOKENS: &str = "\
document_id,group,date,token,count
news/2022-01-10 Housing plan.txt,news,,housing,4
news/2022-01-10 Housing plan.txt,news,,rent,2
news/2022-01-10 Housing plan.txt,news,,the,9
news/2022-02-14 Bridge.txt,news,,bridge,3
news/2022-02-14 Bridge.txt,news,,housing,1
news/2020 News.docx,news,,ferry,5
reddit/r1.txt,reddit,2022-01-20,housing,2
reddit/r1.txt,reddit,2022-01-20,zoning,1
meeting/Feb 05 2022 minutes.pdf,meeting,,housing,1
meeting/Feb 05 2022 minutes.pdf,meeting,,zoning,2
meeting/Nov. 07, 2021_agenda.pdf,meeting,,zoning,1
";

/// Create a file with content in a temp dir.
fn write_file(dir: &assert_fs::TempDir, name: &str, content: &str) -> PathBuf {
    let f = dir.child(name);
    f.write_str(content).unwrap();
    f.path().to_path_buf()
}

/// Read file to string.
fn read_to_string<P: AsRef<Path>>(p: P) -> String {
    fs::read_to_string(p).unwrap()
}

/// Read a CSV into its header and rows.
fn read_csv<P: AsRef<Path>>(p: P) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rdr = csv::Reader::from_path(p).unwrap();
    let header = rdr.headers().unwrap().iter().map(String::from).collect();
    let rows = rdr
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}

/// The quoted-id variant of TOKENS: the agenda file name contains a comma.
fn tokens_csv() -> String {
    TOKENS.replace(
        "meeting/Nov. 07, 2021_agenda.pdf",
        "\"meeting/Nov. 07, 2021_agenda.pdf\"",
    )
}

/// Run CLI successfully with a specific working directory.
fn run_cli_ok_in(dir: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = assert_cmd::Command::cargo_bin("corpus_trends").unwrap();
    cmd.current_dir(dir);
    cmd.args(args).assert().success()
}

/// Run CLI expecting a specific exit code.
fn run_cli_code_in(dir: &Path, args: &[&str], code: i32) -> assert_cmd::assert::Assert {
    let mut cmd = assert_cmd::Command::cargo_bin("corpus_trends").unwrap();
    cmd.current_dir(dir);
    cmd.args(args).assert().code(code)
}

/// Every file below `root`, keyed by relative path.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    collect_files(root, &[])
        .into_iter()
        .map(|p| {
            let bytes = fs::read(&p).unwrap();
            (p.strip_prefix(root).unwrap().to_path_buf(), bytes)
        })
        .collect()
}

fn load_table(csv: &str) -> TokenTable {
    let td = assert_fs::TempDir::new().unwrap();
    let p = write_file(&td, "tokens.csv", csv);
    TokenTable::load(&p, &DateResolver::standard()).unwrap()
}

// --------------------- library tests ---------------------

#[test]
fn lib_load_resolves_dates_from_paths() {
    let table = load_table(&tokens_csv());
    assert_eq!(table.groups(), vec!["meeting", "news", "reddit"]);
    let undated: Vec<&str> = table.undated().map(Document::file_name).collect();
    assert_eq!(undated, vec!["2020 News.docx"]);
    let agenda = table
        .documents()
        .iter()
        .find(|d| d.file_name() == "Nov. 07, 2021_agenda.pdf")
        .unwrap();
    assert_eq!(agenda.date.unwrap().to_string(), "2021-11-07");
}

#[test]
fn lib_date_resolver_literal_cases() {
    let r = DateResolver::standard();
    let day = |name: &str| r.resolve(name, None).map(|d| d.date.to_string());
    assert_eq!(day("2020.08.30.X.PDF").as_deref(), Some("2020-08-30"));
    assert_eq!(day("2022-06-30 Y.PDF").as_deref(), Some("2022-06-30"));
    assert_eq!(day("Nov. 07, 2018_Z").as_deref(), Some("2018-11-07"));
    assert_eq!(day("Apr_2020_W").as_deref(), Some("2020-04-01"));
    assert_eq!(day("2022-06-30").as_deref(), Some("2022-06-30"));
    assert_eq!(day("Example of Text Analysis.pdf"), None);
    assert_eq!(day("2020 News.docx"), None);
    assert_eq!(day("March_fund.pdf"), None);
}

#[test]
fn lib_lag_example() {
    let table = load_table(&tokens_csv());
    let cfg = LagConfig {
        sources: vec!["news".into()],
        target: "meeting".into(),
        monthly_top_n: None,
    };
    let records = lag::analyze_lag(&table, &cfg, &StopList::new(["the"]));
    let housing = records
        .iter()
        .find(|r| r.token == "housing" && r.source_month_label() == "2022-01")
        .unwrap();
    assert_eq!(housing.days_lag, Some(26));
    let ferry = records.iter().find(|r| r.token == "ferry").unwrap();
    assert!(!ferry.appears_in_target);
    assert_eq!(ferry.days_lag, None);
    assert!(records.iter().all(|r| r.token != "the"));
}

// --------------------- CLI tests ---------------------

#[test]
fn cli_run_writes_layout() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "tokens.csv", &tokens_csv());
    write_file(&td, "stop/common.txt", "the, a\nof");

    run_cli_ok_in(
        td.path(),
        &[
            "run",
            "tokens.csv",
            "--out-dir",
            "out",
            "--stopwords-dir",
            "stop",
            "--lag-source",
            "news",
            "--lag-source",
            "reddit",
            "--lag-target",
            "meeting",
        ],
    )
    .stdout(predicate::str::contains("Results written to out"));

    let out = td.path().join("out");
    for group in ["combined", "groups/news", "groups/reddit", "groups/meeting"] {
        for f in [
            "keyword_topn_by_date.csv",
            "keyword_topk.csv",
            "keyword_by_date.csv",
            "keyword_timeseries.csv",
            "cooccurrence_nodes.csv",
            "cooccurrence_edges.csv",
        ] {
            assert!(out.join(group).join(f).is_file(), "missing {group}/{f}");
        }
    }

    let (header, rows) = read_csv(out.join("combined/keyword_topn_by_date.csv"));
    assert_eq!(header, vec!["date", "rank", "token", "freq"]);
    assert_eq!(rows[0], vec!["2021-11", "1", "zoning", "1"]);
    assert!(rows.iter().all(|r| r[2] != "the"));

    let (header, rows) = read_csv(out.join("comparison/similarity_overall_cosine.csv"));
    assert_eq!(header, vec!["", "meeting", "news", "reddit"]);
    assert_eq!(rows[1][2], "1.000000");
    assert!(out.join("comparison/similarity_2022_jaccard.csv").is_file());
    assert!(!out.join("comparison/similarity_2020_cosine.csv").exists());

    let (header, rows) = read_csv(out.join("lag/keyword_lag_analysis.csv"));
    assert_eq!(
        header,
        vec![
            "token",
            "source_group",
            "source_month",
            "source_first_date",
            "target_first_date",
            "appears_in_target",
            "days_lag"
        ]
    );
    assert!(rows.contains(&vec![
        "housing".to_string(),
        "news".into(),
        "2022-01".into(),
        "2022-01-10".into(),
        "2022-02-05".into(),
        "true".into(),
        "26".into(),
    ]));
    // ferry is only in an undated news document, which sorts last.
    let last = rows.last().unwrap();
    assert_eq!(
        (last[0].as_str(), last[2].as_str(), last[6].as_str()),
        ("ferry", "", "")
    );

    let summary: Json =
        serde_json::from_str(&read_to_string(out.join("run_summary.json"))).unwrap();
    assert_eq!(summary["documents"], 6);
    assert_eq!(summary["undated_documents"], 1);
    let statuses: Vec<&str> = summary["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["completed"; 4]);
}

#[test]
fn cli_runs_are_byte_identical() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "tokens.csv", &tokens_csv());
    let args = |out: &'static str| {
        vec![
            "run",
            "tokens.csv",
            "--out-dir",
            out,
            "--lag-source",
            "news",
            "--lag-target",
            "meeting",
        ]
    };
    run_cli_ok_in(td.path(), &args("a"));
    run_cli_ok_in(td.path(), &args("b"));
    let a = snapshot(&td.path().join("a"));
    let b = snapshot(&td.path().join("b"));
    assert!(!a.is_empty());
    assert_eq!(a, b);
}

#[test]
fn cli_empty_input_gives_header_only_artifacts() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "tokens.csv", "document_id,group,date,token,count\n");
    run_cli_ok_in(td.path(), &["run", "tokens.csv", "--out-dir", "out"]);
    let out = td.path().join("out");
    assert_eq!(read_to_string(out.join("combined/keyword_topk.csv")), "token,freq\n");
    assert_eq!(
        read_to_string(out.join("combined/cooccurrence_edges.csv")),
        "source,target,weight\n"
    );
    assert!(!out.join("groups").exists());
}

#[test]
fn cli_missing_input_is_not_fatal() {
    let td = tempdir().unwrap();
    run_cli_ok_in(td.path(), &["run", "does_not_exist.csv", "--out-dir", "out"]);
    assert!(td.path().join("out/combined/keyword_topn_by_date.csv").is_file());
}

#[test]
fn cli_schema_error_fails_load() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "tokens.csv", "document_id,group,token,count\nx,news,a,1\n");
    run_cli_code_in(td.path(), &["run", "tokens.csv", "--out-dir", "out"], 1);
    assert!(!td.path().join("out").exists());
}

#[test]
fn cli_bad_config_exits_2() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "tokens.csv", &tokens_csv());
    write_file(&td, "bad.toml", "cooc_node_top_n = 5\ncooc_label_top_n = 10\n");
    write_file(&td, "unknown.toml", "colour = \"blue\"\n");

    run_cli_code_in(td.path(), &["run", "tokens.csv", "--config", "bad.toml"], 2);
    run_cli_code_in(td.path(), &["run", "tokens.csv", "--config", "unknown.toml"], 2);
    run_cli_code_in(td.path(), &["run", "tokens.csv", "--trend-top-n", "0"], 2);
    run_cli_code_in(
        td.path(),
        &["run", "tokens.csv", "--lag-source", "news", "--lag-target", "news"],
        2,
    );
    run_cli_code_in(td.path(), &["run", "tokens.csv", "--stopwords", "missing.txt"], 2);
    assert!(!td.path().join("output").exists());
}

#[test]
fn cli_config_file_and_flag_override() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "tokens.csv", &tokens_csv());
    write_file(
        &td,
        "corpus.toml",
        "period = \"day\"\ntrend_top_n = 1\nundated = \"exclude\"\n",
    );
    run_cli_ok_in(
        td.path(),
        &["run", "tokens.csv", "--config", "corpus.toml", "--trend-top-n", "2", "--out-dir", "out"],
    );
    let out = td.path().join("out");
    let (_, rows) = read_csv(out.join("groups/news/keyword_topn_by_date.csv"));
    assert_eq!(rows[0][0], "2022-01-10");
    assert_eq!(rows.iter().filter(|r| r[0] == "2022-01-10").count(), 2);
    // ferry only occurs in the undated document
    let (_, topk) = read_csv(out.join("groups/news/keyword_topk.csv"));
    assert!(topk.iter().all(|r| r[0] != "ferry"));
}

#[test]
fn cli_resolve_dates_survey() {
    let td = assert_fs::TempDir::new().unwrap();
    write_file(&td, "raw/news/2022-06-30 Y.PDF", "");
    write_file(&td, "raw/news/2020 News.docx", "");
    write_file(&td, "raw/meeting/2022/March_fund.pdf", "");
    write_file(&td, "raw/meeting/page_files/2022-01-01 x.txt", "");

    run_cli_ok_in(td.path(), &["resolve-dates", "raw", "--out-dir", "dates"])
        .stdout(predicate::str::contains("news: 2 files, 1 dated, 1 unresolved"));
    let (header, rows) = read_csv(td.path().join("dates/date_resolution.csv"));
    assert_eq!(header, vec!["path", "group", "date", "rule"]);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2], vec!["news/2022-06-30 Y.PDF", "news", "2022-06-30", "numeric_date"]);
    let failed = read_to_string(td.path().join("dates/failed_date_parsing.txt"));
    assert_eq!(failed, "meeting/2022/March_fund.pdf\nnews/2020 News.docx\n");

    run_cli_ok_in(
        td.path(),
        &["resolve-dates", "raw", "--out-dir", "dates2", "--extended-date-rules"],
    );
    assert_eq!(read_to_string(td.path().join("dates2/failed_date_parsing.txt")), "");
}

#[test]
fn cli_unknown_subcommand_fails() {
    let td = tempdir().unwrap();
    let mut cmd = assert_cmd::Command::cargo_bin("corpus_trends").unwrap();
    cmd.current_dir(td.path());
    cmd.arg("analyze").assert().failure();
}
