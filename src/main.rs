#![forbid(unsafe_code)]
//! # corpus_trends CLI
//!
//! Command-line front end for the `corpus_trends` crate.
//!
//! ## Commands
//! - `run` analyzes a token table and writes trend, co-occurrence, similarity and lag tables.
//! - `resolve-dates` surveys a raw document tree and reports which files carry a parsable date.
//!
//! ## Example
//! ```bash
//! cargo run --release -- run tokens.csv --out-dir output \
//!     --lag-source news --lag-source reddit --lag-target meeting
//! RUST_LOG=debug cargo run -- resolve-dates data/raw --out-dir output/dates
//! ```
//!
//! Exit codes: `0` success, `1` load failure or a failed stage, `2` invalid configuration.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use log::{error, info};

use corpus_trends::export::write_survey;
use corpus_trends::frequency::Period;
use corpus_trends::survey::{FileFilter, group_counts, survey_dates};
use corpus_trends::table::TokenTable;
use corpus_trends::{Config, DateResolver, Error, LagConfig, UndatedPolicy, run_pipeline};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a token table (a CSV file or a directory of CSV files)
    Run(RunArgs),
    /// Report the date resolved from every file name below a directory
    ResolveDates(ResolveArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Token table CSV (document_id, group, date, token, count) or a directory of them
    input: PathBuf,

    /// Output directory
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// Optional TOML configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of stop-list files (.txt, comma- or newline-separated)
    #[arg(long)]
    stopwords_dir: Option<PathBuf>,

    /// Additional stop-list file; may be repeated
    #[arg(long)]
    stopwords: Vec<PathBuf>,

    /// Period granularity for trend tables
    #[arg(long)]
    period: Option<Period>,

    /// Top-N keywords per period
    #[arg(long)]
    trend_top_n: Option<usize>,

    /// Number of keywords tracked in the time series
    #[arg(long)]
    keyword_top_n: Option<usize>,

    /// Size of the overall (word-cloud) ranking
    #[arg(long)]
    wordcloud_top_n: Option<usize>,

    /// Co-occurrence nodes to keep
    #[arg(long)]
    node_top_n: Option<usize>,

    /// Co-occurrence edges to keep
    #[arg(long)]
    edge_top_n: Option<usize>,

    /// Co-occurrence nodes to label
    #[arg(long)]
    label_top_n: Option<usize>,

    /// Whether undated documents count in date-agnostic tables
    #[arg(long)]
    undated: Option<UndatedPolicy>,

    /// Also accept year-only dates and month names under a year folder
    #[arg(long, default_value_t = false)]
    extended_date_rules: bool,

    /// Lag source group; may be repeated
    #[arg(long)]
    lag_source: Vec<String>,

    /// Lag target group
    #[arg(long)]
    lag_target: Option<String>,
}

#[derive(Args)]
struct ResolveArgs {
    /// Directory whose top-level folders are groups
    dir: PathBuf,

    /// Output directory
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// Also accept year-only dates and month names under a year folder
    #[arg(long, default_value_t = false)]
    extended_date_rules: bool,

    /// Optional TOML configuration file (exclusion rules, date rules)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<Config, Error> {
    match path {
        Some(p) => Config::load(p),
        None => Ok(Config::default()),
    }
}

impl RunArgs {
    fn apply(&self, config: &mut Config) -> Result<(), Error> {
        if let Some(dir) = &self.stopwords_dir {
            config.stopwords_dir = Some(dir.clone());
        }
        config.stopwords.extend(self.stopwords.iter().cloned());
        if let Some(p) = self.period {
            config.period = p;
        }
        if let Some(n) = self.trend_top_n {
            config.trend_top_n = n;
        }
        if let Some(n) = self.keyword_top_n {
            config.keyword_top_n = n;
        }
        if let Some(n) = self.wordcloud_top_n {
            config.wordcloud_top_n = n;
        }
        if let Some(n) = self.node_top_n {
            config.cooc_node_top_n = n;
        }
        if let Some(n) = self.edge_top_n {
            config.cooc_edge_top_n = n;
        }
        if let Some(n) = self.label_top_n {
            config.cooc_label_top_n = n;
        }
        if let Some(u) = self.undated {
            config.undated = u;
        }
        config.extended_date_rules |= self.extended_date_rules;

        match (&self.lag_target, self.lag_source.is_empty()) {
            (Some(target), _) => {
                let previous = config.lag.take();
                let sources = if self.lag_source.is_empty() {
                    previous.as_ref().map(|l| l.sources.clone()).unwrap_or_default()
                } else {
                    self.lag_source.clone()
                };
                config.lag = Some(LagConfig {
                    sources,
                    target: target.clone(),
                    monthly_top_n: previous.and_then(|l| l.monthly_top_n),
                });
            }
            (None, false) => match config.lag.as_mut() {
                Some(lag) => lag.sources = self.lag_source.clone(),
                None => {
                    return Err(Error::Config("--lag-source needs --lag-target".into()));
                }
            },
            (None, true) => {}
        }
        Ok(())
    }
}

fn run(args: &RunArgs) -> i32 {
    let config = load_config(args.config.as_deref()).and_then(|mut c| {
        args.apply(&mut c)?;
        c.validate()?;
        Ok(c)
    });
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return 2;
        }
    };
    let stop = match config.load_stop_list() {
        Ok(s) => s,
        Err(e) => {
            error!("{e}");
            return if e.is_config() { 2 } else { 1 };
        }
    };
    let table = match TokenTable::load(&args.input, &config.date_resolver()) {
        Ok(t) => t,
        Err(e) => {
            error!("Error loading {}: {e}", args.input.display());
            return 1;
        }
    };
    info!(
        "Loaded {} documents ({} undated) from {}",
        table.len(),
        table.undated().count(),
        args.input.display()
    );

    let report = run_pipeline(&table, &config, &stop, &args.out_dir);
    println!("{report}");
    println!("Results written to {}", args.out_dir.display());
    if report.failed() {
        for s in report.failed_stages() {
            eprintln!("Stage {} failed: {}", s.stage, s.error.as_deref().unwrap_or(""));
        }
        return 1;
    }
    0
}

fn resolve_dates(args: &ResolveArgs) -> i32 {
    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            return 2;
        }
    };
    if !args.dir.is_dir() {
        error!("{} is not a directory", args.dir.display());
        return 1;
    }
    let resolver = DateResolver::new(config.extended_date_rules || args.extended_date_rules);
    let filter = FileFilter {
        exclude_folders: config.exclude_folders.clone(),
        exclude_file_prefixes: config.exclude_file_prefixes.clone(),
    };
    let entries = survey_dates(&args.dir, &resolver, &filter);
    if let Err(e) = write_survey(&args.out_dir, &entries) {
        error!("{e}");
        return 1;
    }
    for (group, (files, resolved, failed)) in group_counts(&entries) {
        let name = if group.is_empty() { "." } else { group };
        println!("{name}: {files} files, {resolved} dated, {failed} unresolved");
    }
    println!("Results written to {}", args.out_dir.display());
    0
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let code = match &cli.command {
        Command::Run(args) => run(args),
        Command::ResolveDates(args) => resolve_dates(args),
    };
    process::exit(code);
}
