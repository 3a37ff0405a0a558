//! The shared token table: `document_id, group, date, token, count`.
//!
//! Loaded once, then read-only for every stage.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{Datelike, NaiveDate};
use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::collect_files;
use crate::date::DateResolver;
use crate::error::{Error, Result};

/// Column names of the input contract, in canonical order.
pub const COLUMNS: [&str; 5] = ["document_id", "group", "date", "token", "count"];

/// One row of the token table after date resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub document_id: String,
    pub group: String,
    pub date: Option<NaiveDate>,
    pub token: String,
    pub count: u64,
}

impl TokenRecord {
    pub fn new(
        document_id: impl Into<String>,
        group: impl Into<String>,
        date: Option<NaiveDate>,
        token: impl Into<String>,
        count: u64,
    ) -> Self {
        TokenRecord {
            document_id: document_id.into(),
            group: group.into(),
            date,
            token: token.into(),
            count,
        }
    }
}

/// A document with its token multiset. Identity is `(group, id, date)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub group: String,
    pub date: Option<NaiveDate>,
    pub tokens: BTreeMap<String, u64>,
}

impl Document {
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains_key(token)
    }

    /// Last path component of the id, for log messages.
    pub fn file_name(&self) -> &str {
        self.id.rsplit(['/', '\\']).next().unwrap_or(&self.id)
    }

    pub fn year(&self) -> Option<i32> {
        self.date.map(|d| d.year())
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    document_id: String,
    group: String,
    date: Option<String>,
    token: String,
    count: u64,
}

/// Immutable collection of [`Document`]s, ordered by `(group, id, date)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenTable {
    documents: Vec<Document>,
}

impl TokenTable {
    /// Build from already-resolved records. Rows with a zero count or an empty token are
    /// dropped; repeated `(document, token)` rows are summed.
    pub fn from_records(records: impl IntoIterator<Item = TokenRecord>) -> Self {
        let mut docs: BTreeMap<(String, String, Option<NaiveDate>), BTreeMap<String, u64>> =
            BTreeMap::new();
        for r in records {
            if r.count == 0 || r.token.is_empty() {
                debug!(
                    "Dropping empty row for {} in group {}",
                    r.document_id, r.group
                );
                continue;
            }
            *docs
                .entry((r.group, r.document_id, r.date))
                .or_default()
                .entry(r.token)
                .or_insert(0) += r.count;
        }
        let documents = docs
            .into_iter()
            .map(|((group, id, date), tokens)| Document {
                id,
                group,
                date,
                tokens,
            })
            .collect();
        TokenTable { documents }
    }

    /// Load a token-table CSV, or every `*.csv` below a directory.
    ///
    /// A missing path or a file without a header yields an empty table and a warning.
    /// Missing/unexpected columns and malformed rows are [`Error::Schema`].
    pub fn load(path: &Path, resolver: &DateResolver) -> Result<Self> {
        if !path.exists() {
            warn!("Token table {} not found; continuing with an empty table", path.display());
            return Ok(TokenTable::default());
        }
        let files = collect_files(path, &["csv"]);
        if files.is_empty() {
            warn!("No token table CSV files under {}", path.display());
        }
        let mut records = Vec::new();
        for file in &files {
            let f = File::open(file).map_err(|e| Error::io(file, e))?;
            let mut rows = read_records(f, file, resolver)?;
            info!("Read {} rows from {}", rows.len(), file.display());
            records.append(&mut rows);
        }
        let table = TokenTable::from_records(records);
        table.log_unresolved();
        Ok(table)
    }

    fn log_unresolved(&self) {
        for doc in self.undated() {
            warn!(
                "Unresolved date for {} (group {}); excluded from date-keyed tables",
                doc.file_name(),
                doc.group
            );
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Distinct group names, sorted.
    pub fn groups(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.documents.iter().map(|d| d.group.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    pub fn group<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Document> + 'a {
        self.documents.iter().filter(move |d| d.group == name)
    }

    pub fn undated(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter().filter(|d| d.date.is_none())
    }

    /// Years with at least one dated document.
    pub fn years(&self) -> BTreeSet<i32> {
        self.documents.iter().filter_map(Document::year).collect()
    }
}

/// Parse one token-table CSV. `source` is only used in error messages.
pub fn read_records<R: Read>(
    reader: R,
    source: &Path,
    resolver: &DateResolver,
) -> Result<Vec<TokenRecord>> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
    let headers = rdr.headers().map_err(|e| Error::csv(source, e))?.clone();
    if headers.iter().all(str::is_empty) {
        warn!("{} has no header row; treated as empty", source.display());
        return Ok(Vec::new());
    }
    check_columns(headers.iter(), source)?;

    let mut cache: HashMap<(String, Option<String>), Option<NaiveDate>> = HashMap::new();
    let mut out = Vec::new();
    for (i, row) in rdr.deserialize::<RawRow>().enumerate() {
        let raw = row.map_err(|e| Error::schema(source, format!("row {}: {}", i + 2, e)))?;
        let date = *cache
            .entry((raw.document_id.clone(), raw.date.clone()))
            .or_insert_with(|| resolve_row_date(raw.date.as_deref(), &raw.document_id, resolver));
        out.push(TokenRecord {
            document_id: raw.document_id,
            group: raw.group,
            date,
            token: raw.token,
            count: raw.count,
        });
    }
    Ok(out)
}

fn check_columns<'a>(found: impl Iterator<Item = &'a str>, source: &Path) -> Result<()> {
    let found: BTreeSet<&str> = found.collect();
    let missing: Vec<&str> = COLUMNS.iter().copied().filter(|c| !found.contains(c)).collect();
    let unexpected: Vec<&str> = found.iter().copied().filter(|c| !COLUMNS.contains(c)).collect();
    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    let mut reason = Vec::new();
    if !missing.is_empty() {
        reason.push(format!("missing column(s) {}", missing.join(", ")));
    }
    if !unexpected.is_empty() {
        reason.push(format!("unexpected column(s) {}", unexpected.join(", ")));
    }
    Err(Error::schema(source, reason.join("; ")))
}

/// ISO day, then `YYYY-MM`, then the filename cascade on the raw value, then on the document path.
fn resolve_row_date(
    raw: Option<&str>,
    document_id: &str,
    resolver: &DateResolver,
) -> Option<NaiveDate> {
    if let Some(value) = raw.filter(|v| !v.is_empty()) {
        if let Ok(day) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Some(day);
        }
        if let Ok(month) = NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d") {
            return Some(month);
        }
        if let Some(r) = resolver.resolve(value, None) {
            return Some(r.date);
        }
        debug!("Date value {value:?} of {document_id} not understood; trying the path");
    }
    resolver.resolve_path(Path::new(document_id)).map(|r| r.date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_str(csv: &str) -> Result<TokenTable> {
        let resolver = DateResolver::standard();
        let records = read_records(csv.as_bytes(), Path::new("mem.csv"), &resolver)?;
        Ok(TokenTable::from_records(records))
    }

    #[test]
    fn dates_come_from_column_or_path() {
        let table = load_str(
            "document_id,group,date,token,count\n\
             news/2022-01-10 a.txt,news,,housing,2\n\
             reddit/x.txt,reddit,2021-03-04,housing,1\n\
             reddit/y.txt,reddit,2021-05,rent,1\n\
             \"meeting/Nov. 07, 2018_z.pdf\",meeting,,rent,1\n\
             meeting/notes.pdf,meeting,,rent,4\n",
        )
        .unwrap();
        let dates: Vec<_> = table.documents().iter().map(|d| (d.file_name(), d.date)).collect();
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day);
        assert_eq!(
            dates,
            vec![
                ("Nov. 07, 2018_z.pdf", d(2018, 11, 7)),
                ("notes.pdf", None),
                ("2022-01-10 a.txt", d(2022, 1, 10)),
                ("x.txt", d(2021, 3, 4)),
                ("y.txt", d(2021, 5, 1)),
            ]
        );
        assert_eq!(table.groups(), vec!["meeting", "news", "reddit"]);
        assert_eq!(table.undated().count(), 1);
    }

    #[test]
    fn quoted_document_ids_and_summed_rows() {
        let table = load_str(
            "group,token,count,date,document_id\n\
             news,rent,2,2022-01-01,\"a, b.txt\"\n\
             news,rent,3,2022-01-01,\"a, b.txt\"\n\
             news,zero,0,2022-01-01,\"a, b.txt\"\n",
        )
        .unwrap();
        assert_eq!(table.len(), 1);
        let doc = &table.documents()[0];
        assert_eq!(doc.tokens.get("rent"), Some(&5));
        assert!(!doc.contains("zero"));
    }

    #[test]
    fn missing_column_is_schema_error() {
        let err = load_str("document_id,group,token,count\nx,news,a,1\n").unwrap_err();
        match err {
            Error::Schema { reason, .. } => assert!(reason.contains("date"), "{reason}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unexpected_column_is_schema_error() {
        let csv = "document_id,group,date,token,count,lang\nx,news,,a,1,en\n";
        let err = load_str(csv).unwrap_err();
        assert!(matches!(err, Error::Schema { ref reason, .. } if reason.contains("lang")));
    }

    #[test]
    fn negative_count_is_schema_error() {
        let err = load_str("document_id,group,date,token,count\nx,news,,a,-1\n").unwrap_err();
        assert!(matches!(err, Error::Schema { ref reason, .. } if reason.starts_with("row 2")));
    }

    #[test]
    fn empty_input_is_empty_table() {
        assert!(load_str("").unwrap().is_empty());
        assert!(load_str("document_id,group,date,token,count\n").unwrap().is_empty());
        let missing =
            TokenTable::load(Path::new("/definitely/not/here.csv"), &DateResolver::standard());
        assert!(missing.unwrap().is_empty());
    }
}
