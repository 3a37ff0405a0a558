//! Filename date resolution.
//!
//! A [`DateResolver`] holds an ordered list of [`DateRule`]s. Each rule is a pure function of
//! the file name and (optionally) its containing directory; the first rule that yields a valid
//! calendar date wins. No rule ever looks at file metadata, and month names are matched against
//! a fixed ASCII table so the result does not depend on the process locale.

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2099;

const MONTHS: [(&str, u32); 24] = [
    ("jan", 1),
    ("january", 1),
    ("feb", 2),
    ("february", 2),
    ("mar", 3),
    ("march", 3),
    ("apr", 4),
    ("april", 4),
    ("may", 5),
    ("jun", 6),
    ("june", 6),
    ("jul", 7),
    ("july", 7),
    ("aug", 8),
    ("august", 8),
    ("sep", 9),
    ("sept", 9),
    ("september", 9),
    ("oct", 10),
    ("october", 10),
    ("nov", 11),
    ("november", 11),
    ("dec", 12),
    ("december", 12),
];

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})([.\-_])(\d{2})([.\-_])(\d{2})").expect("static pattern")
});
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z]{3,9})\.? +(\d{1,2}),? +(\d{4})").expect("static pattern")
});
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]{3,9})[_ ](\d{4})").expect("static pattern"));
static YEAR_ONLY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").expect("static pattern"));
static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z]+").expect("static pattern"));

/// One pattern rule of the resolution cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateRule {
    /// `YYYY.MM.DD`, `YYYY-MM-DD`, `YYYY_MM_DD`
    NumericDate,
    /// `Mon. DD, YYYY`, `Mon DD YYYY`
    MonthDayYear,
    /// `Mon_YYYY`, `Mon YYYY`
    MonthYear,
    /// A lone `YYYY`.
    YearOnly,
    /// A lone month name, year recovered from the nearest `YYYY` ancestor directory.
    MonthWithFolderYear,
}

/// How much of the resolved date came from the file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    Day,
    Month,
    Year,
}

impl DateRule {
    /// Rules enabled by default.
    pub const STANDARD: [DateRule; 3] = [
        DateRule::NumericDate,
        DateRule::MonthDayYear,
        DateRule::MonthYear,
    ];

    /// Default rules followed by the year-only and folder-year fallbacks.
    pub const EXTENDED: [DateRule; 5] = [
        DateRule::NumericDate,
        DateRule::MonthDayYear,
        DateRule::MonthYear,
        DateRule::YearOnly,
        DateRule::MonthWithFolderYear,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DateRule::NumericDate => "numeric_date",
            DateRule::MonthDayYear => "month_day_year",
            DateRule::MonthYear => "month_year",
            DateRule::YearOnly => "year_only",
            DateRule::MonthWithFolderYear => "month_with_folder_year",
        }
    }

    pub fn precision(self) -> Precision {
        match self {
            DateRule::NumericDate | DateRule::MonthDayYear => Precision::Day,
            DateRule::MonthYear | DateRule::MonthWithFolderYear => Precision::Month,
            DateRule::YearOnly => Precision::Year,
        }
    }

    /// Apply this rule alone to `file_name`. `dir` is only consulted by
    /// [`DateRule::MonthWithFolderYear`].
    pub fn apply(self, file_name: &str, dir: Option<&Path>) -> Option<NaiveDate> {
        match self {
            DateRule::NumericDate => first_aligned(&NUMERIC_DATE, file_name, |c| {
                if c[2] != c[4] {
                    return None;
                }
                ymd(num(&c[1])?, num(&c[3])?, num(&c[5])?)
            }),
            DateRule::MonthDayYear => first_aligned(&MONTH_DAY_YEAR, file_name, |c| {
                ymd(num(&c[3])?, month_from_name(&c[1])?, num(&c[2])?)
            }),
            DateRule::MonthYear => first_aligned(&MONTH_YEAR, file_name, |c| {
                ymd(num(&c[2])?, month_from_name(&c[1])?, 1)
            }),
            DateRule::YearOnly => first_aligned(&YEAR_ONLY, file_name, |c| ymd(num(&c[0])?, 1, 1)),
            DateRule::MonthWithFolderYear => {
                let year = folder_year(dir?)?;
                first_aligned(&WORD, file_name, |c| ymd(year, month_from_name(&c[0])?, 1))
            }
        }
    }
}

/// A date together with the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    pub date: NaiveDate,
    pub rule: DateRule,
}

impl ResolvedDate {
    pub fn precision(&self) -> Precision {
        self.rule.precision()
    }
}

/// Ordered cascade of [`DateRule`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateResolver {
    rules: Vec<DateRule>,
}

impl Default for DateResolver {
    fn default() -> Self {
        Self::standard()
    }
}

impl DateResolver {
    pub fn standard() -> Self {
        Self::with_rules(DateRule::STANDARD.to_vec())
    }

    pub fn extended() -> Self {
        Self::with_rules(DateRule::EXTENDED.to_vec())
    }

    pub fn new(extended: bool) -> Self {
        if extended {
            Self::extended()
        } else {
            Self::standard()
        }
    }

    pub fn with_rules(rules: Vec<DateRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[DateRule] {
        &self.rules
    }

    /// Resolve a bare file name, with `dir` as its containing directory if known.
    pub fn resolve(&self, file_name: &str, dir: Option<&Path>) -> Option<ResolvedDate> {
        self.rules.iter().find_map(|&rule| {
            rule.apply(file_name, dir)
                .map(|date| ResolvedDate { date, rule })
        })
    }

    /// Resolve using the last path component as file name and the rest as directory.
    pub fn resolve_path(&self, path: &Path) -> Option<ResolvedDate> {
        let file_name = path.file_name()?.to_str()?;
        self.resolve(file_name, path.parent())
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, '.' | '-' | '_' | ' ')
}

/// The span `start..end` sits at a name boundary on both sides.
fn aligned(s: &str, start: usize, end: usize) -> bool {
    let before_ok = s[..start].chars().next_back().is_none_or(is_separator);
    let after_ok = s[end..].chars().next().is_none_or(is_separator);
    before_ok && after_ok
}

/// First boundary-aligned match of `re` in `s` for which `accept` returns a value.
/// Candidates are tried at every start position, so overlapping matches are not skipped.
fn first_aligned<T>(
    re: &Regex,
    s: &str,
    mut accept: impl FnMut(&Captures<'_>) -> Option<T>,
) -> Option<T> {
    let mut pos = 0;
    while pos < s.len() {
        let caps = re.captures_at(s, pos)?;
        let whole = caps.get(0)?;
        if aligned(s, whole.start(), whole.end()) {
            if let Some(found) = accept(&caps) {
                return Some(found);
            }
        }
        pos = whole.start() + s[whole.start()..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn num<T: std::str::FromStr>(digits: &str) -> Option<T> {
    digits.parse().ok()
}

fn ymd(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    MONTHS
        .iter()
        .find(|(candidate, _)| *candidate == lower)
        .map(|&(_, month)| month)
}

/// Year of the nearest ancestor (including `dir` itself) named exactly `YYYY`.
fn folder_year(dir: &Path) -> Option<i32> {
    dir.ancestors().find_map(|ancestor| {
        let name = ancestor.file_name()?.to_str()?;
        if name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit()) {
            num::<i32>(name).filter(|y| (MIN_YEAR..=MAX_YEAR).contains(y))
        } else {
            None
        }
    })
}
