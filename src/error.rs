use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the loader, the exporter and configuration handling.
///
/// Data sparsity (no documents, unresolved dates, absent groups) is never an error;
/// stages degrade to empty artifacts and log a warning instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Out-of-range or inconsistent configuration. Fatal before any stage runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An upstream table has missing/unexpected columns or a malformed row.
    #[error("schema mismatch in {}: {reason}", path.display())]
    Schema { path: PathBuf, reason: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Error::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn schema(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that must abort the run before any stage starts.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
