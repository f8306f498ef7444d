use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid year range: start {start_year} is after end {end_year}")]
    InvalidYearRange { start_year: i32, end_year: i32 },

    #[error("listing page {url} unavailable: {reason}")]
    SourceUnavailable { url: String, reason: String },

    #[error("no archives found for years {start_year}..={end_year}")]
    NoArchivesFound { start_year: i32, end_year: i32 },

    #[error("network error fetching {url}: {reason}")]
    NetworkError { url: String, reason: String },

    #[error("downloaded file {} is not a zip package", path.display())]
    CorruptDownload { path: PathBuf },

    #[error("archive {} is corrupt: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("no INFOTABLE table found in {}", dir.display())]
    MissingPrimaryTable { dir: PathBuf },

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A table that could not be read; logged and left out of the join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReadWarning {
    pub table: PathBuf,
    pub reason: String,
}

impl std::fmt::Display for TableReadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "skipped {}: {}", self.table.display(), self.reason)
    }
}
