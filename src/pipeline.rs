use reqwest::Client;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};
use tokio::{task::spawn_blocking, time::Instant};
use tracing::{error, info, instrument, warn};

use crate::aggregate::aggregate;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::{self, urls::discover, zips, ArchiveRef};
use crate::process::{
    join::{join, JoinReport},
    unpack::{remove_scratch, unpack},
};

/// How one archive fared.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveOutcome {
    pub archive: String,
    pub url: String,
    #[serde(flatten)]
    pub status: ArchiveStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveStatus {
    Joined {
        output: PathBuf,
        rows_written: usize,
        duplicates_dropped: usize,
        warnings: Vec<String>,
    },
    Failed {
        error: String,
    },
}

/// Result of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub start_year: i32,
    pub end_year: i32,
    pub archives: Vec<ArchiveOutcome>,
    pub year_files: BTreeMap<i32, PathBuf>,
    pub rows_aggregated: usize,
    pub rows_excluded: usize,
}

impl RunSummary {
    pub fn failures(&self) -> impl Iterator<Item = &ArchiveOutcome> {
        self.archives
            .iter()
            .filter(|a| matches!(a.status, ArchiveStatus::Failed { .. }))
    }

    /// True when every archive was joined.
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        writeln!(
            f,
            "years {}..={}: {} archive(s), {} joined, {} failed",
            self.start_year,
            self.end_year,
            self.archives.len(),
            self.archives.len() - failed,
            failed
        )?;
        for a in &self.archives {
            match &a.status {
                ArchiveStatus::Joined {
                    output,
                    rows_written,
                    warnings,
                    ..
                } => {
                    writeln!(
                        f,
                        "  ok     {} -> {} ({} rows)",
                        a.archive,
                        output.display(),
                        rows_written
                    )?;
                    for w in warnings {
                        writeln!(f, "         warning: {w}")?;
                    }
                }
                ArchiveStatus::Failed { error } => {
                    writeln!(f, "  failed {}: {}", a.archive, error)?
                }
            }
        }
        for (year, path) in &self.year_files {
            writeln!(f, "  {} -> {}", year, path.display())?;
        }
        write!(
            f,
            "{} row(s) aggregated, {} without a usable report date",
            self.rows_aggregated, self.rows_excluded
        )
    }
}

/// Locate, fetch, unpack and join each archive in turn, then build the
/// per-year files once.
pub struct Pipeline {
    client: Client,
    config: Config,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        let client = fetch::build_client(&config)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fails only if discovery or aggregation fails; a broken archive is
    /// recorded in the summary and the run moves on.
    #[instrument(level = "info", skip(self))]
    pub async fn run(&self, start_year: i32, end_year: i32) -> Result<RunSummary> {
        let start = Instant::now();
        let archives = discover(&self.client, &self.config, start_year, end_year).await?;
        tokio::fs::create_dir_all(&self.config.data_dir).await?;

        let mut outcomes = Vec::with_capacity(archives.len());
        for (i, reference) in archives.iter().enumerate() {
            info!(n = i + 1, of = archives.len(), archive = %reference.file_name(), "processing");
            let status = match self.process_archive(reference).await {
                Ok(report) => ArchiveStatus::Joined {
                    output: report.output,
                    rows_written: report.rows_written,
                    duplicates_dropped: report.duplicates_dropped,
                    warnings: report.warnings.iter().map(ToString::to_string).collect(),
                },
                Err(e) => {
                    error!(archive = %reference.file_name(), error = %e, "archive failed");
                    ArchiveStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(ArchiveOutcome {
                archive: reference.file_name().to_string(),
                url: reference.url().to_string(),
                status,
            });
        }

        let data_dir = self.config.data_dir.clone();
        let annual_dir = self.config.annual_dir.clone();
        let aggregated = spawn_blocking(move || aggregate(&data_dir, &annual_dir)).await??;

        let summary = RunSummary {
            start_year,
            end_year,
            archives: outcomes,
            year_files: aggregated.outputs,
            rows_aggregated: aggregated.rows_kept,
            rows_excluded: aggregated.rows_excluded,
        };
        info!(
            archives = summary.archives.len(),
            failed = summary.failures().count(),
            years = summary.year_files.len(),
            elapsed = ?start.elapsed(),
            "run complete"
        );
        Ok(summary)
    }

    /// Fetch → unpack → join inside `<data_dir>/<stem>/`, which is gone afterwards
    /// whatever happened.
    async fn process_archive(&self, reference: &ArchiveRef) -> Result<JoinReport> {
        let scratch = self.config.data_dir.join(reference.stem());
        let output = self.config.data_dir.join(format!("{}.csv", reference.stem()));

        let result = self.fetch_unpack_join(reference, &scratch, output).await;

        let cleanup_dir = scratch.clone();
        match spawn_blocking(move || remove_scratch(&cleanup_dir)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(dir = %scratch.display(), error = %e, "could not remove scratch directory")
            }
            Err(e) => warn!(dir = %scratch.display(), error = %e, "scratch cleanup task failed"),
        }
        result
    }

    async fn fetch_unpack_join(
        &self,
        reference: &ArchiveRef,
        scratch: &Path,
        output: PathBuf,
    ) -> Result<JoinReport> {
        let archive = zips::fetch(&self.client, &self.config, reference, scratch).await?;

        let target = scratch.to_path_buf();
        let tables = spawn_blocking(move || unpack(&archive, &target)).await??;

        spawn_blocking(move || join(tables, &output)).await?
    }
}
