use glob::{glob, Pattern};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::process::{
    date_parser::report_year,
    record::{read_holdings, Column, ColumnSet, HoldingRecord, HoldingsWriter},
};

/// `13F_<year>.csv`
pub fn year_file_name(year: i32) -> String {
    format!("13F_{year}.csv")
}

#[derive(Debug, Default, Clone)]
pub struct AggregateReport {
    pub files_scanned: usize,
    pub rows_kept: usize,
    /// Rows without a parsable report date.
    pub rows_excluded: usize,
    pub outputs: BTreeMap<i32, PathBuf>,
}

#[derive(Default)]
struct YearBucket {
    columns: ColumnSet,
    records: Vec<HoldingRecord>,
}

/// Per-archive CSVs directly inside `dir`, sorted by name.
pub fn archive_csvs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*.csv", Pattern::escape(&dir.as_ref().to_string_lossy()));
    let paths = glob(&pattern)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "unreadable path while scanning archive outputs"),
        }
    }
    files.sort();
    Ok(files)
}

/// Bucket every per-archive row by the year of its `rdate` and write one
/// `13F_<year>.csv` per year into `year_output_dir`, replacing older files.
#[instrument(level = "info", skip_all, fields(input = %archive_output_dir.as_ref().display()))]
pub fn aggregate(
    archive_output_dir: impl AsRef<Path>,
    year_output_dir: impl AsRef<Path>,
) -> Result<AggregateReport> {
    let year_output_dir = year_output_dir.as_ref();
    let start = Instant::now();
    let mut report = AggregateReport::default();
    let mut buckets: BTreeMap<i32, YearBucket> = BTreeMap::new();

    for path in archive_csvs(&archive_output_dir)? {
        let (columns, records) = read_holdings(&path)?;
        report.files_scanned += 1;

        if !columns.contains(&Column::Rdate) {
            warn!(file = %path.display(), rows = records.len(), "no rdate column; rows excluded");
            report.rows_excluded += records.len();
            continue;
        }

        let mut excluded = 0usize;
        for record in records {
            match record.rdate.as_deref().and_then(report_year) {
                Some(year) => {
                    let bucket = buckets.entry(year).or_default();
                    bucket.columns.extend(columns.iter().copied());
                    bucket.records.push(record);
                    report.rows_kept += 1;
                }
                None => excluded += 1,
            }
        }
        if excluded > 0 {
            warn!(file = %path.display(), rows = excluded, "rows without a parsable rdate excluded");
        }
        report.rows_excluded += excluded;
        debug!(file = %path.display(), "scanned");
    }

    fs::create_dir_all(year_output_dir)?;
    for (year, bucket) in buckets {
        let out = year_output_dir.join(year_file_name(year));
        let mut writer = HoldingsWriter::create(&out, &bucket.columns)?;
        for record in &bucket.records {
            writer.write(record)?;
        }
        writer.finish()?;
        info!(year, rows = bucket.records.len(), output = %out.display(), "wrote annual file");
        report.outputs.insert(year, out);
    }

    info!(
        files = report.files_scanned,
        kept = report.rows_kept,
        excluded = report.rows_excluded,
        years = report.outputs.len(),
        elapsed = ?start.elapsed(),
        "aggregation complete"
    );
    Ok(report)
}
