use glob::{glob_with, MatchOptions, Pattern};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};

/// Name marker of the holdings-detail table.
pub const PRIMARY_MARKER: &str = "INFOTABLE";

const COPY_BUF: usize = 64 * 1024;

/// The `.tsv` tables expanded from one archive into its scratch directory.
#[derive(Debug)]
pub struct TableSet {
    dir: PathBuf,
    tables: Vec<PathBuf>,
}

impl TableSet {
    /// Collect every `.tsv` under `dir`, sorted by path.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let pattern = format!(
            "{}/**/*.tsv",
            Pattern::escape(&dir.to_string_lossy())
        );
        let options = MatchOptions {
            case_sensitive: false,
            ..MatchOptions::new()
        };

        let mut tables = Vec::new();
        let paths = glob_with(&pattern, options)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        for entry in paths {
            match entry {
                Ok(path) if path.is_file() => tables.push(path),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "unreadable path while scanning tables"),
            }
        }
        tables.sort();
        Ok(Self { dir, tables })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tables(&self) -> &[PathBuf] {
        &self.tables
    }

    /// Holdings-detail candidates, in name order.
    pub fn primary_candidates(&self) -> impl Iterator<Item = &Path> {
        self.tables
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| is_primary(p))
    }

    /// Every table that is not a holdings-detail candidate.
    pub fn auxiliaries(&self) -> impl Iterator<Item = &Path> {
        self.tables
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| !is_primary(p))
    }

    /// Remove the scratch directory and everything in it.
    pub fn discard(self) -> Result<()> {
        remove_scratch(&self.dir)
    }
}

fn is_primary(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_uppercase().contains(PRIMARY_MARKER))
        .unwrap_or(false)
}

/// Remove `dir` recursively; a directory that is already gone is fine.
pub fn remove_scratch(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "removed scratch directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Expand every entry of `archive_path` into `target_dir`. On error the
/// directory is left as-is for the caller to discard.
#[instrument(level = "info", skip_all, fields(archive = %archive_path.as_ref().display()))]
pub fn unpack(archive_path: impl AsRef<Path>, target_dir: impl AsRef<Path>) -> Result<TableSet> {
    let archive_path = archive_path.as_ref();
    let target_dir = target_dir.as_ref();
    let corrupt = |reason: String| PipelineError::CorruptArchive {
        path: archive_path.to_path_buf(),
        reason,
    };

    let start = Instant::now();
    fs::create_dir_all(target_dir)?;

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt(e.to_string()))?;

    let mut extracted = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| corrupt(format!("entry #{i}: {e}")))?;
        let name = entry.name().to_string();

        let Some(relative) = entry.enclosed_name() else {
            warn!(name = %name, "skipping entry with unsafe path");
            continue;
        };
        let out_path = target_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = BufWriter::new(File::create(&out_path)?);
        let bytes = copy_entry(&mut entry, &mut out).map_err(|e| match e {
            CopyError::Read(e) => corrupt(format!("{name}: {e}")),
            CopyError::Write(e) => PipelineError::Io(e),
        })?;
        out.flush()?;
        debug!(name = %name, bytes, "extracted");
        extracted += 1;
    }

    let tables = TableSet::scan(target_dir)?;
    info!(
        entries = extracted,
        tables = tables.tables().len(),
        elapsed = ?start.elapsed(),
        "unpacked"
    );
    Ok(tables)
}

enum CopyError {
    Read(std::io::Error),
    Write(std::io::Error),
}

/// Like `io::copy`, but keeps a bad entry apart from a failing disk.
fn copy_entry<R: Read, W: Write>(entry: &mut R, out: &mut W) -> std::result::Result<u64, CopyError> {
    let mut buf = vec![0u8; COPY_BUF];
    let mut total = 0u64;
    loop {
        let n = match entry.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        out.write_all(&buf[..n]).map_err(CopyError::Write)?;
        total += n as u64;
    }
}
