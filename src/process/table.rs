use csv::ReaderBuilder;
use std::path::Path;

use crate::process::utils::normalize_header;

/// A tab-separated SEC table, held in memory with only the columns asked for.
#[derive(Debug)]
pub struct RawTable {
    /// Normalized names of the kept columns, in file order.
    pub headers: Vec<String>,
    /// Each data row, one string per kept column.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Read `path` as UTF-8 TSV with a header row, keeping the columns whose
    /// normalized name satisfies `keep`. Rows with the wrong field count or
    /// invalid UTF-8 fail the whole table.
    pub fn read_tsv<P, F>(path: P, keep: F) -> Result<Self, csv::Error>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> bool,
    {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .quoting(false)
            .flexible(false)
            .from_path(path.as_ref())?;

        let mut headers = Vec::new();
        let mut kept = Vec::new();
        for (idx, raw) in rdr.headers()?.iter().enumerate() {
            let name = normalize_header(raw);
            if keep(&name) {
                headers.push(name);
                kept.push(idx);
            }
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(
                kept.iter()
                    .map(|&i| record.get(i).unwrap_or_default().to_string())
                    .collect(),
            );
        }

        Ok(Self { headers, rows })
    }

    /// Index of `name` among the kept columns.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}
