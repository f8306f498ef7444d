use std::{
    collections::BTreeSet,
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::Result;
use crate::process::utils::non_empty;

/// Output columns, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Cik,
    NameOfIssuer,
    Cusip,
    Value,
    Rdate,
}

/// Columns that are present in a table. Iterates in file order.
pub type ColumnSet = BTreeSet<Column>;

impl Column {
    pub const ALL: [Column; 5] = [
        Column::Cik,
        Column::NameOfIssuer,
        Column::Cusip,
        Column::Value,
        Column::Rdate,
    ];

    /// Columns copied straight from an SEC table; `cik` is derived instead.
    pub const SOURCED: [Column; 4] = [
        Column::NameOfIssuer,
        Column::Cusip,
        Column::Value,
        Column::Rdate,
    ];

    /// Header written to output CSVs.
    pub fn header(self) -> &'static str {
        match self {
            Column::Cik => "cik",
            Column::NameOfIssuer => "nameOfIssuer",
            Column::Cusip => "cusip",
            Column::Value => "value",
            Column::Rdate => "rdate",
        }
    }

    /// Column name in the SEC TSV tables.
    pub fn source(self) -> &'static str {
        match self {
            Column::Cik => "CIK",
            Column::NameOfIssuer => "NAMEOFISSUER",
            Column::Cusip => "CUSIP",
            Column::Value => "VALUE",
            Column::Rdate => "PERIODOFREPORT",
        }
    }

    pub fn from_header(header: &str) -> Option<Column> {
        Column::ALL
            .into_iter()
            .find(|c| c.header() == header.trim())
    }
}

/// One normalized holding. A `None` field is a value the sources did not
/// provide; whether the column exists at all is tracked by a [`ColumnSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HoldingRecord {
    pub cik: Option<String>,
    pub name_of_issuer: Option<String>,
    pub cusip: Option<String>,
    pub value: Option<String>,
    pub rdate: Option<String>,
}

impl HoldingRecord {
    pub fn get(&self, column: Column) -> Option<&str> {
        match column {
            Column::Cik => self.cik.as_deref(),
            Column::NameOfIssuer => self.name_of_issuer.as_deref(),
            Column::Cusip => self.cusip.as_deref(),
            Column::Value => self.value.as_deref(),
            Column::Rdate => self.rdate.as_deref(),
        }
    }

    pub fn set(&mut self, column: Column, value: Option<String>) {
        let slot = match column {
            Column::Cik => &mut self.cik,
            Column::NameOfIssuer => &mut self.name_of_issuer,
            Column::Cusip => &mut self.cusip,
            Column::Value => &mut self.value,
            Column::Rdate => &mut self.rdate,
        };
        *slot = value;
    }

    /// Identity within one archive: (filer, issuer, security, value).
    pub fn identity(&self) -> (Option<&str>, Option<&str>, Option<&str>, Option<&str>) {
        (
            self.cik.as_deref(),
            self.name_of_issuer.as_deref(),
            self.cusip.as_deref(),
            self.value.as_deref(),
        )
    }
}

/// CSV writer restricted to the columns a table actually has.
pub struct HoldingsWriter<W: Write> {
    columns: Vec<Column>,
    inner: csv::Writer<W>,
}

impl HoldingsWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, columns: &ColumnSet) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), columns)
    }
}

impl<W: Write> HoldingsWriter<W> {
    pub fn new(writer: W, columns: &ColumnSet) -> Result<Self> {
        let columns: Vec<Column> = columns.iter().copied().collect();
        let mut inner = WriterBuilder::new().has_headers(false).from_writer(writer);
        if !columns.is_empty() {
            inner.write_record(columns.iter().map(|c| c.header()))?;
        }
        Ok(Self { columns, inner })
    }

    pub fn write(&mut self, record: &HoldingRecord) -> Result<()> {
        if self.columns.is_empty() {
            return Ok(());
        }
        self.inner.write_record(
            self.columns
                .iter()
                .map(|c| record.get(*c).unwrap_or_default()),
        )?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.inner.flush()?;
        self.inner
            .into_inner()
            .map_err(|e| std::io::Error::new(e.error().kind(), e.to_string()).into())
    }
}

/// Read a holdings CSV written by [`HoldingsWriter`]. Unknown columns are ignored.
pub fn read_holdings(path: impl AsRef<Path>) -> Result<(ColumnSet, Vec<HoldingRecord>)> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_path(path.as_ref())?;
    let mapping: Vec<Option<Column>> = rdr.headers()?.iter().map(Column::from_header).collect();
    let columns: ColumnSet = mapping.iter().flatten().copied().collect();

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row?;
        let mut record = HoldingRecord::default();
        for (value, column) in row.iter().zip(&mapping) {
            if let Some(column) = column {
                record.set(*column, non_empty(value));
            }
        }
        records.push(record);
    }
    Ok((columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_only_present_columns_in_file_order() {
        let columns: ColumnSet = [Column::Value, Column::Cik, Column::NameOfIssuer]
            .into_iter()
            .collect();
        let mut writer = HoldingsWriter::new(Vec::new(), &columns).unwrap();
        writer
            .write(&HoldingRecord {
                cik: Some("0001".into()),
                name_of_issuer: Some("Acme, Inc".into()),
                cusip: Some("ignored".into()),
                value: None,
                rdate: None,
            })
            .unwrap();
        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(out, "cik,nameOfIssuer,value\n0001,\"Acme, Inc\",\n");
    }

    #[test]
    fn reads_back_known_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2023q1.csv");
        std::fs::write(&path, "cik,year,rdate\n0001,2023,31-MAR-2023\n,2023,\n").unwrap();

        let (columns, records) = read_holdings(&path).unwrap();
        assert_eq!(columns.into_iter().collect::<Vec<_>>(), vec![Column::Cik, Column::Rdate]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].cik.as_deref(), Some("0001"));
        assert_eq!(records[0].rdate.as_deref(), Some("31-MAR-2023"));
        assert_eq!(records[1], HoldingRecord::default());
    }
}
