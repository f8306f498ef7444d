use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{PipelineError, Result, TableReadWarning};
use crate::process::{
    record::{Column, ColumnSet, HoldingRecord, HoldingsWriter},
    table::RawTable,
    unpack::TableSet,
    utils::{clean_str, non_empty},
};

/// Column shared by every table of a 13F data set.
pub const JOIN_KEY: &str = "ACCESSION_NUMBER";

const ACCESSION_SEPARATOR: char = '-';

/// What a join produced.
#[derive(Debug, Clone)]
pub struct JoinReport {
    pub output: PathBuf,
    pub primary_table: PathBuf,
    pub primary_rows: usize,
    /// Auxiliary tables joined onto the primary, in join order.
    pub joined_tables: Vec<PathBuf>,
    pub columns: ColumnSet,
    pub rows_written: usize,
    pub duplicates_dropped: usize,
    pub warnings: Vec<TableReadWarning>,
}

/// Filer identifier: the accession number up to its first `-`.
/// `None` when there is no separator or nothing before it.
pub fn derive_cik(accession: &str) -> Option<String> {
    let (head, _) = clean_str(accession).split_once(ACCESSION_SEPARATOR)?;
    let head = head.trim();
    (!head.is_empty()).then(|| head.to_string())
}

#[derive(Debug, Clone)]
struct JoinedRow {
    accession: Option<String>,
    record: HoldingRecord,
}

/// Column names worth reading from any table of the set.
fn wanted(header: &str) -> bool {
    header == JOIN_KEY || Column::SOURCED.iter().any(|c| c.source() == header)
}

/// Join the tables of one archive into a holdings CSV at `output_path`,
/// then remove the scratch directory, whether or not the join succeeded.
#[instrument(level = "info", skip_all, fields(dir = %tables.dir().display()))]
pub fn join(tables: TableSet, output_path: impl AsRef<Path>) -> Result<JoinReport> {
    let result = write_holdings(&tables, output_path.as_ref());
    match (result, tables.discard()) {
        (Ok(report), Ok(())) => Ok(report),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), cleanup) => {
            if let Err(cleanup_err) = cleanup {
                warn!(error = %cleanup_err, "could not remove scratch directory");
            }
            Err(e)
        }
    }
}

fn write_holdings(tables: &TableSet, output_path: &Path) -> Result<JoinReport> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let (primary_path, primary) = load_primary(tables, &mut warnings)?;
    let primary_rows = primary.rows.len();
    let (mut rows, mut columns) = seed_rows(&primary);
    drop(primary);

    let mut joined_tables = Vec::new();
    if columns.contains(&Column::Cik) {
        for aux_path in tables.auxiliaries() {
            let aux = match RawTable::read_tsv(aux_path, wanted) {
                Ok(t) => t,
                Err(e) => {
                    let w = TableReadWarning {
                        table: aux_path.to_path_buf(),
                        reason: e.to_string(),
                    };
                    warn!(%w, "auxiliary table left out of join");
                    warnings.push(w);
                    continue;
                }
            };
            let Some(key) = aux.column(JOIN_KEY) else {
                debug!(table = %aux_path.display(), "no {} column; not joinable", JOIN_KEY);
                continue;
            };

            let contributes: Vec<(Column, usize)> = Column::SOURCED
                .into_iter()
                .filter(|c| !columns.contains(c))
                .filter_map(|c| aux.column(c.source()).map(|idx| (c, idx)))
                .collect();
            if contributes.is_empty() {
                debug!(table = %aux_path.display(), "adds no output columns; not joined");
                continue;
            }

            let before = rows.len();
            rows = left_join(rows, &aux, key, &contributes);
            columns.extend(contributes.iter().map(|(c, _)| *c));
            debug!(
                table = %aux_path.display(),
                rows_before = before,
                rows_after = rows.len(),
                added = ?contributes.iter().map(|(c, _)| c.header()).collect::<Vec<_>>(),
                "joined"
            );
            joined_tables.push(aux_path.to_path_buf());
        }
    } else {
        warn!(table = %primary_path.display(), "primary table has no {}; skipping joins", JOIN_KEY);
    }

    let joined_rows = rows.len();
    let records = dedup(rows.into_iter().map(|r| r.record));
    let duplicates_dropped = joined_rows - records.len();

    let mut writer = HoldingsWriter::create(output_path, &columns)?;
    for record in &records {
        writer.write(record)?;
    }
    writer.finish()?;

    info!(
        output = %output_path.display(),
        primary_rows,
        rows_written = records.len(),
        duplicates_dropped,
        warnings = warnings.len(),
        elapsed = ?start.elapsed(),
        "wrote holdings"
    );

    Ok(JoinReport {
        output: output_path.to_path_buf(),
        primary_table: primary_path,
        primary_rows,
        joined_tables,
        columns,
        rows_written: records.len(),
        duplicates_dropped,
        warnings,
    })
}

/// First holdings-detail table that parses.
fn load_primary(
    tables: &TableSet,
    warnings: &mut Vec<TableReadWarning>,
) -> Result<(PathBuf, RawTable)> {
    for candidate in tables.primary_candidates() {
        match RawTable::read_tsv(candidate, wanted) {
            Ok(table) => return Ok((candidate.to_path_buf(), table)),
            Err(e) => {
                let w = TableReadWarning {
                    table: candidate.to_path_buf(),
                    reason: e.to_string(),
                };
                warn!(%w, "primary table unreadable");
                warnings.push(w);
            }
        }
    }
    Err(PipelineError::MissingPrimaryTable {
        dir: tables.dir().to_path_buf(),
    })
}

/// One row per primary row; `cik` counts as present whenever the key column is.
fn seed_rows(primary: &RawTable) -> (Vec<JoinedRow>, ColumnSet) {
    let key = primary.column(JOIN_KEY);
    let sourced: Vec<(Column, usize)> = Column::SOURCED
        .into_iter()
        .filter_map(|c| primary.column(c.source()).map(|idx| (c, idx)))
        .collect();

    let mut columns: ColumnSet = sourced.iter().map(|(c, _)| *c).collect();
    if key.is_some() {
        columns.insert(Column::Cik);
    }

    let rows = primary
        .rows
        .iter()
        .map(|row| {
            let accession = key.and_then(|k| non_empty(&row[k]));
            let mut record = HoldingRecord {
                cik: accession.as_deref().and_then(derive_cik),
                ..HoldingRecord::default()
            };
            for &(column, idx) in &sourced {
                record.set(column, non_empty(&row[idx]));
            }
            JoinedRow { accession, record }
        })
        .collect();

    (rows, columns)
}

/// Left join on the accession number. A row with several matches is repeated
/// once per match, in `aux` order; a row without one passes through as-is.
fn left_join(
    rows: Vec<JoinedRow>,
    aux: &RawTable,
    key: usize,
    contributes: &[(Column, usize)],
) -> Vec<JoinedRow> {
    let mut index: HashMap<&str, Vec<&[String]>> = HashMap::new();
    for row in &aux.rows {
        index.entry(clean_str(&row[key])).or_default().push(row);
    }

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let matches = row.accession.as_deref().and_then(|k| index.get(k));
        match matches {
            Some(matches) => {
                for m in matches {
                    let mut joined = row.clone();
                    for &(column, idx) in contributes {
                        joined.record.set(column, non_empty(&m[idx]));
                    }
                    out.push(joined);
                }
            }
            None => out.push(row),
        }
    }
    out
}

/// Keep the first record of each (cik, issuer, cusip, value).
fn dedup(records: impl Iterator<Item = HoldingRecord>) -> Vec<HoldingRecord> {
    let mut seen: HashSet<(Option<String>, Option<String>, Option<String>, Option<String>)> =
        HashSet::new();
    records
        .filter(|r| {
            seen.insert((
                r.cik.clone(),
                r.name_of_issuer.clone(),
                r.cusip.clone(),
                r.value.clone(),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::record::read_holdings;
    use crate::test_support::{init_test_logging, write_file};
    use tempfile::tempdir;

    fn table_set(dir: &Path, files: &[(&str, &str)]) -> TableSet {
        for (name, content) in files {
            write_file(dir, name, content);
        }
        TableSet::scan(dir).unwrap()
    }

    #[test]
    fn cik_is_the_leading_accession_segment() {
        assert_eq!(derive_cik("0001-23"), Some("0001".to_string()));
        assert_eq!(derive_cik("0000950123-23-004567"), Some("0000950123".to_string()));
        assert_eq!(derive_cik("000095012323004567"), None);
        assert_eq!(derive_cik("-23"), None);
        assert_eq!(derive_cik(""), None);
    }

    #[test]
    fn joins_auxiliary_dates_onto_holdings() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let scratch = tmp.path().join("2023q1");
        let set = table_set(
            &scratch,
            &[
                (
                    "INFOTABLE.tsv",
                    "ACCESSION_NUMBER\tINFOTABLE_SK\tNAMEOFISSUER\tCUSIP\tVALUE\n\
                     0001-23\t1\tAcme\tXYZ\t100\n",
                ),
                (
                    "SUBMISSION.tsv",
                    "ACCESSION_NUMBER\tPERIODOFREPORT\n0001-23\t2023-03-31\n",
                ),
            ],
        );
        let output = tmp.path().join("2023q1.csv");

        let report = join(set, &output).unwrap();

        let csv = std::fs::read_to_string(&output).unwrap();
        assert_eq!(csv, "cik,nameOfIssuer,cusip,value,rdate\n0001,Acme,XYZ,100,2023-03-31\n");
        assert_eq!(report.rows_written, 1);
        assert_eq!(report.joined_tables, vec![scratch.join("SUBMISSION.tsv")]);
        assert!(report.warnings.is_empty());
        assert!(!scratch.exists(), "scratch directory must be removed");
    }

    #[test]
    fn left_join_keeps_unmatched_rows_and_dedups() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let scratch = tmp.path().join("2023q2");
        let set = table_set(
            &scratch,
            &[
                (
                    "INFOTABLE.tsv",
                    "ACCESSION_NUMBER\tNAMEOFISSUER\tCUSIP\tVALUE\n\
                     0001-23\tAcme\tXYZ\t100\n\
                     0001-23\tAcme\tXYZ\t100\n\
                     0001-99\tAcme\tXYZ\t100\n\
                     0002-23\tGlobex\tABC\t5\n\
                     BADACCESSION\tInitech\tDEF\t7\n",
                ),
                (
                    "COVERPAGE.tsv",
                    "ACCESSION_NUMBER\tFILINGMANAGER_NAME\n0001-23\tFirst\n0001-23\tSecond\n",
                ),
                (
                    "SUBMISSION.tsv",
                    "ACCESSION_NUMBER\tCIK\tPERIODOFREPORT\n0001-23\t999\t31-MAR-2023\n0001-99\t999\t30-JUN-2023\n",
                ),
            ],
        );
        let output = tmp.path().join("2023q2.csv");

        let report = join(set, &output).unwrap();
        let (columns, records) = read_holdings(&output).unwrap();

        assert_eq!(columns.into_iter().collect::<Vec<_>>(), Column::ALL.to_vec());
        let got: Vec<_> = records
            .iter()
            .map(|r| (r.cik.as_deref(), r.name_of_issuer.as_deref(), r.rdate.as_deref()))
            .collect();
        assert_eq!(
            got,
            vec![
                (Some("0001"), Some("Acme"), Some("31-MAR-2023")),
                (Some("0002"), Some("Globex"), None),
                (None, Some("Initech"), None),
            ]
        );
        assert_eq!(report.primary_rows, 5);
        // the repeated 0001-23 primary, plus 0001-99 colliding on identity
        assert_eq!(report.duplicates_dropped, 2);
        // COVERPAGE adds no output column, so its two rows per accession never multiply
        assert_eq!(report.joined_tables, vec![scratch.join("SUBMISSION.tsv")]);

        let mut identities = HashSet::new();
        for r in &records {
            assert!(identities.insert(r.identity()));
        }
    }

    #[test]
    fn unreadable_auxiliary_tables_are_warnings() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let scratch = tmp.path().join("2023q3");
        write_file(&scratch, "OTHERMANAGER.tsv", "ACCESSION_NUMBER\tNAME\n0001-23\ta\tb\n");
        let set = table_set(
            &scratch,
            &[(
                "INFOTABLE.tsv",
                "ACCESSION_NUMBER\tNAMEOFISSUER\n0001-23\tAcme\n",
            )],
        );
        let output = tmp.path().join("2023q3.csv");

        let report = join(set, &output).unwrap();

        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].table.ends_with("OTHERMANAGER.tsv"));
        assert!(report.joined_tables.is_empty());
        let csv = std::fs::read_to_string(&output).unwrap();
        assert_eq!(csv, "cik,nameOfIssuer\n0001,Acme\n");
    }

    #[test]
    fn missing_primary_is_fatal_for_the_archive() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let scratch = tmp.path().join("2023q4");
        let set = table_set(
            &scratch,
            &[("SUBMISSION.tsv", "ACCESSION_NUMBER\tPERIODOFREPORT\n0001-23\t2023-12-31\n")],
        );
        let output = tmp.path().join("2023q4.csv");

        let err = join(set, &output).unwrap_err();
        assert!(matches!(err, PipelineError::MissingPrimaryTable { .. }), "{err:?}");
        assert!(!output.exists());
        assert!(!scratch.exists(), "scratch directory must be removed on failure too");
    }

    #[test]
    fn failed_write_still_removes_scratch() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let scratch = tmp.path().join("2024q1");
        let set = table_set(
            &scratch,
            &[("INFOTABLE.tsv", "ACCESSION_NUMBER\tNAMEOFISSUER\n0001-24\tAcme\n")],
        );
        // a directory where the output file should go
        let output = tmp.path().join("occupied");
        std::fs::create_dir_all(&output).unwrap();

        let err = join(set, &output).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_) | PipelineError::Csv(_)), "{err:?}");
        assert!(!scratch.exists());
    }

    #[test]
    fn primary_without_key_is_written_unjoined() {
        init_test_logging();
        let tmp = tempdir().unwrap();
        let scratch = tmp.path().join("legacy");
        let set = table_set(
            &scratch,
            &[
                ("INFOTABLE.tsv", "NAMEOFISSUER\tVALUE\nAcme\t1\nAcme\t1\n"),
                ("SUBMISSION.tsv", "ACCESSION_NUMBER\tPERIODOFREPORT\n0001-23\t2023-12-31\n"),
            ],
        );
        let output = tmp.path().join("legacy.csv");

        let report = join(set, &output).unwrap();
        assert!(report.joined_tables.is_empty());
        let csv = std::fs::read_to_string(&output).unwrap();
        assert_eq!(csv, "nameOfIssuer,value\nAcme,1\n");
    }
}
