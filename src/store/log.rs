//! Rainfall log: the date-keyed store behind `rainfall_log.csv`
//! (`date,rainfall_mm,source_fetched_at`).
//!
//! Writes go through a whole-file rewrite to a sibling temp file followed by
//! a rename, so a dashboard process reading the file concurrently sees either
//! the old contents or the new contents, never a half-written row.

use core::fmt;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::models::RainfallRecord;
use crate::store::csv;

const HEADER: [&str; 3] = ["date", "rainfall_mm", "source_fetched_at"];

#[derive(Debug)]
pub enum LogError {
    Io(String),
    /// A row of the persisted file failed to parse or validate. Rows are
    /// counted 1-based with the header as row 1; blank lines are skipped.
    Row { row: usize, message: String },
}

impl Display for LogError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LogError::Io(e) => write!(f, "rainfall log unreadable: {}", e),
            LogError::Row { row, message } => write!(f, "rainfall log row {}: {}", row, message),
        }
    }
}

impl Error for LogError {}

#[derive(Debug, Clone)]
pub struct RainfallLog {
    path: PathBuf,
    // BTreeMap keeps dates unique and iteration date-ascending.
    records: BTreeMap<NaiveDate, RainfallRecord>,
}

impl RainfallLog {
    /// Load the log from disk. A missing file is an empty log, not an error;
    /// the first ingestion creates it.
    pub fn load(path: &Path) -> Result<Self, LogError> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(LogError::Io(format!("{}: {}", path.display(), e))),
        };
        Self::parse(path.to_path_buf(), &text)
    }

    fn parse(path: PathBuf, text: &str) -> Result<Self, LogError> {
        let mut records = BTreeMap::new();
        let rows = csv::parse_rows(text);
        let mut iter = rows.into_iter().enumerate();

        if let Some((_, header)) = iter.next() {
            let names: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
            if names != HEADER {
                return Err(LogError::Row {
                    row: 1,
                    message: format!(
                        "expected header `{}`, got `{}`",
                        HEADER.join(","),
                        header.join(",")
                    ),
                });
            }
        }

        for (idx, row) in iter {
            let row_num = idx + 1;
            let record = parse_row(&row, row_num)?;
            if records.insert(record.date, record.clone()).is_some() {
                return Err(LogError::Row {
                    row: row_num,
                    message: format!("duplicate date {}", record.date),
                });
            }
        }

        Ok(RainfallLog { path, records })
    }

    /// Insert or replace the record for its date. Returns the previous
    /// record when one was overwritten (last write wins).
    pub fn upsert(&mut self, record: RainfallRecord) -> Option<RainfallRecord> {
        self.records.insert(record.date, record)
    }

    pub fn get(&self, date: NaiveDate) -> Option<&RainfallRecord> {
        self.records.get(&date)
    }

    /// All records, date ascending.
    pub fn records(&self) -> impl Iterator<Item = &RainfallRecord> {
        self.records.values()
    }

    /// Records within the inclusive date range, date ascending. Dates with no
    /// measurement are simply absent; nothing is interpolated or zero-filled.
    pub fn query(&self, range: RangeInclusive<NaiveDate>) -> Vec<&RainfallRecord> {
        self.records.range(range).map(|(_, r)| r).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewrite the backing file, sorted by date ascending, atomically with
    /// respect to concurrent readers.
    pub fn save(&self) -> Result<(), LogError> {
        let io_err = |what: &str, e: std::io::Error| {
            LogError::Io(format!("{} {}: {}", what, self.path.display(), e))
        };

        let mut buf: Vec<u8> = Vec::new();
        let header: Vec<String> = HEADER.iter().map(|h| h.to_string()).collect();
        csv::write_row(&mut buf, &header).map_err(|e| io_err("serialize", e))?;
        for record in self.records.values() {
            let row = vec![
                record.date.format("%Y-%m-%d").to_string(),
                format_mm(record.rainfall_mm),
                record
                    .source_fetched_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ];
            csv::write_row(&mut buf, &row).map_err(|e| io_err("serialize", e))?;
        }

        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, &buf).map_err(|e| io_err("write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| io_err("rename into", e))
    }
}

/// Format rainfall without accumulating float noise in the file.
fn format_mm(v: f64) -> String {
    let s = format!("{:.2}", v);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

fn parse_row(row: &[String], row_num: usize) -> Result<RainfallRecord, LogError> {
    let err = |message: String| LogError::Row { row: row_num, message };

    if row.len() != 3 {
        return Err(err(format!("expected 3 fields, got {}", row.len())));
    }

    let date = NaiveDate::parse_from_str(row[0].trim(), "%Y-%m-%d")
        .map_err(|_| err(format!("malformed date `{}`", row[0])))?;

    let rainfall_mm: f64 = row[1]
        .trim()
        .parse()
        .map_err(|_| err(format!("rainfall_mm is not a number: `{}`", row[1])))?;
    if !rainfall_mm.is_finite() || rainfall_mm < 0.0 {
        return Err(err(format!("rainfall_mm must be >= 0, got {}", rainfall_mm)));
    }

    let source_fetched_at = DateTime::parse_from_rfc3339(row[2].trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| err(format!("malformed source_fetched_at `{}`", row[2])))?;

    Ok(RainfallRecord {
        date,
        rainfall_mm,
        source_fetched_at,
    })
}
