//! The ingestion job: fetch today's rainfall reading and upsert it into the
//! log. One scheduled retry on fetch failure, then give up; a failed run
//! writes nothing and leaves the existing log untouched.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use log::{info, warn};

use crate::client::{FetchError, RainfallSource};
use crate::config::Config;
use crate::models::RainfallRecord;
use crate::store::log::{LogError, RainfallLog};

#[derive(Debug)]
pub enum IngestError {
    /// Both the fetch and its single retry failed.
    Fetch(FetchError),
    Store(LogError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Fetch(e) => write!(f, "fetch failed after retry: {}", e),
            IngestError::Store(e) => write!(f, "store failed: {}", e),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Fetch(e) => Some(e),
            IngestError::Store(e) => Some(e),
        }
    }
}

impl From<LogError> for IngestError {
    fn from(value: LogError) -> Self {
        IngestError::Store(value)
    }
}

/// Run one ingestion. `date_override` records the fetched value under a past
/// date (backfill); otherwise the record lands on today's local date.
pub fn run(cfg: &Config, date_override: Option<NaiveDate>) -> Result<RainfallRecord, IngestError> {
    let source = RainfallSource::new(cfg.source_url.clone(), cfg.fetch_timeout);
    let date = date_override.unwrap_or_else(|| Local::now().date_naive());

    let rainfall_mm = fetch_with_retry(source.url(), cfg.ingest_retry_delay, || {
        source.fetch_rainfall_mm()
    })?;

    let record = RainfallRecord {
        date,
        rainfall_mm,
        source_fetched_at: Utc::now(),
    };
    let replaced = record_measurement(&cfg.rainfall_log_path(), record.clone())?;

    match replaced {
        Some(prev) => info!(
            "Recorded {} mm for {} (replaced earlier reading of {} mm)",
            record.rainfall_mm, record.date, prev.rainfall_mm
        ),
        None => info!("Recorded {} mm for {}", record.rainfall_mm, record.date),
    }

    Ok(record)
}

/// Fetch the reading, retrying exactly once after a pause. Takes the fetch
/// as a closure so the retry policy is unit-testable without a network.
fn fetch_with_retry(
    source_url: &str,
    retry_delay: Duration,
    mut fetch: impl FnMut() -> Result<f64, FetchError>,
) -> Result<f64, IngestError> {
    match fetch() {
        Ok(mm) => Ok(mm),
        Err(first) => {
            warn!(
                "Fetch from {} failed ({}); retrying in {}s",
                source_url,
                first,
                retry_delay.as_secs()
            );
            thread::sleep(retry_delay);
            fetch().map_err(IngestError::Fetch)
        }
    }
}

/// Load, upsert by date and atomically rewrite the log. Returns the record
/// that was replaced, if this date had one.
fn record_measurement(
    log_path: &Path,
    record: RainfallRecord,
) -> Result<Option<RainfallRecord>, LogError> {
    let mut log = RainfallLog::load(log_path)?;
    let replaced = log.upsert(record);
    log.save()?;
    Ok(replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use std::path::PathBuf;
    use std::process;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    struct ScratchFile(PathBuf);

    impl ScratchFile {
        fn new() -> Self {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "rainharvest-ingest-{}-{}.csv",
                process::id(),
                n
            ));
            let _ = fs::remove_file(&path);
            ScratchFile(path)
        }
    }

    impl Drop for ScratchFile {
        fn drop(&mut self) {
            let _ = fs::remove_file(&self.0);
            let _ = fs::remove_file(self.0.with_extension("csv.tmp"));
        }
    }

    fn record(date: &str, mm: f64) -> RainfallRecord {
        RainfallRecord {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            rainfall_mm: mm,
            source_fetched_at: Utc.with_ymd_and_hms(2024, 7, 1, 6, 0, 0).unwrap(),
        }
    }

    #[test]
    fn first_measurement_creates_the_log_file() {
        let scratch = ScratchFile::new();
        let replaced = record_measurement(&scratch.0, record("2024-07-01", 10.0)).unwrap();
        assert!(replaced.is_none());
        assert!(scratch.0.is_file());
        let log = RainfallLog::load(&scratch.0).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn repeated_ingestion_for_a_day_is_an_upsert() {
        let scratch = ScratchFile::new();
        record_measurement(&scratch.0, record("2024-07-01", 10.0)).unwrap();
        let replaced = record_measurement(&scratch.0, record("2024-07-01", 12.0)).unwrap();
        assert_eq!(replaced.unwrap().rainfall_mm, 10.0);

        let log = RainfallLog::load(&scratch.0).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.records().next().unwrap().rainfall_mm, 12.0);
    }

    #[test]
    fn first_success_skips_the_retry() {
        let mut calls = 0;
        let mm = fetch_with_retry("http://source", Duration::ZERO, || {
            calls += 1;
            Ok(7.5)
        })
        .unwrap();
        assert_eq!(mm, 7.5);
        assert_eq!(calls, 1);
    }

    #[test]
    fn one_retry_recovers_from_a_transient_failure() {
        let mut calls = 0;
        let mm = fetch_with_retry("http://source", Duration::ZERO, || {
            calls += 1;
            if calls == 1 {
                Err(FetchError::Transport("connection reset".to_string()))
            } else {
                Ok(3.0)
            }
        })
        .unwrap();
        assert_eq!(mm, 3.0);
        assert_eq!(calls, 2);
    }

    #[test]
    fn gives_up_after_exactly_one_retry() {
        let mut calls = 0;
        let err = fetch_with_retry("http://source", Duration::ZERO, || {
            calls += 1;
            Err(FetchError::Parse("structure changed".to_string()))
        })
        .unwrap_err();
        assert_eq!(calls, 2);
        assert!(matches!(err, IngestError::Fetch(FetchError::Parse(_))));
    }

    #[test]
    fn backfill_date_lands_next_to_existing_days() {
        let scratch = ScratchFile::new();
        record_measurement(&scratch.0, record("2024-07-02", 4.0)).unwrap();
        record_measurement(&scratch.0, record("2024-07-01", 10.0)).unwrap();

        let log = RainfallLog::load(&scratch.0).unwrap();
        let dates: Vec<String> = log.records().map(|r| r.date.to_string()).collect();
        assert_eq!(dates, ["2024-07-01", "2024-07-02"]);
    }
}
